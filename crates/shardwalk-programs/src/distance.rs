//! Hop distance between two vertices
//!
//! Both endpoints start a frontier labelled with their own id; unvisited
//! vertices hold -1. Each scheduled vertex hands its label and hop count to
//! unvisited neighbors. When a vertex sees a neighbor carrying the other
//! label the frontiers have met and the distance is the sum of both hop
//! counts plus the connecting edge.

use parking_lot::Mutex;
use shardwalk::engine::{Context, Vertex, VertexProgram};
use shardwalk::graph::VertexId;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::info;

/// Vertex value of a vertex neither frontier reached yet
pub const UNVISITED: f64 = -1.0;

pub struct ShortestDistance {
    from: VertexId,
    to: VertexId,
    hops: Vec<AtomicU32>,
    distance: Mutex<Option<u32>>,
    met: AtomicBool,
}

impl ShortestDistance {
    pub fn new(from: VertexId, to: VertexId) -> Self {
        Self {
            from,
            to,
            hops: Vec::new(),
            distance: Mutex::new(None),
            met: AtomicBool::new(false),
        }
    }

    /// Hops between the two vertices, `None` when no path was found
    pub fn distance(&self) -> Option<u32> {
        if self.from == self.to {
            return Some(0);
        }
        *self.distance.lock()
    }

    fn hops(&self, vertex: VertexId) -> u32 {
        self.hops
            .get(vertex as usize)
            .map(|h| h.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl VertexProgram for ShortestDistance {
    fn update(&self, vertex: &Vertex<'_>, ctx: &Context) {
        let scheduler = ctx.scheduler();
        scheduler.remove_task(vertex.id());

        if ctx.iteration() == 0 {
            if vertex.id() == self.from || vertex.id() == self.to {
                vertex.set_value(vertex.id() as f64);
                scheduler.add_task(vertex.id(), false);
            } else {
                vertex.set_value(UNVISITED);
            }
            return;
        }

        let label = vertex.value();
        let hops = self.hops(vertex.id());
        for edge in vertex.edges() {
            let seen = edge.neighbor_value();
            if seen == UNVISITED {
                if let Some(slot) = self.hops.get(edge.neighbor() as usize) {
                    slot.store(hops + 1, Ordering::Relaxed);
                }
                edge.set_neighbor_value(label);
                scheduler.add_task(edge.neighbor(), false);
            } else if seen != label {
                self.met.store(true, Ordering::Relaxed);
                let mut distance = self.distance.lock();
                if distance.is_none() {
                    *distance = Some(hops + self.hops(edge.neighbor()) + 1);
                }
            }
        }
    }

    fn before_iteration(&mut self, ctx: &Context) {
        info!("Start of iteration {}/{}", ctx.iteration(), ctx.iterations().saturating_sub(1));
        if ctx.iteration() == 0 {
            self.hops = (0..ctx.vertex_count()).map(|_| AtomicU32::new(0)).collect();
            *self.distance.lock() = None;
            self.met.store(false, Ordering::Relaxed);
        }
    }

    fn after_iteration(&mut self, ctx: &Context) {
        if self.met.load(Ordering::Relaxed) {
            info!("Frontiers met in iteration {}", ctx.iteration());
            ctx.set_last_iteration(ctx.iteration());
        }
    }
}
