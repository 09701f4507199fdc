//! Connected components by label propagation
//!
//! Every vertex starts with its own id as label and repeatedly takes the
//! minimum label over its in- and out-neighbors. A vertex that lowers a
//! neighbor schedules it for the running pass, so labels can cross several
//! intervals in one iteration. The run ends after the first iteration in
//! which no label changed.

use shardwalk::engine::{Context, Vertex, VertexProgram};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct ConnectedComponents {
    converged: AtomicBool,
}

impl ConnectedComponents {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VertexProgram for ConnectedComponents {
    fn update(&self, vertex: &Vertex<'_>, ctx: &Context) {
        let scheduler = ctx.scheduler();
        scheduler.remove_task(vertex.id());

        if ctx.iteration() == 0 {
            vertex.set_value(vertex.id() as f64);
            scheduler.add_task(vertex.id(), false);

            // neighbor values are not initialized yet, use their ids
            let label = vertex
                .edges()
                .map(|edge| edge.neighbor() as f64)
                .fold(vertex.value(), f64::min);
            vertex.set_value(label);
            for index in 0..vertex.out_degree() as usize {
                vertex.out_edge(index).set_neighbor_value(label);
            }
            return;
        }

        let label = vertex
            .edges()
            .map(|edge| edge.neighbor_value())
            .fold(vertex.value(), f64::min);
        vertex.set_value(label);

        for edge in vertex.edges() {
            if label < edge.neighbor_value() {
                edge.set_neighbor_value(label);
                scheduler.add_task(edge.neighbor(), true);
                self.converged.store(false, Ordering::Relaxed);
            }
        }
    }

    fn before_iteration(&mut self, ctx: &Context) {
        info!("Start of iteration {}/{}", ctx.iteration(), ctx.iterations().saturating_sub(1));
        self.converged.store(ctx.iteration() > 0, Ordering::Relaxed);
    }

    fn after_iteration(&mut self, ctx: &Context) {
        if self.converged.load(Ordering::Relaxed) {
            info!("Labels stable after iteration {}", ctx.iteration());
            ctx.set_last_iteration(ctx.iteration());
        }
    }
}
