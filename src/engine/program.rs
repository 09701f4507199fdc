//! Callback interface implemented by vertex programs

use super::adjacency::{EdgeSlot, IntervalAdjacency};
use super::scheduler::Scheduler;
use super::vertex::VertexStore;
use crate::graph::types::{Degree, EdgeValue, Interval, VertexId, VertexValue};
use std::sync::atomic::{AtomicU32, Ordering};

/// A vertex-centric computation.
///
/// `update` runs in parallel over the scheduled vertices of one interval; the
/// hooks run sequentially between passes. Neighbor values read in `update`
/// may or may not already reflect updates from the same pass.
pub trait VertexProgram: Sync {
    fn update(&self, vertex: &Vertex<'_>, ctx: &Context);

    fn before_iteration(&mut self, _ctx: &Context) {}

    fn after_iteration(&mut self, _ctx: &Context) {}

    fn before_interval(&mut self, _interval: &Interval, _ctx: &Context) {}

    fn after_interval(&mut self, _interval: &Interval, _ctx: &Context) {}
}

/// Execution state shared with every callback.
pub struct Context {
    iteration: u32,
    iterations: AtomicU32,
    scheduler: Scheduler,
    vertex_count: u32,
}

impl Context {
    pub fn new(iterations: u32, vertex_count: u32) -> Self {
        Self {
            iteration: 0,
            iterations: AtomicU32::new(iterations),
            scheduler: Scheduler::new(vertex_count as usize),
            vertex_count,
        }
    }

    /// Index of the running iteration, from 0
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Configured iteration count
    pub fn iterations(&self) -> u32 {
        self.iterations.load(Ordering::Acquire)
    }

    /// Lower the iteration count so the loop ends after `iteration`.
    pub fn set_last_iteration(&self, iteration: u32) {
        self.iterations.store(iteration, Ordering::Release);
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Whether another iteration should start
    pub(crate) fn should_continue(&self) -> bool {
        self.iteration < self.iterations() && self.scheduler.has_tasks()
    }

    /// Close the iteration: advance the index and swap generations.
    pub(crate) fn finish_iteration(&mut self) {
        self.iteration += 1;
        self.scheduler.swap();
    }
}

/// A vertex of the active interval, as seen by `update`.
pub struct Vertex<'a> {
    id: VertexId,
    values: &'a VertexStore,
    edges: &'a IntervalAdjacency,
}

impl<'a> Vertex<'a> {
    pub(crate) fn new(id: VertexId, values: &'a VertexStore, edges: &'a IntervalAdjacency) -> Self {
        Self { id, values, edges }
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn value(&self) -> VertexValue {
        self.values.get(self.id)
    }

    pub fn set_value(&self, value: VertexValue) {
        self.values.set(self.id, value)
    }

    pub fn in_degree(&self) -> Degree {
        self.edges.in_degree(self.id)
    }

    pub fn out_degree(&self) -> Degree {
        self.edges.out_degree(self.id)
    }

    pub fn num_edges(&self) -> Degree {
        self.in_degree() + self.out_degree()
    }

    /// # Panics
    /// If `index >= in_degree()`.
    pub fn in_edge(&self, index: usize) -> EdgeView<'a> {
        let slot = self.edges.in_edge(self.id, index);
        self.view(slot, index, "in-edge")
    }

    /// # Panics
    /// If `index >= out_degree()`.
    pub fn out_edge(&self, index: usize) -> EdgeView<'a> {
        let slot = self.edges.out_edge(self.id, index);
        self.view(slot, index, "out-edge")
    }

    /// In-edges first, then out-edges.
    ///
    /// # Panics
    /// If `index >= num_edges()`.
    pub fn edge(&self, index: usize) -> EdgeView<'a> {
        let in_degree = self.in_degree() as usize;
        if index < in_degree {
            self.in_edge(index)
        } else {
            self.out_edge(index - in_degree)
        }
    }

    /// Every edge in `edge(i)` order
    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'a>> + '_ {
        (0..self.num_edges() as usize).map(move |i| self.edge(i))
    }

    fn view(&self, slot: Option<EdgeSlot>, index: usize, kind: &str) -> EdgeView<'a> {
        match slot {
            Some(slot) => EdgeView {
                neighbor: slot.neighbor,
                payload: self.edges.payload(slot.payload),
                values: self.values,
            },
            None => panic!("{} {} out of range for vertex {}", kind, index, self.id),
        }
    }
}

/// One edge of a [`Vertex`], resolved against the shared vertex store.
#[derive(Clone, Copy)]
pub struct EdgeView<'a> {
    neighbor: VertexId,
    payload: EdgeValue,
    values: &'a VertexStore,
}

impl<'a> EdgeView<'a> {
    /// Vertex on the other end
    pub fn neighbor(&self) -> VertexId {
        self.neighbor
    }

    pub fn neighbor_value(&self) -> VertexValue {
        self.values.get(self.neighbor)
    }

    pub fn set_neighbor_value(&self, value: VertexValue) {
        self.values.set(self.neighbor, value)
    }

    /// Edge payload
    pub fn value(&self) -> EdgeValue {
        self.payload
    }
}
