//! Double-buffered vertex activation

use crate::graph::types::VertexId;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-vertex activation for the current and the next generation.
///
/// Every method takes `&self` so update callbacks running in parallel can
/// (de)activate themselves and their neighbors. Both buffers are atomic
/// flags; only [`Scheduler::swap`] moves the generation forward.
pub struct Scheduler {
    buffers: [Vec<AtomicBool>; 2],
    /// Index of the current generation in `buffers`
    current: usize,
    has_tasks: AtomicBool,
}

impl Scheduler {
    /// Every vertex starts active in generation 0.
    pub fn new(vertex_count: usize) -> Self {
        let current = (0..vertex_count).map(|_| AtomicBool::new(true)).collect();
        let next = (0..vertex_count).map(|_| AtomicBool::new(false)).collect();
        Self {
            buffers: [current, next],
            current: 0,
            has_tasks: AtomicBool::new(true),
        }
    }

    fn current(&self) -> &[AtomicBool] {
        &self.buffers[self.current]
    }

    fn next(&self) -> &[AtomicBool] {
        &self.buffers[1 - self.current]
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Schedule `id` for the next generation, and for the running one too
    /// when `now` is set.
    pub fn add_task(&self, id: VertexId, now: bool) {
        let index = id as usize;
        debug_assert!(index < self.len(), "vertex {} out of range", id);
        if let Some(flag) = self.next().get(index) {
            flag.store(true, Ordering::Relaxed);
        }
        if now {
            if let Some(flag) = self.current().get(index) {
                flag.store(true, Ordering::Relaxed);
            }
        }
        self.has_tasks.store(true, Ordering::Release);
    }

    /// Drop `id` from the next generation. The running pass is unaffected.
    pub fn remove_task(&self, id: VertexId) {
        if let Some(flag) = self.next().get(id as usize) {
            flag.store(false, Ordering::Relaxed);
        }
    }

    /// Drop every vertex in `[from, to]` from the next generation.
    pub fn remove_tasks_in_range(&self, from: VertexId, to: VertexId) {
        let next = self.next();
        let end = (to as usize + 1).min(next.len());
        for flag in next.iter().take(end).skip(from as usize) {
            flag.store(false, Ordering::Relaxed);
        }
    }

    pub fn is_scheduled(&self, id: VertexId) -> bool {
        self.current()
            .get(id as usize)
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Active vertices in the current generation
    pub fn task_count(&self) -> usize {
        self.current()
            .iter()
            .filter(|flag| flag.load(Ordering::Relaxed))
            .count()
    }

    /// Whether any task was added since the flag was last cleared
    pub fn has_tasks(&self) -> bool {
        self.has_tasks.load(Ordering::Acquire)
    }

    pub(crate) fn clear_pending(&self) {
        self.has_tasks.store(false, Ordering::Release);
    }

    /// Advance one generation: next becomes current and the new next is
    /// cleared.
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
        for flag in self.next() {
            flag.store(false, Ordering::Relaxed);
        }
    }
}
