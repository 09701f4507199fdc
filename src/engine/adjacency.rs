//! Per-interval edge arena
//!
//! Holds the in-edges and out-edges of the vertices of the interval being
//! executed. Capacities come from a counting pass (degree table for in-edges,
//! outbound indices for out-edges) so storage is sized once per interval;
//! shard loaders then reserve slots with an atomic cursor per vertex and
//! write into them concurrently.

use crate::graph::types::{Degree, EdgeValue, Interval, VertexId};
use crate::storage::{ensure_invariant, StorageError, StorageResult};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// One registered edge: the vertex on the other end and its payload slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSlot {
    pub neighbor: VertexId,
    pub payload: u32,
}

impl EdgeSlot {
    fn pack(self) -> u64 {
        ((self.neighbor as u64) << 32) | self.payload as u64
    }

    fn unpack(word: u64) -> Self {
        Self {
            neighbor: (word >> 32) as VertexId,
            payload: word as u32,
        }
    }
}

/// Edge lists of one side (in or out) for every vertex of the interval
#[derive(Default)]
struct EdgeLists {
    offsets: Vec<usize>,
    fill: Vec<AtomicU32>,
    slots: Vec<AtomicU64>,
}

impl EdgeLists {
    fn reset(&mut self, counts: &[Degree]) {
        self.offsets.clear();
        self.offsets.reserve(counts.len() + 1);
        let mut total = 0usize;
        self.offsets.push(0);
        for &count in counts {
            total += count as usize;
            self.offsets.push(total);
        }

        self.fill.clear();
        self.fill.resize_with(counts.len(), || AtomicU32::new(0));
        self.slots.clear();
        self.slots.resize_with(total, || AtomicU64::new(0));
    }

    fn capacity(&self, local: usize) -> usize {
        self.offsets[local + 1] - self.offsets[local]
    }

    fn len(&self, local: usize) -> usize {
        (self.fill[local].load(Ordering::Acquire) as usize).min(self.capacity(local))
    }

    fn push(&self, local: usize, slot: EdgeSlot) -> Result<(), usize> {
        let position = self.fill[local].fetch_add(1, Ordering::AcqRel) as usize;
        let capacity = self.capacity(local);
        if position >= capacity {
            return Err(capacity);
        }
        self.slots[self.offsets[local] + position].store(slot.pack(), Ordering::Release);
        Ok(())
    }

    fn get(&self, local: usize, index: usize) -> Option<EdgeSlot> {
        if index >= self.len(local) {
            return None;
        }
        let word = self.slots[self.offsets[local] + index].load(Ordering::Acquire);
        Some(EdgeSlot::unpack(word))
    }

    fn total(&self) -> usize {
        self.slots.len()
    }
}

/// Edge storage for the vertices of the active interval.
#[derive(Default)]
pub struct IntervalAdjacency {
    first: VertexId,
    span: usize,
    inbound: EdgeLists,
    outbound: EdgeLists,
    payload: Vec<EdgeValue>,
}

impl IntervalAdjacency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every edge and size the arena for `interval`.
    ///
    /// `in_counts[k]` and `out_counts[k]` are the exact number of in-edges
    /// and out-edges vertex `first_vid + k` receives during the pass.
    pub fn reset(&mut self, interval: &Interval, in_counts: &[Degree], out_counts: &[Degree]) -> StorageResult<()> {
        let span = interval.span();
        ensure_invariant!(
            in_counts.len() == span && out_counts.len() == span,
            "edge counts for {} vertices but interval {} spans {}",
            in_counts.len().max(out_counts.len()),
            interval,
            span
        );
        self.first = interval.first_vid;
        self.span = span;
        self.inbound.reset(in_counts);
        self.outbound.reset(out_counts);
        self.payload.clear();
        Ok(())
    }

    pub fn first_vid(&self) -> VertexId {
        self.first
    }

    pub fn contains(&self, vertex: VertexId) -> bool {
        vertex >= self.first && ((vertex - self.first) as usize) < self.span
    }

    fn local(&self, vertex: VertexId) -> StorageResult<usize> {
        ensure_invariant!(
            self.contains(vertex),
            "vertex {} outside the active interval starting at {} ({} vertices)",
            vertex,
            self.first,
            self.span
        );
        Ok((vertex - self.first) as usize)
    }

    /// Append payload values and return the slot of the first one.
    pub fn append_payload(&mut self, values: &[EdgeValue]) -> StorageResult<u32> {
        let base = self.payload.len();
        ensure_invariant!(
            base + values.len() <= u32::MAX as usize,
            "payload arena overflow at {} values",
            base
        );
        self.payload.extend_from_slice(values);
        Ok(base as u32)
    }

    pub fn payload(&self, slot: u32) -> EdgeValue {
        self.payload.get(slot as usize).copied().unwrap_or_default()
    }

    /// Register an edge `source -> destination` on the destination's in-list.
    pub fn add_in_edge(&self, destination: VertexId, source: VertexId, payload: u32) -> StorageResult<()> {
        let local = self.local(destination)?;
        let slot = EdgeSlot { neighbor: source, payload };
        self.inbound.push(local, slot).map_err(|capacity| {
            StorageError::Invariant(format!(
                "vertex {} received more than its {} reserved in-edges",
                destination, capacity
            ))
        })
    }

    /// Register an edge `source -> destination` on the source's out-list.
    pub fn add_out_edge(&self, source: VertexId, destination: VertexId, payload: u32) -> StorageResult<()> {
        let local = self.local(source)?;
        let slot = EdgeSlot { neighbor: destination, payload };
        self.outbound.push(local, slot).map_err(|capacity| {
            StorageError::Invariant(format!(
                "vertex {} received more than its {} reserved out-edges",
                source, capacity
            ))
        })
    }

    pub fn in_degree(&self, vertex: VertexId) -> Degree {
        self.local(vertex)
            .map(|local| self.inbound.len(local) as Degree)
            .unwrap_or(0)
    }

    pub fn out_degree(&self, vertex: VertexId) -> Degree {
        self.local(vertex)
            .map(|local| self.outbound.len(local) as Degree)
            .unwrap_or(0)
    }

    pub fn in_edge(&self, vertex: VertexId, index: usize) -> Option<EdgeSlot> {
        let local = self.local(vertex).ok()?;
        self.inbound.get(local, index)
    }

    pub fn out_edge(&self, vertex: VertexId, index: usize) -> Option<EdgeSlot> {
        let local = self.local(vertex).ok()?;
        self.outbound.get(local, index)
    }

    /// Edges reserved for the interval, in and out
    pub fn reserved(&self) -> (usize, usize) {
        (self.inbound.total(), self.outbound.total())
    }
}
