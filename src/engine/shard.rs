//! Memory shard and sliding shards
//!
//! When interval `m` executes, shard `m` is loaded whole (the memory shard):
//! it holds every in-edge of the interval and the out-edges whose source is
//! also in `m`. Every other shard `j` contributes only the window of edges
//! whose source lies in `m` (a sliding shard); those are the out-edges of
//! `m`'s vertices into interval `j`. Outbound indices are sorted by source and
//! intervals are visited in increasing order, so each sliding shard keeps a
//! forward-only cursor that is reset at the start of every iteration.

use super::adjacency::IntervalAdjacency;
use super::EngineResult;
use crate::cache::BlockCache;
use crate::graph::types::{Degree, DegreeEntry, Interval, OutboundEntry, VertexId};
use crate::storage::{ensure_invariant, GraphMeta, ShardBacking, StorageResult};
use rayon::prelude::*;
use std::ops::Range;
use tracing::debug;

/// Edge range of run `index` of an outbound index over a shard of `edges`
fn run_range(runs: &[OutboundEntry], index: usize, edges: usize) -> Range<usize> {
    let start = runs[index].offset as usize;
    let end = runs.get(index + 1).map(|next| next.offset as usize).unwrap_or(edges);
    start..end
}

/// In-edge count of every vertex of `interval` from its degree entries
pub fn in_edge_counts(interval: &Interval, degrees: &[DegreeEntry]) -> StorageResult<Vec<Degree>> {
    let mut counts = vec![0; interval.span()];
    for entry in degrees {
        ensure_invariant!(
            interval.contains(entry.vertex),
            "degree entry for vertex {} filed under interval {}",
            entry.vertex,
            interval
        );
        counts[(entry.vertex - interval.first_vid) as usize] = entry.degree;
    }
    Ok(counts)
}

/// Out-edge count of every vertex of `interval`, summed over the outbound
/// index of every shard.
pub fn out_edge_counts(meta: &GraphMeta, interval: &Interval) -> Vec<Degree> {
    let mut counts = vec![0; interval.span()];
    for (shard, runs) in meta.outbound.iter().enumerate() {
        let edges = meta.interval_edges[shard] as usize;
        let from = runs.partition_point(|run| run.source < interval.first_vid);
        for index in from..runs.len() {
            let source = runs[index].source;
            if source > interval.last_vid {
                break;
            }
            counts[(source - interval.first_vid) as usize] += run_range(runs, index, edges).len() as Degree;
        }
    }
    counts
}

/// Contiguous edges of one shard covered by runs `runs` of its outbound index
struct Window<'a> {
    runs: Range<usize>,
    start: usize,
    adjacency: &'a [VertexId],
    payload_base: u32,
}

/// Call `register(source, destination, payload_slot)` for every edge of
/// `window`, one rayon task per run.
fn register_window<F>(runs: &[OutboundEntry], shard_edges: usize, window: Window<'_>, register: F) -> StorageResult<()>
where
    F: Fn(VertexId, VertexId, u32) -> StorageResult<()> + Sync,
{
    window.runs.clone().into_par_iter().try_for_each(|index| {
        let source = runs[index].source;
        for position in run_range(runs, index, shard_edges) {
            let local = position - window.start;
            register(source, window.adjacency[local], window.payload_base + local as u32)?;
        }
        Ok(())
    })
}

/// Loads one interval's own shard in full.
#[derive(Debug, Clone, Copy)]
pub struct MemoryShard {
    interval: usize,
}

impl MemoryShard {
    pub fn new(interval: usize) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Register every edge of the shard. Returns the number of edges loaded.
    pub fn load(
        &self,
        meta: &GraphMeta,
        backing: &dyn ShardBacking,
        cache: &mut BlockCache,
        arena: &mut IntervalAdjacency,
    ) -> EngineResult<usize> {
        let interval = meta.intervals[self.interval];
        let edges = meta.interval_edges[self.interval] as usize;
        let runs = &meta.outbound[self.interval];
        if edges == 0 || runs.is_empty() {
            return Ok(0);
        }

        let adjacency = backing.adjacency(self.interval, 0..edges)?;
        let payload = cache.fetch_values(self.interval, 0, edges)?;
        let base = arena.append_payload(&payload)?;
        let arena: &IntervalAdjacency = arena;

        let window = Window {
            runs: 0..runs.len(),
            start: 0,
            adjacency: &adjacency,
            payload_base: base,
        };
        register_window(runs, edges, window, |source, destination, slot| {
            arena.add_in_edge(destination, source, slot)?;
            if interval.contains(source) {
                arena.add_out_edge(source, destination, slot)?;
            }
            Ok(())
        })?;
        debug!("Memory shard {} registered {} edges", self.interval, edges);
        Ok(edges)
    }
}

/// Loads, from one shard, the edges whose source is in the executing
/// interval.
#[derive(Debug, Clone, Copy)]
pub struct SlidingShard {
    shard: usize,
    /// First outbound entry not yet consumed in this iteration
    cursor: usize,
}

impl SlidingShard {
    pub fn new(shard: usize) -> Self {
        Self { shard, cursor: 0 }
    }

    pub fn shard(&self) -> usize {
        self.shard
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Outbound entries `[first, end)` whose source lies in `memory`,
    /// scanning forward from the cursor.
    fn advance(&mut self, runs: &[OutboundEntry], memory: &Interval) -> Range<usize> {
        let mut first = self.cursor;
        while first < runs.len() && runs[first].source < memory.first_vid {
            first += 1;
        }
        let mut end = first;
        while end < runs.len() && runs[end].source <= memory.last_vid {
            end += 1;
        }
        self.cursor = end;
        first..end
    }

    /// Register the out-edges of `memory`'s vertices stored in this shard.
    /// Returns the number of edges loaded.
    pub fn load(
        &mut self,
        memory: &Interval,
        meta: &GraphMeta,
        backing: &dyn ShardBacking,
        cache: &mut BlockCache,
        arena: &mut IntervalAdjacency,
    ) -> EngineResult<usize> {
        let runs = &meta.outbound[self.shard];
        let edges = meta.interval_edges[self.shard] as usize;
        let selected = self.advance(runs, memory);
        if selected.is_empty() {
            return Ok(0);
        }

        let window_start = runs[selected.start].offset as usize;
        let window_end = runs
            .get(selected.end)
            .map(|run| run.offset as usize)
            .unwrap_or(edges);
        let adjacency = backing.adjacency(self.shard, window_start..window_end)?;
        let payload = cache.fetch_values(self.shard, window_start, window_end - window_start)?;
        let base = arena.append_payload(&payload)?;
        let arena: &IntervalAdjacency = arena;

        let window = Window {
            runs: selected,
            start: window_start,
            adjacency: &adjacency,
            payload_base: base,
        };
        register_window(runs, edges, window, |source, destination, slot| {
            arena.add_out_edge(source, destination, slot)
        })?;
        debug!(
            "Sliding shard {} supplied edges [{}, {}) for interval {}",
            self.shard, window_start, window_end, memory
        );
        Ok(window_end - window_start)
    }
}

/// Edges registered while preparing one interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreparedInterval {
    pub memory_edges: usize,
    pub sliding_edges: usize,
}

/// The memory shard plus one sliding shard per other interval.
pub struct ShardLoader {
    sliding: Vec<SlidingShard>,
}

impl ShardLoader {
    pub fn new(interval_count: usize) -> Self {
        Self {
            sliding: (0..interval_count).map(SlidingShard::new).collect(),
        }
    }

    /// Rewind every sliding cursor before a new pass over the intervals.
    pub fn reset(&mut self) {
        self.sliding.iter_mut().for_each(SlidingShard::reset);
    }

    /// Rebuild `arena` with the complete in/out edges of interval `memory`.
    pub fn prepare(
        &mut self,
        memory: usize,
        meta: &GraphMeta,
        backing: &dyn ShardBacking,
        cache: &mut BlockCache,
        arena: &mut IntervalAdjacency,
    ) -> EngineResult<PreparedInterval> {
        let interval = meta.intervals[memory];
        let in_counts = in_edge_counts(&interval, &backing.degrees(memory)?)?;
        let out_counts = out_edge_counts(meta, &interval);
        arena.reset(&interval, &in_counts, &out_counts)?;

        let mut prepared = PreparedInterval {
            memory_edges: MemoryShard::new(memory).load(meta, backing, cache, arena)?,
            sliding_edges: 0,
        };
        for sliding in self.sliding.iter_mut().filter(|s| s.shard() != memory) {
            prepared.sliding_edges += sliding.load(&interval, meta, backing, cache, arena)?;
        }
        Ok(prepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs(entries: &[(u32, u32)]) -> Vec<OutboundEntry> {
        entries
            .iter()
            .map(|&(source, offset)| OutboundEntry { source, offset })
            .collect()
    }

    #[test]
    fn test_run_ranges() {
        let runs = runs(&[(1, 0), (4, 2), (9, 5)]);
        assert_eq!(run_range(&runs, 0, 7), 0..2);
        assert_eq!(run_range(&runs, 2, 7), 5..7);
    }

    #[test]
    fn test_cursor_only_moves_forward() {
        let runs = runs(&[(0, 0), (2, 1), (3, 2), (7, 4)]);
        let mut shard = SlidingShard::new(0);
        assert_eq!(shard.advance(&runs, &Interval::new(0, 1, 1)), 0..1);
        assert_eq!(shard.advance(&runs, &Interval::new(2, 5, 1)), 1..3);
        assert_eq!(shard.advance(&runs, &Interval::new(6, 6, 1)), 3..3);
        assert_eq!(shard.advance(&runs, &Interval::new(7, 9, 1)), 3..4);
        // an earlier interval is not revisited without a reset
        assert!(shard.advance(&runs, &Interval::new(0, 1, 1)).is_empty());
        shard.reset();
        assert_eq!(shard.advance(&runs, &Interval::new(0, 1, 1)), 0..1);
    }

    #[test]
    fn test_in_edge_counts() {
        let interval = Interval::new(4, 7, 2);
        let degrees = [
            DegreeEntry { vertex: 5, degree: 3 },
            DegreeEntry { vertex: 7, degree: 1 },
        ];
        assert_eq!(in_edge_counts(&interval, &degrees).unwrap(), vec![0, 3, 0, 1]);

        let stray = [DegreeEntry { vertex: 8, degree: 1 }];
        assert!(in_edge_counts(&interval, &stray).is_err());
    }
}
