//! Partitioning of the sorted edge run into interval shards
//!
//! Two streaming passes over the destination-sorted run: the first builds the
//! inbound degree table and plans the intervals, the second cuts the run into
//! one slice per interval and hands batches of slices to a bounded worker pool
//! that re-sorts each slice by source and writes the shard files.

use super::sort::SortedRun;
use super::PreprocessResult;
use crate::graph::types::{DegreeEntry, EdgeRecord, EdgeValue, Interval, OutboundEntry, VertexId};
use crate::storage::io::{write_records, RecordReader};
use crate::storage::{
    ensure_invariant, GraphMeta, IoContext, ShardsInfo, StorageLayout, StorageResult,
};
use rayon::prelude::*;
use std::fs::File;
use std::marker::PhantomData;
use std::time::Instant;
use tracing::{debug, info};

/// Bytes an edge occupies in a shard's adjacency array, the unit of the
/// interval budget
pub const ADJACENCY_ENTRY_BYTES: u64 = 4;

/// Interval boundaries and per-interval edge counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalPlan {
    pub intervals: Vec<Interval>,
    pub edges: Vec<u32>,
}

/// Interval count and per-interval byte budget for `total_bytes` of edges.
///
/// The count is `ceil(total / default)`. A non-empty remainder below half the
/// default budget is spread evenly over all intervals; otherwise the default
/// is kept and the last interval takes what is left.
pub fn interval_budget(total_bytes: u64, default_budget: u64) -> (usize, u64) {
    let default_budget = default_budget.max(1);
    let count = total_bytes.div_ceil(default_budget).max(1);
    let remainder = total_bytes % default_budget;
    if remainder != 0 && remainder < default_budget / 2 {
        (count as usize, total_bytes.div_ceil(count))
    } else {
        (count as usize, default_budget)
    }
}

/// Greedy walk over the degree table.
///
/// An interval stops admitting vertices once the next one would overflow its
/// budget, unless it is still empty or it is the last interval. If the walk
/// runs out of vertices early, fewer intervals are produced.
pub fn plan_intervals(degrees: &[DegreeEntry], default_budget: u64) -> StorageResult<IntervalPlan> {
    let total_edges: u64 = degrees.iter().map(|d| d.degree as u64).sum();
    let (target, budget) = interval_budget(total_edges * ADJACENCY_ENTRY_BYTES, default_budget);
    debug!("Planning up to {} intervals of {} bytes", target, budget);

    let mut plan = IntervalPlan {
        intervals: Vec::with_capacity(target),
        edges: Vec::with_capacity(target),
    };
    let mut first_vid: VertexId = 0;
    let mut bytes = 0u64;
    let mut edges = 0u64;
    let mut destinations = 0u32;

    for (i, entry) in degrees.iter().enumerate() {
        let entry_bytes = entry.degree as u64 * ADJACENCY_ENTRY_BYTES;
        let is_last = plan.intervals.len() + 1 >= target;
        if destinations > 0 && !is_last && bytes + entry_bytes > budget {
            let last_vid = degrees[i - 1].vertex;
            plan.intervals.push(Interval::new(first_vid, last_vid, destinations));
            plan.edges.push(edges_to_u32(edges)?);
            first_vid = last_vid + 1;
            bytes = 0;
            edges = 0;
            destinations = 0;
        }
        bytes += entry_bytes;
        edges += entry.degree as u64;
        destinations += 1;
    }
    if let Some(last) = degrees.last() {
        plan.intervals.push(Interval::new(first_vid, last.vertex, destinations));
        plan.edges.push(edges_to_u32(edges)?);
    }

    let planned: u64 = plan.edges.iter().map(|&e| e as u64).sum();
    ensure_invariant!(
        planned == total_edges,
        "intervals hold {} edges but the degree table counts {}",
        planned,
        total_edges
    );
    Ok(plan)
}

fn edges_to_u32(edges: u64) -> StorageResult<u32> {
    ensure_invariant!(
        edges <= u32::MAX as u64,
        "interval with {} edges exceeds the shard index range",
        edges
    );
    Ok(edges as u32)
}

/// Adjacency array, outbound index and payload array of one slice.
///
/// `edges` must already be sorted by source.
pub fn build_shard<E: EdgeRecord>(edges: &[E]) -> (Vec<VertexId>, Vec<OutboundEntry>, Vec<EdgeValue>) {
    let mut adjacency = Vec::with_capacity(edges.len());
    let mut outbound = Vec::new();
    let mut payload = Vec::with_capacity(edges.len());
    let mut current: Option<VertexId> = None;

    for (offset, edge) in edges.iter().enumerate() {
        if current != Some(edge.src()) {
            current = Some(edge.src());
            outbound.push(OutboundEntry {
                source: edge.src(),
                offset: offset as u32,
            });
        }
        adjacency.push(edge.dst());
        payload.push(edge.value());
    }
    (adjacency, outbound, payload)
}

fn write_shard<E: EdgeRecord>(layout: &StorageLayout, shard: usize, mut edges: Vec<E>) -> StorageResult<()> {
    edges.sort_by_key(|e| e.src());
    let (adjacency, outbound, payload) = build_shard(&edges);
    write_records(&layout.adjacency(shard), &adjacency)?;
    write_records(&layout.outbound(shard), &outbound)?;
    write_records(&layout.edge_data(shard), &payload)?;
    debug!(
        "Shard {}: {} edges, {} sources",
        shard,
        adjacency.len(),
        outbound.len()
    );
    Ok(())
}

/// Turns a sorted run into interval shards and their metadata.
pub struct Sharder<E: EdgeRecord> {
    layout: StorageLayout,
    budget_bytes: u64,
    workers: usize,
    _edge: PhantomData<E>,
}

impl<E: EdgeRecord> Sharder<E> {
    pub fn new(layout: &StorageLayout, budget_bytes: u64, workers: usize) -> Self {
        Self {
            layout: layout.clone(),
            budget_bytes,
            workers: workers.max(1),
            _edge: PhantomData,
        }
    }

    pub fn run(&self, sorted: &SortedRun) -> PreprocessResult<ShardsInfo> {
        ensure_invariant!(sorted.edges > 0, "cannot shard an empty edge run");

        let started = Instant::now();
        let (degrees, max_vertex) = self.degree_pass(sorted)?;
        write_records(&self.layout.inbound_degrees(), &degrees)?;
        info!(
            "Computed inbound degrees of {} destinations in {:?}",
            degrees.len(),
            started.elapsed()
        );

        let mut plan = plan_intervals(&degrees, self.budget_bytes)?;
        drop(degrees);
        info!(
            "Partitioned into {} intervals (default budget {} bytes)",
            plan.intervals.len(),
            self.budget_bytes
        );

        let started = Instant::now();
        self.write_shards(sorted, &plan.edges)?;
        info!("Wrote {} shards in {:?}", plan.edges.len(), started.elapsed());

        ensure_invariant!(
            max_vertex < VertexId::MAX,
            "vertex id {} leaves no room for a vertex count",
            max_vertex
        );
        let vertices = max_vertex + 1;
        let vertex_data = self.layout.vertex_data();
        File::create(&vertex_data)
            .and_then(|f| f.set_len(vertices as u64 * 8))
            .at("creating", &vertex_data)?;
        if let Some(last) = plan.intervals.last_mut() {
            last.last_vid = vertices - 1;
        }

        GraphMeta::write_intervals(&self.layout, &plan.intervals, &plan.edges)?;
        let info = ShardsInfo {
            intervals: plan.intervals.len(),
            edges: sorted.edges,
            vertices,
        };
        info.write(&self.layout.shards_info())?;
        info!(
            "Graph has {} vertices, {} edges, {} shards",
            info.vertices, info.edges, info.intervals
        );
        Ok(info)
    }

    /// Degree table of every destination and the largest id seen as either
    /// endpoint.
    fn degree_pass(&self, sorted: &SortedRun) -> StorageResult<(Vec<DegreeEntry>, VertexId)> {
        let mut reader = RecordReader::<E>::open(&sorted.path)?;
        let mut degrees: Vec<DegreeEntry> = Vec::new();
        let mut max_vertex: VertexId = 0;
        while let Some(edge) = reader.next_record()? {
            max_vertex = max_vertex.max(edge.src()).max(edge.dst());
            match degrees.last_mut() {
                Some(entry) if entry.vertex == edge.dst() => entry.degree += 1,
                _ => degrees.push(DegreeEntry {
                    vertex: edge.dst(),
                    degree: 1,
                }),
            }
        }
        Ok((degrees, max_vertex))
    }

    fn write_shards(&self, sorted: &SortedRun, interval_edges: &[u32]) -> PreprocessResult<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()?;
        let mut reader = RecordReader::<E>::open(&sorted.path)?;

        let mut shard = 0;
        while shard < interval_edges.len() {
            let end = (shard + self.workers).min(interval_edges.len());
            let mut batch = Vec::with_capacity(end - shard);
            for (index, &count) in interval_edges.iter().enumerate().take(end).skip(shard) {
                let slice = reader.next_batch(count as usize)?;
                ensure_invariant!(
                    slice.len() == count as usize,
                    "sorted run ended inside interval {}",
                    index
                );
                batch.push((index, slice));
            }
            pool.install(|| {
                batch
                    .into_par_iter()
                    .try_for_each(|(index, slice)| write_shard(&self.layout, index, slice))
            })?;
            shard = end;
        }
        ensure_invariant!(
            reader.next_record()?.is_none(),
            "sorted run holds edges beyond the last interval"
        );
        Ok(())
    }
}

/// Remove the scratch sort run and any chunk left behind.
pub fn clear_chunks(layout: &StorageLayout) -> StorageResult<()> {
    let dir = layout.root().join("Chunks");
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(&dir).at("listing", &dir)? {
        let path = entry.at("listing", &dir)?.path();
        if path.is_file() {
            std::fs::remove_file(&path).at("removing", &path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn write_sorted_run<E: EdgeRecord>(layout: &StorageLayout, edges: &[E]) -> SortedRun {
    let path = layout.chunk(0);
    let mut writer = crate::storage::RecordWriter::create(&path).unwrap();
    writer.push_all(edges).unwrap();
    writer.finish().unwrap();
    SortedRun {
        path,
        edges: edges.len() as u64,
    }
}
