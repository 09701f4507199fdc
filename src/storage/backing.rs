//! Where the degree table and adjacency arrays live during a run
//!
//! [`ResidentBacking`] loads them once and serves slices; [`StreamedBacking`]
//! reads the requested range from disk each time. The engine picks one at
//! start-up and every loader goes through the trait.

use super::io::{read_records, read_records_at};
use super::metadata::GraphMeta;
use super::{StorageLayout, StorageResult};
use crate::graph::types::{DegreeEntry, VertexId};
use std::borrow::Cow;
use std::ops::Range;
use tracing::info;

/// Source of the per-interval degree table and shard adjacency arrays.
pub trait ShardBacking: Send + Sync {
    /// Degree entries of the destinations of `interval`
    fn degrees(&self, interval: usize) -> StorageResult<Cow<'_, [DegreeEntry]>>;

    /// The whole degree table
    fn all_degrees(&self) -> StorageResult<Cow<'_, [DegreeEntry]>>;

    /// Entries `range` of the adjacency array of `shard`
    fn adjacency(&self, shard: usize, range: Range<usize>) -> StorageResult<Cow<'_, [VertexId]>>;

    /// Whether the arrays stay in memory for the whole run
    fn is_resident(&self) -> bool;
}

/// Per-interval ranges into the global degree table
#[derive(Debug, Clone)]
struct DegreeRanges {
    ranges: Vec<Range<usize>>,
    total: usize,
}

impl DegreeRanges {
    fn new(meta: &GraphMeta) -> Self {
        let ranges: Vec<Range<usize>> = meta
            .degree_offsets
            .iter()
            .zip(&meta.intervals)
            .map(|(&start, interval)| {
                let start = start as usize;
                start..start + interval.destinations as usize
            })
            .collect();
        let total = ranges.last().map(|r| r.end).unwrap_or(0);
        Self { ranges, total }
    }

    fn get(&self, interval: usize) -> StorageResult<Range<usize>> {
        ensure_invariant!(
            interval < self.ranges.len(),
            "interval {} out of range ({} intervals)",
            interval,
            self.ranges.len()
        );
        Ok(self.ranges[interval].clone())
    }
}

fn check_adjacency_range(shard: usize, range: &Range<usize>, len: usize) -> StorageResult<()> {
    ensure_invariant!(
        range.start <= range.end && range.end <= len,
        "adjacency range {:?} outside shard {} of {} edges",
        range,
        shard,
        len
    );
    Ok(())
}

/// Everything loaded once at start-up.
pub struct ResidentBacking {
    degree_ranges: DegreeRanges,
    degrees: Vec<DegreeEntry>,
    adjacency: Vec<Vec<VertexId>>,
}

impl ResidentBacking {
    pub fn load(meta: &GraphMeta) -> StorageResult<Self> {
        let layout = &meta.layout;
        let degree_ranges = DegreeRanges::new(meta);
        let degrees: Vec<DegreeEntry> = read_records(&layout.inbound_degrees())?;
        ensure_invariant!(
            degrees.len() == degree_ranges.total,
            "inbound_degrees holds {} entries but intervals list {} destinations",
            degrees.len(),
            degree_ranges.total
        );
        let adjacency = (0..meta.interval_count())
            .map(|shard| read_records(&layout.adjacency(shard)))
            .collect::<StorageResult<Vec<Vec<VertexId>>>>()?;
        info!(
            "Loaded {} degree entries and {} adjacency arrays into memory",
            degrees.len(),
            adjacency.len()
        );
        Ok(Self {
            degree_ranges,
            degrees,
            adjacency,
        })
    }
}

impl ShardBacking for ResidentBacking {
    fn degrees(&self, interval: usize) -> StorageResult<Cow<'_, [DegreeEntry]>> {
        let range = self.degree_ranges.get(interval)?;
        Ok(Cow::Borrowed(&self.degrees[range]))
    }

    fn all_degrees(&self) -> StorageResult<Cow<'_, [DegreeEntry]>> {
        Ok(Cow::Borrowed(&self.degrees))
    }

    fn adjacency(&self, shard: usize, range: Range<usize>) -> StorageResult<Cow<'_, [VertexId]>> {
        ensure_invariant!(shard < self.adjacency.len(), "shard {} out of range", shard);
        check_adjacency_range(shard, &range, self.adjacency[shard].len())?;
        Ok(Cow::Borrowed(&self.adjacency[shard][range]))
    }

    fn is_resident(&self) -> bool {
        true
    }
}

/// Positional reads on every request.
pub struct StreamedBacking {
    layout: StorageLayout,
    degree_ranges: DegreeRanges,
    shard_edges: Vec<u32>,
}

impl StreamedBacking {
    pub fn new(meta: &GraphMeta) -> Self {
        Self {
            layout: meta.layout.clone(),
            degree_ranges: DegreeRanges::new(meta),
            shard_edges: meta.interval_edges.clone(),
        }
    }
}

impl ShardBacking for StreamedBacking {
    fn degrees(&self, interval: usize) -> StorageResult<Cow<'_, [DegreeEntry]>> {
        let range = self.degree_ranges.get(interval)?;
        let entries = read_records_at(&self.layout.inbound_degrees(), range.start as u64, range.len())?;
        Ok(Cow::Owned(entries))
    }

    fn all_degrees(&self) -> StorageResult<Cow<'_, [DegreeEntry]>> {
        Ok(Cow::Owned(read_records(&self.layout.inbound_degrees())?))
    }

    fn adjacency(&self, shard: usize, range: Range<usize>) -> StorageResult<Cow<'_, [VertexId]>> {
        ensure_invariant!(shard < self.shard_edges.len(), "shard {} out of range", shard);
        check_adjacency_range(shard, &range, self.shard_edges[shard] as usize)?;
        let entries = read_records_at(&self.layout.adjacency(shard), range.start as u64, range.len())?;
        Ok(Cow::Owned(entries))
    }

    fn is_resident(&self) -> bool {
        false
    }
}

/// Pick the backing strategy once for a run.
pub fn open_backing(meta: &GraphMeta, resident: bool) -> StorageResult<Box<dyn ShardBacking>> {
    if resident {
        Ok(Box::new(ResidentBacking::load(meta)?))
    } else {
        Ok(Box::new(StreamedBacking::new(meta)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::PlainEdge;
    use crate::preprocess::sharder::{write_sorted_run, Sharder};
    use tempfile::TempDir;

    fn sharded_graph(temp_dir: &TempDir) -> GraphMeta {
        let layout = StorageLayout::for_input(temp_dir.path(), "g.txt");
        layout.ensure_directories().unwrap();
        let mut edges: Vec<PlainEdge> = (0..12u32)
            .map(|i| PlainEdge { src: (i * 5) % 12, dst: i / 2 })
            .collect();
        edges.sort_by_key(|e| e.dst);
        let run = write_sorted_run(&layout, &edges);
        Sharder::<PlainEdge>::new(&layout, 16, 2).run(&run).unwrap();
        GraphMeta::load(&layout).unwrap()
    }

    #[test]
    fn test_resident_and_streamed_agree() {
        let temp_dir = TempDir::new().unwrap();
        let meta = sharded_graph(&temp_dir);
        assert!(meta.interval_count() > 1);

        let resident = open_backing(&meta, true).unwrap();
        let streamed = open_backing(&meta, false).unwrap();
        assert!(resident.is_resident());
        assert!(!streamed.is_resident());

        assert_eq!(resident.all_degrees().unwrap(), streamed.all_degrees().unwrap());
        for interval in 0..meta.interval_count() {
            assert_eq!(
                resident.degrees(interval).unwrap(),
                streamed.degrees(interval).unwrap()
            );
            let len = meta.interval_edges[interval] as usize;
            assert_eq!(
                resident.adjacency(interval, 1..len).unwrap(),
                streamed.adjacency(interval, 1..len).unwrap()
            );
        }
    }

    #[test]
    fn test_out_of_range_requests_fail() {
        let temp_dir = TempDir::new().unwrap();
        let meta = sharded_graph(&temp_dir);
        let streamed = StreamedBacking::new(&meta);
        let len = meta.interval_edges[0] as usize;

        assert!(streamed.adjacency(0, 0..len + 1).is_err());
        assert!(streamed.degrees(meta.interval_count()).is_err());
    }
}
