//! Graph metadata persisted by the sharder and loaded once per run

use super::io::{file_len, read_records, write_records};
use super::{IoContext, StorageError, StorageLayout, StorageResult};
use crate::graph::types::{Interval, OutboundEntry, VertexId};
use std::path::Path;
use tracing::debug;

/// Contents of `shards.info`: three text lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardsInfo {
    pub intervals: usize,
    pub edges: u64,
    pub vertices: u32,
}

impl ShardsInfo {
    pub fn write(&self, path: &Path) -> StorageResult<()> {
        let text = format!("{}\n{}\n{}\n", self.intervals, self.edges, self.vertices);
        std::fs::write(path, text).at("writing", path)
    }

    pub fn read(path: &Path) -> StorageResult<Self> {
        let text = std::fs::read_to_string(path).at("reading", path)?;
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let intervals = next_line(&mut lines, path, "interval count")?;
        let edges = next_line(&mut lines, path, "edge count")?;
        let vertices = next_line(&mut lines, path, "vertex count")?;

        let parse_err = |name: &str, raw: &str| {
            StorageError::corrupt(path, format!("invalid {} {:?}", name, raw))
        };
        Ok(Self {
            intervals: intervals
                .parse()
                .map_err(|_| parse_err("interval count", intervals))?,
            edges: edges.parse().map_err(|_| parse_err("edge count", edges))?,
            vertices: vertices
                .parse()
                .map_err(|_| parse_err("vertex count", vertices))?,
        })
    }
}

fn next_line<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    path: &Path,
    name: &str,
) -> StorageResult<&'a str> {
    lines
        .next()
        .ok_or_else(|| StorageError::corrupt(path, format!("missing {} line", name)))
}

/// Check that `intervals` partition `[0, vertex_count)` in order.
pub fn validate_intervals(intervals: &[Interval], vertex_count: u32) -> StorageResult<()> {
    ensure_invariant!(!intervals.is_empty(), "graph has no intervals");
    let mut expected_first: VertexId = 0;
    for (i, interval) in intervals.iter().enumerate() {
        ensure_invariant!(
            interval.first_vid == expected_first && interval.last_vid >= interval.first_vid,
            "interval {} is {} but should start at {}",
            i,
            interval,
            expected_first
        );
        expected_first = interval.last_vid.wrapping_add(1);
    }
    let last = intervals[intervals.len() - 1].last_vid;
    ensure_invariant!(
        last as u64 + 1 == vertex_count as u64,
        "intervals end at {} but the graph has {} vertices",
        last,
        vertex_count
    );
    Ok(())
}

/// Check that an outbound index is strictly increasing in both fields and
/// that its runs partition `[0, edge_count)`.
pub fn validate_outbound(entries: &[OutboundEntry], edge_count: u64) -> StorageResult<()> {
    if edge_count == 0 {
        ensure_invariant!(entries.is_empty(), "empty shard has outbound entries");
        return Ok(());
    }
    ensure_invariant!(
        entries.first().map(|e| e.offset) == Some(0),
        "outbound index does not start at offset 0"
    );
    for pair in entries.windows(2) {
        ensure_invariant!(
            pair[1].source > pair[0].source && pair[1].offset > pair[0].offset,
            "outbound index not strictly increasing at source {}",
            pair[1].source
        );
    }
    let last = entries[entries.len() - 1].offset as u64;
    ensure_invariant!(
        last < edge_count,
        "outbound offset {} beyond shard length {}",
        last,
        edge_count
    );
    Ok(())
}

/// Run context of one preprocessed graph
#[derive(Debug, Clone)]
pub struct GraphMeta {
    pub layout: StorageLayout,
    pub info: ShardsInfo,
    pub intervals: Vec<Interval>,
    /// Inbound edge count of every shard
    pub interval_edges: Vec<u32>,
    /// Outbound index of every shard
    pub outbound: Vec<Vec<OutboundEntry>>,
    /// Index of each interval's first entry in `inbound_degrees`
    pub degree_offsets: Vec<u64>,
}

impl GraphMeta {
    /// Load and cross-check the metadata written by the sharder.
    pub fn load(layout: &StorageLayout) -> StorageResult<Self> {
        let info = ShardsInfo::read(&layout.shards_info())?;
        let intervals: Vec<Interval> = read_records(&layout.intervals())?;
        let interval_edges: Vec<u32> = read_records(&layout.interval_edges())?;

        ensure_invariant!(
            intervals.len() == info.intervals && interval_edges.len() == info.intervals,
            "shards.info lists {} intervals but found {} boundaries and {} edge counts",
            info.intervals,
            intervals.len(),
            interval_edges.len()
        );
        validate_intervals(&intervals, info.vertices)?;

        let total: u64 = interval_edges.iter().map(|&c| c as u64).sum();
        ensure_invariant!(
            total == info.edges,
            "per-interval edge counts sum to {} but shards.info lists {}",
            total,
            info.edges
        );

        let mut outbound = Vec::with_capacity(info.intervals);
        for (shard, &count) in interval_edges.iter().enumerate() {
            let adjacency_len = file_len(&layout.adjacency(shard))?;
            ensure_invariant!(
                adjacency_len == count as u64 * 4,
                "shard {} holds {} bytes, expected {} edges",
                shard,
                adjacency_len,
                count
            );
            let entries: Vec<OutboundEntry> = read_records(&layout.outbound(shard))?;
            validate_outbound(&entries, count as u64)?;
            outbound.push(entries);
        }

        let mut degree_offsets = Vec::with_capacity(info.intervals);
        let mut running = 0u64;
        for interval in &intervals {
            degree_offsets.push(running);
            running += interval.destinations as u64;
        }

        debug!(
            "Loaded metadata for {:?}: {} intervals, {} edges, {} vertices",
            layout.root(),
            info.intervals,
            info.edges,
            info.vertices
        );

        Ok(Self {
            layout: layout.clone(),
            info,
            intervals,
            interval_edges,
            outbound,
            degree_offsets,
        })
    }

    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    pub fn vertex_count(&self) -> u32 {
        self.info.vertices
    }

    pub fn edge_count(&self) -> u64 {
        self.info.edges
    }

    /// Persist interval boundaries and per-interval edge counts.
    pub fn write_intervals(
        layout: &StorageLayout,
        intervals: &[Interval],
        interval_edges: &[u32],
    ) -> StorageResult<()> {
        write_records(&layout.intervals(), intervals)?;
        write_records(&layout.interval_edges(), interval_edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shards_info_text_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shards.info");
        let info = ShardsInfo { intervals: 3, edges: 1200, vertices: 77 };
        info.write(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "3\n1200\n77\n");
        assert_eq!(ShardsInfo::read(&path).unwrap(), info);
    }

    #[test]
    fn test_shards_info_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shards.info");
        std::fs::write(&path, "3\nmany\n").unwrap();
        assert!(matches!(ShardsInfo::read(&path), Err(StorageError::Corrupt { .. })));
    }

    #[test]
    fn test_interval_validation() {
        let good = [Interval::new(0, 3, 2), Interval::new(4, 9, 5)];
        assert!(validate_intervals(&good, 10).is_ok());
        assert!(validate_intervals(&good, 11).is_err());

        let gap = [Interval::new(0, 3, 2), Interval::new(5, 9, 5)];
        assert!(matches!(
            validate_intervals(&gap, 10),
            Err(StorageError::Invariant(_))
        ));
    }

    #[test]
    fn test_outbound_validation() {
        let entries = [
            OutboundEntry { source: 0, offset: 0 },
            OutboundEntry { source: 4, offset: 2 },
            OutboundEntry { source: 9, offset: 3 },
        ];
        assert!(validate_outbound(&entries, 5).is_ok());
        assert!(validate_outbound(&entries, 3).is_err());

        let repeated = [
            OutboundEntry { source: 0, offset: 0 },
            OutboundEntry { source: 0, offset: 2 },
        ];
        assert!(validate_outbound(&repeated, 5).is_err());
        assert!(validate_outbound(&[], 0).is_ok());
    }
}
