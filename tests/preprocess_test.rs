use proptest::prelude::*;
use shardwalk::graph::{OutboundEntry, PlainEdge, VertexId};
use shardwalk::preprocess::{ExternalSorter, PreprocessConfig, PreprocessOutcome, Preprocessor};
use shardwalk::storage::io::read_records;
use shardwalk::storage::{GraphMeta, StorageLayout};
use std::path::Path;
use tempfile::TempDir;

fn small_config(shard_budget_bytes: u64) -> PreprocessConfig {
    PreprocessConfig {
        shard_budget_bytes,
        sort_buffer_bytes: 64,
        workers: 2,
        merge_fan_in: 2,
    }
}

/// Deterministic pseudo-random edge list over `vertices` vertices
fn scrambled_edges(count: u32, vertices: u32) -> Vec<(VertexId, VertexId)> {
    (0..count)
        .map(|i| {
            let src = (i.wrapping_mul(2654435761) >> 7) % vertices;
            let dst = (i.wrapping_mul(40503).wrapping_add(17) >> 3) % vertices;
            (src, dst)
        })
        .collect()
}

fn write_edge_list(dir: &Path, name: &str, edges: &[(VertexId, VertexId)]) -> std::path::PathBuf {
    let path = dir.join(name);
    let text: String = edges.iter().map(|(s, d)| format!("{}\t{}\n", s, d)).collect();
    std::fs::write(&path, text).unwrap();
    path
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn sorted_run_is_a_permutation_ordered_by_destination(
        edges in proptest::collection::vec((0u32..40, 0u32..40), 0..120)
    ) {
        let temp_dir = TempDir::new().unwrap();
        let layout = StorageLayout::at(temp_dir.path().join("g.Folder"));
        layout.ensure_directories().unwrap();

        let mut sorter = ExternalSorter::<PlainEdge>::new(&layout, 64, 2, 2);
        for &(src, dst) in &edges {
            sorter.push(PlainEdge { src, dst }).unwrap();
        }
        let run = sorter.finish().unwrap();
        prop_assert_eq!(run.edges, edges.len() as u64);

        let sorted: Vec<PlainEdge> = read_records(&run.path).unwrap();
        prop_assert!(sorted.windows(2).all(|w| w[0].dst <= w[1].dst));

        let mut expected = edges.clone();
        let mut actual: Vec<(u32, u32)> = sorted.iter().map(|e| (e.src, e.dst)).collect();
        expected.sort_unstable();
        actual.sort_unstable();
        prop_assert_eq!(actual, expected);
    }
}

#[test]
fn test_intervals_partition_the_vertex_space() {
    let temp_dir = TempDir::new().unwrap();
    let edges = scrambled_edges(400, 97);
    let input = write_edge_list(temp_dir.path(), "scrambled.txt", &edges);
    let layout = StorageLayout::for_input(temp_dir.path(), &input);

    let info = Preprocessor::new(&layout, small_config(160)).run(&input).unwrap().info();
    let meta = GraphMeta::load(&layout).unwrap();
    assert!(info.intervals > 1);
    assert_eq!(meta.edge_count(), 400);

    let max_vertex = edges.iter().map(|&(s, d)| s.max(d)).max().unwrap();
    assert_eq!(meta.vertex_count(), max_vertex + 1);

    assert_eq!(meta.intervals[0].first_vid, 0);
    for pair in meta.intervals.windows(2) {
        assert_eq!(pair[1].first_vid, pair[0].last_vid + 1);
    }
    assert_eq!(meta.intervals.last().unwrap().last_vid, max_vertex);
    let total: u64 = meta.interval_edges.iter().map(|&e| e as u64).sum();
    assert_eq!(total, 400);
}

#[test]
fn test_shards_hold_exactly_the_inbound_edges_of_their_interval() {
    let temp_dir = TempDir::new().unwrap();
    let edges = scrambled_edges(300, 61);
    let input = write_edge_list(temp_dir.path(), "shards.txt", &edges);
    let layout = StorageLayout::for_input(temp_dir.path(), &input);
    Preprocessor::new(&layout, small_config(120)).run(&input).unwrap();
    let meta = GraphMeta::load(&layout).unwrap();

    for (shard, interval) in meta.intervals.iter().enumerate() {
        let adjacency: Vec<VertexId> = read_records(&layout.adjacency(shard)).unwrap();
        let outbound: Vec<OutboundEntry> = read_records(&layout.outbound(shard)).unwrap();
        assert_eq!(adjacency.len(), meta.interval_edges[shard] as usize);

        assert_eq!(outbound.first().map(|e| e.offset), Some(0));
        for pair in outbound.windows(2) {
            assert!(pair[0].source < pair[1].source);
            assert!(pair[0].offset < pair[1].offset);
        }
        assert!((outbound.last().unwrap().offset as usize) < adjacency.len());

        let mut stored = Vec::new();
        for (i, run) in outbound.iter().enumerate() {
            let end = outbound.get(i + 1).map(|n| n.offset as usize).unwrap_or(adjacency.len());
            for &dst in &adjacency[run.offset as usize..end] {
                stored.push((run.source, dst));
            }
        }
        let mut expected: Vec<(u32, u32)> = edges
            .iter()
            .copied()
            .filter(|&(_, dst)| interval.contains(dst))
            .collect();
        stored.sort_unstable();
        expected.sort_unstable();
        assert_eq!(stored, expected, "shard {}", shard);
    }
}

#[test]
fn test_unchanged_input_is_not_reprocessed() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_edge_list(temp_dir.path(), "stable.txt", &scrambled_edges(200, 50));
    let layout = StorageLayout::for_input(temp_dir.path(), &input);
    let preprocessor = Preprocessor::new(&layout, small_config(100));

    let first = preprocessor.run(&input).unwrap();
    assert!(matches!(first, PreprocessOutcome::Rebuilt(_)));
    let snapshot: Vec<Vec<u8>> = (0..first.info().intervals)
        .map(|i| std::fs::read(layout.adjacency(i)).unwrap())
        .collect();
    let stamp = std::fs::metadata(layout.shards_info()).unwrap().modified().unwrap();

    let second = preprocessor.run(&input).unwrap();
    assert_eq!(second, PreprocessOutcome::Reused(first.info()));
    for (i, bytes) in snapshot.iter().enumerate() {
        assert_eq!(&std::fs::read(layout.adjacency(i)).unwrap(), bytes);
    }
    assert_eq!(std::fs::metadata(layout.shards_info()).unwrap().modified().unwrap(), stamp);
}

#[test]
fn test_malformed_line_reports_its_number() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("broken.txt");
    std::fs::write(&input, "# header\n0 1\n1 2\n2 x\n").unwrap();
    let layout = StorageLayout::for_input(temp_dir.path(), &input);

    let err = Preprocessor::new(&layout, small_config(64)).run(&input).unwrap_err();
    assert!(err.to_string().contains("line 4"), "{}", err);
}
