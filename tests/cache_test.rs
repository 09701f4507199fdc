use shardwalk::cache::{BlockCache, CacheMode, CachePolicy};
use shardwalk::graph::EdgeValue;
use shardwalk::preprocess::{PreprocessConfig, Preprocessor};
use shardwalk::storage::io::{read_bytes_at, read_records};
use shardwalk::storage::{open_backing, GraphMeta, StorageLayout};
use tempfile::TempDir;

fn valued_graph(temp_dir: &TempDir, text: &str, shard_budget_bytes: u64) -> GraphMeta {
    let input = temp_dir.path().join("valued.txt");
    std::fs::write(&input, text).unwrap();
    let layout = StorageLayout::for_input(temp_dir.path(), &input);
    let config = PreprocessConfig {
        shard_budget_bytes,
        sort_buffer_bytes: 128,
        workers: 2,
        merge_fan_in: 2,
    };
    Preprocessor::new(&layout, config).run(&input).unwrap();
    GraphMeta::load(&layout).unwrap()
}

fn ring_text(vertices: u32) -> String {
    (0..vertices)
        .map(|i| format!("{} {} {}.5\n", i, (i * 7 + 3) % vertices, i))
        .collect()
}

fn open_cache(meta: &GraphMeta, budget: u64, block_size: u64, policy: CachePolicy) -> BlockCache {
    let backing = open_backing(meta, true).unwrap();
    BlockCache::open(meta, budget, block_size, policy, backing.as_ref()).unwrap()
}

#[test]
fn test_full_cache_never_misses() {
    let temp_dir = TempDir::new().unwrap();
    let meta = valued_graph(&temp_dir, &ring_text(64), 64);
    let mut cache = open_cache(&meta, 1 << 20, 24, CachePolicy::Lru);
    assert_eq!(cache.mode(), CacheMode::Full);
    assert_eq!(cache.resident_blocks() as u32, cache.blocks().total_blocks());

    for shard in 0..meta.interval_count() {
        let edges = meta.interval_edges[shard] as usize;
        for first in 0..edges {
            cache.fetch_values(shard, first, edges - first).unwrap();
        }
    }
    let stats = cache.stats();
    assert!(stats.lookups > 0);
    assert_eq!(stats.hits, stats.lookups);
    assert_eq!(stats.hit_rate(), 1.0);
}

#[test]
fn test_disabled_cache_matches_direct_reads() {
    let temp_dir = TempDir::new().unwrap();
    let meta = valued_graph(&temp_dir, &ring_text(40), 48);
    let mut cache = open_cache(&meta, 0, 16, CachePolicy::Indegree);
    assert_eq!(cache.mode(), CacheMode::Disabled);

    for shard in 0..meta.interval_count() {
        let path = meta.layout.edge_data(shard);
        let bytes = meta.interval_edges[shard] as u64 * 8;
        for start in 0..=bytes {
            for end in start..=bytes {
                let direct = read_bytes_at(&path, start, (end - start) as usize).unwrap();
                assert_eq!(cache.fetch(shard, start, end).unwrap(), direct);
            }
        }
    }
    assert_eq!(cache.stats().lookups, 0);
}

#[test]
fn test_partial_cache_serves_file_contents_within_capacity() {
    let temp_dir = TempDir::new().unwrap();
    let meta = valued_graph(&temp_dir, &ring_text(80), 64);
    for policy in [CachePolicy::Lru, CachePolicy::Indegree] {
        let mut cache = open_cache(&meta, 48, 16, policy);
        assert_eq!(cache.mode(), CacheMode::Partial);
        assert_eq!(cache.capacity(), 3);

        for round in 0..3 {
            for shard in (0..meta.interval_count()).rev() {
                let expected: Vec<EdgeValue> = read_records(&meta.layout.edge_data(shard)).unwrap();
                let first = round % expected.len().max(1);
                let values = cache.fetch_values(shard, first, expected.len() - first).unwrap();
                assert_eq!(values, expected[first..]);
                assert!(cache.resident_blocks() <= cache.capacity());
            }
        }
    }
}

/// Three single-payload blocks: destinations {3}, {3}, {2} with indegrees
/// 2 and 1, so block 0 outranks block 2.
fn ranked_blocks(temp_dir: &TempDir) -> GraphMeta {
    let meta = valued_graph(temp_dir, "0 3 0.5\n1 3 1.5\n2 2 2.5\n", 1024);
    assert_eq!(meta.interval_count(), 1);
    meta
}

#[test]
fn test_indegree_cache_replaces_lower_block() {
    let temp_dir = TempDir::new().unwrap();
    let meta = ranked_blocks(&temp_dir);
    let mut cache = open_cache(&meta, 8, 8, CachePolicy::Indegree);
    assert_eq!(cache.capacity(), 1);

    assert_eq!(cache.fetch_values(0, 2, 1).unwrap(), vec![2.5]);
    assert_eq!(cache.resident(), vec![2]);
    assert_eq!(cache.fetch_values(0, 0, 1).unwrap(), vec![0.5]);
    assert_eq!(cache.resident(), vec![0]);
}

#[test]
fn test_indegree_cache_keeps_higher_block() {
    let temp_dir = TempDir::new().unwrap();
    let meta = ranked_blocks(&temp_dir);
    let mut cache = open_cache(&meta, 8, 8, CachePolicy::Indegree);

    cache.fetch_values(0, 0, 1).unwrap();
    assert_eq!(cache.fetch_values(0, 2, 1).unwrap(), vec![2.5]);
    assert_eq!(cache.resident(), vec![0]);

    // block 2 was not retained, block 0 still hits
    cache.fetch_values(0, 2, 1).unwrap();
    cache.fetch_values(0, 0, 1).unwrap();
    assert_eq!(cache.stats().hits, 1);
}
