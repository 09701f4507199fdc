use shardwalk::engine::{Engine, EngineConfig};
use shardwalk::preprocess::Preprocessor;
use shardwalk::StorageLayout;
use shardwalk_programs::{component_summary, load_vertex_values, ComponentSize, ConnectedComponents, ShortestDistance};
use tempfile::TempDir;

fn open(temp_dir: &TempDir, text: &str, shard_budget_bytes: u64) -> (Engine, StorageLayout) {
    let input = temp_dir.path().join("edges.txt");
    std::fs::write(&input, text).unwrap();
    let config = EngineConfig {
        data_root: temp_dir.path().to_path_buf(),
        iterations: 100,
        cache_bytes: 4096,
        block_size: 64,
        shard_budget_bytes,
        sort_buffer_bytes: 128,
        workers: 2,
        ..EngineConfig::default()
    };
    let layout = config.layout_for(&input);
    Preprocessor::new(&layout, config.preprocess_config()).run(&input).unwrap();
    (Engine::open(&layout, config).unwrap(), layout)
}

#[test]
fn test_triangle_converges_to_smallest_label() {
    let temp_dir = TempDir::new().unwrap();
    let (mut engine, layout) = open(&temp_dir, "0 1\n1 2\n2 0\n", 1 << 20);
    assert_eq!(engine.meta().interval_count(), 1);

    let summary = engine.run(&mut ConnectedComponents::new()).unwrap();
    assert!(summary.iterations <= 2);
    assert_eq!(load_vertex_values(&layout).unwrap(), vec![0.0, 0.0, 0.0]);
}

#[test]
fn test_components_across_intervals() {
    let temp_dir = TempDir::new().unwrap();
    // chain 9-8-...-3 written backwards, plus a separate pair 1-2; 0 isolated
    let mut text: String = (3..9).rev().map(|v| format!("{} {}\n", v + 1, v)).collect();
    text.push_str("2 1\n");
    let (mut engine, layout) = open(&temp_dir, &text, 8);
    assert!(engine.meta().interval_count() > 1);

    engine.run(&mut ConnectedComponents::new()).unwrap();
    let values = load_vertex_values(&layout).unwrap();
    assert_eq!(values[0], 0.0);
    assert_eq!(&values[1..3], &[1.0, 1.0]);
    assert!(values[3..].iter().all(|&v| v == 3.0), "{:?}", values);

    assert_eq!(
        component_summary(&values),
        vec![
            ComponentSize { label: 3, size: 7 },
            ComponentSize { label: 1, size: 2 },
        ]
    );
}

#[test]
fn test_distance_along_a_path() {
    let temp_dir = TempDir::new().unwrap();
    let text: String = (0..6).map(|v| format!("{} {}\n", v, v + 1)).collect();
    let (mut engine, _) = open(&temp_dir, &text, 8);

    let mut program = ShortestDistance::new(0, 5);
    engine.run(&mut program).unwrap();
    assert_eq!(program.distance(), Some(5));
}

#[test]
fn test_distance_between_separate_components() {
    let temp_dir = TempDir::new().unwrap();
    let (mut engine, _) = open(&temp_dir, "0 1\n2 3\n3 4\n", 1 << 20);

    let mut program = ShortestDistance::new(0, 4);
    let summary = engine.run(&mut program).unwrap();
    assert_eq!(program.distance(), None);
    assert!(summary.iterations < 100);
}
