//! Component sizes from a finished labelling run

use serde::Serialize;
use shardwalk::storage::io::read_records;
use shardwalk::{StorageLayout, StorageResult, VertexValue};
use std::collections::HashMap;

/// One component and the number of vertices carrying its label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComponentSize {
    pub label: u32,
    pub size: u32,
}

/// The `vertex_data` array persisted by the last run in `layout`
pub fn load_vertex_values(layout: &StorageLayout) -> StorageResult<Vec<VertexValue>> {
    read_records(&layout.vertex_data())
}

/// Components with at least two vertices, largest first (ties by label).
pub fn component_summary(values: &[VertexValue]) -> Vec<ComponentSize> {
    let mut sizes: HashMap<u32, u32> = HashMap::new();
    for &value in values {
        if value >= 0.0 {
            *sizes.entry(value as u32).or_default() += 1;
        }
    }
    let mut components: Vec<ComponentSize> = sizes
        .into_iter()
        .filter(|&(_, size)| size >= 2)
        .map(|(label, size)| ComponentSize { label, size })
        .collect();
    components.sort_by(|a, b| b.size.cmp(&a.size).then(a.label.cmp(&b.label)));
    components
}
