//! Vertex values shared by every update callback of a pass

use crate::graph::types::{VertexId, VertexValue};
use crate::storage::io::{read_records, write_records};
use crate::storage::{ensure_invariant, StorageResult};
use parking_lot::Mutex;
use std::path::Path;

/// Vertex values behind striped locks.
///
/// Stripe `s` owns vertices `[s * group, (s + 1) * group)`; reads and writes
/// of a value both take its stripe lock.
pub struct VertexStore {
    stripes: Vec<Mutex<Vec<VertexValue>>>,
    group: usize,
    len: usize,
}

impl VertexStore {
    pub fn new(values: Vec<VertexValue>, group: usize) -> Self {
        let group = group.max(1);
        let len = values.len();
        let stripes = values
            .chunks(group)
            .map(|chunk| Mutex::new(chunk.to_vec()))
            .collect();
        Self { stripes, group, len }
    }

    /// Read the persisted `vertex_data` array of `vertex_count` values.
    pub fn load(path: &Path, vertex_count: u32, group: usize) -> StorageResult<Self> {
        let values: Vec<VertexValue> = read_records(path)?;
        ensure_invariant!(
            values.len() == vertex_count as usize,
            "{:?} holds {} values for {} vertices",
            path,
            values.len(),
            vertex_count
        );
        Ok(Self::new(values, group))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// Value of `vertex`
    ///
    /// # Panics
    /// If `vertex` is out of range.
    pub fn get(&self, vertex: VertexId) -> VertexValue {
        let index = vertex as usize;
        assert!(index < self.len, "vertex {} out of range ({} vertices)", vertex, self.len);
        self.stripes[index / self.group].lock()[index % self.group]
    }

    /// # Panics
    /// If `vertex` is out of range.
    pub fn set(&self, vertex: VertexId, value: VertexValue) {
        let index = vertex as usize;
        assert!(index < self.len, "vertex {} out of range ({} vertices)", vertex, self.len);
        self.stripes[index / self.group].lock()[index % self.group] = value;
    }

    /// Copy of every value in vertex order
    pub fn snapshot(&self) -> Vec<VertexValue> {
        let mut values = Vec::with_capacity(self.len);
        for stripe in &self.stripes {
            values.extend_from_slice(&stripe.lock());
        }
        values
    }

    pub fn save(&self, path: &Path) -> StorageResult<()> {
        write_records(path, &self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_across_stripes() {
        let store = VertexStore::new(vec![0.0; 10], 4);
        assert_eq!(store.stripe_count(), 3);
        store.set(9, 2.5);
        store.set(3, -1.0);
        assert_eq!(store.get(9), 2.5);
        assert_eq!(store.get(3), -1.0);
        assert_eq!(store.snapshot().len(), 10);
    }

    #[test]
    fn test_parallel_writes() {
        let store = VertexStore::new(vec![0.0; 1000], 4);
        (0..1000u32).into_par_iter().for_each(|v| store.set(v, v as f64));
        assert!((0..1000u32).all(|v| store.get(v) == v as f64));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vertex_data");
        let store = VertexStore::new(vec![1.0, 2.0, 3.0], 2);
        store.save(&path).unwrap();

        let loaded = VertexStore::load(&path, 3, 4).unwrap();
        assert_eq!(loaded.snapshot(), vec![1.0, 2.0, 3.0]);
        assert!(VertexStore::load(&path, 4, 4).is_err());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_read_panics() {
        VertexStore::new(vec![0.0; 2], 4).get(2);
    }
}
