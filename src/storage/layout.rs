//! Paths of every file produced by preprocessing

use super::{IoContext, StorageResult};
use std::path::{Path, PathBuf};
use tracing::debug;

const SUBDIRECTORIES: [&str; 4] = ["Chunks", "EdgeData", "Shards", "Outbound"];

/// Locates the files of one preprocessed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Folder for `input` under `data_root`: `<data_root>/<file name>.Folder`
    pub fn for_input(data_root: impl AsRef<Path>, input: impl AsRef<Path>) -> Self {
        let name = input
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        Self {
            root: data_root.as_ref().join(format!("{}.Folder", name)),
        }
    }

    /// Use `root` directly as the per-input folder
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the folder and its sub-directories if missing
    pub fn ensure_directories(&self) -> StorageResult<()> {
        std::fs::create_dir_all(&self.root).at("creating directory", &self.root)?;
        for sub in SUBDIRECTORIES {
            let dir = self.root.join(sub);
            if !dir.is_dir() {
                debug!("Creating directory {:?}", dir);
                std::fs::create_dir_all(&dir).at("creating directory", &dir)?;
            }
        }
        Ok(())
    }

    pub fn shards_info(&self) -> PathBuf {
        self.root.join("shards.info")
    }

    pub fn intervals(&self) -> PathBuf {
        self.root.join("intervals.binary")
    }

    pub fn interval_edges(&self) -> PathBuf {
        self.root.join("intervals_edges.binary")
    }

    pub fn inbound_degrees(&self) -> PathBuf {
        self.root.join("inbound_degrees")
    }

    pub fn vertex_data(&self) -> PathBuf {
        self.root.join("vertex_data")
    }

    pub fn outbound(&self, shard: usize) -> PathBuf {
        self.root
            .join("Outbound")
            .join(format!("outbound_indices_{}.binary", shard))
    }

    pub fn adjacency(&self, shard: usize) -> PathBuf {
        self.root.join("Shards").join(format!("shard_{}", shard))
    }

    pub fn edge_data(&self, shard: usize) -> PathBuf {
        self.root.join("EdgeData").join(format!("edgedata_{}", shard))
    }

    pub fn chunk(&self, index: usize) -> PathBuf {
        self.root.join("Chunks").join(format!("chunk_{}", index))
    }
}
