//! On-disk layout of a preprocessed graph
//!
//! A preprocessing run writes everything under one folder per input file:
//! text metadata (`shards.info`), fixed-width binary metadata (`intervals.binary`,
//! `intervals_edges.binary`, `inbound_degrees`), the per-shard arrays under
//! `Shards/`, `Outbound/` and `EdgeData/`, the persisted `vertex_data`, and
//! scratch sort runs under `Chunks/`.

/// Fail with [`StorageError::Invariant`] when `cond` does not hold.
macro_rules! ensure_invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::storage::StorageError::Invariant(format!($($arg)+)).into());
        }
    };
}

pub(crate) use ensure_invariant;

pub mod backing;
pub mod io;
pub mod layout;
pub mod metadata;

pub use backing::{open_backing, ResidentBacking, ShardBacking, StreamedBacking};
pub use io::{RecordReader, RecordWriter};
pub use layout::StorageLayout;
pub use metadata::{GraphMeta, ShardsInfo};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// An operating system call failed on a specific file
    #[error("I/O error while {op} {path:?}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A metadata file exists but cannot be understood
    #[error("Corrupt metadata in {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// A structural invariant of the persisted graph does not hold
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        StorageError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Attach the failing operation and file to a raw `std::io` result.
pub(crate) trait IoContext<T> {
    fn at(self, op: &'static str, path: &Path) -> StorageResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, op: &'static str, path: &Path) -> StorageResult<T> {
        self.map_err(|source| StorageError::Io {
            op,
            path: path.to_path_buf(),
            source,
        })
    }
}
