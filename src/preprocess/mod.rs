//! Preprocessing pipeline: edge list -> external sort -> interval shards
//!
//! The pipeline is skipped when a previous run left complete shards that are
//! at least as recent as both the input and the executable.

pub mod parser;
pub mod sharder;
pub mod sort;

pub use parser::{detect_format, EdgeFormat, EdgeListReader};
pub use sharder::{plan_intervals, IntervalPlan, Sharder};
pub use sort::{ExternalSorter, SortedRun};

use crate::graph::types::{EdgeRecord, PlainEdge, ValuedEdge};
use crate::storage::io::modified;
use crate::storage::{ShardsInfo, StorageError, StorageLayout};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Preprocessing errors
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A data line does not match the detected edge format
    #[error("Wrong input format on line {line}: {content:?} (expected \"{expected}\")")]
    MalformedLine {
        line: usize,
        content: String,
        expected: &'static str,
    },

    #[error("Input {0:?} contains no edges")]
    EmptyInput(PathBuf),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type PreprocessResult<T> = Result<T, PreprocessError>;

/// Tuning of the sort and partition phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessConfig {
    /// Default byte budget of one interval's adjacency array
    pub shard_budget_bytes: u64,
    /// In-memory buffer of one external sort chunk
    pub sort_buffer_bytes: usize,
    /// Concurrent chunk writers and shard writers
    pub workers: usize,
    /// Runs merged at once
    pub merge_fan_in: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        let workers = default_workers();
        Self {
            shard_budget_bytes: 64 * 1024 * 1024,
            sort_buffer_bytes: 64 * 1024 * 1024,
            workers,
            merge_fan_in: workers,
        }
    }
}

/// Twice the number of logical CPUs
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

/// Whether the shards on disk came from a previous run or were rebuilt now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessOutcome {
    Reused(ShardsInfo),
    Rebuilt(ShardsInfo),
}

impl PreprocessOutcome {
    pub fn info(&self) -> ShardsInfo {
        match self {
            PreprocessOutcome::Reused(info) | PreprocessOutcome::Rebuilt(info) => *info,
        }
    }
}

/// Drives the sort and partition phases for one input file.
pub struct Preprocessor {
    layout: StorageLayout,
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(layout: &StorageLayout, config: PreprocessConfig) -> Self {
        Self {
            layout: layout.clone(),
            config,
        }
    }

    /// Reuse the shards of a previous run when they are still valid, else
    /// rebuild them from `input`.
    pub fn run(&self, input: &Path) -> PreprocessResult<PreprocessOutcome> {
        self.layout.ensure_directories()?;
        if let Some(info) = self.reusable_shards(input)? {
            info!("Using shards from previous run in {:?}", self.layout.root());
            return Ok(PreprocessOutcome::Reused(info));
        }

        info!("Preprocessing {:?}", input);
        let format = detect_format(input)?;
        let info = match format {
            EdgeFormat::Plain => self.rebuild::<PlainEdge>(input, format)?,
            EdgeFormat::Valued => self.rebuild::<ValuedEdge>(input, format)?,
        };
        Ok(PreprocessOutcome::Rebuilt(info))
    }

    /// `Some` when every artifact of a previous run exists and none of its
    /// inputs changed since.
    pub fn reusable_shards(&self, input: &Path) -> PreprocessResult<Option<ShardsInfo>> {
        let info_path = self.layout.shards_info();
        if !info_path.is_file() {
            debug!("{:?} does not exist", info_path);
            return Ok(None);
        }
        let written = modified(&info_path)?;
        if modified(input)? > written {
            info!("{:?} changed since the last preprocessing run", input);
            return Ok(None);
        }
        if let Ok(exe) = std::env::current_exe() {
            if modified(&exe).map(|t| t > written).unwrap_or(false) {
                info!("Executable is newer than the stored shards");
                return Ok(None);
            }
        }

        let info = match ShardsInfo::read(&info_path) {
            Ok(info) => info,
            Err(e) => {
                warn!("Ignoring unreadable shard metadata: {}", e);
                return Ok(None);
            }
        };
        for shard in 0..info.intervals {
            let files = [
                self.layout.adjacency(shard),
                self.layout.outbound(shard),
                self.layout.edge_data(shard),
            ];
            if let Some(missing) = files.iter().find(|f| !f.is_file()) {
                info!("Shard file {:?} is missing", missing);
                return Ok(None);
            }
        }
        for required in [self.layout.intervals(), self.layout.interval_edges()] {
            if !required.is_file() {
                info!("{:?} is missing", required);
                return Ok(None);
            }
        }
        Ok(Some(info))
    }

    fn rebuild<E: EdgeRecord>(&self, input: &Path, format: EdgeFormat) -> PreprocessResult<ShardsInfo> {
        sharder::clear_chunks(&self.layout)?;

        let started = Instant::now();
        let mut reader = EdgeListReader::open(input, format)?;
        let mut sorter = ExternalSorter::<E>::new(
            &self.layout,
            self.config.sort_buffer_bytes,
            self.config.workers,
            self.config.merge_fan_in,
        );
        while let Some(edge) = reader.next_edge::<E>()? {
            sorter.push(edge)?;
        }
        info!(
            "Parsed {} lines of {:?} in {:?}",
            reader.line_number(),
            input,
            started.elapsed()
        );

        let run = sorter.finish()?;
        if run.edges == 0 {
            run.remove()?;
            return Err(PreprocessError::EmptyInput(input.to_path_buf()));
        }

        let info = Sharder::<E>::new(&self.layout, self.config.shard_budget_bytes, self.config.workers)
            .run(&run)?;
        run.remove()?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> PreprocessConfig {
        PreprocessConfig {
            shard_budget_bytes: 16,
            sort_buffer_bytes: 64,
            workers: 2,
            merge_fan_in: 2,
        }
    }

    #[test]
    fn test_second_run_reuses_shards() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("ring.txt");
        let text: String = (0..20).map(|i| format!("{}\t{}\n", i, (i + 1) % 20)).collect();
        std::fs::write(&input, text).unwrap();

        let layout = StorageLayout::for_input(temp_dir.path().join("Files"), &input);
        let preprocessor = Preprocessor::new(&layout, config());

        let first = preprocessor.run(&input).unwrap();
        assert!(matches!(first, PreprocessOutcome::Rebuilt(_)));
        assert_eq!(first.info().edges, 20);
        assert_eq!(first.info().vertices, 20);

        let second = preprocessor.run(&input).unwrap();
        assert_eq!(second, PreprocessOutcome::Reused(first.info()));
    }

    #[test]
    fn test_newer_input_forces_rebuild() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("path.txt");
        std::fs::write(&input, "0 1\n1 2\n").unwrap();

        let layout = StorageLayout::for_input(temp_dir.path().join("Files"), &input);
        let preprocessor = Preprocessor::new(&layout, config());
        assert_eq!(preprocessor.run(&input).unwrap().info().edges, 2);

        std::fs::write(&input, "0 1\n1 2\n2 3\n").unwrap();
        let later = modified(&layout.shards_info()).unwrap() + std::time::Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(&input)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert!(preprocessor.reusable_shards(&input).unwrap().is_none());

        let rebuilt = preprocessor.run(&input).unwrap();
        assert!(matches!(rebuilt, PreprocessOutcome::Rebuilt(_)));
        assert_eq!(rebuilt.info().edges, 3);
        assert_eq!(rebuilt.info().vertices, 4);
    }

    #[test]
    fn test_missing_shard_forces_rebuild() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("pair.txt");
        std::fs::write(&input, "0 1 0.5\n1 0 0.25\n").unwrap();

        let layout = StorageLayout::for_input(temp_dir.path(), &input);
        let preprocessor = Preprocessor::new(&layout, config());
        preprocessor.run(&input).unwrap();

        std::fs::remove_file(layout.adjacency(0)).unwrap();
        assert!(preprocessor.reusable_shards(&input).unwrap().is_none());
        assert!(matches!(
            preprocessor.run(&input).unwrap(),
            PreprocessOutcome::Rebuilt(_)
        ));
    }

    #[test]
    fn test_comment_only_input_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("empty.txt");
        std::fs::write(&input, "# no edges\n").unwrap();

        let layout = StorageLayout::for_input(temp_dir.path(), &input);
        let result = Preprocessor::new(&layout, config()).run(&input);
        assert!(matches!(result, Err(PreprocessError::EmptyInput(_))));
    }

    #[test]
    fn test_scratch_chunks_are_removed() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("line.txt");
        let text: String = (0..50).map(|i| format!("{} {}\n", i, i + 1)).collect();
        std::fs::write(&input, text).unwrap();

        let layout = StorageLayout::for_input(temp_dir.path(), &input);
        Preprocessor::new(&layout, config()).run(&input).unwrap();
        assert_eq!(std::fs::read_dir(layout.root().join("Chunks")).unwrap().count(), 0);
    }
}
