//! Vertex-centric execution over interval shards
//!
//! An [`Engine`] is opened on a preprocessed graph folder. Each iteration
//! visits the intervals in increasing order; for each one the
//! [`ShardLoader`] rebuilds the interval's edges from its memory shard and
//! the other shards' sliding windows, then the program's `update` runs in
//! parallel over the interval's scheduled vertices. Graphs with a single
//! interval are loaded once and never reloaded.

pub mod adjacency;
pub mod program;
pub mod scheduler;
pub mod shard;
pub mod vertex;

pub use adjacency::{EdgeSlot, IntervalAdjacency};
pub use program::{Context, EdgeView, Vertex, VertexProgram};
pub use scheduler::Scheduler;
pub use shard::{MemoryShard, PreparedInterval, ShardLoader, SlidingShard};
pub use vertex::VertexStore;

use crate::cache::{BlockCache, CacheError, CachePolicy, CacheStats};
use crate::graph::types::{EdgeValue, FixedRecord};
use crate::preprocess::{default_workers, PreprocessConfig, PreprocessError};
use crate::storage::{open_backing, GraphMeta, IoContext, ShardBacking, StorageError, StorageLayout};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Preprocessing error: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding one `<input>.Folder` per preprocessed input
    pub data_root: PathBuf,
    pub iterations: u32,
    /// Byte budget of the edge payload cache (0 disables it)
    pub cache_bytes: u64,
    pub cache_policy: CachePolicy,
    /// Cache block size in bytes
    pub block_size: u64,
    pub shard_budget_bytes: u64,
    pub sort_buffer_bytes: usize,
    /// Worker threads; 0 means twice the logical CPUs
    pub workers: usize,
    /// Runs merged at once; 0 means `workers`
    pub merge_fan_in: usize,
    /// Vertices per value lock
    pub lock_group_size: usize,
    /// Keep the degree table and adjacency arrays in memory for the whole run
    pub keep_shards_resident: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let preprocess = PreprocessConfig::default();
        Self {
            data_root: PathBuf::from("Files"),
            iterations: 1000,
            cache_bytes: 600 * 1024 * 1024,
            cache_policy: CachePolicy::default(),
            block_size: 64 * 1024 * 1024,
            shard_budget_bytes: preprocess.shard_budget_bytes,
            sort_buffer_bytes: preprocess.sort_buffer_bytes,
            workers: 0,
            merge_fan_in: 0,
            lock_group_size: 4,
            keep_shards_resident: true,
        }
    }
}

impl EngineConfig {
    /// Read settings from a YAML file; absent keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).at("reading", path)?;
        serde_yaml::from_str(&text).map_err(|e| EngineError::Config(format!("{:?}: {}", path, e)))
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.lock_group_size == 0 {
            return Err(EngineError::Config("lock_group_size must be at least 1".into()));
        }
        if self.block_size == 0 || self.block_size % EdgeValue::SIZE as u64 != 0 {
            return Err(EngineError::Config(format!(
                "block_size must be a positive multiple of {} bytes, got {}",
                EdgeValue::SIZE,
                self.block_size
            )));
        }
        if self.shard_budget_bytes == 0 {
            return Err(EngineError::Config("shard_budget_bytes must be at least 1 byte".into()));
        }
        if self.sort_buffer_bytes == 0 {
            return Err(EngineError::Config("sort_buffer_bytes must be at least 1 byte".into()));
        }
        Ok(())
    }

    /// Worker count with 0 resolved
    pub fn worker_count(&self) -> usize {
        match self.workers {
            0 => default_workers(),
            n => n,
        }
    }

    pub fn preprocess_config(&self) -> PreprocessConfig {
        let workers = self.worker_count();
        PreprocessConfig {
            shard_budget_bytes: self.shard_budget_bytes,
            sort_buffer_bytes: self.sort_buffer_bytes,
            workers,
            merge_fan_in: match self.merge_fan_in {
                0 => workers.max(2),
                n => n.max(2),
            },
        }
    }

    /// Folder of `input` under `data_root`
    pub fn layout_for(&self, input: &Path) -> StorageLayout {
        StorageLayout::for_input(&self.data_root, input)
    }
}

/// Outcome of [`Engine::run`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Iterations executed
    pub iterations: u32,
    pub intervals: usize,
    pub cache: CacheStats,
    pub elapsed: Duration,
}

/// Executes vertex programs over one preprocessed graph.
pub struct Engine {
    config: EngineConfig,
    meta: GraphMeta,
    backing: Box<dyn ShardBacking>,
    cache: BlockCache,
    values: VertexStore,
    loader: ShardLoader,
    arena: IntervalAdjacency,
    pool: rayon::ThreadPool,
}

impl Engine {
    /// Load the metadata, vertex values and cache of the graph in `layout`.
    pub fn open(layout: &StorageLayout, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let started = Instant::now();
        let meta = GraphMeta::load(layout)?;
        let backing = open_backing(&meta, config.keep_shards_resident)?;
        let cache = BlockCache::open(
            &meta,
            config.cache_bytes,
            config.block_size,
            config.cache_policy,
            backing.as_ref(),
        )?;
        let values = VertexStore::load(&layout.vertex_data(), meta.vertex_count(), config.lock_group_size)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_count())
            .thread_name(|i| format!("shardwalk-update-{}", i))
            .build()?;

        info!(
            "Opened graph with {} vertices, {} edges in {} intervals ({:?})",
            meta.vertex_count(),
            meta.edge_count(),
            meta.interval_count(),
            started.elapsed()
        );
        Ok(Self {
            loader: ShardLoader::new(meta.interval_count()),
            config,
            meta,
            backing,
            cache,
            values,
            arena: IntervalAdjacency::new(),
            pool,
        })
    }

    pub fn meta(&self) -> &GraphMeta {
        &self.meta
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn values(&self) -> &VertexStore {
        &self.values
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// Edges of the interval prepared last
    pub fn adjacency(&self) -> &IntervalAdjacency {
        &self.arena
    }

    /// Rebuild the edges of `interval` into the arena.
    pub fn prepare(&mut self, interval: usize) -> EngineResult<PreparedInterval> {
        let started = Instant::now();
        // Shard runs are registered on the engine's pool, not the global one.
        let prepared = self.pool.install(|| {
            self.loader.prepare(
                interval,
                &self.meta,
                self.backing.as_ref(),
                &mut self.cache,
                &mut self.arena,
            )
        })?;
        debug!(
            "Interval {} prepared: {} memory edges, {} sliding edges ({:?})",
            self.meta.intervals[interval],
            prepared.memory_edges,
            prepared.sliding_edges,
            started.elapsed()
        );
        Ok(prepared)
    }

    /// Rewind the sliding shards before a new pass over the intervals.
    pub fn reset_shards(&mut self) {
        self.loader.reset();
    }

    /// Run `program` until the iteration budget is spent, no task is
    /// pending, or the program lowers the budget. Vertex values are written
    /// back to `vertex_data` at the end.
    pub fn run<P: VertexProgram>(&mut self, program: &mut P) -> EngineResult<RunSummary> {
        let started = Instant::now();
        let intervals = self.meta.interval_count();
        let mut ctx = Context::new(self.config.iterations, self.meta.vertex_count());
        info!(
            "Running up to {} iterations over {} interval(s)",
            self.config.iterations, intervals
        );

        if intervals == 1 {
            self.prepare(0)?;
        }
        while ctx.should_continue() {
            ctx.scheduler().clear_pending();
            let iteration_started = Instant::now();
            if intervals > 1 {
                self.reset_shards();
            }
            program.before_iteration(&ctx);

            for index in 0..intervals {
                let interval = self.meta.intervals[index];
                program.before_interval(&interval, &ctx);
                if intervals > 1 {
                    self.prepare(index)?;
                }
                self.exec_update(program, &ctx, index);
                program.after_interval(&interval, &ctx);
            }

            program.after_iteration(&ctx);
            debug!(
                "Iteration {} finished in {:?}",
                ctx.iteration(),
                iteration_started.elapsed()
            );
            ctx.finish_iteration();
        }

        self.values.save(&self.meta.layout.vertex_data())?;
        let summary = RunSummary {
            iterations: ctx.iteration(),
            intervals,
            cache: self.cache.stats(),
            elapsed: started.elapsed(),
        };
        info!(
            "Finished after {} iteration(s) in {:?}; cache hit rate {:.2}% ({}/{})",
            summary.iterations,
            summary.elapsed,
            summary.cache.hit_rate() * 100.0,
            summary.cache.hits,
            summary.cache.lookups
        );
        Ok(summary)
    }

    /// Parallel update pass over the scheduled vertices of `interval`
    fn exec_update<P: VertexProgram>(&self, program: &P, ctx: &Context, interval: usize) {
        let range = self.meta.intervals[interval];
        let values = &self.values;
        let edges = &self.arena;
        self.pool.install(|| {
            (range.first_vid..=range.last_vid)
                .into_par_iter()
                .filter(|&id| ctx.scheduler().is_scheduled(id))
                .for_each(|id| program.update(&Vertex::new(id, values, edges), ctx));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{DegreeEntry, VertexId};
    use crate::preprocess::Preprocessor;
    use parking_lot::Mutex;
    use std::borrow::Cow;
    use std::ops::Range;
    use std::sync::Arc;

    /// Forwards to another backing and records the threads that read shards.
    struct ThreadRecorder {
        inner: Box<dyn ShardBacking>,
        threads: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl ThreadRecorder {
        fn record(&self) {
            let name = std::thread::current().name().map(str::to_string);
            self.threads.lock().push(name);
        }
    }

    impl ShardBacking for ThreadRecorder {
        fn degrees(&self, interval: usize) -> crate::storage::StorageResult<Cow<'_, [DegreeEntry]>> {
            self.record();
            self.inner.degrees(interval)
        }

        fn all_degrees(&self) -> crate::storage::StorageResult<Cow<'_, [DegreeEntry]>> {
            self.inner.all_degrees()
        }

        fn adjacency(&self, shard: usize, range: Range<usize>) -> crate::storage::StorageResult<Cow<'_, [VertexId]>> {
            self.record();
            self.inner.adjacency(shard, range)
        }

        fn is_resident(&self) -> bool {
            self.inner.is_resident()
        }
    }

    #[test]
    fn test_shards_load_on_engine_pool() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let input = temp_dir.path().join("chain.txt");
        let text: String = (0..12).map(|i| format!("{} {}\n", i, i + 1)).collect();
        std::fs::write(&input, text).unwrap();
        let config = EngineConfig {
            data_root: temp_dir.path().join("Files"),
            shard_budget_bytes: 16,
            sort_buffer_bytes: 64,
            workers: 2,
            ..EngineConfig::default()
        };
        let layout = config.layout_for(&input);
        Preprocessor::new(&layout, config.preprocess_config()).run(&input).unwrap();

        let mut engine = Engine::open(&layout, config).unwrap();
        assert!(engine.meta().interval_count() > 1);
        let inner = std::mem::replace(&mut engine.backing, open_backing(&engine.meta, true).unwrap());
        let threads = Arc::new(Mutex::new(Vec::new()));
        engine.backing = Box::new(ThreadRecorder {
            inner,
            threads: Arc::clone(&threads),
        });

        for interval in 0..engine.meta().interval_count() {
            engine.prepare(interval).unwrap();
        }
        let threads = threads.lock().clone();
        assert!(!threads.is_empty());
        assert!(threads
            .iter()
            .all(|name| name.as_deref().is_some_and(|n| n.starts_with("shardwalk-update-"))));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str("iterations: 5\ncache_policy: Indegree\n").unwrap();
        assert_eq!(config.iterations, 5);
        assert_eq!(config.cache_policy, CachePolicy::Indegree);
        assert_eq!(config.cache_bytes, 600 * 1024 * 1024);
        assert_eq!(config.lock_group_size, 4);
        assert!(config.keep_shards_resident);
    }

    #[test]
    fn test_unknown_policy_in_yaml_is_rejected() {
        assert!(serde_yaml::from_str::<EngineConfig>("cache_policy: FIFO\n").is_err());
    }

    #[test]
    fn test_config_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.yaml");
        std::fs::write(&path, "iterations: 7\nworkers: 2\n").unwrap();
        let config = EngineConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.iterations, 7);
        assert_eq!(config.worker_count(), 2);

        std::fs::write(&path, "iterations: many\n").unwrap();
        assert!(matches!(EngineConfig::from_yaml_file(&path), Err(EngineError::Config(_))));
        assert!(matches!(
            EngineConfig::from_yaml_file(&temp_dir.path().join("missing.yaml")),
            Err(EngineError::Storage(_))
        ));
    }

    #[test]
    fn test_validation() {
        let config = EngineConfig {
            lock_group_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
        assert!(EngineConfig::default().validate().is_ok());

        for block_size in [0, 12, 4] {
            let config = EngineConfig {
                block_size,
                ..EngineConfig::default()
            };
            assert!(matches!(config.validate(), Err(EngineError::Config(_))));
        }
        let config = EngineConfig {
            block_size: 24,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_preprocess_config_resolves_workers() {
        let config = EngineConfig {
            workers: 3,
            ..EngineConfig::default()
        };
        let preprocess = config.preprocess_config();
        assert_eq!(preprocess.workers, 3);
        assert_eq!(preprocess.merge_fan_in, 3);
        assert!(EngineConfig::default().worker_count() >= 1);
    }
}
