//! Shardwalk
//!
//! Out-of-core, vertex-centric graph computation. A raw edge list is sorted
//! by destination with an external merge sort, cut into intervals of vertices
//! whose inbound edges fit one shard, and then iterated: each interval in
//! turn becomes the memory shard while every other shard contributes only the
//! window of edges leaving that interval.
//!
//! # Architecture
//!
//! - [`preprocess`]: edge-list parsing, [`ExternalSorter`], [`Sharder`] and
//!   the staleness check that reuses a previous run's shards
//! - [`storage`]: on-disk layout, record I/O and the run metadata
//! - [`cache`]: block cache over the edge payload files
//! - [`engine`]: shard loading, scheduling and the iteration loop
//!
//! ## Example Usage
//!
//! ```no_run
//! use shardwalk::engine::{Context, Engine, EngineConfig, Vertex, VertexProgram};
//! use shardwalk::preprocess::Preprocessor;
//! use std::path::Path;
//!
//! struct MinLabel;
//!
//! impl VertexProgram for MinLabel {
//!     fn update(&self, vertex: &Vertex<'_>, ctx: &Context) {
//!         if ctx.iteration() == 0 {
//!             vertex.set_value(vertex.id() as f64);
//!         }
//!         let label = vertex.edges().map(|e| e.neighbor_value()).fold(vertex.value(), f64::min);
//!         vertex.set_value(label);
//!     }
//! }
//!
//! let input = Path::new("graph.txt");
//! let config = EngineConfig::default();
//! let layout = config.layout_for(input);
//! Preprocessor::new(&layout, config.preprocess_config()).run(input).unwrap();
//!
//! let mut engine = Engine::open(&layout, config).unwrap();
//! let summary = engine.run(&mut MinLabel).unwrap();
//! println!("{} iterations", summary.iterations);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod engine;
pub mod graph;
pub mod preprocess;
pub mod storage;

pub use cache::{BlockCache, CacheError, CacheMode, CachePolicy, CacheResult, CacheStats};
pub use engine::{
    Context, EdgeView, Engine, EngineConfig, EngineError, EngineResult, RunSummary, Scheduler,
    Vertex, VertexProgram,
};
pub use graph::{EdgeValue, Interval, VertexId, VertexValue};
pub use preprocess::{
    ExternalSorter, PreprocessConfig, PreprocessError, PreprocessOutcome, PreprocessResult,
    Preprocessor, Sharder,
};
pub use storage::{GraphMeta, ShardsInfo, StorageError, StorageLayout, StorageResult};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
