//! Block cache over the per-shard edge payload files
//!
//! Payload files are cut into fixed-size blocks numbered globally: the blocks
//! of shard `i` start at the running sum of the block counts of shards
//! `0..i`. The cache runs in one of three modes chosen from the byte budget:
//! disabled (every fetch reads the file), full (every block loaded up front)
//! or partial (blocks loaded on miss and evicted by the configured policy).

pub mod policy;

pub use policy::{indegree_priorities, Admission, BlockId, EvictionPolicy};

use crate::graph::types::{Degree, EdgeValue, FixedRecord};
use crate::storage::io::{file_len, read_bytes_at};
use crate::storage::{ensure_invariant, GraphMeta, ShardBacking, StorageError, StorageLayout, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use sysinfo::System;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Unknown cache policy {0:?} (expected LRU or Indegree)")]
    UnknownPolicy(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Eviction policy name accepted in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CachePolicy {
    #[default]
    #[serde(rename = "LRU", alias = "lru")]
    Lru,
    #[serde(rename = "Indegree", alias = "indegree")]
    Indegree,
}

impl FromStr for CachePolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(CachePolicy::Lru),
            "indegree" => Ok(CachePolicy::Indegree),
            _ => Err(CacheError::UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachePolicy::Lru => write!(f, "LRU"),
            CachePolicy::Indegree => write!(f, "Indegree"),
        }
    }
}

/// Operating mode derived from the budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Disabled,
    Full,
    Partial,
}

/// Lookup counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub lookups: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

/// Block numbering of every shard's payload file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    block_size: u64,
    file_bytes: Vec<u64>,
    bases: Vec<BlockId>,
    total: BlockId,
}

impl BlockLayout {
    /// `block_size` is rounded down to whole payload values, at least one.
    pub fn new(block_size: u64, file_bytes: &[u64]) -> Self {
        let value = EdgeValue::SIZE as u64;
        let block_size = (block_size / value).max(1) * value;
        let mut bases = Vec::with_capacity(file_bytes.len());
        let mut total: BlockId = 0;
        for &bytes in file_bytes {
            bases.push(total);
            total += bytes.div_ceil(block_size) as BlockId;
        }
        Self {
            block_size,
            file_bytes: file_bytes.to_vec(),
            bases,
            total,
        }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn shard_count(&self) -> usize {
        self.file_bytes.len()
    }

    pub fn total_blocks(&self) -> BlockId {
        self.total
    }

    pub fn total_bytes(&self) -> u64 {
        self.file_bytes.iter().sum()
    }

    /// Payload elements per full block
    pub fn elements_per_block(&self) -> usize {
        (self.block_size / EdgeValue::SIZE as u64) as usize
    }

    /// Payload elements of `shard`
    pub fn shard_elements(&self, shard: usize) -> usize {
        (self.file_bytes[shard] / EdgeValue::SIZE as u64) as usize
    }

    /// Global ids of the blocks of `shard`
    pub fn blocks_of(&self, shard: usize) -> Range<BlockId> {
        let base = self.bases[shard];
        let end = self.bases.get(shard + 1).copied().unwrap_or(self.total);
        base..end
    }

    /// Blocks touched by bytes `[start, end)` of `shard`'s payload file
    pub fn blocks_for(&self, shard: usize, start: u64, end: u64) -> Range<BlockId> {
        if start >= end {
            return self.bases[shard]..self.bases[shard];
        }
        let base = self.bases[shard];
        let first = base + (start / self.block_size) as BlockId;
        let last = base + ((end - 1) / self.block_size) as BlockId;
        first..last + 1
    }

    /// Shard, file offset and length of a block
    pub fn locate(&self, block: BlockId) -> (usize, u64, usize) {
        let shard = self.bases.partition_point(|&base| base <= block) - 1;
        let offset = (block - self.bases[shard]) as u64 * self.block_size;
        let len = (self.file_bytes[shard] - offset).min(self.block_size) as usize;
        (shard, offset, len)
    }
}

enum Residency {
    Disabled,
    Full(HashMap<BlockId, Vec<u8>>),
    Partial(EvictionPolicy),
}

/// Fixed-capacity block cache over the payload files of one graph.
pub struct BlockCache {
    layout: StorageLayout,
    blocks: BlockLayout,
    residency: Residency,
    capacity: usize,
    hits: AtomicU64,
    lookups: AtomicU64,
}

/// Half of the physical memory, or `None` when it cannot be determined
fn memory_ceiling() -> Option<u64> {
    let mut system = System::new();
    system.refresh_memory();
    match system.total_memory() {
        0 => None,
        total => Some(total / 2),
    }
}

impl BlockCache {
    /// Build the cache for `meta` with a `budget` in bytes.
    ///
    /// `backing` supplies the degree table and adjacency arrays used to
    /// compute indegree priorities; they are read once here and not kept.
    pub fn open(
        meta: &GraphMeta,
        budget: u64,
        block_size: u64,
        policy: CachePolicy,
        backing: &dyn ShardBacking,
    ) -> CacheResult<Self> {
        let file_bytes = (0..meta.interval_count())
            .map(|shard| file_len(&meta.layout.edge_data(shard)))
            .collect::<StorageResult<Vec<u64>>>()?;
        let blocks = BlockLayout::new(block_size, &file_bytes);

        let mut budget = budget;
        if let Some(ceiling) = memory_ceiling() {
            if budget > ceiling {
                warn!(
                    "Cache budget of {} bytes exceeds half of system memory, using {}",
                    budget, ceiling
                );
                budget = ceiling;
            }
        }

        let started = Instant::now();
        let total_bytes = blocks.total_bytes();
        let (residency, capacity) = if budget == 0 {
            (Residency::Disabled, 0)
        } else if budget >= total_bytes {
            let mut resident = HashMap::with_capacity(blocks.total_blocks() as usize);
            for block in 0..blocks.total_blocks() {
                resident.insert(block, read_block(&meta.layout, &blocks, block)?);
            }
            (Residency::Full(resident), blocks.total_blocks() as usize)
        } else {
            let capacity = budget.div_ceil(blocks.block_size()) as usize;
            let policy = match policy {
                CachePolicy::Lru => EvictionPolicy::recency(capacity),
                CachePolicy::Indegree => {
                    let priorities = Self::priorities(meta, &blocks, backing)?;
                    EvictionPolicy::indegree(capacity, priorities)
                }
            };
            (Residency::Partial(policy), capacity)
        };

        let cache = Self {
            layout: meta.layout.clone(),
            blocks,
            residency,
            capacity,
            hits: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
        };
        info!(
            "Cache mode {:?} with {} policy: {} of {} blocks ({} bytes each), ready in {:?}",
            cache.mode(),
            policy,
            cache.capacity,
            cache.blocks.total_blocks(),
            cache.blocks.block_size(),
            started.elapsed()
        );
        Ok(cache)
    }

    fn priorities(
        meta: &GraphMeta,
        blocks: &BlockLayout,
        backing: &dyn ShardBacking,
    ) -> StorageResult<Vec<f64>> {
        let mut indegree: Vec<Degree> = vec![0; meta.vertex_count() as usize];
        for entry in backing.all_degrees()?.iter() {
            if let Some(slot) = indegree.get_mut(entry.vertex as usize) {
                *slot = entry.degree;
            }
        }
        indegree_priorities(blocks, &indegree, &meta.outbound, |shard, range| {
            Ok(backing.adjacency(shard, range)?.into_owned())
        })
    }

    pub fn mode(&self) -> CacheMode {
        match self.residency {
            Residency::Disabled => CacheMode::Disabled,
            Residency::Full(_) => CacheMode::Full,
            Residency::Partial(_) => CacheMode::Partial,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode() != CacheMode::Disabled
    }

    /// Maximum resident blocks
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn blocks(&self) -> &BlockLayout {
        &self.blocks
    }

    /// Number of blocks currently held
    pub fn resident_blocks(&self) -> usize {
        match &self.residency {
            Residency::Disabled => 0,
            Residency::Full(blocks) => blocks.len(),
            Residency::Partial(policy) => policy.len(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
        }
    }

    /// Bytes `[byte_start, byte_end)` of the payload file of `interval`.
    pub fn fetch(&mut self, interval: usize, byte_start: u64, byte_end: u64) -> CacheResult<Vec<u8>> {
        ensure_valid_range(&self.blocks, interval, byte_start, byte_end)?;
        let len = (byte_end - byte_start) as usize;
        if len == 0 {
            return Ok(Vec::new());
        }
        if let Residency::Disabled = self.residency {
            let path = self.layout.edge_data(interval);
            return Ok(read_bytes_at(&path, byte_start, len)?);
        }

        let range = self.blocks.blocks_for(interval, byte_start, byte_end);
        let requested = range.len() as u64;
        let mut hits = 0u64;
        let mut out = Vec::with_capacity(len);
        for block in range {
            let (_, offset, block_len) = self.blocks.locate(block);
            let from = byte_start.max(offset) - offset;
            let to = byte_end.min(offset + block_len as u64) - offset;
            let window = from as usize..to as usize;

            match &mut self.residency {
                Residency::Disabled => {
                    out.extend_from_slice(&read_block(&self.layout, &self.blocks, block)?[window]);
                }
                Residency::Full(resident) => {
                    let data = resident.get(&block).ok_or_else(|| {
                        StorageError::Invariant(format!("block {} missing from full cache", block))
                    })?;
                    out.extend_from_slice(&data[window]);
                    hits += 1;
                }
                Residency::Partial(policy) => {
                    if let Some(data) = policy.peek(block) {
                        out.extend_from_slice(&data[window]);
                        policy.touch(block);
                        hits += 1;
                        continue;
                    }
                    let data = read_block(&self.layout, &self.blocks, block)?;
                    out.extend_from_slice(&data[window]);
                    match policy.insert(block, data) {
                        Admission::Admitted { evicted: Some(old) } => {
                            debug!("Block {} evicted by block {}", old, block)
                        }
                        Admission::Admitted { evicted: None } => {}
                        Admission::Rejected(_) => debug!("Block {} read but not retained", block),
                    }
                }
            }
        }
        self.hits.fetch_add(hits, Ordering::Relaxed);
        self.lookups.fetch_add(requested, Ordering::Relaxed);
        debug!("{}/{} hit(s) in interval {}", hits, requested, interval);
        Ok(out)
    }

    /// Payload values `[first, first + count)` of `interval`
    pub fn fetch_values(&mut self, interval: usize, first: usize, count: usize) -> CacheResult<Vec<EdgeValue>> {
        let size = EdgeValue::SIZE as u64;
        let bytes = self.fetch(interval, first as u64 * size, (first + count) as u64 * size)?;
        Ok(crate::graph::types::decode_records(&bytes))
    }

    /// Resident block ids in policy order (partial mode) or id order (full mode)
    pub fn resident(&self) -> Vec<BlockId> {
        match &self.residency {
            Residency::Disabled => Vec::new(),
            Residency::Full(blocks) => {
                let mut ids: Vec<BlockId> = blocks.keys().copied().collect();
                ids.sort_unstable();
                ids
            }
            Residency::Partial(policy) => policy.resident(),
        }
    }
}

fn ensure_valid_range(blocks: &BlockLayout, interval: usize, start: u64, end: u64) -> StorageResult<()> {
    ensure_invariant!(
        interval < blocks.shard_count(),
        "payload request for interval {} of {}",
        interval,
        blocks.shard_count()
    );
    ensure_invariant!(
        start <= end && end <= blocks.file_bytes[interval],
        "payload bytes [{}, {}) outside interval {} of {} bytes",
        start,
        end,
        interval,
        blocks.file_bytes[interval]
    );
    Ok(())
}

fn read_block(layout: &StorageLayout, blocks: &BlockLayout, block: BlockId) -> StorageResult<Vec<u8>> {
    let (shard, offset, len) = blocks.locate(block);
    read_bytes_at(&layout.edge_data(shard), offset, len)
}
