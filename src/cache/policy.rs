//! Eviction policies of the block cache

use super::BlockLayout;
use crate::graph::types::{OutboundEntry, VertexId};
use crate::storage::StorageResult;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// Global block number
pub type BlockId = u32;

/// Result of offering a block to the cache
#[derive(Debug, PartialEq)]
pub enum Admission {
    /// The block is resident; `evicted` names the block it displaced
    Admitted { evicted: Option<BlockId> },
    /// The block was not retained and its bytes are handed back
    Rejected(Vec<u8>),
}

/// Eviction policy plus the resident blocks it orders.
pub enum EvictionPolicy {
    /// Strict LRU: insert at the front, evict from the back, hits move to
    /// the front
    Recency { blocks: LruCache<BlockId, Vec<u8>> },
    /// Static priority per block; residents kept in descending priority
    Indegree {
        blocks: HashMap<BlockId, Vec<u8>>,
        /// Resident block ids, highest priority first
        order: Vec<BlockId>,
        priorities: Vec<f64>,
        capacity: usize,
    },
}

impl EvictionPolicy {
    pub fn recency(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        EvictionPolicy::Recency {
            blocks: LruCache::new(capacity),
        }
    }

    /// `priorities[b]` is the static priority of block `b`
    pub fn indegree(capacity: usize, priorities: Vec<f64>) -> Self {
        EvictionPolicy::Indegree {
            blocks: HashMap::new(),
            order: Vec::new(),
            priorities,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            EvictionPolicy::Recency { blocks } => blocks.cap().get(),
            EvictionPolicy::Indegree { capacity, .. } => *capacity,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EvictionPolicy::Recency { blocks } => blocks.len(),
            EvictionPolicy::Indegree { blocks, .. } => blocks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    pub fn contains(&self, block: BlockId) -> bool {
        match self {
            EvictionPolicy::Recency { blocks } => blocks.contains(&block),
            EvictionPolicy::Indegree { blocks, .. } => blocks.contains_key(&block),
        }
    }

    /// Bytes of a resident block, without touching its priority
    pub fn peek(&self, block: BlockId) -> Option<&[u8]> {
        match self {
            EvictionPolicy::Recency { blocks } => blocks.peek(&block).map(Vec::as_slice),
            EvictionPolicy::Indegree { blocks, .. } => blocks.get(&block).map(Vec::as_slice),
        }
    }

    /// Refresh the priority of a resident block after a hit.
    pub fn touch(&mut self, block: BlockId) {
        match self {
            EvictionPolicy::Recency { blocks } => blocks.promote(&block),
            // static priorities
            EvictionPolicy::Indegree { .. } => {}
        }
    }

    /// Offer a block that just missed, evicting one resident if needed.
    pub fn insert(&mut self, block: BlockId, data: Vec<u8>) -> Admission {
        match self {
            EvictionPolicy::Recency { blocks } => {
                let evicted = blocks.push(block, data).and_then(|(id, _)| {
                    // `push` also returns the old value when the key was present
                    (id != block).then_some(id)
                });
                Admission::Admitted { evicted }
            }
            EvictionPolicy::Indegree {
                blocks,
                order,
                priorities,
                capacity,
            } => {
                let priority = priorities.get(block as usize).copied().unwrap_or(0.0);
                let mut evicted = None;
                if blocks.len() >= *capacity {
                    let Some(&lowest) = order.last() else {
                        return Admission::Rejected(data);
                    };
                    let lowest_priority = priorities.get(lowest as usize).copied().unwrap_or(0.0);
                    if priority <= lowest_priority {
                        return Admission::Rejected(data);
                    }
                    order.pop();
                    blocks.remove(&lowest);
                    evicted = Some(lowest);
                }
                let position = order
                    .iter()
                    .position(|&b| priorities.get(b as usize).copied().unwrap_or(0.0) < priority)
                    .unwrap_or(order.len());
                order.insert(position, block);
                blocks.insert(block, data);
                Admission::Admitted { evicted }
            }
        }
    }

    /// Resident block ids from most to least valuable
    pub fn resident(&self) -> Vec<BlockId> {
        match self {
            EvictionPolicy::Recency { blocks } => blocks.iter().map(|(&id, _)| id).collect(),
            EvictionPolicy::Indegree { order, .. } => order.clone(),
        }
    }
}

/// Static priority of every block.
///
/// For a block covering adjacency elements `[start, end]` of shard `i`, the
/// priority is the summed inbound degree of the distinct destinations in that
/// range divided by the number of outbound runs (distinct sources) the range
/// intersects.
pub fn indegree_priorities<F>(
    blocks: &BlockLayout,
    indegree: &[u32],
    outbound: &[Vec<OutboundEntry>],
    mut adjacency: F,
) -> StorageResult<Vec<f64>>
where
    F: FnMut(usize, std::ops::Range<usize>) -> StorageResult<Vec<VertexId>>,
{
    let per_block = blocks.elements_per_block();
    let mut priorities = vec![0.0; blocks.total_blocks() as usize];

    for shard in 0..blocks.shard_count() {
        let edges = blocks.shard_elements(shard);
        let runs = &outbound[shard];
        let mut run = 0usize;
        for (local, block) in blocks.blocks_of(shard).enumerate() {
            let start = local * per_block;
            let end = ((local + 1) * per_block).min(edges);
            if start >= end {
                continue;
            }

            let mut destinations = adjacency(shard, start..end)?;
            destinations.sort_unstable();
            destinations.dedup();
            let weight: f64 = destinations
                .iter()
                .map(|&v| indegree.get(v as usize).copied().unwrap_or(0) as f64)
                .sum();

            // Runs are ordered by offset; skip those ending before `start`.
            while run + 1 < runs.len() && (runs[run + 1].offset as usize) <= start {
                run += 1;
            }
            let mut last = run;
            while last + 1 < runs.len() && (runs[last + 1].offset as usize) < end {
                last += 1;
            }
            let sources = (last - run + 1) as f64;
            priorities[block as usize] = weight / sources;
        }
    }
    Ok(priorities)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(fill: u8) -> Vec<u8> {
        vec![fill; 8]
    }

    #[test]
    fn test_recency_evicts_least_recent() {
        let mut policy = EvictionPolicy::recency(2);
        assert_eq!(policy.insert(1, block(1)), Admission::Admitted { evicted: None });
        assert_eq!(policy.insert(2, block(2)), Admission::Admitted { evicted: None });
        assert!(policy.is_full());

        policy.touch(1);
        assert_eq!(policy.insert(3, block(3)), Admission::Admitted { evicted: Some(2) });
        assert_eq!(policy.resident(), vec![3, 1]);
        assert_eq!(policy.peek(1), Some(&block(1)[..]));
    }

    #[test]
    fn test_indegree_higher_block_displaces_lower() {
        // block 0 = A (high), block 1 = B (low)
        let mut policy = EvictionPolicy::indegree(1, vec![5.0, 1.0]);
        assert_eq!(policy.insert(1, block(1)), Admission::Admitted { evicted: None });
        assert_eq!(policy.insert(0, block(0)), Admission::Admitted { evicted: Some(1) });
        assert_eq!(policy.resident(), vec![0]);
    }

    #[test]
    fn test_indegree_lower_block_is_not_retained() {
        let mut policy = EvictionPolicy::indegree(1, vec![5.0, 1.0]);
        policy.insert(0, block(0));
        assert_eq!(policy.insert(1, block(1)), Admission::Rejected(block(1)));
        assert_eq!(policy.resident(), vec![0]);
        assert!(!policy.contains(1));
    }

    #[test]
    fn test_indegree_equal_priority_is_rejected_when_full() {
        let mut policy = EvictionPolicy::indegree(1, vec![2.0, 2.0]);
        policy.insert(0, block(0));
        assert!(matches!(policy.insert(1, block(1)), Admission::Rejected(_)));
    }

    #[test]
    fn test_indegree_keeps_descending_order() {
        let mut policy = EvictionPolicy::indegree(4, vec![1.0, 3.0, 2.0, 3.0]);
        for id in 0..4 {
            policy.insert(id, block(id as u8));
        }
        // equal priorities keep insertion order
        assert_eq!(policy.resident(), vec![1, 3, 2, 0]);
        policy.touch(0);
        assert_eq!(policy.resident(), vec![1, 3, 2, 0]);
    }

    #[test]
    fn test_priorities_from_degrees_and_runs() {
        // One shard, 4 elements, 2 elements per block (16-byte blocks).
        let blocks = BlockLayout::new(16, &[32]);
        let indegree = vec![0, 4, 2, 1];
        let outbound = vec![vec![
            OutboundEntry { source: 0, offset: 0 },
            OutboundEntry { source: 5, offset: 1 },
            OutboundEntry { source: 6, offset: 2 },
        ]];
        let adjacency = [1u32, 1, 2, 3];
        let priorities = indegree_priorities(&blocks, &indegree, &outbound, |_, range| {
            Ok(adjacency[range].to_vec())
        })
        .unwrap();

        // block 0: destination {1} -> 4, runs {0, 5} -> 2
        // block 1: destinations {2, 3} -> 3, runs {6} -> 1
        assert_eq!(priorities, vec![2.0, 3.0]);
    }
}
