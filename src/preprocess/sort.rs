//! External sort of edges by destination
//!
//! Ingestion fills a fixed-capacity buffer; each full buffer is sorted and
//! written to its own chunk file by a worker thread while ingestion continues
//! into a recycled buffer. At most `workers` chunk writes are in flight; when
//! every slot is busy, ingestion waits for the oldest one. The chunks are then
//! merged `fan_in` at a time, generation after generation, until one run
//! remains.

use crate::graph::types::{EdgeRecord, VertexId};
use crate::storage::io::{RecordReader, RecordWriter};
use crate::storage::{ensure_invariant, IoContext, StorageError, StorageLayout, StorageResult};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info};

/// The single destination-sorted run produced by [`ExternalSorter::finish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedRun {
    pub path: PathBuf,
    pub edges: u64,
}

impl SortedRun {
    /// Remove the run file once it is no longer needed
    pub fn remove(self) -> StorageResult<()> {
        std::fs::remove_file(&self.path).at("removing", &self.path)
    }
}

type ChunkJob<E> = JoinHandle<StorageResult<Vec<E>>>;

/// Bounded-memory sorter for an unbounded edge stream.
pub struct ExternalSorter<E: EdgeRecord> {
    layout: StorageLayout,
    capacity: usize,
    workers: usize,
    fan_in: usize,
    buffer: Vec<E>,
    spare: Vec<Vec<E>>,
    in_flight: VecDeque<ChunkJob<E>>,
    chunks: Vec<PathBuf>,
    next_chunk: usize,
    total: u64,
    started: Instant,
}

impl<E: EdgeRecord> ExternalSorter<E> {
    /// `buffer_bytes / E::SIZE` records are sorted in memory at a time.
    pub fn new(layout: &StorageLayout, buffer_bytes: usize, workers: usize, fan_in: usize) -> Self {
        let capacity = (buffer_bytes / E::SIZE).max(1);
        debug!(
            "External sort: {} records per chunk, {} workers, fan-in {}",
            capacity, workers, fan_in
        );
        Self {
            layout: layout.clone(),
            capacity,
            workers: workers.max(1),
            fan_in: fan_in.max(2),
            buffer: Vec::with_capacity(capacity),
            spare: Vec::new(),
            in_flight: VecDeque::new(),
            chunks: Vec::new(),
            next_chunk: 0,
            total: 0,
            started: Instant::now(),
        }
    }

    /// Records held in memory per chunk
    pub fn chunk_capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, edge: E) -> StorageResult<()> {
        self.buffer.push(edge);
        self.total += 1;
        if self.buffer.len() == self.capacity {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn next_chunk_path(&mut self) -> PathBuf {
        let path = self.layout.chunk(self.next_chunk);
        self.next_chunk += 1;
        path
    }

    fn flush_chunk(&mut self) -> StorageResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if self.in_flight.len() == self.workers {
            self.join_oldest()?;
        }
        let replacement = self
            .spare
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.capacity));
        let full = std::mem::replace(&mut self.buffer, replacement);
        let path = self.next_chunk_path();
        debug!("Flushing chunk {:?} with {} edges", path, full.len());
        self.chunks.push(path.clone());
        self.in_flight
            .push_back(std::thread::spawn(move || write_chunk(full, &path)));
        Ok(())
    }

    fn join_oldest(&mut self) -> StorageResult<()> {
        if let Some(job) = self.in_flight.pop_front() {
            let mut buffer = job
                .join()
                .map_err(|_| StorageError::Invariant("chunk sort worker panicked".into()))??;
            buffer.clear();
            self.spare.push(buffer);
        }
        Ok(())
    }

    /// Flush the partial buffer, wait for every chunk, and merge them into
    /// one destination-sorted run.
    pub fn finish(mut self) -> StorageResult<SortedRun> {
        self.flush_chunk()?;
        while !self.in_flight.is_empty() {
            self.join_oldest()?;
        }
        self.spare.clear();
        info!(
            "Created {} chunks from {} edges in {:?}",
            self.chunks.len(),
            self.total,
            self.started.elapsed()
        );

        let merge_started = Instant::now();
        let mut runs = std::mem::take(&mut self.chunks);
        if runs.is_empty() {
            let path = self.next_chunk_path();
            RecordWriter::<E>::create(&path)?.finish()?;
            runs.push(path);
        }

        let mut pass = 0;
        while runs.len() > 1 {
            pass += 1;
            let mut next_generation = Vec::with_capacity(runs.len() / self.fan_in + 1);
            for group in runs.chunks(self.fan_in) {
                if group.len() == 1 {
                    next_generation.push(group[0].clone());
                    continue;
                }
                let output = self.next_chunk_path();
                merge_runs::<E>(group, &output)?;
                for consumed in group {
                    std::fs::remove_file(consumed).at("removing", consumed)?;
                }
                next_generation.push(output);
            }
            debug!(
                "Merge pass {}: {} runs -> {}",
                pass,
                runs.len(),
                next_generation.len()
            );
            runs = next_generation;
        }

        let run = SortedRun {
            path: runs.remove(0),
            edges: self.total,
        };
        verify_sorted::<E>(&run)?;
        info!(
            "Merged into one run of {} edges in {} passes ({:?})",
            run.edges,
            pass,
            merge_started.elapsed()
        );
        Ok(run)
    }
}

fn write_chunk<E: EdgeRecord>(mut buffer: Vec<E>, path: &Path) -> StorageResult<Vec<E>> {
    buffer.sort_unstable_by_key(|e| e.dst());
    let mut writer = RecordWriter::create(path)?;
    writer.push_all(&buffer)?;
    writer.finish()?;
    Ok(buffer)
}

/// k-way merge of destination-sorted runs; ties resolve by run index.
fn merge_runs<E: EdgeRecord>(inputs: &[PathBuf], output: &Path) -> StorageResult<u64> {
    let mut readers = inputs
        .iter()
        .map(|p| RecordReader::<E>::open(p))
        .collect::<StorageResult<Vec<_>>>()?;
    let mut heads: Vec<Option<E>> = Vec::with_capacity(readers.len());
    let mut heap: BinaryHeap<Reverse<(VertexId, usize)>> = BinaryHeap::new();

    for (run, reader) in readers.iter_mut().enumerate() {
        let head = reader.next_record()?;
        if let Some(edge) = &head {
            heap.push(Reverse((edge.dst(), run)));
        }
        heads.push(head);
    }

    let mut writer = RecordWriter::<E>::create(output)?;
    while let Some(Reverse((_, run))) = heap.pop() {
        if let Some(edge) = heads[run].take() {
            writer.push(&edge)?;
        }
        let next = readers[run].next_record()?;
        if let Some(edge) = &next {
            heap.push(Reverse((edge.dst(), run)));
        }
        heads[run] = next;
    }
    writer.finish()
}

/// Stream the run once, checking order and length.
fn verify_sorted<E: EdgeRecord>(run: &SortedRun) -> StorageResult<()> {
    let mut reader = RecordReader::<E>::open(&run.path)?;
    let mut previous: Option<VertexId> = None;
    let mut count = 0u64;
    while let Some(edge) = reader.next_record()? {
        if let Some(prev) = previous {
            ensure_invariant!(
                edge.dst() >= prev,
                "sorted run out of order at record {}: {} after {}",
                count,
                edge.dst(),
                prev
            );
        }
        previous = Some(edge.dst());
        count += 1;
    }
    ensure_invariant!(
        count == run.edges,
        "sorted run holds {} edges, expected {}",
        count,
        run.edges
    );
    Ok(())
}
