//! Record-level file I/O
//!
//! Whole-file and streaming access for the sequential phases (sorting,
//! sharding) and positional access for the loaders and the block cache.

use super::{IoContext, StorageError, StorageResult};
use crate::graph::types::{decode_records, encode_records, FixedRecord};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const STREAM_BUFFER_BYTES: usize = 1 << 20;

/// Create (or truncate) `path` and write `records` to it.
pub fn write_records<R: FixedRecord>(path: &Path, records: &[R]) -> StorageResult<()> {
    let mut file = File::create(path).at("creating", path)?;
    file.write_all(&encode_records(records)).at("writing", path)?;
    Ok(())
}

/// Read every whole record stored in `path`.
pub fn read_records<R: FixedRecord>(path: &Path) -> StorageResult<Vec<R>> {
    let bytes = std::fs::read(path).at("reading", path)?;
    if bytes.len() % R::SIZE != 0 {
        return Err(StorageError::corrupt(
            path,
            format!("length {} is not a multiple of {}", bytes.len(), R::SIZE),
        ));
    }
    Ok(decode_records(&bytes))
}

/// Read `count` records starting at record index `first`.
pub fn read_records_at<R: FixedRecord>(
    path: &Path,
    first: u64,
    count: usize,
) -> StorageResult<Vec<R>> {
    let bytes = read_bytes_at(path, first * R::SIZE as u64, count * R::SIZE)?;
    Ok(decode_records(&bytes))
}

/// Read exactly `len` bytes at byte `offset` of `path`.
pub fn read_bytes_at(path: &Path, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    if len == 0 {
        return Ok(buf);
    }
    let file = File::open(path).at("opening", path)?;
    positional::read_exact_at(&file, &mut buf, offset).at("reading", path)?;
    Ok(buf)
}

/// Overwrite bytes at `offset` of an existing file.
pub fn write_bytes_at(path: &Path, offset: u64, bytes: &[u8]) -> StorageResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .at("opening", path)?;
    positional::write_all_at(&file, bytes, offset).at("writing", path)?;
    Ok(())
}

/// Size of `path` in bytes
pub fn file_len(path: &Path) -> StorageResult<u64> {
    Ok(std::fs::metadata(path).at("inspecting", path)?.len())
}

/// Number of whole `R` records stored in `path`
pub fn record_count<R: FixedRecord>(path: &Path) -> StorageResult<u64> {
    Ok(file_len(path)? / R::SIZE as u64)
}

/// Last modification time of `path`
pub fn modified(path: &Path) -> StorageResult<SystemTime> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .at("inspecting", path)
}

/// Buffered forward reader over a file of fixed-width records.
pub struct RecordReader<R> {
    path: PathBuf,
    reader: BufReader<File>,
    scratch: Vec<u8>,
    _record: PhantomData<R>,
}

impl<R: FixedRecord> RecordReader<R> {
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = File::open(path).at("opening", path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::with_capacity(STREAM_BUFFER_BYTES, file),
            scratch: vec![0u8; R::SIZE],
            _record: PhantomData,
        })
    }

    /// Next record, or `None` at a clean end of file
    pub fn next_record(&mut self) -> StorageResult<Option<R>> {
        let mut filled = 0;
        while filled < R::SIZE {
            let n = self
                .reader
                .read(&mut self.scratch[filled..])
                .at("reading", &self.path)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        match filled {
            0 => Ok(None),
            n if n == R::SIZE => Ok(Some(R::decode(&self.scratch))),
            n => Err(StorageError::corrupt(
                &self.path,
                format!("truncated record ({} of {} bytes)", n, R::SIZE),
            )),
        }
    }

    /// Read up to `max` records
    pub fn next_batch(&mut self, max: usize) -> StorageResult<Vec<R>> {
        let mut batch = Vec::with_capacity(max.min(STREAM_BUFFER_BYTES / R::SIZE + 1));
        while batch.len() < max {
            match self.next_record()? {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        Ok(batch)
    }
}

/// Buffered appender of fixed-width records.
pub struct RecordWriter<R> {
    path: PathBuf,
    writer: BufWriter<File>,
    scratch: Vec<u8>,
    written: u64,
    _record: PhantomData<R>,
}

impl<R: FixedRecord> RecordWriter<R> {
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = File::create(path).at("creating", path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(STREAM_BUFFER_BYTES, file),
            scratch: vec![0u8; R::SIZE],
            written: 0,
            _record: PhantomData,
        })
    }

    pub fn push(&mut self, record: &R) -> StorageResult<()> {
        record.encode(&mut self.scratch);
        self.writer.write_all(&self.scratch).at("writing", &self.path)?;
        self.written += 1;
        Ok(())
    }

    pub fn push_all(&mut self, records: &[R]) -> StorageResult<()> {
        self.writer
            .write_all(&encode_records(records))
            .at("writing", &self.path)?;
        self.written += records.len() as u64;
        Ok(())
    }

    /// Flush and return the number of records written
    pub fn finish(mut self) -> StorageResult<u64> {
        self.writer.flush().at("flushing", &self.path)?;
        Ok(self.written)
    }
}

#[cfg(unix)]
mod positional {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::FileExt;

    pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
        file.read_exact_at(buf, offset)
    }

    pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
        file.write_all_at(buf, offset)
    }
}

#[cfg(windows)]
mod positional {
    use std::fs::File;
    use std::io::{self, ErrorKind};
    use std::os::windows::fs::FileExt;

    pub fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match file.seek_read(buf, offset) {
                Ok(0) => return Err(io::Error::from(ErrorKind::UnexpectedEof)),
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match file.seek_write(buf, offset) {
                Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
                Ok(n) => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
