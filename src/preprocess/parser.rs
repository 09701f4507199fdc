//! Edge-list text input
//!
//! One edge per line, `<from> <to>` or `<from> <to> <value>`, fields separated
//! by any mix of tabs, spaces and commas. Lines starting with `#` or `%` are
//! comments and blank lines are skipped.

use super::{PreprocessError, PreprocessResult};
use crate::graph::types::{EdgeRecord, EdgeValue, VertexId};
use crate::storage::IoContext;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Whether the edges of an input carry a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeFormat {
    Plain,
    Valued,
}

impl EdgeFormat {
    fn field_count(self) -> usize {
        match self {
            EdgeFormat::Plain => 2,
            EdgeFormat::Valued => 3,
        }
    }

    fn expected(self) -> &'static str {
        match self {
            EdgeFormat::Plain => "<from> <to>",
            EdgeFormat::Valued => "<from> <to> <value>",
        }
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with('%')
}

/// Line text without its terminator; invalid UTF-8 is a malformed line.
fn decode_line<'a>(bytes: &'a [u8], line_number: usize, expected: &'static str) -> PreprocessResult<&'a str> {
    let text = std::str::from_utf8(bytes).map_err(|_| PreprocessError::MalformedLine {
        line: line_number,
        content: String::from_utf8_lossy(bytes).trim_end().to_string(),
        expected,
    })?;
    Ok(text.trim_end_matches(&['\n', '\r'][..]))
}

fn fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c| c == '\t' || c == ' ' || c == ',')
        .filter(|f| !f.is_empty())
}

const ANY_FORMAT: &str = "<from> <to> [<value>]";

/// Pick the format from the field count of the first data line.
pub fn detect_format(path: &Path) -> PreprocessResult<EdgeFormat> {
    let file = File::open(path).at("opening", path)?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    let mut line_number = 0;
    loop {
        bytes.clear();
        if reader.read_until(b'\n', &mut bytes).at("reading", path)? == 0 {
            break;
        }
        line_number += 1;
        let line = decode_line(&bytes, line_number, ANY_FORMAT)?;
        if line.trim().is_empty() || is_comment(line) {
            continue;
        }
        return match fields(line).count() {
            2 => Ok(EdgeFormat::Plain),
            3 => Ok(EdgeFormat::Valued),
            _ => Err(PreprocessError::MalformedLine {
                line: line_number,
                content: line.to_string(),
                expected: ANY_FORMAT,
            }),
        };
    }
    Err(PreprocessError::EmptyInput(path.to_path_buf()))
}

/// Streaming reader of edges from a text edge list.
pub struct EdgeListReader {
    path: PathBuf,
    reader: BufReader<File>,
    format: EdgeFormat,
    line_number: usize,
    line: Vec<u8>,
}

impl EdgeListReader {
    pub fn open(path: &Path, format: EdgeFormat) -> PreprocessResult<Self> {
        let file = File::open(path).at("opening", path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::with_capacity(1 << 20, file),
            format,
            line_number: 0,
            line: Vec::new(),
        })
    }

    /// Number of lines consumed so far
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Next edge, or `None` at end of input
    pub fn next_edge<E: EdgeRecord>(&mut self) -> PreprocessResult<Option<E>> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.line)
                .at("reading", &self.path)?;
            if n == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = decode_line(&self.line, self.line_number, self.format.expected())?;
            if line.trim().is_empty() || is_comment(line) {
                continue;
            }
            let (src, dst, value) = parse_line(line, self.line_number, self.format)?;
            return Ok(Some(E::new(src, dst, value)));
        }
    }
}

/// Parse one data line in the given format.
pub fn parse_line(
    line: &str,
    line_number: usize,
    format: EdgeFormat,
) -> PreprocessResult<(VertexId, VertexId, EdgeValue)> {
    let malformed = || PreprocessError::MalformedLine {
        line: line_number,
        content: line.to_string(),
        expected: format.expected(),
    };

    let parts: Vec<&str> = fields(line).collect();
    if parts.len() != format.field_count() {
        return Err(malformed());
    }
    let src: VertexId = parts[0].parse().map_err(|_| malformed())?;
    let dst: VertexId = parts[1].parse().map_err(|_| malformed())?;
    let value: EdgeValue = match format {
        EdgeFormat::Plain => 0.0,
        EdgeFormat::Valued => parts[2].parse().map_err(|_| malformed())?,
    };
    Ok((src, dst, value))
}
