//! Fixed-width record definitions
//!
//! Every persisted array in a preprocessing folder is a headerless,
//! little-endian sequence of one of these records, so the element count of a
//! file is always `file_len / SIZE`.

use std::fmt;

/// Vertex identifier, dense in `[0, vertex_count)`
pub type VertexId = u32;

/// Inbound degree of a vertex
pub type Degree = u32;

/// Position of an edge inside one shard's adjacency array
pub type EdgeIndex = u32;

/// Scalar payload carried by every edge
pub type EdgeValue = f64;

/// Scalar value owned by every vertex
pub type VertexValue = f64;

/// A record with a fixed little-endian binary encoding.
pub trait FixedRecord: Copy + Send + Sync + 'static {
    /// Encoded width in bytes
    const SIZE: usize;

    /// Write the record into `out`, which is exactly `SIZE` bytes long.
    fn encode(&self, out: &mut [u8]);

    /// Read a record from `bytes`, which is exactly `SIZE` bytes long.
    fn decode(bytes: &[u8]) -> Self;
}

/// Encode a slice of records into one contiguous buffer.
pub fn encode_records<R: FixedRecord>(records: &[R]) -> Vec<u8> {
    let mut buf = vec![0u8; records.len() * R::SIZE];
    for (record, out) in records.iter().zip(buf.chunks_exact_mut(R::SIZE)) {
        record.encode(out);
    }
    buf
}

/// Decode a buffer into records. Trailing bytes that do not form a whole
/// record are ignored.
pub fn decode_records<R: FixedRecord>(bytes: &[u8]) -> Vec<R> {
    bytes.chunks_exact(R::SIZE).map(R::decode).collect()
}

#[inline]
fn get_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
fn get_f64(bytes: &[u8], at: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    f64::from_le_bytes(raw)
}

impl FixedRecord for u32 {
    const SIZE: usize = 4;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        get_u32(bytes, 0)
    }
}

impl FixedRecord for f64 {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        get_f64(bytes, 0)
    }
}

/// Inbound degree of one destination vertex (`inbound_degrees` file)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DegreeEntry {
    pub vertex: VertexId,
    pub degree: Degree,
}

impl FixedRecord for DegreeEntry {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.vertex.to_le_bytes());
        out[4..8].copy_from_slice(&self.degree.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            vertex: get_u32(bytes, 0),
            degree: get_u32(bytes, 4),
        }
    }
}

/// Start of one source's contiguous run inside a shard (`Outbound/` files)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundEntry {
    pub source: VertexId,
    pub offset: EdgeIndex,
}

impl FixedRecord for OutboundEntry {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.source.to_le_bytes());
        out[4..8].copy_from_slice(&self.offset.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            source: get_u32(bytes, 0),
            offset: get_u32(bytes, 4),
        }
    }
}

/// Contiguous range of destination vertices owned by one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    /// First vertex id (inclusive)
    pub first_vid: VertexId,
    /// Last vertex id (inclusive)
    pub last_vid: VertexId,
    /// Number of distinct destination vertices with at least one in-edge
    pub destinations: u32,
}

impl Interval {
    pub fn new(first_vid: VertexId, last_vid: VertexId, destinations: u32) -> Self {
        Self {
            first_vid,
            last_vid,
            destinations,
        }
    }

    /// Whether `vertex` falls inside `[first_vid, last_vid]`
    #[inline]
    pub fn contains(&self, vertex: VertexId) -> bool {
        vertex >= self.first_vid && vertex <= self.last_vid
    }

    /// Number of vertex ids covered by the interval
    #[inline]
    pub fn span(&self) -> usize {
        (self.last_vid - self.first_vid) as usize + 1
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.first_vid, self.last_vid)
    }
}

impl FixedRecord for Interval {
    const SIZE: usize = 12;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.first_vid.to_le_bytes());
        out[4..8].copy_from_slice(&self.last_vid.to_le_bytes());
        out[8..12].copy_from_slice(&self.destinations.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            first_vid: get_u32(bytes, 0),
            last_vid: get_u32(bytes, 4),
            destinations: get_u32(bytes, 8),
        }
    }
}

/// An input edge as it flows through external sorting and sharding.
///
/// Two layouts exist because most edge lists carry no payload and the chunk
/// files should not pay eight bytes per edge for zeros.
pub trait EdgeRecord: FixedRecord + fmt::Debug {
    /// Whether this layout stores a payload
    const HAS_VALUE: bool;

    fn new(src: VertexId, dst: VertexId, value: EdgeValue) -> Self;

    fn src(&self) -> VertexId;

    fn dst(&self) -> VertexId;

    /// Payload, zero for layouts without one
    fn value(&self) -> EdgeValue;
}

/// Edge without payload (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlainEdge {
    pub src: VertexId,
    pub dst: VertexId,
}

impl FixedRecord for PlainEdge {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.src.to_le_bytes());
        out[4..8].copy_from_slice(&self.dst.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            src: get_u32(bytes, 0),
            dst: get_u32(bytes, 4),
        }
    }
}

impl EdgeRecord for PlainEdge {
    const HAS_VALUE: bool = false;

    fn new(src: VertexId, dst: VertexId, _value: EdgeValue) -> Self {
        Self { src, dst }
    }

    #[inline]
    fn src(&self) -> VertexId {
        self.src
    }

    #[inline]
    fn dst(&self) -> VertexId {
        self.dst
    }

    #[inline]
    fn value(&self) -> EdgeValue {
        0.0
    }
}

/// Edge with a scalar payload (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuedEdge {
    pub src: VertexId,
    pub dst: VertexId,
    pub value: EdgeValue,
}

impl FixedRecord for ValuedEdge {
    const SIZE: usize = 16;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.src.to_le_bytes());
        out[4..8].copy_from_slice(&self.dst.to_le_bytes());
        out[8..16].copy_from_slice(&self.value.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            src: get_u32(bytes, 0),
            dst: get_u32(bytes, 4),
            value: get_f64(bytes, 8),
        }
    }
}

impl EdgeRecord for ValuedEdge {
    const HAS_VALUE: bool = true;

    fn new(src: VertexId, dst: VertexId, value: EdgeValue) -> Self {
        Self { src, dst, value }
    }

    #[inline]
    fn src(&self) -> VertexId {
        self.src
    }

    #[inline]
    fn dst(&self) -> VertexId {
        self.dst
    }

    #[inline]
    fn value(&self) -> EdgeValue {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_widths_match_layout() {
        assert_eq!(encode_records(&[Interval::new(0, 9, 3)]).len(), 12);
        assert_eq!(encode_records(&[DegreeEntry { vertex: 1, degree: 2 }]).len(), 8);
        assert_eq!(encode_records(&[OutboundEntry { source: 1, offset: 0 }]).len(), 8);
        assert_eq!(encode_records(&[PlainEdge { src: 1, dst: 2 }]).len(), 8);
        assert_eq!(encode_records(&[ValuedEdge { src: 1, dst: 2, value: 0.5 }]).len(), 16);
    }

    #[test]
    fn test_valued_edge_layout_is_little_endian() {
        let edge = ValuedEdge { src: 1, dst: 258, value: 1.5 };
        let bytes = encode_records(&[edge]);
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[2, 1, 0, 0]);
        assert_eq!(decode_records::<ValuedEdge>(&bytes), vec![edge]);
    }

    #[test]
    fn test_decode_ignores_partial_tail() {
        let mut bytes = encode_records(&[7u32, 8u32]);
        bytes.push(0xff);
        assert_eq!(decode_records::<u32>(&bytes), vec![7, 8]);
    }

    #[test]
    fn test_interval_bounds() {
        let interval = Interval::new(4, 9, 2);
        assert!(interval.contains(4));
        assert!(interval.contains(9));
        assert!(!interval.contains(3));
        assert!(!interval.contains(10));
        assert_eq!(interval.span(), 6);
        assert_eq!(interval.to_string(), "[4, 9]");
    }

    #[test]
    fn test_plain_edge_has_zero_payload() {
        let edge = PlainEdge::new(3, 4, 9.0);
        assert_eq!(edge.value(), 0.0);
        assert!(!PlainEdge::HAS_VALUE);
        assert!(ValuedEdge::HAS_VALUE);
    }
}
