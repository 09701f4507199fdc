//! Graph data model shared by every phase
//!
//! Vertex ids, degrees and edge offsets are 32-bit; edge payloads and vertex
//! values are `f64`. Every persisted array is a headerless sequence of
//! little-endian [`FixedRecord`]s.

pub mod types;

pub use types::{
    decode_records, encode_records, Degree, DegreeEntry, EdgeIndex, EdgeRecord, EdgeValue,
    FixedRecord, Interval, OutboundEntry, PlainEdge, ValuedEdge, VertexId, VertexValue,
};
