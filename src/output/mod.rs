// src/output/mod.rs
//! Persisting the final migration result
//!
//! Only the coordinator writes. Buffers are raw little-endian f32, optionally
//! zstd-compressed, described by a JSON metadata sidecar.

pub mod compressor;
pub mod writer;

// Re-export commonly used types
pub use compressor::{CompressionLevel, Compressor};
pub use writer::{read_buffer, read_metadata, BufferEntry, ResultWriter, RunMetadata, WriteSummary};
