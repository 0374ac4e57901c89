// src/output/compressor.rs
//! Sample encoding and zstd compression for result buffers
//!
//! Samples are stored as little-endian f32. Stacked images are mostly zeros
//! away from the illuminated area, so even the fast level shrinks them a lot.

use crate::utils::errors::{Result, ToolboxError};
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::debug;

const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Samples encoded per zstd write
const CHUNK_SAMPLES: usize = 64 * 1024;

/// zstd level presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Fast,
    #[default]
    Balanced,
    Best,
}

impl CompressionLevel {
    pub fn zstd_level(self) -> i32 {
        match self {
            CompressionLevel::Fast => 1,
            CompressionLevel::Balanced => 3,
            CompressionLevel::Best => 19,
        }
    }
}

/// Encode samples as little-endian f32 bytes
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(samples.len() * SAMPLE_BYTES);
    for sample in samples {
        buf.put_f32_le(*sample);
    }
    buf.to_vec()
}

/// Decode little-endian f32 bytes; the length must be a whole number of samples
pub fn decode_samples(mut raw: &[u8]) -> Result<Vec<f32>> {
    if raw.len() % SAMPLE_BYTES != 0 {
        return Err(ToolboxError::ShapeMismatch(format!(
            "{} bytes is not a whole number of samples",
            raw.len()
        )));
    }

    let mut samples = Vec::with_capacity(raw.len() / SAMPLE_BYTES);
    while raw.has_remaining() {
        samples.push(raw.get_f32_le());
    }
    Ok(samples)
}

/// Streams result samples through zstd
pub struct Compressor {
    level: CompressionLevel,
}

impl Compressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Encode and compress `samples` chunk by chunk, without materialising
    /// the whole uncompressed byte buffer
    pub fn compress_samples(&self, samples: &[f32]) -> Result<Vec<u8>> {
        let failed = |e: std::io::Error| ToolboxError::CompressionFailed(e.to_string());

        let mut encoder =
            zstd::stream::Encoder::new(Vec::new(), self.level.zstd_level()).map_err(failed)?;
        for chunk in samples.chunks(CHUNK_SAMPLES) {
            encoder.write_all(&encode_samples(chunk)).map_err(failed)?;
        }
        let compressed = encoder.finish().map_err(failed)?;

        debug!(
            "Compressed {} samples into {} bytes at {:?}",
            samples.len(),
            compressed.len(),
            self.level
        );
        Ok(compressed)
    }

    /// Inverse of [`compress_samples`](Self::compress_samples). The level is
    /// not needed to decode.
    pub fn decompress_samples(data: &[u8]) -> Result<Vec<f32>> {
        let raw = zstd::stream::decode_all(data)
            .map_err(|e| ToolboxError::CompressionFailed(e.to_string()))?;
        decode_samples(&raw)
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(CompressionLevel::default())
    }
}
