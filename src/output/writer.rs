// src/output/writer.rs
//! Result files
//!
//! Every run gets its own directory named by a ULID, so runs sort by start
//! time and never overwrite each other:
//!
//! ```text
//! <dir>/<run-id>/
//!     image.bin[.zst]          little-endian f32 samples
//!     illumination.bin[.zst]
//!     metadata.json            grid shape, buffer list, creation time
//!     metrics.prom             optional metrics snapshot
//! ```

use crate::engine::{CellSpacing, MigrationResult};
use crate::output::compressor::{decode_samples, encode_samples, CompressionLevel, Compressor};
use crate::utils::config::OutputConfig;
use crate::utils::errors::{Result, ToolboxError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use ulid::Ulid;

pub const METADATA_FILE: &str = "metadata.json";
pub const METRICS_FILE: &str = "metrics.prom";

/// One buffer as listed in `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferEntry {
    pub name: String,
    pub file: String,
    pub samples: usize,
}

/// Contents of `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub gather_dimension: usize,
    pub spacing: CellSpacing,
    pub compression: Option<CompressionLevel>,
    pub buffers: Vec<BufferEntry>,
}

/// Where a run's files ended up
#[derive(Debug, Clone)]
pub struct WriteSummary {
    pub run_id: Ulid,
    pub run_dir: PathBuf,
    pub files: Vec<PathBuf>,
}

pub struct ResultWriter {
    dir: PathBuf,
    compressor: Option<Compressor>,
}

impl ResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            compressor: None,
        }
    }

    pub fn with_compression(mut self, level: CompressionLevel) -> Self {
        self.compressor = Some(Compressor::new(level));
        self
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        let writer = Self::new(&config.dir);
        if config.compress {
            writer.with_compression(config.compression)
        } else {
            writer
        }
    }

    /// Write every buffer of `result` plus its metadata into a fresh run directory
    pub fn write(&self, result: &MigrationResult) -> Result<WriteSummary> {
        result.validate()?;

        let run_id = Ulid::new();
        let run_dir = self.dir.join(run_id.to_string());
        fs::create_dir_all(&run_dir).map_err(|e| {
            ToolboxError::OutputFailed(format!("Failed to create {}: {}", run_dir.display(), e))
        })?;

        let extension = if self.compressor.is_some() { "bin.zst" } else { "bin" };
        let mut files = Vec::new();
        let mut entries = Vec::new();

        for buffer in result.buffers() {
            let file = format!("{}.{}", buffer.name, extension);
            let path = run_dir.join(&file);

            let bytes = match &self.compressor {
                Some(compressor) => compressor.compress_samples(&buffer.data)?,
                None => encode_samples(&buffer.data),
            };
            write_file(&path, &bytes)?;
            debug!("Wrote buffer '{}' to {}", buffer.name, path.display());

            entries.push(BufferEntry {
                name: buffer.name.clone(),
                file,
                samples: buffer.data.len(),
            });
            files.push(path);
        }

        let (nx, ny, nz) = result.grid_size();
        let metadata = RunMetadata {
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            nx,
            ny,
            nz,
            gather_dimension: result.gather_dimension(),
            spacing: result.spacing(),
            compression: self.compressor.as_ref().map(Compressor::level),
            buffers: entries,
        };

        let metadata_path = run_dir.join(METADATA_FILE);
        write_file(&metadata_path, serde_json::to_string_pretty(&metadata)?.as_bytes())?;
        files.push(metadata_path);

        info!("Wrote {} buffer(s) to {}", result.buffers().len(), run_dir.display());

        Ok(WriteSummary {
            run_id,
            run_dir,
            files,
        })
    }

    /// Store a metrics snapshot alongside a written run
    pub fn write_metrics(&self, summary: &WriteSummary, rendered: &str) -> Result<PathBuf> {
        let path = summary.run_dir.join(METRICS_FILE);
        write_file(&path, rendered.as_bytes())?;
        Ok(path)
    }
}

/// Load `metadata.json` from a run directory
pub fn read_metadata(run_dir: &Path) -> Result<RunMetadata> {
    let text = fs::read_to_string(run_dir.join(METADATA_FILE))?;
    Ok(serde_json::from_str(&text)?)
}

/// Load one buffer listed in a run's metadata
pub fn read_buffer(run_dir: &Path, entry: &BufferEntry) -> Result<Vec<f32>> {
    let bytes = fs::read(run_dir.join(&entry.file))?;
    let samples = if entry.file.ends_with(".zst") {
        Compressor::decompress_samples(&bytes)?
    } else {
        decode_samples(&bytes)?
    };

    if samples.len() != entry.samples {
        return Err(ToolboxError::ShapeMismatch(format!(
            "{} holds {} samples, expected {}",
            entry.file,
            samples.len(),
            entry.samples
        )));
    }
    Ok(samples)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|e| {
        ToolboxError::OutputFailed(format!("Failed to write {}: {}", path.display(), e))
    })
}
