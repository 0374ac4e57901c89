// src/engine/migration_result.rs
//! Migration output artifact
//!
//! One instance per process after `Engine::finalize`, holding that process's
//! locally-stacked partial sums. After reduction only the coordinator keeps one.

use crate::utils::errors::{Result, ToolboxError};
use serde::{Deserialize, Serialize};

/// Grid cell spacing along each axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellSpacing {
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
}

impl Default for CellSpacing {
    fn default() -> Self {
        Self {
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
        }
    }
}

/// A named float buffer (e.g. the stacked image)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBuffer {
    pub name: String,
    pub data: Vec<f32>,
}

impl ResultBuffer {
    pub fn new(name: impl Into<String>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Result of a migration run
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationResult {
    nx: usize,
    ny: usize,
    nz: usize,

    /// Extra dimension: number of angles or offsets for common image
    /// gathers, 1 for a plain stacked image
    gather_dimension: usize,

    spacing: CellSpacing,
    buffers: Vec<ResultBuffer>,
}

impl MigrationResult {
    /// Create an empty result for the given grid
    pub fn new(nx: usize, ny: usize, nz: usize, gather_dimension: usize) -> Self {
        Self {
            nx,
            ny,
            nz,
            gather_dimension,
            spacing: CellSpacing::default(),
            buffers: Vec::new(),
        }
    }

    pub fn with_spacing(mut self, spacing: CellSpacing) -> Self {
        self.spacing = spacing;
        self
    }

    /// Append a buffer, checking it against the grid shape
    pub fn push_buffer(&mut self, buffer: ResultBuffer) -> Result<()> {
        self.check_len(&buffer.name, buffer.data.len())?;
        self.buffers.push(buffer);
        Ok(())
    }

    /// Builder form of [`push_buffer`](Self::push_buffer)
    pub fn with_buffer(mut self, name: impl Into<String>, data: Vec<f32>) -> Result<Self> {
        self.push_buffer(ResultBuffer::new(name, data))?;
        Ok(self)
    }

    /// Samples per buffer: nx·ny·nz·gather_dimension
    pub fn buffer_len(&self) -> usize {
        self.nx * self.ny * self.nz * self.gather_dimension
    }

    pub fn grid_size(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    pub fn gather_dimension(&self) -> usize {
        self.gather_dimension
    }

    pub fn spacing(&self) -> CellSpacing {
        self.spacing
    }

    pub fn buffers(&self) -> &[ResultBuffer] {
        &self.buffers
    }

    pub fn buffer(&self, name: &str) -> Option<&ResultBuffer> {
        self.buffers.iter().find(|b| b.name == name)
    }

    /// Swap the samples of buffer `index` for `data`, keeping its name
    pub fn replace_buffer(&mut self, index: usize, data: Vec<f32>) -> Result<()> {
        let expected = self.buffer_len();
        let buffer = self.buffers.get_mut(index).ok_or_else(|| {
            ToolboxError::ShapeMismatch(format!("no result buffer at index {}", index))
        })?;

        if data.len() != expected {
            return Err(ToolboxError::ShapeMismatch(format!(
                "buffer '{}' replacement has {} samples, expected {}",
                buffer.name,
                data.len(),
                expected
            )));
        }

        buffer.data = data;
        Ok(())
    }

    /// Check every buffer against the grid shape
    pub fn validate(&self) -> Result<()> {
        for buffer in &self.buffers {
            self.check_len(&buffer.name, buffer.data.len())?;
        }
        Ok(())
    }

    fn check_len(&self, name: &str, len: usize) -> Result<()> {
        let expected = self.buffer_len();
        if len != expected {
            return Err(ToolboxError::ShapeMismatch(format!(
                "buffer '{}' has {} samples, expected {} ({}x{}x{}x{})",
                name, len, expected, self.nx, self.ny, self.nz, self.gather_dimension
            )));
        }
        Ok(())
    }
}
