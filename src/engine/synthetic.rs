// src/engine/synthetic.rs
//! Deterministic stand-in engine
//!
//! Produces a result whose values can be checked by hand, with an adjustable
//! per-shot cost so uneven workloads can be simulated:
//!
//! - `image`: an impulse of 1.0 at sample `shot % len` per migrated shot
//! - `illumination`: 1.0 everywhere per migrated shot, so after reduction
//!   every sample equals the number of shots migrated group-wide

use crate::engine::{CellSpacing, Engine, MigrationResult, ResultBuffer, ShotId, ShotList};
use crate::utils::errors::{Result, ToolboxError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for [`SyntheticEngine`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticEngineConfig {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub gather_dimension: usize,

    /// Cell size recorded in the result metadata
    pub spacing: CellSpacing,

    /// Shots `first_shot..=last_shot` every `shot_step`
    pub first_shot: ShotId,
    pub last_shot: ShotId,
    pub shot_step: ShotId,

    /// Fixed cost of one shot in milliseconds
    pub shot_cost_ms: u64,

    /// Extra random cost in `[0, cost_jitter_ms)` per shot
    pub cost_jitter_ms: u64,
}

impl Default for SyntheticEngineConfig {
    fn default() -> Self {
        Self {
            nx: 64,
            ny: 1,
            nz: 64,
            gather_dimension: 1,
            spacing: CellSpacing::default(),
            first_shot: 0,
            last_shot: 15,
            shot_step: 1,
            shot_cost_ms: 0,
            cost_jitter_ms: 0,
        }
    }
}

/// Grid state handed out by [`SyntheticEngine::initialize`]
#[derive(Debug)]
pub struct SyntheticGrid {
    samples: usize,
    shots_migrated: usize,
}

impl SyntheticGrid {
    pub fn shots_migrated(&self) -> usize {
        self.shots_migrated
    }
}

pub struct SyntheticEngine {
    config: SyntheticEngineConfig,
    image: Vec<f32>,
    illumination: Vec<f32>,
}

impl SyntheticEngine {
    pub fn new(config: SyntheticEngineConfig) -> Self {
        Self {
            config,
            image: Vec::new(),
            illumination: Vec::new(),
        }
    }

    fn samples(&self) -> usize {
        self.config.nx * self.config.ny * self.config.nz * self.config.gather_dimension
    }

    fn shot_cost(&self) -> Duration {
        let jitter = if self.config.cost_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.config.cost_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.config.shot_cost_ms + jitter)
    }
}

impl Engine for SyntheticEngine {
    type State = SyntheticGrid;

    fn initialize(&mut self) -> Result<SyntheticGrid> {
        let samples = self.samples();
        if samples == 0 {
            return Err(ToolboxError::EngineFailed("grid has no samples".to_string()));
        }

        self.image = vec![0.0; samples];
        self.illumination = vec![0.0; samples];

        info!(
            "Synthetic engine initialized: {}x{}x{} grid, gather dimension {}",
            self.config.nx, self.config.ny, self.config.nz, self.config.gather_dimension
        );

        Ok(SyntheticGrid {
            samples,
            shots_migrated: 0,
        })
    }

    fn valid_shots(&mut self) -> Result<ShotList> {
        let step = self.config.shot_step.max(1) as usize;
        let shots: ShotList = (self.config.first_shot..=self.config.last_shot)
            .step_by(step)
            .collect();

        info!("Valid shots detected to process: {}", shots.len());
        Ok(shots)
    }

    fn migrate_shots(&mut self, shots: &[ShotId], state: &mut SyntheticGrid) -> Result<()> {
        if self.image.len() != state.samples {
            return Err(ToolboxError::EngineFailed("grid state from another engine".to_string()));
        }

        for &shot in shots {
            let cost = self.shot_cost();
            if !cost.is_zero() {
                std::thread::sleep(cost);
            }

            let impulse = shot as usize % state.samples;
            self.image[impulse] += 1.0;
            for sample in self.illumination.iter_mut() {
                *sample += 1.0;
            }

            state.shots_migrated += 1;
            debug!("Migrated shot {} in {:?}", shot, cost);
        }

        Ok(())
    }

    fn finalize(&mut self, state: SyntheticGrid) -> Result<MigrationResult> {
        debug!("Finalizing after {} migrated shots", state.shots_migrated);

        let mut result = MigrationResult::new(
            self.config.nx,
            self.config.ny,
            self.config.nz,
            self.config.gather_dimension,
        )
        .with_spacing(self.config.spacing);
        result.push_buffer(ResultBuffer::new("image", std::mem::take(&mut self.image)))?;
        result.push_buffer(ResultBuffer::new(
            "illumination",
            std::mem::take(&mut self.illumination),
        ))?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SyntheticEngineConfig {
        SyntheticEngineConfig {
            nx: 4,
            ny: 1,
            nz: 2,
            first_shot: 1,
            last_shot: 9,
            shot_step: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_shots_respects_step() {
        let mut engine = SyntheticEngine::new(small_config());
        assert_eq!(engine.valid_shots().unwrap(), vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_migrate_and_finalize() {
        let mut engine = SyntheticEngine::new(small_config());
        let mut grid = engine.initialize().unwrap();

        engine.migrate_shots(&[1, 3], &mut grid).unwrap();
        engine.migrate_shots(&[], &mut grid).unwrap();
        engine.migrate_shots(&[9], &mut grid).unwrap();
        assert_eq!(grid.shots_migrated(), 3);

        let result = engine.finalize(grid).unwrap();
        assert_eq!(result.buffer_len(), 8);

        let image = &result.buffer("image").unwrap().data;
        assert_eq!(image[1], 2.0); // shots 1 and 9 land on sample 1
        assert_eq!(image[3], 1.0);
        assert_eq!(image.iter().sum::<f32>(), 3.0);

        let illumination = &result.buffer("illumination").unwrap().data;
        assert!(illumination.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_spacing_carried_into_result() {
        let spacing = CellSpacing {
            dx: 12.5,
            dy: 1.0,
            dz: 6.25,
        };
        let mut engine = SyntheticEngine::new(SyntheticEngineConfig {
            spacing,
            ..small_config()
        });
        let grid = engine.initialize().unwrap();

        assert_eq!(engine.finalize(grid).unwrap().spacing(), spacing);
    }

    #[test]
    fn test_finalize_without_shots_is_zero() {
        let mut engine = SyntheticEngine::new(small_config());
        let grid = engine.initialize().unwrap();
        let result = engine.finalize(grid).unwrap();

        assert!(result.buffers().iter().all(|b| b.data.iter().all(|&v| v == 0.0)));
    }
}
