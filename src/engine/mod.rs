// src/engine/mod.rs
//! Engine collaborator contract
//!
//! The scheduler never looks inside the physics. It only needs an engine that
//! can set up a grid, list the shots worth migrating, migrate a batch of shots
//! into its own accumulation buffers, and hand back the stacked result.
//!
//! # Lifecycle
//!
//! ```text
//! initialize() ──► GridState
//! valid_shots() ──► [ShotId]
//! migrate_shots(&[ShotId], &mut GridState)   (repeated)
//! finalize(GridState) ──► MigrationResult    (per process, partial sums)
//! ```

pub mod migration_result;
pub mod synthetic;

pub use migration_result::{CellSpacing, MigrationResult, ResultBuffer};
pub use synthetic::{SyntheticEngine, SyntheticEngineConfig, SyntheticGrid};

use crate::utils::errors::Result;

/// Identifier of one source location, the unit of schedulable work
pub type ShotId = u32;

/// Ordered shot sequence as produced by [`Engine::valid_shots`]
pub type ShotList = Vec<ShotId>;

/// Simulation engine driven by an agent
pub trait Engine {
    /// Opaque simulation state threaded through the migration lifecycle
    type State;

    /// Set up the grid and every component the migration needs
    fn initialize(&mut self) -> Result<Self::State>;

    /// Shots that have data and should be migrated; may be empty
    fn valid_shots(&mut self) -> Result<ShotList>;

    /// Migrate `shots` and add their correlation into the engine's stack.
    /// An empty slice is a valid no-op round.
    fn migrate_shots(&mut self, shots: &[ShotId], state: &mut Self::State) -> Result<()>;

    /// Consume the grid and return this process's stacked (partial) result
    fn finalize(&mut self, state: Self::State) -> Result<MigrationResult>;
}
