// src/agents/agent.rs
//! Agent lifecycle
//!
//! Every scheduling policy runs through the same fixed state machine:
//!
//! ```text
//! Created ─► initialize ─► before_migration ─┐
//!                                            ▼
//!                       ┌──── has_next_shot? ──── no ─► before_finalize ─► after_finalize
//!                       │          │ yes
//!                       │          ▼
//!                       │   migrate_shots(next_shot)
//!                       │          │
//!                       └── after_migration
//! ```
//!
//! Policies only decide which shots a process gets and how partial results
//! are combined; the order of the steps is owned by [`Agent::execute`].

use crate::agents::factory::AgentKind;
use crate::engine::{Engine, MigrationResult, ShotList};
use crate::group::{ProcessIdentity, Rank};
use crate::utils::errors::Result;
use std::time::Instant;
use tracing::{debug, field, info, info_span};

/// Terminal state of one [`Agent::execute`] call
#[derive(Debug)]
pub enum Completion {
    /// The coordinator (or sole process) holds the final result
    Finalized(MigrationResult),

    /// This rank handed its partial result to the coordinator and has nothing
    /// left to do; the process is expected to exit
    Contributed { rank: Rank },
}

impl Completion {
    pub fn is_finalized(&self) -> bool {
        matches!(self, Completion::Finalized(_))
    }

    /// The final result, if this process owns it
    pub fn into_result(self) -> Option<MigrationResult> {
        match self {
            Completion::Finalized(result) => Some(result),
            Completion::Contributed { .. } => None,
        }
    }
}

/// A shot scheduling policy driving one engine
pub trait Agent<E: Engine> {
    fn kind(&self) -> AgentKind;

    /// Rank and process count, known once `initialize` has run
    fn identity(&self) -> Option<ProcessIdentity>;

    /// Initialize the engine and, for multi-process policies, join the process group
    fn initialize(&mut self, engine: &mut E, args: &[String]) -> Result<E::State>;

    /// Fetch the valid shot list from the engine
    fn before_migration(&mut self, engine: &mut E) -> Result<()>;

    /// Whether another round remains for this process.
    ///
    /// Not idempotent: every call advances the policy's round state, so it
    /// must be called exactly once per loop test.
    fn has_next_shot(&mut self) -> Result<bool>;

    /// This process's shots for the current round; may be empty
    fn next_shot(&mut self) -> Result<ShotList>;

    fn after_migration(&mut self) -> Result<()> {
        Ok(())
    }

    fn before_finalize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Combine `local` with the rest of the group and decide who owns the result
    fn after_finalize(&mut self, local: MigrationResult) -> Result<Completion>;

    /// Run the whole lifecycle against `engine`
    fn execute(&mut self, engine: &mut E, args: &[String]) -> Result<Completion> {
        let span = info_span!("agent", kind = %self.kind(), rank = field::Empty);
        let _entered = span.enter();

        let mut state = self.initialize(engine, args)?;

        let rank = self.identity().map(|identity| identity.rank).unwrap_or(0);
        span.record("rank", rank);
        let rank_label = rank.to_string();

        self.before_migration(engine)?;

        let mut rounds = 0usize;
        let mut migrated = 0usize;
        while self.has_next_shot()? {
            let shots = self.next_shot()?;
            debug!("Round {}: migrating {} shot(s) {:?}", rounds, shots.len(), shots);

            let started = Instant::now();
            engine.migrate_shots(&shots, &mut state)?;
            metrics::histogram!("stbx_round_duration_seconds", "rank" => rank_label.clone())
                .record(started.elapsed().as_secs_f64());
            metrics::counter!("stbx_shots_migrated_total", "rank" => rank_label.clone())
                .increment(shots.len() as u64);

            self.after_migration()?;
            rounds += 1;
            migrated += shots.len();
        }

        info!("Migrated {} shot(s) in {} round(s)", migrated, rounds);

        self.before_finalize()?;
        let local = engine.finalize(state)?;
        self.after_finalize(local)
    }
}
