// src/agents/normal.rs
//! Single-process policy: one round with every valid shot

use crate::agents::agent::{Agent, Completion};
use crate::agents::factory::AgentKind;
use crate::engine::{Engine, MigrationResult, ShotList};
use crate::group::ProcessIdentity;
use crate::utils::errors::Result;
use tracing::info;

#[derive(Debug, Default)]
pub struct NormalAgent {
    shots: ShotList,
    rounds: u32,
    initialized: bool,
}

impl NormalAgent {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: Engine> Agent<E> for NormalAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Normal
    }

    fn identity(&self) -> Option<ProcessIdentity> {
        self.initialized.then_some(ProcessIdentity {
            rank: 0,
            process_count: 1,
        })
    }

    fn initialize(&mut self, engine: &mut E, _args: &[String]) -> Result<E::State> {
        let state = engine.initialize()?;
        self.initialized = true;
        Ok(state)
    }

    fn before_migration(&mut self, engine: &mut E) -> Result<()> {
        self.shots = engine.valid_shots()?;
        info!("Single process run over {} shot(s)", self.shots.len());
        Ok(())
    }

    fn has_next_shot(&mut self) -> Result<bool> {
        self.rounds += 1;
        Ok(self.rounds == 1)
    }

    fn next_shot(&mut self) -> Result<ShotList> {
        Ok(self.shots.clone())
    }

    fn after_finalize(&mut self, local: MigrationResult) -> Result<Completion> {
        Ok(Completion::Finalized(local))
    }
}
