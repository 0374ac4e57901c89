// src/agents/static_serverless.rs
//! Symmetric static partition: every rank, coordinator included, migrates
//! its round-robin share of the valid shots in a single round.

use crate::agents::agent::{Agent, Completion};
use crate::agents::factory::AgentKind;
use crate::agents::membership::GroupMembership;
use crate::agents::partition::static_serverless_share;
use crate::agents::reduction::reduce_migration_result;
use crate::engine::{Engine, MigrationResult, ShotList};
use crate::group::{Connector, ProcessIdentity, ThreadSupport};
use crate::utils::errors::Result;
use tracing::{debug, info};

const NAME: &str = "mpi-static-serverless";

pub struct StaticServerlessAgent {
    group: GroupMembership,
    shots: ShotList,
    rounds: u32,
}

impl StaticServerlessAgent {
    pub fn new(connector: Connector) -> Self {
        Self {
            group: GroupMembership::new(connector),
            shots: ShotList::new(),
            rounds: 0,
        }
    }

    /// Threading level to ask the process group for
    pub fn with_thread_support(mut self, level: ThreadSupport) -> Self {
        self.group.request_thread_support(level);
        self
    }
}

impl<E: Engine> Agent<E> for StaticServerlessAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::StaticServerless
    }

    fn identity(&self) -> Option<ProcessIdentity> {
        self.group.identity()
    }

    fn initialize(&mut self, engine: &mut E, args: &[String]) -> Result<E::State> {
        self.group.join(NAME, args, AgentKind::StaticServerless.min_processes())?;
        engine.initialize()
    }

    fn before_migration(&mut self, engine: &mut E) -> Result<()> {
        self.shots = engine.valid_shots()?;

        let identity = self.group.joined()?;
        if identity.rank == 0 {
            info!(
                "Distributing {} shot(s) over {} rank(s)",
                self.shots.len(),
                identity.process_count
            );
        }

        self.group.comm()?.barrier()
    }

    fn has_next_shot(&mut self) -> Result<bool> {
        self.rounds += 1;
        Ok(self.rounds < 2)
    }

    fn next_shot(&mut self) -> Result<ShotList> {
        let identity = self.group.joined()?;
        let share = static_serverless_share(&self.shots, identity.rank, identity.process_count);
        debug!("Rank {} assigned {:?}", identity.rank, share);
        Ok(share)
    }

    fn after_finalize(&mut self, local: MigrationResult) -> Result<Completion> {
        let rank = self.group.joined()?.rank;
        match reduce_migration_result(self.group.comm()?.as_mut(), local)? {
            Some(result) => Ok(Completion::Finalized(result)),
            None => Ok(Completion::Contributed { rank }),
        }
    }
}
