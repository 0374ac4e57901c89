// src/agents/static_server.rs
//! Coordinator + static partition
//!
//! Rank 0 never migrates; it only takes part in the reduction. Ranks
//! `1..n` split the valid shot list round-robin in a single round.

use crate::agents::agent::{Agent, Completion};
use crate::agents::factory::AgentKind;
use crate::agents::membership::GroupMembership;
use crate::agents::partition::static_server_share;
use crate::agents::reduction::reduce_migration_result;
use crate::engine::{Engine, MigrationResult, ShotList};
use crate::group::{Connector, ProcessIdentity, ThreadSupport};
use crate::utils::errors::Result;
use tracing::{debug, info};

const NAME: &str = "mpi-static-server";

pub struct StaticServerAgent {
    group: GroupMembership,
    shots: ShotList,
    rounds: u32,
}

impl StaticServerAgent {
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

impl<E: Engine> Agent<E> for StaticServerAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::StaticServer
    }

    fn identity(&self) -> Option<ProcessIdentity> {
        self.group.identity()
    }

    fn initialize(&mut self, engine: &mut E, args: &[String]) -> Result<E::State> {
        self.group.join(NAME, args, AgentKind::StaticServer.min_processes())?;
        engine.initialize()
    }

    fn before_migration(&mut self, engine: &mut E) -> Result<()> {
        self.shots = engine.valid_shots()?;

        let identity = self.group.joined()?;
        if identity.rank == 0 {
            info!(
                "Coordinator distributing {} shot(s) over {} worker(s)",
                self.shots.len(),
                identity.process_count - 1
            );
        }

        self.group.comm()?.barrier()
    }

    fn has_next_shot(&mut self) -> Result<bool> {
        self.rounds += 1;
        Ok(self.rounds <= 1)
    }

    fn next_shot(&mut self) -> Result<ShotList> {
        let identity = self.group.joined()?;
        let share = static_server_share(&self.shots, identity.rank, identity.process_count);
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
