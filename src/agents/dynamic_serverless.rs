// src/agents/dynamic_serverless.rs
//! Coordinator-mediated dynamic load balancing
//!
//! Rank 0 owns the pool of unclaimed shots and never migrates. Workers pull
//! one shot per round until the pool runs dry:
//!
//! ```text
//!  worker r                                coordinator
//!  ────────                                ───────────
//!  Request { r, Ready }  ───────────────►  pop front of pool
//!                        ◄───────────────  Reply { Some(shot), Remaining, Assigned }
//!  migrate shot
//!  Request { r, Ready }  ───────────────►  pool empty
//!                        ◄───────────────  Reply { None, Exhausted, Assigned | Idle }
//!  stop
//! ```
//!
//! The coordinator stops dispatching once every worker has been told the pool
//! is exhausted; all ranks then meet in the reduction.

use crate::agents::agent::{Agent, Completion};
use crate::agents::factory::AgentKind;
use crate::agents::membership::GroupMembership;
use crate::agents::reduction::reduce_migration_result;
use crate::engine::{Engine, MigrationResult, ShotId, ShotList};
use crate::group::{
    Availability, Capacity, Connector, DispatchMessage, Payload, PoolStatus, ProcessIdentity, Rank,
    Tag, ThreadSupport, COORDINATOR,
};
use crate::utils::errors::{Result, ToolboxError};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, trace};

const NAME: &str = "mpi-dynamic-serverless";

/// One shot handed to one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    pub shot: ShotId,
    pub rank: Rank,
}

pub struct DynamicServerlessAgent {
    group: GroupMembership,

    // coordinator side
    pool: VecDeque<ShotId>,
    dispatch_log: Vec<DispatchRecord>,
    dispatched: bool,

    // worker side
    assigned: Option<ShotId>,
    completed: ShotList,
    exhausted: bool,
}

impl DynamicServerlessAgent {
    pub fn new(connector: Connector) -> Self {
        Self {
            group: GroupMembership::new(connector),
            pool: VecDeque::new(),
            dispatch_log: Vec::new(),
            dispatched: false,
            assigned: None,
            completed: ShotList::new(),
            exhausted: false,
        }
    }

    /// Threading level to ask the process group for
    pub fn with_thread_support(mut self, level: ThreadSupport) -> Self {
        self.group.request_thread_support(level);
        self
    }

    /// Which worker got which shot, in dispatch order (coordinator only)
    pub fn dispatch_log(&self) -> &[DispatchRecord] {
        &self.dispatch_log
    }

    /// Shots this worker has finished migrating
    pub fn completed_shots(&self) -> &[ShotId] {
        &self.completed
    }

    /// Serve worker requests until every worker has been released
    fn dispatch(&mut self) -> Result<()> {
        let identity = self.group.joined()?;
        let workers = identity.process_count - 1;
        let comm = self.group.comm()?;

        let mut served: HashSet<Rank> = HashSet::new();
        let mut released: HashSet<Rank> = HashSet::new();

        while released.len() < workers {
            let envelope = comm.recv(None, Tag::Dispatch)?;

            let (rank, availability) = match envelope.payload {
                Payload::Dispatch(DispatchMessage::Request { rank, availability }) => {
                    (rank, availability)
                }
                other => {
                    return Err(ToolboxError::ProtocolViolation(format!(
                        "coordinator expected a shot request from rank {}, got {:?}",
                        envelope.source, other
                    )))
                }
            };

            if rank != envelope.source {
                return Err(ToolboxError::ProtocolViolation(format!(
                    "rank {} sent a request claiming to be rank {}",
                    envelope.source, rank
                )));
            }

            if availability == Availability::Busy {
                trace!("Rank {} reports busy", rank);
                continue;
            }

            if released.contains(&rank) {
                return Err(ToolboxError::ProtocolViolation(format!(
                    "rank {} requested work after the pool was exhausted",
                    rank
                )));
            }

            let reply = match self.pool.pop_front() {
                Some(shot) => {
                    served.insert(rank);
                    self.dispatch_log.push(DispatchRecord { shot, rank });
                    metrics::counter!("stbx_shots_dispatched_total").increment(1);
                    trace!("Shot {} -> rank {} ({} left)", shot, rank, self.pool.len());
                    DispatchMessage::assignment(shot)
                }
                None => {
                    released.insert(rank);
                    let capacity = if served.contains(&rank) {
                        Capacity::Assigned
                    } else {
                        Capacity::Idle
                    };
                    trace!("Rank {} released ({:?})", rank, capacity);
                    DispatchMessage::exhausted(capacity)
                }
            };

            comm.send(rank, Tag::Dispatch, Payload::Dispatch(reply))?;
        }

        info!(
            "Dispatched {} shot(s) to {} of {} worker(s)",
            self.dispatch_log.len(),
            served.len(),
            workers
        );
        Ok(())
    }

    /// Ask the coordinator for the next shot
    fn request(&mut self, rank: Rank) -> Result<bool> {
        let comm = self.group.comm()?;
        comm.send(
            COORDINATOR,
            Tag::Dispatch,
            Payload::Dispatch(DispatchMessage::Request {
                rank,
                availability: Availability::Ready,
            }),
        )?;

        let envelope = comm.recv(Some(COORDINATOR), Tag::Dispatch)?;
        match envelope.payload {
            Payload::Dispatch(DispatchMessage::Reply {
                shot: Some(shot), ..
            }) => {
                self.assigned = Some(shot);
                Ok(true)
            }
            Payload::Dispatch(DispatchMessage::Reply {
                shot: None,
                pool: PoolStatus::Exhausted,
                capacity,
            }) => {
                self.exhausted = true;
                if capacity == Capacity::Idle {
                    debug!("Rank {} received no shots; group has more workers than shots", rank);
                }
                Ok(false)
            }
            other => Err(ToolboxError::ProtocolViolation(format!(
                "rank {} expected a dispatch reply, got {:?}",
                rank, other
            ))),
        }
    }
}

impl<E: Engine> Agent<E> for DynamicServerlessAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::DynamicServerless
    }

    fn identity(&self) -> Option<ProcessIdentity> {
        self.group.identity()
    }

    fn initialize(&mut self, engine: &mut E, args: &[String]) -> Result<E::State> {
        self.group.join(NAME, args, AgentKind::DynamicServerless.min_processes())?;
        engine.initialize()
    }

    fn before_migration(&mut self, engine: &mut E) -> Result<()> {
        let shots = engine.valid_shots()?;

        let identity = self.group.joined()?;
        if identity.rank == COORDINATOR {
            info!(
                "Dispatching {} shot(s) on demand to {} worker(s)",
                shots.len(),
                identity.process_count - 1
            );
            self.pool = shots.into();
        }

        self.group.comm()?.barrier()
    }

    fn has_next_shot(&mut self) -> Result<bool> {
        let rank = self.group.joined()?.rank;

        if rank == COORDINATOR {
            if !self.dispatched {
                self.dispatch()?;
                self.dispatched = true;
            }
            return Ok(false);
        }

        if self.exhausted {
            return Ok(false);
        }
        self.request(rank)
    }

    fn next_shot(&mut self) -> Result<ShotList> {
        if self.group.joined()?.rank == COORDINATOR {
            return Ok(ShotList::new());
        }

        self.assigned.map(|shot| vec![shot]).ok_or_else(|| {
            ToolboxError::ProtocolViolation("next_shot called without an assigned shot".into())
        })
    }

    fn after_migration(&mut self) -> Result<()> {
        if let Some(shot) = self.assigned.take() {
            self.completed.push(shot);
        }
        Ok(())
    }

    fn after_finalize(&mut self, local: MigrationResult) -> Result<Completion> {
        let rank = self.group.joined()?.rank;
        if rank != COORDINATOR {
            debug!("Rank {} migrated {} shot(s)", rank, self.completed.len());
        }

        match reduce_migration_result(self.group.comm()?.as_mut(), local)? {
            Some(result) => Ok(Completion::Finalized(result)),
            None => Ok(Completion::Contributed { rank }),
        }
    }
}
