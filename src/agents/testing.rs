// src/agents/testing.rs
//! Multi-rank test harness
//!
//! - `ProbeEngine`: records which rank migrated which shot, with optional
//!   per-shot delay variance
//! - `CountingAgent`: wraps an agent and counts every lifecycle call
//! - `run_group`: runs one agent per rank on its own thread over a `LocalGroup`

use crate::agents::agent::{Agent, Completion};
use crate::agents::factory::AgentKind;
use crate::engine::{Engine, MigrationResult, ShotId, ShotList};
use crate::group::{Connector, LocalGroup, ProcessIdentity, Rank, ThreadSupport};
use crate::utils::errors::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Round {
    rank: Rank,
    shots: ShotList,
}

/// Shared record of every `migrate_shots` call across the group
#[derive(Debug, Clone, Default)]
pub struct ShotLog {
    rounds: Arc<Mutex<Vec<Round>>>,
}

impl ShotLog {
    fn record(&self, rank: Rank, shots: &[ShotId]) {
        self.rounds.lock().push(Round {
            rank,
            shots: shots.to_vec(),
        });
    }

    /// Number of `migrate_shots` calls, all ranks together
    pub fn rounds(&self) -> usize {
        self.rounds.lock().len()
    }

    pub fn rounds_of(&self, rank: Rank) -> usize {
        self.rounds.lock().iter().filter(|r| r.rank == rank).count()
    }

    /// Shots migrated by `rank`, in migration order
    pub fn shots_of(&self, rank: Rank) -> ShotList {
        self.rounds
            .lock()
            .iter()
            .filter(|r| r.rank == rank)
            .flat_map(|r| r.shots.iter().copied())
            .collect()
    }

    /// Every migrated shot, sorted; duplicates are kept
    pub fn sorted_shots(&self) -> ShotList {
        let mut shots: ShotList = self
            .rounds
            .lock()
            .iter()
            .flat_map(|r| r.shots.iter().copied())
            .collect();
        shots.sort_unstable();
        shots
    }
}

#[derive(Debug, Default)]
pub struct ProbeState {
    hits: f32,
    shot_sum: f32,
}

/// Engine whose result is `hits = [shots migrated]` and `shot_sum = [sum of shot ids]`
pub struct ProbeEngine {
    shots: ShotList,
    log: ShotLog,
    rank: Rank,
    max_delay_ms: u64,
}

impl ProbeEngine {
    pub fn new(shots: ShotList, log: ShotLog, rank: Rank) -> Self {
        Self {
            shots,
            log,
            rank,
            max_delay_ms: 0,
        }
    }

    /// Make shots cost between 0 and `max_delay_ms` depending on shot and rank
    pub fn with_delay(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn log(&self) -> &ShotLog {
        &self.log
    }

    fn delay(&self, shot: ShotId) -> Duration {
        if self.max_delay_ms == 0 {
            return Duration::ZERO;
        }
        let spread = shot as u64 * 7 + self.rank as u64 * 13;
        Duration::from_millis(spread % self.max_delay_ms)
    }
}

impl Engine for ProbeEngine {
    type State = ProbeState;

    fn initialize(&mut self) -> Result<ProbeState> {
        Ok(ProbeState::default())
    }

    fn valid_shots(&mut self) -> Result<ShotList> {
        Ok(self.shots.clone())
    }

    fn migrate_shots(&mut self, shots: &[ShotId], state: &mut ProbeState) -> Result<()> {
        for shot in shots {
            thread::sleep(self.delay(*shot));
            state.hits += 1.0;
            state.shot_sum += *shot as f32;
        }
        self.log.record(self.rank, shots);
        Ok(())
    }

    fn finalize(&mut self, state: ProbeState) -> Result<MigrationResult> {
        MigrationResult::new(1, 1, 1, 1)
            .with_buffer("hits", vec![state.hits])?
            .with_buffer("shot_sum", vec![state.shot_sum])
    }
}

/// Lifecycle call counts of one agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub initialize: usize,
    pub before_migration: usize,
    pub has_next_true: usize,
    pub has_next_false: usize,
    pub next_shot: usize,
    pub after_migration: usize,
    pub before_finalize: usize,
    pub after_finalize: usize,
}

/// Delegating agent that counts every hook call
pub struct CountingAgent<E: Engine> {
    inner: Box<dyn Agent<E>>,
    counts: Arc<Mutex<CallCounts>>,
}

impl<E: Engine> CountingAgent<E> {
    pub fn new(inner: Box<dyn Agent<E>>) -> (Self, Arc<Mutex<CallCounts>>) {
        let counts = Arc::new(Mutex::new(CallCounts::default()));
        (
            Self {
                inner,
                counts: counts.clone(),
            },
            counts,
        )
    }
}

impl<E: Engine> Agent<E> for CountingAgent<E> {
    fn kind(&self) -> AgentKind {
        self.inner.kind()
    }

    fn identity(&self) -> Option<ProcessIdentity> {
        self.inner.identity()
    }

    fn initialize(&mut self, engine: &mut E, args: &[String]) -> Result<E::State> {
        self.counts.lock().initialize += 1;
        self.inner.initialize(engine, args)
    }

    fn before_migration(&mut self, engine: &mut E) -> Result<()> {
        self.counts.lock().before_migration += 1;
        self.inner.before_migration(engine)
    }

    fn has_next_shot(&mut self) -> Result<bool> {
        let more = self.inner.has_next_shot()?;
        let mut counts = self.counts.lock();
        if more {
            counts.has_next_true += 1;
        } else {
            counts.has_next_false += 1;
        }
        Ok(more)
    }

    fn next_shot(&mut self) -> Result<ShotList> {
        self.counts.lock().next_shot += 1;
        self.inner.next_shot()
    }

    fn after_migration(&mut self) -> Result<()> {
        self.counts.lock().after_migration += 1;
        self.inner.after_migration()
    }

    fn before_finalize(&mut self) -> Result<()> {
        self.counts.lock().before_finalize += 1;
        self.inner.before_finalize()
    }

    fn after_finalize(&mut self, local: MigrationResult) -> Result<Completion> {
        self.counts.lock().after_finalize += 1;
        self.inner.after_finalize(local)
    }
}

/// Outcome of a multi-rank run
pub struct GroupRun {
    pub log: ShotLog,
    completions: Vec<Result<Completion>>,
}

impl GroupRun {
    /// Per-rank outcomes, indexed by rank
    pub fn completions(&self) -> &[Result<Completion>] {
        &self.completions
    }

    pub fn into_coordinator_result(mut self) -> MigrationResult {
        match self.completions.swap_remove(0) {
            Ok(Completion::Finalized(result)) => result,
            other => panic!("coordinator did not finalize: {:?}", other),
        }
    }
}

/// Run `kind` on `size` ranks, each with its own probe engine over `shots`
pub fn run_group(kind: AgentKind, size: usize, shots: ShotList, max_delay_ms: u64) -> GroupRun {
    run_group_with(size, shots, max_delay_ms, move |_, connector| {
        kind.build(Some(connector), ThreadSupport::Funneled)
            .expect("agent construction")
    })
}

/// Like [`run_group`] with a caller-built agent per rank
pub fn run_group_with<F>(size: usize, shots: ShotList, max_delay_ms: u64, build: F) -> GroupRun
where
    F: Fn(Rank, Connector) -> Box<dyn Agent<ProbeEngine>> + Send + Sync + 'static,
{
    let log = ShotLog::default();
    let build = Arc::new(build);

    let handles: Vec<_> = LocalGroup::endpoints(size)
        .into_iter()
        .enumerate()
        .map(|(rank, endpoint)| {
            let build = build.clone();
            let log = log.clone();
            let shots = shots.clone();

            thread::Builder::new()
                .name(format!("rank-{}", rank))
                .spawn(move || {
                    let mut engine = ProbeEngine::new(shots, log, rank).with_delay(max_delay_ms);
                    let mut agent = build(rank, Connector::Local(endpoint));
                    agent.execute(&mut engine, &[])
                })
                .expect("spawn rank thread")
        })
        .collect();

    let completions = handles
        .into_iter()
        .map(|handle| handle.join().expect("rank thread panicked"))
        .collect();

    GroupRun { log, completions }
}
