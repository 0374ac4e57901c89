// src/runtime/process_manager.rs
//! Process launcher for multi-process runs
//!
//! Spawns one copy of a program per rank, each told its place in the group
//! through environment variables, then supervises them:
//! - every rank exits 0 → success
//! - a rank fails → the survivors get SIGTERM, then SIGKILL after a grace period

use crate::group::connector::{COORDINATOR_ENV, RANK_ENV, WORLD_SIZE_ENV};
use crate::group::Rank;
use crate::utils::errors::{Result, ToolboxError};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What to launch and how many times
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    /// Program every rank runs
    pub program: PathBuf,

    /// Arguments shared by every rank
    pub args: Vec<String>,

    /// Number of ranks
    pub processes: usize,

    /// Address rank 0 listens on
    pub coordinator: String,

    /// Time between SIGTERM and SIGKILL when tearing the group down
    pub grace: Duration,
}

impl LaunchPlan {
    /// Launch copies of the running executable
    pub fn current_exe(args: Vec<String>, processes: usize, coordinator: String) -> Result<Self> {
        let program = std::env::current_exe().map_err(|e| {
            ToolboxError::ProcessSpawnFailed(format!("Cannot locate current executable: {}", e))
        })?;

        Ok(Self {
            program,
            args,
            processes,
            coordinator,
            grace: Duration::from_secs(2),
        })
    }
}

/// One spawned rank
struct RankProcess {
    rank: Rank,
    child: Child,
    status: Option<ExitStatus>,
}

/// Per-rank exit statuses of a successful launch
#[derive(Debug)]
pub struct LaunchReport {
    pub statuses: Vec<(Rank, ExitStatus)>,
    pub elapsed: Duration,
}

/// Plays the `mpirun` role for [`TcpGroup`](crate::group::TcpGroup) runs
pub struct ProcessLauncher {
    plan: LaunchPlan,
}

impl ProcessLauncher {
    pub fn new(plan: LaunchPlan) -> Self {
        Self { plan }
    }

    /// Spawn every rank and block until the group has finished
    pub fn run(&self) -> Result<LaunchReport> {
        if self.plan.processes == 0 {
            return Err(ToolboxError::ProcessSpawnFailed(
                "cannot launch a group of zero processes".into(),
            ));
        }

        let started = Instant::now();
        info!(
            "Launching {} process(es) of {:?}, coordinator at {}",
            self.plan.processes, self.plan.program, self.plan.coordinator
        );

        let mut ranks = Vec::with_capacity(self.plan.processes);
        for rank in 0..self.plan.processes {
            match self.spawn(rank) {
                Ok(process) => ranks.push(process),
                Err(e) => {
                    self.terminate(&mut ranks);
                    return Err(e);
                }
            }
        }

        self.supervise(&mut ranks)?;

        let statuses = ranks
            .iter()
            .filter_map(|p| p.status.map(|status| (p.rank, status)))
            .collect();
        let elapsed = started.elapsed();
        info!("All {} rank(s) finished in {:.2?}", self.plan.processes, elapsed);

        Ok(LaunchReport { statuses, elapsed })
    }

    fn spawn(&self, rank: Rank) -> Result<RankProcess> {
        let child = Command::new(&self.plan.program)
            .args(&self.plan.args)
            .env(RANK_ENV, rank.to_string())
            .env(WORLD_SIZE_ENV, self.plan.processes.to_string())
            .env(COORDINATOR_ENV, &self.plan.coordinator)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                ToolboxError::ProcessSpawnFailed(format!("Failed to spawn rank {}: {}", rank, e))
            })?;

        debug!("Rank {} spawned with PID {}", rank, child.id());
        Ok(RankProcess {
            rank,
            child,
            status: None,
        })
    }

    /// Wait for every rank; on the first failure tear the rest down
    fn supervise(&self, ranks: &mut [RankProcess]) -> Result<()> {
        loop {
            let mut running = 0;
            let mut failure = None;

            for process in ranks.iter_mut().filter(|p| p.status.is_none()) {
                match process.child.try_wait()? {
                    Some(status) => {
                        process.status = Some(status);
                        if status.success() {
                            debug!("Rank {} exited cleanly", process.rank);
                        } else {
                            error!("Rank {} failed: {}", process.rank, status);
                            failure = Some((process.rank, status));
                            break;
                        }
                    }
                    None => running += 1,
                }
            }

            if let Some((rank, status)) = failure {
                self.terminate(ranks);
                return Err(ToolboxError::RankFailed {
                    rank,
                    status: status.to_string(),
                });
            }

            if running == 0 {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// SIGTERM every rank still alive, SIGKILL whatever outlives the grace period
    fn terminate(&self, ranks: &mut [RankProcess]) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        for process in ranks.iter().filter(|p| p.status.is_none()) {
            debug!("Sending SIGTERM to rank {}", process.rank);
            let pid = Pid::from_raw(process.child.id() as i32);
            if let Err(e) = kill(pid, Signal::SIGTERM) {
                warn!("Failed to send SIGTERM to rank {}: {}", process.rank, e);
            }
        }

        let deadline = Instant::now() + self.plan.grace;
        for process in ranks.iter_mut().filter(|p| p.status.is_none()) {
            loop {
                match process.child.try_wait() {
                    Ok(Some(status)) => {
                        process.status = Some(status);
                        break;
                    }
                    Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                    _ => {
                        warn!("Rank {} ignored SIGTERM, killing it", process.rank);
                        let _ = process.child.kill();
                        process.status = process.child.wait().ok();
                        break;
                    }
                }
            }
        }
    }
}
