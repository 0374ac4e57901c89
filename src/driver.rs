// src/driver.rs
//! Run orchestration behind the binary
//!
//! One invocation is either the launcher (spawns the ranks and waits) or a
//! rank (builds the engine and agent, runs the job, writes the result if it
//! ends up owning it).

use crate::agents::{Completion, MigrationJob};
use crate::engine::{Engine, SyntheticEngine};
use crate::group::{BootstrapArgs, Connector, Rank};
use crate::output::{ResultWriter, WriteSummary};
use crate::utils::config::ToolboxConfig;
use crate::utils::errors::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Flags that take a value and are consumed by the process group bootstrap
const VALUE_FLAGS: [&str; 3] = ["--rank", "--world-size", "--coordinator"];

/// What this invocation should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Spawn `launch.processes` ranks and supervise them
    Launcher,
    /// Take part in the run as one rank
    Rank,
}

/// How a rank's run ended
#[derive(Debug)]
pub enum Outcome {
    /// The engine reported no valid shots; nothing was migrated or written
    NoShots,
    /// Partial result handed to the coordinator
    Contributed { rank: Rank },
    /// Final result written to disk
    Written(WriteSummary),
}

/// The configuration file: the first positional argument after the program name
pub fn config_path(args: &[String]) -> Option<PathBuf> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        return Some(PathBuf::from(arg));
    }
    None
}

/// A distributed policy asked for more than one process, without being told
/// its rank, acts as the launcher
pub fn role(config: &ToolboxConfig, bootstrap: &BootstrapArgs) -> Role {
    if config.agent.kind.is_distributed() && config.launch.processes > 1 && !bootstrap.has_rank() {
        Role::Launcher
    } else {
        Role::Rank
    }
}

/// Connector for the configured policy; `None` for single-process runs
pub fn connector(config: &ToolboxConfig) -> Option<Connector> {
    config.agent.kind.is_distributed().then(|| Connector::Tcp {
        coordinator: config.group.coordinator.clone(),
        connect_timeout: Duration::from_millis(config.group.connect_timeout_ms),
    })
}

/// A one-process run of a distributed policy is its own launcher: unless
/// told otherwise it is rank 0 of a group of 1
pub fn rank_args(config: &ToolboxConfig, args: &[String]) -> Result<Vec<String>> {
    let mut args = args.to_vec();
    if config.agent.kind.is_distributed()
        && config.launch.processes == 1
        && !BootstrapArgs::resolve(&args)?.has_rank()
    {
        debug!("No rank given for a single-process group, running as rank 0 of 1");
        args.extend(["--rank", "0", "--world-size", "1"].map(String::from));
    }
    Ok(args)
}

/// Run this process as one rank against the synthetic engine
pub fn run_rank(
    config: &ToolboxConfig,
    args: &[String],
    metrics: Option<&PrometheusHandle>,
) -> Result<Outcome> {
    run_rank_with(config, args, metrics, connector(config))
}

/// [`run_rank`] with an explicit process group connector
pub fn run_rank_with(
    config: &ToolboxConfig,
    args: &[String],
    metrics: Option<&PrometheusHandle>,
    connector: Option<Connector>,
) -> Result<Outcome> {
    let args = rank_args(config, args)?;
    let mut engine = SyntheticEngine::new(config.engine.clone());

    if engine.valid_shots()?.is_empty() {
        warn!("No valid shots to migrate; skipping migration");
        return Ok(Outcome::NoShots);
    }

    let agent = config
        .agent
        .kind
        .build::<SyntheticEngine>(connector, config.group.thread_support)?;

    let mut job = MigrationJob::new(agent);
    job.assign_engine(&mut engine).assign_args(args.iter().cloned());

    match job.execute()? {
        Completion::Contributed { rank } => Ok(Outcome::Contributed { rank }),
        Completion::Finalized(result) => {
            let writer = ResultWriter::from_config(&config.output);
            let summary = writer.write(&result)?;
            if let Some(handle) = metrics {
                writer.write_metrics(&summary, &handle.render())?;
            }
            info!("Run {} complete", summary.run_id);
            Ok(Outcome::Written(summary))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;
    use crate::output::{read_buffer, read_metadata};
    use crate::utils::errors::ToolboxError;
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn small_config(dir: &TempDir) -> ToolboxConfig {
        let mut config = ToolboxConfig::default();
        config.engine.nx = 4;
        config.engine.nz = 4;
        config.engine.first_shot = 0;
        config.engine.last_shot = 9;
        config.output.dir = dir.path().to_path_buf();
        config
    }

    fn written(outcome: Outcome) -> WriteSummary {
        match outcome {
            Outcome::Written(summary) => summary,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_config_path_skips_bootstrap_flags() {
        assert_eq!(config_path(&args(&["stbx"])), None);
        assert_eq!(
            config_path(&args(&["stbx", "--rank", "1", "run.toml"])),
            Some(PathBuf::from("run.toml"))
        );
        assert_eq!(
            config_path(&args(&["stbx", "--world-size=4", "run.json", "--coordinator", "h:1"])),
            Some(PathBuf::from("run.json"))
        );
    }

    #[test]
    fn test_role_selection() {
        let mut config = ToolboxConfig::default();
        let unranked = BootstrapArgs::default();
        let ranked = BootstrapArgs {
            rank: Some(0),
            ..Default::default()
        };

        assert_eq!(role(&config, &unranked), Role::Rank);

        config.agent.kind = AgentKind::StaticServer;
        config.launch.processes = 3;
        assert_eq!(role(&config, &unranked), Role::Launcher);
        assert_eq!(role(&config, &ranked), Role::Rank);

        config.launch.processes = 1;
        assert_eq!(role(&config, &unranked), Role::Rank);
    }

    #[test]
    fn test_connector_only_for_distributed_policies() {
        let mut config = ToolboxConfig::default();
        assert!(connector(&config).is_none());

        config.agent.kind = AgentKind::DynamicServerless;
        assert!(matches!(connector(&config), Some(Connector::Tcp { .. })));
    }

    #[test]
    fn test_single_process_run_writes_result() {
        let dir = TempDir::new().unwrap();
        let config = small_config(&dir);

        let summary = written(run_rank(&config, &args(&["stbx"]), None).unwrap());

        let metadata = read_metadata(&summary.run_dir).unwrap();
        let illumination = metadata.buffers.iter().find(|b| b.name == "illumination").unwrap();
        let samples = read_buffer(&summary.run_dir, illumination).unwrap();
        assert!(samples.iter().all(|s| *s == 10.0));
    }

    #[test]
    fn test_rank_args_default_to_single_process_group() {
        let mut config = ToolboxConfig::default();
        config.agent.kind = AgentKind::StaticServerless;

        let filled = rank_args(&config, &args(&["stbx", "run.toml"])).unwrap();
        assert_eq!(filled, args(&["stbx", "run.toml", "--rank", "0", "--world-size", "1"]));

        let given = args(&["stbx", "--rank", "2", "--world-size", "3"]);
        assert_eq!(rank_args(&config, &given).unwrap(), given);

        config.agent.kind = AgentKind::Normal;
        assert_eq!(rank_args(&config, &args(&["stbx"])).unwrap(), args(&["stbx"]));
    }

    #[test]
    fn test_single_process_static_serverless_run() {
        let dir = TempDir::new().unwrap();
        let mut config = small_config(&dir);
        config.agent.kind = AgentKind::StaticServerless;

        assert_eq!(role(&config, &BootstrapArgs::default()), Role::Rank);
        let summary = written(run_rank(&config, &args(&["stbx"]), None).unwrap());

        let metadata = read_metadata(&summary.run_dir).unwrap();
        let illumination = metadata.buffers.iter().find(|b| b.name == "illumination").unwrap();
        let samples = read_buffer(&summary.run_dir, illumination).unwrap();
        assert!(samples.iter().all(|s| *s == 10.0));
    }

    #[test]
    fn test_single_process_static_server_reports_capacity() {
        let dir = TempDir::new().unwrap();
        let mut config = small_config(&dir);
        config.agent.kind = AgentKind::StaticServer;

        let result = run_rank(&config, &args(&["stbx"]), None);
        assert!(matches!(
            result,
            Err(ToolboxError::InsufficientProcesses {
                process_count: 1,
                required: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_shot_list_skips_migration() {
        let dir = TempDir::new().unwrap();
        let mut config = small_config(&dir);
        config.engine.first_shot = 10;
        config.engine.last_shot = 5;

        let outcome = run_rank(&config, &args(&["stbx"]), None).unwrap();
        assert!(matches!(outcome, Outcome::NoShots));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_dynamic_run_over_tcp() {
        let dir = TempDir::new().unwrap();
        let mut config = small_config(&dir);
        config.agent.kind = AgentKind::DynamicServerless;
        config.engine.cost_jitter_ms = 5;
        config.launch.processes = 3;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        config.group.coordinator = listener.local_addr().unwrap().to_string();
        let mut listener = Some(listener);

        let size = 3;
        let handles: Vec<_> = (0..size)
            .map(|rank| {
                let config = config.clone();
                let connector = match listener.take() {
                    Some(listener) => Connector::TcpListening {
                        listener,
                        connect_timeout: Duration::from_secs(10),
                    },
                    None => connector(&config).unwrap(),
                };
                thread::spawn(move || {
                    let rank_args = args(&[
                        "stbx",
                        "--rank",
                        &rank.to_string(),
                        "--world-size",
                        &size.to_string(),
                    ]);
                    run_rank_with(&config, &rank_args, None, Some(connector)).unwrap()
                })
            })
            .collect();

        let mut written = None;
        for (rank, handle) in handles.into_iter().enumerate() {
            match handle.join().unwrap() {
                Outcome::Written(summary) => {
                    assert_eq!(rank, 0);
                    written = Some(summary);
                }
                Outcome::Contributed { rank: contributed } => assert_eq!(contributed, rank),
                Outcome::NoShots => panic!("shots were configured"),
            }
        }

        let summary = written.unwrap();
        let metadata = read_metadata(&summary.run_dir).unwrap();
        let illumination = metadata.buffers.iter().find(|b| b.name == "illumination").unwrap();
        let samples = read_buffer(&summary.run_dir, illumination).unwrap();
        assert!(samples.iter().all(|s| *s == 10.0));
    }
}
