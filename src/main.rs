// src/main.rs
//! Seismic Toolbox runner
//!
//! `seismic-toolbox [CONFIG] [--rank N --world-size N --coordinator HOST:PORT]`
//!
//! Without a rank, a distributed policy configured for several processes
//! relaunches this executable once per rank and waits for the group.

use anyhow::Result;
use seismic_toolbox::driver::{self, Outcome, Role};
use seismic_toolbox::group::BootstrapArgs;
use seismic_toolbox::observability::{init_metrics, init_tracing};
use seismic_toolbox::runtime::{LaunchPlan, ProcessLauncher};
use seismic_toolbox::utils::config::ToolboxConfig;
use tracing::{error, info};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let config = ToolboxConfig::load(driver::config_path(&args).as_deref())?;
    init_tracing(&config.logging)?;
    let metrics = init_metrics()?;

    info!(
        "Starting Seismic Toolbox v{} with agent {}",
        seismic_toolbox::VERSION,
        config.agent.kind
    );

    let bootstrap = BootstrapArgs::resolve(&args)?;

    if driver::role(&config, &bootstrap) == Role::Launcher {
        let plan = LaunchPlan::current_exe(
            args.iter().skip(1).cloned().collect(),
            config.launch.processes,
            config.group.coordinator.clone(),
        )?;
        return match ProcessLauncher::new(plan).run() {
            Ok(report) => {
                info!(
                    "All {} rank(s) finished in {:?}",
                    report.statuses.len(),
                    report.elapsed
                );
                Ok(())
            }
            Err(e) => {
                error!("Launch failed: {}", e);
                Err(e.into())
            }
        };
    }

    match driver::run_rank(&config, &args, Some(&metrics)) {
        Ok(Outcome::Written(summary)) => {
            info!("Results in {}", summary.run_dir.display());
            Ok(())
        }
        Ok(Outcome::Contributed { rank }) => {
            info!("Rank {} contributed its partial result, exiting", rank);
            std::process::exit(0);
        }
        Ok(Outcome::NoShots) => Ok(()),
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
