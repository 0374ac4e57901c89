// src/utils/config.rs
//! Layered toolbox configuration
//!
//! Sources, later ones overriding earlier ones:
//! 1. Built-in defaults
//! 2. Optional configuration file (format chosen by extension)
//! 3. Environment variables, e.g. `STBX_AGENT__KIND=mpi-static-server`

use crate::agents::AgentKind;
use crate::engine::SyntheticEngineConfig;
use crate::group::ThreadSupport;
use crate::output::CompressionLevel;
use crate::utils::errors::{Result, ToolboxError};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolboxConfig {
    pub agent: AgentConfig,
    pub group: GroupConfig,
    pub launch: LaunchConfig,
    pub engine: SyntheticEngineConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Shot distribution policy selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub kind: AgentKind,
}

/// Process group bootstrap settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Address rank 0 listens on and the other ranks connect to
    pub coordinator: String,

    /// How long a worker keeps retrying to reach the coordinator
    pub connect_timeout_ms: u64,

    /// Threading guarantee the agents ask the group for
    pub thread_support: ThreadSupport,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            coordinator: "127.0.0.1:47000".to_string(),
            connect_timeout_ms: 30_000,
            thread_support: ThreadSupport::Funneled,
        }
    }
}

/// Launcher settings (the `mpirun` role)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Number of processes in the group
    pub processes: usize,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self { processes: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub compress: bool,
    pub compression: CompressionLevel,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            compress: false,
            compression: CompressionLevel::Balanced,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` wins when set
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ToolboxConfig {
    /// Load configuration from defaults, an optional file, and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            debug!("Reading configuration file {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: ToolboxConfig = builder
            .add_source(
                Environment::with_prefix("STBX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;

        if engine.nx == 0 || engine.ny == 0 || engine.nz == 0 {
            return Err(ToolboxError::ConfigError(format!(
                "grid dimensions must be non-zero, got {}x{}x{}",
                engine.nx, engine.ny, engine.nz
            )));
        }
        if engine.gather_dimension == 0 {
            return Err(ToolboxError::ConfigError(
                "gather dimension must be at least 1".to_string(),
            ));
        }
        if engine.last_shot < engine.first_shot {
            return Err(ToolboxError::ConfigError(format!(
                "last shot {} precedes first shot {}",
                engine.last_shot, engine.first_shot
            )));
        }
        if engine.shot_step == 0 {
            return Err(ToolboxError::ConfigError("shot step cannot be 0".to_string()));
        }
        if self.launch.processes == 0 {
            return Err(ToolboxError::ConfigError(
                "process count cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}
