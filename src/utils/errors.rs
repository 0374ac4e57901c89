// src/utils/errors.rs
//! Error types shared across the toolbox
//!
//! Scheduling errors are not recovered locally: they travel up to the driver,
//! which logs them and terminates the process.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ToolboxError>;

/// Errors raised by agents, process groups, engines and writers
#[derive(Debug, Error)]
pub enum ToolboxError {
    /// `execute` was called before an engine was assigned
    #[error("No engine assigned to the agent")]
    EngineUnset,

    /// The engine collaborator failed
    #[error("Engine failure: {0}")]
    EngineFailed(String),

    /// The process group is too small for the chosen distribution policy
    #[error("{agent} needs at least {required} processes, but the group has {process_count}")]
    InsufficientProcesses {
        agent: &'static str,
        process_count: usize,
        required: usize,
    },

    /// Process group could not be established
    #[error("Process group failure: {0}")]
    GroupFailed(String),

    /// A peer went away while this rank was waiting on it
    #[error("Peer disconnected: {0}")]
    Disconnected(String),

    /// A message arrived that the protocol does not allow at this point
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Result buffers disagree with the declared grid shape
    #[error("Result shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Unrecognised agent type in the configuration
    #[error("Unknown agent type: {0}")]
    UnknownAgent(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Output failed: {0}")]
    OutputFailed(String),

    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Process spawn failed: {0}")]
    ProcessSpawnFailed(String),

    /// A launched rank exited unsuccessfully
    #[error("Rank {rank} exited with {status}")]
    RankFailed { rank: usize, status: String },

    /// Logging or metrics could not be installed
    #[error("Observability setup failed: {0}")]
    ObservabilityFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for ToolboxError {
    fn from(e: config::ConfigError) -> Self {
        ToolboxError::ConfigError(e.to_string())
    }
}
