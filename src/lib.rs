// src/lib.rs
//! Seismic Toolbox
//!
//! Shot scheduling for reverse-time migration. A migration engine knows how
//! to image a list of shots; an agent decides which shots each process
//! migrates and how the partial images are summed back together.
//!
//! # Architecture
//!
//! - **engine**: the `Engine` seam, `MigrationResult`, and a synthetic engine
//! - **agents**: the lifecycle state machine and the four scheduling policies
//! - **group**: process group transport (in-process channels or TCP)
//! - **runtime**: launcher that spawns and supervises the ranks
//! - **output**: result files and compression
//! - **driver**: glue between configuration, agent, engine, and output
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and error types

pub mod agents;
pub mod driver;
pub mod engine;
pub mod group;
pub mod observability;
pub mod output;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub use agents::{Agent, AgentKind, Completion, MigrationJob};
pub use engine::{Engine, MigrationResult, ShotId, ShotList};
pub use utils::config::ToolboxConfig;
pub use utils::errors::{Result, ToolboxError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
