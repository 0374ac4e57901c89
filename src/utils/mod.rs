// src/utils/mod.rs
//! Common utilities: configuration and error types

pub mod config;
pub mod errors;

pub use config::{
    AgentConfig, GroupConfig, LaunchConfig, LoggingConfig, OutputConfig, ToolboxConfig,
};
pub use errors::{Result, ToolboxError};
