// src/agents/mod.rs
//! Shot scheduling agents
//!
//! An agent drives one engine through the migration lifecycle and decides
//! which shots this process migrates:
//!
//! - **NormalAgent**: single process, every shot in one round
//! - **StaticServerAgent**: rank 0 only aggregates, workers split the list
//! - **StaticServerlessAgent**: every rank takes a round-robin share
//! - **DynamicServerlessAgent**: rank 0 hands out one shot at a time on request
//!
//! The multi-process agents finish with a sum-reduction onto rank 0; every
//! other rank completes with [`Completion::Contributed`].

pub mod agent;
pub mod dynamic_serverless;
pub mod factory;
pub mod job;
mod membership;
pub mod normal;
pub mod partition;
pub mod reduction;
pub mod static_server;
pub mod static_serverless;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use agent::{Agent, Completion};
pub use dynamic_serverless::{DispatchRecord, DynamicServerlessAgent};
pub use factory::AgentKind;
pub use job::MigrationJob;
pub use membership::REQUESTED_THREAD_SUPPORT;
pub use normal::NormalAgent;
pub use reduction::reduce_migration_result;
pub use static_server::StaticServerAgent;
pub use static_serverless::StaticServerlessAgent;
