// src/agents/factory.rs
//! Agent selection by name

use crate::agents::agent::Agent;
use crate::agents::dynamic_serverless::DynamicServerlessAgent;
use crate::agents::normal::NormalAgent;
use crate::agents::static_server::StaticServerAgent;
use crate::agents::static_serverless::StaticServerlessAgent;
use crate::engine::Engine;
use crate::group::{Connector, ThreadSupport};
use crate::utils::errors::{Result, ToolboxError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Shot distribution policy, named the way configuration files spell it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AgentKind {
    /// `normal`
    #[default]
    Normal,
    /// `mpi-static-server`
    StaticServer,
    /// `mpi-static-serverless`
    StaticServerless,
    /// `mpi-dynamic-serverless`
    DynamicServerless,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Normal,
        AgentKind::StaticServer,
        AgentKind::StaticServerless,
        AgentKind::DynamicServerless,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Normal => "normal",
            AgentKind::StaticServer => "mpi-static-server",
            AgentKind::StaticServerless => "mpi-static-serverless",
            AgentKind::DynamicServerless => "mpi-dynamic-serverless",
        }
    }

    /// Does this policy run as a process group
    pub fn is_distributed(&self) -> bool {
        !matches!(self, AgentKind::Normal)
    }

    /// Smallest group the policy can run in. The server policies need one
    /// coordinator plus at least one worker.
    pub fn min_processes(&self) -> usize {
        match self {
            AgentKind::Normal | AgentKind::StaticServerless => 1,
            AgentKind::StaticServer | AgentKind::DynamicServerless => 2,
        }
    }

    /// Construct the agent. Distributed policies need a connector.
    pub fn build<E: Engine>(
        self,
        connector: Option<Connector>,
        thread_support: ThreadSupport,
    ) -> Result<Box<dyn Agent<E>>> {
        let agent: Box<dyn Agent<E>> = match self {
            AgentKind::Normal => {
                info!("Using single agent");
                Box::new(NormalAgent::new())
            }
            AgentKind::StaticServer => {
                info!("Using shot distribution: static with server");
                Box::new(
                    StaticServerAgent::new(self.require(connector)?)
                        .with_thread_support(thread_support),
                )
            }
            AgentKind::StaticServerless => {
                info!("Using shot distribution: static without server");
                Box::new(
                    StaticServerlessAgent::new(self.require(connector)?)
                        .with_thread_support(thread_support),
                )
            }
            AgentKind::DynamicServerless => {
                info!("Using shot distribution: dynamic without server");
                Box::new(
                    DynamicServerlessAgent::new(self.require(connector)?)
                        .with_thread_support(thread_support),
                )
            }
        };

        Ok(agent)
    }

    fn require(&self, connector: Option<Connector>) -> Result<Connector> {
        connector.ok_or_else(|| {
            ToolboxError::GroupFailed(format!("{} needs a process group connector", self))
        })
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        AgentKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| ToolboxError::UnknownAgent(s.to_string()))
    }
}

impl TryFrom<String> for AgentKind {
    type Error = ToolboxError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AgentKind> for String {
    fn from(kind: AgentKind) -> Self {
        kind.as_str().to_string()
    }
}
