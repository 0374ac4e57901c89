// src/group/connector.rs
//! Process group bootstrap
//!
//! An agent is handed a [`Connector`] at construction and turns it into a
//! live [`Communicator`] during `initialize`, which is when the group is
//! established and rank/process count become known.

use crate::group::communicator::Communicator;
use crate::group::local::LocalEndpoint;
use crate::group::message::Rank;
use crate::group::tcp::{TcpGroup, TcpSettings};
use crate::utils::errors::{Result, ToolboxError};
use std::net::TcpListener;
use std::time::Duration;
use tracing::debug;

/// Environment variables the launcher sets for each child
pub const RANK_ENV: &str = "STBX_RANK";
pub const WORLD_SIZE_ENV: &str = "STBX_WORLD_SIZE";
pub const COORDINATOR_ENV: &str = "STBX_COORDINATOR";

/// A process's place in its group, fixed once the group exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub rank: Rank,
    pub process_count: usize,
}

/// Bootstrap values found on the command line or in the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapArgs {
    pub rank: Option<Rank>,
    pub world_size: Option<usize>,
    pub coordinator: Option<String>,
}

impl BootstrapArgs {
    /// Pick `--rank`, `--world-size` and `--coordinator` out of `args`,
    /// accepting both `--flag value` and `--flag=value`. Other arguments are ignored.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut parsed = Self::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) => (flag, Some(value.to_string())),
                None => (arg.as_str(), None),
            };

            if !matches!(flag, "--rank" | "--world-size" | "--coordinator") {
                continue;
            }

            let value = match inline {
                Some(value) => value,
                None => iter.next().cloned().ok_or_else(|| {
                    ToolboxError::ConfigError(format!("{} expects a value", flag))
                })?,
            };

            match flag {
                "--rank" => parsed.rank = Some(parse_count(flag, &value)?),
                "--world-size" => parsed.world_size = Some(parse_count(flag, &value)?),
                _ => parsed.coordinator = Some(value),
            }
        }

        Ok(parsed)
    }

    /// Values from the launcher's environment variables
    pub fn from_env() -> Result<Self> {
        let rank = match std::env::var(RANK_ENV) {
            Ok(value) => Some(parse_count(RANK_ENV, &value)?),
            Err(_) => None,
        };
        let world_size = match std::env::var(WORLD_SIZE_ENV) {
            Ok(value) => Some(parse_count(WORLD_SIZE_ENV, &value)?),
            Err(_) => None,
        };

        Ok(Self {
            rank,
            world_size,
            coordinator: std::env::var(COORDINATOR_ENV).ok(),
        })
    }

    /// Fill gaps in `self` from `fallback`
    pub fn or(self, fallback: BootstrapArgs) -> Self {
        Self {
            rank: self.rank.or(fallback.rank),
            world_size: self.world_size.or(fallback.world_size),
            coordinator: self.coordinator.or(fallback.coordinator),
        }
    }

    /// Command line first, environment second
    pub fn resolve(args: &[String]) -> Result<Self> {
        Ok(Self::from_args(args)?.or(Self::from_env()?))
    }

    /// True when this process was told which rank it is
    pub fn has_rank(&self) -> bool {
        self.rank.is_some()
    }

    /// Rank and group size, both of which a TCP group needs
    fn identity(&self) -> Result<(Rank, usize)> {
        let rank = self.rank.ok_or_else(|| {
            ToolboxError::GroupFailed(format!("no rank given: pass --rank or set {}", RANK_ENV))
        })?;
        let size = self.world_size.ok_or_else(|| {
            ToolboxError::GroupFailed(format!(
                "no group size given: pass --world-size or set {}",
                WORLD_SIZE_ENV
            ))
        })?;
        Ok((rank, size))
    }
}

fn parse_count(flag: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        ToolboxError::ConfigError(format!("{} expects a count, got '{}'", flag, value))
    })
}

/// How an agent joins its process group
pub enum Connector {
    /// Already-created in-process endpoint
    Local(LocalEndpoint),

    /// TCP group; rank and size come from the assigned args or the environment
    Tcp {
        coordinator: String,
        connect_timeout: Duration,
    },

    /// TCP group whose coordinator socket is already listening. Only rank 0
    /// can connect this way.
    TcpListening {
        listener: TcpListener,
        connect_timeout: Duration,
    },
}

impl Connector {
    /// Establish the group. Collective across all ranks.
    pub fn connect(self, args: &[String]) -> Result<Box<dyn Communicator>> {
        match self {
            Connector::Local(endpoint) => Ok(Box::new(endpoint)),
            Connector::Tcp {
                coordinator,
                connect_timeout,
            } => {
                let bootstrap = BootstrapArgs::resolve(args)?;
                let (rank, size) = bootstrap.identity()?;
                let coordinator = bootstrap.coordinator.unwrap_or(coordinator);

                debug!("Joining TCP group as rank {} of {} at {}", rank, size, coordinator);

                let group = TcpGroup::connect(TcpSettings {
                    rank,
                    size,
                    coordinator,
                    connect_timeout,
                })?;
                Ok(Box::new(group))
            }
            Connector::TcpListening {
                listener,
                connect_timeout,
            } => {
                let (rank, size) = BootstrapArgs::resolve(args)?.identity()?;
                let coordinator = listener.local_addr()?.to_string();

                debug!("Serving TCP group of {} at {}", size, coordinator);

                let settings = TcpSettings {
                    rank,
                    size,
                    coordinator,
                    connect_timeout,
                };
                Ok(Box::new(TcpGroup::serve(settings, listener)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::local::LocalGroup;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_separate_values() {
        let cli = args(&["prog", "cfg.toml", "--rank", "2", "--world-size", "4"]);
        let parsed = BootstrapArgs::from_args(&cli).unwrap();
        assert_eq!(parsed.rank, Some(2));
        assert_eq!(parsed.world_size, Some(4));
        assert_eq!(parsed.coordinator, None);
    }

    #[test]
    fn test_parse_inline_values() {
        let parsed =
            BootstrapArgs::from_args(&args(&["--rank=1", "--coordinator=10.0.0.1:9000"])).unwrap();
        assert_eq!(parsed.rank, Some(1));
        assert_eq!(parsed.coordinator.as_deref(), Some("10.0.0.1:9000"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(BootstrapArgs::from_args(&args(&["--rank"])).is_err());
        assert!(BootstrapArgs::from_args(&args(&["--rank", "minus-one"])).is_err());
    }

    #[test]
    fn test_or_prefers_self() {
        let cli = BootstrapArgs {
            rank: Some(3),
            ..Default::default()
        };
        let env = BootstrapArgs {
            rank: Some(1),
            world_size: Some(4),
            coordinator: None,
        };

        let merged = cli.or(env);
        assert_eq!(merged.rank, Some(3));
        assert_eq!(merged.world_size, Some(4));
        assert!(merged.has_rank());
    }

    #[test]
    fn test_local_connector() {
        let mut endpoints = LocalGroup::endpoints(2);
        let endpoint = endpoints.remove(1);

        let comm = Connector::Local(endpoint).connect(&[]).unwrap();
        assert_eq!(comm.rank(), 1);
        assert_eq!(comm.size(), 2);
    }

    #[test]
    fn test_tcp_connector_needs_identity() {
        let connector = Connector::Tcp {
            coordinator: "127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(10),
        };
        let result = connector.connect(&args(&["prog", "--world-size", "1"]));
        assert!(matches!(result, Err(ToolboxError::GroupFailed(_))));
    }

    #[test]
    fn test_listening_connector_single_rank() {
        let connector = Connector::TcpListening {
            listener: TcpListener::bind("127.0.0.1:0").unwrap(),
            connect_timeout: Duration::from_secs(1),
        };

        let comm = connector
            .connect(&args(&["prog", "--rank", "0", "--world-size", "1"]))
            .unwrap();
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
    }
}
