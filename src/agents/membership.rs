// src/agents/membership.rs
//! Process group membership shared by the multi-process agents

use crate::group::{Communicator, Connector, ProcessIdentity, ThreadSupport};
use crate::utils::errors::{Result, ToolboxError};
use tracing::{info, warn};

/// Threading level the agents ask their group for unless configured otherwise
pub const REQUESTED_THREAD_SUPPORT: ThreadSupport = ThreadSupport::Funneled;

/// A connector before `initialize`, a live communicator after it
pub(crate) struct GroupMembership {
    connector: Option<Connector>,
    comm: Option<Box<dyn Communicator>>,
    identity: Option<ProcessIdentity>,
    requested: ThreadSupport,
}

impl GroupMembership {
    pub(crate) fn new(connector: Connector) -> Self {
        Self {
            connector: Some(connector),
            comm: None,
            identity: None,
            requested: REQUESTED_THREAD_SUPPORT,
        }
    }

    pub(crate) fn request_thread_support(&mut self, level: ThreadSupport) {
        self.requested = level;
    }

    /// Establish the group and check it has at least `required` processes
    pub(crate) fn join(
        &mut self,
        agent: &'static str,
        args: &[String],
        required: usize,
    ) -> Result<ProcessIdentity> {
        let connector = self.connector.take().ok_or_else(|| {
            ToolboxError::GroupFailed(format!("{} already joined its process group", agent))
        })?;

        let comm = connector.connect(args)?;

        let provided = comm.thread_support();
        if provided < self.requested {
            warn!(
                "Process group provides {:?} thread support, {:?} was requested; continuing",
                provided, self.requested
            );
        }

        let identity = ProcessIdentity {
            rank: comm.rank(),
            process_count: comm.size(),
        };

        if identity.process_count < required {
            return Err(ToolboxError::InsufficientProcesses {
                agent,
                process_count: identity.process_count,
                required,
            });
        }

        info!(
            "Rank {} joined a group of {} process(es)",
            identity.rank, identity.process_count
        );

        self.comm = Some(comm);
        self.identity = Some(identity);
        Ok(identity)
    }

    pub(crate) fn identity(&self) -> Option<ProcessIdentity> {
        self.identity
    }

    /// Identity, or an error when used before `join`
    pub(crate) fn joined(&self) -> Result<ProcessIdentity> {
        self.identity.ok_or_else(not_joined)
    }

    pub(crate) fn comm(&mut self) -> Result<&mut Box<dyn Communicator>> {
        self.comm.as_mut().ok_or_else(not_joined)
    }
}

fn not_joined() -> ToolboxError {
    ToolboxError::GroupFailed("agent has not joined a process group; call initialize first".into())
}
