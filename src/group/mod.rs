// src/group/mod.rs
//! Process groups
//!
//! Cooperating processes share no memory; everything goes through explicit
//! messages. This module provides:
//!
//! - **Communicator**: rank/size, point-to-point send/recv, and the barrier,
//!   sum-reduction and finalize collectives
//! - **Mailbox**: buffering of messages that arrive before they are wanted
//! - **LocalGroup**: ranks as threads of one process (crossbeam channels)
//! - **TcpGroup**: ranks as separate OS processes (length-delimited TCP frames)
//! - **Connector**: how an agent establishes its group at initialization

pub mod communicator;
pub mod connector;
pub mod local;
pub mod mailbox;
pub mod message;
pub mod tcp;

// Re-export commonly used types
pub use communicator::{Communicator, ThreadSupport};
pub use connector::{BootstrapArgs, Connector, ProcessIdentity};
pub use local::{LocalEndpoint, LocalGroup};
pub use mailbox::Mailbox;
pub use message::{
    Availability, Capacity, DispatchMessage, Envelope, Payload, PoolStatus, Rank, Tag, COORDINATOR,
};
pub use tcp::{TcpGroup, TcpSettings};
