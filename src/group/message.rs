// src/group/message.rs
//! Messages exchanged inside a process group

use crate::engine::ShotId;
use serde::{Deserialize, Serialize};

/// 0-based process identifier within the group
pub type Rank = usize;

/// The rank responsible for dispatch and reduction
pub const COORDINATOR: Rank = 0;

/// Matching key for receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Hello,
    Barrier,
    Dispatch,
    /// Contribution to the reduction of result buffer `n`
    Reduce(u32),
}

/// Worker → coordinator: is the worker free for another shot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Busy,
    Ready,
}

/// Coordinator → worker: are unclaimed shots left in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    Remaining,
    Exhausted,
}

/// Coordinator → worker: did this worker get any work at all.
/// `Idle` means the group had more workers than shots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capacity {
    Assigned,
    Idle,
}

/// Dynamic shot distribution protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchMessage {
    Request {
        rank: Rank,
        availability: Availability,
    },
    Reply {
        shot: Option<ShotId>,
        pool: PoolStatus,
        capacity: Capacity,
    },
}

impl DispatchMessage {
    /// Reply carrying one shot for the requesting worker
    pub fn assignment(shot: ShotId) -> Self {
        DispatchMessage::Reply {
            shot: Some(shot),
            pool: PoolStatus::Remaining,
            capacity: Capacity::Assigned,
        }
    }

    /// Reply telling the worker to stop requesting
    pub fn exhausted(capacity: Capacity) -> Self {
        DispatchMessage::Reply {
            shot: None,
            pool: PoolStatus::Exhausted,
            capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Hello { rank: Rank },
    Barrier,
    Dispatch(DispatchMessage),
    Samples(Vec<f32>),
}

/// A payload with its routing information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: Rank,
    pub tag: Tag,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(source: Rank, tag: Tag, payload: Payload) -> Self {
        Self {
            source,
            tag,
            payload,
        }
    }

    /// Does this envelope satisfy a receive for `(source, tag)`; `None` matches any source
    pub fn matches(&self, source: Option<Rank>, tag: Tag) -> bool {
        self.tag == tag && source.map_or(true, |s| s == self.source)
    }
}
