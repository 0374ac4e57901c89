// src/group/communicator.rs
//! Process group communicator
//!
//! Transports only implement point-to-point `send`/`recv`. The collectives
//! are built on top of them through the coordinator (star topology), so every
//! transport gets identical barrier and reduction semantics.
//!
//! ```text
//!            ┌──────── rank 0 (coordinator) ────────┐
//!            │   barrier arrivals / reduce sums     │
//!            ▼              ▼                ▼      │
//!         rank 1         rank 2    ...    rank n-1 ◄┘ releases
//! ```

use crate::group::message::{Envelope, Payload, Rank, Tag, COORDINATOR};
use crate::utils::errors::{Result, ToolboxError};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Threading guarantee a group can give its callers, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadSupport {
    /// Only one thread exists
    Single,
    /// Many threads, but only the one that created the group communicates
    Funneled,
    /// Many threads communicate, one at a time
    Serialized,
    /// Any thread communicates at any time
    Multiple,
}

/// Blocking message passing between the ranks of one group
pub trait Communicator: Send {
    fn rank(&self) -> Rank;

    /// Number of processes in the group
    fn size(&self) -> usize;

    /// Threading guarantee this transport provides
    fn thread_support(&self) -> ThreadSupport;

    fn send(&mut self, dest: Rank, tag: Tag, payload: Payload) -> Result<()>;

    /// Block until an envelope matching `(source, tag)` arrives; `None` accepts any source
    fn recv(&mut self, source: Option<Rank>, tag: Tag) -> Result<Envelope>;

    fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR
    }

    /// Nobody leaves until everybody has arrived
    fn barrier(&mut self) -> Result<()> {
        let size = self.size();
        if size < 2 {
            return Ok(());
        }

        if self.is_coordinator() {
            for rank in 1..size {
                self.recv(Some(rank), Tag::Barrier)?;
            }
            for rank in 1..size {
                self.send(rank, Tag::Barrier, Payload::Barrier)?;
            }
            trace!("Barrier released for {} ranks", size);
        } else {
            self.send(COORDINATOR, Tag::Barrier, Payload::Barrier)?;
            self.recv(Some(COORDINATOR), Tag::Barrier)?;
        }

        Ok(())
    }

    /// Element-wise sum of `local` over the whole group, landing on the coordinator.
    ///
    /// Returns `Some(sum)` on the coordinator and `None` everywhere else.
    fn reduce_sum(&mut self, index: u32, local: &[f32]) -> Result<Option<Vec<f32>>> {
        let tag = Tag::Reduce(index);

        if !self.is_coordinator() {
            self.send(COORDINATOR, tag, Payload::Samples(local.to_vec()))?;
            return Ok(None);
        }

        let mut sum = local.to_vec();
        for rank in 1..self.size() {
            let envelope = self.recv(Some(rank), tag)?;
            let samples = match envelope.payload {
                Payload::Samples(samples) => samples,
                other => {
                    return Err(ToolboxError::ProtocolViolation(format!(
                        "expected samples for buffer {} from rank {}, got {:?}",
                        index, rank, other
                    )))
                }
            };

            if samples.len() != sum.len() {
                return Err(ToolboxError::ShapeMismatch(format!(
                    "rank {} contributed {} samples to buffer {}, coordinator holds {}",
                    rank,
                    samples.len(),
                    index,
                    sum.len()
                )));
            }

            for (acc, value) in sum.iter_mut().zip(samples) {
                *acc += value;
            }
        }

        Ok(Some(sum))
    }

    /// Closing collective; no rank returns before every rank has called it
    fn finalize(&mut self) -> Result<()> {
        self.barrier()
    }
}
