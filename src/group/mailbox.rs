// src/group/mailbox.rs
//! Out-of-order message buffering
//!
//! Ranks do not move in lockstep: a fast worker may send its reduction
//! contribution while the coordinator is still handing out shots. Envelopes
//! that arrive before anyone asks for them wait here until a matching receive.

use crate::group::message::{Envelope, Rank, Tag};
use crate::utils::errors::Result;
use std::collections::VecDeque;
use tracing::trace;

#[derive(Debug, Default)]
pub struct Mailbox {
    pending: VecDeque<Envelope>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the first envelope matching `(source, tag)`, taking buffered
    /// envelopes first (in arrival order) and then pulling new ones from the
    /// transport, parking every non-matching arrival.
    pub fn recv_matching<F>(
        &mut self,
        source: Option<Rank>,
        tag: Tag,
        mut pull: F,
    ) -> Result<Envelope>
    where
        F: FnMut() -> Result<Envelope>,
    {
        if let Some(position) = self.pending.iter().position(|e| e.matches(source, tag)) {
            if let Some(envelope) = self.pending.remove(position) {
                return Ok(envelope);
            }
        }

        loop {
            let envelope = pull()?;
            if envelope.matches(source, tag) {
                return Ok(envelope);
            }

            trace!(
                "Parking {:?} from rank {} while waiting for {:?}",
                envelope.tag,
                envelope.source,
                tag
            );
            self.pending.push_back(envelope);
        }
    }

    /// Number of parked envelopes
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
