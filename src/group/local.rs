// src/group/local.rs
//! In-process process group
//!
//! Every rank is a thread holding one [`LocalEndpoint`]. Each rank owns an
//! unbounded inbox; every other rank holds a sender into it. A rank never
//! holds a sender to its own inbox, so once all of its peers are gone a
//! blocked receive fails with `Disconnected` instead of hanging.

use crate::group::communicator::{Communicator, ThreadSupport};
use crate::group::mailbox::Mailbox;
use crate::group::message::{Envelope, Payload, Rank, Tag};
use crate::utils::errors::{Result, ToolboxError};
use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

/// Factory for in-process groups
pub struct LocalGroup;

impl LocalGroup {
    /// Create the endpoints of a group of `size` ranks, indexed by rank
    pub fn endpoints(size: usize) -> Vec<LocalEndpoint> {
        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

        debug!("Local process group created with {} ranks", size);

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| {
                let peers = senders
                    .iter()
                    .enumerate()
                    .map(|(peer, sender)| (peer != rank).then(|| sender.clone()))
                    .collect();

                LocalEndpoint {
                    rank,
                    size,
                    peers,
                    inbox,
                    mailbox: Mailbox::new(),
                }
            })
            .collect()
    }
}

/// One rank's view of a [`LocalGroup`]
pub struct LocalEndpoint {
    rank: Rank,
    size: usize,
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    mailbox: Mailbox,
}

impl Communicator for LocalEndpoint {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn thread_support(&self) -> ThreadSupport {
        ThreadSupport::Multiple
    }

    fn send(&mut self, dest: Rank, tag: Tag, payload: Payload) -> Result<()> {
        let sender = match self.peers.get(dest) {
            Some(Some(sender)) => sender,
            Some(None) => {
                return Err(ToolboxError::ProtocolViolation(format!(
                    "rank {} tried to send to itself",
                    self.rank
                )))
            }
            None => {
                return Err(ToolboxError::ProtocolViolation(format!(
                    "rank {} does not exist in a group of {}",
                    dest, self.size
                )))
            }
        };

        sender
            .send(Envelope::new(self.rank, tag, payload))
            .map_err(|_| ToolboxError::Disconnected(format!("rank {} has left the group", dest)))
    }

    fn recv(&mut self, source: Option<Rank>, tag: Tag) -> Result<Envelope> {
        let rank = self.rank;
        let inbox = &self.inbox;

        self.mailbox.recv_matching(source, tag, || {
            inbox.recv().map_err(|_| {
                ToolboxError::Disconnected(format!("every peer of rank {} has left", rank))
            })
        })
    }
}
