// src/group/tcp.rs
//! Multi-process group over TCP
//!
//! Rank 0 listens, every other rank dials in and introduces itself with a
//! `Hello` frame. Only coordinator ↔ worker links exist, which is all the
//! agents and the collectives need.
//!
//! Frames are length-delimited serde_json envelopes. A small background
//! runtime owns the sockets: one reader task per link funnels inbound frames
//! into a single queue that the blocking `recv` drains.

use crate::group::communicator::{Communicator, ThreadSupport};
use crate::group::mailbox::Mailbox;
use crate::group::message::{Envelope, Payload, Rank, Tag, COORDINATOR};
use crate::utils::errors::{Result, ToolboxError};
use bytes::{Bytes, BytesMut};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::{HashMap, HashSet};
use std::net::TcpListener as StdTcpListener;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, trace, warn};

type FrameSink = SplitSink<Framed<TcpStream, LengthDelimitedCodec>, Bytes>;
type FrameStream = SplitStream<Framed<TcpStream, LengthDelimitedCodec>>;

/// What a reader task reports about its link
#[derive(Debug)]
enum Inbound {
    Frame(Envelope),
    Closed(Rank),
    Failed(Rank, String),
}

/// Settings for joining a TCP group
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub rank: Rank,
    pub size: usize,

    /// Address the coordinator listens on
    pub coordinator: String,

    /// Bootstrap deadline. On rank 0 it covers accepting every worker and
    /// reading its hello; elsewhere it covers dialing.
    pub connect_timeout: Duration,
}

/// One rank's endpoint in a TCP group
pub struct TcpGroup {
    rank: Rank,
    size: usize,
    links: HashMap<Rank, FrameSink>,
    inbox: UnboundedReceiver<Inbound>,
    closed: HashSet<Rank>,
    mailbox: Mailbox,

    // Declared last: dropping the runtime after the links lets the sinks
    // close cleanly
    runtime: Runtime,
}

impl TcpGroup {
    /// Establish the group. Collective: blocks until every rank has joined.
    pub fn connect(settings: TcpSettings) -> Result<Self> {
        Self::establish(settings, None)
    }

    /// Establish the group as rank 0 on a socket that is already listening.
    /// `settings.coordinator` is only used for logging.
    pub fn serve(settings: TcpSettings, listener: StdTcpListener) -> Result<Self> {
        if settings.rank != COORDINATOR {
            return Err(ToolboxError::GroupFailed(format!(
                "rank {} cannot serve the group, only the coordinator listens",
                settings.rank
            )));
        }
        Self::establish(settings, Some(listener))
    }

    fn establish(settings: TcpSettings, listener: Option<StdTcpListener>) -> Result<Self> {
        if settings.rank >= settings.size {
            return Err(ToolboxError::GroupFailed(format!(
                "rank {} is outside a group of {}",
                settings.rank, settings.size
            )));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("stbx-group-io")
            .enable_all()
            .build()?;

        let (tx, inbox) = mpsc::unbounded_channel();

        let links = if settings.size < 2 {
            HashMap::new()
        } else if settings.rank == COORDINATOR {
            runtime.block_on(accept_workers(&settings, listener, tx))?
        } else {
            runtime.block_on(dial_coordinator(&settings, tx))?
        };

        info!(
            "Rank {} joined TCP process group of {} via {}",
            settings.rank, settings.size, settings.coordinator
        );

        Ok(Self {
            rank: settings.rank,
            size: settings.size,
            links,
            inbox,
            closed: HashSet::new(),
            mailbox: Mailbox::new(),
            runtime,
        })
    }

    fn peer_count(&self) -> usize {
        if self.rank == COORDINATOR {
            self.size - 1
        } else {
            1
        }
    }
}

impl Communicator for TcpGroup {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn thread_support(&self) -> ThreadSupport {
        ThreadSupport::Funneled
    }

    fn send(&mut self, dest: Rank, tag: Tag, payload: Payload) -> Result<()> {
        let frame = encode(&Envelope::new(self.rank, tag, payload))?;

        let sink = self.links.get_mut(&dest).ok_or_else(|| {
            ToolboxError::ProtocolViolation(format!(
                "rank {} has no link to rank {}",
                self.rank, dest
            ))
        })?;

        self.runtime
            .block_on(sink.send(frame))
            .map_err(|e| ToolboxError::Disconnected(format!("send to rank {} failed: {}", dest, e)))
    }

    fn recv(&mut self, source: Option<Rank>, tag: Tag) -> Result<Envelope> {
        let peer_count = self.peer_count();
        let runtime = &self.runtime;
        let inbox = &mut self.inbox;
        let closed = &mut self.closed;

        self.mailbox.recv_matching(source, tag, || loop {
            let gone = match source {
                Some(peer) => closed.contains(&peer),
                None => closed.len() >= peer_count,
            };
            if gone {
                return Err(ToolboxError::Disconnected(format!(
                    "no peer left to deliver {:?}",
                    tag
                )));
            }

            match runtime.block_on(inbox.recv()) {
                Some(Inbound::Frame(envelope)) => return Ok(envelope),
                Some(Inbound::Closed(peer)) => {
                    debug!("Rank {} closed its link", peer);
                    closed.insert(peer);
                }
                Some(Inbound::Failed(peer, reason)) => {
                    return Err(ToolboxError::Disconnected(format!(
                        "link to rank {} failed: {}",
                        peer, reason
                    )))
                }
                None => {
                    return Err(ToolboxError::Disconnected("group inbox closed".to_string()))
                }
            }
        })
    }
}

fn encode(envelope: &Envelope) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(envelope)?))
}

fn decode(frame: &BytesMut) -> Result<Envelope> {
    Ok(serde_json::from_slice(frame)?)
}

async fn listen(settings: &TcpSettings, bound: Option<StdTcpListener>) -> Result<TcpListener> {
    match bound {
        Some(listener) => {
            listener.set_nonblocking(true)?;
            Ok(TcpListener::from_std(listener)?)
        }
        None => TcpListener::bind(&settings.coordinator).await.map_err(|e| {
            ToolboxError::GroupFailed(format!("cannot listen on {}: {}", settings.coordinator, e))
        }),
    }
}

async fn accept_workers(
    settings: &TcpSettings,
    bound: Option<StdTcpListener>,
    inbox: UnboundedSender<Inbound>,
) -> Result<HashMap<Rank, FrameSink>> {
    let listener = listen(settings, bound).await?;
    let deadline = tokio::time::Instant::now() + settings.connect_timeout;

    let workers = settings.size - 1;
    info!("Coordinator listening on {} for {} workers", settings.coordinator, workers);

    let mut links = HashMap::with_capacity(workers);
    while links.len() < workers {
        let (stream, peer) = tokio::time::timeout_at(deadline, listener.accept())
            .await
            .map_err(|_| {
                ToolboxError::GroupFailed(format!(
                    "only {} of {} workers joined within {:?}",
                    links.len(),
                    workers,
                    settings.connect_timeout
                ))
            })??;
        stream.set_nodelay(true)?;

        let (sink, mut frames): (FrameSink, FrameStream) =
            Framed::new(stream, LengthDelimitedCodec::new()).split();

        let first = tokio::time::timeout_at(deadline, frames.next())
            .await
            .map_err(|_| {
                ToolboxError::GroupFailed(format!(
                    "{} connected but sent no hello within {:?}",
                    peer, settings.connect_timeout
                ))
            })?;
        let hello = match first {
            Some(frame) => decode(&frame?)?,
            None => {
                warn!("Connection from {} closed before introducing itself", peer);
                continue;
            }
        };

        let rank = match hello.payload {
            Payload::Hello { rank } => rank,
            other => {
                return Err(ToolboxError::ProtocolViolation(format!(
                    "expected hello from {}, got {:?}",
                    peer, other
                )))
            }
        };

        if rank == COORDINATOR || rank >= settings.size || links.contains_key(&rank) {
            return Err(ToolboxError::GroupFailed(format!(
                "unexpected rank {} announced by {}",
                rank, peer
            )));
        }

        debug!("Rank {} joined from {}", rank, peer);
        tokio::spawn(read_frames(rank, frames, inbox.clone()));
        links.insert(rank, sink);
    }

    Ok(links)
}

async fn dial_coordinator(
    settings: &TcpSettings,
    inbox: UnboundedSender<Inbound>,
) -> Result<HashMap<Rank, FrameSink>> {
    let deadline = Instant::now() + settings.connect_timeout;

    let stream = loop {
        match TcpStream::connect(&settings.coordinator).await {
            Ok(stream) => break stream,
            Err(e) if Instant::now() < deadline => {
                trace!("Rank {} retrying coordinator: {}", settings.rank, e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => {
                return Err(ToolboxError::GroupFailed(format!(
                    "rank {} could not reach coordinator at {}: {}",
                    settings.rank, settings.coordinator, e
                )))
            }
        }
    };
    stream.set_nodelay(true)?;

    let (mut sink, frames): (FrameSink, FrameStream) =
        Framed::new(stream, LengthDelimitedCodec::new()).split();
    let hello = Envelope::new(
        settings.rank,
        Tag::Hello,
        Payload::Hello {
            rank: settings.rank,
        },
    );
    sink.send(encode(&hello)?).await?;

    tokio::spawn(read_frames(COORDINATOR, frames, inbox));

    let mut links = HashMap::with_capacity(1);
    links.insert(COORDINATOR, sink);
    Ok(links)
}

async fn read_frames(peer: Rank, mut frames: FrameStream, inbox: UnboundedSender<Inbound>) {
    while let Some(frame) = frames.next().await {
        let inbound = match frame {
            Ok(bytes) => match decode(&bytes) {
                Ok(envelope) => Inbound::Frame(envelope),
                Err(e) => Inbound::Failed(peer, e.to_string()),
            },
            Err(e) => Inbound::Failed(peer, e.to_string()),
        };

        let failed = matches!(inbound, Inbound::Failed(..));
        if inbox.send(inbound).is_err() || failed {
            return;
        }
    }

    let _ = inbox.send(Inbound::Closed(peer));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream as StdTcpStream;
    use std::thread;

    /// A listening coordinator socket on an OS-assigned port, and its address
    fn bind_coordinator() -> (StdTcpListener, String) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        (listener, address)
    }

    fn settings(rank: Rank, size: usize, coordinator: &str) -> TcpSettings {
        TcpSettings {
            rank,
            size,
            coordinator: coordinator.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_rank_out_of_range() {
        let result = TcpGroup::connect(settings(3, 2, "127.0.0.1:1"));
        assert!(matches!(result, Err(ToolboxError::GroupFailed(_))));
    }

    #[test]
    fn test_single_rank_group_needs_no_network() {
        let mut group = TcpGroup::connect(settings(0, 1, "127.0.0.1:1")).unwrap();
        assert_eq!(group.reduce_sum(0, &[1.5]).unwrap(), Some(vec![1.5]));
        assert!(group.finalize().is_ok());
    }

    #[test]
    fn test_reduce_over_loopback() {
        let (listener, address) = bind_coordinator();
        let mut listener = Some(listener);
        let size = 3;

        let handles: Vec<_> = (0..size)
            .map(|rank| {
                let address = address.clone();
                let listener = listener.take();
                thread::spawn(move || {
                    let settings = settings(rank, size, &address);
                    let mut group = match listener {
                        Some(listener) => TcpGroup::serve(settings, listener).unwrap(),
                        None => TcpGroup::connect(settings).unwrap(),
                    };
                    assert_eq!(group.thread_support(), ThreadSupport::Funneled);

                    group.barrier().unwrap();
                    let reduced = group.reduce_sum(0, &[rank as f32, 1.0]).unwrap();
                    group.finalize().unwrap();
                    (rank, reduced)
                })
            })
            .collect();

        for handle in handles {
            let (rank, reduced) = handle.join().unwrap();
            if rank == 0 {
                assert_eq!(reduced, Some(vec![3.0, 3.0]));
            } else {
                assert!(reduced.is_none());
            }
        }
    }

    #[test]
    fn test_worker_to_worker_rejected() {
        let (listener, address) = bind_coordinator();

        let coordinator = {
            let address = address.clone();
            thread::spawn(move || {
                let mut group = TcpGroup::serve(settings(0, 3, &address), listener).unwrap();
                group.finalize().unwrap();
            })
        };

        let other = {
            let address = address.clone();
            thread::spawn(move || {
                let mut group = TcpGroup::connect(settings(2, 3, &address)).unwrap();
                group.finalize().unwrap();
            })
        };

        let mut group = TcpGroup::connect(settings(1, 3, &address)).unwrap();
        let result = group.send(2, Tag::Barrier, Payload::Barrier);
        assert!(matches!(result, Err(ToolboxError::ProtocolViolation(_))));
        group.finalize().unwrap();

        coordinator.join().unwrap();
        other.join().unwrap();
    }

    #[test]
    fn test_silent_connection_hits_bootstrap_deadline() {
        let (listener, address) = bind_coordinator();
        let _silent = StdTcpStream::connect(&address).unwrap();

        let mut settings = settings(0, 2, &address);
        settings.connect_timeout = Duration::from_millis(300);

        let started = Instant::now();
        let result = TcpGroup::serve(settings, listener);
        assert!(matches!(result, Err(ToolboxError::GroupFailed(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_only_coordinator_serves() {
        let (listener, address) = bind_coordinator();
        let result = TcpGroup::serve(settings(1, 2, &address), listener);
        assert!(matches!(result, Err(ToolboxError::GroupFailed(_))));
    }
}
