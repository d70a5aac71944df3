// channel/memory.rs
//! In-process transport. Each successful `open` hands the server side of
//! the link to whoever calls [`MemoryTransport::accept`].

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

use super::{Link, LinkFrame, Transport};
use crate::error::ConnectError;
use crate::models::{HubEvent, Invocation, UnitAction};

const LINK_BUFFER: usize = 64;

#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    refuse: AtomicBool,
    stall: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
    peers_tx: mpsc::UnboundedSender<MemoryPeer>,
    peers_rx: Mutex<mpsc::UnboundedReceiver<MemoryPeer>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MemoryInner {
                refuse: AtomicBool::new(false),
                stall: AtomicBool::new(false),
                attempts: Mutex::new(Vec::new()),
                peers_tx,
                peers_rx: Mutex::new(peers_rx),
            }),
        }
    }

    /// While set, every `open` fails with `TransportUnavailable`.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// While set, every `open` hangs like a server that accepted the
    /// socket but never answers.
    pub fn stall_connections(&self, stall: bool) {
        self.inner.stall.store(stall, Ordering::SeqCst);
    }

    /// Waits for the next link a client opens.
    pub async fn accept(&self) -> Option<MemoryPeer> {
        self.inner.peers_rx.lock().await.recv().await
    }

    pub async fn attempts(&self) -> usize {
        self.inner.attempts.lock().await.len()
    }

    /// When each `open` was called, successful or not.
    pub async fn attempt_times(&self) -> Vec<Instant> {
        self.inner.attempts.lock().await.clone()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self) -> Result<Link, ConnectError> {
        self.inner.attempts.lock().await.push(Instant::now());
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(ConnectError::TransportUnavailable(
                "connection refused".into(),
            ));
        }
        if self.inner.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let (inbound_tx, inbound_rx) = mpsc::channel(LINK_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(LINK_BUFFER);
        let peer = MemoryPeer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        self.inner
            .peers_tx
            .send(peer)
            .map_err(|_| ConnectError::TransportUnavailable("transport shut down".into()))?;
        Ok(Link {
            inbound: inbound_rx,
            outbound: outbound_tx,
        })
    }
}

/// Server side of one in-memory link. Dropping it closes the link.
pub struct MemoryPeer {
    inbound: mpsc::Sender<LinkFrame>,
    outbound: mpsc::Receiver<Invocation>,
}

impl MemoryPeer {
    pub async fn send_unit_action(&self, room_id: &str, action_id: &str, payload: &str) {
        self.push(LinkFrame::Event(HubEvent::UnitAction(UnitAction {
            room_id: room_id.into(),
            action_id: action_id.into(),
            payload: payload.into(),
        })))
        .await;
    }

    pub async fn send_message(&self, name: &str, text: &str) {
        self.push(LinkFrame::Event(HubEvent::Message {
            name: name.into(),
            text: text.into(),
        }))
        .await;
    }

    /// Drops the link, flagging that the server side is retrying.
    pub async fn announce_reconnecting(self) {
        self.push(LinkFrame::Reconnecting).await;
    }

    pub fn close(self) {}

    pub async fn next_invocation(&mut self) -> Option<Invocation> {
        self.outbound.recv().await
    }

    // A client that already dropped the link just misses the frame.
    async fn push(&self, frame: LinkFrame) {
        let _ = self.inbound.send(frame).await;
    }
}
