// channel/mod.rs
//! One logical duplex connection to the control server.
//!
//! A [`Transport`] knows how to open a [`Link`]; the [`ChannelAdapter`]
//! owns at most one live link, pumps its frames onto a single ordered
//! broadcast stream and reports when it goes away.

pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConnectError, InvokeError};
use crate::models::{HubEvent, Invocation, UnitAction};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames a transport hands to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFrame {
    Event(HubEvent),
    /// The link dropped and the far side is already retrying.
    Reconnecting,
}

/// An open link. Closing `inbound` (sender dropped) means the link is gone.
pub struct Link {
    pub inbound: mpsc::Receiver<LinkFrame>,
    pub outbound: mpsc::Sender<Invocation>,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self) -> Result<Link, ConnectError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up(ConnectionHandle),
    Lost {
        handle: ConnectionHandle,
        retrying: bool,
    },
}

/// Everything the adapter reports, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    Message { name: String, text: String },
    UnitAction(UnitAction),
    Status(LinkStatus),
}

struct ActiveLink {
    handle: ConnectionHandle,
    outbound: mpsc::Sender<Invocation>,
    pump: JoinHandle<()>,
}

struct AdapterInner {
    transport: Arc<dyn Transport>,
    connect_timeout: Duration,
    link: Mutex<Option<ActiveLink>>,
    events: broadcast::Sender<AdapterEvent>,
}

#[derive(Clone)]
pub struct ChannelAdapter {
    inner: Arc<AdapterInner>,
}

impl ChannelAdapter {
    pub fn new(transport: Arc<dyn Transport>, capacity: usize) -> Self {
        Self::with_connect_timeout(transport, capacity, DEFAULT_CONNECT_TIMEOUT)
    }

    /// An `open` still pending after `connect_timeout` counts as a failed
    /// attempt.
    pub fn with_connect_timeout(
        transport: Arc<dyn Transport>,
        capacity: usize,
        connect_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(AdapterInner {
                transport,
                connect_timeout,
                link: Mutex::new(None),
                events,
            }),
        }
    }

    /// Opens a link, or returns the live one if already connected.
    pub async fn connect(&self) -> Result<ConnectionHandle, ConnectError> {
        if let Some(active) = self.inner.link.lock().await.as_ref() {
            return Ok(active.handle);
        }

        let timeout = self.inner.connect_timeout;
        let link = tokio::time::timeout(timeout, self.inner.transport.open())
            .await
            .map_err(|_| {
                ConnectError::TransportUnavailable(format!(
                    "no answer within {} ms",
                    timeout.as_millis()
                ))
            })??;
        let handle = ConnectionHandle {
            id: Uuid::new_v4(),
            opened_at: Utc::now(),
        };

        let mut slot = self.inner.link.lock().await;
        if let Some(active) = slot.as_ref() {
            // Lost a race with another connect; keep the first link.
            return Ok(active.handle);
        }
        info!(connection_id = %handle.id, "Hub link established");
        let _ = self
            .inner
            .events
            .send(AdapterEvent::Status(LinkStatus::Up(handle)));
        let pump = tokio::spawn(pump_link(Arc::clone(&self.inner), handle, link.inbound));
        *slot = Some(ActiveLink {
            handle,
            outbound: link.outbound,
            pump,
        });
        Ok(handle)
    }

    /// Drops the link identified by `handle` and reports it lost. Stale
    /// handles are ignored.
    pub async fn disconnect(&self, handle: ConnectionHandle) {
        let mut slot = self.inner.link.lock().await;
        if let Some(active) = slot.take_if(|active| active.handle == handle) {
            active.pump.abort();
            info!(connection_id = %handle.id, "Hub link closed");
            let _ = self.inner.events.send(AdapterEvent::Status(LinkStatus::Lost {
                handle,
                retrying: false,
            }));
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.link.lock().await.is_some()
    }

    /// Handle of the live link, if any.
    pub async fn current(&self) -> Option<ConnectionHandle> {
        self.inner.link.lock().await.as_ref().map(|active| active.handle)
    }

    /// Sends a method call. Fails without sending when no link is up.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<(), InvokeError> {
        let outbound = match self.inner.link.lock().await.as_ref() {
            Some(active) => active.outbound.clone(),
            None => return Err(InvokeError::NotConnected),
        };
        outbound
            .send(Invocation {
                method: method.to_string(),
                args,
            })
            .await
            .map_err(|_| InvokeError::NotConnected)
    }

    /// Ordered stream of every event on every link.
    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.inner.events.subscribe()
    }

    pub fn on_message<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(String, String) + Send + 'static,
    {
        self.forward(move |event| {
            if let AdapterEvent::Message { name, text } = event {
                handler(name, text);
            }
        })
    }

    pub fn on_unit_action<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(UnitAction) + Send + 'static,
    {
        self.forward(move |event| {
            if let AdapterEvent::UnitAction(action) = event {
                handler(action);
            }
        })
    }

    pub fn on_state_change<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(LinkStatus) + Send + 'static,
    {
        self.forward(move |event| {
            if let AdapterEvent::Status(status) = event {
                handler(status);
            }
        })
    }

    fn forward<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(AdapterEvent) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Adapter subscriber lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

async fn pump_link(
    inner: Arc<AdapterInner>,
    handle: ConnectionHandle,
    mut inbound: mpsc::Receiver<LinkFrame>,
) {
    let mut retrying = false;
    while let Some(frame) = inbound.recv().await {
        let event = match frame {
            LinkFrame::Event(HubEvent::Message { name, text }) => {
                AdapterEvent::Message { name, text }
            }
            LinkFrame::Event(HubEvent::UnitAction(action)) => AdapterEvent::UnitAction(action),
            LinkFrame::Reconnecting => {
                retrying = true;
                break;
            }
        };
        let _ = inner.events.send(event);
    }

    // Dropping our own JoinHandle detaches; this task ends below.
    let ours = inner
        .link
        .lock()
        .await
        .take_if(|active| active.handle == handle)
        .is_some();
    if !ours {
        return;
    }
    debug!(connection_id = %handle.id, retrying, "Hub link lost");
    let _ = inner
        .events
        .send(AdapterEvent::Status(LinkStatus::Lost { handle, retrying }));
}
