// channel/websocket.rs
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use super::{Link, LinkFrame, Transport};
use crate::error::ConnectError;
use crate::models::{HubFrame, Invocation};

const LINK_BUFFER: usize = 256;
const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(15);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Hub link over a websocket carrying JSON [`HubFrame`]s.
///
/// The writer pings every `keepalive`; a link with no inbound frame of any
/// kind (pongs included) for `idle_timeout` is treated as lost.
pub struct WsTransport {
    url: String,
    keepalive: Duration,
    idle_timeout: Duration,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            keepalive: DEFAULT_KEEPALIVE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_keepalive(mut self, keepalive: Duration, idle_timeout: Duration) -> Self {
        self.keepalive = keepalive;
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self) -> Result<Link, ConnectError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ConnectError::TransportUnavailable(e.to_string()))?;
        info!(url = %self.url, "Websocket connected");
        let (mut sink, mut source) = stream.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(LINK_BUFFER);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Invocation>(LINK_BUFFER);

        let keepalive = self.keepalive;
        tokio::spawn(async move {
            let mut pings = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
            loop {
                let message = tokio::select! {
                    invocation = outbound_rx.recv() => {
                        let Some(invocation) = invocation else { break };
                        match serde_json::to_string(&HubFrame::from(invocation)) {
                            Ok(text) => Message::Text(text.into()),
                            Err(e) => {
                                warn!("Failed to encode invocation: {}", e);
                                continue;
                            }
                        }
                    }
                    _ = pings.tick() => Message::Ping(Default::default()),
                };
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let idle_timeout = self.idle_timeout;
        tokio::spawn(async move {
            loop {
                let msg = match tokio::time::timeout(idle_timeout, source.next()).await {
                    Ok(Some(msg)) => msg,
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            idle_ms = idle_timeout.as_millis() as u64,
                            "Hub went silent, dropping link"
                        );
                        break;
                    }
                };
                let frame = match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<HubFrame>(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!("Ignoring unknown hub frame: {}", e);
                            continue;
                        }
                    },
                    Ok(Message::Close(close)) => {
                        // 1012/1013 mean the server is restarting and wants a retry.
                        let retrying = close
                            .as_ref()
                            .is_some_and(|c| matches!(c.code, CloseCode::Restart | CloseCode::Again));
                        if retrying {
                            let _ = inbound_tx.send(LinkFrame::Reconnecting).await;
                        }
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Websocket receive failed: {}", e);
                        break;
                    }
                };
                if let Some(event) = frame.into_event() {
                    if inbound_tx.send(LinkFrame::Event(event)).await.is_err() {
                        break;
                    }
                }
            }
        });

        Ok(Link {
            inbound: inbound_rx,
            outbound: outbound_tx,
        })
    }
}
