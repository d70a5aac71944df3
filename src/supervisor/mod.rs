// supervisor/mod.rs
mod backoff;
pub use backoff::Backoff;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::channel::{AdapterEvent, ChannelAdapter, ConnectionHandle, LinkStatus};
use crate::metrics;
use crate::models::ConnectionState;

/// Keeps the adapter connected, retrying with [`Backoff`], and owns the
/// connection state every other component reads.
pub struct ConnectionSupervisor {
    adapter: ChannelAdapter,
    floor: Duration,
    max: Duration,
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
}

/// Stops the supervisor loop when dropped or shut down.
pub struct SupervisorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

enum Outcome {
    Lost { retrying: bool },
    Shutdown,
}

impl ConnectionSupervisor {
    pub fn new(adapter: ChannelAdapter, floor: Duration, max: Duration, capacity: usize) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let (transitions, _) = broadcast::channel(capacity);
        Self {
            adapter,
            floor,
            max,
            state,
            transitions,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Every transition, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions.subscribe()
    }

    pub fn adapter(&self) -> &ChannelAdapter {
        &self.adapter
    }

    pub fn spawn(self: &Arc<Self>) -> SupervisorHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(self).run(shutdown_rx));
        SupervisorHandle { shutdown, task }
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        // Subscribe before the first connect so no loss report is missed.
        let mut events = self.adapter.subscribe();
        let mut backoff = Backoff::new(self.floor, self.max);

        loop {
            self.publish(ConnectionState::Connecting);
            metrics::record_connect_attempt();
            let attempt = tokio::select! {
                result = self.adapter.connect() => result,
                _ = shutdown.changed() => {
                    self.publish(ConnectionState::Disconnected);
                    return;
                }
            };
            let delay = match attempt {
                Ok(handle) => {
                    backoff.reset();
                    self.publish(ConnectionState::Connected);
                    let outcome = tokio::select! {
                        retrying = wait_for_loss(&self.adapter, &mut events, handle) => Outcome::Lost { retrying },
                        _ = shutdown.changed() => Outcome::Shutdown,
                    };
                    match outcome {
                        Outcome::Lost { retrying } => {
                            self.publish(if retrying {
                                ConnectionState::Reconnecting
                            } else {
                                ConnectionState::Disconnected
                            });
                            backoff.current()
                        }
                        Outcome::Shutdown => {
                            self.adapter.disconnect(handle).await;
                            self.publish(ConnectionState::Disconnected);
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Connect attempt failed");
                    metrics::record_connect_failure();
                    self.publish(ConnectionState::Disconnected);
                    backoff.fail()
                }
            };

            info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    fn publish(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            info!(state = %next, "Connection state changed");
            metrics::set_connected(next.is_connected());
            let _ = self.transitions.send(next);
        }
    }
}

async fn wait_for_loss(
    adapter: &ChannelAdapter,
    events: &mut broadcast::Receiver<AdapterEvent>,
    handle: ConnectionHandle,
) -> bool {
    loop {
        match events.recv().await {
            Ok(AdapterEvent::Status(LinkStatus::Lost {
                handle: lost,
                retrying,
            })) if lost == handle => return retrying,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Supervisor lagging behind adapter events");
                // The loss report may have been among the skipped events.
                if !adapter.is_connected().await {
                    return false;
                }
            }
            Err(broadcast::error::RecvError::Closed) => return false,
        }
    }
}
