// events/mod.rs
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::countdown::CountdownTick;
use crate::models::{ConnectionState, Device};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DeviceUpdated,
    SnapshotLoaded,
    Countdown,
    Connection,
    Message,
}

/// Everything the dashboard UI can observe.
#[derive(Debug, Clone)]
pub enum DashboardEvent {
    DeviceUpdated(Device),
    SnapshotLoaded { count: usize },
    Countdown(CountdownTick),
    Connection(ConnectionState),
    Message { name: String, text: String },
}

impl DashboardEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DashboardEvent::DeviceUpdated(_) => EventKind::DeviceUpdated,
            DashboardEvent::SnapshotLoaded { .. } => EventKind::SnapshotLoaded,
            DashboardEvent::Countdown(_) => EventKind::Countdown,
            DashboardEvent::Connection(_) => EventKind::Connection,
            DashboardEvent::Message { .. } => EventKind::Message,
        }
    }
}

type Callback = Arc<dyn Fn(&DashboardEvent) + Send + Sync>;

/// Fan-out to UI observers, either as callbacks per event kind or as a
/// broadcast stream of every event. Callbacks run inline on the
/// publishing task.
pub struct EventBus {
    subscribers: DashMap<EventKind, Vec<Callback>>,
    stream: broadcast::Sender<DashboardEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(capacity);
        Self {
            subscribers: DashMap::new(),
            stream,
        }
    }

    pub fn publish(&self, event: DashboardEvent) {
        // Copied out so callbacks may subscribe without holding the shard.
        let callbacks: Vec<Callback> = self
            .subscribers
            .get(&event.kind())
            .map(|subscribers| subscribers.value().clone())
            .unwrap_or_default();
        for callback in &callbacks {
            callback(&event);
        }
        // No receivers is fine.
        let _ = self.stream.send(event);
    }

    pub fn subscribe_fn<F: Fn(&DashboardEvent) + Send + Sync + 'static>(
        &self,
        kind: EventKind,
        callback: F,
    ) {
        self.subscribers
            .entry(kind)
            .or_default()
            .push(Arc::new(callback));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.stream.subscribe()
    }
}
