// engine.rs
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::channel::websocket::WsTransport;
use crate::channel::{ChannelAdapter, Transport};
use crate::config::Settings;
use crate::countdown::{CountdownEngine, FocusView};
use crate::devices::{DeviceRegistry, HttpSnapshotSource, SnapshotSource};
use crate::error::{AppError, InvokeError, SnapshotError};
use crate::events::EventBus;
use crate::handlers::{self, Pipeline};
use crate::models::{ConnectionState, Device, DeviceId, SEND_MESSAGE};
use crate::supervisor::{ConnectionSupervisor, SupervisorHandle};

/// Wires adapter, supervisor, registry, countdown and fan-out together.
pub struct SignalSync {
    supervisor: Arc<ConnectionSupervisor>,
    registry: Arc<DeviceRegistry>,
    countdown: CountdownEngine,
    bus: Arc<EventBus>,
    snapshots: Arc<dyn SnapshotSource>,
    running: Mutex<Option<Running>>,
}

struct Running {
    supervisor: SupervisorHandle,
    pipeline: JoinHandle<()>,
}

impl SignalSync {
    pub fn new(
        settings: &Settings,
        transport: Arc<dyn Transport>,
        snapshots: Arc<dyn SnapshotSource>,
    ) -> Self {
        let capacity = settings.events.capacity;
        let bus = Arc::new(EventBus::new(capacity));
        let adapter =
            ChannelAdapter::with_connect_timeout(transport, capacity, settings.connect_timeout());
        let supervisor = Arc::new(ConnectionSupervisor::new(
            adapter,
            settings.backoff_floor(),
            settings.backoff_max(),
            capacity,
        ));
        let registry = Arc::new(DeviceRegistry::new(Arc::clone(&bus)));
        let countdown = CountdownEngine::new(
            Arc::clone(&registry),
            supervisor.watch(),
            Arc::clone(&bus),
            settings.tick_period(),
        );
        Self {
            supervisor,
            registry,
            countdown,
            bus,
            snapshots,
            running: Mutex::new(None),
        }
    }

    /// Websocket hub plus the REST control-box snapshot.
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let transport = Arc::new(
            WsTransport::new(settings.hub_url()?)
                .with_keepalive(settings.keepalive_interval(), settings.idle_timeout()),
        );
        let snapshots = Arc::new(HttpSnapshotSource::new(settings.control_box_url()));
        Ok(Self::new(settings, transport, snapshots))
    }

    /// Starts the supervisor and the inbound pipeline. Calling it again
    /// while running does nothing.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }
        let pipeline = Pipeline {
            registry: Arc::clone(&self.registry),
            countdown: self.countdown.clone(),
            bus: Arc::clone(&self.bus),
            connection: self.supervisor.watch(),
        };
        // Subscribe before spawning so nothing from the first link is missed.
        let events = self.supervisor.adapter().subscribe();
        let transitions = self.supervisor.subscribe();
        let pipeline = tokio::spawn(handlers::run(pipeline, events, transitions));
        let supervisor = self.supervisor.spawn();
        info!("Signal sync started");
        *running = Some(Running {
            supervisor,
            pipeline,
        });
    }

    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.supervisor.shutdown().await;
        running.pipeline.abort();
        self.countdown
            .on_connection_state(ConnectionState::Disconnected)
            .await;
        info!("Signal sync stopped");
    }

    /// Reloads the device table from the REST collaborator and rearms the
    /// focused countdown from the reloaded row.
    pub async fn refresh_snapshot(&self) -> Result<usize, SnapshotError> {
        let devices = self.snapshots.load().await?;
        let count = devices.len();
        self.registry.load_snapshot(devices);
        self.countdown.on_snapshot().await;
        Ok(count)
    }

    /// Diagnostics only.
    pub async fn send_message(&self, user: &str, text: &str) -> Result<(), InvokeError> {
        self.supervisor
            .adapter()
            .invoke(SEND_MESSAGE, vec![json!(user), json!(text)])
            .await
    }

    pub async fn focus(&self, device_id: DeviceId) {
        self.countdown.set_focus(device_id).await;
    }

    pub async fn clear_focus(&self) {
        self.countdown.clear_focus().await;
    }

    pub async fn focus_view(&self) -> FocusView {
        self.countdown.view().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.registry.snapshot()
    }

    pub fn device(&self, id: DeviceId) -> Option<Device> {
        self.registry.get(id)
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}
