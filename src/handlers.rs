// handlers.rs
//! Inbound pipeline: adapter events and connection transitions flow
//! through here, one at a time and in arrival order, into the registry,
//! the countdown engine and the fan-out bus.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::channel::AdapterEvent;
use crate::countdown::CountdownEngine;
use crate::decoder;
use crate::devices::DeviceRegistry;
use crate::events::{DashboardEvent, EventBus};
use crate::models::{ConnectionState, PhaseAction, UnitAction};

#[derive(Clone)]
pub struct Pipeline {
    pub registry: Arc<DeviceRegistry>,
    pub countdown: CountdownEngine,
    pub bus: Arc<EventBus>,
    pub connection: watch::Receiver<ConnectionState>,
}

pub async fn run(
    pipeline: Pipeline,
    mut events: broadcast::Receiver<AdapterEvent>,
    mut transitions: broadcast::Receiver<ConnectionState>,
) {
    loop {
        tokio::select! {
            biased;
            transition = transitions.recv() => match transition {
                Ok(state) => handle_state_change(&pipeline, state).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed connection transitions, resyncing");
                    let current = *pipeline.connection.borrow();
                    handle_state_change(&pipeline, current).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            event = events.recv() => match event {
                Ok(AdapterEvent::UnitAction(action)) => handle_unit_action(&pipeline, action).await,
                Ok(AdapterEvent::Message { name, text }) => handle_message(&pipeline, name, text).await,
                Ok(AdapterEvent::Status(_)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dropped inbound hub events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

pub async fn handle_unit_action(pipeline: &Pipeline, action: UnitAction) {
    debug!(room_id = %action.room_id, action_id = %action.action_id, "Unit action received");
    if let Some(decoded) = decoder::decode(&action.payload) {
        apply(pipeline, decoded).await;
    }
}

/// Generic messages go to observers. Older servers pushed phase
/// payloads this way, so a message that decodes is applied as well.
pub async fn handle_message(pipeline: &Pipeline, name: String, text: String) {
    let decoded = decoder::try_decode(&text).ok();
    pipeline
        .bus
        .publish(DashboardEvent::Message { name, text });
    if let Some(decoded) = decoded {
        apply(pipeline, decoded).await;
    }
}

pub async fn handle_state_change(pipeline: &Pipeline, state: ConnectionState) {
    pipeline.countdown.on_connection_state(state).await;
    pipeline.bus.publish(DashboardEvent::Connection(state));
}

async fn apply(pipeline: &Pipeline, action: PhaseAction) {
    // Unknown devices are logged and counted by the registry.
    if let Ok(device) = pipeline.registry.apply_action(&action) {
        pipeline.countdown.on_device_update(&device).await;
    }
}
