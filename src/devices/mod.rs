// devices/mod.rs
mod snapshot;
pub use snapshot::{HttpSnapshotSource, SnapshotSource, StaticSnapshot};

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::events::{DashboardEvent, EventBus};
use crate::metrics;
use crate::models::{Device, DeviceId, Phase, PhaseAction};

/// The in-memory table of known devices. Rows come only from a REST
/// snapshot; pushed actions update rows but never create them.
pub struct DeviceRegistry {
    devices: DashMap<DeviceId, Device>,
    bus: Arc<EventBus>,
}

impl DeviceRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            devices: DashMap::new(),
            bus,
        }
    }

    /// Replaces every row with `devices`.
    pub fn load_snapshot(&self, devices: Vec<Device>) {
        self.devices.clear();
        for device in devices {
            self.devices.insert(device.id, device);
        }
        let count = self.devices.len();
        info!(count, "Device snapshot loaded");
        self.bus.publish(DashboardEvent::SnapshotLoaded { count });
    }

    /// Overwrites phases and timers of the addressed device, last write wins.
    pub fn apply_action(&self, action: &PhaseAction) -> Result<Device, RegistryError> {
        let updated = {
            let Some(mut device) = self.devices.get_mut(&action.device_id) else {
                debug!(device_id = action.device_id, "Dropping action for unknown device");
                metrics::record_unknown_device();
                return Err(RegistryError::UnknownDevice(action.device_id));
            };
            device.lamp1_phase = action.lamp1_phase;
            device.lamp2_phase = action.lamp2_phase;
            device.remaining1 = action.remaining1;
            device.remaining2 = action.remaining2;
            device.remaining = aggregate_remaining(action, device.remaining);
            device.clone()
        };

        metrics::record_action_applied();
        self.bus.publish(DashboardEvent::DeviceUpdated(updated.clone()));
        Ok(updated)
    }

    pub fn get(&self, id: DeviceId) -> Option<Device> {
        self.devices.get(&id).map(|entry| entry.value().clone())
    }

    /// All devices ordered by id.
    pub fn snapshot(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        devices.sort_by_key(|device| device.id);
        devices
    }

    pub fn by_phase(&self, phase: Phase) -> Vec<Device> {
        self.snapshot()
            .into_iter()
            .filter(|device| device.status() == phase)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn aggregate_remaining(action: &PhaseAction, previous: Option<u32>) -> Option<u32> {
    if action.remaining1.is_some() || action.remaining2.is_some() {
        let r1 = action.remaining1.unwrap_or(0);
        let r2 = action.remaining2.unwrap_or(0);
        return Some(r1.max(r2));
    }
    action.remaining.or(previous)
}
