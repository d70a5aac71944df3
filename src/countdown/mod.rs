// countdown/mod.rs
//! Live per-lamp countdowns for the one device an operator is inspecting.
//!
//! Counters tick locally once per period and are rearmed from the
//! registry whenever a fresher server value lands. Every arm or cancel
//! bumps `generation`; a timer whose captured generation is stale exits
//! without touching state, so a late tick can never revive a superseded
//! session.

mod session;
pub use session::{FocusedCountdown, SessionPhase, TickOutcome};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::devices::DeviceRegistry;
use crate::events::{DashboardEvent, EventBus};
use crate::models::{ConnectionState, Device, DeviceId};

/// Published on every arm, tick and stop of the focused session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountdownTick {
    pub device_id: DeviceId,
    pub ticks1: Option<u32>,
    pub ticks2: Option<u32>,
    pub generation: u64,
    pub phase: SessionPhase,
}

/// What the detail view renders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FocusView {
    pub device_id: Option<DeviceId>,
    pub ticks1: Option<u32>,
    pub ticks2: Option<u32>,
    pub phase: SessionPhase,
    pub generation: u64,
    pub disconnected: bool,
}

#[derive(Default)]
struct EngineState {
    focus: Option<DeviceId>,
    session: Option<FocusedCountdown>,
    phase: SessionPhase,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct EngineInner {
    state: Mutex<EngineState>,
    registry: Arc<DeviceRegistry>,
    connection: watch::Receiver<ConnectionState>,
    bus: Arc<EventBus>,
    period: Duration,
}

#[derive(Clone)]
pub struct CountdownEngine {
    inner: Arc<EngineInner>,
}

impl CountdownEngine {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        connection: watch::Receiver<ConnectionState>,
        bus: Arc<EventBus>,
        period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(EngineState::default()),
                registry,
                connection,
                bus,
                period,
            }),
        }
    }

    /// Focuses `device_id`, replacing any running session.
    pub async fn set_focus(&self, device_id: DeviceId) {
        let mut state = self.inner.state.lock().await;
        self.inner.cancel(&mut state);
        state.focus = Some(device_id);
        if let Some(device) = self.inner.registry.get(device_id) {
            self.inner.arm(&mut state, &device);
        }
    }

    pub async fn clear_focus(&self) {
        let mut state = self.inner.state.lock().await;
        self.inner.cancel(&mut state);
        state.focus = None;
    }

    /// Rearms from the fresh server values if `device` is focused.
    pub async fn on_device_update(&self, device: &Device) {
        let mut state = self.inner.state.lock().await;
        if state.focus != Some(device.id) {
            return;
        }
        self.inner.cancel(&mut state);
        self.inner.arm(&mut state, device);
    }

    /// The table was reloaded: drop the running session and rearm from the
    /// reloaded row, if the focused device is still there.
    pub async fn on_snapshot(&self) {
        let mut state = self.inner.state.lock().await;
        let Some(device_id) = state.focus else {
            return;
        };
        self.inner.cancel(&mut state);
        if let Some(device) = self.inner.registry.get(device_id) {
            self.inner.arm(&mut state, &device);
        }
    }

    /// Any state other than connected stops the session. Reconnecting
    /// does not resume it; only a fresh update does.
    pub async fn on_connection_state(&self, connection: ConnectionState) {
        if connection.is_connected() {
            return;
        }
        let mut state = self.inner.state.lock().await;
        self.inner.cancel(&mut state);
    }

    pub async fn view(&self) -> FocusView {
        let state = self.inner.state.lock().await;
        let session = state.session.as_ref();
        FocusView {
            device_id: state.focus,
            ticks1: session.and_then(|s| s.ticks1),
            ticks2: session.and_then(|s| s.ticks2),
            phase: state.phase,
            generation: state.generation,
            disconnected: !self.inner.connection.borrow().is_connected(),
        }
    }
}

impl EngineInner {
    fn cancel(&self, state: &mut EngineState) {
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if let Some(session) = state.session.take() {
            debug!(device_id = session.device_id, generation = state.generation, "Countdown cancelled");
            self.publish_idle(&session);
        }
        state.phase = SessionPhase::Idle;
    }

    fn arm(self: &Arc<Self>, state: &mut EngineState, device: &Device) {
        if !self.connection.borrow().is_connected() {
            return;
        }
        let Some(session) =
            FocusedCountdown::arm(device.id, device.remaining1, device.remaining2, state.generation)
        else {
            return;
        };
        state.phase = SessionPhase::Armed;
        let generation = state.generation;
        state.timer = Some(tokio::spawn(Arc::clone(self).run_timer(generation)));
        state.phase = SessionPhase::Ticking;
        debug!(device_id = device.id, generation, "Countdown armed");
        self.publish(&session, SessionPhase::Ticking);
        state.session = Some(session);
    }

    async fn run_timer(self: Arc<Self>, generation: u64) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let mut state = self.state.lock().await;
            if state.generation != generation {
                return;
            }
            if !self.connection.borrow().is_connected() {
                state.timer.take();
                self.cancel(&mut state);
                return;
            }
            let Some(session) = state.session.as_mut() else {
                return;
            };
            let outcome = session.tick();
            let session = session.clone();
            match outcome {
                TickOutcome::Continue => self.publish(&session, SessionPhase::Ticking),
                TickOutcome::Finished => {
                    // Our own handle; dropping it detaches instead of aborting.
                    state.timer.take();
                    state.session = None;
                    state.phase = SessionPhase::Idle;
                    self.publish(&session, SessionPhase::Idle);
                    return;
                }
            }
        }
    }

    fn publish(&self, session: &FocusedCountdown, phase: SessionPhase) {
        self.bus.publish(DashboardEvent::Countdown(CountdownTick {
            device_id: session.device_id,
            ticks1: session.ticks1,
            ticks2: session.ticks2,
            generation: session.generation,
            phase,
        }));
    }

    fn publish_idle(&self, session: &FocusedCountdown) {
        self.publish(session, SessionPhase::Idle);
    }
}
