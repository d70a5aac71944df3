// countdown/session.rs
use serde::Serialize;

use crate::models::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Only held under the engine lock while the timer is spawned, so
    /// observers go straight from idle to ticking.
    Armed,
    Ticking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Finished,
}

/// Local per-lamp counters for the focused device. `None` means the
/// server sent no timer for that lamp, which is not the same as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusedCountdown {
    pub device_id: DeviceId,
    pub ticks1: Option<u32>,
    pub ticks2: Option<u32>,
    pub generation: u64,
}

impl FocusedCountdown {
    /// Returns `None` when there is nothing to count down.
    pub fn arm(
        device_id: DeviceId,
        remaining1: Option<u32>,
        remaining2: Option<u32>,
        generation: u64,
    ) -> Option<Self> {
        let session = Self {
            device_id,
            ticks1: remaining1,
            ticks2: remaining2,
            generation,
        };
        (!session.is_exhausted()).then_some(session)
    }

    pub fn tick(&mut self) -> TickOutcome {
        for counter in [&mut self.ticks1, &mut self.ticks2] {
            if let Some(value) = counter.as_mut().filter(|v| **v > 0) {
                *value -= 1;
            }
        }
        if self.is_exhausted() {
            TickOutcome::Finished
        } else {
            TickOutcome::Continue
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.ticks1.unwrap_or(0) == 0 && self.ticks2.unwrap_or(0) == 0
    }
}
