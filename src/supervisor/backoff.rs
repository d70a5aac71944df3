// supervisor/backoff.rs
use std::time::Duration;

/// Doubling reconnect delay with a ceiling. Only a successful connect
/// brings it back to the floor.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, max: Duration) -> Self {
        Self {
            floor,
            max,
            current: floor,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Records a failed attempt and returns the delay before the next one.
    pub fn fail(&mut self) -> Duration {
        self.current = self.current.saturating_mul(2).min(self.max);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}
