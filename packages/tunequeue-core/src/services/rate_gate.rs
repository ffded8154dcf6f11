//! Per-command debounce.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between invocations of one command family.
///
/// The first caller inside a window wins; everyone else is refused until the
/// interval has elapsed since the last accepted call.
pub struct RateGate {
    name: &'static str,
    interval: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            last_fired: Mutex::new(None),
        }
    }

    /// Claims the gate. Returns `false` if the previous accepted call was
    /// less than `interval` ago.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last_fired.lock();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => {
                log::debug!(
                    "[RateGate] {} refused ({:?} left)",
                    self.name,
                    self.interval - now.duration_since(at)
                );
                false
            }
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
