//! Bounded polling for daemon state changes.

use std::thread;
use std::time::Duration;

/// How many times to probe, and how long to sleep between probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum number of probes.
    pub max_attempts: u32,
    /// Delay between two probes.
    pub delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            delay: Duration::from_millis(500),
        }
    }
}

impl PollConfig {
    /// Total time the poll may take, ignoring probe duration.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }
}

/// Callback for poll progress notifications.
pub trait PollCallback {
    /// Called after a probe answered "not yet".
    fn on_wait(&self, attempt: u32, max_attempts: u32);
}

/// No-op callback.
pub struct NoCallback;

impl PollCallback for NoCallback {
    fn on_wait(&self, _attempt: u32, _max_attempts: u32) {}
}

/// Probe until `check` returns true or attempts run out.
///
/// Returns whether the condition was observed.
pub fn poll_until<F>(config: &PollConfig, callback: Option<&dyn PollCallback>, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for attempt in 1..=config.max_attempts {
        if check() {
            return true;
        }
        if attempt == config.max_attempts {
            break;
        }
        if let Some(cb) = callback {
            cb.on_wait(attempt, config.max_attempts);
        }
        thread::sleep(config.delay);
    }
    false
}
