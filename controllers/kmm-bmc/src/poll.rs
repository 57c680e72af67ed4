//! # Deadline Polling
//!
//! Every waiter in the engine is `poll(interval, deadline, predicate)`: run a
//! check, and if it did not hold, sleep one interval and try again until an
//! absolute deadline computed once at entry.
//!
//! The first check runs immediately, so a predicate that already holds costs
//! no sleep. When the remaining time is shorter than the interval the last
//! sleep is shortened, so one final check always happens at the deadline
//! itself. Dropping the returned future (e.g. from `tokio::select!`) stops the
//! loop at its current sleep.

use crate::error::EngineError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Module inspection cadence
pub const MODULE_INTERVAL: Duration = Duration::from_secs(1);
/// Helper-pod acquisition and pool stability cadence
pub const RESOURCE_INTERVAL: Duration = Duration::from_secs(5);
/// Reboot watch cadence
pub const REBOOT_INTERVAL: Duration = Duration::from_secs(5);
/// MCO transition and MachineConfig cadence
pub const TRANSITION_INTERVAL: Duration = Duration::from_secs(10);

/// Result of a deadline poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The check produced a value
    Ready(T),
    /// The deadline passed; the check ran `attempts` times over `elapsed`
    TimedOut { elapsed: Duration, attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Poll `check` every `interval` until it yields `Some` or `timeout` elapses.
///
/// `check` returning `Err` aborts the poll immediately; checks that want to
/// tolerate an error map it to `Ok(None)` themselves.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<PollOutcome<T>, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, EngineError>>,
{
    let started = Instant::now();
    let deadline = started + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = check().await? {
            return Ok(PollOutcome::Ready(value));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(PollOutcome::TimedOut {
                elapsed: now - started,
                attempts,
            });
        }

        let pause = interval.min(deadline - now);
        trace!(attempts, ?pause, "Predicate not met, sleeping");
        sleep(pause).await;
    }
}
