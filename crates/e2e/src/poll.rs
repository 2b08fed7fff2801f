//! Bounded polling
//!
//! Every "wait until X" in the orchestrator goes through [`wait_until`] so
//! that no poll can outlive its deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};

/// A probe that eventually returned `true`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSuccess {
    pub elapsed: Duration,
    pub attempts: usize,
}

/// The deadline passed before the probe returned `true`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout {
    pub elapsed: Duration,
    pub attempts: usize,
}

/// Run `probe` every `interval` until it returns `true` or `deadline` elapses.
///
/// The probe is attempted at least once. A probe still running when the
/// deadline passes is dropped and counts as a failed attempt.
pub async fn wait_until<F, Fut>(
    interval: Duration,
    deadline: Duration,
    mut probe: F,
) -> Result<PollSuccess, PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let until = start + deadline;
    let mut attempts = 0;

    loop {
        attempts += 1;
        let remaining = until.saturating_duration_since(Instant::now());

        if let Ok(true) = timeout(remaining, probe()).await {
            return Ok(PollSuccess {
                elapsed: start.elapsed(),
                attempts,
            });
        }

        let remaining = until.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(PollTimeout {
                elapsed: start.elapsed(),
                attempts,
            });
        }

        sleep(interval.min(remaining)).await;
    }
}
