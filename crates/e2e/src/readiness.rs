//! Readiness gate - polls the server's health endpoint

use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ReadinessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::poll::wait_until;

/// How the gate resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub elapsed: Duration,
    pub attempts: usize,
}

/// Polls a health URL until it answers 2xx or the deadline passes
pub struct ReadinessGate {
    client: reqwest::Client,
    interval: Duration,
    timeout: Duration,
}

impl ReadinessGate {
    pub fn new(config: &ReadinessConfig) -> HarnessResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            interval: config.interval(),
            timeout: config.timeout(),
        })
    }

    /// Wait for `url` to respond with a success status.
    ///
    /// Connection errors and non-success statuses are retried. Running out of
    /// time yields [`HarnessError::ReadinessTimeout`] with the last HTTP status
    /// seen, if the endpoint ever answered at all.
    pub async fn wait_until_ready(&self, url: &str) -> HarnessResult<Readiness> {
        info!("Waiting for server to be available at {}...", url);

        // 0 means no response yet; HTTP never uses it.
        let last_status = AtomicU16::new(0);
        let reported = AtomicUsize::new(0);

        let outcome = wait_until(self.interval, self.timeout, || {
            let last_status = &last_status;
            let reported = &reported;
            async move {
                match self.client.get(url).send().await {
                    Ok(resp) if resp.status().is_success() => true,
                    Ok(resp) => {
                        let status = resp.status().as_u16();
                        if last_status.swap(status, Ordering::Relaxed) != status {
                            warn!("Health check returned {}", resp.status());
                        }
                        false
                    }
                    Err(e) => {
                        // Connection refused is expected while the server boots.
                        if !e.is_connect() && reported.fetch_add(1, Ordering::Relaxed) == 0 {
                            warn!("Health check error: {}", e);
                        } else {
                            debug!("Health check not reachable yet: {}", e);
                        }
                        false
                    }
                }
            }
        })
        .await;

        match outcome {
            Ok(success) => {
                info!(
                    "Server is up and running after {}ms ({} attempts)",
                    success.elapsed.as_millis(),
                    success.attempts
                );
                Ok(Readiness {
                    elapsed: success.elapsed,
                    attempts: success.attempts,
                })
            }
            Err(timeout) => Err(HarnessError::ReadinessTimeout {
                url: url.to_string(),
                attempts: timeout.attempts,
                elapsed: timeout.elapsed,
                last_status: match last_status.load(Ordering::Relaxed) {
                    0 => None,
                    status => Some(status),
                },
            }),
        }
    }
}
