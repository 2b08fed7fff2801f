//! Lifecycle controller - sequences a run and guarantees teardown
//!
//! ```text
//! Idle -> PortCheck -> Starting -> AwaitingPort -> AwaitingReadiness
//!      -> InstallingDependencies -> RunningTests -> TearingDown -> Done
//! ```
//!
//! The pipeline is raced against the run deadline and the shutdown token;
//! whichever way it ends (including a panic), teardown runs exactly once.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{PortMode, RunnerConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::executor::{TestExecutor, TestRunResult};
use crate::poll::wait_until;
use crate::port::{is_port_available, terminate_port_occupants};
use crate::readiness::ReadinessGate;
use crate::server::ServerHandle;
use crate::shell::Shell;

/// Interval for port re-probing after termination.
const PORT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    PortCheck,
    Starting,
    AwaitingPort,
    AwaitingReadiness,
    InstallingDependencies,
    RunningTests,
    TearingDown,
    Done,
}

impl Phase {
    /// Transitions only move forward; skipping ahead (e.g. straight to
    /// teardown) is allowed.
    pub fn can_advance_to(self, next: Phase) -> bool {
        next > self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
}

/// Summary of one orchestrated run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub exit_code: u8,
    /// Last phase entered before teardown
    pub phase_reached: Phase,
    pub server_pid: Option<u32>,
    pub port: Option<u16>,
    pub readiness_ms: Option<u64>,
    pub tests: Option<TestRunResult>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    /// Write the report as pretty JSON
    pub fn write(&self, path: &Path) -> HarnessResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Report written to: {}", path.display());
        Ok(())
    }
}

/// Drives one run from port check to teardown
pub struct Lifecycle {
    config: RunnerConfig,
    shell: Shell,
    phase: Phase,
    server: Option<ServerHandle>,
    server_pid: Option<u32>,
    port: Option<u16>,
    readiness_ms: Option<u64>,
    tests: Option<TestRunResult>,
    torn_down: bool,
}

impl Lifecycle {
    pub fn new(config: RunnerConfig) -> HarnessResult<Self> {
        config.validate()?;
        let shell = Shell::resolve(config.shell.as_deref());
        Ok(Self {
            config,
            shell,
            phase: Phase::Idle,
            server: None,
            server_pid: None,
            port: None,
            readiness_ms: None,
            tests: None,
            torn_down: false,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run to completion. Never returns without having torn the server down.
    pub async fn run(mut self, shutdown: CancellationToken) -> RunReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = self.config.run_timeout();

        info!("Starting integration test...");

        let result = {
            let pipeline = AssertUnwindSafe(self.pipeline()).catch_unwind();
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => Err(HarnessError::Interrupted),
                finished = tokio::time::timeout(deadline, pipeline) => match finished {
                    Ok(Ok(result)) => result,
                    Ok(Err(panic)) => Err(HarnessError::Panicked(panic_message(panic))),
                    Err(_) => Err(HarnessError::RunTimeout(deadline)),
                },
            }
        };

        let phase_reached = self.phase;
        if let Err(e) = &result {
            error!("Error during test execution in {:?}: {}", phase_reached, e);
        }

        self.teardown().await;

        let passed = result.is_ok();
        let report = RunReport {
            started_at,
            outcome: if passed { Outcome::Passed } else { Outcome::Failed },
            exit_code: if passed { 0 } else { 1 },
            phase_reached,
            server_pid: self.server_pid,
            port: self.port,
            readiness_ms: self.readiness_ms,
            tests: self.tests,
            duration_ms: start.elapsed().as_millis() as u64,
            error: result.err().map(|e| e.to_string()),
        };

        info!(
            "Run finished: {:?} in {}ms (exit code {})",
            report.outcome, report.duration_ms, report.exit_code
        );
        report
    }

    async fn pipeline(&mut self) -> HarnessResult<()> {
        self.advance(Phase::PortCheck);
        self.preflight_port_check().await?;

        self.advance(Phase::Starting);
        let server = ServerHandle::spawn(&self.config.server, &self.shell)?;
        self.server_pid = server.pid();
        self.server = Some(server);

        self.advance(Phase::AwaitingPort);
        let startup_timeout = self.config.server.startup_timeout();
        let port = self.server_mut()?.wait_for_port(startup_timeout).await?;
        self.port = Some(port);
        let base_url = format!("http://localhost:{}", port);

        self.advance(Phase::AwaitingReadiness);
        let gate = ReadinessGate::new(&self.config.readiness)?;
        let health_url = format!("{}{}", base_url, self.config.readiness.health_path);
        let readiness = gate.wait_until_ready(&health_url).await?;
        self.readiness_ms = Some(readiness.elapsed.as_millis() as u64);

        let executor = TestExecutor::new(self.config.tests.clone(), self.shell.clone());

        if self.config.tests.install_command.is_some() {
            self.advance(Phase::InstallingDependencies);
            executor.install_dependencies().await?;
        }

        self.advance(Phase::RunningTests);
        let result = executor.run_tests(&base_url).await?;
        self.tests = Some(result);

        if result.passed() {
            Ok(())
        } else {
            Err(HarnessError::TestExecution(result.exit_code))
        }
    }

    /// Make sure the preferred port is usable, terminating an occupant only
    /// when configured to.
    async fn preflight_port_check(&self) -> HarnessResult<()> {
        let port = self.config.server.port;
        if port == 0 || is_port_available(port) {
            return Ok(());
        }

        warn!("Port {} is in use.", port);

        if self.config.kill_port_occupants {
            info!("Attempting to terminate the existing process on port {}...", port);
            match terminate_port_occupants(port).await {
                Ok(count) => debug!("Signalled {} process(es) on port {}", count, port),
                Err(e) => warn!("Error terminating process on port {}: {}", port, e),
            }

            let settle = self.config.settle_delay();
            tokio::time::sleep(settle).await;
            let released = wait_until(PORT_POLL_INTERVAL, settle, || async move {
                is_port_available(port)
            })
            .await;
            if released.is_ok() {
                info!("Port {} released", port);
                return Ok(());
            }
        }

        match self.config.server.port_mode {
            PortMode::Discover => {
                warn!(
                    "Port {} still in use; expecting the server to fall back to an OS-assigned port",
                    port
                );
                Ok(())
            }
            PortMode::Fixed => Err(HarnessError::PortUnavailable { port }),
        }
    }

    /// Stop the server and confirm its port was released. Runs once; never
    /// fails.
    async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.advance(Phase::TearingDown);

        if let Some(mut server) = self.server.take() {
            server.stop().await;
            if let Some(port) = server.port() {
                self.confirm_port_released(port).await;
            }
        }

        self.advance(Phase::Done);
    }

    async fn confirm_port_released(&self, port: u16) {
        let window = self.config.server.stop_grace();
        let released = wait_until(PORT_POLL_INTERVAL, window, || async move {
            is_port_available(port)
        })
        .await;

        match released {
            Ok(_) => debug!("Port {} released", port),
            Err(_) if self.config.kill_port_occupants => {
                warn!("Port {} still in use after stopping the server; terminating occupant", port);
                if let Err(e) = terminate_port_occupants(port).await {
                    warn!("Error terminating process on port {}: {}", port, e);
                }
            }
            Err(_) => warn!("Port {} still in use after stopping the server", port),
        }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!("Phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn server_mut(&mut self) -> HarnessResult<&mut ServerHandle> {
        self.server
            .as_mut()
            .ok_or_else(|| HarnessError::ServerStartup("server was not started".to_string()))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_only_move_forward() {
        assert!(Phase::Idle.can_advance_to(Phase::PortCheck));
        assert!(Phase::AwaitingReadiness.can_advance_to(Phase::TearingDown));
        assert!(Phase::AwaitingReadiness.can_advance_to(Phase::RunningTests));
        assert!(!Phase::RunningTests.can_advance_to(Phase::Starting));
        assert!(!Phase::Done.can_advance_to(Phase::Done));
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = RunnerConfig::default();
        config.tests.command.clear();
        assert!(Lifecycle::new(config).is_err());
    }

    #[test]
    fn report_serializes_phase_names() {
        let report = RunReport {
            started_at: Utc::now(),
            outcome: Outcome::Failed,
            exit_code: 1,
            phase_reached: Phase::AwaitingReadiness,
            server_pid: Some(1234),
            port: Some(3000),
            readiness_ms: None,
            tests: None,
            duration_ms: 10,
            error: Some("not ready".into()),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["phase_reached"], "awaiting_readiness");
        assert_eq!(json["outcome"], "failed");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.json");
        report.write(&path).unwrap();
        assert!(path.exists());
    }
}
