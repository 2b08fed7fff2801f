//! Orchestrator configuration
//!
//! Defaults live here; a TOML file can override them and CLI flags override
//! the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// How the orchestrator learns the server's port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PortMode {
    /// Pipe the server's output and parse the startup line.
    #[default]
    Discover,
    /// Inherit the server's output; the configured port is authoritative.
    Fixed,
}

/// Configuration for the server process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Shell command that starts the fixture server
    pub command: String,

    /// Preferred port, passed to the server as `PORT`
    pub port: u16,

    pub port_mode: PortMode,

    /// Fixture root, passed to the server as `HARNESS_STATIC_DIR`
    pub static_dir: PathBuf,

    /// Working directory for the server command
    pub working_dir: Option<PathBuf>,

    /// How long to wait for the startup line
    pub startup_timeout_ms: u64,

    /// Grace period between graceful and forced termination
    pub stop_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "harness-web".to_string(),
            port: harness_common::DEFAULT_PORT,
            port_mode: PortMode::Discover,
            static_dir: PathBuf::from("fixtures"),
            working_dir: None,
            startup_timeout_ms: 30_000,
            stop_grace_ms: 5_000,
        }
    }
}

impl ServerConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Configuration for the readiness gate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub health_path: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    /// Timeout applied to each individual probe request
    pub request_timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            health_path: "/health".to_string(),
            interval_ms: 100,
            timeout_ms: 60_000,
            request_timeout_ms: 2_000,
        }
    }
}

impl ReadinessConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Configuration for dependency installation and the test command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Browser install command; `None` skips the install phase
    pub install_command: Option<String>,

    /// Test command, run with the base URL in `url_env`
    pub command: String,

    pub url_env: String,

    pub working_dir: Option<PathBuf>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            install_command: Some("npx playwright install chromium".to_string()),
            command: "npx playwright test".to_string(),
            url_env: harness_common::TEST_URL_ENV.to_string(),
            working_dir: None,
        }
    }
}

/// Configuration for a complete orchestrated run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub server: ServerConfig,
    pub readiness: ReadinessConfig,
    pub tests: TestConfig,

    /// Upper bound on the whole run
    pub run_timeout_ms: u64,

    /// Terminate whatever already listens on the preferred port
    pub kill_port_occupants: bool,

    /// Pause after terminating an occupant before probing again
    pub settle_delay_ms: u64,

    /// Alternate shell interpreter (invoked as `<shell> -c <command>`)
    pub shell: Option<PathBuf>,

    /// Where to write the JSON run report
    pub report_path: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            readiness: ReadinessConfig::default(),
            tests: TestConfig::default(),
            run_timeout_ms: 5 * 60 * 1000,
            kill_port_occupants: false,
            settle_delay_ms: 2_000,
            shell: None,
            report_path: None,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Reject settings that would make a wait unbounded or a command empty
    pub fn validate(&self) -> HarnessResult<()> {
        let invalid = |msg: &str| Err(HarnessError::Config(msg.to_string()));

        if self.server.command.trim().is_empty() {
            return invalid("server command is empty");
        }
        if self.tests.command.trim().is_empty() {
            return invalid("test command is empty");
        }
        if self.server.port_mode == PortMode::Fixed && self.server.port == 0 {
            return invalid("fixed port mode needs a non-zero port");
        }
        if !self.readiness.health_path.starts_with('/') {
            return invalid("health path must start with '/'");
        }
        if self.readiness.interval_ms == 0 {
            return invalid("readiness interval must be positive");
        }
        if self.readiness.timeout_ms == 0
            || self.server.startup_timeout_ms == 0
            || self.run_timeout_ms == 0
        {
            return invalid("timeouts must be positive");
        }
        Ok(())
    }
}
