//! Error types for the test orchestrator

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Port {port} is already in use")]
    PortUnavailable { port: u16 },

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server exited before reporting its port")]
    ServerExited,

    #[error("Server did not report its port within {0:?}")]
    PortDiscoveryTimeout(Duration),

    #[error("Server at {url} not ready after {attempts} attempts in {elapsed:?}{}", last_status_suffix(.last_status))]
    ReadinessTimeout {
        url: String,
        attempts: usize,
        elapsed: Duration,
        last_status: Option<u16>,
    },

    #[error("Dependency installation failed: `{command}` exited with {code}")]
    DependencyInstall { command: String, code: i32 },

    #[error("Test command exited with code {0}")]
    TestExecution(i32),

    #[error("Interrupted by signal")]
    Interrupted,

    #[error("Run exceeded the overall deadline of {0:?}")]
    RunTimeout(Duration),

    #[error("Orchestrator panicked: {0}")]
    Panicked(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn last_status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (last response: HTTP {code})"),
        None => String::new(),
    }
}

impl HarnessError {
    /// Whether the error came from an external interrupt or the run deadline
    /// rather than from a phase failing on its own.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HarnessError::Interrupted | HarnessError::RunTimeout(_))
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_timeout_mentions_last_status() {
        let err = HarnessError::ReadinessTimeout {
            url: "http://localhost:3000/health".into(),
            attempts: 3,
            elapsed: Duration::from_millis(300),
            last_status: Some(503),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn readiness_timeout_without_response() {
        let err = HarnessError::ReadinessTimeout {
            url: "http://localhost:1/health".into(),
            attempts: 1,
            elapsed: Duration::from_millis(100),
            last_status: None,
        };
        assert!(!err.to_string().contains("HTTP"));
    }
}
