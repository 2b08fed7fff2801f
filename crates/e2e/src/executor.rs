//! Test execution - browser install and the test command

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::TestConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::shell::Shell;

/// Exit code reported when the test process ended without one (signal).
const NO_EXIT_CODE: i32 = 1;

/// Outcome of running the test command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestRunResult {
    pub exit_code: i32,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl TestRunResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Runs the dependency install and test commands through the shell
pub struct TestExecutor {
    config: TestConfig,
    shell: Shell,
}

impl TestExecutor {
    pub fn new(config: TestConfig, shell: Shell) -> Self {
        Self { config, shell }
    }

    /// Install browser binaries. Output is captured and only shown on failure.
    pub async fn install_dependencies(&self) -> HarnessResult<()> {
        let Some(command) = self.config.install_command.as_deref() else {
            debug!("No install command configured");
            return Ok(());
        };

        info!("Installing browsers: {}", command);
        let mut cmd = self.shell.command(command);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        debug!("install stdout: {}", String::from_utf8_lossy(&output.stdout).trim_end());

        if output.status.success() {
            info!("Browsers installed successfully.");
            return Ok(());
        }

        error!("Error installing browsers:");
        error!("{}", String::from_utf8_lossy(&output.stdout).trim_end());
        error!("{}", String::from_utf8_lossy(&output.stderr).trim_end());
        Err(HarnessError::DependencyInstall {
            command: command.to_string(),
            code: output.status.code().unwrap_or(NO_EXIT_CODE),
        })
    }

    /// Run the test command against `base_url` with inherited stdio.
    ///
    /// A failing test run is a normal result, not an error; only failing to
    /// launch the command is.
    pub async fn run_tests(&self, base_url: &str) -> HarnessResult<TestRunResult> {
        info!("Executing tests: {} ({}={})", self.config.command, self.config.url_env, base_url);

        let mut cmd = self.shell.command(&self.config.command);
        cmd.env(&self.config.url_env, base_url)
            .env("BASE_URL", base_url)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let start = Instant::now();
        let status = cmd.status().await?;
        let result = TestRunResult {
            exit_code: status.code().unwrap_or(NO_EXIT_CODE),
            duration: start.elapsed(),
        };

        if result.passed() {
            info!("Tests completed successfully in {}ms.", result.duration.as_millis());
        } else {
            error!(
                "Tests failed with exit code {} after {}ms.",
                result.exit_code,
                result.duration.as_millis()
            );
        }
        Ok(result)
    }
}
