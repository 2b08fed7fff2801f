//! Orchestrator entry point
//!
//! Run with: cargo run -p harness-e2e -- --server-command "harness-web"

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;

use harness_common::logging;
use harness_e2e::{shutdown, HarnessResult, Lifecycle, PortMode, RunnerConfig};

#[derive(Parser, Debug)]
#[command(name = "harness-e2e")]
#[command(about = "Boot the fixture server, run browser tests, tear everything down")]
#[command(version)]
struct Args {
    /// TOML configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shell command that starts the fixture server
    #[arg(long)]
    server_command: Option<String>,

    /// Preferred server port
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Inherit server output and trust --port instead of parsing the startup line
    #[arg(long)]
    fixed_port: bool,

    /// Fixture directory handed to the server
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Browser install command
    #[arg(long)]
    install_command: Option<String>,

    /// Skip the browser install phase
    #[arg(long)]
    skip_install: bool,

    /// Test command (receives the base URL in TEST_URL)
    #[arg(long)]
    test_command: Option<String>,

    /// Health endpoint path
    #[arg(long)]
    health_path: Option<String>,

    /// Readiness deadline in seconds
    #[arg(long)]
    readiness_timeout_secs: Option<u64>,

    /// Overall run deadline in seconds
    #[arg(long)]
    run_timeout_secs: Option<u64>,

    /// Terminate whatever already listens on the preferred port
    #[arg(long)]
    kill_port_occupants: bool,

    /// Alternate shell interpreter, invoked as `<shell> -c <command>`
    #[arg(long, env = "HARNESS_SHELL")]
    shell: Option<PathBuf>,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> HarnessResult<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::load(path)?,
            None => RunnerConfig::default(),
        };

        if let Some(command) = self.server_command {
            config.server.command = command;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.fixed_port {
            config.server.port_mode = PortMode::Fixed;
        }
        if let Some(dir) = self.static_dir {
            config.server.static_dir = dir;
        }
        if let Some(command) = self.install_command {
            config.tests.install_command = Some(command);
        }
        if self.skip_install {
            config.tests.install_command = None;
        }
        if let Some(command) = self.test_command {
            config.tests.command = command;
        }
        if let Some(path) = self.health_path {
            config.readiness.health_path = path;
        }
        if let Some(secs) = self.readiness_timeout_secs {
            config.readiness.timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = self.run_timeout_secs {
            config.run_timeout_ms = secs.saturating_mul(1000);
        }
        if self.kill_port_occupants {
            config.kill_port_occupants = true;
        }
        if self.shell.is_some() {
            config.shell = self.shell;
        }
        if self.report.is_some() {
            config.report_path = self.report;
        }

        Ok(config)
    }
}

fn prepare(args: Args) -> anyhow::Result<Lifecycle> {
    let source = args.config.clone();
    let config = args.into_config().with_context(|| match &source {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to build configuration".to_string(),
    })?;
    Ok(Lifecycle::new(config)?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(if args.verbose { "debug" } else { "info" });

    // Subscribe before anything is spawned so an early ctrl-c still tears down.
    let shutdown = match shutdown::install() {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to install signal handlers: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let lifecycle = match prepare(args) {
        Ok(lifecycle) => lifecycle,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let report_path = lifecycle.config().report_path.clone();

    let report = lifecycle.run(shutdown).await;

    if let Some(path) = report_path {
        if let Err(e) = report.write(&path) {
            error!("Failed to write report: {}", e);
        }
    }

    ExitCode::from(report.exit_code)
}
