use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use harness_common::{logging, startup_line, TerminationSignals, DEFAULT_PORT};
use harness_web::{bind_with_fallback, listener::FALLBACK_DELAY, FixtureServer};

#[derive(Parser, Debug)]
#[command(name = "harness-web")]
#[command(about = "Static fixture server for browser tests")]
#[command(version)]
struct Cli {
    /// Preferred listen port (falls back to an OS-assigned port if taken)
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Listen address
    #[arg(long, env = "HARNESS_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Directory containing index.html and the other fixtures
    #[arg(long, env = "HARNESS_STATIC_DIR", default_value = "fixtures")]
    static_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(if cli.debug { "debug" } else { "info" });

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Error starting server: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let listener = bind_with_fallback(cli.host, cli.port, FALLBACK_DELAY).await?;
    let port = listener.local_addr()?.port();

    // Handlers go in before the announcement: the orchestrator may signal as
    // soon as it has read the line.
    let mut signals = TerminationSignals::register().context("Failed to install signal handlers")?;

    // The orchestrator reads this line from stdout; it is printed once per bind.
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", startup_line(port))?;
    stdout.flush()?;
    drop(stdout);

    let shutdown = async move {
        let name = signals.recv().await;
        info!("Received {}, shutting down", name);
    };

    FixtureServer::new(cli.static_dir)
        .serve(listener, shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}
