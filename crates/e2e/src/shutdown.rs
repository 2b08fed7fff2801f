//! Process-wide cancellation from termination signals

use std::io;

use harness_common::TerminationSignals;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Subscribe to SIGINT (and SIGTERM on POSIX) once and return a token that
/// is cancelled when either arrives.
///
/// The handlers are installed before this returns, so a signal sent right
/// after is turned into cancellation rather than killing the process and
/// orphaning the server's process group. Must be called from inside a Tokio
/// runtime.
pub fn install() -> io::Result<CancellationToken> {
    let mut signals = TerminationSignals::register()?;
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let name = signals.recv().await;
        info!("Received {}. Tearing down...", name);
        trigger.cancel();
    });

    Ok(token)
}
