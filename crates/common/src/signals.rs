//! Termination signal subscription
//!
//! Handlers are installed by [`TerminationSignals::register`], synchronously,
//! so a signal delivered any time after that call is observed instead of
//! taking the default action. Register before announcing readiness or
//! spawning children.

use std::io;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Registered SIGINT/SIGTERM (ctrl-c on Windows) listeners
pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl TerminationSignals {
    /// Install the handlers. Must be called from inside a Tokio runtime.
    pub fn register() -> io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            interrupt: signal(SignalKind::interrupt())?,
            #[cfg(unix)]
            terminate: signal(SignalKind::terminate())?,
            #[cfg(windows)]
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Wait for the next signal and return its name.
    pub async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => "SIGINT",
                _ = self.terminate.recv() => "SIGTERM",
            }
        }

        #[cfg(windows)]
        {
            self.ctrl_c.recv().await;
            "SIGINT"
        }
    }
}
