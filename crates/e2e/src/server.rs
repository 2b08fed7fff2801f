//! Server management - spawning, port discovery and termination

use std::borrow::Cow;
use std::process::Stdio;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use harness_common::{parse_startup_port, PORT_ENV, STATIC_DIR_ENV};

use crate::config::{PortMode, ServerConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::shell::Shell;
use crate::terminate::{terminate_tree, Termination};

/// Bound on reaping the process after a forced kill.
const FORCED_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on draining buffered output once the process is gone.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Starting,
    Running,
    Stopping,
    Terminated,
}

/// Handle to a running server process
pub struct ServerHandle {
    child: Option<Child>,
    pid: Option<u32>,
    state: ServerState,
    port: Option<u16>,
    port_rx: watch::Receiver<Option<u16>>,
    stop_grace: Duration,
    output_tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Spawn the server command.
    ///
    /// In [`PortMode::Discover`] the output is piped and scanned for the
    /// startup line; in [`PortMode::Fixed`] it is inherited and the configured
    /// port is published immediately.
    pub fn spawn(config: &ServerConfig, shell: &Shell) -> HarnessResult<Self> {
        info!("Creating server: {}", config.command);

        let mut cmd = shell.command(&config.command);
        cmd.env(PORT_ENV, config.port.to_string())
            .env(STATIC_DIR_ENV, &config.static_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        // Own process group so the whole tree can be signalled at once.
        #[cfg(unix)]
        cmd.process_group(0);

        match config.port_mode {
            PortMode::Discover => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            PortMode::Fixed => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        let mut child = cmd.spawn().map_err(|e| {
            HarnessError::ServerStartup(format!("Failed to spawn `{}`: {}", config.command, e))
        })?;
        let pid = child.id();
        info!("Server process created with PID: {:?}", pid);

        let (port_tx, port_rx) = watch::channel(None);
        let mut output_tasks = Vec::new();

        match config.port_mode {
            PortMode::Discover => {
                if let Some(stdout) = child.stdout.take() {
                    output_tasks.push(tokio::spawn(scan_stdout(stdout, port_tx)));
                }
                if let Some(stderr) = child.stderr.take() {
                    output_tasks.push(tokio::spawn(forward_stderr(stderr)));
                }
            }
            PortMode::Fixed => {
                port_tx.send_replace(Some(config.port));
            }
        }

        Ok(Self {
            child: Some(child),
            pid,
            state: ServerState::Starting,
            port: None,
            port_rx,
            stop_grace: config.stop_grace(),
            output_tasks,
        })
    }

    /// Suspend until the server's port is known.
    ///
    /// Fails with [`HarnessError::ServerExited`] if the output closes without a
    /// startup line and with [`HarnessError::PortDiscoveryTimeout`] after
    /// `limit`.
    pub async fn wait_for_port(&mut self, limit: Duration) -> HarnessResult<u16> {
        if let Some(port) = self.port {
            return Ok(port);
        }

        let mut rx = self.port_rx.clone();
        let announced = match timeout(limit, rx.wait_for(Option::is_some)).await {
            Ok(Ok(value)) => *value,
            Ok(Err(_)) => None,
            Err(_) => return Err(HarnessError::PortDiscoveryTimeout(limit)),
        };

        let port = announced.ok_or(HarnessError::ServerExited)?;
        info!("Server started on port {}", port);
        self.port = Some(port);
        self.state = ServerState::Running;
        Ok(port)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// The discovered port, once [`wait_for_port`](Self::wait_for_port) succeeded
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn base_url(&self) -> Option<String> {
        self.port.map(|port| format!("http://localhost:{}", port))
    }

    /// Stop the server: graceful tree termination, then forced after the
    /// grace period. Calling it again is a no-op. Errors are logged only.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            debug!("Server already stopped");
            return;
        };
        self.state = ServerState::Stopping;

        match child.id() {
            Some(pid) => {
                info!("Stopping server (pid: {})", pid);
                self.terminate(&mut child, pid).await;
            }
            None => debug!("Server process had already exited"),
        }

        for mut task in self.output_tasks.drain(..) {
            if timeout(OUTPUT_DRAIN_TIMEOUT, &mut task).await.is_err() {
                task.abort();
            }
        }

        self.state = ServerState::Terminated;
    }

    async fn terminate(&self, child: &mut Child, pid: u32) {
        if let Err(e) = terminate_tree(pid, Termination::Graceful) {
            warn!("Graceful termination of server failed: {}", e);
        }

        match timeout(self.stop_grace, child.wait()).await {
            Ok(Ok(status)) => info!("Server process terminated ({})", status),
            Ok(Err(e)) => warn!("Error waiting for server to exit: {}", e),
            Err(_) => {
                warn!(
                    "Server did not exit within {:?}; forcing termination",
                    self.stop_grace
                );
                if let Err(e) = terminate_tree(pid, Termination::Forced) {
                    warn!("Forced termination of server failed: {}", e);
                }
                if let Err(e) = child.start_kill() {
                    debug!("kill after tree termination: {}", e);
                }
                match timeout(FORCED_REAP_TIMEOUT, child.wait()).await {
                    Ok(Ok(status)) => info!("Server process killed ({})", status),
                    Ok(Err(e)) => warn!("Error waiting for killed server: {}", e),
                    Err(_) => warn!("Server process {} could not be reaped", pid),
                }
            }
        }

        // Sweep anything the leader left behind in its group.
        #[cfg(unix)]
        if let Err(e) = terminate_tree(pid, Termination::Forced) {
            debug!("Sweeping server process group failed: {}", e);
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Some(pid) = child.id() {
                warn!("Server handle dropped while running; killing pid {}", pid);
                let _ = terminate_tree(pid, Termination::Forced);
            }
            let _ = child.start_kill();
        }
    }
}

/// SGR/CSI escape sequences a child may emit when it thinks it owns a terminal.
static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("ANSI regex is valid"));

/// Drop terminal escape sequences from a line of child output.
pub(crate) fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}

/// Forward stdout to the log and publish the first announced port.
async fn scan_stdout<R>(stdout: R, port_tx: watch::Sender<Option<u16>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = strip_ansi(&line);
                info!("[server] {}", line);
                if port_tx.borrow().is_none() {
                    if let Some(port) = parse_startup_port(&line) {
                        port_tx.send_replace(Some(port));
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading server output: {}", e);
                break;
            }
        }
    }
}

/// Servers log to stderr as a matter of course; it is not an error channel.
async fn forward_stderr<R>(stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!("[server:stderr] {}", strip_ansi(&line));
    }
}
