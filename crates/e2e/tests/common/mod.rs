//! Shared fixtures for the orchestrator integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::{routing::get, Router};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use harness_e2e::RunnerConfig;

/// An in-process `/health` endpoint standing in for the fixture server.
pub struct HealthServer {
    pub port: u16,
    task: tokio::task::JoinHandle<()>,
}

impl HealthServer {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let router = Router::new().route("/health", get(|| async { "OK" }));
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Self { port, task }
    }
}

impl Drop for HealthServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A port nothing listens on.
pub fn dead_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Shell command for a fake server that records its pid, announces `port`
/// and then idles.
pub fn stub_server(pidfile: &Path, port: u16) -> String {
    format!(
        "echo $$ > '{}'; echo 'Server running at http://localhost:{}'; exec sleep 60",
        pidfile.display(),
        port
    )
}

/// A configuration with short bounds, no browser install and a passing test.
pub fn fast_config(server_command: String) -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.server.command = server_command;
    config.server.port = 0;
    config.server.stop_grace_ms = 300;
    config.server.startup_timeout_ms = 10_000;
    config.readiness.interval_ms = 20;
    config.readiness.timeout_ms = 10_000;
    config.readiness.request_timeout_ms = 500;
    config.tests.install_command = None;
    config.tests.command = "exit 0".to_string();
    config.run_timeout_ms = 30_000;
    config
}

pub fn scratch() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("server.pid");
    (dir, pidfile)
}

pub fn read_pid(pidfile: &Path) -> u32 {
    std::fs::read_to_string(pidfile)
        .expect("server wrote its pid")
        .trim()
        .parse()
        .expect("pid is numeric")
}

/// Wait for `pidfile` to be written.
pub async fn wait_for_pidfile(pidfile: &Path, limit: Duration) -> u32 {
    let deadline = std::time::Instant::now() + limit;
    loop {
        if let Ok(text) = std::fs::read_to_string(pidfile) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        assert!(std::time::Instant::now() < deadline, "server never wrote its pid");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Whether `pid` is a live (non-zombie) process.
pub fn is_alive(pid: u32) -> bool {
    if matches!(kill(Pid::from_raw(pid as i32), None), Err(Errno::ESRCH)) {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat
            .rsplit(')')
            .next()
            .is_some_and(|rest| rest.trim_start().starts_with('Z')),
        Err(e) => e.kind() != std::io::ErrorKind::NotFound || !cfg!(target_os = "linux"),
    }
}

/// A separate process listening on an OS-assigned loopback port. Needs
/// `python3`; occupant lookup itself needs `lsof`.
pub struct PortHolder {
    pub child: std::process::Child,
    pub port: u16,
}

impl PortHolder {
    pub fn spawn() -> Self {
        use std::io::{BufRead, BufReader};
        use std::process::{Command, Stdio};

        let mut child = Command::new("python3")
            .args([
                "-c",
                "import socket, time\n\
                 s = socket.socket()\n\
                 s.bind(('127.0.0.1', 0))\n\
                 s.listen()\n\
                 print(s.getsockname()[1], flush=True)\n\
                 time.sleep(60)",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .expect("python3 is required for port occupant tests");

        let stdout = child.stdout.take().expect("piped stdout");
        let mut line = String::new();
        BufReader::new(stdout).read_line(&mut line).expect("read holder port");
        let port = line.trim().parse().expect("holder printed its port");
        Self { child, port }
    }

    /// Wait up to `limit` for the holder to exit; `None` if it is still running.
    pub async fn wait_exit(&mut self, limit: Duration) -> Option<std::process::ExitStatus> {
        let deadline = std::time::Instant::now() + limit;
        loop {
            if let Some(status) = self.child.try_wait().expect("poll holder") {
                return Some(status);
            }
            if std::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for PortHolder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
