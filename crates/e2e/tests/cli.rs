//! Drives the compiled orchestrator binary
#![cfg(unix)]

mod common;

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use common::{dead_port, is_alive, read_pid, scratch, stub_server, wait_for_pidfile, HealthServer};

fn orchestrator() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_harness-e2e"));
    cmd.args(["--skip-install", "--run-timeout-secs", "30"])
        .env_remove("PORT")
        .env_remove("HARNESS_SHELL")
        .env("RUST_LOG", "debug")
        .stdin(Stdio::null());
    cmd
}

/// The fixture server binary in the same target directory as this test.
fn fixture_server_binary() -> PathBuf {
    let exe = std::env::current_exe().expect("test binary path");
    let target_dir = exe
        .parent()
        .and_then(|deps| deps.parent())
        .expect("test binary lives in <target>/<profile>/deps");
    let binary = target_dir.join(format!("harness-web{}", std::env::consts::EXE_SUFFIX));
    assert!(
        binary.exists(),
        "{} not found; build the workspace binaries first (cargo test --workspace -- --ignored)",
        binary.display()
    );
    binary
}

#[tokio::test]
async fn successful_run_writes_report() {
    let health = HealthServer::start().await;
    let (dir, pidfile) = scratch();
    let report = dir.path().join("reports/run.json");

    let mut cmd = orchestrator();
    cmd.arg("--server-command")
        .arg(stub_server(&pidfile, health.port))
        .args(["--port", "0", "--test-command", "exit 0"])
        .arg("--report")
        .arg(&report);
    let status = tokio::task::spawn_blocking(move || cmd.status())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(status.code(), Some(0));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["outcome"], "passed");
    assert_eq!(json["port"], health.port);
    assert_eq!(json["tests"]["exit_code"], 0);
    assert!(!is_alive(read_pid(&pidfile)));
}

#[tokio::test]
async fn failing_test_command_exits_one() {
    let health = HealthServer::start().await;
    let (_dir, pidfile) = scratch();

    let mut cmd = orchestrator();
    cmd.arg("--server-command")
        .arg(stub_server(&pidfile, health.port))
        .args(["--port", "0", "--test-command", "exit 3"]);
    let status = tokio::task::spawn_blocking(move || cmd.status())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(status.code(), Some(1));
    assert!(!is_alive(read_pid(&pidfile)));
}

#[tokio::test]
async fn sigint_during_readiness_tears_down() {
    let (_dir, pidfile) = scratch();

    let mut child = orchestrator()
        .arg("--server-command")
        .arg(stub_server(&pidfile, dead_port()))
        .args(["--port", "0", "--readiness-timeout-secs", "60"])
        .spawn()
        .unwrap();

    let server_pid = wait_for_pidfile(&pidfile, Duration::from_secs(10)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let interrupted = Instant::now();
    kill(Pid::from_raw(child.id() as i32), Signal::SIGINT).unwrap();
    let status = tokio::task::spawn_blocking(move || child.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(status.code(), Some(1));
    assert!(interrupted.elapsed() < Duration::from_secs(15));
    assert!(!is_alive(server_pid));
}

#[tokio::test]
async fn invalid_configuration_fails_before_spawning() {
    let mut cmd = orchestrator();
    cmd.args(["--health-path", "health", "--test-command", "exit 0"]);
    let status = tokio::task::spawn_blocking(move || cmd.status())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(status.code(), Some(1));
}

#[tokio::test]
#[ignore = "needs the harness-web binary; run with cargo test --workspace -- --ignored"]
async fn end_to_end_with_fixture_server() {
    let server = fixture_server_binary();
    let fixtures = tempfile::tempdir().unwrap();
    std::fs::write(fixtures.path().join("index.html"), "<div id=\"test-completion\"></div>").unwrap();
    let (dir, _) = scratch();
    let report = dir.path().join("run.json");
    let seen_url = dir.path().join("test_url");

    let mut cmd = orchestrator();
    cmd.arg("--server-command")
        .arg(format!("exec '{}'", server.display()))
        .args(["--port", "0"])
        .arg("--static-dir")
        .arg(fixtures.path())
        .arg("--test-command")
        .arg(format!(r#"printf '%s' "$TEST_URL" > '{}'"#, seen_url.display()))
        .arg("--report")
        .arg(&report);
    let status = tokio::task::spawn_blocking(move || cmd.status())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(status.code(), Some(0));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["outcome"], "passed");
    let port = json["port"].as_u64().expect("port recorded") as u16;
    assert_ne!(port, 0);
    assert!(json["readiness_ms"].is_u64(), "health endpoint answered");

    let url = std::fs::read_to_string(&seen_url).unwrap();
    assert_eq!(url, format!("http://localhost:{port}"));
    assert!(harness_e2e::port::is_port_available(port), "port {port} released after teardown");
}
