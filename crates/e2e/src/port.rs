//! Port probing and occupant lookup

use std::collections::BTreeSet;
use std::io;
use std::net::{Ipv4Addr, TcpListener};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::terminate::{terminate_process, Termination};

/// Whether `port` can be bound on this host right now.
///
/// Binds loopback and the wildcard address and releases both immediately;
/// either failing means something else holds the port.
pub fn is_port_available(port: u16) -> bool {
    [Ipv4Addr::LOCALHOST, Ipv4Addr::UNSPECIFIED]
        .into_iter()
        .all(|ip| TcpListener::bind((ip, port)).is_ok())
}

/// Pids of processes listening on `port`, excluding this process.
pub async fn find_port_occupants(port: u16) -> io::Result<Vec<u32>> {
    let pids = if cfg!(windows) {
        let output = Command::new("netstat").args(["-ano", "-p", "TCP"]).output().await?;
        parse_netstat_listeners(&String::from_utf8_lossy(&output.stdout), port)
    } else {
        let output = Command::new("lsof")
            .args(["-nP", &format!("-iTCP:{port}"), "-sTCP:LISTEN", "-t"])
            .output()
            .await?;
        // lsof exits 1 when nothing matches; an empty list is the answer then.
        parse_lsof_pids(&String::from_utf8_lossy(&output.stdout))
    };

    let own = std::process::id();
    Ok(pids.into_iter().filter(|pid| *pid != own).collect())
}

/// Forcibly terminate every process listening on `port`.
///
/// Returns how many processes were signalled. Individual failures are
/// logged, not returned.
pub async fn terminate_port_occupants(port: u16) -> io::Result<usize> {
    let pids = find_port_occupants(port).await?;
    if pids.is_empty() {
        debug!("No listener found on port {}", port);
        return Ok(0);
    }

    let mut terminated = 0;
    for pid in pids {
        match terminate_process(pid, Termination::Forced) {
            Ok(()) => {
                info!("Terminated process {} on port {}", pid, port);
                terminated += 1;
            }
            Err(e) => warn!("Error terminating process {} on port {}: {}", pid, port, e),
        }
    }
    Ok(terminated)
}

/// Parse `lsof -t` output: one pid per line.
pub fn parse_lsof_pids(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Parse `netstat -ano` output for TCP listeners bound to `port`.
pub fn parse_netstat_listeners(output: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{port}");
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [proto, local, _remote, "LISTENING", pid]
                    if proto.eq_ignore_ascii_case("TCP") && local.ends_with(&suffix) =>
                {
                    pid.parse::<u32>().ok()
                }
                _ => None,
            }
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
