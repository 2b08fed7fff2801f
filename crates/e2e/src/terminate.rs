//! Platform-specific process termination
//!
//! Callers ask for a [`Termination`] strength; the strategy (signals to a
//! process group on POSIX, `taskkill` on Windows) is picked here and nowhere
//! else.

use std::io;

/// How hard to ask a process to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Ask the process to exit cleanly (SIGTERM / `taskkill` without `/F`).
    Graceful,
    /// Kill immediately (SIGKILL / `taskkill /F`).
    Forced,
}

/// Terminate `pid` and every process it started.
///
/// On POSIX `pid` must lead its own process group, which is how the server
/// manager spawns it. A process that is already gone is not an error.
pub fn terminate_tree(pid: u32, how: Termination) -> io::Result<()> {
    imp::terminate_tree(pid, how)
}

/// Terminate a single process we did not spawn (e.g. a port occupant).
pub fn terminate_process(pid: u32, how: Termination) -> io::Result<()> {
    imp::terminate_process(pid, how)
}

#[cfg(unix)]
mod imp {
    use std::io;

    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    use super::Termination;

    fn signal_for(how: Termination) -> Signal {
        match how {
            Termination::Graceful => Signal::SIGTERM,
            Termination::Forced => Signal::SIGKILL,
        }
    }

    fn to_pid(pid: u32) -> io::Result<Pid> {
        i32::try_from(pid)
            .ok()
            .filter(|p| *p > 0)
            .map(Pid::from_raw)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))
    }

    pub fn terminate_tree(pid: u32, how: Termination) -> io::Result<()> {
        match killpg(to_pid(pid)?, signal_for(how)) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn terminate_process(pid: u32, how: Termination) -> io::Result<()> {
        match kill(to_pid(pid)?, signal_for(how)) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::io;
    use std::process::{Command, Stdio};

    use super::Termination;

    fn taskkill(pid: u32, tree: bool, how: Termination) -> io::Result<()> {
        let mut cmd = Command::new("taskkill");
        cmd.arg("/PID").arg(pid.to_string());
        if tree {
            cmd.arg("/T");
        }
        if how == Termination::Forced {
            cmd.arg("/F");
        }

        let output = cmd.stdin(Stdio::null()).output()?;
        if output.status.success() {
            return Ok(());
        }

        // 128: process not found, which is what we wanted anyway.
        if output.status.code() == Some(128) {
            return Ok(());
        }
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "taskkill /PID {} failed: {}",
                pid,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ))
    }

    pub fn terminate_tree(pid: u32, how: Termination) -> io::Result<()> {
        taskkill(pid, true, how)
    }

    pub fn terminate_process(pid: u32, how: Termination) -> io::Result<()> {
        taskkill(pid, false, how)
    }
}
