//! Shell command construction

use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Interpreter used to run configured command lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    program: PathBuf,
    kind: ShellKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShellKind {
    Posix,
    Cmd,
}

impl Shell {
    /// The platform shell, or `interpreter` when given.
    ///
    /// An explicit interpreter is treated as POSIX-like (`<shell> -c <line>`),
    /// which covers Git Bash and MSYS shells on Windows hosts.
    pub fn resolve(interpreter: Option<&Path>) -> Self {
        match interpreter {
            Some(path) => Self {
                program: path.to_path_buf(),
                kind: ShellKind::Posix,
            },
            None if cfg!(windows) => Self {
                program: PathBuf::from("cmd"),
                kind: ShellKind::Cmd,
            },
            None => Self {
                program: PathBuf::from("sh"),
                kind: ShellKind::Posix,
            },
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// A command that runs `line` through this shell.
    pub fn command(&self, line: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        match self.kind {
            ShellKind::Posix => {
                cmd.arg("-c").arg(line);
            }
            ShellKind::Cmd => {
                cmd.arg("/C");
                // cmd.exe does its own parsing; hand it the line untouched.
                #[cfg(windows)]
                cmd.raw_arg(line);
                #[cfg(not(windows))]
                cmd.arg(line);
            }
        }
        cmd
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::resolve(None)
    }
}
