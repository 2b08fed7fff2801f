//! Harness E2E Orchestrator
//!
//! Boots the fixture server, waits for it to become healthy, installs the
//! browsers, runs the browser test command and tears everything down again,
//! whatever happens along the way.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Lifecycle (controller)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  port::is_port_available()       pre/post-flight probe      │
//! │  ServerHandle::spawn()           child process + stdout scan│
//! │  ServerHandle::wait_for_port()   startup line -> port       │
//! │  ReadinessGate::wait_until_ready()   GET /health polling    │
//! │  TestExecutor::install_dependencies() / run_tests()         │
//! │  ServerHandle::stop()            graceful -> forced, tree   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  poll::wait_until     terminate::terminate_tree   shutdown  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod poll;
pub mod port;
pub mod readiness;
pub mod server;
pub mod shell;
pub mod shutdown;
pub mod terminate;

pub use config::{PortMode, RunnerConfig};
pub use error::{HarnessError, HarnessResult};
pub use lifecycle::{Lifecycle, Phase, RunReport};
pub use server::ServerHandle;
