//! Harness Common Library
//!
//! Contracts shared by the fixture server and the test orchestrator.

pub mod banner;
pub mod logging;
pub mod signals;

pub use banner::{parse_startup_port, startup_line, STARTUP_PREFIX};
pub use signals::TerminationSignals;

/// Environment variable carrying the preferred listen port.
pub const PORT_ENV: &str = "PORT";

/// Port used when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 3000;

/// Environment variable carrying the static fixture root.
pub const STATIC_DIR_ENV: &str = "HARNESS_STATIC_DIR";

/// Environment variable the test command receives its base URL in.
pub const TEST_URL_ENV: &str = "TEST_URL";

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
