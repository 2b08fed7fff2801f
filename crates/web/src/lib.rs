//! Harness Fixture Server
//!
//! Serves the browser test fixtures from a directory, answers `/health`, and
//! announces its bound port on stdout for the orchestrator.

pub mod error;
pub mod listener;
pub mod server;

pub use error::{WebError, WebResult};
pub use listener::bind_with_fallback;
pub use server::FixtureServer;
