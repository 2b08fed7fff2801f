//! Fixture HTTP server

use std::future::Future;
use std::path::{Path, PathBuf};

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{WebError, WebResult};

/// Serves a fixture directory plus a health endpoint
#[derive(Debug, Clone)]
pub struct FixtureServer {
    static_dir: PathBuf,
}

impl FixtureServer {
    pub fn new(static_dir: impl Into<PathBuf>) -> Self {
        let static_dir = static_dir.into();
        if !static_dir.join("index.html").is_file() {
            warn!("No index.html under {}; GET / will return 404", static_dir.display());
        }
        Self { static_dir }
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    /// Build the application router.
    ///
    /// `/health` answers `200 OK`, `/` serves `index.html`, and everything else
    /// is resolved against the static directory.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route_service("/", ServeFile::new(self.static_dir.join("index.html")))
            .fallback_service(ServeDir::new(&self.static_dir))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> WebResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!("Serving {} on {}", self.static_dir.display(), addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(WebError::Serve)
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
