//! Error types for the fixture server

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WebResult<T> = Result<T, WebError>;
