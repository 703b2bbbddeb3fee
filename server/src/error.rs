//! Error taxonomy for the server.
//!
//! Session errors stay inside the owning session: they end that connection
//! and deregister it, nothing more. Only [`ServerError`] variants are fatal
//! to the process.

use std::io;
use std::time::Duration;

use thiserror::Error;

use shared::config::ConfigError;
use shared::protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("could not bind listener on {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Socket-level failure establishing or maintaining the connection.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),
    /// No traffic within the keepalive window.
    #[error("no traffic for {0:?}")]
    Timeout(Duration),
    /// Malformed framing or payload, unknown packet type, oversized frame.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// Invalid or duplicate name, server at capacity.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Orderly close: peer disconnected or the server is shutting down.
    #[error("connection closed")]
    Closed,
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        SessionError::Protocol(err.to_string())
    }
}
