use thiserror::Error;

use crate::proto::Status;

/// Errors surfaced by the relay engine.
///
/// Protocol-level and policy-level failures (malformed messages, gater
/// denials, missing reservations) never reach this type — they are
/// translated into a [`Status`] reply inside the HOP/STOP handlers and stay
/// there. `RelayError` is for the failures that cannot be answered with a
/// STATUS message: transport setup, codec framing, and configuration.
#[derive(Debug, Error, Clone)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("dial error: {0}")]
    Dial(String),

    #[error("handshake timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("io error: {0}")]
    Io(String),

    #[error("keypair error: {0}")]
    Keypair(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("service already shut down")]
    Shutdown,

    /// A STOP exchange completed but the target replied with a non-OK
    /// status. Carried separately from [`RelayError::Dial`] so callers can
    /// distinguish "never connected" from "connected but refused".
    #[error("target rejected stop request: {0:?}")]
    StopRejected(Status),
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Io(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for RelayError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        RelayError::Timeout(std::time::Duration::default())
    }
}
