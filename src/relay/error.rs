//! Relay error definitions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The transport could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The far side of the port went away.
    #[error("relay port closed")]
    Closed,

    #[error("invalid relay endpoint: {0}")]
    InvalidEndpoint(String),
}
