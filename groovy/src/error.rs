//! Engine errors
//!
//! Connecting is the only fallible operation. Once a session is up, send
//! failures are dropped and stale replies are discarded.

use groovy_io::SocketError;
use std::time::Duration;
use thiserror::Error;

/// Errors opening a session
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Socket setup failed: {0}")]
    SocketSetup(#[from] SocketError),

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    #[error("No ACK from device within {timeout:?}")]
    NoAck { timeout: Duration },
}
