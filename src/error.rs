//! Error types for the hub and client
//!
//! One enum per fallible public operation, built with thiserror.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors from `Hub::start`
///
/// All of them are fatal to the start attempt; the hub stays stopped and
/// its session set is untouched.
#[derive(Debug, Error)]
pub enum BindError {
    /// Port outside the range the dialect accepts
    #[error("Invalid port {port}: must be between {min} and 65535")]
    InvalidPort { port: u16, min: u16 },

    /// `start` called on a hub that is already listening
    #[error("Server is already listening")]
    AlreadyListening,

    /// The socket could not be bound or put into listening mode
    #[error("Unable to attach to {addr}: {source}")]
    Io {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Errors from `Client::connect`
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Port 0 cannot be connected to
    #[error("Invalid port 0")]
    InvalidPort,

    /// `connect` called while connecting or connected
    #[error("Client is already connected")]
    AlreadyConnected,

    /// The server did not answer in time
    #[error("Connection to {addr} timed out after {after:?}")]
    Timeout { addr: String, after: Duration },

    /// Refused, unreachable or unresolvable
    #[error("Could not connect to {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Errors from `Client::send`
#[derive(Debug, Error)]
pub enum SendError {
    /// No connection to write to
    #[error("Not connected")]
    NotConnected,

    /// The write failed; the client has disconnected
    #[error("Send failed: {0}")]
    Io(#[from] io::Error),
}

/// Errors while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_port_message() {
        let err = BindError::InvalidPort { port: 80, min: 1024 };
        assert_eq!(err.to_string(), "Invalid port 80: must be between 1024 and 65535");
    }

    #[test]
    fn test_send_error_from_io() {
        let err: SendError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, SendError::Io(_)));
    }
}
