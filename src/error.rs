//! Crate-wide error type for the endpoint channel subsystem.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while framing, encrypting, or handshaking over
/// an endpoint channel.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying stream closed, a read was truncated, or a write
    /// went to a closed writer. Fatal for the direction in progress.
    #[error("stream closed or failed: {0}")]
    Io(String),

    /// Frame length overflow, or a malformed handshake message.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The encryption codec rejected a frame (tampering, replay, or
    /// truncation).
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// The handshake deadline elapsed before a connection context was
    /// produced. Fatal to the handshake; the channel itself survives,
    /// unencrypted, for the caller to close.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// An operation was attempted on an already-closed channel.
    #[error("channel is closed")]
    Closed,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<chacha20poly1305::Error> for Error {
    fn from(e: chacha20poly1305::Error) -> Self {
        Error::Decrypt(e.to_string())
    }
}
