//! Error types for the telemetry stream.

use thiserror::Error;

/// Errors raised by the stream transport.
///
/// Malformed event payloads are NOT represented here: the frame decoder
/// logs and drops them without disturbing the connection.
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    /// Could not open the stream (DNS, refused connection, TLS).
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// The endpoint answered with a non-success status.
    #[error("Stream endpoint returned status {status}")]
    Upstream { status: u16 },

    /// The connection dropped mid-stream.
    #[error("Transport error: {0}")]
    Transport(String),
}
