//! Error types for dialog-client.

use thiserror::Error;

/// Errors produced while encoding or decoding a wire frame.
///
/// Returned by [`Frame::decode`](crate::protocol::Frame::decode) and
/// [`Frame::encode`](crate::protocol::Frame::encode). A decode failure only
/// invalidates the offending message; the connection keeps reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The buffer ended before a field could be read.
    #[error("truncated frame: {field} needs {needed} bytes, {available} available")]
    Truncated {
        /// Field being read when the buffer ran out.
        field: &'static str,
        /// Bytes required by the field.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// Protocol version nibble is not the supported one.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Header size nibble is zero.
    #[error("invalid header size {0}")]
    InvalidHeaderSize(u8),

    /// Message type nibble does not name a known message type.
    #[error("unknown message type {0:#06b}")]
    UnknownMessageType(u8),

    /// Serialization nibble does not name a known method.
    #[error("unknown serialization method {0:#06b}")]
    UnknownSerialization(u8),

    /// Compression nibble does not name a known method.
    #[error("unknown compression method {0:#06b}")]
    UnknownCompression(u8),

    /// Declared session id length is out of bounds.
    #[error("session id length {0} exceeds limit")]
    SessionIdTooLong(u32),

    /// Session id bytes are not valid UTF-8.
    #[error("session id is not valid UTF-8")]
    InvalidSessionId,

    /// Bytes remain after the declared payload.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// Frame fields contradict each other (encode side).
    #[error("inconsistent frame: {0}")]
    Inconsistent(&'static str),

    /// Gzip payload could not be inflated.
    #[error("gzip payload: {0}")]
    Decompress(String),
}

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum DialogError {
    /// I/O error (compression buffers, local files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Transport failure reported by a non-WebSocket transport, or a copy of
    /// a transport failure used to reject a pending operation.
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or truncated wire frame.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Error reported by the server in an ERROR_INFORMATION frame.
    #[error("{message}")]
    Server {
        /// Numeric error code carried by the frame, if any.
        code: Option<u32>,
        /// Human-readable message from the JSON `error` field.
        message: String,
    },

    /// The server refused the connection (ConnectionFailed).
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The server refused the session (SessionFailed).
    #[error("Session failed: {0}")]
    SessionFailed(String),

    /// Operation called in a state that does not allow it.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was rejected.
        operation: &'static str,
        /// Human-readable description of the current state.
        state: String,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// The server did not acknowledge an operation in time.
    #[error("Timed out waiting for {0} acknowledgement")]
    AckTimeout(&'static str),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An event handler reported a failure.
    #[error("Handler error: {0}")]
    Handler(String),
}

impl DialogError {
    /// Whether this error came from the transport rather than the protocol.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DialogError::Io(_)
                | DialogError::WebSocket(_)
                | DialogError::Transport(_)
                | DialogError::ConnectionClosed
        )
    }

    /// Copy of this error for a second receiver.
    ///
    /// Variants wrapping non-`Clone` sources collapse to `Transport` with the
    /// same message.
    pub(crate) fn duplicate(&self) -> DialogError {
        match self {
            DialogError::Server { code, message } => DialogError::Server {
                code: *code,
                message: message.clone(),
            },
            DialogError::Frame(e) => DialogError::Frame(e.clone()),
            DialogError::ConnectionFailed(m) => DialogError::ConnectionFailed(m.clone()),
            DialogError::SessionFailed(m) => DialogError::SessionFailed(m.clone()),
            DialogError::ConnectionClosed => DialogError::ConnectionClosed,
            DialogError::BackpressureTimeout => DialogError::BackpressureTimeout,
            DialogError::AckTimeout(what) => DialogError::AckTimeout(what),
            DialogError::Transport(m) => DialogError::Transport(m.clone()),
            other => DialogError::Transport(other.to_string()),
        }
    }
}

/// Result type alias using DialogError.
pub type Result<T> = std::result::Result<T, DialogError>;
