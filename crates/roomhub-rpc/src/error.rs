//! Error types for malformed room link frames.

/// A frame arrived intact but its payload is not a valid message.
///
/// The frame has already been consumed from the stream, so the connection can
/// keep going after the error is logged.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),
}
