//! Error types for message decoding.

use thiserror::Error;

/// Errors raised while decoding an inbound frame.
///
/// None of these are fatal to a connection; the hub logs and drops the frame.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// Object has no string `type` field.
    #[error("message has no type field")]
    MissingType,
}
