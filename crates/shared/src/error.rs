//! Shared error types.

use thiserror::Error;

/// Why an inbound frame could not be turned into an [`Envelope`](crate::Envelope).
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no message type")]
    MissingType,
    #[error("binary frame is not valid UTF-8")]
    InvalidUtf8,
}

impl EnvelopeError {
    /// Short machine-readable label, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            EnvelopeError::Json(_) => "json",
            EnvelopeError::MissingType => "missing_type",
            EnvelopeError::InvalidUtf8 => "invalid_utf8",
        }
    }
}
