//! Error types for the AI gateway and the capture-session API.

use crate::document::AiStatus;
use thiserror::Error;
use uuid::Uuid;

/// Max characters of a response body kept in error details.
pub const DETAIL_MAX_CHARS: usize = 300;

/// Failures of a single chat-completion call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// No API key configured
    #[error("API key not configured")]
    MissingCredential,

    /// API key is a known placeholder value
    #[error("API key is a placeholder value")]
    InvalidCredential,

    /// HTTP 401
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// HTTP 402
    #[error("Payment required: {0}")]
    PaymentRequired(String),

    /// Any other non-200 status
    #[error("Chat API error ({status}): {detail}")]
    Transport { status: u16, detail: String },

    /// Connect failure or timeout, no HTTP status available
    #[error("Network error: {0}")]
    Network(String),

    /// 200 response whose body is not a chat completion
    #[error("Failed to decode chat response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Document status this failure resolves to.
    pub fn status(&self) -> AiStatus {
        match self {
            Self::MissingCredential | Self::InvalidCredential | Self::Unauthorized(_) => {
                AiStatus::Unauthorized
            }
            Self::PaymentRequired(_) => AiStatus::PaymentRequired,
            _ => AiStatus::Error,
        }
    }
}

/// Keep the first [`DETAIL_MAX_CHARS`] characters of a response body.
pub fn truncate_detail(body: &str) -> String {
    body.chars().take(DETAIL_MAX_CHARS).collect()
}

/// Precondition failures of capture-session operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Unknown note: {0}")]
    NotFound(Uuid),

    #[error("Note {0} was already submitted")]
    AlreadySubmitted(Uuid),

    #[error("Note {0} has not finished analysis")]
    NotAnalyzed(Uuid),

    #[error("Note {0} is finalized and can no longer change")]
    Finalized(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
