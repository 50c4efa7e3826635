//! Gateway error classification.
//!
//! Provider errors arrive as a code/message pair. They are mapped once, at the
//! gateway boundary, into the categories the reconciler acts on.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Rate limit exceeded (retry later with a longer delay)
    #[error("request throttled: {0}")]
    Throttled(String),

    /// The EIP does not exist (anymore)
    #[error("EIP not found: {0}")]
    NotFound(String),

    /// The call did not complete before its deadline
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// Any other provider failure
    #[error("{}: {message}", .code.as_deref().unwrap_or("Unknown"))]
    Api {
        code: Option<String>,
        message: String,
    },
}

impl GatewayError {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::Api {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, GatewayError::Throttled(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }
}

/// Provider codes signalling throttling.
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "Throttling.User",
    "Throttling.Api",
    "RequestLimitExceeded",
];

/// Provider codes signalling a missing EIP.
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidAllocationId.NotFound",
    "InvalidAllocationID.NotFound",
];

/// Message fragments used when the provider omits the code.
const NOT_FOUND_MESSAGES: &[&str] = &["Specified allocation ID is not found"];

/// Classify a provider error from its code and message.
pub fn classify_error(code: Option<&str>, message: Option<&str>) -> GatewayError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if THROTTLING_CODES.contains(&c) => GatewayError::Throttled(message),
        Some(c) if NOT_FOUND_CODES.contains(&c) => GatewayError::NotFound(message),
        _ if NOT_FOUND_MESSAGES.iter().any(|m| message.contains(m)) => {
            GatewayError::NotFound(message)
        }
        // Some SDKs only surface the code inside the message body
        None if THROTTLING_CODES.iter().any(|c| message.contains(c)) => {
            GatewayError::Throttled(message)
        }
        None if NOT_FOUND_CODES.iter().any(|c| message.contains(c)) => {
            GatewayError::NotFound(message)
        }
        _ => GatewayError::Api {
            code: code.map(|c| c.to_string()),
            message,
        },
    }
}
