//! The gateway error taxonomy.
//!
//! Every failure that crosses the dispatch boundary is one of these
//! variants. Handlers and kernel crates fold their own errors into this
//! type; the protocol layer maps each variant to a stable error code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field violation collected by the input validator.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub reason: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Coarse classification used by the protocol mapping and by callers
/// deciding whether a retry makes sense.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Bad input or caller logic error; retrying unchanged will fail again.
    CallerInput,
    /// The ref the caller holds was superseded; re-snapshot and retry.
    StaleRef,
    /// Budget exceeded or gateway draining; retry with backoff.
    Retryable,
    /// The automation engine reported a failure.
    Engine,
    /// Unanticipated internal failure.
    Internal,
}

#[derive(Clone, Debug, Error)]
pub enum GatewayError {
    #[error("invalid arguments: {} violation(s)", .violations.len())]
    Validation { violations: Vec<Violation> },

    #[error("tool `{name}` is already registered")]
    DuplicateTool { name: String },

    #[error("unknown tool `{name}`")]
    UnknownTool { name: String },

    #[error("unknown element ref `{token}`")]
    UnknownRef { token: String },

    #[error("stale element ref `{token}`: generation {generation} superseded by {current}")]
    StaleRef {
        token: String,
        generation: u64,
        current: u64,
    },

    #[error("cannot close the last remaining window of a session")]
    LastWindow,

    #[error("`{operation}` exceeded its {budget_ms}ms budget")]
    Timeout { operation: String, budget_ms: u64 },

    #[error("gateway is shutting down")]
    ShuttingDown,

    #[error("engine failure: {message}")]
    Engine { message: String },

    #[error("internal error: {detail}")]
    Internal { detail: String },
}

impl GatewayError {
    pub fn validation(violations: Vec<Violation>) -> Self {
        Self::Validation { violations }
    }

    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    pub fn unknown_ref(token: impl Into<String>) -> Self {
        Self::UnknownRef {
            token: token.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, budget: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            budget_ms: budget.as_millis() as u64,
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    /// Short stable slug identifying the variant, carried in protocol
    /// error payloads and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::DuplicateTool { .. } => "duplicate_tool",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::UnknownRef { .. } => "unknown_ref",
            Self::StaleRef { .. } => "stale_ref",
            Self::LastWindow => "last_window",
            Self::Timeout { .. } => "timeout",
            Self::ShuttingDown => "shutting_down",
            Self::Engine { .. } => "engine",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation { .. }
            | Self::DuplicateTool { .. }
            | Self::UnknownTool { .. }
            | Self::UnknownRef { .. }
            | Self::LastWindow => ErrorClass::CallerInput,
            Self::StaleRef { .. } => ErrorClass::StaleRef,
            Self::Timeout { .. } | Self::ShuttingDown => ErrorClass::Retryable,
            Self::Engine { .. } => ErrorClass::Engine,
            Self::Internal { .. } => ErrorClass::Internal,
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::StaleRef | ErrorClass::Retryable)
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_cover_the_taxonomy() {
        assert_eq!(
            GatewayError::unknown_tool("x").class(),
            ErrorClass::CallerInput
        );
        assert_eq!(
            GatewayError::StaleRef {
                token: "s1e2".into(),
                generation: 1,
                current: 2
            }
            .class(),
            ErrorClass::StaleRef
        );
        assert_eq!(
            GatewayError::timeout("navigate", std::time::Duration::from_secs(5)).class(),
            ErrorClass::Retryable
        );
        assert_eq!(GatewayError::engine("boom").class(), ErrorClass::Engine);
        assert_eq!(GatewayError::internal("?").class(), ErrorClass::Internal);
    }

    #[test]
    fn stale_and_timeout_are_retryable() {
        assert!(GatewayError::StaleRef {
            token: "s1e1".into(),
            generation: 1,
            current: 3
        }
        .retryable());
        assert!(GatewayError::ShuttingDown.retryable());
        assert!(!GatewayError::unknown_ref("e9").retryable());
    }
}
