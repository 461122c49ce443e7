use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use toolgate_core_types::GatewayError;

/// High-level failure categories surfaced by engine backends.
#[derive(Clone, Debug, Error, Serialize, Deserialize)]
pub enum EngineErrorKind {
    #[error("engine i/o failure")]
    Io,
    #[error("engine call timed out")]
    Timeout,
    #[error("target not found")]
    TargetNotFound,
    #[error("protocol error")]
    Protocol,
    #[error("internal engine error")]
    Internal,
}

/// Engine failure with optional diagnostic hint. The hint is preserved for
/// diagnostics but never parsed by the gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind) -> Self {
        Self {
            kind,
            hint: None,
            retriable: false,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }

    pub fn io(hint: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Io).with_hint(hint).retriable(true)
    }

    pub fn target_not_found(hint: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::TargetNotFound).with_hint(hint)
    }

    pub fn protocol(hint: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Protocol).with_hint(hint)
    }

    pub fn internal(hint: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Internal).with_hint(hint)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}

impl From<EngineError> for GatewayError {
    fn from(err: EngineError) -> Self {
        GatewayError::engine(err.to_string())
    }
}
