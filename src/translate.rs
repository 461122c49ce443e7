//! Error translation at the protocol boundary.
//!
//! Internal failures map onto a small set of stable codes so callers can
//! build retry policy without parsing messages. Internal detail is logged
//! here and never returned.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use toolgate_core_types::{ErrorClass, GatewayError};

/// Caller-input class: bad arguments, unknown tool/ref, refused window op.
pub const CODE_CALLER_INPUT: i64 = -32602;
/// The held ref was superseded; re-snapshot and retry.
pub const CODE_STALE_REF: i64 = -32011;
/// Budget exceeded or gateway draining; retry with backoff.
pub const CODE_RETRYABLE: i64 = -32010;
/// Automation engine failure.
pub const CODE_ENGINE: i64 = -32020;
/// Unanticipated internal failure.
pub const CODE_INTERNAL: i64 = -32603;

/// Wire form of a failed call.
#[derive(Clone, Debug, Serialize)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
    pub data: Value,
}

pub fn translate(err: &GatewayError) -> ProtocolError {
    let code = match err.class() {
        ErrorClass::CallerInput => CODE_CALLER_INPUT,
        ErrorClass::StaleRef => CODE_STALE_REF,
        ErrorClass::Retryable => CODE_RETRYABLE,
        ErrorClass::Engine => CODE_ENGINE,
        ErrorClass::Internal => CODE_INTERNAL,
    };

    let mut data = json!({
        "kind": err.kind(),
        "retryable": err.retryable(),
    });

    let message = match err {
        GatewayError::Validation { violations } => {
            data["violations"] = json!(violations);
            err.to_string()
        }
        GatewayError::StaleRef { .. } => {
            data["recovery"] = json!("re-snapshot and retry with a fresh ref");
            err.to_string()
        }
        GatewayError::Internal { detail } => {
            // Full detail stays in the log; the caller gets a generic line.
            error!(%detail, "internal failure crossed the dispatch boundary");
            "an internal error occurred".to_string()
        }
        other => other.to_string(),
    };

    ProtocolError {
        code,
        message,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgate_core_types::Violation;

    #[test]
    fn validation_carries_the_full_violation_list() {
        let err = GatewayError::validation(vec![
            Violation::new("text", "required field is missing"),
            Violation::new("count", "expected an integer"),
        ]);
        let payload = translate(&err);
        assert_eq!(payload.code, CODE_CALLER_INPUT);
        assert_eq!(payload.data["violations"].as_array().unwrap().len(), 2);
        assert_eq!(payload.data["retryable"], false);
    }

    #[test]
    fn stale_refs_get_their_own_retryable_code() {
        let err = GatewayError::StaleRef {
            token: "s1e4".into(),
            generation: 1,
            current: 3,
        };
        let payload = translate(&err);
        assert_eq!(payload.code, CODE_STALE_REF);
        assert_eq!(payload.data["retryable"], true);
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let err = GatewayError::internal("secret connection string");
        let payload = translate(&err);
        assert_eq!(payload.code, CODE_INTERNAL);
        assert!(!payload.message.contains("secret"));
    }

    #[test]
    fn engine_messages_are_preserved() {
        let err = GatewayError::engine("net::ERR_NAME_NOT_RESOLVED");
        let payload = translate(&err);
        assert_eq!(payload.code, CODE_ENGINE);
        assert!(payload.message.contains("ERR_NAME_NOT_RESOLVED"));
    }

    #[test]
    fn timeouts_and_shutdown_share_the_retryable_code() {
        let timeout = GatewayError::timeout("navigate", std::time::Duration::from_secs(5));
        assert_eq!(translate(&timeout).code, CODE_RETRYABLE);
        assert_eq!(translate(&GatewayError::ShuttingDown).code, CODE_RETRYABLE);
    }
}
