//! Error types for the routine runtime
//!
//! Three layers:
//! - [`Failure`]: whatever a deferred handler result rejected with
//! - [`RoutineError`]: the normalized, well-formed error a routine observes
//! - [`RunError`]: what escapes `Runtime::run` to the host

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Message used when a failure value is not a string
pub const NON_STRING_FAILURE: &str = "A non-string failure response was received";

/* ===================== Normalized Error ===================== */

/// A well-formed error injected into a routine
///
/// `response` keeps the original failure value verbatim, so nothing is lost
/// when a handler rejects with an object, an array or `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RoutineError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<JsonValue>,
}

impl RoutineError {
    /// Create an error with a message and no response payload
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
        }
    }

    /// Attach the original failure value
    pub fn with_response(mut self, response: JsonValue) -> Self {
        self.response = Some(response);
        self
    }

    /// Build from any native Rust error, keeping only its display text
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        Self::new(error.to_string())
    }
}

/* ===================== Failure ===================== */

/// A rejected effect, before normalization
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Failure {
    /// Already a well-formed error
    #[error(transparent)]
    Error(#[from] RoutineError),

    /// Any other JSON value
    #[error("failure value: {0}")]
    Value(JsonValue),
}

impl Failure {
    /// Reject with an arbitrary JSON value
    pub fn value(value: impl Into<JsonValue>) -> Self {
        Failure::Value(value.into())
    }

    /// Reject with a well-formed error built from a message
    pub fn error(message: impl Into<String>) -> Self {
        Failure::Error(RoutineError::new(message))
    }
}

impl From<JsonValue> for Failure {
    fn from(value: JsonValue) -> Self {
        Failure::Value(value)
    }
}

/// Convert an arbitrary failure into a [`RoutineError`]
///
/// Errors pass through untouched. Strings become the message. Everything else
/// gets [`NON_STRING_FAILURE`] as its message. The original value is always
/// kept in `response`.
pub fn normalize(failure: Failure) -> RoutineError {
    match failure {
        Failure::Error(error) => error,
        Failure::Value(JsonValue::String(message)) => {
            RoutineError::new(message.clone()).with_response(JsonValue::String(message))
        }
        Failure::Value(other) => RoutineError::new(NON_STRING_FAILURE).with_response(other),
    }
}

/* ===================== Run Error ===================== */

/// Failures that escape a run and surface at the host boundary
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The routine raised past its own error handling
    #[error("routine failed")]
    Routine(#[source] RoutineError),

    /// A handler failed synchronously while being invoked
    #[error("handler for '{command_type}' failed")]
    Handler {
        command_type: String,
        #[source]
        failure: Failure,
    },

    /// The run's cancellation token fired while a deferred value was pending
    #[error("run cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_passes_through_unchanged() {
        let original = RoutineError::new("boom").with_response(json!({"code": 500}));
        let normalized = normalize(Failure::Error(original.clone()));
        assert_eq!(normalized, original);
    }

    #[test]
    fn test_string_becomes_message() {
        let normalized = normalize(Failure::value("network down"));
        assert_eq!(normalized.message, "network down");
        assert_eq!(normalized.response, Some(json!("network down")));
    }

    #[test]
    fn test_object_uses_fallback_message() {
        let normalized = normalize(Failure::value(json!({"code": 404})));
        assert_eq!(normalized.message, NON_STRING_FAILURE);
        assert_eq!(normalized.response, Some(json!({"code": 404})));
    }

    #[test]
    fn test_null_and_arrays_are_preserved() {
        let normalized = normalize(Failure::Value(JsonValue::Null));
        assert_eq!(normalized.message, NON_STRING_FAILURE);
        assert_eq!(normalized.response, Some(JsonValue::Null));

        let normalized = normalize(Failure::value(json!([1, "two"])));
        assert_eq!(normalized.response, Some(json!([1, "two"])));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize(Failure::value(json!({"code": 404})));
        let twice = normalize(Failure::Error(once.clone()));
        assert_eq!(once, twice);
        assert_eq!(twice.response, Some(json!({"code": 404})));
    }

    #[test]
    fn test_native_error_keeps_display_text() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let error = RoutineError::from_error(&io);
        assert_eq!(error.message, "missing file");
        assert_eq!(error.response, None);
    }

    #[test]
    fn test_run_error_display() {
        let err = RunError::Handler {
            command_type: "FETCH".to_string(),
            failure: Failure::error("bad input"),
        };
        assert_eq!(err.to_string(), "handler for 'FETCH' failed");

        let err = RunError::Routine(RoutineError::new("unhandled"));
        assert_eq!(err.to_string(), "routine failed");
    }

    #[test]
    fn test_run_error_chain_names_cause_once() {
        let err = anyhow::Error::from(RunError::Routine(RoutineError::new("failed")));
        assert_eq!(format!("{:#}", err), "routine failed: failed");

        let err = anyhow::Error::from(RunError::Handler {
            command_type: "PARSE".to_string(),
            failure: Failure::value(json!({"code": "bad_input"})),
        });
        assert_eq!(
            format!("{:#}", err),
            r#"handler for 'PARSE' failed: failure value: {"code":"bad_input"}"#
        );
    }
}
