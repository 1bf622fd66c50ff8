//! Built-in handlers used by the `routine` CLI
//!
//! - `WAIT { ms, value? }`: resolves with `value` (default `"ok"`) after `ms`
//! - `ECHO { value? }`: returns `value` immediately
//! - `FAIL { reason?, after_ms? }`: rejects with `reason` (default `"failed"`)
//! - `NOOP`: handled, resumes with `null`, never reaches the sink

use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::error::Failure;
use crate::registry::{HandlerRegistry, RegistryBuilder, RegistryError};
use crate::types::{Command, HandlerResult};

fn millis(command: &Command, field: &str) -> Duration {
    Duration::from_millis(command.get(field).and_then(JsonValue::as_u64).unwrap_or(0))
}

/// Add the built-in handlers to a registry builder
pub fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .handler("WAIT", |command, cx| {
            let delay = millis(command, "ms");
            let value = command
                .get("value")
                .cloned()
                .unwrap_or_else(|| JsonValue::String("ok".to_string()));
            let cancel = cx.cancellation_token();
            Ok(HandlerResult::deferred(async move {
                tokio::select! {
                    _ = cancel.cancelled() => Err(Failure::error("wait cancelled")),
                    _ = tokio::time::sleep(delay) => Ok(value),
                }
            }))
        })
        .handler("ECHO", |command, _| {
            Ok(HandlerResult::Value(
                command.get("value").cloned().unwrap_or(JsonValue::Null),
            ))
        })
        .handler("FAIL", |command, _| {
            let delay = millis(command, "after_ms");
            let reason = command
                .get("reason")
                .cloned()
                .unwrap_or_else(|| JsonValue::String("failed".to_string()));
            Ok(HandlerResult::deferred(async move {
                tokio::time::sleep(delay).await;
                Err(Failure::Value(reason))
            }))
        })
        .handler("NOOP", |_, _| Ok(HandlerResult::Handled))
}

/// Registry holding only the built-in handlers
pub fn registry() -> Result<HandlerRegistry, RegistryError> {
    register(HandlerRegistry::builder()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::{routine, Coroutine};
    use crate::error::NON_STRING_FAILURE;
    use crate::runtime::Runtime;
    use crate::types::{Resume, Step};
    use serde_json::json;

    /// Yields each command once and finishes with everything it was resumed with
    fn replay(commands: Vec<Command>) -> impl Coroutine + Send {
        let mut pending = commands.into_iter();
        let mut received: Vec<JsonValue> = Vec::new();
        let mut started = false;
        routine(move |resume| {
            if started {
                received.push(match resume {
                    Resume::Value(v) => json!({ "value": v }),
                    Resume::Error(e) => json!({ "error": e.message, "response": e.response }),
                });
            }
            started = true;
            Ok(match pending.next() {
                Some(command) => Step::Yield(command),
                None => Step::Done(JsonValue::Array(received.clone())),
            })
        })
    }

    #[test]
    fn test_registry_kinds() {
        assert_eq!(registry().unwrap().kinds(), vec!["ECHO", "FAIL", "NOOP", "WAIT"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_builtins_resume_routine() {
        let runtime = Runtime::new(registry().unwrap());
        let mut sunk = Vec::new();

        let result = runtime
            .run(
                replay(vec![
                    Command::new("WAIT").with("ms", 5),
                    Command::new("ECHO").with("value", json!([1, 2])),
                    Command::new("FAIL").with("reason", json!({"code": 404})),
                    Command::new("NOOP"),
                    Command::new("LOG"),
                ]),
                |c: Command| sunk.push(c),
            )
            .await
            .unwrap();

        assert_eq!(
            result,
            json!([
                {"value": "ok"},
                {"value": [1, 2]},
                {"error": NON_STRING_FAILURE, "response": {"code": 404}},
                {"value": null},
                {"value": null}
            ])
        );
        assert_eq!(sunk, vec![Command::new("LOG")]);
    }
}
