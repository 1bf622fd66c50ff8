//! Core execution loop
//!
//! The [`Stepper`] owns one coroutine for the duration of a run. Each
//! iteration takes the command the coroutine is suspended on, decides who
//! processes it, and produces the next [`Step`] by resuming the coroutine.
//!
//! ## Function Organization
//! 1. run_until_done() - Top-level driver
//! 2. process() - Routes one command to a handler or the sink
//! 3. settle() - Waits on a deferred result (the only suspension point)

use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::RuntimeOptions;
use crate::coroutine::Coroutine;
use crate::error::{normalize, Failure, RoutineError, RunError};
use crate::registry::{Dispatch, HandlerContext, HandlerRegistry};
use crate::types::{Command, Deferred, HandlerResult, Resume, Sink, Step};

/* ===================== State ===================== */

/// Lifecycle of the coroutine a stepper is driving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineState {
    /// Computing the next command
    Advancing,
    /// Waiting for a deferred result to settle
    Suspended,
    /// Finished or failed; never left
    Done,
}

/* ===================== Stepper ===================== */

/// Drives one coroutine against a registry and a sink
pub struct Stepper<'r, C, S> {
    registry: &'r HandlerRegistry,
    options: &'r RuntimeOptions,
    coroutine: C,
    sink: S,
    cx: HandlerContext,
    state: RoutineState,
}

impl<'r, C, S> Stepper<'r, C, S>
where
    C: Coroutine,
    S: Sink,
{
    pub fn new(
        registry: &'r HandlerRegistry,
        options: &'r RuntimeOptions,
        coroutine: C,
        sink: S,
        run_id: Uuid,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            options,
            coroutine,
            sink,
            cx: HandlerContext::new(run_id, cancel),
            state: RoutineState::Advancing,
        }
    }

    pub fn state(&self) -> RoutineState {
        self.state
    }

    /// Run the coroutine until it finishes
    ///
    /// Starts it with `null`, then processes every command it yields.
    pub async fn run_until_done(mut self) -> Result<JsonValue, RunError> {
        let mut step = self.advance(Resume::Value(JsonValue::Null))?;

        loop {
            match step {
                Step::Done(result) => return Ok(self.finish(result)),
                Step::Yield(command) => {
                    let resume = self.process(command).await?;
                    step = self.advance(resume)?;
                }
            }
        }
    }

    /* ===================== Dispatch ===================== */

    /// Process one command and return how to resume the coroutine
    async fn process(&mut self, command: Command) -> Result<Resume, RunError> {
        let kind = command.kind().unwrap_or("<untyped>").to_string();
        if self.options.trace_commands {
            tracing::debug!(command = %command, "routine yielded");
        }

        let registry = self.registry;
        let handler = match registry.lookup(&command) {
            Dispatch::Controlled(handler) => handler,
            Dispatch::Uncontrolled => {
                tracing::debug!(command_type = %kind, "no handler, forwarding to sink");
                return Ok(self.forward(command));
            }
        };

        let result = handler
            .call(&command, &self.cx)
            .map_err(|failure| RunError::Handler {
                command_type: kind.clone(),
                failure,
            })?;

        match result {
            HandlerResult::Value(value) => {
                tracing::debug!(command_type = %kind, "handler returned immediately");
                Ok(Resume::Value(value))
            }
            HandlerResult::Handled => {
                tracing::debug!(command_type = %kind, "handler consumed command");
                Ok(Resume::Value(JsonValue::Null))
            }
            HandlerResult::Declined => {
                tracing::debug!(command_type = %kind, "handler declined, forwarding to sink");
                Ok(self.forward(command))
            }
            HandlerResult::Deferred(deferred) => {
                tracing::debug!(command_type = %kind, "suspending on deferred result");
                debug_assert_eq!(self.state, RoutineState::Advancing);
                self.state = RoutineState::Suspended;
                let settled = self.settle(deferred, &kind).await?;
                self.state = RoutineState::Advancing;

                Ok(match settled {
                    Ok(value) => {
                        tracing::debug!(command_type = %kind, "deferred result settled");
                        Resume::Value(value)
                    }
                    Err(failure) => {
                        let error = normalize(failure);
                        tracing::debug!(command_type = %kind, error = %error, "deferred result failed");
                        Resume::Error(error)
                    }
                })
            }
        }
    }

    fn forward(&mut self, command: Command) -> Resume {
        self.sink.send(command);
        Resume::Value(JsonValue::Null)
    }

    /// Wait for a deferred result, honoring cancellation and the timeout
    async fn settle(
        &mut self,
        deferred: Deferred,
        kind: &str,
    ) -> Result<Result<JsonValue, Failure>, RunError> {
        let cancel = self.cx.cancellation_token();
        let timeout = self.options.deferred_timeout;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(command_type = %kind, "run cancelled while suspended");
                self.state = RoutineState::Done;
                Err(RunError::Cancelled)
            }
            settled = with_timeout(deferred, timeout, kind) => Ok(settled),
        }
    }

    /* ===================== Resumption ===================== */

    fn advance(&mut self, resume: Resume) -> Result<Step, RunError> {
        debug_assert_eq!(self.state, RoutineState::Advancing, "resumed a routine that is not advancing");
        let step = match resume {
            Resume::Value(value) => self.coroutine.resume(value),
            Resume::Error(error) => self.coroutine.resume_with_error(error),
        };

        match step {
            Ok(step) => Ok(step),
            Err(error) => {
                tracing::debug!(error = %error, "routine raised");
                self.state = RoutineState::Done;
                Err(RunError::Routine(error))
            }
        }
    }

    fn finish(&mut self, result: JsonValue) -> JsonValue {
        self.state = RoutineState::Done;
        if self.options.forward_final_command && Command::is_command(&result) {
            tracing::debug!("forwarding final result to sink");
            self.sink.send(Command::from_value(result.clone()));
        }
        result
    }
}

async fn with_timeout(
    deferred: Deferred,
    timeout: Option<Duration>,
    kind: &str,
) -> Result<JsonValue, Failure> {
    let Some(limit) = timeout else {
        return deferred.await;
    };

    match tokio::time::timeout(limit, deferred).await {
        Ok(settled) => settled,
        Err(_) => Err(timeout_failure(kind, limit)),
    }
}

/// Injected when a deferred result outlives the configured limit
fn timeout_failure(kind: &str, limit: Duration) -> Failure {
    let millis = limit.as_millis();
    Failure::Error(
        RoutineError::new(format!("'{}' did not settle within {}ms", kind, millis)).with_response(
            serde_json::json!({
                "type": "TIMEOUT",
                "timeout_ms": u64::try_from(millis).unwrap_or(u64::MAX)
            }),
        ),
    )
}
