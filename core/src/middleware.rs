//! Dispatch entry point for hosts that mix plain commands and routines
//!
//! Plain commands pass straight through to the next sink. Routines are run on
//! the runtime, with the next sink receiving their uncontrolled commands.

use serde_json::Value as JsonValue;

use crate::coroutine::Coroutine;
use crate::error::RunError;
use crate::runtime::Runtime;
use crate::types::{Command, Sink};

/// Something a host can dispatch
pub enum Action {
    Command(Command),
    Routine(Box<dyn Coroutine + Send>),
}

impl Action {
    pub fn routine<C>(coroutine: C) -> Self
    where
        C: Coroutine + Send + 'static,
    {
        Action::Routine(Box::new(coroutine))
    }
}

impl From<Command> for Action {
    fn from(command: Command) -> Self {
        Action::Command(command)
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Command(command) => f.debug_tuple("Command").field(command).finish(),
            Action::Routine(_) => f.write_str("Routine(..)"),
        }
    }
}

/// What happened to a dispatched action
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// A plain command, handed to the next sink untouched
    Forwarded,
    /// A routine, run to completion with this result
    Completed(JsonValue),
}

#[derive(Debug, Clone)]
pub struct RoutineMiddleware {
    runtime: Runtime,
}

impl RoutineMiddleware {
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub async fn dispatch<S>(&self, action: impl Into<Action>, mut next: S) -> Result<Dispatched, RunError>
    where
        S: Sink,
    {
        match action.into() {
            Action::Command(command) => {
                next.send(command);
                Ok(Dispatched::Forwarded)
            }
            Action::Routine(coroutine) => self
                .runtime
                .run(coroutine, next)
                .await
                .map(Dispatched::Completed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::routine;
    use crate::registry::HandlerRegistry;
    use crate::types::{HandlerResult, Resume, Step};
    use serde_json::json;

    fn middleware() -> RoutineMiddleware {
        let registry = HandlerRegistry::builder()
            .handler("DOUBLE", |command, _| {
                let n = command.get("n").and_then(JsonValue::as_i64).unwrap_or(0);
                Ok(HandlerResult::value(n * 2))
            })
            .build()
            .unwrap();
        RoutineMiddleware::new(Runtime::new(registry))
    }

    #[tokio::test]
    async fn test_plain_commands_pass_through() {
        let mut seen = Vec::new();
        let outcome = middleware()
            .dispatch(Command::new("LOG"), |c: Command| seen.push(c))
            .await
            .unwrap();

        assert_eq!(outcome, Dispatched::Forwarded);
        assert_eq!(seen, vec![Command::new("LOG")]);
    }

    #[tokio::test]
    async fn test_routines_are_run() {
        let mut started = false;
        let coroutine = routine(move |resume| {
            if !started {
                started = true;
                return Ok(Step::Yield(Command::new("DOUBLE").with("n", 21)));
            }
            match resume {
                Resume::Value(v) => Ok(Step::Done(v)),
                Resume::Error(e) => Err(e),
            }
        });

        let mut seen = Vec::new();
        let outcome = middleware()
            .dispatch(Action::routine(coroutine), |c: Command| seen.push(c))
            .await
            .unwrap();

        assert_eq!(outcome, Dispatched::Completed(json!(42)));
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn test_routine_result_command_reaches_next() {
        let coroutine = routine(|_| Ok(Step::Done(json!({"type": "SAVED", "id": 7}))));

        let mut seen = Vec::new();
        let outcome = middleware()
            .dispatch(Action::routine(coroutine), |c: Command| seen.push(c))
            .await
            .unwrap();

        assert_eq!(outcome, Dispatched::Completed(json!({"type": "SAVED", "id": 7})));
        assert_eq!(seen, vec![Command::from_value(json!({"type": "SAVED", "id": 7}))]);
    }
}
