//! Coroutine protocol
//!
//! A coroutine is a suspended computation driven from outside. Each resume
//! advances it to its next command or to its final result. Injected errors
//! that the coroutine does not catch come back out as `Err`.

use serde_json::Value as JsonValue;

use crate::error::RoutineError;
use crate::types::{Resume, Step};

/// A resumable computation that emits commands
pub trait Coroutine {
    /// Advance with a value. The first call starts the computation.
    fn resume(&mut self, value: JsonValue) -> Result<Step, RoutineError>;

    /// Advance by raising `error` at the current suspension point
    fn resume_with_error(&mut self, error: RoutineError) -> Result<Step, RoutineError>;
}

impl<C: Coroutine + ?Sized> Coroutine for Box<C> {
    fn resume(&mut self, value: JsonValue) -> Result<Step, RoutineError> {
        (**self).resume(value)
    }

    fn resume_with_error(&mut self, error: RoutineError) -> Result<Step, RoutineError> {
        (**self).resume_with_error(error)
    }
}

/* ===================== Closure Routine ===================== */

/// Coroutine backed by a closure state machine
///
/// Built with [`routine`]. Once the closure returns `Step::Done` or raises,
/// every further resume fails.
pub struct FnRoutine<F> {
    body: F,
    finished: bool,
}

/// Build a coroutine from a closure that receives each resumption
///
/// ```
/// use routine_core::{routine, Command, Resume, Step};
/// use serde_json::json;
///
/// let mut started = false;
/// let coroutine = routine(move |resume| {
///     if !started {
///         started = true;
///         return Ok(Step::Yield(Command::new("FETCH")));
///     }
///     match resume {
///         Resume::Value(v) => Ok(Step::Done(v)),
///         Resume::Error(_) => Ok(Step::Done(json!("fallback"))),
///     }
/// });
/// # let _ = coroutine;
/// ```
pub fn routine<F>(body: F) -> FnRoutine<F>
where
    F: FnMut(Resume) -> Result<Step, RoutineError>,
{
    FnRoutine {
        body,
        finished: false,
    }
}

impl<F> FnRoutine<F>
where
    F: FnMut(Resume) -> Result<Step, RoutineError>,
{
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn advance(&mut self, resume: Resume) -> Result<Step, RoutineError> {
        if self.finished {
            return Err(RoutineError::new("routine resumed after it finished"));
        }

        let result = (self.body)(resume);
        if !matches!(result, Ok(Step::Yield(_))) {
            self.finished = true;
        }
        result
    }
}

impl<F> Coroutine for FnRoutine<F>
where
    F: FnMut(Resume) -> Result<Step, RoutineError>,
{
    fn resume(&mut self, value: JsonValue) -> Result<Step, RoutineError> {
        self.advance(Resume::Value(value))
    }

    fn resume_with_error(&mut self, error: RoutineError) -> Result<Step, RoutineError> {
        self.advance(Resume::Error(error))
    }
}
