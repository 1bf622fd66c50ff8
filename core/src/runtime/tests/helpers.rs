//! Test helpers for runtime tests
//!
//! A recording sink and a recording coroutine, both shareable across tasks

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value as JsonValue};

use crate::coroutine::Coroutine;
use crate::error::RoutineError;
use crate::types::{Command, Resume, Sink, Step};

/// Sink that keeps every command it receives
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<Command>>>);

impl SharedSink {
    pub fn commands(&self) -> Vec<Command> {
        self.0.lock().unwrap().clone()
    }
}

impl Sink for SharedSink {
    fn send(&mut self, command: Command) {
        self.0.lock().unwrap().push(command);
    }
}

/// Coroutine that yields a fixed list of commands and records every resumption
///
/// Finishes with the number of resumptions it saw after starting.
pub struct Recorder {
    commands: VecDeque<Command>,
    resumes: Arc<Mutex<Vec<Resume>>>,
    catch_errors: bool,
    started: bool,
}

impl Recorder {
    /// Catches injected errors and keeps going
    pub fn new(commands: Vec<Command>) -> (Self, Arc<Mutex<Vec<Resume>>>) {
        Self::build(commands, true)
    }

    /// Re-raises the first injected error
    pub fn raising(commands: Vec<Command>) -> (Self, Arc<Mutex<Vec<Resume>>>) {
        Self::build(commands, false)
    }

    fn build(commands: Vec<Command>, catch_errors: bool) -> (Self, Arc<Mutex<Vec<Resume>>>) {
        let resumes = Arc::new(Mutex::new(Vec::new()));
        let recorder = Self {
            commands: commands.into(),
            resumes: resumes.clone(),
            catch_errors,
            started: false,
        };
        (recorder, resumes)
    }

    fn next(&mut self) -> Step {
        match self.commands.pop_front() {
            Some(command) => Step::Yield(command),
            None => Step::Done(json!(self.resumes.lock().unwrap().len())),
        }
    }
}

impl Coroutine for Recorder {
    fn resume(&mut self, value: JsonValue) -> Result<Step, RoutineError> {
        if self.started {
            self.resumes.lock().unwrap().push(Resume::Value(value));
        }
        self.started = true;
        Ok(self.next())
    }

    fn resume_with_error(&mut self, error: RoutineError) -> Result<Step, RoutineError> {
        self.resumes.lock().unwrap().push(Resume::Error(error.clone()));
        if !self.catch_errors {
            return Err(error);
        }
        Ok(self.next())
    }
}

/// Resumptions recorded so far
pub fn resumes(log: &Arc<Mutex<Vec<Resume>>>) -> Vec<Resume> {
    log.lock().unwrap().clone()
}
