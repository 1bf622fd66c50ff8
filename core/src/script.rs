//! Scripted routines
//!
//! A [`Script`] is a JSON list of commands. Running it as a [`ScriptRoutine`]
//! yields the commands in order and records what each one resumed with, so a
//! command sequence can be exercised without writing a coroutine by hand.
//!
//! ```json
//! {
//!   "name": "save-post",
//!   "steps": [
//!     { "command": { "type": "WAIT", "ms": 5 } },
//!     { "command": { "type": "FAIL", "reason": { "code": 404 } }, "on_error": "continue" },
//!     { "command": { "type": "LOG", "msg": "saved" } }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::coroutine::Coroutine;
use crate::error::RoutineError;
use crate::types::{Command, Step};

/// What a step does when its command fails
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Re-raise, failing the whole routine
    #[default]
    Raise,
    /// Record the error and move on
    Continue,
    /// Record this value as if the command had succeeded
    Fallback(JsonValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub command: Command,

    #[serde(default)]
    pub on_error: OnError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub name: Option<String>,

    pub steps: Vec<ScriptStep>,
}

impl Script {
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source).context("Failed to parse script")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::from_json(&source).with_context(|| format!("Invalid script {}", path.display()))
    }

    pub fn into_routine(self) -> ScriptRoutine {
        ScriptRoutine::new(self)
    }
}

/* ===================== Script Routine ===================== */

/// Coroutine that replays a [`Script`]
///
/// Finishes with `{"name": .., "transcript": [..]}` where each transcript
/// entry is `{"type": .., "value": ..}` or `{"type": .., "error": {..}}`.
#[derive(Debug)]
pub struct ScriptRoutine {
    script: Script,
    /// Index of the step the routine is suspended on
    cursor: Option<usize>,
    transcript: Vec<JsonValue>,
    finished: bool,
}

impl ScriptRoutine {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            cursor: None,
            transcript: Vec::new(),
            finished: false,
        }
    }

    pub fn transcript(&self) -> &[JsonValue] {
        &self.transcript
    }

    fn current_kind(&self, index: usize) -> JsonValue {
        self.script.steps[index]
            .command
            .kind()
            .map(|kind| JsonValue::String(kind.to_string()))
            .unwrap_or(JsonValue::Null)
    }

    fn record(&mut self, field: &str, value: JsonValue) {
        if let Some(index) = self.cursor {
            let mut entry = serde_json::Map::new();
            entry.insert("type".to_string(), self.current_kind(index));
            entry.insert(field.to_string(), value);
            self.transcript.push(JsonValue::Object(entry));
        }
    }

    /// Move to the next step or finish
    fn next(&mut self) -> Step {
        let index = self.cursor.map_or(0, |i| i + 1);
        match self.script.steps.get(index) {
            Some(step) => {
                self.cursor = Some(index);
                Step::Yield(step.command.clone())
            }
            None => {
                self.finished = true;
                Step::Done(json!({
                    "name": self.script.name,
                    "transcript": self.transcript,
                }))
            }
        }
    }

    fn ensure_running(&self) -> Result<(), RoutineError> {
        if self.finished {
            return Err(RoutineError::new("script resumed after it finished"));
        }
        Ok(())
    }
}

impl Coroutine for ScriptRoutine {
    fn resume(&mut self, value: JsonValue) -> Result<Step, RoutineError> {
        self.ensure_running()?;
        self.record("value", value);
        Ok(self.next())
    }

    fn resume_with_error(&mut self, error: RoutineError) -> Result<Step, RoutineError> {
        self.ensure_running()?;

        let Some(index) = self.cursor else {
            // Not started yet, nothing can catch it
            self.finished = true;
            return Err(error);
        };

        match self.script.steps[index].on_error.clone() {
            OnError::Raise => {
                self.finished = true;
                Err(error)
            }
            OnError::Continue => {
                let error = serde_json::to_value(&error).unwrap_or(JsonValue::Null);
                self.record("error", error);
                Ok(self.next())
            }
            OnError::Fallback(value) => {
                self.record("value", value);
                Ok(self.next())
            }
        }
    }
}
