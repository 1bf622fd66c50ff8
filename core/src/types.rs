use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::error::{Failure, RoutineError};

/* ===================== Command ===================== */

/// A discriminated payload emitted by a routine at a suspension point
///
/// Commands are plain JSON objects with a string `type` field. Anything else
/// is still accepted and simply never matches a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(JsonValue);

impl Command {
    /// Create a command with only a `type` field
    pub fn new(kind: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("type".to_string(), JsonValue::String(kind.into()));
        Command(JsonValue::Object(map))
    }

    /// Add a payload field
    pub fn with(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        if let JsonValue::Object(map) = &mut self.0 {
            map.insert(field.into(), value.into());
        }
        self
    }

    /// Wrap an arbitrary JSON value, well-formed or not
    pub fn from_value(value: JsonValue) -> Self {
        Command(value)
    }

    /// Serialize a typed command (usually a `#[serde(tag = "type")]` enum)
    pub fn from_serializable<T: Serialize>(command: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(command).map(Command)
    }

    /// The `type` discriminant, if present
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(JsonValue::as_str)
    }

    /// Read a payload field
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    pub fn as_value(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_value(self) -> JsonValue {
        self.0
    }

    /// Whether a value has the shape of a command
    pub fn is_command(value: &JsonValue) -> bool {
        value
            .as_object()
            .and_then(|map| map.get("type"))
            .map(JsonValue::is_string)
            .unwrap_or(false)
    }
}

impl From<JsonValue> for Command {
    fn from(value: JsonValue) -> Self {
        Command(value)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/* ===================== Routine Protocol ===================== */

/// What a routine produced after being resumed
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Suspended on a command
    Yield(Command),
    /// Finished with a final result
    Done(JsonValue),
}

/// How a routine is being resumed
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    Value(JsonValue),
    Error(RoutineError),
}

/* ===================== Handler Results ===================== */

/// An asynchronous handler result
pub type Deferred = Pin<Box<dyn Future<Output = Result<JsonValue, Failure>> + Send + 'static>>;

/// Outcome of invoking a handler
pub enum HandlerResult {
    /// Completed synchronously; resume with this value
    Value(JsonValue),
    /// Completes later; the routine is suspended until it settles
    Deferred(Deferred),
    /// Handled as a side effect; resume with `null`, do not forward
    Handled,
    /// Not acted upon; the command is forwarded to the sink
    Declined,
}

impl HandlerResult {
    pub fn value(value: impl Into<JsonValue>) -> Self {
        HandlerResult::Value(value.into())
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<JsonValue, Failure>> + Send + 'static,
    {
        HandlerResult::Deferred(Box::pin(future))
    }
}

impl fmt::Debug for HandlerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerResult::Value(v) => f.debug_tuple("Value").field(v).finish(),
            HandlerResult::Deferred(_) => f.write_str("Deferred(..)"),
            HandlerResult::Handled => f.write_str("Handled"),
            HandlerResult::Declined => f.write_str("Declined"),
        }
    }
}

/* ===================== Sink ===================== */

/// Delivery point for uncontrolled commands
pub trait Sink {
    fn send(&mut self, command: Command);
}

impl<F> Sink for F
where
    F: FnMut(Command),
{
    fn send(&mut self, command: Command) {
        self(command)
    }
}

impl Sink for tokio::sync::mpsc::UnboundedSender<Command> {
    fn send(&mut self, command: Command) {
        if let Err(err) = tokio::sync::mpsc::UnboundedSender::send(self, command) {
            tracing::warn!(command = %err.0, "sink receiver dropped, command discarded");
        }
    }
}
