//! Handler registry
//!
//! Maps command types to handlers. Built once, then shared read-only by every
//! run of a runtime.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Failure;
use crate::types::{Command, HandlerResult};

/* ===================== Handler Context ===================== */

/// Per-run information passed to every handler invocation
#[derive(Debug, Clone)]
pub struct HandlerContext {
    run_id: Uuid,
    cancel: CancellationToken,
}

impl HandlerContext {
    pub fn new(run_id: Uuid, cancel: CancellationToken) -> Self {
        Self { run_id, cancel }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Token that fires when the run is cancelled
    ///
    /// Deferred results that hold resources should race against it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/* ===================== Handler ===================== */

type HandlerFn = dyn Fn(&Command, &HandlerContext) -> Result<HandlerResult, Failure> + Send + Sync;

/// Effect-specific logic for one command type
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Command, &HandlerContext) -> Result<HandlerResult, Failure> + Send + Sync + 'static,
    {
        Handler(Arc::new(f))
    }

    pub fn call(&self, command: &Command, cx: &HandlerContext) -> Result<HandlerResult, Failure> {
        (self.0)(command, cx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/* ===================== Registry ===================== */

/// Result of looking a command up in the registry
#[derive(Debug)]
pub enum Dispatch<'a> {
    /// A handler is registered for the command's type
    Controlled(&'a Handler),
    /// No handler; the command goes to the sink
    Uncontrolled,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("handler for '{0}' registered more than once")]
    DuplicateHandler(String),
}

/// Immutable mapping from command type to handler
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build from an existing map. Map keys are unique by construction.
    pub fn from_map(handlers: HashMap<String, Handler>) -> Self {
        Self { handlers }
    }

    /// Find the handler responsible for a command
    ///
    /// Commands without a string `type` are always uncontrolled.
    pub fn lookup(&self, command: &Command) -> Dispatch<'_> {
        match command.kind().and_then(|kind| self.handlers.get(kind)) {
            Some(handler) => Dispatch::Controlled(handler),
            None => Dispatch::Uncontrolled,
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered command types, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Builder that rejects duplicate registrations
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Handler>,
    duplicates: Vec<String>,
}

impl RegistryBuilder {
    /// Register a handler for a command type
    pub fn handler<F>(mut self, kind: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Command, &HandlerContext) -> Result<HandlerResult, Failure> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.handlers.contains_key(&kind) {
            self.duplicates.push(kind);
        } else {
            self.handlers.insert(kind, Handler::new(f));
        }
        self
    }

    pub fn build(self) -> Result<HandlerRegistry, RegistryError> {
        if let Some(kind) = self.duplicates.into_iter().next() {
            return Err(RegistryError::DuplicateHandler(kind));
        }
        Ok(HandlerRegistry {
            handlers: self.handlers,
        })
    }
}
