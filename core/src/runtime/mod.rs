//! # Routine Runtime
//!
//! Drives a [`Coroutine`] to completion, routing each command it emits.
//!
//! ## Core Principles
//!
//! 1. **One step in flight**: a command is fully processed and its resumption
//!    delivered before the next command is looked at
//! 2. **No needless hops**: immediate values, handled and uncontrolled
//!    commands resume within the same poll; only deferred results suspend
//! 3. **Recover effects, surface bugs**: deferred failures are normalized and
//!    injected into the routine; synchronous handler failures and routines
//!    that re-raise escape `run`
//!
//! ## Example
//!
//! ```no_run
//! use routine_core::{create_runtime, Command, HandlerRegistry, HandlerResult};
//!
//! # async fn demo(coroutine: impl routine_core::Coroutine) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = HandlerRegistry::builder()
//!     .handler("NOW", |_, _| Ok(HandlerResult::value(1_700_000_000)))
//!     .build()?;
//! let runtime = create_runtime(registry);
//!
//! let result = runtime
//!     .run(coroutine, |command: Command| println!("store dispatch: {command}"))
//!     .await?;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

pub mod exec_loop;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::RuntimeSettings;
use crate::coroutine::Coroutine;
use crate::error::RunError;
use crate::registry::HandlerRegistry;
use crate::types::Sink;

pub use exec_loop::{RoutineState, Stepper};

/// Tunables for a runtime
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeOptions {
    /// Fail deferred results that take longer than this
    pub deferred_timeout: Option<Duration>,

    /// Deliver a final result to the sink when it is itself a command
    pub forward_final_command: bool,

    /// Include command payloads in debug logs
    pub trace_commands: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            deferred_timeout: None,
            forward_final_command: true,
            trace_commands: false,
        }
    }
}

impl From<&RuntimeSettings> for RuntimeOptions {
    fn from(settings: &RuntimeSettings) -> Self {
        Self {
            deferred_timeout: settings.deferred_timeout_ms.map(Duration::from_millis),
            forward_final_command: settings.forward_final_command,
            trace_commands: settings.trace_commands,
        }
    }
}

/// A handler registry wired up for running routines
///
/// Cloning is cheap; clones share the same registry.
#[derive(Debug, Clone)]
pub struct Runtime {
    registry: Arc<HandlerRegistry>,
    options: RuntimeOptions,
}

/// Wire a registry into a runtime with default options
pub fn create_runtime(registry: HandlerRegistry) -> Runtime {
    Runtime::new(registry)
}

impl Runtime {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self::with_options(registry, RuntimeOptions::default())
    }

    pub fn with_options(registry: HandlerRegistry, options: RuntimeOptions) -> Self {
        Self {
            registry: Arc::new(registry),
            options,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Run a routine to completion and return its final result
    ///
    /// Uncontrolled commands are delivered to `sink` in emission order. Runs
    /// forever if the routine never finishes.
    pub async fn run<C, S>(&self, coroutine: C, sink: S) -> Result<JsonValue, RunError>
    where
        C: Coroutine,
        S: Sink,
    {
        self.run_with_cancellation(coroutine, sink, CancellationToken::new())
            .await
    }

    /// Like [`Runtime::run`], but stops with [`RunError::Cancelled`] when
    /// `token` fires while the routine is waiting on a deferred result
    pub async fn run_with_cancellation<C, S>(
        &self,
        coroutine: C,
        sink: S,
        token: CancellationToken,
    ) -> Result<JsonValue, RunError>
    where
        C: Coroutine,
        S: Sink,
    {
        let run_id = Uuid::new_v4();
        let span = tracing::debug_span!("routine", %run_id);

        let stepper = Stepper::new(
            &self.registry,
            &self.options,
            coroutine,
            sink,
            run_id,
            token,
        );
        stepper.run_until_done().instrument(span).await
    }
}
