pub mod builtins;
pub mod cli;
pub mod config;
pub mod coroutine;
pub mod error;
pub mod middleware;
pub mod registry;
pub mod runtime;
pub mod script;
pub mod types;

// Re-export main types
pub use types::*;

pub use coroutine::{routine, Coroutine, FnRoutine};
pub use error::{normalize, Failure, RoutineError, RunError, NON_STRING_FAILURE};
pub use middleware::{Action, Dispatched, RoutineMiddleware};
pub use registry::{Dispatch, Handler, HandlerContext, HandlerRegistry, RegistryBuilder, RegistryError};
pub use runtime::{create_runtime, Runtime, RuntimeOptions};
pub use script::{Script, ScriptRoutine};
