//! # Cero Core
//!
//! A task-and-workflow execution engine for long-running business
//! processes.
//!
//! ## Features
//!
//! - **Declarative tasks**: a validated attribute surface plus one `work`
//!   step, with coercion and validation through pluggable registries
//! - **Lifecycle engine**: middleware onion, staged callbacks, skip/fail
//!   flow control, immutable results, chain rollback
//! - **Workflow pipelines**: sequential composition with parallel groups,
//!   shared context, breakpoints
//! - **Explicit configuration**: process defaults plus explicit [`Engine`]
//!   values for visible plumbing
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │   (attribute binding, middleware chain, callback dispatch)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Chain                              │
//! │      (identity, shared Context, result log, rollback)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TaskResult                            │
//! │        (immutable record: state, status, metadata)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use cero_core::prelude::*;
//!
//! #[derive(Deserialize)]
//! struct Greet {
//!     name: String,
//! }
//!
//! #[async_trait]
//! impl Task for Greet {
//!     const NAME: &'static str = "greet";
//!
//!     fn schema() -> Schema {
//!         Schema::new().attribute("name", required().rule("length", json!({"min": 1})))
//!     }
//!
//!     async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault> {
//!         exec.context().set("message", format!("Hello, {}!", self.name));
//!         Ok(())
//!     }
//! }
//!
//! let result = execute::<Greet>(json!({"name": "World"})).await;
//! assert!(result.success());
//! ```

pub mod attribute;
pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod fault;
pub mod result;
pub mod task;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::attribute::{optional, required, AttrKind, Schema};
    pub use crate::chain::Chain;
    pub use crate::config::{configure, configuration, reset_configuration, Configuration};
    pub use crate::context::Context;
    pub use crate::fault::{fail, fail_with, skip, skip_with, Fault, FaultMatcher};
    pub use crate::result::{Outcome, TaskResult, TaskState, TaskStatus};
    pub use crate::task::{
        Engine, ExecuteOptions, Execution, Middleware, Next, Settings, Stage, Task,
        TimeoutMiddleware,
    };
    pub use crate::workflow::{step, Step, StepTask, Strategy, Workflow};
    pub use async_trait::async_trait;
}

// Re-export key types at crate root
pub use attribute::{
    optional, required, AttrKind, AttributeBuilder, AttributeDescriptor, Schema,
};
pub use chain::Chain;
pub use config::{
    configure, configuration, reset_configuration, Configuration, ExceptionHandler, StageObserver,
};
pub use context::{Context, ContextView};
pub use error::{CeroError, CoercionError, ErrorCollection, TimeoutError, ValidationError};
pub use fault::{fail, fail_with, skip, skip_with, Fault, FaultMatcher};
pub use result::{Outcome, TaskResult, TaskState, TaskStatus};
pub use task::{
    Callback, Engine, ExecuteOptions, Execution, Middleware, MiddlewareBinding, Next, Settings,
    Stage, StrictFailure, Task, TaskHandle, TimeoutMiddleware,
};
pub use workflow::{step, Step, StepTask, Strategy, Workflow};

use serde_json::Value;

/// Execute a task on an engine built from the process configuration
pub async fn execute<T: Task>(input: Value) -> TaskResult {
    Engine::default().execute::<T>(input).await
}

/// Execute a task with options on an engine built from the process
/// configuration
pub async fn execute_with<T: Task>(input: Value, options: ExecuteOptions) -> TaskResult {
    Engine::default().execute_with::<T>(input, options).await
}

/// Strict variant of [`execute`]; raises when the result is failed
pub async fn execute_strict<T: Task>(input: Value) -> Result<TaskResult, StrictFailure> {
    Engine::default().execute_strict::<T>(input).await
}
