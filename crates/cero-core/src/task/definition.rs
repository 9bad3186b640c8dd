//! Task trait and per-type settings
//!
//! A task is a struct implementing [`Task`]: its fields are the resolved
//! attribute values (materialized through serde after coercion/validation),
//! its [`Task::schema`] declares the input surface, and [`Task::settings`]
//! carries the declarative metadata — lifecycle callbacks bound to concrete
//! functions, plus task-scoped middleware.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::attribute::Schema;
use crate::fault::Fault;
use crate::task::engine::Execution;
use crate::task::middleware::{Middleware, MiddlewareBinding};

/// Lifecycle positions at which callbacks run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Before any middleware or work
    BeforeExecution,

    /// After work classified as success
    OnSuccess,

    /// After work classified as skipped
    OnSkipped,

    /// After work classified as failed
    OnFailed,

    /// After any terminal status
    OnComplete,

    /// Last hook, after the status-specific and complete stages
    AfterExecution,
}

/// A lifecycle callback bound to a concrete task type
pub type Callback<T> = fn(&mut T, &mut Execution) -> Result<(), Fault>;

/// Declarative per-type metadata: ordered callback lists and middleware
///
/// # Example
///
/// ```ignore
/// fn settings() -> Settings<Self> {
///     Settings::new()
///         .before_execution(Self::setup)
///         .on_success(Self::record_success)
///         .middleware(TimeoutMiddleware::new(Duration::from_secs(30)))
/// }
/// ```
pub struct Settings<T> {
    pub(crate) before_execution: Vec<Callback<T>>,
    pub(crate) on_success: Vec<Callback<T>>,
    pub(crate) on_skipped: Vec<Callback<T>>,
    pub(crate) on_failed: Vec<Callback<T>>,
    pub(crate) on_complete: Vec<Callback<T>>,
    pub(crate) after_execution: Vec<Callback<T>>,
    pub(crate) middlewares: Vec<MiddlewareBinding>,
}

impl<T> Default for Settings<T> {
    fn default() -> Self {
        Self {
            before_execution: Vec::new(),
            on_success: Vec::new(),
            on_skipped: Vec::new(),
            on_failed: Vec::new(),
            on_complete: Vec::new(),
            after_execution: Vec::new(),
            middlewares: Vec::new(),
        }
    }
}

impl<T> Settings<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_execution(mut self, callback: Callback<T>) -> Self {
        self.before_execution.push(callback);
        self
    }

    pub fn on_success(mut self, callback: Callback<T>) -> Self {
        self.on_success.push(callback);
        self
    }

    pub fn on_skipped(mut self, callback: Callback<T>) -> Self {
        self.on_skipped.push(callback);
        self
    }

    pub fn on_failed(mut self, callback: Callback<T>) -> Self {
        self.on_failed.push(callback);
        self
    }

    pub fn on_complete(mut self, callback: Callback<T>) -> Self {
        self.on_complete.push(callback);
        self
    }

    pub fn after_execution(mut self, callback: Callback<T>) -> Self {
        self.after_execution.push(callback);
        self
    }

    /// Append a task-scoped middleware; runs inside the global chain
    pub fn middleware<M: Middleware>(self, middleware: M) -> Self {
        self.middleware_with(middleware, serde_json::Value::Null)
    }

    /// Append a task-scoped middleware with an options bag
    pub fn middleware_with<M: Middleware>(
        mut self,
        middleware: M,
        options: serde_json::Value,
    ) -> Self {
        self.middlewares.push(MiddlewareBinding::new(middleware, options));
        self
    }

    pub(crate) fn stage(&self, stage: Stage) -> &[Callback<T>] {
        match stage {
            Stage::BeforeExecution => &self.before_execution,
            Stage::OnSuccess => &self.on_success,
            Stage::OnSkipped => &self.on_skipped,
            Stage::OnFailed => &self.on_failed,
            Stage::OnComplete => &self.on_complete,
            Stage::AfterExecution => &self.after_execution,
        }
    }
}

/// A unit of work with declared inputs and a lifecycle
///
/// Implementors are plain structs whose fields receive the resolved
/// attribute values. `work` is the single effectful step; it signals
/// skip/fail through [`Fault`] and arbitrary errors bubble into the
/// unexpected channel via `?`.
///
/// # Example
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct Greet {
///     name: String,
/// }
///
/// #[async_trait]
/// impl Task for Greet {
///     const NAME: &'static str = "greet";
///
///     fn schema() -> Schema {
///         Schema::new().attribute("name", required().kind(AttrKind::String))
///     }
///
///     async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault> {
///         exec.context().set("message", format!("Hello, {}!", self.name));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: DeserializeOwned + Send + 'static {
    /// Type name recorded on results and used in logs
    const NAME: &'static str;

    /// Declared input surface
    fn schema() -> Schema {
        Schema::new()
    }

    /// Declarative callbacks and middleware for this type
    fn settings() -> Settings<Self> {
        Settings::new()
    }

    /// The work step
    async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault>;

    /// Compensation hook, invoked in reverse completion order when the
    /// chain later fails with a status in the rollback policy
    async fn rollback(&mut self, _exec: &mut Execution) -> Result<(), Fault> {
        Ok(())
    }
}

/// Type-erased task driven by the engine
///
/// The typed wrapper knows its concrete callback lists; the engine and
/// middleware only see this interface.
#[async_trait]
pub trait TaskHandle: Send {
    /// Task type name
    fn task_type(&self) -> &'static str;

    /// Task-scoped middleware bindings
    fn middlewares(&self) -> &[MiddlewareBinding];

    /// Run the callbacks registered for a stage, in order
    fn run_stage(&mut self, stage: Stage, exec: &mut Execution) -> Result<(), Fault>;

    /// Dispatch the work step
    async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault>;

    /// Dispatch the rollback hook
    async fn rollback(&mut self, exec: &mut Execution) -> Result<(), Fault>;
}

/// Typed wrapper binding a task value to its settings
pub(crate) struct Bound<T: Task> {
    pub task: T,
    pub settings: Settings<T>,
}

#[async_trait]
impl<T: Task> TaskHandle for Bound<T> {
    fn task_type(&self) -> &'static str {
        T::NAME
    }

    fn middlewares(&self) -> &[MiddlewareBinding] {
        &self.settings.middlewares
    }

    fn run_stage(&mut self, stage: Stage, exec: &mut Execution) -> Result<(), Fault> {
        for callback in self.settings.stage(stage) {
            callback(&mut self.task, exec)?;
        }
        Ok(())
    }

    async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        self.task.work(exec).await
    }

    async fn rollback(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        self.task.rollback(exec).await
    }
}
