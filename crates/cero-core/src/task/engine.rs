//! Task lifecycle engine
//!
//! [`Engine`] drives one task end-to-end: chain attachment, attribute
//! resolution, the middleware onion, callback dispatch, result
//! classification, chain commit and the breakpoint/rollback policy.
//! Every invocation yields exactly one [`TaskResult`]; declared failures
//! never propagate — only the strict entry points raise.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use crate::attribute::resolve_attributes;
use crate::chain::{Chain, RollbackEntry};
use crate::config::{configuration, Configuration};
use crate::context::Context;
use crate::error::{ErrorCollection, TimeoutError};
use crate::fault::Fault;
use crate::result::{TaskResult, TaskState, TaskStatus};
use crate::task::definition::{Bound, Stage, Task, TaskHandle};
use crate::task::middleware::{MiddlewareBinding, Next};

/// Options for joining an existing chain or seeding a context
#[derive(Default)]
pub struct ExecuteOptions {
    /// Join this chain instead of creating a fresh one
    pub chain: Option<Chain>,

    /// Seed a fresh chain with this context (ignored when `chain` is set)
    pub context: Option<Context>,
}

impl ExecuteOptions {
    pub fn on_chain(chain: Chain) -> Self {
        Self {
            chain: Some(chain),
            context: None,
        }
    }

    pub fn with_context(context: Context) -> Self {
        Self {
            chain: None,
            context: Some(context),
        }
    }
}

/// Raised by the strict entry points when the result is failed
#[derive(Debug, thiserror::Error)]
#[error("task '{task_type}' failed: {reason}")]
pub struct StrictFailure {
    pub task_type: String,
    pub reason: String,
    pub result: TaskResult,
}

/// Per-invocation state handed to work, callbacks and middleware
pub struct Execution {
    engine: Engine,
    chain: Chain,
    pub(crate) result: TaskResult,
    pub(crate) settled: bool,
}

impl Execution {
    pub(crate) fn new(engine: Engine, chain: Chain, task_type: &str, index: usize) -> Self {
        let result = TaskResult::new(chain.id(), task_type, index);
        Self {
            engine,
            chain,
            result,
            settled: false,
        }
    }

    /// The context shared by every task on this chain
    pub fn context(&self) -> &Context {
        self.chain.context()
    }

    /// The chain this invocation runs on
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// The engine driving this invocation
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The result under construction
    pub fn result(&self) -> &TaskResult {
        &self.result
    }

    /// Attach a metadata entry to the result
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.result.metadata.insert(key.into(), value);
    }

    /// Classify an outcome into the result, once
    pub(crate) fn classify(&mut self, outcome: Result<(), Fault>) {
        if self.result.status != TaskStatus::Pending {
            return;
        }
        match outcome {
            Ok(()) => {
                self.result.status = TaskStatus::Success;
                self.result.state = TaskState::Complete;
            }
            Err(Fault::Skip { reason, metadata }) => {
                self.result.status = TaskStatus::Skipped;
                self.result.state = TaskState::Interrupted;
                self.result.reason = Some(reason);
                self.merge_metadata(metadata);
            }
            Err(Fault::Fail { reason, metadata }) => {
                self.result.status = TaskStatus::Failed;
                self.result.state = TaskState::Interrupted;
                self.result.reason = Some(reason);
                self.merge_metadata(metadata);
            }
            Err(Fault::Error(error)) => {
                self.result.status = TaskStatus::Failed;
                self.result.state = TaskState::Interrupted;
                self.result.reason = Some(error.to_string());
                if let Some(timeout) = error.downcast_ref::<TimeoutError>() {
                    self.result.metadata.insert(
                        "timeout".to_string(),
                        json!({ "limit_ms": timeout.limit.as_millis() as u64 }),
                    );
                } else {
                    let handler = self.engine.config.exception_handler.clone();
                    handler(&error);
                    let chain: Vec<String> = error.chain().map(|c| c.to_string()).collect();
                    self.result.metadata.insert(
                        "exception".to_string(),
                        json!({ "message": error.to_string(), "chain": chain }),
                    );
                }
            }
        }
    }

    fn merge_metadata(&mut self, metadata: Map<String, Value>) {
        for (key, value) in metadata {
            self.result.metadata.insert(key, value);
        }
    }

    /// Run the status-specific, complete and after-execution stages, once
    ///
    /// Faults raised by post-work callbacks are reported to the exception
    /// handler; they never re-classify a settled result.
    pub(crate) fn run_terminal(&mut self, mut task: Option<&mut dyn TaskHandle>) {
        if self.settled {
            return;
        }
        self.settled = true;

        let status_stage = match self.result.status {
            TaskStatus::Success => Stage::OnSuccess,
            TaskStatus::Skipped => Stage::OnSkipped,
            TaskStatus::Failed | TaskStatus::Pending => Stage::OnFailed,
        };

        let config = self.engine.config.clone();
        for stage in [status_stage, Stage::OnComplete, Stage::AfterExecution] {
            for (at, observer) in &config.observers {
                if *at == stage {
                    observer(stage, self);
                }
            }
            if let Some(ref mut handle) = task {
                if let Err(fault) = handle.run_stage(stage, self) {
                    self.report_callback_fault(stage, fault);
                }
            }
        }
    }

    pub(crate) fn report_callback_fault(&self, stage: Stage, fault: Fault) {
        let handler = &self.engine.config.exception_handler;
        match fault {
            Fault::Error(error) => handler(&error),
            other => handler(&anyhow::anyhow!("callback fault at {stage:?}: {other}")),
        }
    }

    fn finalize_invalid(&mut self, errors: ErrorCollection) {
        self.result.status = TaskStatus::Failed;
        self.result.state = TaskState::Interrupted;
        self.result.reason = Some("Invalid".to_string());
        self.result.metadata.insert(
            "errors".to_string(),
            serde_json::to_value(&errors).unwrap_or(Value::Null),
        );
        self.run_terminal(None);
    }

    /// Freeze the result: snapshot the context and commit to the chain
    fn freeze(&mut self) -> TaskResult {
        self.result.context = self.chain.context().snapshot();
        self.result.finished_at = chrono::Utc::now();
        let result = self.result.clone();
        self.chain.push_result(result.clone());
        result
    }
}

/// Drives tasks and workflows
///
/// An engine is a cheap handle around an immutable configuration snapshot.
/// `Engine::default()` snapshots the process configuration; pass an
/// explicit [`Configuration`] to keep the plumbing visible.
#[derive(Clone)]
pub struct Engine {
    config: Arc<Configuration>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(configuration())
    }
}

impl Engine {
    /// Build an engine from an explicit configuration
    pub fn new(config: Configuration) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The configuration this engine runs under
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Execute a task on a fresh chain
    pub async fn execute<T: Task>(&self, input: Value) -> TaskResult {
        self.execute_with::<T>(input, ExecuteOptions::default()).await
    }

    /// Execute a task, optionally joining a chain or seeding a context
    #[instrument(skip(self, input, options), fields(task = T::NAME))]
    pub async fn execute_with<T: Task>(&self, input: Value, options: ExecuteOptions) -> TaskResult {
        let chain = match options.chain {
            Some(chain) => chain,
            None => match options.context {
                Some(context) => Chain::with_context(context),
                None => Chain::new(),
            },
        };
        let index = chain.next_index();
        let mut exec = Execution::new(self.clone(), chain, T::NAME, index);

        let input_map = match input {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                warn!(task = T::NAME, input = %other, "task input is not an object");
                let mut errors = ErrorCollection::new();
                errors.add("input", "must be an object");
                exec.finalize_invalid(errors);
                return self.commit(None, exec).await;
            }
        };

        let schema = T::schema();
        let resolved = resolve_attributes(
            &schema,
            &input_map,
            self.config.coercions(),
            self.config.validators(),
        );
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(errors) => {
                debug!(task = T::NAME, errors = %errors, "attribute resolution failed");
                exec.finalize_invalid(errors);
                return self.commit(None, exec).await;
            }
        };

        let mut bound: Box<dyn TaskHandle> =
            match serde_json::from_value::<T>(Value::Object(resolved)) {
                Ok(task) => Box::new(Bound {
                    task,
                    settings: T::settings(),
                }),
                Err(e) => {
                    let mut errors = ErrorCollection::new();
                    errors.add("input", e.to_string());
                    exec.finalize_invalid(errors);
                    return self.commit(None, exec).await;
                }
            };

        self.drive(bound.as_mut(), &mut exec).await;
        self.commit(Some(bound), exec).await
    }

    /// Execute a task, raising [`StrictFailure`] when the result is failed
    pub async fn execute_strict<T: Task>(&self, input: Value) -> Result<TaskResult, StrictFailure> {
        self.execute_strict_with::<T>(input, ExecuteOptions::default())
            .await
    }

    /// Strict variant of [`Engine::execute_with`]
    pub async fn execute_strict_with<T: Task>(
        &self,
        input: Value,
        options: ExecuteOptions,
    ) -> Result<TaskResult, StrictFailure> {
        let result = self.execute_with::<T>(input, options).await;
        if result.failed() {
            Err(StrictFailure {
                task_type: result.task_type.clone(),
                reason: result.reason.clone().unwrap_or_default(),
                result,
            })
        } else {
            Ok(result)
        }
    }

    async fn drive(&self, task: &mut dyn TaskHandle, exec: &mut Execution) {
        let mut bindings: Vec<MiddlewareBinding> = self.config.middlewares.clone();
        bindings.extend_from_slice(task.middlewares());

        for (at, observer) in &self.config.observers {
            if *at == Stage::BeforeExecution {
                observer(Stage::BeforeExecution, exec);
            }
        }

        let outcome = match task.run_stage(Stage::BeforeExecution, exec) {
            Ok(()) => Next::new(&bindings).run(&mut *task, exec).await,
            Err(fault) => Err(fault),
        };

        // Normal completions settle inside the innermost frame; fault paths
        // (pre-execution aborts, timed-out work) settle here.
        exec.classify(outcome);
        exec.run_terminal(Some(task));
    }

    async fn commit(&self, task: Option<Box<dyn TaskHandle>>, mut exec: Execution) -> TaskResult {
        let result = exec.freeze();
        let chain = exec.chain().clone();

        debug!(
            task = %result.task_type,
            status = %result.status,
            chain = %chain.id(),
            "task finished"
        );

        if result.success() {
            if let Some(handle) = task {
                chain.push_rollback(RollbackEntry {
                    task_id: result.task_id,
                    task_type: result.task_type.clone(),
                    index: result.index,
                    handle,
                });
            }
        }

        if self.config.rollback_on.contains(&result.status) {
            self.run_rollback(&chain).await;
        }

        result
    }

    /// Invoke rollback hooks of previously successful tasks on the chain,
    /// in reverse completion order
    pub(crate) async fn run_rollback(&self, chain: &Chain) {
        let entries = chain.take_rollback();
        for mut entry in entries {
            debug!(task = %entry.task_type, "rolling back task");
            let mut exec =
                Execution::new(self.clone(), chain.clone(), &entry.task_type, entry.index);
            if let Err(fault) = entry.handle.rollback(&mut exec).await {
                let handler = &self.config.exception_handler;
                match fault {
                    Fault::Error(error) => handler(&error),
                    other => handler(&anyhow::anyhow!(
                        "rollback fault in '{}': {other}",
                        entry.task_type
                    )),
                }
            }
            chain.mark_rolled_back(entry.task_id);
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish()
    }
}

/// Innermost frame of every middleware chain: dispatch work, classify,
/// then run the post-work stages so middleware can observe them
pub(crate) async fn dispatch_innermost(
    task: &mut dyn TaskHandle,
    exec: &mut Execution,
) -> Result<(), Fault> {
    exec.result.state = TaskState::Executing;
    debug!(task = task.task_type(), "work started");
    let outcome = task.work(exec).await;
    exec.classify(outcome);
    exec.run_terminal(Some(task));
    Ok(())
}
