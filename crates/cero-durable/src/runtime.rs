//! Durable workflow runtime
//!
//! The runtime drives one workflow instance on a spawned task, appending an
//! event before every externally observable step and replaying recorded
//! events after a crash. All state lives behind a single async mutex, which
//! is what makes signal delivery atomic with condition evaluation and keeps
//! signals from interleaving with ongoing step execution.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{oneshot, watch, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use cero_core::{fail, step, Chain, Context, Engine, Fault, Task, TaskResult, TaskState, TaskStatus};

use crate::checkpoint::{
    CompletedStep, PendingCondition, PendingSleep, ResolvedCondition, WorkflowCheckpoint,
};
use crate::error::DurableError;
use crate::event::{EventRecord, WorkflowEvent, WorkflowId};
use crate::handle::WorkflowHandle;
use crate::store::{StoreError, WorkflowStore};
use crate::workflow::DurableWorkflow;
use crate::DurationSpec;

/// Configuration for the durable runtime
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Steps between checkpoints (a checkpoint is also written on every
    /// suspension and on termination)
    pub checkpoint_interval: u32,

    /// Engine used to execute pipeline steps
    pub engine: Engine,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 1,
            engine: Engine::default(),
        }
    }
}

/// A condition waiter pending inside a live workflow
struct ConditionWaiter<W> {
    id: String,
    predicate: Box<dyn Fn(&W) -> bool + Send + Sync>,
    tx: oneshot::Sender<bool>,
    deadline: Option<DateTime<Utc>>,
}

/// Mutable runtime state: workflow state, log cursor and waiters
pub(crate) struct Inner<W> {
    state: W,
    last_sequence: u64,

    /// Unconsumed post-checkpoint history (empty once live)
    history: VecDeque<EventRecord>,

    /// Steps covered by the restored checkpoint
    checkpoint_steps: HashMap<usize, TaskResult>,

    /// Conditions scheduled before the restored checkpoint
    checkpoint_conditions: HashMap<String, Option<DateTime<Utc>>>,

    /// Sleeps scheduled before the restored checkpoint
    checkpoint_sleeps: HashMap<String, DateTime<Utc>>,

    /// Conditions already resolved before the restored checkpoint
    checkpoint_resolved_conditions: HashMap<String, bool>,

    /// Sleeps already completed before the restored checkpoint
    checkpoint_completed_sleeps: HashSet<String>,

    waiters: Vec<ConditionWaiter<W>>,
    pending_sleeps: Vec<PendingSleep>,
    completed_steps: Vec<CompletedStep>,
    resolved_conditions: Vec<ResolvedCondition>,
    completed_sleeps: Vec<String>,

    step_counter: usize,
    condition_counter: u64,
    sleep_counter: u64,
    steps_since_checkpoint: u32,
    finished: bool,
}

/// Everything one workflow instance shares between its driver task and its
/// handles
pub(crate) struct Shared<W: DurableWorkflow> {
    pub(crate) workflow_id: WorkflowId,
    pub(crate) store: Arc<dyn WorkflowStore>,
    pub(crate) config: RuntimeConfig,
    pub(crate) chain: Chain,
    pub(crate) signals: crate::signal::SignalRouter<W>,
    pub(crate) queries: crate::signal::QueryRouter<W>,
    pub(crate) cancel: CancellationToken,
    pub(crate) inner: Mutex<Inner<W>>,
    pub(crate) result_tx: watch::Sender<Option<TaskResult>>,
}

/// Ingredients for building a [`Shared`], fresh or recovered
pub(crate) struct Seed<W> {
    pub workflow_id: WorkflowId,
    pub state: W,
    pub context: Context,
    pub last_sequence: u64,
    pub history: VecDeque<EventRecord>,
    pub checkpoint_steps: HashMap<usize, TaskResult>,
    pub checkpoint_conditions: HashMap<String, Option<DateTime<Utc>>>,
    pub checkpoint_sleeps: HashMap<String, DateTime<Utc>>,
    pub checkpoint_resolved_conditions: HashMap<String, bool>,
    pub checkpoint_completed_sleeps: HashSet<String>,
}

impl<W: DurableWorkflow> Shared<W> {
    pub(crate) fn build(
        seed: Seed<W>,
        store: Arc<dyn WorkflowStore>,
        config: RuntimeConfig,
    ) -> Arc<Self> {
        let (result_tx, _) = watch::channel(None);
        Arc::new(Self {
            workflow_id: seed.workflow_id,
            store,
            config,
            chain: Chain::with_context(seed.context),
            signals: W::signals(),
            queries: W::queries(),
            cancel: CancellationToken::new(),
            inner: Mutex::new(Inner {
                state: seed.state,
                last_sequence: seed.last_sequence,
                history: seed.history,
                checkpoint_steps: seed.checkpoint_steps,
                checkpoint_conditions: seed.checkpoint_conditions,
                checkpoint_sleeps: seed.checkpoint_sleeps,
                checkpoint_resolved_conditions: seed.checkpoint_resolved_conditions,
                checkpoint_completed_sleeps: seed.checkpoint_completed_sleeps,
                waiters: Vec::new(),
                pending_sleeps: Vec::new(),
                completed_steps: Vec::new(),
                resolved_conditions: Vec::new(),
                completed_sleeps: Vec::new(),
                step_counter: 0,
                condition_counter: 0,
                sleep_counter: 0,
                steps_since_checkpoint: 0,
                finished: false,
            }),
            result_tx,
        })
    }
}

/// Start a fresh workflow: append `workflow.started` and spawn the driver
#[instrument(skip(input, store, config), fields(workflow_type = W::TYPE))]
pub(crate) async fn launch<W: DurableWorkflow>(
    workflow_id: WorkflowId,
    input: W::Input,
    store: Arc<dyn WorkflowStore>,
    config: RuntimeConfig,
) -> Result<WorkflowHandle<W>, DurableError> {
    match store.events(&workflow_id, 0).await {
        Ok(events) if !events.is_empty() => {
            return Err(DurableError::AlreadyExists(workflow_id));
        }
        Ok(_) | Err(StoreError::WorkflowNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let input_json = serde_json::to_value(&input)?;
    let seed = Seed {
        workflow_id: workflow_id.clone(),
        state: W::new(input),
        context: Context::new(),
        last_sequence: 0,
        history: VecDeque::new(),
        checkpoint_steps: HashMap::new(),
        checkpoint_conditions: HashMap::new(),
        checkpoint_sleeps: HashMap::new(),
        checkpoint_resolved_conditions: HashMap::new(),
        checkpoint_completed_sleeps: HashSet::new(),
    };
    let shared = Shared::build(seed, store, config);

    {
        let mut inner = shared.inner.lock().await;
        append(
            &shared,
            &mut inner,
            WorkflowEvent::WorkflowStarted {
                workflow_type: W::TYPE.to_string(),
                input: input_json,
            },
        )
        .await?;
    }

    info!(workflow = %workflow_id, "workflow started");
    spawn_driver(shared.clone());
    Ok(WorkflowHandle::new(shared))
}

/// Spawn the single-threaded driver for a workflow instance
pub(crate) fn spawn_driver<W: DurableWorkflow>(shared: Arc<Shared<W>>) {
    tokio::spawn(async move {
        let ctx = WorkflowCtx {
            shared: shared.clone(),
        };
        let outcome = W::run(ctx).await;
        finalize(&shared, outcome).await;
    });
}

/// Append one event with the next sequence number
pub(crate) async fn append<W: DurableWorkflow>(
    shared: &Shared<W>,
    inner: &mut Inner<W>,
    event: WorkflowEvent,
) -> Result<u64, StoreError> {
    let sequence = inner.last_sequence + 1;
    debug!(workflow = %shared.workflow_id, sequence, event = event.event_type(), "append event");
    let record = EventRecord::new(shared.workflow_id.clone(), sequence, event);
    shared.store.append_event(record).await?;
    inner.last_sequence = sequence;
    Ok(sequence)
}

fn store_fault(error: StoreError) -> Fault {
    Fault::Error(anyhow::Error::new(error))
}

fn divergence(message: String) -> Fault {
    Fault::Error(anyhow::Error::new(DurableError::Replay(message)))
}

/// Write a checkpoint covering everything up to `last_sequence`
///
/// Checkpoint failures are logged and non-fatal: the event log remains the
/// source of truth.
async fn write_checkpoint<W: DurableWorkflow>(shared: &Shared<W>, inner: &mut Inner<W>) {
    let state = match serde_json::to_value(&inner.state) {
        Ok(state) => state,
        Err(e) => {
            warn!(workflow = %shared.workflow_id, error = %e, "workflow state not serializable; skipping checkpoint");
            return;
        }
    };
    let checkpoint = WorkflowCheckpoint {
        workflow_id: shared.workflow_id.clone(),
        sequence: inner.last_sequence,
        created_at: Utc::now(),
        context: shared.chain.context().snapshot(),
        state,
        completed_steps: inner.completed_steps.clone(),
        resolved_conditions: inner.resolved_conditions.clone(),
        completed_sleeps: inner.completed_sleeps.clone(),
        pending_conditions: inner
            .waiters
            .iter()
            .map(|w| PendingCondition {
                id: w.id.clone(),
                deadline: w.deadline,
            })
            .collect(),
        pending_sleeps: inner.pending_sleeps.clone(),
    };
    if let Err(e) = shared.store.save_checkpoint(checkpoint).await {
        warn!(workflow = %shared.workflow_id, error = %e, "failed to write checkpoint");
    }
    inner.steps_since_checkpoint = 0;
}

/// Deliver one signal: append, invoke the handler, then evaluate pending
/// condition predicates — all under the runtime lock
pub(crate) async fn deliver_signal<W: DurableWorkflow>(
    shared: &Shared<W>,
    name: &str,
    args: Value,
) -> Result<(), DurableError> {
    if !shared.signals.contains(name) {
        return Err(DurableError::UnknownSignal(name.to_string()));
    }

    let mut inner = shared.inner.lock().await;
    if inner.finished {
        return Err(DurableError::Terminal(shared.workflow_id.clone()));
    }

    append(
        shared,
        &mut inner,
        WorkflowEvent::SignalReceived {
            name: name.to_string(),
            args: args.clone(),
        },
    )
    .await?;
    shared.signals.dispatch(&mut inner.state, name, args)?;

    let satisfied: Vec<String> = {
        let Inner { state, waiters, .. } = &mut *inner;
        waiters
            .iter()
            .filter(|w| (w.predicate)(state))
            .map(|w| w.id.clone())
            .collect()
    };

    for id in satisfied {
        let Some(position) = inner.waiters.iter().position(|w| w.id == id) else {
            continue;
        };
        let waiter = inner.waiters.remove(position);
        append(
            shared,
            &mut inner,
            WorkflowEvent::ConditionSatisfied {
                id: waiter.id.clone(),
            },
        )
        .await?;
        inner.resolved_conditions.push(ResolvedCondition {
            id: waiter.id,
            satisfied: true,
        });
        let _ = waiter.tx.send(true);
    }

    Ok(())
}

/// Synchronous query against live workflow state; never logged
pub(crate) async fn dispatch_query<W: DurableWorkflow>(
    shared: &Shared<W>,
    name: &str,
    args: Value,
) -> Result<Value, DurableError> {
    let inner = shared.inner.lock().await;
    shared.queries.dispatch(&inner.state, name, args)
}

/// Terminate the workflow: drain residual history, append the terminal
/// event, write the final checkpoint and publish the result
async fn finalize<W: DurableWorkflow>(shared: &Arc<Shared<W>>, outcome: Result<Value, Fault>) {
    let mut inner = shared.inner.lock().await;
    if inner.finished {
        return;
    }

    // Signals recorded after the last primitive the workflow reached.
    while let Some(record) = inner.history.pop_front() {
        if let WorkflowEvent::SignalReceived { name, args } = record.event {
            if let Err(e) = shared.signals.dispatch(&mut inner.state, &name, args) {
                warn!(workflow = %shared.workflow_id, error = %e, "failed to replay trailing signal");
            }
        }
    }

    let mut result = TaskResult::new(shared.chain.id(), W::TYPE, 0);
    result.context = shared.chain.context().snapshot();

    let event = match outcome {
        Ok(value) => {
            result.status = TaskStatus::Success;
            result.state = TaskState::Complete;
            result
                .metadata
                .insert("result".to_string(), value.clone());
            WorkflowEvent::WorkflowCompleted { result: value }
        }
        Err(Fault::Skip { reason, metadata }) => {
            result.status = TaskStatus::Skipped;
            result.state = TaskState::Interrupted;
            result.reason = Some(reason);
            for (key, value) in metadata {
                result.metadata.insert(key, value);
            }
            WorkflowEvent::WorkflowCompleted {
                result: Value::Null,
            }
        }
        Err(Fault::Fail { reason, metadata }) => {
            result.status = TaskStatus::Failed;
            result.state = TaskState::Interrupted;
            result.reason = Some(reason.clone());
            for (key, value) in metadata {
                result.metadata.insert(key, value);
            }
            WorkflowEvent::WorkflowFailed { reason }
        }
        Err(Fault::Error(error)) => {
            let reason = if error
                .chain()
                .any(|cause| cause.downcast_ref::<StoreError>().is_some())
            {
                "store-unavailable".to_string()
            } else {
                error.to_string()
            };
            result.status = TaskStatus::Failed;
            result.state = TaskState::Interrupted;
            result.reason = Some(reason.clone());
            WorkflowEvent::WorkflowFailed { reason }
        }
    };

    if let Err(e) = append(shared, &mut inner, event).await {
        warn!(workflow = %shared.workflow_id, error = %e, "failed to append terminal event");
        result.status = TaskStatus::Failed;
        result.state = TaskState::Interrupted;
        result.reason = Some("store-unavailable".to_string());
    }

    write_checkpoint(shared, &mut inner).await;
    if let Err(e) = shared.store.mark_completed(&shared.workflow_id).await {
        warn!(workflow = %shared.workflow_id, error = %e, "failed to clear active record");
    }

    inner.finished = true;
    info!(workflow = %shared.workflow_id, status = %result.status, "workflow finished");
    shared.result_tx.send_replace(Some(result));
}

/// The workflow's view of the runtime
///
/// All nondeterminism inside `run` must go through these primitives; state
/// reads and writes between awaits go through [`WorkflowCtx::read_state`] /
/// [`WorkflowCtx::with_state`].
pub struct WorkflowCtx<W: DurableWorkflow> {
    pub(crate) shared: Arc<Shared<W>>,
}

impl<W: DurableWorkflow> Clone for WorkflowCtx<W> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<W: DurableWorkflow> WorkflowCtx<W> {
    /// The caller-chosen workflow id
    pub fn workflow_id(&self) -> &str {
        &self.shared.workflow_id
    }

    /// The context shared with pipeline steps
    pub fn context(&self) -> &Context {
        self.shared.chain.context()
    }

    /// Read workflow state
    pub async fn read_state<R>(&self, f: impl FnOnce(&W) -> R) -> R {
        let inner = self.shared.inner.lock().await;
        f(&inner.state)
    }

    /// Mutate workflow state
    ///
    /// Mutations must be deterministic functions of prior state; external
    /// input belongs in signals.
    pub async fn with_state<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut inner = self.shared.inner.lock().await;
        f(&mut inner.state)
    }

    /// Execute one pipeline step on the workflow's chain
    pub async fn step<T: Task>(&self) -> Result<TaskResult, Fault> {
        self.step_with::<T>(Value::Null).await
    }

    /// Execute one pipeline step with explicit input overrides
    ///
    /// Live execution appends `step.scheduled` and then `step.completed` /
    /// `step.failed`; replay reapplies the recorded result and context
    /// delta without executing.
    pub async fn step_with<T: Task>(&self, overrides: Value) -> Result<TaskResult, Fault> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        if shared.cancel.is_cancelled() {
            return Err(fail("cancelled"));
        }

        let index = inner.step_counter;
        inner.step_counter += 1;

        // Covered by the restored checkpoint: context already snapshot.
        // Re-recorded so later checkpoints keep covering it.
        if let Some(result) = inner.checkpoint_steps.remove(&index) {
            debug!(workflow = %shared.workflow_id, index, "step restored from checkpoint");
            inner.completed_steps.push(CompletedStep {
                index,
                result: result.clone(),
            });
            return Ok(result);
        }

        let mut scheduled_in_history = false;
        if !inner.history.is_empty() {
            self.apply_leading_signals(&mut inner)?;
            let front_matches = matches!(
                inner.history.front().map(|r| &r.event),
                Some(WorkflowEvent::StepScheduled { index: i, .. }) if *i == index
            );
            if front_matches {
                inner.history.pop_front();
                scheduled_in_history = true;
            } else if let Some(record) = inner.history.front() {
                return Err(divergence(format!(
                    "expected step.scheduled for index {index}, found {}",
                    record.event.event_type()
                )));
            }
        }

        if scheduled_in_history {
            self.apply_leading_signals(&mut inner)?;
            match inner.history.front().map(|r| &r.event) {
                Some(WorkflowEvent::StepCompleted { index: i, .. }) if *i == index => {
                    if let Some(WorkflowEvent::StepCompleted {
                        result,
                        context_delta,
                        ..
                    }) = inner.history.pop_front().map(|r| r.event)
                    {
                        debug!(workflow = %shared.workflow_id, index, "step replayed");
                        shared.chain.context().merge(&context_delta);
                        inner.completed_steps.push(CompletedStep {
                            index,
                            result: result.clone(),
                        });
                        return Ok(result);
                    }
                }
                Some(WorkflowEvent::StepFailed { index: i, .. }) if *i == index => {
                    if let Some(WorkflowEvent::StepFailed { result, .. }) =
                        inner.history.pop_front().map(|r| r.event)
                    {
                        debug!(workflow = %shared.workflow_id, index, "failed step replayed");
                        inner.completed_steps.push(CompletedStep {
                            index,
                            result: result.clone(),
                        });
                        return Ok(result);
                    }
                }
                Some(record_event) => {
                    return Err(divergence(format!(
                        "unexpected {} while replaying step {index}",
                        record_event.event_type()
                    )));
                }
                // Crashed mid-step: fall through and re-execute live.
                None => {}
            }
        }

        if !scheduled_in_history {
            append(
                shared,
                &mut inner,
                WorkflowEvent::StepScheduled {
                    index,
                    task_type: T::NAME.to_string(),
                },
            )
            .await
            .map_err(store_fault)?;
        }

        // Signals queue behind the lock while the step runs, so delivery
        // never interleaves with step execution.
        let before = shared.chain.context().snapshot();
        let entry = step::<T>().input(overrides);
        let result = entry.run_on(&shared.config.engine, &shared.chain).await;
        let context_delta = shared.chain.context().delta_since(&before);

        let event = if result.failed() {
            WorkflowEvent::StepFailed {
                index,
                reason: result.reason.clone().unwrap_or_default(),
                metadata: result.metadata.clone(),
                result: result.clone(),
            }
        } else {
            WorkflowEvent::StepCompleted {
                index,
                result: result.clone(),
                context_delta,
            }
        };
        append(shared, &mut inner, event).await.map_err(store_fault)?;

        inner.completed_steps.push(CompletedStep {
            index,
            result: result.clone(),
        });
        inner.steps_since_checkpoint += 1;
        if inner.steps_since_checkpoint >= shared.config.checkpoint_interval {
            write_checkpoint(shared, &mut inner).await;
        }

        Ok(result)
    }

    /// Wait until the predicate over workflow state becomes true
    ///
    /// The predicate is evaluated now and after every signal.
    pub async fn condition(
        &self,
        predicate: impl Fn(&W) -> bool + Send + Sync + 'static,
    ) -> Result<bool, Fault> {
        self.condition_inner(Box::new(predicate), None).await
    }

    /// Like [`WorkflowCtx::condition`], resolving `false` when the timeout
    /// elapses first
    pub async fn condition_timeout(
        &self,
        predicate: impl Fn(&W) -> bool + Send + Sync + 'static,
        timeout: impl Into<DurationSpec>,
    ) -> Result<bool, Fault> {
        let timeout = timeout
            .into()
            .resolve()
            .map_err(|e| Fault::Error(e.into()))?;
        self.condition_inner(Box::new(predicate), Some(timeout)).await
    }

    async fn condition_inner(
        &self,
        predicate: Box<dyn Fn(&W) -> bool + Send + Sync>,
        timeout: Option<Duration>,
    ) -> Result<bool, Fault> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        if shared.cancel.is_cancelled() {
            return Err(fail("cancelled"));
        }

        let id = format!("condition-{}", inner.condition_counter);
        inner.condition_counter += 1;

        // Fully resolved before the restored checkpoint.
        if let Some(satisfied) = inner.checkpoint_resolved_conditions.remove(&id) {
            inner.resolved_conditions.push(ResolvedCondition {
                id,
                satisfied,
            });
            return Ok(satisfied);
        }

        let mut scheduled = false;
        let mut deadline: Option<DateTime<Utc>> = None;

        if let Some(recorded) = inner.checkpoint_conditions.remove(&id) {
            scheduled = true;
            deadline = recorded;
        }

        if !scheduled && !inner.history.is_empty() {
            self.apply_leading_signals(&mut inner)?;
            let front_matches = matches!(
                inner.history.front().map(|r| &r.event),
                Some(WorkflowEvent::ConditionScheduled { id: i, .. }) if *i == id
            );
            if front_matches {
                if let Some(WorkflowEvent::ConditionScheduled {
                    deadline: recorded, ..
                }) = inner.history.pop_front().map(|r| r.event)
                {
                    deadline = recorded;
                }
                scheduled = true;
            } else if let Some(record) = inner.history.front() {
                return Err(divergence(format!(
                    "expected condition.scheduled for '{id}', found {}",
                    record.event.event_type()
                )));
            }
        }

        if scheduled {
            // Resolution recorded in history?
            self.apply_leading_signals(&mut inner)?;
            match inner.history.front().map(|r| &r.event) {
                Some(WorkflowEvent::ConditionSatisfied { id: i }) if *i == id => {
                    inner.history.pop_front();
                    inner.resolved_conditions.push(ResolvedCondition {
                        id,
                        satisfied: true,
                    });
                    return Ok(true);
                }
                Some(WorkflowEvent::ConditionTimeout { id: i }) if *i == id => {
                    inner.history.pop_front();
                    inner.resolved_conditions.push(ResolvedCondition {
                        id,
                        satisfied: false,
                    });
                    return Ok(false);
                }
                Some(record_event) => {
                    return Err(divergence(format!(
                        "unexpected {} while replaying condition '{id}'",
                        record_event.event_type()
                    )));
                }
                // Pending at crash: resume the live wait below.
                None => {}
            }
        } else {
            deadline = timeout
                .map(|t| Utc::now() + chrono::Duration::milliseconds(t.as_millis() as i64));
            append(
                shared,
                &mut inner,
                WorkflowEvent::ConditionScheduled {
                    id: id.clone(),
                    timeout_ms: timeout.map(|t| t.as_millis() as u64),
                    deadline,
                },
            )
            .await
            .map_err(store_fault)?;
        }

        // Evaluate at definition time (and after replayed signals).
        if predicate(&inner.state) {
            append(
                shared,
                &mut inner,
                WorkflowEvent::ConditionSatisfied { id: id.clone() },
            )
            .await
            .map_err(store_fault)?;
            inner.resolved_conditions.push(ResolvedCondition {
                id,
                satisfied: true,
            });
            return Ok(true);
        }

        let (tx, rx) = oneshot::channel();
        inner.waiters.push(ConditionWaiter {
            id: id.clone(),
            predicate,
            tx,
            deadline,
        });
        write_checkpoint(shared, &mut inner).await;
        drop(inner);

        debug!(workflow = %shared.workflow_id, condition = %id, "condition pending");
        match deadline {
            Some(deadline) => {
                let wait = deadline
                    .signed_duration_since(Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                tokio::select! {
                    resolved = rx => match resolved {
                        Ok(value) => Ok(value),
                        Err(_) => Err(fail("cancelled")),
                    },
                    _ = tokio::time::sleep(wait) => {
                        let mut inner = shared.inner.lock().await;
                        if let Some(position) = inner.waiters.iter().position(|w| w.id == id) {
                            inner.waiters.remove(position);
                            append(
                                shared,
                                &mut inner,
                                WorkflowEvent::ConditionTimeout { id: id.clone() },
                            )
                            .await
                            .map_err(store_fault)?;
                            inner.resolved_conditions.push(ResolvedCondition {
                                id,
                                satisfied: false,
                            });
                            Ok(false)
                        } else {
                            // A signal satisfied the condition concurrently.
                            Ok(true)
                        }
                    },
                    _ = shared.cancel.cancelled() => {
                        let mut inner = shared.inner.lock().await;
                        inner.waiters.retain(|w| w.id != id);
                        Err(fail("cancelled"))
                    },
                }
            }
            None => {
                tokio::select! {
                    resolved = rx => match resolved {
                        Ok(value) => Ok(value),
                        Err(_) => Err(fail("cancelled")),
                    },
                    _ = shared.cancel.cancelled() => {
                        let mut inner = shared.inner.lock().await;
                        inner.waiters.retain(|w| w.id != id);
                        Err(fail("cancelled"))
                    },
                }
            }
        }
    }

    /// Suspend for a duration
    ///
    /// Live execution waits on a real timer; replay resolves recorded
    /// sleeps instantly and resumes an interrupted sleep against its
    /// recorded wake time.
    pub async fn sleep(&self, duration: impl Into<DurationSpec>) -> Result<(), Fault> {
        let duration = duration
            .into()
            .resolve()
            .map_err(|e| Fault::Error(e.into()))?;

        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        if shared.cancel.is_cancelled() {
            return Err(fail("cancelled"));
        }

        let id = format!("sleep-{}", inner.sleep_counter);
        inner.sleep_counter += 1;

        // Fully completed before the restored checkpoint.
        if inner.checkpoint_completed_sleeps.remove(&id) {
            inner.completed_sleeps.push(id);
            return Ok(());
        }

        let mut scheduled = false;
        let mut wake_at: Option<DateTime<Utc>> = None;

        if let Some(recorded) = inner.checkpoint_sleeps.remove(&id) {
            scheduled = true;
            wake_at = Some(recorded);
        }

        if !scheduled && !inner.history.is_empty() {
            self.apply_leading_signals(&mut inner)?;
            let front_matches = matches!(
                inner.history.front().map(|r| &r.event),
                Some(WorkflowEvent::SleepScheduled { id: i, .. }) if *i == id
            );
            if front_matches {
                if let Some(WorkflowEvent::SleepScheduled { wake_at: at, .. }) =
                    inner.history.pop_front().map(|r| r.event)
                {
                    wake_at = Some(at);
                }
                scheduled = true;
            } else if let Some(record) = inner.history.front() {
                return Err(divergence(format!(
                    "expected sleep.scheduled for '{id}', found {}",
                    record.event.event_type()
                )));
            }
        }

        if scheduled {
            self.apply_leading_signals(&mut inner)?;
            match inner.history.front().map(|r| &r.event) {
                Some(WorkflowEvent::SleepCompleted { id: i }) if *i == id => {
                    inner.history.pop_front();
                    inner.completed_sleeps.push(id);
                    return Ok(());
                }
                Some(record_event) => {
                    return Err(divergence(format!(
                        "unexpected {} while replaying sleep '{id}'",
                        record_event.event_type()
                    )));
                }
                None => {}
            }
        } else {
            let at = Utc::now() + chrono::Duration::milliseconds(duration.as_millis() as i64);
            wake_at = Some(at);
            append(
                shared,
                &mut inner,
                WorkflowEvent::SleepScheduled {
                    id: id.clone(),
                    wake_at: at,
                },
            )
            .await
            .map_err(store_fault)?;
        }

        let at = wake_at.unwrap_or_else(Utc::now);
        inner.pending_sleeps.push(PendingSleep {
            id: id.clone(),
            wake_at: at,
        });
        write_checkpoint(shared, &mut inner).await;
        drop(inner);

        debug!(workflow = %shared.workflow_id, sleep = %id, "sleeping");
        let wait = at
            .signed_duration_since(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shared.cancel.cancelled() => {
                let mut inner = shared.inner.lock().await;
                inner.pending_sleeps.retain(|s| s.id != id);
                return Err(fail("cancelled"));
            }
        }

        let mut inner = shared.inner.lock().await;
        inner.pending_sleeps.retain(|s| s.id != id);
        append(
            shared,
            &mut inner,
            WorkflowEvent::SleepCompleted { id: id.clone() },
        )
        .await
        .map_err(store_fault)?;
        inner.completed_sleeps.push(id);
        Ok(())
    }

    /// Apply consecutive recorded signals at the replay cursor
    fn apply_leading_signals(&self, inner: &mut MutexGuard<'_, Inner<W>>) -> Result<(), Fault> {
        loop {
            let is_signal = matches!(
                inner.history.front().map(|r| &r.event),
                Some(WorkflowEvent::SignalReceived { .. })
            );
            if !is_signal {
                return Ok(());
            }
            let Some(record) = inner.history.pop_front() else {
                return Ok(());
            };
            if let WorkflowEvent::SignalReceived { name, args } = record.event {
                self.shared
                    .signals
                    .dispatch(&mut inner.state, &name, args)
                    .map_err(|e| Fault::Error(e.into()))?;
            }
        }
    }
}
