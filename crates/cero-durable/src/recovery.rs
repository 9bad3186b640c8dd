//! Crash recovery
//!
//! A [`WorkflowRegistry`] maps workflow type names to recovery factories;
//! [`WorkflowRecovery`] walks the store's active list, reconstructs each
//! workflow from its latest checkpoint plus subsequent events, re-spawns
//! its driver and returns the live handles. Workflows whose history
//! already ends in a terminal event are finalized and skipped.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::error::DurableError;
use crate::event::{EventRecord, WorkflowEvent, WorkflowId};
use crate::handle::{RecoveredHandle, WorkflowHandle};
use crate::runtime::{spawn_driver, RuntimeConfig, Seed, Shared};
use crate::store::{ActiveWorkflowInfo, WorkflowStore};
use crate::workflow::DurableWorkflow;

type RecoverFactory = Arc<
    dyn Fn(
            WorkflowId,
            Arc<dyn WorkflowStore>,
            RuntimeConfig,
        ) -> BoxFuture<'static, Result<Option<RecoveredHandle>, DurableError>>
        + Send
        + Sync,
>;

/// Registry of workflow types for recovery
///
/// # Example
///
/// ```ignore
/// let mut registry = WorkflowRegistry::new();
/// registry.register::<OrderApproval>();
/// let recovery = WorkflowRecovery::new(store, registry);
/// let handles = recovery.recover_all().await?;
/// ```
pub struct WorkflowRegistry {
    factories: HashMap<String, RecoverFactory>,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a workflow type under its `TYPE` name
    pub fn register<W: DurableWorkflow>(&mut self) {
        let factory: RecoverFactory = Arc::new(|workflow_id, store, config| {
            Box::pin(async move {
                let handle = recover_workflow::<W>(workflow_id, store, config).await?;
                Ok(handle.map(RecoveredHandle::from_typed))
            })
        });
        self.factories.insert(W::TYPE.to_string(), factory);
    }

    /// Check whether a workflow type is registered
    pub fn contains(&self, workflow_type: &str) -> bool {
        self.factories.contains_key(workflow_type)
    }

    /// Number of registered workflow types
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered workflow type names
    pub fn workflow_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflow_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Recovers live handles from a store's active list
pub struct WorkflowRecovery {
    store: Arc<dyn WorkflowStore>,
    registry: WorkflowRegistry,
    config: RuntimeConfig,
}

impl WorkflowRecovery {
    pub fn new(store: Arc<dyn WorkflowStore>, registry: WorkflowRegistry) -> Self {
        Self {
            store,
            registry,
            config: RuntimeConfig::default(),
        }
    }

    pub fn with_config(
        store: Arc<dyn WorkflowStore>,
        registry: WorkflowRegistry,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Workflows the store still considers active
    pub async fn list_recoverable(&self) -> Result<Vec<ActiveWorkflowInfo>, DurableError> {
        Ok(self.store.list_active().await?)
    }

    /// Reconstruct and re-spawn every recoverable workflow
    ///
    /// Active records whose type is not registered are left untouched and
    /// logged; records whose history already ended are cleared.
    pub async fn recover_all(&self) -> Result<Vec<RecoveredHandle>, DurableError> {
        let mut handles = Vec::new();
        for info in self.store.list_active().await? {
            let Some(factory) = self.registry.factories.get(&info.workflow_type) else {
                warn!(
                    workflow = %info.workflow_id,
                    workflow_type = %info.workflow_type,
                    "active workflow has no registered type; skipping"
                );
                continue;
            };
            match factory(
                info.workflow_id.clone(),
                self.store.clone(),
                self.config.clone(),
            )
            .await?
            {
                Some(handle) => {
                    info!(workflow = %info.workflow_id, "workflow recovered");
                    handles.push(handle);
                }
                None => {
                    debug!(workflow = %info.workflow_id, "workflow already terminal; cleared");
                }
            }
        }
        Ok(handles)
    }

    /// Reconstruct one workflow with its concrete type
    pub async fn recover<W: DurableWorkflow>(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowHandle<W>>, DurableError> {
        recover_workflow::<W>(workflow_id.to_string(), self.store.clone(), self.config.clone())
            .await
    }
}

/// Rebuild one workflow from its checkpoint and post-checkpoint events,
/// then re-spawn its driver in replay mode
async fn recover_workflow<W: DurableWorkflow>(
    workflow_id: WorkflowId,
    store: Arc<dyn WorkflowStore>,
    config: RuntimeConfig,
) -> Result<Option<WorkflowHandle<W>>, DurableError> {
    let checkpoint = store.latest_checkpoint(&workflow_id).await?;
    let after_sequence = checkpoint.as_ref().map(|c| c.sequence).unwrap_or(0);
    let mut events = store.events(&workflow_id, after_sequence).await?;

    if events.iter().any(|r| r.event.is_terminal()) {
        store.mark_completed(&workflow_id).await?;
        return Ok(None);
    }

    let seed = match checkpoint {
        Some(checkpoint) => {
            let state: W = serde_json::from_value(checkpoint.state)?;
            let last_sequence = events
                .last()
                .map(|r| r.sequence)
                .unwrap_or(checkpoint.sequence);
            Seed {
                workflow_id: workflow_id.clone(),
                state,
                context: cero_core::Context::from_map(checkpoint.context),
                last_sequence,
                history: VecDeque::from(events),
                checkpoint_steps: checkpoint
                    .completed_steps
                    .into_iter()
                    .map(|s| (s.index, s.result))
                    .collect(),
                checkpoint_conditions: checkpoint
                    .pending_conditions
                    .into_iter()
                    .map(|c| (c.id, c.deadline))
                    .collect(),
                checkpoint_sleeps: checkpoint
                    .pending_sleeps
                    .into_iter()
                    .map(|s| (s.id, s.wake_at))
                    .collect(),
                checkpoint_resolved_conditions: checkpoint
                    .resolved_conditions
                    .into_iter()
                    .map(|c| (c.id, c.satisfied))
                    .collect(),
                checkpoint_completed_sleeps: checkpoint.completed_sleeps.into_iter().collect(),
            }
        }
        None => {
            if events.is_empty() {
                return Err(DurableError::Replay(format!(
                    "active workflow '{workflow_id}' has no events"
                )));
            }
            let first = events.remove(0);
            let first_sequence = first.sequence;
            let EventRecord {
                event: WorkflowEvent::WorkflowStarted { input, .. },
                ..
            } = first
            else {
                return Err(DurableError::Replay(format!(
                    "first event of '{workflow_id}' is not workflow.started"
                )));
            };
            let input: W::Input = serde_json::from_value(input)?;
            let last_sequence = events.last().map(|r| r.sequence).unwrap_or(first_sequence);
            Seed {
                workflow_id: workflow_id.clone(),
                state: W::new(input),
                context: cero_core::Context::new(),
                last_sequence,
                history: VecDeque::from(events),
                checkpoint_steps: HashMap::new(),
                checkpoint_conditions: HashMap::new(),
                checkpoint_sleeps: HashMap::new(),
                checkpoint_resolved_conditions: HashMap::new(),
                checkpoint_completed_sleeps: HashSet::new(),
            }
        }
    };

    let shared = Shared::build(seed, store, config);
    spawn_driver(shared.clone());
    Ok(Some(WorkflowHandle::new(shared)))
}
