//! In-memory implementation of WorkflowStore for testing

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ActiveWorkflowInfo, StoreError, WorkflowStore};
use crate::checkpoint::WorkflowCheckpoint;
use crate::event::{EventRecord, WorkflowEvent};

/// Internal per-workflow state
struct WorkflowState {
    workflow_type: String,
    events: Vec<EventRecord>,
    checkpoint: Option<WorkflowCheckpoint>,
    active: bool,
}

/// In-memory implementation of [`WorkflowStore`]
///
/// Primarily for tests; it provides the same semantics a persistent
/// implementation must: atomic appends, sequence enforcement, checkpoint
/// overwrite and the active list.
///
/// # Example
///
/// ```
/// use cero_durable::InMemoryWorkflowStore;
///
/// let store = InMemoryWorkflowStore::new();
/// assert_eq!(store.workflow_count(), 0);
/// ```
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<String, WorkflowState>>,
}

impl InMemoryWorkflowStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
        }
    }

    /// Number of workflows ever started
    pub fn workflow_count(&self) -> usize {
        self.workflows.read().len()
    }

    /// Number of events recorded for one workflow
    pub fn event_count(&self, workflow_id: &str) -> usize {
        self.workflows
            .read()
            .get(workflow_id)
            .map(|w| w.events.len())
            .unwrap_or(0)
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.workflows.write().clear();
    }
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn append_event(&self, record: EventRecord) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();

        if let Some(workflow) = workflows.get_mut(&record.workflow_id) {
            let expected = workflow.events.last().map(|r| r.sequence).unwrap_or(0) + 1;
            if record.sequence != expected {
                return Err(StoreError::SequenceConflict {
                    workflow_id: record.workflow_id,
                    expected,
                    actual: record.sequence,
                });
            }
            workflow.events.push(record);
            return Ok(());
        }

        // First append must be workflow.started with sequence 1.
        let WorkflowEvent::WorkflowStarted { workflow_type, .. } = &record.event else {
            return Err(StoreError::WorkflowNotFound(record.workflow_id));
        };
        if record.sequence != 1 {
            return Err(StoreError::SequenceConflict {
                workflow_id: record.workflow_id,
                expected: 1,
                actual: record.sequence,
            });
        }
        let state = WorkflowState {
            workflow_type: workflow_type.clone(),
            events: vec![record.clone()],
            checkpoint: None,
            active: true,
        };
        workflows.insert(record.workflow_id, state);
        Ok(())
    }

    async fn events(
        &self,
        workflow_id: &str,
        after_sequence: u64,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let workflows = self.workflows.read();
        let workflow = workflows
            .get(workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;

        Ok(workflow
            .events
            .iter()
            .filter(|r| r.sequence > after_sequence)
            .cloned()
            .collect())
    }

    async fn save_checkpoint(&self, checkpoint: WorkflowCheckpoint) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        let workflow = workflows
            .get_mut(&checkpoint.workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(checkpoint.workflow_id.clone()))?;

        workflow.checkpoint = Some(checkpoint);
        Ok(())
    }

    async fn latest_checkpoint(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowCheckpoint>, StoreError> {
        let workflows = self.workflows.read();
        let workflow = workflows
            .get(workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;

        Ok(workflow.checkpoint.clone())
    }

    async fn list_active(&self) -> Result<Vec<ActiveWorkflowInfo>, StoreError> {
        let workflows = self.workflows.read();
        let mut active: Vec<ActiveWorkflowInfo> = workflows
            .iter()
            .filter(|(_, w)| w.active)
            .map(|(id, w)| ActiveWorkflowInfo {
                workflow_id: id.clone(),
                workflow_type: w.workflow_type.clone(),
            })
            .collect();
        active.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));
        Ok(active)
    }

    async fn mark_completed(&self, workflow_id: &str) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        let workflow = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;

        workflow.active = false;
        Ok(())
    }
}
