//! WorkflowStore trait definition
//!
//! The store owns durable state: the append-only event log, the latest
//! checkpoint per workflow, and the active list. `append_event` must be
//! atomic with respect to `events`/`latest_checkpoint` for a given
//! workflow, and must reject any sequence that is not exactly `last + 1`.

mod memory;

pub use memory::InMemoryWorkflowStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::checkpoint::WorkflowCheckpoint;
use crate::event::{EventRecord, WorkflowId};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Workflow not found
    #[error("workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    /// Append with a non-monotonic sequence
    #[error("sequence conflict for '{workflow_id}': expected {expected}, got {actual}")]
    SequenceConflict {
        workflow_id: WorkflowId,
        expected: u64,
        actual: u64,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend error
    #[error("backend error: {0}")]
    Backend(String),
}

/// A live workflow, as tracked by the store's active list
///
/// Populated by `workflow.started`, removed by [`WorkflowStore::mark_completed`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveWorkflowInfo {
    pub workflow_id: WorkflowId,
    pub workflow_type: String,
}

/// Store for workflow events, checkpoints and the active list
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait WorkflowStore: Send + Sync + 'static {
    /// Append one event
    ///
    /// Atomic; rejects a sequence that is not exactly `last + 1`. A
    /// `workflow.started` record creates the workflow and adds it to the
    /// active list.
    async fn append_event(&self, record: EventRecord) -> Result<(), StoreError>;

    /// Events with `sequence > after_sequence`, ordered by sequence ASC
    async fn events(
        &self,
        workflow_id: &str,
        after_sequence: u64,
    ) -> Result<Vec<EventRecord>, StoreError>;

    /// Write a checkpoint, superseding any prior one for the workflow
    async fn save_checkpoint(&self, checkpoint: WorkflowCheckpoint) -> Result<(), StoreError>;

    /// The latest checkpoint, if any
    async fn latest_checkpoint(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowCheckpoint>, StoreError>;

    /// Workflows that started but have not been marked completed
    async fn list_active(&self) -> Result<Vec<ActiveWorkflowInfo>, StoreError>;

    /// Remove a workflow from the active list
    async fn mark_completed(&self, workflow_id: &str) -> Result<(), StoreError>;
}
