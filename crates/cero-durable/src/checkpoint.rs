//! Workflow checkpoints
//!
//! A checkpoint snapshots a workflow at a given sequence so replay can start
//! strictly after it: the shared context, the serialized workflow state,
//! the steps that already finished, and the waiters that were pending when
//! the workflow suspended. Each write supersedes all prior checkpoints for
//! the same workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cero_core::TaskResult;

use crate::event::WorkflowId;

/// A step that finished before the checkpoint, with its recorded result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedStep {
    pub index: usize,
    pub result: TaskResult,
}

/// A condition waiter that was pending at checkpoint time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingCondition {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub deadline: Option<DateTime<Utc>>,
}

/// A condition that resolved before the checkpoint, with its verdict
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCondition {
    pub id: String,
    pub satisfied: bool,
}

/// A sleep that was pending at checkpoint time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingSleep {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub wake_at: DateTime<Utc>,
}

/// Snapshot of a workflow at a given sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCheckpoint {
    pub workflow_id: WorkflowId,

    /// Sequence of the last event the checkpoint covers
    pub sequence: u64,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Shared context snapshot
    pub context: Map<String, Value>,

    /// Serialized workflow state
    pub state: Value,

    pub completed_steps: Vec<CompletedStep>,
    pub resolved_conditions: Vec<ResolvedCondition>,
    pub completed_sleeps: Vec<String>,
    pub pending_conditions: Vec<PendingCondition>,
    pub pending_sleeps: Vec<PendingSleep>,
}
