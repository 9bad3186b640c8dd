//! Task results
//!
//! A [`TaskResult`] is the immutable terminal record of one task (or
//! workflow) invocation. Every `execute` call produces exactly one; once a
//! task reaches a terminal state its result never changes again, except for
//! the `rolled_back` marker set by chain rollback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Lifecycle position of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Constructed, attributes not yet resolved
    Initialized,

    /// `work` is running
    Executing,

    /// `work` returned normally
    Complete,

    /// Execution was cut short by a skip, failure or error
    Interrupted,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Executing => write!(f, "executing"),
            Self::Complete => write!(f, "complete"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Terminal classification of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet classified
    Pending,

    /// `work` completed
    Success,

    /// Interrupted by a skip fault
    Skipped,

    /// Interrupted by a failure fault, framework error or exception
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Coarse success/failure view of a status
///
/// Skipped counts as good: the task declined the work on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Good,
    Bad,
}

impl From<TaskStatus> for Outcome {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending => Outcome::Pending,
            TaskStatus::Success | TaskStatus::Skipped => Outcome::Good,
            TaskStatus::Failed => Outcome::Bad,
        }
    }
}

/// Immutable record of one task invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Unique id of this invocation
    pub task_id: Uuid,

    /// Chain this invocation ran on
    pub chain_id: Uuid,

    /// Task type name
    pub task_type: String,

    /// Position in the chain (0-based dispatch order)
    pub index: usize,

    /// Lifecycle position reached
    pub state: TaskState,

    /// Terminal classification
    pub status: TaskStatus,

    /// Reason attached by a skip/fail fault or framework error
    pub reason: Option<String>,

    /// Structured metadata (validation errors, exception details,
    /// child results for workflows)
    pub metadata: Map<String, Value>,

    /// Retry attempts consumed (0 when no retry middleware is installed)
    pub retries: u32,

    /// Set when chain rollback invoked this task's rollback hook
    pub rolled_back: bool,

    /// Snapshot of the shared context at completion
    pub context: Map<String, Value>,

    /// When the result was frozen
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    /// Start a pending record for an invocation
    ///
    /// Used by the engine and by runtimes layering on top of it; the record
    /// stays mutable until classification freezes it.
    pub fn new(chain_id: Uuid, task_type: &str, index: usize) -> Self {
        Self {
            task_id: Uuid::now_v7(),
            chain_id,
            task_type: task_type.to_string(),
            index,
            state: TaskState::Initialized,
            status: TaskStatus::Pending,
            reason: None,
            metadata: Map::new(),
            retries: 0,
            rolled_back: false,
            context: Map::new(),
            finished_at: Utc::now(),
        }
    }

    /// Coarse outcome derived from the status
    pub fn outcome(&self) -> Outcome {
        self.status.into()
    }

    pub fn success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn skipped(&self) -> bool {
        self.status == TaskStatus::Skipped
    }

    pub fn failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    pub fn pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn complete(&self) -> bool {
        self.state == TaskState::Complete
    }

    pub fn interrupted(&self) -> bool {
        self.state == TaskState::Interrupted
    }

    pub fn good(&self) -> bool {
        self.outcome() == Outcome::Good
    }

    pub fn bad(&self) -> bool {
        self.outcome() == Outcome::Bad
    }

    /// Read a metadata entry
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Read a context entry from the frozen snapshot
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}
