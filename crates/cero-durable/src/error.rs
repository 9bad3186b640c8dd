//! Durable runtime errors

use crate::duration::DurationError;
use crate::event::WorkflowId;
use crate::store::StoreError;

/// Errors surfaced by handles, recovery and the runtime
#[derive(Debug, thiserror::Error)]
pub enum DurableError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A workflow with this id already has history
    #[error("workflow '{0}' already exists")]
    AlreadyExists(WorkflowId),

    /// The workflow already reached a terminal state
    #[error("workflow '{0}' already reached a terminal state")]
    Terminal(WorkflowId),

    /// No signal handler registered under this name
    #[error("no signal handler registered for '{0}'")]
    UnknownSignal(String),

    /// No query handler registered under this name
    #[error("no query handler registered for '{0}'")]
    UnknownQuery(String),

    /// No workflow type registered under this name
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    /// Recorded history does not match what the workflow code requested
    #[error("replay divergence: {0}")]
    Replay(String),

    /// Invalid duration argument
    #[error(transparent)]
    Duration(#[from] DurationError),

    /// The runtime task ended without producing a result
    #[error("workflow runtime terminated before producing a result")]
    RuntimeGone,
}
