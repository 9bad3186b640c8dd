//! # Cero Durable
//!
//! Event-sourced durable execution on top of `cero-core`.
//!
//! ## Features
//!
//! - **Event-sourced workflows**: every observable step appends to a
//!   gap-free, per-workflow event log before it happens
//! - **Checkpoints**: snapshots on suspension, every N steps, and at
//!   termination, so replay starts strictly after the last checkpoint
//! - **Deterministic replay**: recorded steps reapply their result and
//!   context delta without re-executing; recorded signals re-invoke their
//!   handlers; pending waiters resume live
//! - **Signals & queries**: typed, branded definitions with serial,
//!   atomic delivery per workflow
//! - **Conditions & sleeps**: predicate waiters with optional timeouts
//!   and durable timers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowHandle                         │
//! │     (signal / query / cancel / result, outlives caller)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Workflow runtime                        │
//! │  (driver task + WorkflowCtx primitives + replay cursor)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowStore                          │
//! │        (events, checkpoints, active list; in-memory         │
//! │              implementation ships for tests)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use cero_durable::prelude::*;
//!
//! let store = Arc::new(InMemoryWorkflowStore::new());
//! let handle = OrderApproval::start("order-42", input, store.clone()).await?;
//!
//! handle.signal(&APPROVE, Approval { approved: true }).await?;
//! let result = handle.result().await?;
//! assert!(result.success());
//! ```

pub mod checkpoint;
pub mod duration;
pub mod error;
pub mod event;
pub mod handle;
pub mod recovery;
pub mod runtime;
pub mod signal;
pub mod store;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::duration::{parse_duration, DurationSpec};
    pub use crate::error::DurableError;
    pub use crate::event::{EventRecord, WorkflowEvent, WorkflowId};
    pub use crate::handle::{RecoveredHandle, WorkflowHandle};
    pub use crate::recovery::{WorkflowRecovery, WorkflowRegistry};
    pub use crate::runtime::{RuntimeConfig, WorkflowCtx};
    pub use crate::signal::{
        define_query, define_signal, QueryDefinition, QueryRouter, SignalDefinition, SignalRouter,
    };
    pub use crate::store::{ActiveWorkflowInfo, InMemoryWorkflowStore, StoreError, WorkflowStore};
    pub use crate::workflow::DurableWorkflow;
    pub use async_trait::async_trait;
    pub use cero_core::{fail, skip, Fault, TaskResult};
}

// Re-export key types at crate root
pub use checkpoint::{
    CompletedStep, PendingCondition, PendingSleep, ResolvedCondition, WorkflowCheckpoint,
};
pub use duration::{parse_duration, DurationError, DurationSpec};
pub use error::DurableError;
pub use event::{EventRecord, WorkflowEvent, WorkflowId};
pub use handle::{RecoveredHandle, WorkflowHandle};
pub use recovery::{WorkflowRecovery, WorkflowRegistry};
pub use runtime::{RuntimeConfig, WorkflowCtx};
pub use signal::{
    define_query, define_signal, QueryDefinition, QueryRouter, SignalDefinition, SignalRouter,
};
pub use store::{ActiveWorkflowInfo, InMemoryWorkflowStore, StoreError, WorkflowStore};
pub use workflow::DurableWorkflow;
