//! Workflow handles
//!
//! A handle is the caller's end of the mailbox: it multiplexes signals,
//! queries, cancellation and result retrieval onto the workflow's
//! single-threaded runtime. [`WorkflowHandle`] is typed;
//! [`RecoveredHandle`] is the type-erased variant returned by recovery.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use cero_core::TaskResult;

use crate::error::DurableError;
use crate::runtime::{deliver_signal, dispatch_query, Shared};
use crate::signal::{QueryDefinition, SignalDefinition};
use crate::workflow::DurableWorkflow;

/// Typed handle to one durable workflow instance
pub struct WorkflowHandle<W: DurableWorkflow> {
    shared: Arc<Shared<W>>,
    result_rx: watch::Receiver<Option<TaskResult>>,
}

impl<W: DurableWorkflow> Clone for WorkflowHandle<W> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            result_rx: self.result_rx.clone(),
        }
    }
}

impl<W: DurableWorkflow> WorkflowHandle<W> {
    pub(crate) fn new(shared: Arc<Shared<W>>) -> Self {
        let result_rx = shared.result_tx.subscribe();
        Self { shared, result_rx }
    }

    /// The caller-chosen workflow id
    pub fn workflow_id(&self) -> &str {
        &self.shared.workflow_id
    }

    /// Deliver a signal
    ///
    /// Appends exactly one `signal.received` event, invokes the matching
    /// handler, then evaluates pending condition predicates — serially per
    /// workflow.
    pub async fn signal<A: Serialize>(
        &self,
        definition: &SignalDefinition<A>,
        args: A,
    ) -> Result<(), DurableError> {
        self.signal_raw(definition.name(), serde_json::to_value(args)?)
            .await
    }

    /// Deliver a signal by name with a raw JSON payload
    pub async fn signal_raw(&self, name: &str, args: Value) -> Result<(), DurableError> {
        deliver_signal(&self.shared, name, args).await
    }

    /// Read live workflow state through a registered query handler
    ///
    /// Queries never mutate state and are not logged.
    pub async fn query<R: DeserializeOwned, A: Serialize>(
        &self,
        definition: &QueryDefinition<R, A>,
        args: A,
    ) -> Result<R, DurableError> {
        let value = self
            .query_raw(definition.name(), serde_json::to_value(args)?)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Read live workflow state by query name with a raw JSON payload
    pub async fn query_raw(&self, name: &str, args: Value) -> Result<Value, DurableError> {
        dispatch_query(&self.shared, name, args).await
    }

    /// Await the workflow's terminal result
    pub async fn result(&self) -> Result<TaskResult, DurableError> {
        let mut rx = self.result_rx.clone();
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return Ok(result);
            }
            rx.changed().await.map_err(|_| DurableError::RuntimeGone)?;
        }
    }

    /// Check whether the workflow reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.result_rx.borrow().is_some()
    }

    /// Request cancellation
    ///
    /// The workflow observes a failure fault at its next suspension point.
    pub async fn cancel(&self) -> Result<(), DurableError> {
        self.shared.cancel.cancel();
        Ok(())
    }
}

impl<W: DurableWorkflow> std::fmt::Debug for WorkflowHandle<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHandle")
            .field("workflow_id", &self.workflow_id())
            .field("workflow_type", &W::TYPE)
            .finish()
    }
}

/// Object-safe handle interface backing [`RecoveredHandle`]
#[async_trait]
trait RawHandle: Send + Sync {
    fn raw_workflow_id(&self) -> &str;
    async fn raw_signal(&self, name: &str, args: Value) -> Result<(), DurableError>;
    async fn raw_query(&self, name: &str, args: Value) -> Result<Value, DurableError>;
    async fn raw_result(&self) -> Result<TaskResult, DurableError>;
    async fn raw_cancel(&self) -> Result<(), DurableError>;
}

#[async_trait]
impl<W: DurableWorkflow> RawHandle for WorkflowHandle<W> {
    fn raw_workflow_id(&self) -> &str {
        self.workflow_id()
    }

    async fn raw_signal(&self, name: &str, args: Value) -> Result<(), DurableError> {
        self.signal_raw(name, args).await
    }

    async fn raw_query(&self, name: &str, args: Value) -> Result<Value, DurableError> {
        self.query_raw(name, args).await
    }

    async fn raw_result(&self) -> Result<TaskResult, DurableError> {
        self.result().await
    }

    async fn raw_cancel(&self) -> Result<(), DurableError> {
        self.cancel().await
    }
}

/// Type-erased handle to a recovered workflow
///
/// Recovery reconstructs workflows from stored type names, so their
/// concrete types are not known to the caller; signals and queries go by
/// name (typed definitions still work through [`RecoveredHandle::signal`]).
pub struct RecoveredHandle {
    workflow_type: String,
    raw: Arc<dyn RawHandle>,
}

impl RecoveredHandle {
    pub(crate) fn from_typed<W: DurableWorkflow>(handle: WorkflowHandle<W>) -> Self {
        Self {
            workflow_type: W::TYPE.to_string(),
            raw: Arc::new(handle),
        }
    }

    pub fn workflow_id(&self) -> &str {
        self.raw.raw_workflow_id()
    }

    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    /// Deliver a signal through a typed definition
    pub async fn signal<A: Serialize>(
        &self,
        definition: &SignalDefinition<A>,
        args: A,
    ) -> Result<(), DurableError> {
        self.raw
            .raw_signal(definition.name(), serde_json::to_value(args)?)
            .await
    }

    /// Deliver a signal by name
    pub async fn signal_raw(&self, name: &str, args: Value) -> Result<(), DurableError> {
        self.raw.raw_signal(name, args).await
    }

    /// Query through a typed definition
    pub async fn query<R: DeserializeOwned, A: Serialize>(
        &self,
        definition: &QueryDefinition<R, A>,
        args: A,
    ) -> Result<R, DurableError> {
        let value = self
            .raw
            .raw_query(definition.name(), serde_json::to_value(args)?)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Query by name
    pub async fn query_raw(&self, name: &str, args: Value) -> Result<Value, DurableError> {
        self.raw.raw_query(name, args).await
    }

    /// Await the workflow's terminal result
    pub async fn result(&self) -> Result<TaskResult, DurableError> {
        self.raw.raw_result().await
    }

    /// Request cancellation
    pub async fn cancel(&self) -> Result<(), DurableError> {
        self.raw.raw_cancel().await
    }
}

impl std::fmt::Debug for RecoveredHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveredHandle")
            .field("workflow_id", &self.workflow_id())
            .field("workflow_type", &self.workflow_type)
            .finish()
    }
}
