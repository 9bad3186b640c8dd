//! Durable workflow trait
//!
//! A durable workflow is a deterministic state machine whose `run` body may
//! only reach the outside world through the [`WorkflowCtx`] primitives —
//! pipeline steps, conditions, sleeps — and whose state mutations arrive
//! through registered signal handlers. Given the same event log, `run`
//! must make the same decisions; that is what makes replay after a crash
//! sound.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use cero_core::Fault;

use crate::error::DurableError;
use crate::handle::WorkflowHandle;
use crate::runtime::{launch, RuntimeConfig, WorkflowCtx};
use crate::signal::{QueryRouter, SignalRouter};
use crate::store::WorkflowStore;

/// A durable, replayable workflow
///
/// # Determinism
///
/// `run` must not read wall-clock time, randomness or external state
/// directly. Time goes through [`WorkflowCtx::sleep`] and
/// [`WorkflowCtx::condition_timeout`]; external input goes through
/// signals; side effects go through pipeline steps.
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct OrderApproval {
///     approved: bool,
/// }
///
/// #[async_trait]
/// impl DurableWorkflow for OrderApproval {
///     const TYPE: &'static str = "order_approval";
///     type Input = OrderInput;
///
///     fn new(_input: OrderInput) -> Self {
///         Self { approved: false }
///     }
///
///     fn signals() -> SignalRouter<Self> {
///         SignalRouter::new().on(&APPROVE, |wf, args: Approval| {
///             wf.approved = args.approved;
///         })
///     }
///
///     async fn run(ctx: WorkflowCtx<Self>) -> Result<Value, Fault> {
///         ctx.step::<ReserveStock>().await?;
///         if !ctx.condition_timeout(|wf| wf.approved, "30m").await? {
///             return Err(fail("approval timed out"));
///         }
///         ctx.step::<ChargeCard>().await?;
///         Ok(json!({"status": "shipped"}))
///     }
/// }
/// ```
#[async_trait]
pub trait DurableWorkflow: Serialize + DeserializeOwned + Send + 'static {
    /// Unique type identifier, used by the recovery registry
    const TYPE: &'static str;

    /// Input type for starting the workflow
    type Input: Serialize + DeserializeOwned + Send;

    /// Create the initial workflow state from input
    ///
    /// Called both when starting fresh and when replaying without a
    /// checkpoint.
    fn new(input: Self::Input) -> Self;

    /// Signal handlers for this workflow type
    fn signals() -> SignalRouter<Self>
    where
        Self: Sized,
    {
        SignalRouter::new()
    }

    /// Query handlers for this workflow type
    fn queries() -> QueryRouter<Self>
    where
        Self: Sized,
    {
        QueryRouter::new()
    }

    /// The workflow body
    async fn run(ctx: WorkflowCtx<Self>) -> Result<Value, Fault>
    where
        Self: Sized;

    /// Start a new instance under a caller-chosen id
    ///
    /// Appends `workflow.started` and returns a handle that outlives this
    /// call; the workflow itself runs on the runtime's own task.
    async fn start(
        workflow_id: &str,
        input: Self::Input,
        store: Arc<dyn WorkflowStore>,
    ) -> Result<WorkflowHandle<Self>, DurableError>
    where
        Self: Sized,
    {
        launch::<Self>(workflow_id.to_string(), input, store, RuntimeConfig::default()).await
    }

    /// [`DurableWorkflow::start`] with an explicit runtime configuration
    async fn start_with(
        workflow_id: &str,
        input: Self::Input,
        store: Arc<dyn WorkflowStore>,
        config: RuntimeConfig,
    ) -> Result<WorkflowHandle<Self>, DurableError>
    where
        Self: Sized,
    {
        launch::<Self>(workflow_id.to_string(), input, store, config).await
    }
}
