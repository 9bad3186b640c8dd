//! Workflow pipeline executor
//!
//! A workflow is a task whose work drives its declared steps on the shared
//! chain. The blanket `Task` impl below is what makes workflows composable:
//! a workflow can appear as a step inside another workflow.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::attribute::Schema;
use crate::fault::{fail, skip, Fault};
use crate::result::TaskResult;
use crate::task::{Execution, Settings, Task};
use crate::workflow::step::{Step, Strategy};

/// A sequential pipeline of tasks with optional parallel groups
///
/// Workflows *are* tasks: they share the chain and context with their
/// children, bind their own attributes, and produce a [`TaskResult`] whose
/// `metadata.results` exposes the child results in order.
///
/// # Example
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct ShipOrder {}
///
/// impl Workflow for ShipOrder {
///     const NAME: &'static str = "ship_order";
///
///     fn steps(&self) -> Vec<Step> {
///         vec![
///             Step::task::<Validate>(),
///             Step::parallel(vec![step::<CreateLabel>(), step::<SchedulePickup>()]),
///         ]
///     }
/// }
/// ```
pub trait Workflow: DeserializeOwned + Send + 'static {
    /// Type name recorded on results and used in logs
    const NAME: &'static str;

    /// Declared input surface of the workflow itself
    fn schema() -> Schema {
        Schema::new()
    }

    /// Declarative callbacks and middleware for the workflow
    fn settings() -> Settings<Self> {
        Settings::new()
    }

    /// The pipeline, built after attribute binding
    fn steps(&self) -> Vec<Step>;
}

#[async_trait]
impl<W: Workflow> Task for W {
    const NAME: &'static str = <W as Workflow>::NAME;

    fn schema() -> Schema {
        <W as Workflow>::schema()
    }

    fn settings() -> Settings<Self> {
        <W as Workflow>::settings()
    }

    async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        let steps = self.steps();
        run_steps(steps, exec).await
    }
}

/// Drive a pipeline on the workflow's chain
///
/// After each step (or parallel group barrier) the configured breakpoints
/// are consulted; a halt derives the workflow's own status with failed
/// dominating skipped.
pub(crate) async fn run_steps(steps: Vec<Step>, exec: &mut Execution) -> Result<(), Fault> {
    let engine = exec.engine().clone();
    let chain = exec.chain().clone();
    let breakpoints = engine.config().task_breakpoints.clone();

    let mut children: Vec<TaskResult> = Vec::new();
    let mut halted = false;

    for step in &steps {
        let batch = match step {
            Step::Task(task) => vec![task.run_on(&engine, &chain).await],
            Step::Group {
                tasks,
                strategy: Strategy::Sequential,
            } => {
                let mut results = Vec::with_capacity(tasks.len());
                for task in tasks {
                    results.push(task.run_on(&engine, &chain).await);
                }
                results
            }
            Step::Group {
                tasks,
                strategy: Strategy::Parallel,
            } => {
                futures::future::join_all(tasks.iter().map(|task| task.run_on(&engine, &chain)))
                    .await
            }
        };

        let stop = batch.iter().any(|r| breakpoints.contains(&r.status));
        children.extend(batch);

        if stop {
            debug!(chain = %chain.id(), "workflow halted at breakpoint");
            halted = true;
            break;
        }
    }

    exec.set_metadata("results", serde_json::to_value(&children)?);

    if halted {
        // Failed dominates skipped when a group produced both.
        if let Some(failed) = children.iter().rev().find(|r| r.failed()) {
            let reason = failed
                .reason
                .clone()
                .unwrap_or_else(|| format!("{} failed", failed.task_type));
            return Err(fail(reason));
        }
        if let Some(skipped) = children.iter().rev().find(|r| r.skipped()) {
            let reason = skipped
                .reason
                .clone()
                .unwrap_or_else(|| format!("{} skipped", skipped.task_type));
            return Err(skip(reason));
        }
    }

    Ok(())
}
