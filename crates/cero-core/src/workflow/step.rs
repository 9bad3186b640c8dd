//! Workflow step declarations
//!
//! A workflow declares a list of [`Step`]s: single tasks or groups with a
//! sequential or parallel strategy. Steps are type-erased so a pipeline can
//! mix task types; each entry binds its input from the shared context (keys
//! matching the task's attribute names) merged with explicit overrides.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::chain::Chain;
use crate::context::Context;
use crate::result::TaskResult;
use crate::task::{Engine, ExecuteOptions, Task};

/// Execution strategy for a step group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Run entries in declaration order
    Sequential,

    /// Launch all entries concurrently; the group completes when all
    /// children terminate
    Parallel,
}

type StepRunner =
    Arc<dyn Fn(Engine, Value, ExecuteOptions) -> BoxFuture<'static, TaskResult> + Send + Sync>;

/// One type-erased task entry in a pipeline
#[derive(Clone)]
pub struct StepTask {
    name: &'static str,
    attribute_names: Vec<String>,
    overrides: Map<String, Value>,
    runner: StepRunner,
}

/// Declare a pipeline entry for a task type
pub fn step<T: Task>() -> StepTask {
    StepTask {
        name: T::NAME,
        attribute_names: T::schema().names(),
        overrides: Map::new(),
        runner: Arc::new(|engine, input, options| {
            Box::pin(async move { engine.execute_with::<T>(input, options).await })
        }),
    }
}

impl StepTask {
    /// Task type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Merge explicit input overrides on top of the context-bound input
    pub fn input(mut self, overrides: Value) -> Self {
        if let Value::Object(map) = overrides {
            for (key, value) in map {
                self.overrides.insert(key, value);
            }
        }
        self
    }

    /// Execute this entry on a chain, binding input from its context
    pub async fn run_on(&self, engine: &Engine, chain: &Chain) -> TaskResult {
        let input = collect_input(&self.attribute_names, chain.context(), &self.overrides);
        (self.runner)(
            engine.clone(),
            input,
            ExecuteOptions::on_chain(chain.clone()),
        )
        .await
    }
}

impl std::fmt::Debug for StepTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepTask").field("name", &self.name).finish()
    }
}

/// One entry of a workflow pipeline
#[derive(Debug, Clone)]
pub enum Step {
    /// A single task
    Task(StepTask),

    /// A group of tasks with an execution strategy
    Group {
        tasks: Vec<StepTask>,
        strategy: Strategy,
    },
}

impl Step {
    /// A single-task step
    pub fn task<T: Task>() -> Self {
        Step::Task(step::<T>())
    }

    /// A single-task step with input overrides
    pub fn task_with<T: Task>(overrides: Value) -> Self {
        Step::Task(step::<T>().input(overrides))
    }

    /// A group with an explicit strategy
    pub fn group(tasks: Vec<StepTask>, strategy: Strategy) -> Self {
        Step::Group { tasks, strategy }
    }

    /// A parallel group
    pub fn parallel(tasks: Vec<StepTask>) -> Self {
        Self::group(tasks, Strategy::Parallel)
    }

    /// A sequential group
    pub fn sequential(tasks: Vec<StepTask>) -> Self {
        Self::group(tasks, Strategy::Sequential)
    }
}

/// Bind a step's input: context keys matching the attribute names, merged
/// with explicit overrides
pub(crate) fn collect_input(
    names: &[String],
    context: &Context,
    overrides: &Map<String, Value>,
) -> Value {
    let snapshot = context.snapshot();
    let mut input = Map::new();
    for name in names {
        if let Some(value) = snapshot.get(name) {
            input.insert(name.clone(), value.clone());
        }
    }
    for (key, value) in overrides {
        input.insert(key.clone(), value.clone());
    }
    Value::Object(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collect_input_filters_and_merges() {
        let context = Context::new();
        context.set("country", "US");
        context.set("weight", 3);
        context.set("unrelated", true);

        let names = vec!["country".to_string(), "weight".to_string()];
        let mut overrides = Map::new();
        overrides.insert("weight".to_string(), json!(9));

        let input = collect_input(&names, &context, &overrides);
        assert_eq!(input, json!({"country": "US", "weight": 9}));
    }
}
