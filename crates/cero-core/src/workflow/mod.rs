//! Workflow pipelines: step declarations and the executor

mod executor;
mod step;

pub use executor::Workflow;
pub use step::{step, Step, StepTask, Strategy};
