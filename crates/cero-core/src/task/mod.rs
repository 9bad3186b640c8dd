//! Task lifecycle: definitions, middleware and the engine

mod definition;
mod engine;
mod middleware;

pub use definition::{Callback, Settings, Stage, Task, TaskHandle};
pub use engine::{Engine, ExecuteOptions, Execution, StrictFailure};
pub use middleware::{Middleware, MiddlewareBinding, Next, TimeoutMiddleware};
