//! Middleware chain
//!
//! Middleware wrap a task's work in onion order: the outermost registered
//! entry runs first on the way in and last on the way out. The innermost
//! frame of every chain is the engine's work dispatch, which also runs the
//! post-work callbacks so middleware can observe them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::TimeoutError;
use crate::fault::Fault;
use crate::task::definition::TaskHandle;
use crate::task::engine::{dispatch_innermost, Execution};

/// A wrapper around task execution
///
/// Implementations decide whether and how to call `next`; not calling it
/// short-circuits the chain. The task's current [`Execution`] carries the
/// result under construction, so middleware can inspect classification
/// after `next` returns.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn call(
        &self,
        task: &mut dyn TaskHandle,
        exec: &mut Execution,
        options: &Value,
        next: Next<'_>,
    ) -> Result<(), Fault>;
}

/// A middleware plus the options bag it was registered with
#[derive(Clone)]
pub struct MiddlewareBinding {
    pub middleware: Arc<dyn Middleware>,
    pub options: Value,
}

impl MiddlewareBinding {
    pub fn new<M: Middleware>(middleware: M, options: Value) -> Self {
        Self {
            middleware: Arc::new(middleware),
            options,
        }
    }
}

impl std::fmt::Debug for MiddlewareBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareBinding")
            .field("options", &self.options)
            .finish()
    }
}

/// The remaining chain below the current middleware
pub struct Next<'a> {
    chain: &'a [MiddlewareBinding],
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [MiddlewareBinding]) -> Self {
        Self { chain }
    }

    /// Run the rest of the chain down to the work dispatch
    pub fn run<'b>(
        self,
        task: &'b mut dyn TaskHandle,
        exec: &'b mut Execution,
    ) -> BoxFuture<'b, Result<(), Fault>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            match self.chain.split_first() {
                Some((binding, rest)) => {
                    binding
                        .middleware
                        .call(task, exec, &binding.options, Next { chain: rest })
                        .await
                }
                None => dispatch_innermost(task, exec).await,
            }
        })
    }
}

/// Races the rest of the chain against a time limit
///
/// On expiry the in-flight work is dropped and the task fails with a
/// [`TimeoutError`] carrying the limit. A `limit_ms` entry in the binding
/// options overrides the constructor limit, so one instance can be
/// registered globally and tuned per task.
pub struct TimeoutMiddleware {
    limit: Duration,
}

impl TimeoutMiddleware {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl Middleware for TimeoutMiddleware {
    async fn call(
        &self,
        task: &mut dyn TaskHandle,
        exec: &mut Execution,
        options: &Value,
        next: Next<'_>,
    ) -> Result<(), Fault> {
        let limit = options
            .get("limit_ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(self.limit);

        match tokio::time::timeout(limit, next.run(task, exec)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Fault::Error(anyhow::Error::new(TimeoutError { limit }))),
        }
    }
}
