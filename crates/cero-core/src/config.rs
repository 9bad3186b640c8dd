//! Process-wide configuration
//!
//! A [`Configuration`] holds the global middleware list, stage observers,
//! the coercion and validator registries, breakpoint/rollback policy and
//! the exception handler. [`configure`] mutates the process default;
//! [`Engine`](crate::Engine) values snapshot it (or are built from an
//! explicit `Configuration`) so the plumbing stays visible.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::error;

use crate::attribute::{builtin_coercions, builtin_validators, Coercer, Validator};
use crate::error::CoercionError;
use crate::result::TaskStatus;
use crate::task::{Execution, Middleware, MiddlewareBinding, Stage};

/// Global observer invoked at every lifecycle stage of every task
pub type StageObserver = Arc<dyn Fn(Stage, &mut Execution) + Send + Sync>;

/// Sink for unexpected errors raised inside work, callbacks or rollback
pub type ExceptionHandler = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Engine policy and registries
#[derive(Clone)]
pub struct Configuration {
    pub(crate) middlewares: Vec<MiddlewareBinding>,
    pub(crate) observers: Vec<(Stage, StageObserver)>,
    pub(crate) coercions: HashMap<String, Coercer>,
    pub(crate) validators: HashMap<String, Validator>,

    /// Result statuses that halt an enclosing workflow
    pub task_breakpoints: Vec<TaskStatus>,

    /// Result statuses that trigger chain rollback
    pub rollback_on: Vec<TaskStatus>,

    pub(crate) exception_handler: ExceptionHandler,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            middlewares: Vec::new(),
            observers: Vec::new(),
            coercions: builtin_coercions(),
            validators: builtin_validators(),
            task_breakpoints: vec![TaskStatus::Failed],
            rollback_on: vec![TaskStatus::Failed],
            exception_handler: Arc::new(|e| {
                error!(error = %e, "unhandled task exception");
            }),
        }
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a global middleware; global middleware wrap task-scoped ones
    pub fn add_middleware<M: Middleware>(&mut self, middleware: M) {
        self.add_middleware_with(middleware, Value::Null);
    }

    /// Append a global middleware with an options bag
    pub fn add_middleware_with<M: Middleware>(&mut self, middleware: M, options: Value) {
        self.middlewares.push(MiddlewareBinding::new(middleware, options));
    }

    /// Register an observer for one lifecycle stage of every task
    pub fn add_callback(
        &mut self,
        stage: Stage,
        observer: impl Fn(&mut Execution) + Send + Sync + 'static,
    ) {
        self.observers
            .push((stage, Arc::new(move |_, exec| observer(exec))));
    }

    /// Register or replace a coercion under a type name
    pub fn register_coercion(
        &mut self,
        name: impl Into<String>,
        coercer: impl Fn(&str, &Value) -> Result<Value, CoercionError> + Send + Sync + 'static,
    ) {
        self.coercions.insert(name.into(), Arc::new(coercer));
    }

    /// Remove a coercion
    pub fn deregister_coercion(&mut self, name: &str) {
        self.coercions.remove(name);
    }

    /// Register or replace a validation rule under a name
    pub fn register_validator(&mut self, name: impl Into<String>, validator: Validator) {
        self.validators.insert(name.into(), validator);
    }

    /// Remove a validation rule
    pub fn deregister_validator(&mut self, name: &str) {
        self.validators.remove(name);
    }

    /// Replace the exception handler
    pub fn set_exception_handler(
        &mut self,
        handler: impl Fn(&anyhow::Error) + Send + Sync + 'static,
    ) {
        self.exception_handler = Arc::new(handler);
    }

    pub(crate) fn coercions(&self) -> &HashMap<String, Coercer> {
        &self.coercions
    }

    pub(crate) fn validators(&self) -> &HashMap<String, Validator> {
        &self.validators
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("middlewares", &self.middlewares.len())
            .field("observers", &self.observers.len())
            .field("coercions", &self.coercions.keys().collect::<Vec<_>>())
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .field("task_breakpoints", &self.task_breakpoints)
            .field("rollback_on", &self.rollback_on)
            .finish()
    }
}

fn global() -> &'static RwLock<Configuration> {
    static GLOBAL: OnceLock<RwLock<Configuration>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Configuration::default()))
}

/// Mutate the process-default configuration
///
/// Engines built afterwards with `Engine::default()` pick up the change;
/// existing engines keep their snapshot.
pub fn configure(f: impl FnOnce(&mut Configuration)) {
    f(&mut global().write());
}

/// Snapshot the process-default configuration
pub fn configuration() -> Configuration {
    global().read().clone()
}

/// Restore the process-default configuration to built-ins
pub fn reset_configuration() {
    *global().write() = Configuration::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Configuration::default();
        assert_eq!(config.task_breakpoints, vec![TaskStatus::Failed]);
        assert_eq!(config.rollback_on, vec![TaskStatus::Failed]);
        assert!(config.coercions.contains_key("integer"));
        assert!(config.validators.contains_key("length"));
    }

    #[test]
    fn test_registry_mutation() {
        let mut config = Configuration::default();
        config.register_coercion("upper", |_, v| {
            Ok(Value::String(v.as_str().unwrap_or_default().to_uppercase()))
        });
        assert!(config.coercions.contains_key("upper"));

        config.deregister_coercion("upper");
        assert!(!config.coercions.contains_key("upper"));

        config.deregister_validator("format");
        assert!(!config.validators.contains_key("format"));
    }
}
