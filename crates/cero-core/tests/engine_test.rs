//! End-to-end tests for the task lifecycle engine

use cero_core::prelude::*;
use serde::Deserialize;
use serde_json::{json, Map, Value};

fn engine() -> Engine {
    Engine::new(Configuration::default())
}

fn trace(exec: &Execution, entry: &str) {
    let mut entries: Vec<String> = exec.context().get("trace").unwrap_or_default();
    entries.push(entry.to_string());
    exec.context().set("trace", entries);
}

// =============================================================================
// Minimal task
// =============================================================================

#[derive(Deserialize)]
struct Hello {}

#[async_trait]
impl Task for Hello {
    const NAME: &'static str = "hello";

    async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        exec.context().set("message", "Hello, World!");
        Ok(())
    }
}

#[tokio::test]
async fn test_minimal_task() {
    let result = engine().execute::<Hello>(json!({})).await;

    assert!(result.success());
    assert!(result.complete());
    assert_eq!(result.outcome(), Outcome::Good);
    assert_eq!(result.context_value("message"), Some(&json!("Hello, World!")));
}

#[tokio::test]
async fn test_every_invocation_yields_a_result() {
    let result = engine().execute::<Hello>(Value::Null).await;
    assert!(matches!(result.state, TaskState::Complete | TaskState::Interrupted));

    let statuses = [result.success(), result.skipped(), result.failed()];
    assert_eq!(statuses.iter().filter(|s| **s).count(), 1);
}

// =============================================================================
// Attribute validation
// =============================================================================

#[derive(Deserialize)]
struct Register {
    name: String,
}

#[async_trait]
impl Task for Register {
    const NAME: &'static str = "register";

    fn schema() -> Schema {
        Schema::new().attribute("name", required().rule("length", json!({"min": 1})))
    }

    async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        exec.context().set("registered", self.name.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_invalid_attribute_fails_without_work() {
    let result = engine().execute::<Register>(json!({"name": ""})).await;

    assert!(result.failed());
    assert_eq!(result.reason.as_deref(), Some("Invalid"));
    assert!(!result.context.contains_key("registered"));

    let messages = result
        .metadata_value("errors")
        .and_then(|e| e.get("messages"))
        .and_then(|m| m.get("name"))
        .and_then(Value::as_array)
        .expect("should carry validation messages");
    assert!(!messages.is_empty());
}

#[tokio::test]
async fn test_missing_required_attribute_still_produces_result() {
    let chain = Chain::new();
    let result = engine()
        .execute_with::<Register>(json!({}), ExecuteOptions::on_chain(chain.clone()))
        .await;

    assert!(result.failed());
    assert_eq!(chain.len(), 1);
}

// =============================================================================
// Defaults
// =============================================================================

#[derive(Deserialize)]
struct Shipment {
    country: String,
    attempt: i64,
}

#[async_trait]
impl Task for Shipment {
    const NAME: &'static str = "shipment";

    fn schema() -> Schema {
        Schema::new()
            .attribute("country", optional().default_value("US"))
            .attribute("attempt", optional().default_with(|| json!(1)))
    }

    async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        exec.context().set("country", self.country.clone());
        exec.context().set("attempt", self.attempt);
        Ok(())
    }
}

#[tokio::test]
async fn test_defaults_resolve_values_and_callables() {
    let result = engine().execute::<Shipment>(json!({})).await;

    assert!(result.success());
    assert_eq!(result.context_value("country"), Some(&json!("US")));
    assert_eq!(result.context_value("attempt"), Some(&json!(1)));
}

// =============================================================================
// Callback order and flow-control laws
// =============================================================================

#[derive(Deserialize)]
struct Doubler {
    value: i64,
}

impl Doubler {
    fn setup(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        exec.context().set("setup_called", true);
        Ok(())
    }

    fn record_success(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        exec.context().set("success_called", true);
        Ok(())
    }
}

#[async_trait]
impl Task for Doubler {
    const NAME: &'static str = "doubler";

    fn schema() -> Schema {
        Schema::new().attribute("value", required().kind(AttrKind::Integer))
    }

    fn settings() -> Settings<Self> {
        Settings::new()
            .before_execution(Self::setup)
            .on_success(Self::record_success)
    }

    async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        exec.context().set("doubled", self.value * 2);
        Ok(())
    }
}

#[tokio::test]
async fn test_callback_order() {
    let result = engine().execute::<Doubler>(json!({"value": 5})).await;

    assert!(result.success());
    assert_eq!(result.context_value("setup_called"), Some(&json!(true)));
    assert_eq!(result.context_value("doubled"), Some(&json!(10)));
    assert_eq!(result.context_value("success_called"), Some(&json!(true)));
}

#[derive(Deserialize)]
struct Faulty {
    mode: String,
}

impl Faulty {
    fn on_success_cb(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        trace(exec, "on_success");
        Ok(())
    }

    fn on_skipped_cb(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        trace(exec, "on_skipped");
        Ok(())
    }

    fn on_failed_cb(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        trace(exec, "on_failed");
        Ok(())
    }

    fn on_complete_cb(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        trace(exec, "on_complete");
        Ok(())
    }
}

#[async_trait]
impl Task for Faulty {
    const NAME: &'static str = "faulty";

    fn schema() -> Schema {
        Schema::new().attribute("mode", required())
    }

    fn settings() -> Settings<Self> {
        Settings::new()
            .on_success(Self::on_success_cb)
            .on_skipped(Self::on_skipped_cb)
            .on_failed(Self::on_failed_cb)
            .on_complete(Self::on_complete_cb)
    }

    async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        exec.context().set("touched", true);
        match self.mode.as_str() {
            "fail" => {
                let mut metadata = Map::new();
                metadata.insert("code".to_string(), json!(42));
                Err(fail_with("broken", metadata))
            }
            "skip" => Err(skip("not needed")),
            _ => Ok(()),
        }
    }
}

#[tokio::test]
async fn test_fail_law() {
    let result = engine().execute::<Faulty>(json!({"mode": "fail"})).await;

    assert!(result.failed());
    assert!(result.interrupted());
    assert_eq!(result.reason.as_deref(), Some("broken"));
    assert_eq!(result.metadata_value("code"), Some(&json!(42)));
    // Context mutations before the fault persist.
    assert_eq!(result.context_value("touched"), Some(&json!(true)));

    let ran: Vec<String> = serde_json::from_value(result.context["trace"].clone()).unwrap();
    assert_eq!(ran, ["on_failed", "on_complete"]);
}

#[tokio::test]
async fn test_skip_law() {
    let result = engine().execute::<Faulty>(json!({"mode": "skip"})).await;

    assert!(result.skipped());
    assert!(result.good());
    assert_eq!(result.reason.as_deref(), Some("not needed"));

    let ran: Vec<String> = serde_json::from_value(result.context["trace"].clone()).unwrap();
    assert_eq!(ran, ["on_skipped", "on_complete"]);
}

#[tokio::test]
async fn test_strict_raises_on_failure() {
    let err = engine()
        .execute_strict::<Faulty>(json!({"mode": "fail"}))
        .await
        .unwrap_err();
    assert_eq!(err.task_type, "faulty");
    assert_eq!(err.reason, "broken");
    assert!(err.result.failed());

    let ok = engine()
        .execute_strict::<Faulty>(json!({"mode": "skip"}))
        .await
        .unwrap();
    assert!(ok.skipped());
}

// =============================================================================
// Unexpected errors
// =============================================================================

#[derive(Deserialize)]
struct Explodes {}

#[async_trait]
impl Task for Explodes {
    const NAME: &'static str = "explodes";

    async fn work(&mut self, _exec: &mut Execution) -> Result<(), Fault> {
        Err(anyhow::anyhow!("disk on fire").into())
    }
}

#[tokio::test]
async fn test_unexpected_error_routes_to_handler() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let seen = Arc::new(AtomicUsize::new(0));
    let mut config = Configuration::default();
    let counter = seen.clone();
    config.set_exception_handler(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let result = Engine::new(config).execute::<Explodes>(json!({})).await;

    assert!(result.failed());
    assert_eq!(result.reason.as_deref(), Some("disk on fire"));
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    let exception = result.metadata_value("exception").expect("exception metadata");
    assert_eq!(exception["message"], json!("disk on fire"));
}

// =============================================================================
// Middleware
// =============================================================================

struct Record {
    label: &'static str,
}

#[async_trait]
impl Middleware for Record {
    async fn call(
        &self,
        task: &mut dyn cero_core::TaskHandle,
        exec: &mut Execution,
        _options: &Value,
        next: Next<'_>,
    ) -> Result<(), Fault> {
        trace(exec, &format!("{}:enter", self.label));
        let outcome = next.run(task, exec).await;
        trace(exec, &format!("{}:exit", self.label));
        outcome
    }
}

#[derive(Deserialize)]
struct Wrapped {}

#[async_trait]
impl Task for Wrapped {
    const NAME: &'static str = "wrapped";

    fn settings() -> Settings<Self> {
        Settings::new()
            .middleware(Record { label: "outer" })
            .middleware(Record { label: "inner" })
    }

    async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault> {
        trace(exec, "work");
        Ok(())
    }
}

#[tokio::test]
async fn test_middleware_onion_order() {
    let result = engine().execute::<Wrapped>(json!({})).await;
    assert!(result.success());

    let ran: Vec<String> = serde_json::from_value(result.context["trace"].clone()).unwrap();
    assert_eq!(
        ran,
        ["outer:enter", "inner:enter", "work", "inner:exit", "outer:exit"].map(String::from)
    );
}

#[tokio::test]
async fn test_global_middleware_wraps_task_middleware() {
    let mut config = Configuration::default();
    config.add_middleware(Record { label: "global" });

    let result = Engine::new(config).execute::<Wrapped>(json!({})).await;
    let ran: Vec<String> = serde_json::from_value(result.context["trace"].clone()).unwrap();
    assert_eq!(ran.first().map(String::as_str), Some("global:enter"));
    assert_eq!(ran.last().map(String::as_str), Some("global:exit"));
}

#[derive(Deserialize)]
struct Slow {}

#[async_trait]
impl Task for Slow {
    const NAME: &'static str = "slow";

    fn settings() -> Settings<Self> {
        Settings::new().middleware(TimeoutMiddleware::new(std::time::Duration::from_millis(50)))
    }

    async fn work(&mut self, _exec: &mut Execution) -> Result<(), Fault> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_middleware_fails_the_task() {
    let result = engine().execute::<Slow>(json!({})).await;

    assert!(result.failed());
    assert!(result.reason.as_deref().unwrap_or_default().contains("timed out"));
    assert_eq!(
        result.metadata_value("timeout"),
        Some(&json!({"limit_ms": 50}))
    );
}

// =============================================================================
// Middleware observes post-work callbacks
// =============================================================================

#[tokio::test]
async fn test_callbacks_run_inside_innermost_middleware() {
    #[derive(Deserialize)]
    struct Observed {}

    impl Observed {
        fn mark(&mut self, exec: &mut Execution) -> Result<(), Fault> {
            trace(exec, "on_complete");
            Ok(())
        }
    }

    #[async_trait]
    impl Task for Observed {
        const NAME: &'static str = "observed";

        fn settings() -> Settings<Self> {
            Settings::new()
                .middleware(Record { label: "mw" })
                .on_complete(Self::mark)
        }

        async fn work(&mut self, exec: &mut Execution) -> Result<(), Fault> {
            trace(exec, "work");
            Ok(())
        }
    }

    let result = engine().execute::<Observed>(json!({})).await;
    let ran: Vec<String> = serde_json::from_value(result.context["trace"].clone()).unwrap();
    assert_eq!(ran, ["mw:enter", "work", "on_complete", "mw:exit"].map(String::from));
}

// =============================================================================
// Chains and shared context
// =============================================================================

#[tokio::test]
async fn test_chain_shares_context_and_identity() {
    let chain = Chain::new();
    let engine = engine();

    engine
        .execute_with::<Hello>(json!({}), ExecuteOptions::on_chain(chain.clone()))
        .await;
    let second = engine
        .execute_with::<Doubler>(json!({"value": 2}), ExecuteOptions::on_chain(chain.clone()))
        .await;

    assert_eq!(second.chain_id, chain.id());
    assert_eq!(chain.len(), 2);
    let results = chain.results();
    assert_eq!(results[0].index, 0);
    assert_eq!(results[1].index, 1);
    assert_eq!(results[1].context_value("message"), Some(&json!("Hello, World!")));
}

// =============================================================================
// Global configuration surface
// =============================================================================

#[tokio::test]
async fn test_process_default_engine_runs_tasks() {
    let result = cero_core::execute::<Hello>(json!({})).await;
    assert!(result.success());
}
