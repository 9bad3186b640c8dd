//! Signal and query definitions
//!
//! [`define_signal`] and [`define_query`] produce branded, zero-cost
//! definitions: the payload and return types ride in the type parameters,
//! so a handle can only be signalled with arguments the workflow's router
//! actually accepts. Routers bind names to concrete handler functions at
//! type registration, in the manner of a workflow registry.

use std::collections::HashMap;
use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::DurableError;

/// A branded signal definition
///
/// `A` is the argument type delivered to the handler.
#[derive(Debug, Clone, Copy)]
pub struct SignalDefinition<A> {
    name: &'static str,
    _args: PhantomData<fn(A)>,
}

impl<A> SignalDefinition<A> {
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Define a signal carrying arguments of type `A`
///
/// ```
/// use cero_durable::define_signal;
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Approval { approved: bool }
///
/// const APPROVE: cero_durable::SignalDefinition<Approval> = define_signal("approve");
/// assert_eq!(APPROVE.name(), "approve");
/// ```
pub const fn define_signal<A>(name: &'static str) -> SignalDefinition<A> {
    SignalDefinition {
        name,
        _args: PhantomData,
    }
}

/// A branded query definition
///
/// `R` is the return type, `A` the argument type.
#[derive(Debug, Clone, Copy)]
pub struct QueryDefinition<R, A = ()> {
    name: &'static str,
    _marker: PhantomData<fn(A) -> R>,
}

impl<R, A> QueryDefinition<R, A> {
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Define a query returning `R` for arguments of type `A`
pub const fn define_query<R, A>(name: &'static str) -> QueryDefinition<R, A> {
    QueryDefinition {
        name,
        _marker: PhantomData,
    }
}

type SignalHandler<W> = Box<dyn Fn(&mut W, Value) -> Result<(), DurableError> + Send + Sync>;

/// Name-keyed signal handlers for one workflow type
///
/// Handlers mutate workflow state deterministically; they must not touch
/// the outside world, because replay re-invokes them from the event log.
pub struct SignalRouter<W> {
    handlers: HashMap<&'static str, SignalHandler<W>>,
}

impl<W: 'static> Default for SignalRouter<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: 'static> SignalRouter<W> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Bind a handler function to a signal definition
    pub fn on<A: DeserializeOwned + 'static>(
        mut self,
        definition: &SignalDefinition<A>,
        handler: fn(&mut W, A),
    ) -> Self {
        self.handlers.insert(
            definition.name(),
            Box::new(move |state, args| {
                let args: A = serde_json::from_value(args)?;
                handler(state, args);
                Ok(())
            }),
        );
        self
    }

    /// Check whether a handler is bound under this name
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub(crate) fn dispatch(
        &self,
        state: &mut W,
        name: &str,
        args: Value,
    ) -> Result<(), DurableError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| DurableError::UnknownSignal(name.to_string()))?;
        handler(state, args)
    }
}

type QueryHandler<W> = Box<dyn Fn(&W, Value) -> Result<Value, DurableError> + Send + Sync>;

/// Name-keyed query handlers for one workflow type
///
/// Queries are synchronous reads of live state; they are never logged and
/// must not mutate anything.
pub struct QueryRouter<W> {
    handlers: HashMap<&'static str, QueryHandler<W>>,
}

impl<W: 'static> Default for QueryRouter<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: 'static> QueryRouter<W> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Bind a handler function to a query definition
    pub fn on<R: Serialize + 'static, A: DeserializeOwned + 'static>(
        mut self,
        definition: &QueryDefinition<R, A>,
        handler: fn(&W, A) -> R,
    ) -> Self {
        self.handlers.insert(
            definition.name(),
            Box::new(move |state, args| {
                let args: A = serde_json::from_value(args)?;
                Ok(serde_json::to_value(handler(state, args))?)
            }),
        );
        self
    }

    /// Check whether a handler is bound under this name
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub(crate) fn dispatch(&self, state: &W, name: &str, args: Value) -> Result<Value, DurableError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| DurableError::UnknownQuery(name.to_string()))?;
        handler(state, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    struct Order {
        approved: bool,
        status: String,
    }

    #[derive(Serialize, Deserialize)]
    struct Approval {
        approved: bool,
    }

    const APPROVE: SignalDefinition<Approval> = define_signal("approve");
    const STATUS: QueryDefinition<String, ()> = define_query("status");

    #[test]
    fn test_signal_dispatch() {
        let router = SignalRouter::new().on(&APPROVE, |order: &mut Order, args: Approval| {
            order.approved = args.approved;
            order.status = "approved".to_string();
        });

        let mut order = Order {
            approved: false,
            status: "pending".to_string(),
        };

        assert!(router.contains("approve"));
        router
            .dispatch(&mut order, "approve", json!({"approved": true}))
            .unwrap();
        assert!(order.approved);
        assert_eq!(order.status, "approved");
    }

    #[test]
    fn test_unknown_signal() {
        let router: SignalRouter<Order> = SignalRouter::new();
        let mut order = Order {
            approved: false,
            status: String::new(),
        };

        let result = router.dispatch(&mut order, "approve", json!({}));
        assert!(matches!(result, Err(DurableError::UnknownSignal(_))));
    }

    #[test]
    fn test_bad_signal_payload() {
        let router = SignalRouter::new().on(&APPROVE, |_: &mut Order, _: Approval| {});
        let mut order = Order {
            approved: false,
            status: String::new(),
        };

        let result = router.dispatch(&mut order, "approve", json!("not an object"));
        assert!(matches!(result, Err(DurableError::Serialization(_))));
    }

    #[test]
    fn test_query_dispatch() {
        let router = QueryRouter::new().on(&STATUS, |order: &Order, _: ()| order.status.clone());

        let order = Order {
            approved: true,
            status: "approved".to_string(),
        };

        let value = router.dispatch(&order, "status", json!(null)).unwrap();
        assert_eq!(value, json!("approved"));

        let result = router.dispatch(&order, "missing", json!(null));
        assert!(matches!(result, Err(DurableError::UnknownQuery(_))));
    }
}
