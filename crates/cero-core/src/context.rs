//! Shared execution context
//!
//! A [`Context`] is a string-keyed map of JSON values created once per chain
//! and shared by every task that runs on that chain. Cloning a `Context`
//! clones the handle, not the data.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// Mutable key/value state shared across a task chain.
///
/// Values are stored as JSON so that tasks with different concrete types can
/// interoperate; typed access goes through [`Context::get`]/[`Context::set`]
/// or a [`ContextView`].
///
/// The map is not serialized across suspension points by the core engine;
/// the durable runtime snapshots it into checkpoints and step events.
///
/// # Example
///
/// ```
/// use cero_core::Context;
///
/// let ctx = Context::new();
/// ctx.set("message", "Hello, World!");
/// assert_eq!(ctx.get::<String>("message").as_deref(), Some("Hello, World!"));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    values: Arc<RwLock<Map<String, Value>>>,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded from a JSON object
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }

    /// Read a value, deserializing it into `T`
    ///
    /// Returns `None` when the key is absent or the value does not
    /// deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let values = self.values.read();
        values
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Read the raw JSON value for a key
    pub fn raw(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Write a value under a key, replacing any previous value
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.values.write().insert(key.into(), value);
    }

    /// Remove a key, returning its previous value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    /// Check whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Merge a JSON object into the context
    ///
    /// `null` entries remove the key; this is the inverse of the delta
    /// format produced by [`Context::delta_since`].
    pub fn merge(&self, patch: &Map<String, Value>) {
        let mut values = self.values.write();
        for (key, value) in patch {
            if value.is_null() {
                values.remove(key);
            } else {
                values.insert(key.clone(), value.clone());
            }
        }
    }

    /// Number of keys in the context
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Check whether the context is empty
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Deep copy of the current contents
    pub fn snapshot(&self) -> Map<String, Value> {
        self.values.read().clone()
    }

    /// Compute the changes relative to an earlier snapshot
    ///
    /// Added and changed keys carry their new value; removed keys map to
    /// `null`. Applying the result with [`Context::merge`] on top of the
    /// earlier snapshot reproduces the current contents.
    pub fn delta_since(&self, earlier: &Map<String, Value>) -> Map<String, Value> {
        let current = self.values.read();
        let mut delta = Map::new();
        for (key, value) in current.iter() {
            if earlier.get(key) != Some(value) {
                delta.insert(key.clone(), value.clone());
            }
        }
        for key in earlier.keys() {
            if !current.contains_key(key) {
                delta.insert(key.clone(), Value::Null);
            }
        }
        delta
    }

    /// Typed facade over the whole map
    pub fn view<T: Serialize + DeserializeOwned>(&self) -> ContextView<T> {
        ContextView {
            context: self.clone(),
            _marker: PhantomData,
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("len", &self.len())
            .finish()
    }
}

/// Typed view of a [`Context`]
///
/// Reads deserialize the whole map into `T`; writes serialize `T` back into
/// the map, merging over existing keys. Consumers get field-level types
/// without losing interoperability with string-keyed access.
pub struct ContextView<T> {
    context: Context,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> ContextView<T> {
    /// Materialize the context as `T`
    pub fn load(&self) -> Option<T> {
        serde_json::from_value(Value::Object(self.context.snapshot())).ok()
    }

    /// Serialize `value` into the context, merging over existing keys
    pub fn store(&self, value: &T) {
        if let Ok(Value::Object(map)) = serde_json::to_value(value) {
            self.context.merge(&map);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[test]
    fn test_set_and_get() {
        let ctx = Context::new();
        ctx.set("count", 3);
        ctx.set("name", "order-7");

        assert_eq!(ctx.get::<i64>("count"), Some(3));
        assert_eq!(ctx.get::<String>("name").as_deref(), Some("order-7"));
        assert_eq!(ctx.get::<i64>("missing"), None);
    }

    #[test]
    fn test_shared_handle() {
        let ctx = Context::new();
        let other = ctx.clone();

        other.set("written", true);
        assert_eq!(ctx.get::<bool>("written"), Some(true));
    }

    #[test]
    fn test_merge_removes_null_keys() {
        let ctx = Context::new();
        ctx.set("keep", 1);
        ctx.set("drop", 2);

        let mut patch = Map::new();
        patch.insert("drop".to_string(), Value::Null);
        patch.insert("added".to_string(), Value::from(3));
        ctx.merge(&patch);

        assert!(ctx.contains("keep"));
        assert!(!ctx.contains("drop"));
        assert_eq!(ctx.get::<i64>("added"), Some(3));
    }

    #[test]
    fn test_delta_round_trip() {
        let ctx = Context::new();
        ctx.set("a", 1);
        ctx.set("b", 2);
        let before = ctx.snapshot();

        ctx.set("b", 20);
        ctx.set("c", 3);
        ctx.remove("a");

        let delta = ctx.delta_since(&before);
        let replay = Context::from_map(before);
        replay.merge(&delta);

        assert_eq!(replay.snapshot(), ctx.snapshot());
    }

    #[derive(Serialize, Deserialize)]
    struct Shipping {
        country: String,
        express: bool,
    }

    #[test]
    fn test_typed_view() {
        let ctx = Context::new();
        ctx.set("country", "US");
        ctx.set("express", false);

        let view = ctx.view::<Shipping>();
        let shipping = view.load().expect("should load");
        assert_eq!(shipping.country, "US");

        view.store(&Shipping {
            country: "DE".to_string(),
            express: true,
        });
        assert_eq!(ctx.get::<String>("country").as_deref(), Some("DE"));
        assert_eq!(ctx.get::<bool>("express"), Some(true));
    }
}
