//! Task chains
//!
//! A [`Chain`] correlates a connected run of tasks: one identity, one shared
//! [`Context`], the ordered log of finished [`TaskResult`]s, and the list of
//! successful tasks whose rollback hooks fire if the chain later fails.
//! Cloning a `Chain` clones the handle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::context::Context;
use crate::result::TaskResult;
use crate::task::TaskHandle;

/// Identity and aggregation of a connected task run
#[derive(Clone)]
pub struct Chain {
    inner: Arc<ChainInner>,
}

struct ChainInner {
    id: Uuid,
    context: Context,
    results: RwLock<Vec<TaskResult>>,
    rollback: Mutex<Vec<RollbackEntry>>,
    dispatched: AtomicUsize,
}

/// A successful task retained for potential rollback, in completion order
pub(crate) struct RollbackEntry {
    pub task_id: Uuid,
    pub task_type: String,
    pub index: usize,
    pub handle: Box<dyn TaskHandle>,
}

impl Chain {
    /// Create a fresh chain with an empty context
    pub fn new() -> Self {
        Self::with_context(Context::new())
    }

    /// Create a fresh chain around an existing context
    pub fn with_context(context: Context) -> Self {
        Self {
            inner: Arc::new(ChainInner {
                id: Uuid::now_v7(),
                context,
                results: RwLock::new(Vec::new()),
                rollback: Mutex::new(Vec::new()),
                dispatched: AtomicUsize::new(0),
            }),
        }
    }

    /// Chain identity
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The context shared by every task on this chain
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Finished results in commit order
    pub fn results(&self) -> Vec<TaskResult> {
        self.inner.results.read().clone()
    }

    /// Number of committed results
    pub fn len(&self) -> usize {
        self.inner.results.read().len()
    }

    /// Check whether any task has committed a result yet
    pub fn is_empty(&self) -> bool {
        self.inner.results.read().is_empty()
    }

    /// Claim the next dispatch position on this chain
    pub(crate) fn next_index(&self) -> usize {
        self.inner.dispatched.fetch_add(1, Ordering::SeqCst)
    }

    /// Commit a frozen result
    pub(crate) fn push_result(&self, result: TaskResult) {
        self.inner.results.write().push(result);
    }

    /// Register a successful task for potential rollback
    pub(crate) fn push_rollback(&self, entry: RollbackEntry) {
        self.inner.rollback.lock().push(entry);
    }

    /// Drain rollback candidates, newest first
    pub(crate) fn take_rollback(&self) -> Vec<RollbackEntry> {
        let mut entries = std::mem::take(&mut *self.inner.rollback.lock());
        entries.reverse();
        entries
    }

    /// Flag a committed result as rolled back
    pub(crate) fn mark_rolled_back(&self, task_id: Uuid) {
        let mut results = self.inner.results.write();
        if let Some(result) = results.iter_mut().find(|r| r.task_id == task_id) {
            result.rolled_back = true;
        }
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("id", &self.inner.id)
            .field("results", &self.len())
            .finish()
    }
}
