//! # Realtime Store Trait
//!
//! Contract for the external store the bridge adapts. The store pushes
//! child/value changes through caller-registered listeners and accepts
//! path writes with optional completion callbacks.

use std::sync::Arc;

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::path::TreePath;

/// Opaque handle to a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Completion callback for writes and deletes
///
/// Fires exactly once with the outcome of the operation.
pub type WriteCompletion = Box<dyn FnOnce(StoreResult<()>) + Send>;

/// Callbacks for child-level changes under a reference path
///
/// The store invokes `on_initial` exactly once, synchronously, during
/// registration; every later mutation of a direct child produces one of
/// the other callbacks. `on_cancelled` is terminal: the store delivers
/// nothing after it.
pub trait ChildListener: Send + Sync {
    /// Full current children of the path, possibly empty
    fn on_initial(&self, children: &[(String, Value)]);

    /// A child appeared under the path
    fn on_child_added(&self, key: &str, value: &Value);

    /// An existing child's content changed
    fn on_child_changed(&self, key: &str, value: &Value);

    /// A child was deleted; `value` is its last content
    fn on_child_removed(&self, key: &str, value: &Value);

    /// The store terminated the listener
    fn on_cancelled(&self, error: StoreError);
}

/// Callbacks for changes to a single node
///
/// `on_value` fires once synchronously at registration with the current
/// content (`None` when the node is absent), then again on every change
/// of the node or anything beneath it.
pub trait ValueListener: Send + Sync {
    /// Current full content of the node, `None` when absent
    fn on_value(&self, value: Option<&Value>);

    /// The store terminated the listener
    fn on_cancelled(&self, error: StoreError);
}

/// A hierarchical store with push-based change notification
///
/// Listener registration and `detach` must be safe to call from any
/// thread; `detach` is idempotent. Completion callbacks fire exactly
/// once per operation.
pub trait RealtimeStore: Send + Sync {
    /// Register a child listener at `path`
    ///
    /// Delivers the initial snapshot before returning.
    fn listen_children(
        &self,
        path: &TreePath,
        listener: Arc<dyn ChildListener>,
    ) -> StoreResult<ListenerId>;

    /// Register a value listener at `path`
    ///
    /// Delivers the current value before returning.
    fn listen_value(
        &self,
        path: &TreePath,
        listener: Arc<dyn ValueListener>,
    ) -> StoreResult<ListenerId>;

    /// Deregister a listener; no-op if already detached
    fn detach(&self, id: ListenerId);

    /// Write the full content at `path`
    fn put(&self, path: &TreePath, value: Value, completion: Option<WriteCompletion>);

    /// Delete the node at `path`
    ///
    /// Deleting an absent node completes successfully.
    fn delete(&self, path: &TreePath, completion: Option<WriteCompletion>);

    /// Generate a fresh child identifier under `path`
    ///
    /// Distinct from every existing sibling and from every previous call.
    fn generate_id(&self, path: &TreePath) -> String;
}
