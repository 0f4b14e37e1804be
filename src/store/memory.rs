//! # In-Memory Store
//!
//! A `RealtimeStore` backed by an in-process JSON tree. Every mutation
//! notifies affected listeners before the mutating call returns, so
//! consumers observe emissions deterministically. Serves as the
//! reference backend and as the test double for the bridge.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use uuid::Uuid;

use super::backend::{
    ChildListener, ListenerId, RealtimeStore, ValueListener, WriteCompletion,
};
use super::errors::{StoreError, StoreResult};
use super::path::TreePath;

enum Registered {
    Child(Arc<dyn ChildListener>),
    Value(Arc<dyn ValueListener>),
}

struct Registration {
    path: TreePath,
    listener: Registered,
    /// False until the initial delivery has completed; diff
    /// notifications are withheld until then
    ready: bool,
}

/// One pending notification, collected under lock and dispatched after
enum Notification {
    ChildAdded(Arc<dyn ChildListener>, String, Value),
    ChildChanged(Arc<dyn ChildListener>, String, Value),
    ChildRemoved(Arc<dyn ChildListener>, String, Value),
    ValueChanged(Arc<dyn ValueListener>, Option<Value>),
}

/// In-memory realtime store
///
/// The tree root is a JSON object; nodes are addressed by `TreePath`.
/// Children of a node are the entries of its object, in key order.
pub struct MemoryStore {
    tree: Mutex<Value>,
    listeners: Mutex<HashMap<u64, Registration>>,
    next_listener: AtomicU64,
    /// Injected failure for the next write/delete, test hook
    write_fault: Mutex<Option<StoreError>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(Value::Object(Map::new())),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            write_fault: Mutex::new(None),
        }
    }

    /// Current content at `path`, if any
    pub fn get(&self, path: &TreePath) -> Option<Value> {
        self.tree
            .lock()
            .ok()
            .and_then(|tree| node_at(&tree, path).cloned())
    }

    /// Direct children of `path`, in key order
    pub fn children(&self, path: &TreePath) -> Vec<(String, Value)> {
        self.tree
            .lock()
            .map(|tree| children_of(node_at(&tree, path)))
            .unwrap_or_default()
    }

    /// Fail the next write or delete with `error` instead of applying it
    ///
    /// Test hook for exercising write-failure paths; the injected error
    /// is consumed by the next `put` or `delete` call.
    pub fn fail_next_write(&self, error: StoreError) {
        if let Ok(mut fault) = self.write_fault.lock() {
            *fault = Some(error);
        }
    }

    /// Force-cancel every listener registered at exactly `path`
    ///
    /// Test hook simulating a store-side listener failure (permission
    /// revocation, disconnect). Cancelled listeners are deregistered.
    pub fn cancel_listeners(&self, path: &TreePath, error: StoreError) {
        let cancelled: Vec<Registration> = {
            let Ok(mut listeners) = self.listeners.lock() else {
                return;
            };
            let ids: Vec<u64> = listeners
                .iter()
                .filter(|(_, reg)| reg.path == *path)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| listeners.remove(&id))
                .collect()
        };

        for reg in cancelled {
            match reg.listener {
                Registered::Child(l) => l.on_cancelled(error.clone()),
                Registered::Value(l) => l.on_cancelled(error.clone()),
            }
        }
    }

    /// Number of live listener registrations
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Insert a registration and snapshot its node in one critical
    /// section, so no write can land between the two.
    fn register(&self, path: &TreePath, listener: Registered) -> StoreResult<(u64, Option<Value>)> {
        let Ok(mut listeners) = self.listeners.lock() else {
            return Err(StoreError::Internal("listener registry poisoned".to_string()));
        };
        let Ok(tree) = self.tree.lock() else {
            return Err(StoreError::Internal("tree lock poisoned".to_string()));
        };

        let current = node_at(&tree, path).cloned();
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        listeners.insert(
            id,
            Registration {
                path: path.clone(),
                listener,
                ready: false,
            },
        );
        Ok((id, current))
    }

    /// Mark `id` ready and deliver whatever changed under its path
    /// while the initial snapshot was being delivered outside the locks
    fn catch_up_children(
        &self,
        id: u64,
        delivered: &[(String, Value)],
        listener: &Arc<dyn ChildListener>,
    ) {
        let pending = {
            let Ok(mut listeners) = self.listeners.lock() else {
                return;
            };
            let Ok(tree) = self.tree.lock() else {
                return;
            };
            // Gone already: cancelled or detached before activation
            let Some(reg) = listeners.get_mut(&id) else {
                return;
            };
            reg.ready = true;

            let now = node_at(&tree, &reg.path).cloned();
            let before = Value::Object(delivered.iter().cloned().collect());
            let mut pending = Vec::new();
            diff_children(listener, Some(&before), now.as_ref(), &mut pending);
            pending
        };
        dispatch_all(pending);
    }

    /// Value-listener counterpart of `catch_up_children`
    fn catch_up_value(
        &self,
        id: u64,
        delivered: Option<&Value>,
        listener: &Arc<dyn ValueListener>,
    ) {
        let update = {
            let Ok(mut listeners) = self.listeners.lock() else {
                return;
            };
            let Ok(tree) = self.tree.lock() else {
                return;
            };
            let Some(reg) = listeners.get_mut(&id) else {
                return;
            };
            reg.ready = true;

            let now = node_at(&tree, &reg.path).cloned();
            if now.as_ref() != delivered {
                Some(now)
            } else {
                None
            }
        };
        if let Some(now) = update {
            listener.on_value(now.as_ref());
        }
    }

    /// Apply `mutate` to the tree and notify affected listeners.
    ///
    /// Before/after snapshots are taken per registration while both locks
    /// are held; callbacks run after both locks are released, so a
    /// callback may re-enter the store without deadlocking.
    fn mutate_and_notify<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Value),
    {
        let pending: Vec<Notification> = {
            let Ok(listeners) = self.listeners.lock() else {
                return;
            };
            let Ok(mut tree) = self.tree.lock() else {
                return;
            };

            let before: Vec<(u64, Option<Value>)> = listeners
                .iter()
                .filter(|(_, reg)| reg.ready)
                .map(|(id, reg)| (*id, node_at(&tree, &reg.path).cloned()))
                .collect();

            mutate(&mut tree);

            let mut pending = Vec::new();
            for (id, old) in before {
                let reg = match listeners.get(&id) {
                    Some(reg) => reg,
                    None => continue,
                };
                let new = node_at(&tree, &reg.path).cloned();
                match &reg.listener {
                    Registered::Child(l) => {
                        diff_children(l, old.as_ref(), new.as_ref(), &mut pending);
                    }
                    Registered::Value(l) => {
                        if old != new {
                            pending.push(Notification::ValueChanged(Arc::clone(l), new));
                        }
                    }
                }
            }
            pending
        };

        dispatch_all(pending);
    }

    fn take_write_fault(&self) -> Option<StoreError> {
        self.write_fault.lock().ok().and_then(|mut fault| fault.take())
    }
}

impl RealtimeStore for MemoryStore {
    fn listen_children(
        &self,
        path: &TreePath,
        listener: Arc<dyn ChildListener>,
    ) -> StoreResult<ListenerId> {
        let (id, node) = self.register(path, Registered::Child(Arc::clone(&listener)))?;
        let initial = children_of(node.as_ref());
        listener.on_initial(&initial);
        self.catch_up_children(id, &initial, &listener);
        Ok(ListenerId(id))
    }

    fn listen_value(
        &self,
        path: &TreePath,
        listener: Arc<dyn ValueListener>,
    ) -> StoreResult<ListenerId> {
        let (id, current) = self.register(path, Registered::Value(Arc::clone(&listener)))?;
        listener.on_value(current.as_ref());
        self.catch_up_value(id, current.as_ref(), &listener);
        Ok(ListenerId(id))
    }

    fn detach(&self, id: ListenerId) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(&id.0);
        }
    }

    fn put(&self, path: &TreePath, value: Value, completion: Option<WriteCompletion>) {
        if let Some(error) = self.take_write_fault() {
            if let Some(complete) = completion {
                complete(Err(error));
            }
            return;
        }

        self.mutate_and_notify(|tree| set_at(tree, path, value));

        if let Some(complete) = completion {
            complete(Ok(()));
        }
    }

    fn delete(&self, path: &TreePath, completion: Option<WriteCompletion>) {
        if let Some(error) = self.take_write_fault() {
            if let Some(complete) = completion {
                complete(Err(error));
            }
            return;
        }

        self.mutate_and_notify(|tree| remove_at(tree, path));

        // Idempotent: deleting an absent node still completes successfully
        if let Some(complete) = completion {
            complete(Ok(()));
        }
    }

    fn generate_id(&self, _path: &TreePath) -> String {
        Uuid::new_v4().to_string()
    }
}

fn dispatch_all(pending: Vec<Notification>) {
    for notification in pending {
        match notification {
            Notification::ChildAdded(l, key, value) => l.on_child_added(&key, &value),
            Notification::ChildChanged(l, key, value) => l.on_child_changed(&key, &value),
            Notification::ChildRemoved(l, key, value) => l.on_child_removed(&key, &value),
            Notification::ValueChanged(l, value) => l.on_value(value.as_ref()),
        }
    }
}

/// Resolve the node addressed by `path`, if present
fn node_at<'a>(tree: &'a Value, path: &TreePath) -> Option<&'a Value> {
    let mut node = tree;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

/// Direct children of an optional node, in key order
fn children_of(node: Option<&Value>) -> Vec<(String, Value)> {
    node.and_then(Value::as_object)
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

/// Write `value` at `path`, materializing intermediate objects
fn set_at(tree: &mut Value, path: &TreePath, value: Value) {
    let segments: Vec<&str> = path.segments().collect();
    let mut node = tree;

    for segment in &segments[..segments.len() - 1] {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Some(obj) = node.as_object_mut() else {
            return;
        };
        node = obj
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Some(obj) = node.as_object_mut() {
        obj.insert(segments[segments.len() - 1].to_string(), value);
    }
}

/// Remove the node at `path` and prune ancestors left empty
fn remove_at(tree: &mut Value, path: &TreePath) {
    let segments: Vec<&str> = path.segments().collect();
    remove_rec(tree, &segments);
}

fn remove_rec(node: &mut Value, segments: &[&str]) {
    let Some(obj) = node.as_object_mut() else {
        return;
    };

    if segments.len() == 1 {
        obj.remove(segments[0]);
        return;
    }

    if let Some(child) = obj.get_mut(segments[0]) {
        remove_rec(child, &segments[1..]);
        let empty = child.as_object().map(Map::is_empty).unwrap_or(false);
        if empty {
            obj.remove(segments[0]);
        }
    }
}

/// Emit per-child notifications for the difference between two node states
fn diff_children(
    listener: &Arc<dyn ChildListener>,
    old: Option<&Value>,
    new: Option<&Value>,
    pending: &mut Vec<Notification>,
) {
    let old_children: Map<String, Value> = old
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let new_children: Map<String, Value> = new
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    for (key, value) in &new_children {
        match old_children.get(key) {
            None => pending.push(Notification::ChildAdded(
                Arc::clone(listener),
                key.clone(),
                value.clone(),
            )),
            Some(previous) if previous != value => pending.push(Notification::ChildChanged(
                Arc::clone(listener),
                key.clone(),
                value.clone(),
            )),
            Some(_) => {}
        }
    }

    for (key, value) in &old_children {
        if !new_children.contains_key(key) {
            pending.push(Notification::ChildRemoved(
                Arc::clone(listener),
                key.clone(),
                value.clone(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn path(s: &str) -> TreePath {
        TreePath::parse(s).unwrap()
    }

    #[derive(Default)]
    struct RecordingChildListener {
        events: StdMutex<Vec<String>>,
        initial_keys: StdMutex<Vec<String>>,
    }

    impl ChildListener for RecordingChildListener {
        fn on_initial(&self, children: &[(String, Value)]) {
            self.events
                .lock()
                .unwrap()
                .push(format!("initial:{}", children.len()));
            *self.initial_keys.lock().unwrap() =
                children.iter().map(|(k, _)| k.clone()).collect();
        }

        fn on_child_added(&self, key: &str, _value: &Value) {
            self.events.lock().unwrap().push(format!("added:{}", key));
        }

        fn on_child_changed(&self, key: &str, _value: &Value) {
            self.events.lock().unwrap().push(format!("changed:{}", key));
        }

        fn on_child_removed(&self, key: &str, _value: &Value) {
            self.events.lock().unwrap().push(format!("removed:{}", key));
        }

        fn on_cancelled(&self, error: StoreError) {
            self.events
                .lock()
                .unwrap()
                .push(format!("cancelled:{}", error));
        }
    }

    impl RecordingChildListener {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn initial_keys(&self) -> Vec<String> {
            self.initial_keys.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_put_and_get() {
        let store = MemoryStore::new();
        store.put(&path("posts/p1"), json!({"title": "Hello"}), None);

        let value = store.get(&path("posts/p1")).unwrap();
        assert_eq!(value["title"], "Hello");
    }

    #[test]
    fn test_children_in_key_order() {
        let store = MemoryStore::new();
        store.put(&path("posts/zz"), json!({"n": 1}), None);
        store.put(&path("posts/aa"), json!({"n": 2}), None);

        let keys: Vec<String> = store
            .children(&path("posts"))
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["aa", "zz"]);
    }

    #[test]
    fn test_delete_prunes_empty_parents() {
        let store = MemoryStore::new();
        store.put(&path("a/b/c"), json!(1), None);
        store.delete(&path("a/b/c"), None);

        assert!(store.get(&path("a/b")).is_none());
        assert!(store.get(&path("a")).is_none());
    }

    #[test]
    fn test_delete_absent_completes_ok() {
        let store = MemoryStore::new();
        let outcome = Arc::new(StdMutex::new(None));

        let slot = Arc::clone(&outcome);
        store.delete(
            &path("missing"),
            Some(Box::new(move |result| {
                *slot.lock().unwrap() = Some(result.is_ok());
            })),
        );

        // MemoryStore completes synchronously
        assert_eq!(*outcome.lock().unwrap(), Some(true));
    }

    #[test]
    fn test_child_listener_initial_then_diff() {
        let store = MemoryStore::new();
        store.put(&path("posts/p1"), json!({"n": 1}), None);

        let listener = Arc::new(RecordingChildListener::default());
        store
            .listen_children(&path("posts"), listener.clone())
            .unwrap();

        store.put(&path("posts/p2"), json!({"n": 2}), None);
        store.put(&path("posts/p1"), json!({"n": 9}), None);
        store.delete(&path("posts/p2"), None);

        assert_eq!(
            listener.events(),
            vec!["initial:1", "added:p2", "changed:p1", "removed:p2"]
        );
    }

    #[test]
    fn test_deeper_mutation_is_child_changed() {
        let store = MemoryStore::new();
        store.put(&path("posts/p1"), json!({"meta": {"likes": 0}}), None);

        let listener = Arc::new(RecordingChildListener::default());
        store
            .listen_children(&path("posts"), listener.clone())
            .unwrap();

        store.put(&path("posts/p1/meta/likes"), json!(1), None);

        assert_eq!(listener.events(), vec!["initial:1", "changed:p1"]);
    }

    #[test]
    fn test_identical_put_emits_nothing() {
        let store = MemoryStore::new();
        store.put(&path("posts/p1"), json!({"n": 1}), None);

        let listener = Arc::new(RecordingChildListener::default());
        store
            .listen_children(&path("posts"), listener.clone())
            .unwrap();

        store.put(&path("posts/p1"), json!({"n": 1}), None);

        assert_eq!(listener.events(), vec!["initial:1"]);
    }

    #[test]
    fn test_detach_stops_notifications() {
        let store = MemoryStore::new();
        let listener = Arc::new(RecordingChildListener::default());
        let id = store
            .listen_children(&path("posts"), listener.clone())
            .unwrap();

        store.detach(id);
        store.detach(id); // idempotent
        store.put(&path("posts/p1"), json!(1), None);

        assert_eq!(listener.events(), vec!["initial:0"]);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_cancel_listeners_is_terminal() {
        let store = MemoryStore::new();
        let listener = Arc::new(RecordingChildListener::default());
        store
            .listen_children(&path("posts"), listener.clone())
            .unwrap();

        store.cancel_listeners(&path("posts"), StoreError::Disconnected);
        store.put(&path("posts/p1"), json!(1), None);

        assert_eq!(
            listener.events(),
            vec!["initial:0", "cancelled:Disconnected from store"]
        );
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_fail_next_write_reports_error_and_skips_mutation() {
        let store = MemoryStore::new();
        store.fail_next_write(StoreError::Unavailable("maintenance".to_string()));

        let failed = Arc::new(StdMutex::new(false));
        let flag = Arc::clone(&failed);
        store.put(
            &path("posts/p1"),
            json!(1),
            Some(Box::new(move |result| {
                *flag.lock().unwrap() = result.is_err();
            })),
        );

        assert!(*failed.lock().unwrap());
        assert!(store.get(&path("posts/p1")).is_none());

        // Fault is consumed: next write succeeds
        store.put(&path("posts/p1"), json!(1), None);
        assert!(store.get(&path("posts/p1")).is_some());
    }

    #[test]
    fn test_registration_concurrent_with_writes_misses_nothing() {
        use std::thread;

        // Each key must reach the listener exactly once, via the
        // initial snapshot or a later added event, regardless of how
        // the writes interleave with registration.
        for _ in 0..100 {
            let store = Arc::new(MemoryStore::new());
            let writer = {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..4 {
                        store.put(&path(&format!("posts/k{}", i)), json!({"n": i}), None);
                    }
                })
            };

            let listener = Arc::new(RecordingChildListener::default());
            store
                .listen_children(&path("posts"), listener.clone())
                .unwrap();
            writer.join().unwrap();

            let mut delivered = listener.initial_keys();
            for event in listener.events() {
                if let Some(key) = event.strip_prefix("added:") {
                    delivered.push(key.to_string());
                }
            }
            delivered.sort();
            assert_eq!(delivered, vec!["k0", "k1", "k2", "k3"]);
        }
    }

    #[test]
    fn test_generate_id_unique() {
        let store = MemoryStore::new();
        let p = path("posts");
        let a = store.generate_id(&p);
        let b = store.generate_id(&p);
        assert_ne!(a, b);
    }
}
