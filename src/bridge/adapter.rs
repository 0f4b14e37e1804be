//! # Reactive Bridge
//!
//! Adapts a `RealtimeStore`'s listener-based API into stream-emitting
//! feeds and completion-acknowledged writes, without leaking store
//! types into the domain layer. The bridge is explicitly constructed
//! around a store client; there is no process-wide handle.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::observability::Logger;
use crate::store::{RealtimeStore, StoreResult, TreePath, WriteCompletion};

use super::config::BridgeConfig;
use super::errors::{BridgeError, BridgeResult, FeedError};
use super::feed::{FeedShared, ListFeed, ValueFeed, WriteAck};
use super::relay::{ListRelay, ValueRelay};
use super::storable::Storable;

/// Reactive bridge over a realtime store
pub struct ReactiveBridge<S> {
    store: Arc<S>,
    config: BridgeConfig,
}

impl<S> ReactiveBridge<S>
where
    S: RealtimeStore + 'static,
{
    /// Create a bridge with the default configuration
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, BridgeConfig::default())
    }

    /// Create a bridge with an explicit configuration
    pub fn with_config(store: Arc<S>, config: BridgeConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store client
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Subscribe to the full list of children under `path`
    ///
    /// Emits one full snapshot immediately (empty list when the path
    /// has no children), then a full snapshot after every child
    /// add/change/remove. `key_selector` extracts the stable key used
    /// to locate which element a change refers to; it is never exposed
    /// to the subscriber. `on_error` fires at most once, with the
    /// store's native error on listener failure or a decode failure
    /// under `DecodePolicy::FailFeed`; either terminates the feed.
    pub fn subscribe_to_list<T, K, E>(
        &self,
        path: &str,
        key_selector: K,
        on_error: E,
    ) -> BridgeResult<ListFeed<T>>
    where
        T: Storable + Clone,
        K: Fn(&T) -> String + Send + Sync + 'static,
        E: FnMut(FeedError) + Send + 'static,
    {
        let path = TreePath::parse(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(FeedShared::new());

        let relay = Arc::new(ListRelay::new(
            tx,
            Arc::clone(&shared),
            key_selector,
            Box::new(on_error),
            self.config.decode_policy,
            path.to_string(),
        ));

        // Registration delivers the initial snapshot before returning
        let listener = self.store.listen_children(&path, relay)?;
        Logger::trace(
            "FEED_ATTACHED",
            &[("kind", "list"), ("path", path.as_str())],
        );

        Ok(ListFeed::new(
            rx,
            shared,
            self.dyn_store(),
            listener,
            path.to_string(),
        ))
    }

    /// Subscribe to the single record at `path`
    ///
    /// Emits the decoded record on every change of the node, `None` as
    /// the absence marker when the node is missing or deleted. Same
    /// single-listener, at-most-one-error, no-retry contract as
    /// [`subscribe_to_list`](Self::subscribe_to_list).
    pub fn subscribe_to_value<T, E>(&self, path: &str, on_error: E) -> BridgeResult<ValueFeed<T>>
    where
        T: Storable,
        E: FnMut(FeedError) + Send + 'static,
    {
        let path = TreePath::parse(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(FeedShared::new());

        let relay = Arc::new(ValueRelay::new(
            tx,
            Arc::clone(&shared),
            Box::new(on_error),
            self.config.decode_policy,
            path.to_string(),
        ));

        let listener = self.store.listen_value(&path, relay)?;
        Logger::trace(
            "FEED_ATTACHED",
            &[("kind", "value"), ("path", path.as_str())],
        );

        Ok(ValueFeed::new(
            rx,
            shared,
            self.dyn_store(),
            listener,
            path.to_string(),
        ))
    }

    /// Insert `value` under a freshly generated id at `path`
    ///
    /// Fire-and-forget: the record's identity is rebound to the new id
    /// and written at `path/<id>`; a store failure is logged, never
    /// surfaced to the caller.
    pub fn insert<T: Storable>(&self, path: &str, value: T) -> BridgeResult<()> {
        let path = TreePath::parse(path)?;
        let (child, payload) = self.prepare_insert(&path, value)?;
        self.store
            .put(&child, payload, Some(logging_completion("insert", &child)));
        Ok(())
    }

    /// Insert with a completion signal carrying the generated id
    pub fn insert_acked<T: Storable>(&self, path: &str, value: T) -> BridgeResult<WriteAck<String>> {
        let path = TreePath::parse(path)?;
        let id = self.store.generate_id(&path);
        let child = path.join(&id)?;
        let payload = encode(value.with_id(&id))?;

        let (ack_tx, ack) = WriteAck::channel();
        self.store.put(
            &child,
            payload,
            Some(Box::new(move |result: StoreResult<()>| {
                let _ = ack_tx.send(result.map(|()| id));
            })),
        );
        Ok(ack)
    }

    /// Overwrite the record at `path/child_id`
    ///
    /// Fire-and-forget; sibling nodes are unaffected. `child_id` must
    /// be non-empty.
    pub fn update<T: Storable>(&self, path: &str, child_id: &str, value: T) -> BridgeResult<()> {
        let child = self.child_path(path, child_id)?;
        let payload = encode(value)?;
        self.store
            .put(&child, payload, Some(logging_completion("update", &child)));
        Ok(())
    }

    /// Overwrite with a completion signal
    pub fn update_acked<T: Storable>(
        &self,
        path: &str,
        child_id: &str,
        value: T,
    ) -> BridgeResult<WriteAck> {
        let child = self.child_path(path, child_id)?;
        let payload = encode(value)?;

        let (ack_tx, ack) = WriteAck::channel();
        self.store.put(
            &child,
            payload,
            Some(Box::new(move |result: StoreResult<()>| {
                let _ = ack_tx.send(result);
            })),
        );
        Ok(ack)
    }

    /// Delete the node at `path/child_id`
    ///
    /// Fire-and-forget; `child_id` must be non-empty.
    pub fn remove_child(&self, path: &str, child_id: &str) -> BridgeResult<()> {
        let child = self.child_path(path, child_id)?;
        self.store
            .delete(&child, Some(logging_completion("remove_child", &child)));
        Ok(())
    }

    /// Delete the node at `path/child_id` with a completion signal
    pub fn remove_child_acked(&self, path: &str, child_id: &str) -> BridgeResult<WriteAck> {
        let child = self.child_path(path, child_id)?;

        let (ack_tx, ack) = WriteAck::channel();
        self.store.delete(
            &child,
            Some(Box::new(move |result: StoreResult<()>| {
                let _ = ack_tx.send(result);
            })),
        );
        Ok(ack)
    }

    /// Delete the node at `path`, with a single completion signal
    ///
    /// Deleting an absent node resolves successfully (idempotent
    /// delete).
    pub fn reactive_remove(&self, path: &str) -> BridgeResult<WriteAck> {
        let path = TreePath::parse(path)?;

        let (ack_tx, ack) = WriteAck::channel();
        self.store.delete(
            &path,
            Some(Box::new(move |result: StoreResult<()>| {
                let _ = ack_tx.send(result);
            })),
        );
        Ok(ack)
    }

    fn prepare_insert<T: Storable>(
        &self,
        path: &TreePath,
        value: T,
    ) -> BridgeResult<(TreePath, serde_json::Value)> {
        let id = self.store.generate_id(path);
        let child = path.join(&id)?;
        let payload = encode(value.with_id(&id))?;
        Ok((child, payload))
    }

    fn child_path(&self, path: &str, child_id: &str) -> BridgeResult<TreePath> {
        if child_id.is_empty() {
            return Err(BridgeError::EmptyChildId);
        }
        let path = TreePath::parse(path)?;
        Ok(path.join(child_id)?)
    }

    fn dyn_store(&self) -> Arc<dyn RealtimeStore> {
        Arc::clone(&self.store) as Arc<dyn RealtimeStore>
    }
}

fn encode<T: Storable>(value: T) -> BridgeResult<serde_json::Value> {
    serde_json::to_value(&value).map_err(|e| BridgeError::Internal(e.to_string()))
}

/// Completion for fire-and-forget writes: failures are logged, success
/// is silent
fn logging_completion(op: &'static str, path: &TreePath) -> WriteCompletion {
    let path = path.to_string();
    Box::new(move |result: StoreResult<()>| {
        if let Err(error) = result {
            Logger::error(
                "WRITE_FAILED",
                &[("op", op), ("path", &path), ("error", &error.to_string())],
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct SampleContent {
        #[serde(default)]
        id: String,
        content: String,
    }

    impl Storable for SampleContent {
        fn id(&self) -> &str {
            &self.id
        }

        fn with_id(self, id: &str) -> Self {
            Self {
                id: id.to_string(),
                ..self
            }
        }
    }

    fn sample(content: &str) -> SampleContent {
        SampleContent {
            id: String::new(),
            content: content.to_string(),
        }
    }

    fn bridge() -> ReactiveBridge<MemoryStore> {
        ReactiveBridge::new(Arc::new(MemoryStore::new()))
    }

    fn tree_path(s: &str) -> TreePath {
        TreePath::parse(s).unwrap()
    }

    #[test]
    fn test_insert_assigns_fresh_id() {
        let bridge = bridge();
        bridge.insert("sample_content", sample("A")).unwrap();
        bridge.insert("sample_content", sample("B")).unwrap();

        let children = bridge.store().children(&tree_path("sample_content"));
        assert_eq!(children.len(), 2);
        for (key, value) in &children {
            // Stored record carries its assigned id
            assert_eq!(value["id"], key.as_str());
        }
    }

    #[test]
    fn test_insert_acked_resolves_with_id() {
        let bridge = bridge();
        let ack = bridge.insert_acked("sample_content", sample("A")).unwrap();
        let id = ack.wait().unwrap();

        let child = tree_path("sample_content").join(&id).unwrap();
        assert!(bridge.store().get(&child).is_some());
    }

    #[test]
    fn test_update_overwrites_exactly_one_child() {
        let bridge = bridge();
        bridge
            .update("sample_content", "id1", sample("A").with_id("id1"))
            .unwrap();
        bridge
            .update("sample_content", "id2", sample("B").with_id("id2"))
            .unwrap();

        bridge
            .update("sample_content", "id1", sample("A2").with_id("id1"))
            .unwrap();

        let store = bridge.store();
        assert_eq!(
            store.get(&tree_path("sample_content/id1")).unwrap()["content"],
            "A2"
        );
        assert_eq!(
            store.get(&tree_path("sample_content/id2")).unwrap()["content"],
            "B"
        );
    }

    #[test]
    fn test_update_rejects_empty_child_id() {
        let bridge = bridge();
        let result = bridge.update("sample_content", "", sample("A"));
        assert!(matches!(result, Err(BridgeError::EmptyChildId)));

        let result = bridge.remove_child("sample_content", "");
        assert!(matches!(result, Err(BridgeError::EmptyChildId)));
    }

    #[test]
    fn test_remove_child_deletes_node() {
        let bridge = bridge();
        bridge
            .update("sample_content", "id1", sample("A").with_id("id1"))
            .unwrap();

        bridge.remove_child("sample_content", "id1").unwrap();
        assert!(bridge.store().get(&tree_path("sample_content/id1")).is_none());
    }

    #[test]
    fn test_reactive_remove_absent_path_resolves_ok() {
        let bridge = bridge();
        let ack = bridge.reactive_remove("sample_content/ghost").unwrap();
        assert!(ack.wait().is_ok());
    }

    #[test]
    fn test_acked_write_surfaces_store_failure() {
        let bridge = bridge();
        bridge
            .store()
            .fail_next_write(StoreError::Unavailable("maintenance".to_string()));

        let ack = bridge
            .update_acked("sample_content", "id1", sample("A").with_id("id1"))
            .unwrap();
        assert!(matches!(
            ack.wait(),
            Err(BridgeError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[test]
    fn test_invalid_path_rejected_synchronously() {
        let bridge = bridge();
        assert!(bridge.insert("", sample("A")).is_err());
        assert!(bridge.reactive_remove("a//b").is_err());
    }
}
