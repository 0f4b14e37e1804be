//! # Listener Relays
//!
//! The callback-to-stream adapters. A relay implements a store listener
//! trait, holds the feed's current state, applies the decode policy,
//! and forwards full snapshots into the feed's channel. Every send
//! runs under the shared `FeedShared` state lock, which is what makes
//! cancellation synchronous: once the handle has flipped the state,
//! no send passes.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::observability::Logger;
use crate::store::{ChildListener, StoreError, ValueListener};

use super::config::DecodePolicy;
use super::errors::FeedError;
use super::feed::FeedShared;
use super::storable::Storable;

/// Caller-supplied feed error handler, invoked at most once
pub(crate) type ErrorHandler = Box<dyn FnMut(FeedError) + Send>;

/// Relay for list feeds: maintains the current decoded list and emits a
/// full snapshot after every change
pub(crate) struct ListRelay<T, K> {
    items: Mutex<Vec<T>>,
    tx: UnboundedSender<Vec<T>>,
    shared: Arc<FeedShared>,
    key_selector: K,
    on_error: Mutex<Option<ErrorHandler>>,
    policy: DecodePolicy,
    path: String,
}

impl<T, K> ListRelay<T, K>
where
    T: Storable + Clone,
    K: Fn(&T) -> String + Send + Sync,
{
    pub(crate) fn new(
        tx: UnboundedSender<Vec<T>>,
        shared: Arc<FeedShared>,
        key_selector: K,
        on_error: ErrorHandler,
        policy: DecodePolicy,
        path: String,
    ) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            tx,
            shared,
            key_selector,
            on_error: Mutex::new(Some(on_error)),
            policy,
            path,
        }
    }

    fn emit(&self) {
        let Ok(items) = self.items.lock() else {
            return;
        };
        self.shared.guard_send(|| {
            let _ = self.tx.send(items.clone());
        });
    }

    /// Decode one child per the configured policy
    fn decode(&self, key: &str, value: &Value) -> Option<T> {
        match serde_json::from_value(value.clone()) {
            Ok(decoded) => Some(decoded),
            Err(source) => {
                match self.policy {
                    DecodePolicy::SkipChild => {
                        Logger::warn(
                            "CHILD_DECODE_SKIPPED",
                            &[
                                ("path", &self.path),
                                ("key", key),
                                ("error", &source.to_string()),
                            ],
                        );
                    }
                    DecodePolicy::FailFeed => {
                        self.fail(FeedError::Decode {
                            key: key.to_string(),
                            source,
                        });
                    }
                }
                None
            }
        }
    }

    /// Terminate the feed and route `error` to the handler exactly once
    fn fail(&self, error: FeedError) {
        if !self.shared.fault() {
            return;
        }
        Logger::error(
            "FEED_FAULTED",
            &[("path", &self.path), ("error", &error.to_string())],
        );
        let handler = self.on_error.lock().ok().and_then(|mut h| h.take());
        if let Some(mut handler) = handler {
            handler(error);
        }
    }
}

impl<T, K> ChildListener for ListRelay<T, K>
where
    T: Storable + Clone,
    K: Fn(&T) -> String + Send + Sync,
{
    fn on_initial(&self, children: &[(String, Value)]) {
        let decoded: Vec<T> = children
            .iter()
            .filter_map(|(key, value)| self.decode(key, value))
            .collect();
        if let Ok(mut items) = self.items.lock() {
            *items = decoded;
        }
        self.emit();
    }

    fn on_child_added(&self, key: &str, value: &Value) {
        if let Some(decoded) = self.decode(key, value) {
            if let Ok(mut items) = self.items.lock() {
                items.push(decoded);
            }
            self.emit();
        }
    }

    fn on_child_changed(&self, key: &str, value: &Value) {
        if let Some(decoded) = self.decode(key, value) {
            let changed_key = (self.key_selector)(&decoded);
            if let Ok(mut items) = self.items.lock() {
                match items
                    .iter()
                    .position(|item| (self.key_selector)(item) == changed_key)
                {
                    Some(index) => items[index] = decoded,
                    None => items.push(decoded),
                }
            }
            self.emit();
        }
    }

    fn on_child_removed(&self, key: &str, value: &Value) {
        if let Some(decoded) = self.decode(key, value) {
            let removed_key = (self.key_selector)(&decoded);
            if let Ok(mut items) = self.items.lock() {
                items.retain(|item| (self.key_selector)(item) != removed_key);
            }
            self.emit();
        }
    }

    fn on_cancelled(&self, error: StoreError) {
        self.fail(FeedError::Store(error));
    }
}

/// Relay for value feeds: emits the decoded record on every change of
/// the node, `None` as the absence marker
pub(crate) struct ValueRelay<T> {
    tx: UnboundedSender<Option<T>>,
    shared: Arc<FeedShared>,
    on_error: Mutex<Option<ErrorHandler>>,
    policy: DecodePolicy,
    path: String,
}

impl<T> ValueRelay<T>
where
    T: Storable,
{
    pub(crate) fn new(
        tx: UnboundedSender<Option<T>>,
        shared: Arc<FeedShared>,
        on_error: ErrorHandler,
        policy: DecodePolicy,
        path: String,
    ) -> Self {
        Self {
            tx,
            shared,
            on_error: Mutex::new(Some(on_error)),
            policy,
            path,
        }
    }

    fn fail(&self, error: FeedError) {
        if !self.shared.fault() {
            return;
        }
        Logger::error(
            "FEED_FAULTED",
            &[("path", &self.path), ("error", &error.to_string())],
        );
        let handler = self.on_error.lock().ok().and_then(|mut h| h.take());
        if let Some(mut handler) = handler {
            handler(error);
        }
    }
}

impl<T> ValueListener for ValueRelay<T>
where
    T: Storable,
{
    fn on_value(&self, value: Option<&Value>) {
        if !self.shared.is_active() {
            return;
        }
        match value {
            None => {
                self.shared.guard_send(|| {
                    let _ = self.tx.send(None);
                });
            }
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(decoded) => {
                    self.shared.guard_send(move || {
                        let _ = self.tx.send(Some(decoded));
                    });
                }
                Err(source) => match self.policy {
                    DecodePolicy::SkipChild => {
                        Logger::warn(
                            "VALUE_DECODE_SKIPPED",
                            &[("path", &self.path), ("error", &source.to_string())],
                        );
                    }
                    DecodePolicy::FailFeed => {
                        self.fail(FeedError::Decode {
                            key: self.path.clone(),
                            source,
                        });
                    }
                },
            },
        }
    }

    fn on_cancelled(&self, error: StoreError) {
        self.fail(FeedError::Store(error));
    }
}
