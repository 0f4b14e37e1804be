//! # Feeds and Write Acknowledgements
//!
//! Subscriber-owned handles. A feed owns its subscription: cancelling
//! (or dropping) it detaches the underlying store listener. Feeds are
//! `Stream`s over an unbounded channel; there is no backpressure, a
//! slow consumer buffers or drops on its own.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;

use crate::observability::Logger;
use crate::store::{ListenerId, RealtimeStore, StoreError};

use super::errors::{BridgeError, BridgeResult};

/// Lifecycle state of a feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Listener registered, emissions flow
    Active,
    /// Explicitly cancelled by the subscriber; terminal
    Cancelled,
    /// Terminated by a store-reported error; terminal
    Faulted,
}

/// State cell shared between a feed handle and its relay
///
/// The relay sends through `guard_send`, which holds the state lock
/// across the active check and the send; `cancel`/`fault` flip the
/// state under the same lock. Once a terminal transition has returned,
/// no send passes and no second transition succeeds.
pub(crate) struct FeedShared {
    state: Mutex<FeedState>,
}

impl FeedShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FeedState::Active),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state
            .lock()
            .map(|state| *state == FeedState::Active)
            .unwrap_or(false)
    }

    /// Run `send` under the state lock if the feed is still active
    pub(crate) fn guard_send<F: FnOnce()>(&self, send: F) -> bool {
        let Ok(state) = self.state.lock() else {
            return false;
        };
        if *state != FeedState::Active {
            return false;
        }
        send();
        true
    }

    /// Active -> Cancelled; false if already terminal
    pub(crate) fn cancel(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if *state == FeedState::Active {
            *state = FeedState::Cancelled;
            true
        } else {
            false
        }
    }

    /// Active -> Faulted; false if already terminal
    pub(crate) fn fault(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if *state == FeedState::Active {
            *state = FeedState::Faulted;
            true
        } else {
            false
        }
    }

    pub(crate) fn state(&self) -> FeedState {
        self.state.lock().map(|state| *state).unwrap_or(FeedState::Faulted)
    }
}

/// Ties a feed handle to its store listener for teardown
struct FeedGuard {
    shared: Arc<FeedShared>,
    store: Arc<dyn RealtimeStore>,
    listener: ListenerId,
    path: String,
}

impl FeedGuard {
    /// Synchronous, idempotent cancellation
    fn cancel(&self) {
        if self.shared.cancel() {
            self.store.detach(self.listener);
            Logger::trace("FEED_CANCELLED", &[("path", &self.path)]);
        } else if self.shared.state() == FeedState::Faulted {
            // Listener already torn down store-side; detach is idempotent
            self.store.detach(self.listener);
        }
    }
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A change feed of full list snapshots at a reference path
///
/// Emits one snapshot on subscription (empty list included) and a full
/// snapshot after every child add/change/remove.
pub struct ListFeed<T> {
    rx: UnboundedReceiver<Vec<T>>,
    guard: FeedGuard,
}

impl<T> ListFeed<T> {
    pub(crate) fn new(
        rx: UnboundedReceiver<Vec<T>>,
        shared: Arc<FeedShared>,
        store: Arc<dyn RealtimeStore>,
        listener: ListenerId,
        path: String,
    ) -> Self {
        Self {
            rx,
            guard: FeedGuard {
                shared,
                store,
                listener,
                path,
            },
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> FeedState {
        self.guard.shared.state()
    }

    /// Cancel the subscription
    ///
    /// Synchronous and idempotent: once this returns, no further
    /// emission occurs and the store listener is detached.
    pub fn cancel(&mut self) {
        self.guard.cancel();
    }

    /// Take the next already-delivered snapshot without waiting
    pub fn try_recv(&mut self) -> Option<Vec<T>> {
        match self.rx.try_recv() {
            Ok(snapshot) => Some(snapshot),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the next snapshot, `None` when the feed has ended
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Vec<T>> {
        self.rx.blocking_recv()
    }
}

impl<T> Stream for ListFeed<T> {
    type Item = Vec<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A value feed for a single node at a reference path
///
/// Emits `Some(record)` on every change of the node and `None` as the
/// absence marker when the node is missing or deleted.
pub struct ValueFeed<T> {
    rx: UnboundedReceiver<Option<T>>,
    guard: FeedGuard,
}

impl<T> ValueFeed<T> {
    pub(crate) fn new(
        rx: UnboundedReceiver<Option<T>>,
        shared: Arc<FeedShared>,
        store: Arc<dyn RealtimeStore>,
        listener: ListenerId,
        path: String,
    ) -> Self {
        Self {
            rx,
            guard: FeedGuard {
                shared,
                store,
                listener,
                path,
            },
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> FeedState {
        self.guard.shared.state()
    }

    /// Cancel the subscription; synchronous and idempotent
    pub fn cancel(&mut self) {
        self.guard.cancel();
    }

    /// Take the next already-delivered value without waiting
    pub fn try_recv(&mut self) -> Option<Option<T>> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the next value, `None` when the feed has ended
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Option<T>> {
        self.rx.blocking_recv()
    }
}

impl<T> Stream for ValueFeed<T> {
    type Item = Option<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Completion signal for an acknowledged write
///
/// Resolves exactly once with the operation's outcome. `insert_acked`
/// resolves with the generated child id; other writes resolve with `()`.
pub struct WriteAck<T = ()> {
    rx: oneshot::Receiver<Result<T, StoreError>>,
}

impl<T> WriteAck<T> {
    pub(crate) fn channel() -> (oneshot::Sender<Result<T, StoreError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Block until the write completes
    ///
    /// Must not be called from within an async runtime; `.await` the
    /// acknowledgement instead.
    pub fn wait(self) -> BridgeResult<T> {
        match self.rx.blocking_recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(BridgeError::Store(error)),
            Err(_) => Err(BridgeError::AckDropped),
        }
    }
}

impl<T> Future for WriteAck<T> {
    type Output = BridgeResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(error))) => Poll::Ready(Err(BridgeError::Store(error))),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BridgeError::AckDropped)),
        }
    }
}
