//! rxstore - reactive stream bridge for callback-based realtime stores
//!
//! Adapts a hierarchical store's push-based listeners into stream
//! feeds, and its writes into optional completion signals. Two value
//! shapes only: a keyed list of records under a reference path, and a
//! single record at a child path.

pub mod bridge;
pub mod observability;
pub mod store;

pub use bridge::{
    BridgeConfig, BridgeError, BridgeResult, DecodePolicy, FeedError, FeedState, ListFeed,
    ReactiveBridge, Storable, ValueFeed, WriteAck,
};
pub use store::{MemoryStore, RealtimeStore, StoreError, TreePath};
