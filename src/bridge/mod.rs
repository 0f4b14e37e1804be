//! # Reactive Bridge Module
//!
//! Translates the store's push-based child/value listeners into
//! reactive-stream emissions, and write/delete operations into
//! completion/failure signals.
//!
//! ## Architecture
//!
//! - **Adapter**: the bridge operations (subscribe, insert, update,
//!   remove) over an explicitly constructed store client
//! - **Relays**: listener objects forwarding store callbacks into feed
//!   channels
//! - **Feeds**: subscriber-owned stream handles with synchronous,
//!   idempotent cancellation
//! - **Storable**: identity-rebinding contract for domain records

pub mod adapter;
pub mod config;
pub mod errors;
pub mod feed;
mod relay;
pub mod storable;

pub use adapter::ReactiveBridge;
pub use config::{BridgeConfig, DecodePolicy};
pub use errors::{BridgeError, BridgeResult, FeedError};
pub use feed::{FeedState, ListFeed, ValueFeed, WriteAck};
pub use storable::Storable;
