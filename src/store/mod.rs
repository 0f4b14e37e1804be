//! # Store Layer
//!
//! The hierarchical realtime store the bridge adapts: the
//! `RealtimeStore` trait, its listener callbacks, validated reference
//! paths, and an in-memory reference backend.

pub mod backend;
pub mod errors;
pub mod memory;
pub mod path;

pub use backend::{
    ChildListener, ListenerId, RealtimeStore, ValueListener, WriteCompletion,
};
pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use path::TreePath;
