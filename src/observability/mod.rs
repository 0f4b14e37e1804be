//! Observability for rxstore
//!
//! Structured JSON logging for bridge events: fire-and-forget write
//! failures, skipped children, feed lifecycle.
//!
//! # Principles
//!
//! 1. Logging is read-only, no side effects on bridge behavior
//! 2. Synchronous, no buffering, no background threads
//! 3. One log line = one event
//! 4. Deterministic field ordering

mod logger;

pub use logger::{Logger, Severity};
