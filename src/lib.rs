//! LMQ – a lightweight, crash-recoverable message queue service.
//!
//! This crate exports
//!  * `core`    – messages, growable FIFO queues and the queue store
//!  * `journal` – record codec, rotating segments, writer, replay, compaction
//!  * `broker`  – the store coupled to the journal, plus startup recovery
//!  * `api`     – the HTTP surface and payload resolvers
//!  * `config`  – TOML-driven runtime configuration
//!
//! The `lmq` binary runs the service; `lmq-compact` compacts a recovery
//! directory offline.

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod api;
pub mod broker;
pub mod config;
pub mod core;
pub mod journal;
pub mod logging;
pub mod metrics;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use broker::Broker;
pub use config::{load_config, Config};
pub use crate::core::{Message, QueueError, QueueManager, QueueResult};
pub use journal::{Compactor, JournalError, JournalRecord, JournalWriter};
