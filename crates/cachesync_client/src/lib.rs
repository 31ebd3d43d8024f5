//! # CacheSync Client
//!
//! Client side of the CacheSync cache-invalidation protocol.
//!
//! This crate provides:
//! - [`Mirror`]: the client-local cache of items, eventually consistent
//!   with the server's store; read-only for consumers
//! - [`SyncEngine`]: keeps the mirror converging via two drivers over one
//!   connection, a periodic reconciliation poll and a push-notification
//!   listener, with reconnect and exponential backoff
//! - [`ClientConfig`] / [`RetryConfig`]
//!
//! # Convergence model
//!
//! Push gives latency, polling gives completeness. A missed push
//! notification (lag, reconnect window) is recovered by the next periodic
//! reconciliation, which is why polling is retained even though push
//! exists. The mirror's apply rule (overwrite only on a strictly newer
//! version) makes applying changes idempotent and order-independent, so
//! the two drivers need no ordering between them.
//!
//! # Example
//!
//! ```rust,ignore
//! use cachesync_client::{ClientConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(SyncEngine::new(ClientConfig::new(addr)));
//! let mirror = engine.mirror();
//! tokio::spawn({
//!     let engine = Arc::clone(&engine);
//!     async move { engine.run().await }
//! });
//! // ... consumers read mirror.get(id) / mirror.list()
//! engine.shutdown();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod engine;
mod error;
mod mirror;

pub use config::{ClientConfig, RetryConfig};
pub use engine::{SyncEngine, SyncStats};
pub use error::{SyncError, SyncResult};
pub use mirror::{Mirror, MirrorStatus};
