//! # CacheSync Server
//!
//! TCP server side of the CacheSync cache-invalidation protocol.
//!
//! This crate provides:
//! - [`SyncServer`]: accept loop, one session task per connection
//! - Per-connection sessions answering requests and relaying pushes
//! - Push fan-out: every committed mutation is relayed to every live
//!   session as an `item_changed` notification, best-effort
//! - [`ServerConfig`]
//!
//! # Architecture
//!
//! The server owns an [`cachesync_store::ItemStore`]. Each accepted
//! connection runs in its own task, answering `get_changes` and `get_item`
//! requests synchronously from the store while relaying the store's change
//! feed to the client. A slow or disconnected client only ever affects its
//! own session: the mutation path never blocks on delivery, and a
//! per-session write failure closes that session alone.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod server;
mod session;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{ServerHandle, SyncServer};
