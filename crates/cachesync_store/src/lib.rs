//! # CacheSync Store
//!
//! The authoritative side of the CacheSync protocol:
//!
//! - [`ItemStore`]: the id to (content, version) mapping, the only
//!   mutation surface
//! - [`ChangeLog`]: append-only record of mutations, queryable by cursor
//! - [`ChangeFeed`]: broadcast of committed mutations to live sessions
//!
//! # Invariants
//!
//! - Versions come from one global counter: a total order across all
//!   items, which is what lets `changes_since` be a single linear cursor
//!   rather than a per-item vector.
//! - Version assignment and the content write are linearized as one step
//!   under the store lock: no version is ever assigned without its content
//!   change committing, and no change commits without a version.
//! - The change log is exactly the store's mutation history, in order.
//! - The feed is best-effort: a slow or absent subscriber never blocks or
//!   fails a mutation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_log;
mod feed;
mod store;

pub use change_log::ChangeLog;
pub use feed::{ChangeFeed, FeedReceiver};
pub use store::ItemStore;
