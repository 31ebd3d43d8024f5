//! # CacheSync Protocol
//!
//! Wire message types and framing for the CacheSync cache-invalidation
//! protocol.
//!
//! This crate provides:
//! - `Item` and `ChangeRecord` data types shared by server and client
//! - `Message`, the framed wire messages (JSON, tagged by `type`)
//! - Length-prefixed framing over async byte streams
//!
//! This is a pure protocol crate: it performs no application logic and
//! holds no connection state.
//!
//! # Framing
//!
//! Every message crossing the wire is carried in a frame: a 4-byte
//! big-endian length followed by that many bytes of JSON. Stream
//! transports do not respect message boundaries (two small messages can
//! be coalesced into one read, or one message split across reads), so
//! nothing may read the socket except through [`read_frame`] /
//! [`write_frame`] (or the [`read_message`] / [`write_message`] wrappers).
//! Where inbound reads race other futures in a `select!`, use
//! [`FrameReader`], whose reads are cancel-safe.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod frame;
mod message;

pub use error::{FrameError, WireError, WireResult};
pub use frame::{
    read_frame, read_message, write_frame, write_message, FrameReader, MAX_FRAME_LEN, PREFIX_LEN,
};
pub use message::{ChangeRecord, ErrorKind, Item, ItemId, Message};
