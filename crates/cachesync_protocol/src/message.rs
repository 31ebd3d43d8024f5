//! Protocol messages and shared data types.

use crate::error::WireResult;
use serde::{Deserialize, Serialize};

/// Stable identifier of an item.
pub type ItemId = u64;

/// A versioned item held by the server's store, or mirrored by a client.
///
/// `version` is a monotonically increasing integer assigned from one
/// global counter at mutation time. It identifies the item's causal
/// revision; it is not wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier, unique within the store.
    pub id: ItemId,
    /// Opaque payload. Replaced wholesale on every update.
    pub content: String,
    /// Revision this content was written at.
    pub version: u64,
}

/// A single entry of the change log: which item changed, at what version.
///
/// Carries no content; a client that learns of a change fetches the full
/// item separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Item that changed.
    pub id: ItemId,
    /// Version assigned to the change.
    pub version: u64,
}

/// Error codes carried in `error` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The requested item id is absent from the store.
    NotFound,
}

/// A wire message. One message per frame, tagged by `type`.
///
/// Requests carry a client-chosen `request_id` which the matching response
/// echoes, so a client can tell responses to its own requests apart from
/// asynchronous [`Message::ItemChanged`] notifications sharing the same
/// connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Client asks for all changes after `since_version`.
    GetChanges {
        /// Correlation id echoed by the response.
        request_id: u64,
        /// Cursor: highest version the client has reconciled through.
        since_version: u64,
    },

    /// Server's answer to [`Message::GetChanges`]: the diff, plus the
    /// store's current maximum version.
    ChangesResponse {
        /// Correlation id from the request.
        request_id: u64,
        /// Records with version strictly greater than `since_version`,
        /// ascending.
        items: Vec<ChangeRecord>,
        /// The store's current maximum version.
        max_version: u64,
    },

    /// Client asks for the full content of one item.
    GetItem {
        /// Correlation id echoed by the response.
        request_id: u64,
        /// Item to fetch.
        item_id: ItemId,
    },

    /// Server's answer to [`Message::GetItem`] when the item exists.
    ItemResponse {
        /// Correlation id from the request.
        request_id: u64,
        /// The item, full content included.
        item: Item,
    },

    /// Server's error answer to a request. The connection stays open.
    Error {
        /// Correlation id from the request.
        request_id: u64,
        /// What went wrong.
        error: ErrorKind,
    },

    /// Asynchronous server-to-client notification that an item changed.
    /// Carries id and version only, never content; no `request_id`.
    ItemChanged {
        /// Item that changed.
        item_id: ItemId,
        /// Version the item changed to.
        version: u64,
    },
}

impl Message {
    /// Returns the correlation id, if this message type carries one.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            Message::GetChanges { request_id, .. }
            | Message::ChangesResponse { request_id, .. }
            | Message::GetItem { request_id, .. }
            | Message::ItemResponse { request_id, .. }
            | Message::Error { request_id, .. } => Some(*request_id),
            Message::ItemChanged { .. } => None,
        }
    }

    /// Returns the wire name of the message type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::GetChanges { .. } => "get_changes",
            Message::ChangesResponse { .. } => "changes_response",
            Message::GetItem { .. } => "get_item",
            Message::ItemResponse { .. } => "item_response",
            Message::Error { .. } => "error",
            Message::ItemChanged { .. } => "item_changed",
        }
    }

    /// Encodes the message as a JSON frame payload.
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a message from a frame payload.
    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
