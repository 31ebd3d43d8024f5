//! Per-connection protocol session.

use crate::error::{ServerError, ServerResult};
use cachesync_protocol::{write_message, ErrorKind, FrameReader, Message};
use cachesync_store::ItemStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// One client connection.
///
/// Each inbound frame is dispatched by message type: `get_changes` is
/// answered synchronously with the current diff (no long-poll; freshness
/// comes from push, polling is the backstop), `get_item` with the item or
/// a `not_found` error. In between requests the session relays the store's
/// change feed as `item_changed` notifications over the same stream.
pub(crate) struct Session {
    store: Arc<ItemStore>,
    peer: SocketAddr,
}

impl Session {
    pub(crate) fn new(store: Arc<ItemStore>, peer: SocketAddr) -> Self {
        Self { store, peer }
    }

    /// Drives the session until the stream closes or errors. Dropping the
    /// feed receiver on exit unregisters the session from push fan-out.
    pub(crate) async fn run<S>(self, stream: S) -> ServerResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!(peer = %self.peer, "session started");
        let outcome = self.serve(stream).await;
        match &outcome {
            Ok(()) => info!(peer = %self.peer, "session closed"),
            Err(e) => warn!(peer = %self.peer, error = %e, "session closed"),
        }
        outcome
    }

    async fn serve<S>(&self, stream: S) -> ServerResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Subscribe before serving the first request so no mutation can
        // fall between a response and the push stream.
        let mut feed = self.store.subscribe();
        let (reader, mut writer) = tokio::io::split(stream);
        // A request frame split across reads can lose the select race to
        // a push; FrameReader's reads are cancel-safe, so the partial
        // frame survives in its buffer.
        let mut reader = FrameReader::new(reader);

        loop {
            tokio::select! {
                inbound = reader.next_message() => match inbound? {
                    Some(message) => {
                        let reply = self.dispatch(message)?;
                        write_message(&mut writer, &reply).await?;
                    }
                    // Clean EOF: client went away.
                    None => return Ok(()),
                },
                change = feed.recv() => match change {
                    Ok(record) => {
                        let notification = Message::ItemChanged {
                            item_id: record.id,
                            version: record.version,
                        };
                        write_message(&mut writer, &notification).await?;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed pushes are recovered by the client's next
                        // periodic reconciliation.
                        warn!(peer = %self.peer, skipped, "push feed lagged");
                    }
                    Err(RecvError::Closed) => return Ok(()),
                },
            }
        }
    }

    /// Maps one request to its response. Message types a client must not
    /// send terminate the session rather than being silently dropped.
    fn dispatch(&self, message: Message) -> ServerResult<Message> {
        match message {
            Message::GetChanges {
                request_id,
                since_version,
            } => {
                let (items, max_version) = self.store.changes_since(since_version);
                Ok(Message::ChangesResponse {
                    request_id,
                    items,
                    max_version,
                })
            }
            Message::GetItem {
                request_id,
                item_id,
            } => Ok(match self.store.get(item_id) {
                Some(item) => Message::ItemResponse { request_id, item },
                None => Message::Error {
                    request_id,
                    error: ErrorKind::NotFound,
                },
            }),
            other => Err(ServerError::UnexpectedMessage {
                message_type: other.type_name(),
            }),
        }
    }
}
