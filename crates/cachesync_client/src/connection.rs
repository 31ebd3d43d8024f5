//! One client connection: request/response correlation plus the push
//! notification stream.
//!
//! Responses and asynchronous `item_changed` notifications arrive
//! interleaved on the same stream, so a single reader task demultiplexes
//! them: messages carrying a `request_id` complete the matching pending
//! request, notifications are forwarded to the engine's channel. Both the
//! poll driver and the push listener issue requests through
//! [`Connection::request`], which serializes writes.

use crate::error::{SyncError, SyncResult};
use cachesync_protocol::{
    read_message, write_message, ChangeRecord, ErrorKind, Item, ItemId, Message,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Default)]
struct PendingRequests {
    map: Mutex<HashMap<u64, oneshot::Sender<Message>>>,
}

impl PendingRequests {
    fn register(&self, request_id: u64) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.map.lock().insert(request_id, tx);
        rx
    }

    fn complete(&self, request_id: u64, message: Message) {
        match self.map.lock().remove(&request_id) {
            // The requester may have timed out and left; nothing to do.
            Some(tx) => {
                let _ = tx.send(message);
            }
            None => warn!(request_id, "response with no pending request"),
        }
    }

    fn forget(&self, request_id: u64) {
        self.map.lock().remove(&request_id);
    }

    /// Drops every pending sender; their requesters observe the
    /// connection as lost.
    fn fail_all(&self) {
        self.map.lock().clear();
    }
}

/// An established connection to the server.
pub(crate) struct Connection {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Arc<PendingRequests>,
    next_request_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Connects and spawns the reader task. `item_changed` notifications
    /// are delivered on `notify_tx`.
    pub(crate) async fn connect(
        addr: SocketAddr,
        notify_tx: mpsc::Sender<ChangeRecord>,
    ) -> SyncResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();

        let pending = Arc::new(PendingRequests::default());
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&pending), notify_tx));

        Ok(Self {
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            next_request_id: AtomicU64::new(0),
            reader,
        })
    }

    /// Sends one request and awaits the response that echoes its
    /// `request_id`, bounded by `timeout`.
    pub(crate) async fn request(
        &self,
        build: impl FnOnce(u64) -> Message,
        timeout: Duration,
    ) -> SyncResult<Message> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let rx = self.pending.register(request_id);
        let message = build(request_id);

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = write_message(&mut *writer, &message).await {
                self.pending.forget(request_id);
                return Err(SyncError::ConnectionLost(e.to_string()));
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(SyncError::ConnectionLost(
                "connection closed with request in flight".into(),
            )),
            Err(_) => {
                self.pending.forget(request_id);
                Err(SyncError::Timeout)
            }
        }
    }

    /// `get_changes(since)`: the diff after `since`, plus the server's
    /// current maximum version.
    pub(crate) async fn get_changes(
        &self,
        since_version: u64,
        timeout: Duration,
    ) -> SyncResult<(Vec<ChangeRecord>, u64)> {
        let reply = self
            .request(
                |request_id| Message::GetChanges {
                    request_id,
                    since_version,
                },
                timeout,
            )
            .await?;
        match reply {
            Message::ChangesResponse {
                items, max_version, ..
            } => Ok((items, max_version)),
            other => Err(SyncError::Protocol(format!(
                "unexpected reply to get_changes: {}",
                other.type_name()
            ))),
        }
    }

    /// `get_item(id)`: the full item, or [`SyncError::NotFound`].
    pub(crate) async fn get_item(&self, item_id: ItemId, timeout: Duration) -> SyncResult<Item> {
        let reply = self
            .request(
                |request_id| Message::GetItem {
                    request_id,
                    item_id,
                },
                timeout,
            )
            .await?;
        match reply {
            Message::ItemResponse { item, .. } => Ok(item),
            Message::Error {
                error: ErrorKind::NotFound,
                ..
            } => Err(SyncError::NotFound(item_id)),
            other => Err(SyncError::Protocol(format!(
                "unexpected reply to get_item: {}",
                other.type_name()
            ))),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.pending.fail_all();
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    pending: Arc<PendingRequests>,
    notify_tx: mpsc::Sender<ChangeRecord>,
) {
    loop {
        match read_message(&mut reader).await {
            Ok(Some(message)) => match message {
                Message::ItemChanged { item_id, version } => {
                    let record = ChangeRecord {
                        id: item_id,
                        version,
                    };
                    match notify_tx.try_send(record) {
                        Ok(()) => {}
                        // Notifications are best-effort and polling is the
                        // backstop; never let a full channel block the
                        // reader, or responses stop being delivered.
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!(item_id, version, "notification channel full, push dropped");
                        }
                        // Engine dropped its receiver; the connection is
                        // being torn down.
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                Message::ChangesResponse { request_id, .. }
                | Message::ItemResponse { request_id, .. }
                | Message::Error { request_id, .. } => {
                    pending.complete(request_id, message);
                }
                other => {
                    warn!(
                        message_type = other.type_name(),
                        "protocol violation from server; closing connection"
                    );
                    break;
                }
            },
            Ok(None) => {
                debug!("server closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "read failed; closing connection");
                break;
            }
        }
    }
    pending.fail_all();
}
