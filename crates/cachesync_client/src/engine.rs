//! The sync engine: reconciliation loop, push listener, reconnection.

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{SyncError, SyncResult};
use crate::mirror::{Mirror, MirrorStatus};
use cachesync_protocol::ChangeRecord;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Counters describing the engine's work so far.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Successful connections, including reconnects.
    pub connects: u64,
    /// Reconciliation rounds completed.
    pub polls_completed: u64,
    /// Items fetched and applied to the mirror.
    pub items_applied: u64,
    /// Push notifications received.
    pub notifications_received: u64,
    /// Last error observed, if any.
    pub last_error: Option<String>,
}

/// Keeps a [`Mirror`] converging toward the server's store.
///
/// Two drivers share one connection: a periodic reconciliation poll
/// (`get_changes` from the cursor, fetch what is newer, advance the
/// cursor) and a push listener (fetch on `item_changed` when newer, never
/// advancing the cursor). On any connection failure the mirror is marked
/// degraded and the engine reconnects with exponential backoff, resuming
/// from the last committed cursor; the first reconciliation after a
/// (re)connect runs immediately to recover anything missed while offline.
pub struct SyncEngine {
    config: ClientConfig,
    mirror: Arc<Mirror>,
    stats: RwLock<SyncStats>,
    shutdown_tx: watch::Sender<bool>,
}

impl SyncEngine {
    /// Creates an engine. Nothing runs until [`SyncEngine::run`] is
    /// awaited (typically on a spawned task).
    pub fn new(config: ClientConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            mirror: Arc::new(Mirror::new()),
            stats: RwLock::new(SyncStats::default()),
            shutdown_tx,
        }
    }

    /// The mirror this engine maintains. Consumers hold this and read
    /// through it; they never mutate it.
    pub fn mirror(&self) -> Arc<Mirror> {
        Arc::clone(&self.mirror)
    }

    /// Snapshot of the engine's counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Asks a running [`SyncEngine::run`] to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Runs until [`SyncEngine::shutdown`] is called: connect, serve the
    /// poll and push drivers, reconnect on failure.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                return;
            }

            let (notify_tx, notify_rx) = mpsc::channel(64);
            let connected = tokio::select! {
                result = Connection::connect(self.config.server_addr, notify_tx) => result,
                _ = shutdown.changed() => return,
            };

            let session_result = match connected {
                Ok(connection) => {
                    attempt = 0;
                    self.stats.write().connects += 1;
                    info!(server = %self.config.server_addr, "connected");
                    self.serve(&connection, notify_rx, &mut shutdown).await
                }
                Err(e) => Err(e),
            };

            match session_result {
                Ok(()) => return, // shutdown requested
                Err(e) => {
                    warn!(error = %e, "connection failed; will reconnect");
                    self.stats.write().last_error = Some(e.to_string());
                    self.mirror.set_status(MirrorStatus::Degraded);
                    attempt += 1;
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return,
                    }
                }
            }
        }
    }

    /// Drives one connection until it fails or shutdown is requested.
    /// `Ok(())` means shutdown.
    async fn serve(
        &self,
        connection: &Connection,
        mut notify_rx: mpsc::Receiver<ChangeRecord>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SyncResult<()> {
        // Recover anything missed while disconnected before trusting push.
        self.reconcile(connection).await?;

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the reconcile above covered it.
        poll.tick().await;

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.reconcile(connection).await?;
                }
                notification = notify_rx.recv() => match notification {
                    Some(record) => self.handle_notification(connection, record).await?,
                    None => {
                        return Err(SyncError::ConnectionLost("push stream ended".into()));
                    }
                },
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }

    /// One reconciliation round: diff from the cursor, fetch what is
    /// newer, then advance the cursor to the server's reported maximum,
    /// even past items that needed no re-fetch, so future diffs start
    /// later.
    async fn reconcile(&self, connection: &Connection) -> SyncResult<()> {
        let cursor = self.mirror.cursor();
        let (records, max_version) = connection
            .get_changes(cursor, self.config.request_timeout)
            .await?;

        let mut applied = 0u64;
        for record in records {
            if self.is_newer_than_mirrored(&record) {
                match connection
                    .get_item(record.id, self.config.request_timeout)
                    .await
                {
                    Ok(item) => {
                        if self.mirror.apply(item) {
                            applied += 1;
                        }
                    }
                    // The diff can be stale by the time we fetch; the
                    // record for whatever replaced it is ahead of us.
                    Err(SyncError::NotFound(id)) => {
                        debug!(item = id, "item vanished between diff and fetch")
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.mirror.advance_cursor(max_version);
        self.mirror.set_status(MirrorStatus::Live);

        let mut stats = self.stats.write();
        stats.polls_completed += 1;
        stats.items_applied += applied;
        drop(stats);

        debug!(cursor = max_version, applied, "reconciliation complete");
        Ok(())
    }

    /// Push path: fetch and apply if the notified version is newer than
    /// what the mirror holds. The cursor is not advanced; only a
    /// `get_changes` response confirms a reconciliation checkpoint.
    async fn handle_notification(
        &self,
        connection: &Connection,
        record: ChangeRecord,
    ) -> SyncResult<()> {
        self.stats.write().notifications_received += 1;

        if !self.is_newer_than_mirrored(&record) {
            return Ok(());
        }

        match connection
            .get_item(record.id, self.config.request_timeout)
            .await
        {
            Ok(item) => {
                if self.mirror.apply(item) {
                    self.stats.write().items_applied += 1;
                }
                Ok(())
            }
            Err(SyncError::NotFound(id)) => {
                debug!(item = id, "notified item vanished before fetch");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn is_newer_than_mirrored(&self, record: &ChangeRecord) -> bool {
        self.mirror
            .version_of(record.id)
            .map_or(true, |held| held < record.version)
    }
}
