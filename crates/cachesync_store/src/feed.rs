//! Change feed: fan-out of committed mutations to live sessions.
//!
//! Adapted around `tokio::sync::broadcast`: each server session subscribes
//! and relays records to its client as `item_changed` notifications. The
//! channel is a bounded ring buffer: publishing never blocks, a slow
//! subscriber observes `Lagged` and recovers via the next periodic
//! reconciliation, and dropping a receiver deregisters the session.

use cachesync_protocol::ChangeRecord;
use tokio::sync::broadcast;

/// Receiver half handed to each subscribing session.
pub type FeedReceiver = broadcast::Receiver<ChangeRecord>;

/// Broadcast feed of committed change records.
#[derive(Debug)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeRecord>,
}

impl ChangeFeed {
    /// Creates a feed retaining up to `capacity` undelivered records per
    /// subscriber before it starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes. The receiver sees every record published after this
    /// call, subject to the lag bound.
    pub fn subscribe(&self) -> FeedReceiver {
        self.sender.subscribe()
    }

    /// Publishes a committed record, best-effort. Having no subscribers is
    /// not an error.
    pub fn publish(&self, record: ChangeRecord) {
        let _ = self.sender.send(record);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}
