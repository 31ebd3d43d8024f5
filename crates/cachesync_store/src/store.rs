//! The authoritative item store.

use crate::change_log::ChangeLog;
use crate::feed::{ChangeFeed, FeedReceiver};
use cachesync_protocol::{ChangeRecord, Item, ItemId};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Interior state, guarded as one unit so every mutation is atomic.
#[derive(Debug, Default)]
struct StoreInner {
    items: HashMap<ItemId, Item>,
    log: ChangeLog,
    /// Global version counter. The last assigned version; 0 before any
    /// mutation. Deliberately not wall-clock time: one monotonic counter
    /// avoids clock skew and duplicate-timestamp ambiguity.
    counter: u64,
}

/// The authoritative mapping of item id → (content, version).
///
/// All operations are atomic with respect to each other: a mutation holds
/// the write lock for the whole assign-version / write-content / append-log
/// step, so concurrent reads never observe a half-applied mutation, and
/// concurrent updates to different items get distinct versions from the
/// one global counter.
///
/// Shared freely behind an `Arc`; the lock lives inside.
#[derive(Debug)]
pub struct ItemStore {
    inner: RwLock<StoreInner>,
    feed: ChangeFeed,
}

impl ItemStore {
    /// Creates an empty store with the default feed capacity.
    pub fn new() -> Self {
        Self::with_feed_capacity(1024)
    }

    /// Creates an empty store whose change feed buffers up to `capacity`
    /// records per subscriber.
    pub fn with_feed_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            feed: ChangeFeed::new(capacity),
        }
    }

    /// Returns the item, full content included.
    pub fn get(&self, id: ItemId) -> Option<Item> {
        self.inner.read().items.get(&id).cloned()
    }

    /// Replaces the item's content, assigning the next version from the
    /// global counter, and appends the corresponding change record.
    /// Returns the new version.
    ///
    /// The mutation returns as soon as the store and log are committed;
    /// fan-out to sessions happens asynchronously and cannot fail or delay
    /// this call.
    pub fn update(&self, id: ItemId, content: impl Into<String>) -> u64 {
        let record = {
            let mut inner = self.inner.write();
            inner.counter += 1;
            let version = inner.counter;
            inner.items.insert(
                id,
                Item {
                    id,
                    content: content.into(),
                    version,
                },
            );
            let record = ChangeRecord { id, version };
            inner.log.append(record);
            // Publish while still holding the lock so the feed observes
            // records in version order. Send is a non-blocking ring-buffer
            // push.
            self.feed.publish(record);
            record
        };
        debug!(item = record.id, version = record.version, "item updated");
        record.version
    }

    /// Returns every change record with version strictly greater than
    /// `version`, ascending, together with the store's current maximum
    /// version.
    pub fn changes_since(&self, version: u64) -> (Vec<ChangeRecord>, u64) {
        let inner = self.inner.read();
        (inner.log.since(version), inner.counter)
    }

    /// Highest version assigned so far; 0 before any mutation.
    pub fn max_version(&self) -> u64 {
        self.inner.read().counter
    }

    /// Number of distinct items held.
    pub fn item_count(&self) -> usize {
        self.inner.read().items.len()
    }

    /// Number of change records retained.
    pub fn change_count(&self) -> usize {
        self.inner.read().log.len()
    }

    /// Subscribes to the change feed. Each committed mutation is delivered
    /// to every subscriber, best-effort.
    pub fn subscribe(&self) -> FeedReceiver {
        self.feed.subscribe()
    }
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn get_missing_item() {
        let store = ItemStore::new();
        assert!(store.get(1).is_none());
    }

    #[test]
    fn update_assigns_versions_from_one_counter() {
        let store = ItemStore::new();
        assert_eq!(store.update(1, "A"), 1);
        assert_eq!(store.update(2, "B"), 2);
        assert_eq!(store.update(1, "A2"), 3);

        let item = store.get(1).unwrap();
        assert_eq!(item.content, "A2");
        assert_eq!(item.version, 3);
        assert_eq!(store.max_version(), 3);
        assert_eq!(store.item_count(), 2);
    }

    #[test]
    fn changes_since_is_exact() {
        let store = ItemStore::new();
        store.update(1, "A");
        store.update(2, "B");
        store.update(1, "A2");

        let (records, max) = store.changes_since(0);
        assert_eq!(max, 3);
        assert_eq!(
            records,
            vec![
                ChangeRecord { id: 1, version: 1 },
                ChangeRecord { id: 2, version: 2 },
                ChangeRecord { id: 1, version: 3 },
            ]
        );

        let (records, max) = store.changes_since(2);
        assert_eq!(max, 3);
        assert_eq!(records, vec![ChangeRecord { id: 1, version: 3 }]);

        let (records, max) = store.changes_since(3);
        assert_eq!(max, 3);
        assert!(records.is_empty());
    }

    #[test]
    fn version_never_decreases_per_item() {
        let store = ItemStore::new();
        let mut last = 0;
        for i in 0..10 {
            let v = store.update(7, format!("content {i}"));
            assert!(v > last);
            last = v;
            assert_eq!(store.get(7).unwrap().version, v);
        }
    }

    #[test]
    fn concurrent_updates_are_gapless_and_ordered() {
        let store = Arc::new(ItemStore::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.update(t, format!("t{t} i{i}"));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let (records, max) = store.changes_since(0);
        assert_eq!(max, 400);
        assert_eq!(records.len(), 400);
        // Log order equals version-assignment order: a gapless 1..=400.
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.version, i as u64 + 1);
        }
    }

    #[tokio::test]
    async fn subscribers_observe_mutations() {
        let store = ItemStore::new();
        let mut rx = store.subscribe();

        store.update(1, "A");
        store.update(2, "B");

        assert_eq!(rx.recv().await.unwrap(), ChangeRecord { id: 1, version: 1 });
        assert_eq!(rx.recv().await.unwrap(), ChangeRecord { id: 2, version: 2 });
    }

    proptest! {
        // For any sequence of mutations, the log's version order equals
        // arrival order with no gaps, and changes_since(v) returns exactly
        // the records with version > v.
        #[test]
        fn log_matches_mutation_history(ids in prop::collection::vec(0u64..16, 1..64), cut in 0u64..80) {
            let store = ItemStore::new();
            for &id in &ids {
                store.update(id, "x");
            }

            let (all, max) = store.changes_since(0);
            prop_assert_eq!(max, ids.len() as u64);
            prop_assert_eq!(all.len(), ids.len());
            for (i, (record, &id)) in all.iter().zip(&ids).enumerate() {
                prop_assert_eq!(record.version, i as u64 + 1);
                prop_assert_eq!(record.id, id);
            }

            let (suffix, _) = store.changes_since(cut);
            let expected: Vec<_> = all.iter().filter(|r| r.version > cut).copied().collect();
            prop_assert_eq!(suffix, expected);
        }
    }
}
