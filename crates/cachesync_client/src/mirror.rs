//! The client-local mirror of the server's items.

use cachesync_protocol::{Item, ItemId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Freshness of the mirror as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorStatus {
    /// No successful reconciliation yet.
    Syncing,
    /// Connected; the mirror is at most one poll interval stale.
    Live,
    /// Connection lost; contents are served stale until reconnection
    /// succeeds.
    Degraded,
}

#[derive(Debug)]
struct MirrorInner {
    entries: HashMap<ItemId, Item>,
    /// Highest version confirmed by a `get_changes` response. A
    /// reconciliation checkpoint, not a per-item log: push-driven applies
    /// never advance it.
    cursor: u64,
    status: MirrorStatus,
}

/// Client-local cache of items, eventually consistent with the server.
///
/// May be strictly behind the server but never ahead of it: an entry's
/// version is always one the server actually produced, and an older
/// version never overwrites a newer one (last-writer-by-version-wins, not
/// last-writer-by-arrival-wins).
///
/// Consumers read through [`Mirror::get`] / [`Mirror::list`]; only the
/// sync engine mutates it.
#[derive(Debug)]
pub struct Mirror {
    inner: RwLock<MirrorInner>,
}

impl Mirror {
    /// Creates an empty mirror with cursor 0.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MirrorInner {
                entries: HashMap::new(),
                cursor: 0,
                status: MirrorStatus::Syncing,
            }),
        }
    }

    /// Returns the mirrored item, if present.
    pub fn get(&self, id: ItemId) -> Option<Item> {
        self.inner.read().entries.get(&id).cloned()
    }

    /// Returns all mirrored items, ordered by id.
    pub fn list(&self) -> Vec<Item> {
        let inner = self.inner.read();
        let mut items: Vec<_> = inner.entries.values().cloned().collect();
        items.sort_by_key(|item| item.id);
        items
    }

    /// Version currently held for an item, if mirrored.
    pub fn version_of(&self, id: ItemId) -> Option<u64> {
        self.inner.read().entries.get(&id).map(|item| item.version)
    }

    /// Highest version reconciled through via `get_changes`.
    pub fn cursor(&self) -> u64 {
        self.inner.read().cursor
    }

    /// Current freshness status.
    pub fn status(&self) -> MirrorStatus {
        self.inner.read().status
    }

    /// Number of mirrored items.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if nothing is mirrored yet.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Applies an item, overwriting only if the incoming version is
    /// strictly greater than the one held. Returns whether the entry
    /// changed.
    ///
    /// This rule is the concurrency-safety mechanism between the poll and
    /// push drivers: it makes apply commutative and idempotent, so no
    /// ordering between them is required.
    pub(crate) fn apply(&self, item: Item) -> bool {
        let mut inner = self.inner.write();
        match inner.entries.get(&item.id) {
            Some(held) if held.version >= item.version => false,
            _ => {
                inner.entries.insert(item.id, item);
                true
            }
        }
    }

    /// Advances the cursor to `version` if that is higher. The cursor
    /// never decreases.
    pub(crate) fn advance_cursor(&self, version: u64) {
        let mut inner = self.inner.write();
        if version > inner.cursor {
            inner.cursor = version;
        }
    }

    pub(crate) fn set_status(&self, status: MirrorStatus) {
        self.inner.write().status = status;
    }
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: ItemId, content: &str, version: u64) -> Item {
        Item {
            id,
            content: content.into(),
            version,
        }
    }

    #[test]
    fn apply_inserts_new_items() {
        let mirror = Mirror::new();
        assert!(mirror.apply(item(1, "A", 1)));
        assert_eq!(mirror.get(1).unwrap().content, "A");
        assert_eq!(mirror.version_of(1), Some(1));
    }

    #[test]
    fn apply_is_idempotent() {
        let mirror = Mirror::new();
        assert!(mirror.apply(item(1, "A", 2)));
        // The same change a second time is a no-op.
        assert!(!mirror.apply(item(1, "A", 2)));
        assert_eq!(mirror.len(), 1);
    }

    #[test]
    fn newer_version_is_never_overwritten() {
        let mirror = Mirror::new();
        assert!(mirror.apply(item(1, "newer", 5)));
        // Out-of-order arrival: older after newer leaves the newer state.
        assert!(!mirror.apply(item(1, "older", 3)));
        let held = mirror.get(1).unwrap();
        assert_eq!(held.content, "newer");
        assert_eq!(held.version, 5);
    }

    #[test]
    fn apply_is_order_independent() {
        let a = Mirror::new();
        a.apply(item(1, "v1", 1));
        a.apply(item(1, "v2", 2));

        let b = Mirror::new();
        b.apply(item(1, "v2", 2));
        b.apply(item(1, "v1", 1));

        assert_eq!(a.get(1), b.get(1));
    }

    #[test]
    fn cursor_never_decreases() {
        let mirror = Mirror::new();
        assert_eq!(mirror.cursor(), 0);
        mirror.advance_cursor(5);
        assert_eq!(mirror.cursor(), 5);
        mirror.advance_cursor(3);
        assert_eq!(mirror.cursor(), 5);
        mirror.advance_cursor(8);
        assert_eq!(mirror.cursor(), 8);
    }

    #[test]
    fn list_is_ordered_by_id() {
        let mirror = Mirror::new();
        mirror.apply(item(3, "c", 3));
        mirror.apply(item(1, "a", 1));
        mirror.apply(item(2, "b", 2));

        let ids: Vec<_> = mirror.list().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn status_transitions() {
        let mirror = Mirror::new();
        assert_eq!(mirror.status(), MirrorStatus::Syncing);
        mirror.set_status(MirrorStatus::Live);
        assert_eq!(mirror.status(), MirrorStatus::Live);
        mirror.set_status(MirrorStatus::Degraded);
        assert_eq!(mirror.status(), MirrorStatus::Degraded);
    }
}
