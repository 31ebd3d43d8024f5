//! Append-only log of mutations, ordered by version.

use cachesync_protocol::ChangeRecord;

/// A logically append-only sequence of [`ChangeRecord`], sorted by version
/// by construction: records are appended in version-assignment order and
/// never mutated afterwards.
///
/// Retention is unbounded: the full history stays in memory. Compaction
/// for production sizing is an open question recorded in DESIGN.md.
#[derive(Debug, Default)]
pub struct ChangeLog {
    records: Vec<ChangeRecord>,
}

impl ChangeLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Appends a record. Versions must arrive strictly increasing; the
    /// store guarantees this by appending under the same lock that assigns
    /// the version.
    pub fn append(&mut self, record: ChangeRecord) {
        debug_assert!(
            self.records
                .last()
                .map_or(true, |last| record.version > last.version),
            "change log versions must be strictly increasing"
        );
        self.records.push(record);
    }

    /// Returns the records with version strictly greater than `version`,
    /// ascending. O(log n + k): binary search for the cut point, then a
    /// slice copy of the k results.
    pub fn since(&self, version: u64) -> Vec<ChangeRecord> {
        let start = self.records.partition_point(|r| r.version <= version);
        self.records[start..].to_vec()
    }

    /// Highest version in the log, or 0 if empty.
    pub fn max_version(&self) -> u64 {
        self.records.last().map_or(0, |r| r.version)
    }

    /// Number of records retained.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no mutation has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, version: u64) -> ChangeRecord {
        ChangeRecord { id, version }
    }

    #[test]
    fn since_returns_strictly_newer_records() {
        let mut log = ChangeLog::new();
        log.append(record(1, 1));
        log.append(record(2, 2));
        log.append(record(1, 3));

        assert_eq!(log.since(0), vec![record(1, 1), record(2, 2), record(1, 3)]);
        assert_eq!(log.since(1), vec![record(2, 2), record(1, 3)]);
        assert_eq!(log.since(3), vec![]);
        assert_eq!(log.since(100), vec![]);
    }

    #[test]
    fn max_version_tracks_last_append() {
        let mut log = ChangeLog::new();
        assert_eq!(log.max_version(), 0);
        assert!(log.is_empty());

        log.append(record(1, 1));
        log.append(record(1, 2));
        assert_eq!(log.max_version(), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn same_item_appears_once_per_mutation() {
        let mut log = ChangeLog::new();
        log.append(record(5, 1));
        log.append(record(5, 2));

        // The log is mutation history, not item state: both records stay.
        assert_eq!(log.since(0).len(), 2);
    }
}
