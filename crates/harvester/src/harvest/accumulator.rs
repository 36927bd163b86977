//! Last-write-wins store of fetched records, keyed by upstream id.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::upstream::RepositoryRecord;

use super::report::{TopEntry, rank_by_stars};

/// Shared by all detail workers for one run. The lock is held only for a
/// single map operation.
#[derive(Debug, Default)]
pub struct Accumulator {
    records: Mutex<HashMap<i64, RepositoryRecord>>,
}

impl Accumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, RepositoryRecord>> {
        // A panicking writer cannot leave a half-inserted entry behind.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the record for its id. Returns the superseded one.
    pub fn put(&self, record: RepositoryRecord) -> Option<RepositoryRecord> {
        self.lock().insert(record.id, record)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every record, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RepositoryRecord> {
        let mut records: Vec<_> = self.lock().values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// The `n` most-starred records, descending.
    #[must_use]
    pub fn top_by_stars(&self, n: usize) -> Vec<TopEntry> {
        rank_by_stars(self.lock().values(), n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::DateTime;

    fn record(id: i64, stars: i64) -> RepositoryRecord {
        let ts = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").expect("valid date");
        RepositoryRecord {
            id,
            full_name: format!("owner/repo-{id}"),
            created_at: ts,
            updated_at: ts,
            archived: false,
            stars_count: stars,
            size: 0,
            release_counter: 0,
            tag_count: 0,
        }
    }

    #[test]
    fn later_put_replaces_earlier() {
        let acc = Accumulator::new();
        assert!(acc.put(record(1, 5)).is_none());
        let previous = acc.put(record(1, 9)).expect("replaced");
        assert_eq!(previous.stars_count, 5);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.snapshot()[0].stars_count, 9);
    }

    #[test]
    fn snapshot_is_ordered_by_id() {
        let acc = Accumulator::new();
        for id in [30, 10, 20] {
            acc.put(record(id, 0));
        }
        let ids: Vec<_> = acc.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_keep_one_entry_per_id() {
        let acc = Arc::new(Accumulator::new());
        let writers: Vec<_> = (0..8)
            .map(|w| {
                let acc = Arc::clone(&acc);
                tokio::spawn(async move {
                    for id in 0..100 {
                        acc.put(record(id, w));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.expect("writer should not panic");
        }
        assert_eq!(acc.len(), 100);
    }

    #[test]
    fn empty_accumulator() {
        let acc = Accumulator::new();
        assert!(acc.is_empty());
        assert!(acc.snapshot().is_empty());
        assert!(acc.top_by_stars(10).is_empty());
    }
}
