//! The dynamic edge coverage table: one exact hit counter per observed edge.

use std::sync::{Mutex, PoisonError};

use hashbrown::{hash_map::Entry, HashMap};
use serde::{Deserialize, Serialize};

use crate::Error;

/// A single observed edge: its identity and how often it has been hit.
///
/// Created with a count of 1 on the first observation of its hash, then only
/// ever incremented. Removal happens through [`EdgeTable::remove`] or
/// [`EdgeTable::clear`], never as a side effect of tracing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    hash: u32,
    count: u64,
}

impl EdgeRecord {
    /// Creates the record for an edge seen for the first time.
    #[must_use]
    pub fn new(hash: u32) -> Self {
        Self { hash, count: 1 }
    }

    /// The edge identity this record counts.
    #[must_use]
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// How often the edge has been observed.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[inline]
    fn hit(&mut self) {
        self.count = self.count.saturating_add(1);
    }
}

/// Maps edge identities to [`EdgeRecord`]s, growing to exactly the set of
/// distinct edges observed.
///
/// Unlike a fixed-size coverage bitmap, two distinct edge identities can never
/// shadow each other here; the only remaining aliasing is the one baked into
/// the identity computation itself (see [`trace`](crate::trace)).
///
/// The table is a plain owned value. Whoever drives the fuzzing loop decides
/// where it lives, when it is cleared between executions, and when it dies.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EdgeTable {
    map: HashMap<u32, EdgeRecord>,
}

impl EdgeTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table with space preallocated for `capacity` edges.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
        }
    }

    /// Looks up the record for `hash`, if the edge has been observed.
    #[must_use]
    pub fn lookup(&self, hash: u32) -> Option<&EdgeRecord> {
        self.map.get(&hash)
    }

    /// Inserts a fresh record for `hash` with a count of 1.
    ///
    /// The caller must have checked that `hash` is not yet present, as
    /// [`check_then_update`](Self::check_then_update) does. An allocation
    /// failure aborts the process; a coverage observation that cannot be
    /// recorded would silently corrupt the feedback otherwise.
    pub fn insert_new(&mut self, hash: u32) -> &EdgeRecord {
        debug_assert!(
            !self.map.contains_key(&hash),
            "edge {hash:#x} inserted twice"
        );
        self.map.entry(hash).or_insert_with(|| EdgeRecord::new(hash))
    }

    /// Bumps the hit count of an existing record.
    pub(crate) fn increment(&mut self, hash: u32) -> Result<(), Error> {
        match self.map.get_mut(&hash) {
            Some(record) => {
                record.hit();
                Ok(())
            }
            None => Err(Error::key_not_found(format!(
                "edge {hash:#x} was never inserted"
            ))),
        }
    }

    /// The one entry point used by instrumented code: creates the record with
    /// a count of 1 on the first observation of `hash`, increments it on every
    /// later one.
    #[inline]
    pub fn check_then_update(&mut self, hash: u32) {
        match self.map.entry(hash) {
            Entry::Occupied(mut entry) => entry.get_mut().hit(),
            Entry::Vacant(entry) => {
                entry.insert(EdgeRecord::new(hash));
            }
        }
    }

    /// Removes the record for `hash`, returning it if it was present.
    pub fn remove(&mut self, hash: u32) -> Option<EdgeRecord> {
        self.map.remove(&hash)
    }

    /// Forgets all observed edges. Afterwards every lookup is absent and the
    /// next observation of any hash starts over at a count of 1.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Number of distinct edges observed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no edge has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over all records, in no particular order.
    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.map.values()
    }
}

impl<'it> IntoIterator for &'it EdgeTable {
    type Item = &'it EdgeRecord;
    type IntoIter = hashbrown::hash_map::Values<'it, u32, EdgeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.values()
    }
}

/// An [`EdgeTable`] behind a single [`Mutex`], for targets that run more than
/// one thread through the instrumented code.
///
/// One locked table was chosen over per-thread shards merged after the run so
/// that "exactly one record per hash" holds at every point in time, not just
/// at the end; `T` threads doing `K` updates of the same hash always end up
/// at exactly `T * K`.
#[derive(Debug, Default)]
pub struct SharedEdgeTable {
    inner: Mutex<EdgeTable>,
}

impl SharedEdgeTable {
    /// Creates an empty shared table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking holder cannot leave a half-applied update behind, so a
    // poisoned lock is still a consistent table.
    fn lock(&self) -> std::sync::MutexGuard<'_, EdgeTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates-or-increments the record for `hash`. See
    /// [`EdgeTable::check_then_update`].
    #[inline]
    pub fn check_then_update(&self, hash: u32) {
        self.lock().check_then_update(hash);
    }

    /// Looks up the record for `hash`, copying it out of the lock.
    #[must_use]
    pub fn lookup(&self, hash: u32) -> Option<EdgeRecord> {
        self.lock().lookup(hash).copied()
    }

    /// Forgets all observed edges.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of distinct edges observed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no edge has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clones the current table contents, e.g. to hand the finished run's
    /// coverage to the fuzzer.
    #[must_use]
    pub fn snapshot(&self) -> EdgeTable {
        self.lock().clone()
    }

    /// Unwraps the inner table once no other thread can observe edges anymore.
    #[must_use]
    pub fn into_inner(self) -> EdgeTable {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<EdgeTable> for SharedEdgeTable {
    fn from(table: EdgeTable) -> Self {
        Self {
            inner: Mutex::new(table),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use crate::{Error, table::{EdgeRecord, EdgeTable, SharedEdgeTable}};

    #[test]
    fn test_accumulation() {
        let mut table = EdgeTable::new();
        for _ in 0..42 {
            table.check_then_update(0xcafe);
        }
        assert_eq!(table.lookup(0xcafe).unwrap().count(), 42);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_key_uniqueness() {
        let mut table = EdgeTable::new();
        for hash in 0..1000_u32 {
            table.check_then_update(hash);
        }
        // a second round must not add records
        for hash in 0..1000_u32 {
            table.check_then_update(hash);
        }
        assert_eq!(table.len(), 1000);
        for hash in 0..1000_u32 {
            assert_eq!(table.lookup(hash).unwrap().count(), 2);
        }
    }

    #[test]
    fn test_insert_new_starts_at_one() {
        let mut table = EdgeTable::new();
        let record = table.insert_new(7);
        assert_eq!(record.hash(), 7);
        assert_eq!(record.count(), 1);
    }

    #[test]
    fn test_increment_missing_is_an_error() {
        let mut table = EdgeTable::new();
        assert!(matches!(
            table.increment(123),
            Err(Error::KeyNotFound(_, _))
        ));
    }

    #[test]
    fn test_remove() {
        let mut table = EdgeTable::new();
        table.check_then_update(9);
        table.check_then_update(9);
        let removed = table.remove(9).unwrap();
        assert_eq!(removed, EdgeRecord { hash: 9, count: 2 });
        assert!(table.lookup(9).is_none());
        assert!(table.remove(9).is_none());
    }

    #[test]
    fn test_clear_resets_counts() {
        let mut table = EdgeTable::new();
        for hash in [1_u32, 2, 3] {
            table.check_then_update(hash);
            table.check_then_update(hash);
        }
        table.clear();
        assert!(table.is_empty());
        for hash in [1_u32, 2, 3] {
            assert!(table.lookup(hash).is_none());
        }
        // a cleared hash starts over as if never seen
        table.check_then_update(2);
        assert_eq!(table.lookup(2).unwrap().count(), 1);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut table = EdgeTable::new();
        table.check_then_update(5);
        table.check_then_update(5);
        table.check_then_update(8);
        let json = serde_json::to_string(&table).unwrap();
        let restored: EdgeTable = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.lookup(5).unwrap().count(), 2);
        assert_eq!(restored.lookup(8).unwrap().count(), 1);
    }

    #[test]
    fn test_shared_no_lost_updates() {
        const THREADS: usize = 8;
        const HITS: usize = 1000;

        let table = SharedEdgeTable::new();
        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    for _ in 0..HITS {
                        table.check_then_update(0xabcd);
                    }
                });
            }
        });
        assert_eq!(
            table.lookup(0xabcd).unwrap().count(),
            (THREADS * HITS) as u64
        );
        assert_eq!(table.into_inner().len(), 1);
    }
}
