//! One in-memory table with a primary key and secondary indexes.

use cardio_uuid::ShardableUuid;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A persisted row type.
pub trait Row: Clone + Debug + Serialize + DeserializeOwned + Send + Sync {
    /// Folder name under the data directory.
    const TABLE: &'static str;

    type Key: Copy + Eq + Hash + Debug + Display + Send + Sync;

    fn key(&self) -> Self::Key;

    /// UUID used to derive the sharded on-disk directory.
    fn shard(&self) -> ShardableUuid;

    /// Creation time; reloaded rows are re-ordered by it.
    fn created_at(&self) -> DateTime<Utc>;

    /// `(index name, value)` pairs this row is reachable by.
    fn index_entries(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Rows in insertion order plus lookup structures.
///
/// Index buckets hold row positions in ascending order, so every lookup yields rows oldest
/// first.
#[derive(Debug)]
pub struct Table<T: Row> {
    rows: Vec<T>,
    positions: HashMap<T::Key, usize>,
    indexes: HashMap<&'static str, HashMap<String, Vec<usize>>>,
}

impl<T: Row> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            positions: HashMap::new(),
            indexes: HashMap::new(),
        }
    }
}

impl<T: Row> Table<T> {
    /// Builds a table from rows read back from disk.
    pub(crate) fn from_rows(mut rows: Vec<T>) -> Self {
        rows.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.key().to_string().cmp(&b.key().to_string()))
        });
        let mut table = Self::default();
        for row in rows {
            table.upsert(row);
        }
        table
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.positions.get(key).map(|&pos| &self.rows[pos])
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.positions.contains_key(key)
    }

    /// All rows, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose `index` entry equals `value`, oldest first.
    pub fn lookup<'a>(
        &'a self,
        index: &str,
        value: &str,
    ) -> impl DoubleEndedIterator<Item = &'a T> + 'a {
        self.indexes
            .get(index)
            .and_then(|bucket| bucket.get(value))
            .map(|positions| positions.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&pos| &self.rows[pos])
    }

    pub fn first_by(&self, index: &str, value: &str) -> Option<&T> {
        self.lookup(index, value).next()
    }

    pub fn latest_by(&self, index: &str, value: &str) -> Option<&T> {
        self.lookup(index, value).next_back()
    }

    pub fn count_by(&self, index: &str, value: &str) -> usize {
        self.indexes
            .get(index)
            .and_then(|bucket| bucket.get(value))
            .map_or(0, Vec::len)
    }

    /// Inserts a new row or replaces the row with the same key, keeping its position.
    pub(crate) fn upsert(&mut self, row: T) {
        let key = row.key();
        let pos = match self.positions.get(&key) {
            Some(&pos) => {
                let old_entries = self.rows[pos].index_entries();
                self.unindex(pos, old_entries);
                self.rows[pos] = row;
                pos
            }
            None => {
                self.rows.push(row);
                let pos = self.rows.len() - 1;
                self.positions.insert(key, pos);
                pos
            }
        };

        for (index, value) in self.rows[pos].index_entries() {
            let bucket = self
                .indexes
                .entry(index)
                .or_default()
                .entry(value)
                .or_default();
            if let Err(slot) = bucket.binary_search(&pos) {
                bucket.insert(slot, pos);
            }
        }
    }

    fn unindex(&mut self, pos: usize, entries: Vec<(&'static str, String)>) {
        for (index, value) in entries {
            if let Some(bucket) = self.indexes.get_mut(index) {
                if let Some(positions) = bucket.get_mut(&value) {
                    positions.retain(|&p| p != pos);
                    if positions.is_empty() {
                        bucket.remove(&value);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde::Deserialize;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        id: ShardableUuid,
        owner: String,
        created_at: DateTime<Utc>,
    }

    impl Row for Note {
        const TABLE: &'static str = "notes";
        type Key = ShardableUuid;

        fn key(&self) -> ShardableUuid {
            self.id
        }

        fn shard(&self) -> ShardableUuid {
            self.id
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn index_entries(&self) -> Vec<(&'static str, String)> {
            vec![("owner", self.owner.clone())]
        }
    }

    fn note(owner: &str, minutes: i64) -> Note {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        Note {
            id: ShardableUuid::new(),
            owner: owner.into(),
            created_at: base + Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_lookup_returns_rows_oldest_first() {
        let mut table = Table::default();
        let first = note("ada", 0);
        let second = note("ada", 1);
        table.upsert(first.clone());
        table.upsert(note("bob", 2));
        table.upsert(second.clone());

        let found: Vec<_> = table.lookup("owner", "ada").cloned().collect();
        assert_eq!(found, vec![first.clone(), second.clone()]);
        assert_eq!(table.first_by("owner", "ada"), Some(&first));
        assert_eq!(table.latest_by("owner", "ada"), Some(&second));
        assert_eq!(table.count_by("owner", "ada"), 2);
        assert_eq!(table.count_by("owner", "nobody"), 0);
    }

    #[test]
    fn test_upsert_replaces_and_reindexes() {
        let mut table = Table::default();
        let mut row = note("ada", 0);
        table.upsert(row.clone());

        row.owner = "bob".into();
        table.upsert(row.clone());

        assert_eq!(table.len(), 1);
        assert!(table.first_by("owner", "ada").is_none());
        assert_eq!(table.first_by("owner", "bob"), Some(&row));
        assert_eq!(table.get(&row.id), Some(&row));
    }

    #[test]
    fn test_from_rows_orders_by_creation_time() {
        let late = note("ada", 10);
        let early = note("ada", 1);
        let table = Table::from_rows(vec![late.clone(), early.clone()]);

        let ordered: Vec<_> = table.iter().cloned().collect();
        assert_eq!(ordered, vec![early, late]);
    }
}
