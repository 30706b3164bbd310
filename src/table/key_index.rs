//! Unique-key hash index.
//!
//! Open-addressed table of `(key, row)` pairs with linear probing. Bucket
//! count is twice the host table's capacity, so the load factor never
//! exceeds 0.5. A key maps to at most one live row.

use crate::table::{hash_value, RowId, DELETED_ROW, NO_ROW};
use crate::value::Tuple;

#[derive(Debug, Clone)]
struct KeyBucket {
    row: RowId,
    key: Tuple,
}

impl KeyBucket {
    fn empty() -> KeyBucket {
        KeyBucket {
            row: NO_ROW,
            key: Tuple::new(Vec::new()),
        }
    }
}

/// Hash index over one or more key columns; at most one row per key.
#[derive(Debug)]
pub struct KeyIndex {
    pub(crate) columns: Vec<usize>,
    buckets: Vec<KeyBucket>,
    mask: usize,
    pub(crate) priority: u32,
}

impl KeyIndex {
    /// Default preprocessor priority for key indices.
    pub const DEFAULT_PRIORITY: u32 = 1000;

    pub fn new(columns: Vec<usize>, table_capacity: usize) -> KeyIndex {
        let bucket_count = 2 * table_capacity;
        KeyIndex {
            columns,
            buckets: vec![KeyBucket::empty(); bucket_count],
            mask: bucket_count - 1,
            priority: Self::DEFAULT_PRIORITY,
        }
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn mask(&self) -> usize {
        self.mask
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Project the key tuple out of a row.
    pub fn project(&self, row: &Tuple) -> Tuple {
        row.project(&self.columns)
    }

    /// Row holding `key`, or `NO_ROW`.
    pub fn row_with_key(&self, key: &Tuple) -> RowId {
        let mut b = hash_value(key) as usize & self.mask;
        loop {
            let bucket = &self.buckets[b];
            if bucket.row == NO_ROW {
                return NO_ROW;
            }
            if bucket.row != DELETED_ROW && bucket.key == *key {
                return bucket.row;
            }
            b = (b + 1) & self.mask;
        }
    }

    /// Insert `key -> row`. Returns the key back when it is already present.
    pub(crate) fn add(&mut self, key: Tuple, row: RowId) -> Result<(), Tuple> {
        let mut b = hash_value(&key) as usize & self.mask;
        let mut reuse = None;
        loop {
            let bucket = &self.buckets[b];
            if bucket.row == NO_ROW {
                break;
            }
            if bucket.row == DELETED_ROW {
                reuse.get_or_insert(b);
            } else if bucket.key == key {
                return Err(key);
            }
            b = (b + 1) & self.mask;
        }
        let slot = reuse.unwrap_or(b);
        self.buckets[slot] = KeyBucket { row, key };
        Ok(())
    }

    /// Tombstone the bucket holding `key`. Returns whether it was present.
    pub(crate) fn remove(&mut self, key: &Tuple) -> bool {
        let mut b = hash_value(key) as usize & self.mask;
        loop {
            let bucket = &mut self.buckets[b];
            if bucket.row == NO_ROW {
                return false;
            }
            if bucket.row != DELETED_ROW && bucket.key == *key {
                *bucket = KeyBucket {
                    row: DELETED_ROW,
                    key: Tuple::new(Vec::new()),
                };
                return true;
            }
            b = (b + 1) & self.mask;
        }
    }

    /// Redirect an existing key to a different row (rows move on
    /// swap-removal). No-op when the key is absent.
    pub(crate) fn reseat(&mut self, key: &Tuple, row: RowId) {
        let mut b = hash_value(key) as usize & self.mask;
        loop {
            let bucket = &mut self.buckets[b];
            if bucket.row == NO_ROW {
                return;
            }
            if bucket.row != DELETED_ROW && bucket.key == *key {
                bucket.row = row;
                return;
            }
            b = (b + 1) & self.mask;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.fill_with(KeyBucket::empty);
    }

    /// Rebuild from scratch against a table of `new_capacity`. Every row of
    /// `rows` is live and keyed; duplicate keys cannot occur here because the
    /// table rejected them at insert time.
    pub(crate) fn rebuild(&mut self, rows: &[Tuple], new_capacity: usize) {
        let bucket_count = 2 * new_capacity;
        self.buckets = vec![KeyBucket::empty(); bucket_count];
        self.mask = bucket_count - 1;
        for (row, tuple) in rows.iter().enumerate() {
            let key = self.project(tuple);
            // Infallible: keys were unique before the rebuild.
            let _ = self.add(key, row as RowId);
        }
    }

    /// Live `(key, row)` entries, in bucket order.
    pub fn entries(&self) -> impl Iterator<Item = (&Tuple, RowId)> {
        self.buckets
            .iter()
            .filter(|b| b.row != NO_ROW && b.row != DELETED_ROW)
            .map(|b| (&b.key, b.row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn key(v: i64) -> Tuple {
        Tuple::new(vec![Value::Int(v)])
    }

    #[test]
    fn test_add_and_lookup() {
        let mut index = KeyIndex::new(vec![0], 8);
        assert_eq!(index.bucket_count(), 16);
        assert_eq!(index.mask(), 15);

        index.add(key(10), 0).unwrap();
        index.add(key(20), 1).unwrap();

        assert_eq!(index.row_with_key(&key(10)), 0);
        assert_eq!(index.row_with_key(&key(20)), 1);
        assert_eq!(index.row_with_key(&key(30)), NO_ROW);
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let mut index = KeyIndex::new(vec![0], 8);
        index.add(key(5), 0).unwrap();
        assert!(index.add(key(5), 1).is_err());
        assert_eq!(index.row_with_key(&key(5)), 0);
    }

    #[test]
    fn test_remove_and_reuse() {
        let mut index = KeyIndex::new(vec![0], 8);
        index.add(key(1), 0).unwrap();
        index.add(key(2), 1).unwrap();

        assert!(index.remove(&key(1)));
        assert!(!index.remove(&key(1)));
        assert_eq!(index.row_with_key(&key(1)), NO_ROW);
        assert_eq!(index.row_with_key(&key(2)), 1);

        index.add(key(3), 2).unwrap();
        assert_eq!(index.row_with_key(&key(3)), 2);
    }

    #[test]
    fn test_rebuild_doubles_buckets() {
        let rows: Vec<Tuple> = (0..8).map(|i| Tuple::new(vec![Value::Int(i)])).collect();
        let mut index = KeyIndex::new(vec![0], 8);
        for (i, row) in rows.iter().enumerate() {
            index.add(index.project(row), i as RowId).unwrap();
        }

        index.rebuild(&rows, 16);
        assert_eq!(index.bucket_count(), 32);
        for (i, _) in rows.iter().enumerate() {
            assert_eq!(index.row_with_key(&key(i as i64)), i as RowId);
        }
    }
}
