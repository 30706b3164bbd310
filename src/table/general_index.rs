//! Multi-valued hash index.
//!
//! Open-addressed table of `(value, first_row, count)` buckets. Rows sharing
//! a column value are singly linked through `next_row`; when mutation is
//! enabled a `prev_row` array is kept alongside so unlinking is O(1).
//!
//! A bucket whose list empties is tombstoned with `DELETED_ROW` rather than
//! freed, because freeing would break probe chains. Once more than a quarter
//! of the buckets are tombstones, the next insertion clears and reindexes.
//!
//! Enumerated columns skip hashing entirely: the bucket array is addressed
//! by ordinal and never resized.

use crate::error::{Error, Result};
use crate::table::{hash_value, valid_row, RowId, DELETED_ROW, NO_ROW};
use crate::value::{Tuple, Value};

#[derive(Debug, Clone)]
struct ValueBucket {
    value: Value,
    first: RowId,
    count: u32,
}

impl ValueBucket {
    fn empty() -> ValueBucket {
        ValueBucket {
            value: Value::Null,
            first: NO_ROW,
            count: 0,
        }
    }
}

/// Hash index from one column to the list of rows holding each value.
#[derive(Debug)]
pub struct GeneralIndex {
    pub(crate) column: usize,
    buckets: Vec<ValueBucket>,
    next_row: Vec<RowId>,
    prev_row: Option<Vec<RowId>>,
    mask: usize,
    enum_direct: bool,
    complete_deletions: u32,
    pub(crate) priority: u32,
}

impl GeneralIndex {
    /// Default preprocessor priority for single-column general indices.
    pub const DEFAULT_PRIORITY: u32 = 100;

    /// Hashed index over `column`. `mutable` materializes back-links so rows
    /// can be unlinked in place.
    pub fn new(column: usize, table_capacity: usize, mutable: bool) -> GeneralIndex {
        let bucket_count = 2 * table_capacity;
        GeneralIndex {
            column,
            buckets: vec![ValueBucket::empty(); bucket_count],
            next_row: vec![NO_ROW; table_capacity],
            prev_row: mutable.then(|| vec![NO_ROW; table_capacity]),
            mask: bucket_count - 1,
            enum_direct: false,
            complete_deletions: 0,
            priority: Self::DEFAULT_PRIORITY,
        }
    }

    /// Direct-addressed index for an enumerated column: one bucket per
    /// ordinal, no hashing, all-ones mask.
    pub fn new_enumerated(
        column: usize,
        variant_count: usize,
        table_capacity: usize,
        mutable: bool,
    ) -> GeneralIndex {
        GeneralIndex {
            column,
            buckets: vec![ValueBucket::empty(); variant_count],
            next_row: vec![NO_ROW; table_capacity],
            prev_row: mutable.then(|| vec![NO_ROW; table_capacity]),
            mask: usize::MAX,
            enum_direct: true,
            complete_deletions: 0,
            priority: Self::DEFAULT_PRIORITY,
        }
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn mask(&self) -> usize {
        self.mask
    }

    pub fn is_enum_direct(&self) -> bool {
        self.enum_direct
    }

    pub fn is_mutable(&self) -> bool {
        self.prev_row.is_some()
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// First row whose column holds `value`, or `NO_ROW`. A tombstoned
    /// bucket reads as empty.
    pub fn first_row_with_value(&self, value: &Value) -> RowId {
        match self.find_bucket(value) {
            Some(b) => {
                let first = self.buckets[b].first;
                if valid_row(first) {
                    first
                } else {
                    NO_ROW
                }
            }
            None => NO_ROW,
        }
    }

    /// Successor of `row` in its value list.
    pub fn next_row_with_value(&self, row: RowId) -> RowId {
        self.next_row[row as usize]
    }

    /// Number of rows currently holding `value`.
    pub fn count_with_value(&self, value: &Value) -> u32 {
        match self.find_bucket(value) {
            Some(b) if valid_row(self.buckets[b].first) => self.buckets[b].count,
            _ => 0,
        }
    }

    fn bucket_slot(&self, value: &Value) -> usize {
        if self.enum_direct {
            value.ordinal().unwrap_or(0) as usize
        } else {
            hash_value(value) as usize & self.mask
        }
    }

    /// Bucket currently holding `value`, if any.
    fn find_bucket(&self, value: &Value) -> Option<usize> {
        if self.enum_direct {
            let slot = self.bucket_slot(value);
            return (slot < self.buckets.len()).then_some(slot);
        }
        let mut b = self.bucket_slot(value);
        loop {
            let bucket = &self.buckets[b];
            if bucket.first == NO_ROW {
                return None;
            }
            if bucket.first != DELETED_ROW && bucket.value == *value {
                return Some(b);
            }
            b = (b + 1) & self.mask;
        }
    }

    /// Bucket holding `value`, or the slot where it should be created.
    /// The first tombstone along the probe chain is reused when the value is
    /// not already present.
    fn find_or_allocate_bucket(&mut self, value: &Value) -> usize {
        if self.enum_direct {
            let slot = self.bucket_slot(value);
            if !valid_row(self.buckets[slot].first) {
                self.buckets[slot] = ValueBucket {
                    value: value.clone(),
                    first: NO_ROW,
                    count: 0,
                };
            }
            return slot;
        }
        let mut b = self.bucket_slot(value);
        let mut reuse = None;
        loop {
            let bucket = &self.buckets[b];
            if bucket.first == NO_ROW {
                break;
            }
            if bucket.first == DELETED_ROW {
                reuse.get_or_insert(b);
            } else if bucket.value == *value {
                return b;
            }
            b = (b + 1) & self.mask;
        }
        let slot = reuse.unwrap_or(b);
        if self.buckets[slot].first == DELETED_ROW {
            self.complete_deletions = self.complete_deletions.saturating_sub(1);
        }
        self.buckets[slot] = ValueBucket {
            value: value.clone(),
            first: NO_ROW,
            count: 0,
        };
        slot
    }

    /// Link freshly appended `row` into its value list. `rows` is the host
    /// table's data array, which already contains the row.
    pub(crate) fn add(&mut self, row: RowId, rows: &[Tuple]) {
        if !self.enum_direct && self.complete_deletions as usize > self.buckets.len() / 4 {
            self.reindex(&rows[..row as usize]);
        }
        let value = rows[row as usize][self.column].clone();
        let slot = self.find_or_allocate_bucket(&value);
        let bucket = &mut self.buckets[slot];
        let old_first = if valid_row(bucket.first) {
            bucket.first
        } else {
            NO_ROW
        };
        bucket.first = row;
        bucket.count += 1;
        self.next_row[row as usize] = old_first;
        if let Some(prev) = &mut self.prev_row {
            prev[row as usize] = NO_ROW;
            if old_first != NO_ROW {
                prev[old_first as usize] = row;
            }
        }
    }

    /// Unlink `row` from its value list. Requires back-links. Removing a row
    /// that is not in the index is an error, never silent corruption.
    pub(crate) fn remove(&mut self, row: RowId, rows: &[Tuple]) -> Result<()> {
        if self.prev_row.is_none() {
            return Err(Error::RowNotIndexed(row));
        }
        let value = &rows[row as usize][self.column];
        let slot = match self.find_bucket(value) {
            Some(b) if valid_row(self.buckets[b].first) => b,
            _ => return Err(Error::RowNotIndexed(row)),
        };
        let prev = match &mut self.prev_row {
            Some(prev) => prev,
            None => return Err(Error::RowNotIndexed(row)),
        };

        let before = prev[row as usize];
        let after = self.next_row[row as usize];
        if before == NO_ROW {
            if self.buckets[slot].first != row {
                return Err(Error::RowNotIndexed(row));
            }
            self.buckets[slot].first = after;
        } else {
            self.next_row[before as usize] = after;
        }
        if after != NO_ROW {
            prev[after as usize] = before;
        }
        prev[row as usize] = NO_ROW;
        self.next_row[row as usize] = NO_ROW;

        let bucket = &mut self.buckets[slot];
        bucket.count -= 1;
        if bucket.first == NO_ROW {
            bucket.first = DELETED_ROW;
            bucket.count = 0;
            self.complete_deletions += 1;
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.fill_with(ValueBucket::empty);
        self.next_row.fill(NO_ROW);
        if let Some(prev) = &mut self.prev_row {
            prev.fill(NO_ROW);
        }
        self.complete_deletions = 0;
    }

    /// Drop all buckets and relink every live row.
    pub(crate) fn reindex(&mut self, rows: &[Tuple]) {
        self.clear();
        for row in 0..rows.len() {
            let value = rows[row][self.column].clone();
            let slot = self.find_or_allocate_bucket(&value);
            let bucket = &mut self.buckets[slot];
            let old_first = if valid_row(bucket.first) {
                bucket.first
            } else {
                NO_ROW
            };
            bucket.first = row as RowId;
            bucket.count += 1;
            self.next_row[row] = old_first;
            if let Some(prev) = &mut self.prev_row {
                prev[row] = NO_ROW;
                if old_first != NO_ROW {
                    prev[old_first as usize] = row as RowId;
                }
            }
        }
    }

    /// Track a table expansion to `new_capacity`. Hashed buckets double and
    /// relink; enum-direct buckets never resize, only the row links grow.
    pub(crate) fn expand(&mut self, new_capacity: usize, rows: &[Tuple]) {
        self.next_row.resize(new_capacity, NO_ROW);
        if let Some(prev) = &mut self.prev_row {
            prev.resize(new_capacity, NO_ROW);
        }
        if !self.enum_direct {
            let bucket_count = 2 * new_capacity;
            self.buckets = vec![ValueBucket::empty(); bucket_count];
            self.mask = bucket_count - 1;
            self.complete_deletions = 0;
            self.reindex(rows);
        }
    }

    /// Distinct values present, in bucket order (declaration order for
    /// enum-direct indices).
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.buckets
            .iter()
            .filter(|b| valid_row(b.first))
            .map(|b| &b.value)
    }

    /// Distinct values with their row counts.
    pub fn counts_by_key(&self) -> impl Iterator<Item = (&Value, u32)> {
        self.buckets
            .iter()
            .filter(|b| valid_row(b.first))
            .map(|b| (&b.value, b.count))
    }

    /// Distinct values with their first row and count.
    pub fn key_info(&self) -> impl Iterator<Item = (&Value, RowId, u32)> {
        self.buckets
            .iter()
            .filter(|b| valid_row(b.first))
            .map(|b| (&b.value, b.first, b.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::EnumType;

    fn rows(values: &[i64]) -> Vec<Tuple> {
        values.iter().map(|&v| Tuple::new(vec![Value::Int(v)])).collect()
    }

    fn collect_list(index: &GeneralIndex, value: &Value) -> Vec<RowId> {
        let mut out = Vec::new();
        let mut r = index.first_row_with_value(value);
        while r != NO_ROW {
            out.push(r);
            r = index.next_row_with_value(r);
        }
        out
    }

    #[test]
    fn test_lists_group_rows_by_value() {
        let data = rows(&[1, 2, 1, 3, 1]);
        let mut index = GeneralIndex::new(0, 8, false);
        for i in 0..data.len() {
            index.add(i as RowId, &data);
        }

        // Prepending reverses insertion order within a value.
        assert_eq!(collect_list(&index, &Value::Int(1)), vec![4, 2, 0]);
        assert_eq!(collect_list(&index, &Value::Int(2)), vec![1]);
        assert_eq!(index.count_with_value(&Value::Int(1)), 3);
        assert_eq!(index.count_with_value(&Value::Int(9)), 0);
    }

    #[test]
    fn test_remove_unlinks_in_place() {
        let data = rows(&[7, 7, 7]);
        let mut index = GeneralIndex::new(0, 8, true);
        for i in 0..data.len() {
            index.add(i as RowId, &data);
        }

        index.remove(1, &data).unwrap();
        assert_eq!(collect_list(&index, &Value::Int(7)), vec![2, 0]);
        assert_eq!(index.count_with_value(&Value::Int(7)), 2);

        // Double deletion is an error, not corruption.
        assert!(index.remove(1, &data).is_err());

        index.remove(2, &data).unwrap();
        index.remove(0, &data).unwrap();
        assert_eq!(index.first_row_with_value(&Value::Int(7)), NO_ROW);
    }

    #[test]
    fn test_remove_without_back_links_is_error() {
        let data = rows(&[1]);
        let mut index = GeneralIndex::new(0, 8, false);
        index.add(0, &data);
        assert!(index.remove(0, &data).is_err());
    }

    #[test]
    fn test_enum_direct_buckets_by_ordinal() {
        let color = EnumType::new("Color", ["Red", "Green", "Blue"]);
        let data: Vec<Tuple> = ["Blue", "Red", "Blue"]
            .iter()
            .map(|v| Tuple::new(vec![Value::enumeration(&color, v).unwrap()]))
            .collect();

        let mut index = GeneralIndex::new_enumerated(0, color.len(), 8, false);
        assert_eq!(index.bucket_count(), 3);
        assert_eq!(index.mask(), usize::MAX);
        for i in 0..data.len() {
            index.add(i as RowId, &data);
        }

        let blue = Value::enumeration(&color, "Blue").unwrap();
        assert_eq!(collect_list(&index, &blue), vec![2, 0]);

        // Keys walk in declaration order, not insertion order.
        let keys: Vec<String> = index.keys().map(|v| v.to_string()).collect();
        assert_eq!(keys, vec!["Red", "Blue"]);

        // Expansion leaves the bucket array alone.
        let expanded: Vec<Tuple> = data.clone();
        index.expand(16, &expanded);
        assert_eq!(index.bucket_count(), 3);
        assert_eq!(collect_list(&index, &blue), vec![2, 0]);
    }

    #[test]
    fn test_expand_relinks_hashed_buckets() {
        let data = rows(&[1, 2, 1, 2, 5, 1]);
        let mut index = GeneralIndex::new(0, 8, false);
        for i in 0..data.len() {
            index.add(i as RowId, &data);
        }

        index.expand(16, &data);
        assert_eq!(index.bucket_count(), 32);
        assert_eq!(index.mask(), 31);
        assert_eq!(collect_list(&index, &Value::Int(1)), vec![5, 2, 0]);
        assert_eq!(index.count_with_value(&Value::Int(2)), 2);
    }
}
