//! Row storage.
//!
//! A [`Table`] is a dense array of tuples with an explicit power-of-two
//! capacity, an optional row-set enforcing set semantics, at most one
//! [`KeyIndex`], and any number of [`GeneralIndex`]es. Appending is O(1);
//! every index is notified after a successful append. Overflow either
//! doubles the array or, when a reclamation test is installed, compacts it
//! first and only doubles when the surviving load is still too high.
//!
//! Row identifiers are `u32` with two reserved sentinels at the top of the
//! range: [`NO_ROW`] means end-of-list / not-found, [`DELETED_ROW`] marks a
//! hash bucket whose list is currently empty but which still occupies its
//! probe chain.

pub mod general_index;
pub mod key_index;

pub use general_index::GeneralIndex;
pub use key_index::KeyIndex;

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};
use crate::value::Tuple;

/// Row identifier within one table.
pub type RowId = u32;

/// End-of-list / not-found sentinel.
pub const NO_ROW: RowId = u32::MAX;

/// Bucket-allocated-but-empty sentinel.
pub const DELETED_ROW: RowId = u32::MAX - 1;

/// Whether a row id denotes an actual row rather than a sentinel.
#[inline]
pub fn valid_row(row: RowId) -> bool {
    row < DELETED_ROW
}

/// Deterministic value hashing shared by all index structures. `DefaultHasher`
/// with its fixed initial state keeps bucket layout reproducible across runs.
pub(crate) fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn next_power_of_two(n: usize) -> usize {
    n.max(4).next_power_of_two()
}

/// Open-addressed set of live row numbers, used to enforce row uniqueness at
/// insertion time. Probes compare the actual tuples in the host table.
struct RowSet {
    buckets: Vec<RowId>,
    mask: usize,
}

impl RowSet {
    fn new(table_capacity: usize) -> RowSet {
        let bucket_count = 2 * table_capacity;
        RowSet {
            buckets: vec![NO_ROW; bucket_count],
            mask: bucket_count - 1,
        }
    }

    fn find(&self, tuple: &Tuple, rows: &[Tuple]) -> Option<RowId> {
        let mut b = hash_value(tuple) as usize & self.mask;
        loop {
            let r = self.buckets[b];
            if r == NO_ROW {
                return None;
            }
            if r != DELETED_ROW && rows[r as usize] == *tuple {
                return Some(r);
            }
            b = (b + 1) & self.mask;
        }
    }

    /// Caller guarantees the tuple is not already present.
    fn insert(&mut self, row: RowId, rows: &[Tuple]) {
        let mut b = hash_value(&rows[row as usize]) as usize & self.mask;
        while valid_row(self.buckets[b]) {
            b = (b + 1) & self.mask;
        }
        self.buckets[b] = row;
    }

    fn remove(&mut self, row: RowId, rows: &[Tuple]) {
        let mut b = hash_value(&rows[row as usize]) as usize & self.mask;
        loop {
            let r = self.buckets[b];
            if r == NO_ROW {
                return;
            }
            if r == row {
                self.buckets[b] = DELETED_ROW;
                return;
            }
            b = (b + 1) & self.mask;
        }
    }

    fn rebuild(&mut self, rows: &[Tuple], table_capacity: usize) {
        let bucket_count = 2 * table_capacity;
        self.buckets = vec![NO_ROW; bucket_count];
        self.mask = bucket_count - 1;
        for row in 0..rows.len() {
            self.insert(row as RowId, rows);
        }
    }
}

/// Reclamation test: rows for which it returns true may be dropped when the
/// table overflows.
pub type ReclaimFn = Box<dyn Fn(&Tuple) -> bool>;

/// Dense tuple storage with attached indices.
pub struct Table {
    name: String,
    data: Vec<Tuple>,
    capacity: usize,
    row_set: Option<RowSet>,
    key_index: Option<KeyIndex>,
    indices: Vec<GeneralIndex>,
    reclaim: Option<ReclaimFn>,
    post_compaction_target_load: f64,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("rows", &self.data.len())
            .field("capacity", &self.capacity)
            .field("unique", &self.row_set.is_some())
            .field("indices", &self.indices.len())
            .finish()
    }
}

impl Table {
    pub fn new(name: impl Into<String>, initial_capacity: usize) -> Table {
        Table {
            name: name.into(),
            data: Vec::new(),
            capacity: next_power_of_two(initial_capacity),
            row_set: None,
            key_index: None,
            indices: Vec::new(),
            reclaim: None,
            post_compaction_target_load: 0.5,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn row(&self, row: RowId) -> &Tuple {
        &self.data[row as usize]
    }

    pub fn rows(&self) -> &[Tuple] {
        &self.data
    }

    pub fn is_unique(&self) -> bool {
        self.row_set.is_some()
    }

    /// Enforce set semantics: a row equal to a live row is silently dropped
    /// on insert (the append is rolled back, no index sees it).
    pub fn set_unique(&mut self, unique: bool) {
        if unique {
            let mut set = RowSet::new(self.capacity);
            for row in 0..self.data.len() {
                set.insert(row as RowId, &self.data);
            }
            self.row_set = Some(set);
        } else {
            self.row_set = None;
        }
    }

    /// Install the overflow reclamation test.
    pub fn set_reclaim(&mut self, test: ReclaimFn) {
        self.reclaim = Some(test);
    }

    pub fn set_post_compaction_target_load(&mut self, load: f64) {
        self.post_compaction_target_load = load;
    }

    pub fn key_index(&self) -> Option<&KeyIndex> {
        self.key_index.as_ref()
    }

    pub fn general_indices(&self) -> &[GeneralIndex] {
        &self.indices
    }

    pub fn general_index(&self, position: usize) -> &GeneralIndex {
        &self.indices[position]
    }

    /// General index over `column`, if one was declared.
    pub fn general_index_on(&self, column: usize) -> Option<&GeneralIndex> {
        self.indices.iter().find(|ix| ix.column() == column)
    }

    /// Declare the key index. Existing rows are indexed immediately.
    pub fn add_key_index(&mut self, columns: Vec<usize>) -> Result<()> {
        if self.key_index.is_some() {
            return Err(Error::IndexExists {
                predicate: self.name.clone(),
                columns: format!("{columns:?}"),
            });
        }
        let mut index = KeyIndex::new(columns, self.capacity);
        for (row, tuple) in self.data.iter().enumerate() {
            let key = index.project(tuple);
            index.add(key, row as RowId).map_err(|key| Error::DuplicateKey {
                predicate: self.name.clone(),
                key: key.to_string(),
            })?;
        }
        self.key_index = Some(index);
        Ok(())
    }

    /// Declare a general index over one column. `variant_count` switches the
    /// index to direct addressing for enumerated columns; `mutable`
    /// materializes back-links so rows can later be removed or replaced.
    pub fn add_general_index(
        &mut self,
        column: usize,
        variant_count: Option<usize>,
        mutable: bool,
    ) -> Result<()> {
        if self.indices.iter().any(|ix| ix.column() == column) {
            return Err(Error::IndexExists {
                predicate: self.name.clone(),
                columns: format!("[{column}]"),
            });
        }
        let mut index = match variant_count {
            Some(n) => GeneralIndex::new_enumerated(column, n, self.capacity, mutable),
            None => GeneralIndex::new(column, self.capacity, mutable),
        };
        index.reindex(&self.data);
        self.indices.push(index);
        Ok(())
    }

    /// Override the preprocessor priority of the index over `column` (the key
    /// index when `column` is among its key columns).
    pub fn set_index_priority(&mut self, column: usize, priority: u32) {
        if let Some(ki) = &mut self.key_index {
            if ki.columns.contains(&column) {
                ki.priority = priority;
            }
        }
        for ix in &mut self.indices {
            if ix.column() == column {
                ix.priority = priority;
            }
        }
    }

    /// Row holding `key` through the key index, or `NO_ROW`.
    pub fn row_with_key(&self, key: &Tuple) -> Result<RowId> {
        match &self.key_index {
            Some(ki) => Ok(ki.row_with_key(key)),
            None => Err(Error::KeyIndexRequired(self.name.clone())),
        }
    }

    /// Append a row. Returns `None` when uniqueness dropped it as a
    /// duplicate. A duplicate key is an error that leaves the table exactly
    /// as it was.
    pub fn add(&mut self, row: Tuple) -> Result<Option<RowId>> {
        if self.data.len() == self.capacity {
            self.make_room()?;
        }
        if let Some(ki) = &self.key_index {
            let key = ki.project(&row);
            if ki.row_with_key(&key) != NO_ROW {
                return Err(Error::DuplicateKey {
                    predicate: self.name.clone(),
                    key: key.to_string(),
                });
            }
        }
        if let Some(set) = &self.row_set {
            if set.find(&row, &self.data).is_some() {
                return Ok(None);
            }
        }

        let id = self.data.len() as RowId;
        self.data.push(row);
        if let Some(set) = &mut self.row_set {
            set.insert(id, &self.data);
        }
        if let Some(ki) = &mut self.key_index {
            let key = self.data[id as usize].project(&ki.columns);
            // Infallible: presence was checked above.
            let _ = ki.add(key, id);
        }
        for ix in &mut self.indices {
            ix.add(id, &self.data);
        }
        Ok(Some(id))
    }

    /// Append, or overwrite the row that already holds this row's key.
    /// Requires the key index.
    pub fn add_or_replace(&mut self, row: Tuple) -> Result<RowId> {
        let ki = self
            .key_index
            .as_ref()
            .ok_or_else(|| Error::KeyIndexRequired(self.name.clone()))?;
        let key = ki.project(&row);
        let existing = ki.row_with_key(&key);
        if existing == NO_ROW {
            match self.add(row)? {
                Some(id) => Ok(id),
                // Uniqueness dropped an identical row; it must carry this key.
                None => self.row_with_key(&key),
            }
        } else {
            self.replace_row(existing, row)?;
            Ok(existing)
        }
    }

    /// Overwrite a live row in place, keeping every index consistent.
    pub fn replace_row(&mut self, row: RowId, new_row: Tuple) -> Result<()> {
        let slot = row as usize;

        if let Some(set) = &self.row_set {
            if let Some(other) = set.find(&new_row, &self.data) {
                if other != row {
                    // Set semantics: the replacement would collide with
                    // another live row, so it is dropped like a duplicate add.
                    return Ok(());
                }
            }
        }

        if let Some(ki) = &mut self.key_index {
            let old_key = self.data[slot].project(&ki.columns);
            let new_key = new_row.project(&ki.columns);
            if old_key != new_key {
                if ki.row_with_key(&new_key) != NO_ROW {
                    return Err(Error::DuplicateKey {
                        predicate: self.name.clone(),
                        key: new_key.to_string(),
                    });
                }
                ki.remove(&old_key);
                let _ = ki.add(new_key, row);
            }
        }

        for ix in &mut self.indices {
            ix.remove(row, &self.data)?;
        }
        if let Some(set) = &mut self.row_set {
            set.remove(row, &self.data);
        }
        self.data[slot] = new_row;
        if let Some(set) = &mut self.row_set {
            set.insert(row, &self.data);
        }
        for ix in &mut self.indices {
            ix.add(row, &self.data);
        }
        Ok(())
    }

    /// Overwrite one column of a live row.
    pub fn update_column(&mut self, row: RowId, column: usize, value: crate::value::Value) -> Result<()> {
        let mut new_row = self.data[row as usize].clone();
        new_row.set(column, value);
        self.replace_row(row, new_row)
    }

    /// Index-aware removal. The last row is swapped into the vacated slot,
    /// so removal does not preserve row order.
    pub fn remove(&mut self, row: RowId) -> Result<()> {
        if row as usize >= self.data.len() {
            return Err(Error::RowNotIndexed(row));
        }
        let last = (self.data.len() - 1) as RowId;

        for ix in &mut self.indices {
            ix.remove(row, &self.data)?;
        }
        if let Some(ki) = &mut self.key_index {
            let key = self.data[row as usize].project(&ki.columns);
            ki.remove(&key);
        }
        if let Some(set) = &mut self.row_set {
            set.remove(row, &self.data);
        }

        if row != last {
            for ix in &mut self.indices {
                ix.remove(last, &self.data)?;
            }
            if let Some(set) = &mut self.row_set {
                set.remove(last, &self.data);
            }
            let moved = match self.data.pop() {
                Some(t) => t,
                None => return Ok(()),
            };
            self.data[row as usize] = moved;
            if let Some(set) = &mut self.row_set {
                set.insert(row, &self.data);
            }
            if let Some(ki) = &mut self.key_index {
                let key = self.data[row as usize].project(&ki.columns);
                ki.reseat(&key, row);
            }
            for ix in &mut self.indices {
                ix.add(row, &self.data);
            }
        } else {
            self.data.pop();
        }
        Ok(())
    }

    /// Drop every row; capacity and index declarations survive.
    pub fn clear(&mut self) {
        self.data.clear();
        if let Some(set) = &mut self.row_set {
            set.rebuild(&self.data, self.capacity);
        }
        if let Some(ki) = &mut self.key_index {
            ki.clear();
        }
        for ix in &mut self.indices {
            ix.clear();
        }
    }

    /// Drop all rows passing the reclamation test, preserving survivor
    /// order, then rebuild the row-set and every index. Doubles the array
    /// when survivors still load it above the post-compaction target.
    pub fn reclaim_now(&mut self) {
        let keep: Vec<bool> = match &self.reclaim {
            Some(test) => self.data.iter().map(|row| !test(row)).collect(),
            None => return,
        };
        let mut survivors = Vec::with_capacity(self.capacity);
        for (i, row) in self.data.drain(..).enumerate() {
            if keep[i] {
                survivors.push(row);
            }
        }
        let load = survivors.len() as f64 / self.capacity as f64;
        if load > self.post_compaction_target_load {
            self.capacity *= 2;
        }
        self.data = survivors;
        self.rebuild_auxiliary();
    }

    fn make_room(&mut self) -> Result<()> {
        if self.reclaim.is_some() {
            self.reclaim_now();
            if self.data.len() < self.capacity {
                return Ok(());
            }
        }
        self.expand();
        Ok(())
    }

    fn expand(&mut self) {
        self.capacity *= 2;
        self.data.reserve(self.capacity - self.data.len());
        self.rebuild_auxiliary();
    }

    fn rebuild_auxiliary(&mut self) {
        if let Some(set) = &mut self.row_set {
            set.rebuild(&self.data, self.capacity);
        }
        if let Some(ki) = &mut self.key_index {
            ki.rebuild(&self.data, self.capacity);
        }
        for ix in &mut self.indices {
            ix.expand(self.capacity, &self.data);
        }
    }
}
