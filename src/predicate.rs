//! Predicates: named, typed relations.
//!
//! A predicate owns its table, its compiled rules, and three composable
//! update sources: initial-value rows (applied on the first update), an
//! input buffer (merged additively each tick), and keyed column updates
//! (applied at end of tick through the key index).
//!
//! Predicates live in the program's arena and reference each other by
//! [`PredicateId`]; rules hold ids, never pointers, and resolve them at
//! call time.

use crate::error::{Error, Result};
use crate::eval::CompiledRule;
use crate::table::Table;
use crate::value::{DataType, Tuple, TupleSchema, Value};

/// Stable arena key of a predicate within one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredicateId(u32);

impl PredicateId {
    pub(crate) fn from_index(index: usize) -> PredicateId {
        PredicateId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Whether the scheduler brings the predicate up to date each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    /// Never changes after construction; the scheduler skips it
    Static,
    /// Recomputed or merged every tick
    Dynamic,
}

/// One pending keyed column mutation, applied at end of tick.
#[derive(Debug, Clone)]
pub struct ColumnUpdate {
    pub column: usize,
    pub key: Tuple,
    pub value: Value,
}

/// A named, typed relation with its storage and rules.
pub struct Predicate {
    id: PredicateId,
    name: String,
    schema: TupleSchema,
    table: Table,
    timing: Timing,
    pub(crate) rules: Vec<CompiledRule>,
    pub(crate) initially: Vec<Tuple>,
    pub(crate) pending_inputs: Vec<Tuple>,
    pub(crate) pending_updates: Vec<ColumnUpdate>,
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predicate")
            .field("name", &self.name)
            .field("arity", &self.schema.arity())
            .field("timing", &self.timing)
            .field("rules", &self.rules.len())
            .field("rows", &self.table.len())
            .finish()
    }
}

impl Predicate {
    pub(crate) fn new(
        id: PredicateId,
        name: String,
        schema: TupleSchema,
        timing: Timing,
        initial_capacity: usize,
    ) -> Predicate {
        let table = Table::new(name.clone(), initial_capacity);
        Predicate {
            id,
            name,
            schema,
            table,
            timing,
            rules: Vec::new(),
            initially: Vec::new(),
            pending_inputs: Vec::new(),
            pending_updates: Vec::new(),
        }
    }

    pub fn id(&self) -> PredicateId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &TupleSchema {
        &self.schema
    }

    pub fn arity(&self) -> usize {
        self.schema.arity()
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn is_dynamic(&self) -> bool {
        self.timing == Timing::Dynamic
    }

    /// Intensional predicates are derived by rules; extensional ones are
    /// populated by the host.
    pub fn is_intensional(&self) -> bool {
        !self.rules.is_empty()
    }

    pub fn is_extensional(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut Table {
        &mut self.table
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn rows(&self) -> &[Tuple] {
        self.table.rows()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Position of a named column.
    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.schema
            .field_index(column)
            .ok_or_else(|| Error::UnknownColumn {
                predicate: self.name.clone(),
                column: column.to_string(),
            })
    }

    /// Variant count when the column is an enumeration, for direct-addressed
    /// indices.
    pub(crate) fn enum_variant_count(&self, column: usize) -> Option<usize> {
        match self.schema.field_type(column) {
            Some(DataType::Enum(ty)) => Some(ty.len()),
            _ => None,
        }
    }

    pub(crate) fn validate_row(&self, row: &Tuple) -> Result<()> {
        self.schema.validate(row)
    }
}
