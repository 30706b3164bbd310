//! Engine Error Types
//!
//! Setup errors abort program construction; determinism errors (duplicate
//! keys) abort the running update and leave the offending table as it was
//! just before the offending insert; evaluation errors abort the rule and
//! propagate. There are no retries.

use std::io;
use thiserror::Error;

/// All diagnostics the engine can raise.
#[derive(Error, Debug)]
pub enum Error {
    /// A predicate with this name is already declared
    #[error("predicate '{0}' is already declared")]
    DuplicatePredicate(String),

    /// Predicate not found
    #[error("undefined predicate '{0}'")]
    UndefinedPredicate(String),

    /// Column not found in a predicate
    #[error("predicate '{predicate}' has no column '{column}'")]
    UnknownColumn { predicate: String, column: String },

    /// Goal argument count does not match the predicate
    #[error("predicate '{predicate}' takes {expected} arguments, got {got}")]
    ArityMismatch {
        predicate: String,
        expected: usize,
        got: usize,
    },

    /// Inserted row has the wrong number of columns
    #[error("row has {got} columns, expected {expected}")]
    RowArityMismatch { expected: usize, got: usize },

    /// Inserted value has the wrong type for its column
    #[error("column '{column}' expects {expected}, got {got}")]
    ColumnTypeMismatch {
        column: String,
        expected: String,
        got: String,
    },

    /// A term appeared in a position that cannot accept it
    #[error("unsupported term in argument position: {0}")]
    BadTerm(String),

    /// Enumeration has no such variant
    #[error("enumeration '{enumeration}' has no variant '{variant}'")]
    UnknownVariant { enumeration: String, variant: String },

    /// Second insert of an existing key into a key index
    #[error("duplicate key {key} in key index of '{predicate}'")]
    DuplicateKey { predicate: String, key: String },

    /// Keyed update against a key that is not present
    #[error("no row with key {key} in '{predicate}'")]
    MissingKey { predicate: String, key: String },

    /// Operation requires a key index that the predicate does not have
    #[error("'{0}' requires a key index")]
    KeyIndexRequired(String),

    /// Second index declared over the same columns
    #[error("'{predicate}' already has an index on {columns}")]
    IndexExists { predicate: String, columns: String },

    /// Removal of a row the index does not contain
    #[error("row {0} is not present in the index")]
    RowNotIndexed(u32),

    /// No binary operator implementation for this type pair
    #[error("operator '{op}' is not defined for {left} and {right}")]
    UndefinedOperator {
        op: String,
        left: String,
        right: String,
    },

    /// No unary operator implementation for this type
    #[error("operator '{op}' is not defined for {operand}")]
    UndefinedUnaryOperator { op: String, operand: String },

    /// Integer division or modulo by zero
    #[error("division by zero")]
    DivisionByZero,

    /// A variable is read before any goal has bound it
    #[error("variable '{0}' is read before it is bound")]
    UnboundVariable(String),

    /// Same variable name used at two different types within one rule
    #[error("variable '{name}' is used as both {first} and {second}")]
    VariableTypeConflict {
        name: String,
        first: String,
        second: String,
    },

    /// External constant with no registered resolver
    #[error("external constant '{0}' cannot be resolved")]
    UnresolvedExternal(String),

    /// Rule body constant-folds to false (raised only when configured)
    #[error("rule for '{0}' reduces to false at preprocess time")]
    DeadRule(String),

    /// Attaching this rule would create a dependency cycle
    #[error("rules for '{0}' form a dependency cycle")]
    RecursiveRule(String),

    /// Host write into a predicate that rules derive
    #[error("predicate '{0}' is derived by rules and cannot be written by the host")]
    DerivedPredicate(String),

    /// Query text could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Malformed CSV content
    #[error("csv error: {0}")]
    Csv(String),

    /// I/O error from the CSV collaborator
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for all engine operations.
pub type Result<T> = std::result::Result<T, Error>;
