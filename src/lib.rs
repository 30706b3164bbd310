//! # TED
//!
//! An embeddable, in-memory, typed Datalog engine. Host code declares typed
//! predicates, writes rules in a composable term algebra, and advances the
//! program one fixed-point "tick" at a time; each tick recomputes every
//! dynamic predicate from its rules and update sources, in dependency
//! order.
//!
//! ## Pipeline
//!
//! ```text
//! Goals (term algebra)
//!     ↓
//! [Preprocessor]        → canonical body (hoisted Evals, folded constants,
//!     ↓                    inlined definitions, pruned True/False)
//! [Analyzer]            → value cells + read/write/const match operations
//!     ↓
//! [Call emission]       → restartable call tree, index-selected table scans
//!     ↓
//! [Scheduler]           → per-tick update in topological dependency order
//!     ↓
//! Tables (hash-indexed row storage)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use ted::{Program, Timing, DataType, Value, Term, Var};
//! use ted::ast::builders::*;
//!
//! let mut program = Program::new("demo");
//! let p = program
//!     .add_predicate("p", vec![("n", DataType::Int)], Timing::Dynamic)
//!     .unwrap();
//! let q = program
//!     .add_predicate("q", vec![("n", DataType::Int)], Timing::Dynamic)
//!     .unwrap();
//!
//! for n in 1..=3 {
//!     program.insert(p, vec![Value::Int(n)]).unwrap();
//! }
//!
//! // q(n) :- p(n), n > 1
//! let n = Var::new("n", DataType::Int);
//! program
//!     .rule(q, vec![Term::var(&n)], vec![
//!         atom(p, vec![Term::var(&n)]),
//!         cmp(ted::ast::CmpOp::Gt, Term::var(&n), Term::val(1i64)),
//!     ])
//!     .unwrap();
//!
//! program.update().unwrap();
//! assert_eq!(program.rows(q).len(), 2);
//! ```

// Core value and error surface
pub mod error;
pub mod value;

// Storage: tables with key and general hash indices
pub mod table;

// Term algebra and rule surface
pub mod ast;

// Body compilation: first-use analysis, canonicalization, call emission
pub mod analyzer;
pub mod eval;
pub mod preprocess;

// Predicates, scheduling, and the program update loop
pub mod predicate;
pub mod program;
pub mod schedule;

// Ambient services
pub mod config;
pub mod rng;

// External collaborators
pub mod csv;
pub mod query;

// Re-export the host-facing surface
pub use ast::{AggregateOp, CmpOp, Definition, FuncOp, Goal, Term, Var};
pub use config::{Config, EngineConfig, LoggingConfig};
pub use error::{Error, Result};
pub use eval::{Call, CompiledRule, OpTable};
pub use predicate::{Predicate, PredicateId, Timing};
pub use program::Program;
pub use query::{ExternalResolver, QueryResult};
pub use rng::EngineRng;
pub use table::{GeneralIndex, KeyIndex, RowId, Table, DELETED_ROW, NO_ROW};
pub use value::{DataType, EnumType, Tuple, TupleSchema, Value};
