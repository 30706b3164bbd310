//! # Term Algebra
//!
//! Rule bodies are sequences of [`Goal`]s; goal arguments are [`Term`]s.
//! A term is a constant, a typed variable, or a functional expression over
//! other terms. Functional expressions never survive preprocessing: the
//! canonicalizer hoists each one into a fresh temporary bound by an `Eval`
//! goal, so every argument a call sees is structurally a variable or a
//! constant.
//!
//! ## Builders
//!
//! For programmatic construction of goals, see the [`builders`] module,
//! which provides free functions like `and`, `not`, `cmp` and `eval`.

use std::collections::HashSet;
use std::sync::Arc;

use crate::predicate::PredicateId;
use crate::value::{DataType, Value};

pub mod builders;

// ============================================================================
// Operators
// ============================================================================

/// Functions usable inside functional-expression terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncOp {
    /// Addition (+); string concatenation on strings
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Division (/)
    Div,
    /// Modulo (%)
    Mod,
    /// Arithmetic negation
    Neg,
    /// Absolute value
    Abs,
    /// Smaller of two comparable values
    Min,
    /// Larger of two comparable values
    Max,
    /// Conversion to float
    ToFloat,
    /// Truncating conversion to int
    ToInt,
}

impl FuncOp {
    pub fn arity(&self) -> usize {
        match self {
            FuncOp::Neg | FuncOp::Abs | FuncOp::ToFloat | FuncOp::ToInt => 1,
            _ => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FuncOp::Add => "+",
            FuncOp::Sub => "-",
            FuncOp::Mul => "*",
            FuncOp::Div => "/",
            FuncOp::Mod => "%",
            FuncOp::Neg => "neg",
            FuncOp::Abs => "abs",
            FuncOp::Min => "min",
            FuncOp::Max => "max",
            FuncOp::ToFloat => "float",
            FuncOp::ToInt => "int",
        }
    }
}

/// Comparison operators for comparison goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// Single-value aggregation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    Count,
    Sum,
    Min,
    Max,
}

impl AggregateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
        }
    }
}

// ============================================================================
// Terms
// ============================================================================

/// A typed rule-scope variable. Identity within a rule body is by name; the
/// first occurrence in body order binds, later occurrences match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var {
    name: Arc<str>,
    ty: DataType,
}

impl Var {
    pub fn new(name: impl AsRef<str>, ty: DataType) -> Var {
        Var {
            name: Arc::from(name.as_ref()),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn data_type(&self) -> &DataType {
        &self.ty
    }
}

/// A goal argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// A literal value
    Const(Value),
    /// A rule-scope variable
    Var(Var),
    /// A functional expression; hoisted into an `Eval` goal by the
    /// preprocessor
    Apply { op: FuncOp, args: Vec<Term> },
}

impl Term {
    pub fn var(v: &Var) -> Term {
        Term::Var(v.clone())
    }

    pub fn val(value: impl Into<Value>) -> Term {
        Term::Const(value.into())
    }

    pub fn apply(op: FuncOp, args: Vec<Term>) -> Term {
        Term::Apply { op, args }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Term::Const(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    pub fn as_variable(&self) -> Option<&Var> {
        match self {
            Term::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Term::Const(v) => Some(v),
            _ => None,
        }
    }

    /// All variables referenced by this term.
    pub fn variables(&self) -> HashSet<Arc<str>> {
        let mut out = HashSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut HashSet<Arc<str>>) {
        match self {
            Term::Var(v) => {
                out.insert(v.name_arc());
            }
            Term::Const(_) => {}
            Term::Apply { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
        }
    }
}

// ============================================================================
// Goals
// ============================================================================

/// One step of a rule body: a predicate applied to argument terms, or a
/// primitive.
#[derive(Debug, Clone)]
pub enum Goal {
    /// Always succeeds once; pruned by the preprocessor
    True,
    /// Never succeeds; collapses the whole body
    False,
    /// Match rows of a predicate's table
    Atom {
        predicate: PredicateId,
        args: Vec<Term>,
    },
    /// Left-to-right conjunction with backtracking
    And(Vec<Goal>),
    /// Branches tried in order; each restart resumes the current branch
    Or(Vec<Goal>),
    /// Succeeds exactly when the sub-body has no solutions
    Not(Box<Goal>),
    /// At most one solution from the sub-body
    Once(Box<Goal>),
    /// At most `max` solutions from the sub-body
    Limit { max: usize, body: Box<Goal> },
    /// First branch that yields commits; no re-entry afterwards
    FirstOf(Vec<Goal>),
    /// Generate elements of a collection, or test membership
    In { item: Term, collection: Term },
    /// Compute an expression and bind or compare the target
    Eval { target: Term, expr: Term },
    /// Comparison over two bound terms
    Compare { op: CmpOp, left: Term, right: Term },
    /// Succeed with the given probability
    Prob { p: Term },
    /// Bind the arguments against one uniformly chosen row
    RandomElement {
        predicate: PredicateId,
        args: Vec<Term>,
    },
    /// Bind the target to one uniformly chosen literal
    PickRandomly { target: Term, choices: Vec<Value> },
    /// Fold all solutions of the body into one aggregate value
    Aggregate {
        op: AggregateOp,
        target: Term,
        over: Option<Term>,
        body: Box<Goal>,
    },
    /// Bind the argument for which the body's score is extremal
    Extremal {
        target: Term,
        score: Term,
        maximize: bool,
        body: Box<Goal>,
    },
    /// Occurrence of a parameterized definition; inlined by the preprocessor
    Definition {
        definition: Arc<Definition>,
        args: Vec<Term>,
    },
}

impl Goal {
    /// Tables this goal reads, directly or through nested sub-bodies and
    /// higher-order arguments.
    pub fn dependencies(&self, out: &mut HashSet<PredicateId>) {
        match self {
            Goal::True | Goal::False => {}
            Goal::Atom { predicate, .. } | Goal::RandomElement { predicate, .. } => {
                out.insert(*predicate);
            }
            Goal::And(goals) | Goal::Or(goals) | Goal::FirstOf(goals) => {
                for g in goals {
                    g.dependencies(out);
                }
            }
            Goal::Not(body) | Goal::Once(body) => body.dependencies(out),
            Goal::Limit { body, .. } => body.dependencies(out),
            Goal::Aggregate { body, .. } => body.dependencies(out),
            Goal::Extremal { body, .. } => body.dependencies(out),
            Goal::In { .. }
            | Goal::Eval { .. }
            | Goal::Compare { .. }
            | Goal::Prob { .. }
            | Goal::PickRandomly { .. } => {}
            Goal::Definition { definition, args: _ } => {
                for g in &definition.body {
                    g.dependencies(out);
                }
            }
        }
    }
}

// ============================================================================
// Definitions
// ============================================================================

/// A parameterized body. An occurrence in a rule is replaced by the body
/// under an alpha-converted substitution of formals for actuals.
#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    pub params: Vec<Var>,
    pub body: Vec<Goal>,
}

impl Definition {
    pub fn new(name: impl Into<String>, params: Vec<Var>, body: Vec<Goal>) -> Arc<Definition> {
        Arc::new(Definition {
            name: name.into(),
            params,
            body,
        })
    }

    /// Goal standing for an application of this definition.
    pub fn call(self: &Arc<Self>, args: Vec<Term>) -> Goal {
        Goal::Definition {
            definition: Arc::clone(self),
            args,
        }
    }
}
