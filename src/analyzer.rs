//! First-use analysis of rule-body variables.
//!
//! The analyzer owns the rule-wide mapping from variable names to value
//! cells and the set of table dependencies. Boundness is tracked separately
//! in a [`Scope`]: the first occurrence of a variable in body order compiles
//! to a `Write` op, every later occurrence to a `Read` against the same
//! cell.
//!
//! Scoped sub-bodies (`Not`, `Once`, `FirstOf`, aggregators, extremal
//! searches, disjunct arms) analyze under a forked child scope. The child
//! shares cells and reports dependencies upward, but bindings acquired only
//! inside it are not promoted: a variable first bound inside becomes
//! unbound again on exit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::ast::{Term, Var};
use crate::error::{Error, Result};
use crate::eval::{CellId, Expr, MatchOp};
use crate::predicate::PredicateId;
use crate::value::DataType;

/// One value cell: the slot backing a rule-body variable.
#[derive(Debug, Clone)]
pub struct CellInfo {
    pub name: Arc<str>,
    pub ty: DataType,
}

/// Boundness context, forked for scoped sub-bodies.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bound: HashSet<CellId>,
}

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }

    /// Fork for a scoped sub-body. The child starts with the parent's
    /// bindings; nothing the child binds leaks back.
    pub fn child(&self) -> Scope {
        self.clone()
    }

    pub fn is_bound(&self, cell: CellId) -> bool {
        self.bound.contains(&cell)
    }

    pub fn mark_bound(&mut self, cell: CellId) {
        self.bound.insert(cell);
    }
}

/// Rule-wide variable and dependency bookkeeping.
#[derive(Debug, Default)]
pub struct Analyzer {
    cells: Vec<CellInfo>,
    var_cells: HashMap<Arc<str>, CellId>,
    deps: HashSet<PredicateId>,
}

impl Analyzer {
    pub fn new() -> Analyzer {
        Analyzer::default()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[CellInfo] {
        &self.cells
    }

    pub fn add_dependency(&mut self, predicate: PredicateId) {
        self.deps.insert(predicate);
    }

    pub fn into_dependencies(self) -> HashSet<PredicateId> {
        self.deps
    }

    pub fn dependencies(&self) -> &HashSet<PredicateId> {
        &self.deps
    }

    /// Cell already allocated for a variable name, if any.
    pub fn cell_of(&self, name: &str) -> Option<CellId> {
        self.var_cells.get(name).copied()
    }

    /// Cell for a variable, allocating on first sight. The same name must
    /// keep the same type throughout one rule.
    pub fn cell_for(&mut self, var: &Var) -> Result<CellId> {
        if let Some(&cell) = self.var_cells.get(var.name()) {
            let existing = &self.cells[cell].ty;
            if existing != var.data_type() {
                return Err(Error::VariableTypeConflict {
                    name: var.name().to_string(),
                    first: existing.to_string(),
                    second: var.data_type().to_string(),
                });
            }
            return Ok(cell);
        }
        let cell = self.cells.len();
        self.cells.push(CellInfo {
            name: var.name_arc(),
            ty: var.data_type().clone(),
        });
        self.var_cells.insert(var.name_arc(), cell);
        Ok(cell)
    }

    /// Classify one goal argument. `expected` is the column type when the
    /// position is typed (table calls); `None` leaves the term's own type
    /// authoritative.
    pub fn bind_term(
        &mut self,
        scope: &mut Scope,
        term: &Term,
        expected: Option<&DataType>,
        position: &str,
    ) -> Result<MatchOp> {
        match term {
            Term::Const(v) => {
                if let Some(ty) = expected {
                    if v.data_type() != *ty {
                        return Err(Error::ColumnTypeMismatch {
                            column: position.to_string(),
                            expected: ty.to_string(),
                            got: v.data_type().to_string(),
                        });
                    }
                }
                Ok(MatchOp::Const(v.clone()))
            }
            Term::Var(var) => {
                if let Some(ty) = expected {
                    if var.data_type() != ty {
                        return Err(Error::ColumnTypeMismatch {
                            column: position.to_string(),
                            expected: ty.to_string(),
                            got: var.data_type().to_string(),
                        });
                    }
                }
                let cell = self.cell_for(var)?;
                if scope.is_bound(cell) {
                    Ok(MatchOp::Read(cell))
                } else {
                    scope.mark_bound(cell);
                    Ok(MatchOp::Write(cell))
                }
            }
            Term::Apply { op, .. } => Err(Error::BadTerm(format!(
                "functional expression '{}' in {position} was not hoisted",
                op.as_str()
            ))),
        }
    }

    /// Compile a term into an expression of already-bound cells and
    /// constants. Reading an unbound variable is an error.
    pub fn compile_expr(&mut self, scope: &Scope, term: &Term) -> Result<Expr> {
        match term {
            Term::Const(v) => Ok(Expr::Const(v.clone())),
            Term::Var(var) => {
                let cell = self.cell_for(var)?;
                if !scope.is_bound(cell) {
                    return Err(Error::UnboundVariable(var.name().to_string()));
                }
                Ok(Expr::Cell(cell))
            }
            Term::Apply { op, args } => {
                if args.len() != op.arity() {
                    return Err(Error::BadTerm(format!(
                        "operator '{}' takes {} arguments, got {}",
                        op.as_str(),
                        op.arity(),
                        args.len()
                    )));
                }
                let mut compiled = Vec::with_capacity(args.len());
                for arg in args {
                    compiled.push(self.compile_expr(scope, arg)?);
                }
                Ok(Expr::Apply { op: *op, args: compiled })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_first_use_writes_then_reads() {
        let mut analyzer = Analyzer::new();
        let mut scope = Scope::new();
        let x = Var::new("x", DataType::Int);

        let first = analyzer
            .bind_term(&mut scope, &Term::var(&x), None, "arg")
            .unwrap();
        let second = analyzer
            .bind_term(&mut scope, &Term::var(&x), None, "arg")
            .unwrap();

        assert!(matches!(first, MatchOp::Write(0)));
        assert!(matches!(second, MatchOp::Read(0)));
        assert_eq!(analyzer.cell_count(), 1);
    }

    #[test]
    fn test_child_bindings_do_not_promote() {
        let mut analyzer = Analyzer::new();
        let mut scope = Scope::new();
        let x = Var::new("x", DataType::Int);

        let mut child = scope.child();
        let inside = analyzer
            .bind_term(&mut child, &Term::var(&x), None, "arg")
            .unwrap();
        assert!(matches!(inside, MatchOp::Write(0)));

        // Outside the child, x is unbound again but keeps its cell.
        let outside = analyzer
            .bind_term(&mut scope, &Term::var(&x), None, "arg")
            .unwrap();
        assert!(matches!(outside, MatchOp::Write(0)));
        assert_eq!(analyzer.cell_count(), 1);
    }

    #[test]
    fn test_type_conflict_is_rejected() {
        let mut analyzer = Analyzer::new();
        let mut scope = Scope::new();

        analyzer
            .bind_term(
                &mut scope,
                &Term::var(&Var::new("x", DataType::Int)),
                None,
                "arg",
            )
            .unwrap();
        let err = analyzer
            .bind_term(
                &mut scope,
                &Term::var(&Var::new("x", DataType::Str)),
                None,
                "arg",
            )
            .unwrap_err();
        assert!(matches!(err, Error::VariableTypeConflict { .. }));
    }

    #[test]
    fn test_expr_requires_bound_variables() {
        let mut analyzer = Analyzer::new();
        let scope = Scope::new();
        let x = Var::new("x", DataType::Int);

        let err = analyzer.compile_expr(&scope, &Term::var(&x)).unwrap_err();
        assert!(matches!(err, Error::UnboundVariable(_)));
    }

    #[test]
    fn test_constant_type_check_against_column() {
        let mut analyzer = Analyzer::new();
        let mut scope = Scope::new();

        let ok = analyzer.bind_term(
            &mut scope,
            &Term::Const(Value::Int(3)),
            Some(&DataType::Int),
            "n",
        );
        assert!(matches!(ok, Ok(MatchOp::Const(_))));

        let err = analyzer
            .bind_term(
                &mut scope,
                &Term::Const(Value::string("x")),
                Some(&DataType::Int),
                "n",
            )
            .unwrap_err();
        assert!(matches!(err, Error::ColumnTypeMismatch { .. }));
    }
}
