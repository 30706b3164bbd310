//! # Goal-to-Call Preprocessor
//!
//! Translates a rule body into canonical form and emits the call tree:
//!
//! 1. **Hoist functional expressions.** Any goal argument that is a
//!    function of other terms is replaced by a fresh temporary, preceded by
//!    an `Eval` goal that computes the expression once per solution. Every
//!    call argument ends up structurally a variable or a constant.
//! 2. **Constant-fold** arguments and decide goals whose operands are all
//!    literals.
//! 3. **Inline definitions** under an alpha-converted substitution of
//!    formals for actuals.
//! 4. **Prune** trivially-true goals; a body containing a trivially-false
//!    goal collapses to the singleton false body (or raises, when the
//!    program is configured to treat dead rules as errors).
//! 5. **Emit calls**, classifying each argument through the analyzer and
//!    picking the highest-priority index whose columns are all read-mode.

use std::collections::HashMap;
use std::sync::Arc;

use crate::analyzer::{Analyzer, Scope};
use crate::ast::{Definition, Goal, Term, Var};
use crate::error::{Error, Result};
use crate::eval::{
    Access, AggregateCall, AndCall, Call, CompareCall, CompiledRule, EvalCall, ExtremalCall,
    FirstOfCall, HeadOp, InCall, LimitCall, MatchOp, NotCall, OnceCall, OpTable, OrCall, PickCall,
    ProbCall, RandomCall, TableCall,
};
use crate::predicate::{Predicate, PredicateId};
use crate::value::{DataType, TupleSchema, Value};

/// A goal after canonicalization: decided, or a splice of canonical goals.
enum Canon {
    True,
    False,
    Goals(Vec<Goal>),
}

fn wrap_and(mut goals: Vec<Goal>) -> Goal {
    if goals.len() == 1 {
        match goals.pop() {
            Some(g) => g,
            None => Goal::True,
        }
    } else {
        Goal::And(goals)
    }
}

/// Compiles rule bodies against a snapshot of the predicate arena.
pub struct Preprocessor<'a> {
    predicates: &'a [Predicate],
    ops: &'a OpTable,
    raise_on_dead_rule: bool,
    fresh: usize,
}

impl<'a> Preprocessor<'a> {
    pub fn new(predicates: &'a [Predicate], ops: &'a OpTable, raise_on_dead_rule: bool) -> Self {
        Preprocessor {
            predicates,
            ops,
            raise_on_dead_rule,
            fresh: 0,
        }
    }

    /// Compile one rule: head terms plus body goals into a [`CompiledRule`].
    pub fn compile_rule(
        &mut self,
        head_predicate: PredicateId,
        head: &[Term],
        body: &[Goal],
    ) -> Result<CompiledRule> {
        let head_pred = &self.predicates[head_predicate.index()];
        let schema = head_pred.schema().clone();
        let pred_name = head_pred.name().to_string();
        self.compile_with_schema(&pred_name, &schema, head, body)
    }

    /// Compile a detached query body. The synthesized head lists the
    /// discovered variables in order.
    pub fn compile_query(&mut self, vars: &[Var], body: &[Goal]) -> Result<CompiledRule> {
        let schema = TupleSchema::new(
            vars.iter()
                .map(|v| (v.name().to_string(), v.data_type().clone()))
                .collect(),
        );
        let head: Vec<Term> = vars.iter().map(Term::var).collect();
        self.compile_with_schema("query", &schema, &head, body)
    }

    fn compile_with_schema(
        &mut self,
        pred_name: &str,
        schema: &TupleSchema,
        head: &[Term],
        body: &[Goal],
    ) -> Result<CompiledRule> {
        let pred_name = pred_name.to_string();
        if head.len() != schema.arity() {
            return Err(Error::ArityMismatch {
                predicate: pred_name,
                expected: schema.arity(),
                got: head.len(),
            });
        }

        // Head expressions hoist into trailing Eval goals so the head recipe
        // only ever reads cells and literals.
        let mut full_body: Vec<Goal> = body.to_vec();
        let mut head_terms = Vec::with_capacity(head.len());
        for (i, term) in head.iter().enumerate() {
            let folded = self.fold_term(term);
            if matches!(folded, Term::Apply { .. }) {
                let ty = schema.field_type(i).cloned().unwrap_or(DataType::Null);
                let var = self.fresh_var(ty);
                full_body.push(Goal::Eval {
                    target: Term::Var(var.clone()),
                    expr: folded,
                });
                head_terms.push(Term::Var(var));
            } else {
                head_terms.push(folded);
            }
        }

        let canon = self.canon_body(&full_body)?;

        let mut analyzer = Analyzer::new();
        let mut scope = Scope::new();
        let root = match canon {
            Canon::False => {
                if self.raise_on_dead_rule {
                    return Err(Error::DeadRule(pred_name));
                }
                Call::Fail
            }
            Canon::True => Call::And(AndCall::new(Vec::new())),
            Canon::Goals(goals) => {
                let mut children = Vec::with_capacity(goals.len());
                for goal in &goals {
                    children.push(self.emit(&mut analyzer, &mut scope, goal)?);
                }
                Call::And(AndCall::new(children))
            }
        };

        let dead = matches!(root, Call::Fail);
        let mut head_ops = Vec::with_capacity(head_terms.len());
        for (i, term) in head_terms.iter().enumerate() {
            let column = schema.field_name(i).unwrap_or("?").to_string();
            match term {
                Term::Const(v) => {
                    if let Some(ty) = schema.field_type(i) {
                        if v.data_type() != *ty {
                            return Err(Error::ColumnTypeMismatch {
                                column,
                                expected: ty.to_string(),
                                got: v.data_type().to_string(),
                            });
                        }
                    }
                    head_ops.push(HeadOp::Const(v.clone()));
                }
                Term::Var(var) => {
                    if let Some(ty) = schema.field_type(i) {
                        if var.data_type() != ty {
                            return Err(Error::ColumnTypeMismatch {
                                column,
                                expected: ty.to_string(),
                                got: var.data_type().to_string(),
                            });
                        }
                    }
                    // The cell exists when any body goal mentions the
                    // variable; boundness is a runtime matter for heads
                    // (committed-choice and once-bodies bind at match time).
                    let cell = match analyzer.cell_of(var.name()) {
                        Some(cell) => cell,
                        None if dead => analyzer.cell_for(var)?,
                        None => return Err(Error::UnboundVariable(var.name().to_string())),
                    };
                    head_ops.push(HeadOp::Cell(cell));
                }
                Term::Apply { .. } => {
                    return Err(Error::BadTerm(format!(
                        "functional expression in head column '{column}' was not hoisted"
                    )))
                }
            }
        }

        Ok(CompiledRule {
            root,
            head: head_ops,
            cell_count: analyzer.cell_count(),
            deps: analyzer.into_dependencies(),
        })
    }

    fn fresh_var(&mut self, ty: DataType) -> Var {
        let n = self.fresh;
        self.fresh += 1;
        Var::new(format!("#t{n}"), ty)
    }

    // ========================================================================
    // Canonicalization
    // ========================================================================

    fn canon_body(&mut self, goals: &[Goal]) -> Result<Canon> {
        let mut out = Vec::new();
        for goal in goals {
            match self.canon_goal(goal)? {
                Canon::True => {}
                Canon::False => return Ok(Canon::False),
                Canon::Goals(gs) => out.extend(gs),
            }
        }
        if out.is_empty() {
            Ok(Canon::True)
        } else {
            Ok(Canon::Goals(out))
        }
    }

    fn canon_goal(&mut self, goal: &Goal) -> Result<Canon> {
        match goal {
            Goal::True => Ok(Canon::True),
            Goal::False => Ok(Canon::False),

            Goal::Atom { predicate, args } => {
                let (mut pre, args) = self.hoist_args(*predicate, args)?;
                pre.push(Goal::Atom {
                    predicate: *predicate,
                    args,
                });
                Ok(Canon::Goals(pre))
            }

            Goal::RandomElement { predicate, args } => {
                let (mut pre, args) = self.hoist_args(*predicate, args)?;
                pre.push(Goal::RandomElement {
                    predicate: *predicate,
                    args,
                });
                Ok(Canon::Goals(pre))
            }

            Goal::And(goals) => self.canon_body(goals),

            Goal::Or(branches) => {
                let mut out = Vec::new();
                for branch in branches {
                    match self.canon_goal(branch)? {
                        Canon::False => {}
                        Canon::True => out.push(Goal::True),
                        Canon::Goals(gs) => out.push(wrap_and(gs)),
                    }
                }
                if out.is_empty() {
                    Ok(Canon::False)
                } else {
                    Ok(Canon::Goals(vec![Goal::Or(out)]))
                }
            }

            Goal::Not(body) => match self.canon_goal(body)? {
                Canon::False => Ok(Canon::True),
                Canon::True => Ok(Canon::False),
                Canon::Goals(gs) => Ok(Canon::Goals(vec![Goal::Not(Box::new(wrap_and(gs)))])),
            },

            Goal::Once(body) => match self.canon_goal(body)? {
                Canon::False => Ok(Canon::False),
                Canon::True => Ok(Canon::True),
                Canon::Goals(gs) => Ok(Canon::Goals(vec![Goal::Once(Box::new(wrap_and(gs)))])),
            },

            Goal::Limit { max, body } => {
                if *max == 0 {
                    return Ok(Canon::False);
                }
                match self.canon_goal(body)? {
                    Canon::False => Ok(Canon::False),
                    Canon::True => Ok(Canon::True),
                    Canon::Goals(gs) => Ok(Canon::Goals(vec![Goal::Limit {
                        max: *max,
                        body: Box::new(wrap_and(gs)),
                    }])),
                }
            }

            Goal::FirstOf(branches) => {
                let mut out = Vec::new();
                for branch in branches {
                    match self.canon_goal(branch)? {
                        Canon::False => {}
                        Canon::True => {
                            // A trivially-true branch commits; everything
                            // after it is unreachable.
                            out.push(Goal::True);
                            break;
                        }
                        Canon::Goals(gs) => out.push(wrap_and(gs)),
                    }
                }
                if out.is_empty() {
                    return Ok(Canon::False);
                }
                if out.len() == 1 && matches!(out[0], Goal::True) {
                    return Ok(Canon::True);
                }
                Ok(Canon::Goals(vec![Goal::FirstOf(out)]))
            }

            Goal::In { item, collection } => {
                let item = self.fold_term(item);
                let collection = self.fold_term(collection);
                if let (Term::Const(i), Term::Const(c)) = (&item, &collection) {
                    let items = c.as_list().ok_or_else(|| {
                        Error::BadTerm(format!(
                            "In requires a list collection, got {}",
                            c.data_type()
                        ))
                    })?;
                    return Ok(if items.contains(i) {
                        Canon::True
                    } else {
                        Canon::False
                    });
                }
                Ok(Canon::Goals(vec![Goal::In { item, collection }]))
            }

            Goal::Eval { target, expr } => {
                let target = self.fold_term(target);
                let expr = self.fold_term(expr);
                if let (Term::Const(t), Term::Const(e)) = (&target, &expr) {
                    return Ok(if t == e { Canon::True } else { Canon::False });
                }
                Ok(Canon::Goals(vec![Goal::Eval { target, expr }]))
            }

            Goal::Compare { op, left, right } => {
                let left = self.fold_term(left);
                let right = self.fold_term(right);
                if let (Term::Const(l), Term::Const(r)) = (&left, &right) {
                    return Ok(if self.ops.compare(*op, l, r)? {
                        Canon::True
                    } else {
                        Canon::False
                    });
                }
                Ok(Canon::Goals(vec![Goal::Compare {
                    op: *op,
                    left,
                    right,
                }]))
            }

            Goal::Prob { p } => {
                let p = self.fold_term(p);
                if let Term::Const(v) = &p {
                    if let Some(f) = v.as_float() {
                        if f >= 1.0 {
                            return Ok(Canon::True);
                        }
                        if f <= 0.0 {
                            return Ok(Canon::False);
                        }
                    }
                }
                Ok(Canon::Goals(vec![Goal::Prob { p }]))
            }

            Goal::PickRandomly { target, choices } => {
                if choices.is_empty() {
                    return Ok(Canon::False);
                }
                Ok(Canon::Goals(vec![Goal::PickRandomly {
                    target: self.fold_term(target),
                    choices: choices.clone(),
                }]))
            }

            Goal::Aggregate {
                op,
                target,
                over,
                body,
            } => {
                use crate::ast::AggregateOp;
                let body = match self.canon_goal(body)? {
                    // Count and Sum of an empty body still yield a value;
                    // Min and Max have no witness.
                    Canon::False if matches!(*op, AggregateOp::Min | AggregateOp::Max) => {
                        return Ok(Canon::False)
                    }
                    Canon::False => Goal::False,
                    Canon::True => Goal::True,
                    Canon::Goals(gs) => wrap_and(gs),
                };
                Ok(Canon::Goals(vec![Goal::Aggregate {
                    op: *op,
                    target: self.fold_term(target),
                    over: over.as_ref().map(|t| self.fold_term(t)),
                    body: Box::new(body),
                }]))
            }

            Goal::Extremal {
                target,
                score,
                maximize,
                body,
            } => match self.canon_goal(body)? {
                Canon::False => Ok(Canon::False),
                Canon::True => Ok(Canon::Goals(vec![Goal::Extremal {
                    target: target.clone(),
                    score: score.clone(),
                    maximize: *maximize,
                    body: Box::new(Goal::True),
                }])),
                Canon::Goals(gs) => Ok(Canon::Goals(vec![Goal::Extremal {
                    target: target.clone(),
                    score: score.clone(),
                    maximize: *maximize,
                    body: Box::new(wrap_and(gs)),
                }])),
            },

            Goal::Definition { definition, args } => self.inline_definition(definition, args),
        }
    }

    /// Replace goal arguments that are functional expressions with fresh
    /// temporaries bound by preceding `Eval` goals.
    fn hoist_args(
        &mut self,
        predicate: PredicateId,
        args: &[Term],
    ) -> Result<(Vec<Goal>, Vec<Term>)> {
        let pred = &self.predicates[predicate.index()];
        if args.len() != pred.schema().arity() {
            return Err(Error::ArityMismatch {
                predicate: pred.name().to_string(),
                expected: pred.schema().arity(),
                got: args.len(),
            });
        }
        let column_types: Vec<DataType> = (0..args.len())
            .map(|i| pred.schema().field_type(i).cloned().unwrap_or(DataType::Null))
            .collect();

        let mut pre = Vec::new();
        let mut hoisted = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let folded = self.fold_term(arg);
            if matches!(folded, Term::Apply { .. }) {
                let var = self.fresh_var(column_types[i].clone());
                pre.push(Goal::Eval {
                    target: Term::Var(var.clone()),
                    expr: folded,
                });
                hoisted.push(Term::Var(var));
            } else {
                hoisted.push(folded);
            }
        }
        Ok((pre, hoisted))
    }

    /// Bottom-up constant folding over a term tree.
    fn fold_term(&self, term: &Term) -> Term {
        match term {
            Term::Const(_) | Term::Var(_) => term.clone(),
            Term::Apply { op, args } => {
                let folded: Vec<Term> = args.iter().map(|a| self.fold_term(a)).collect();
                let literals: Option<Vec<Value>> = folded
                    .iter()
                    .map(|t| t.as_constant().cloned())
                    .collect();
                if let Some(values) = literals {
                    if let Ok(v) = self.ops.apply(*op, &values) {
                        return Term::Const(v);
                    }
                }
                Term::Apply {
                    op: *op,
                    args: folded,
                }
            }
        }
    }

    // ========================================================================
    // Definition inlining
    // ========================================================================

    fn inline_definition(&mut self, definition: &Arc<Definition>, args: &[Term]) -> Result<Canon> {
        if args.len() != definition.params.len() {
            return Err(Error::ArityMismatch {
                predicate: definition.name.clone(),
                expected: definition.params.len(),
                got: args.len(),
            });
        }
        let mut map: HashMap<Arc<str>, Term> = HashMap::new();
        for (param, actual) in definition.params.iter().zip(args) {
            map.insert(param.name_arc(), actual.clone());
        }
        let mut renames: HashMap<Arc<str>, Arc<str>> = HashMap::new();
        let substituted: Vec<Goal> = definition
            .body
            .iter()
            .map(|g| self.subst_goal(g, &map, &mut renames))
            .collect();
        self.canon_body(&substituted)
    }

    fn rename_local(
        &mut self,
        var: &Var,
        renames: &mut HashMap<Arc<str>, Arc<str>>,
    ) -> Var {
        if !renames.contains_key(var.name()) {
            let n = self.fresh;
            self.fresh += 1;
            renames.insert(var.name_arc(), Arc::from(format!("{}@{n}", var.name())));
        }
        match renames.get(var.name()) {
            Some(name) => Var::new(name.as_ref(), var.data_type().clone()),
            None => var.clone(),
        }
    }

    fn subst_term(
        &mut self,
        term: &Term,
        map: &HashMap<Arc<str>, Term>,
        renames: &mut HashMap<Arc<str>, Arc<str>>,
    ) -> Term {
        match term {
            Term::Const(_) => term.clone(),
            Term::Var(var) => match map.get(var.name()) {
                Some(actual) => actual.clone(),
                None => Term::Var(self.rename_local(var, renames)),
            },
            Term::Apply { op, args } => Term::Apply {
                op: *op,
                args: args.iter().map(|a| self.subst_term(a, map, renames)).collect(),
            },
        }
    }

    fn subst_goal(
        &mut self,
        goal: &Goal,
        map: &HashMap<Arc<str>, Term>,
        renames: &mut HashMap<Arc<str>, Arc<str>>,
    ) -> Goal {
        match goal {
            Goal::True => Goal::True,
            Goal::False => Goal::False,
            Goal::Atom { predicate, args } => Goal::Atom {
                predicate: *predicate,
                args: args.iter().map(|a| self.subst_term(a, map, renames)).collect(),
            },
            Goal::RandomElement { predicate, args } => Goal::RandomElement {
                predicate: *predicate,
                args: args.iter().map(|a| self.subst_term(a, map, renames)).collect(),
            },
            Goal::And(gs) => Goal::And(gs.iter().map(|g| self.subst_goal(g, map, renames)).collect()),
            Goal::Or(gs) => Goal::Or(gs.iter().map(|g| self.subst_goal(g, map, renames)).collect()),
            Goal::FirstOf(gs) => {
                Goal::FirstOf(gs.iter().map(|g| self.subst_goal(g, map, renames)).collect())
            }
            Goal::Not(b) => Goal::Not(Box::new(self.subst_goal(b, map, renames))),
            Goal::Once(b) => Goal::Once(Box::new(self.subst_goal(b, map, renames))),
            Goal::Limit { max, body } => Goal::Limit {
                max: *max,
                body: Box::new(self.subst_goal(body, map, renames)),
            },
            Goal::In { item, collection } => Goal::In {
                item: self.subst_term(item, map, renames),
                collection: self.subst_term(collection, map, renames),
            },
            Goal::Eval { target, expr } => Goal::Eval {
                target: self.subst_term(target, map, renames),
                expr: self.subst_term(expr, map, renames),
            },
            Goal::Compare { op, left, right } => Goal::Compare {
                op: *op,
                left: self.subst_term(left, map, renames),
                right: self.subst_term(right, map, renames),
            },
            Goal::Prob { p } => Goal::Prob {
                p: self.subst_term(p, map, renames),
            },
            Goal::PickRandomly { target, choices } => Goal::PickRandomly {
                target: self.subst_term(target, map, renames),
                choices: choices.clone(),
            },
            Goal::Aggregate {
                op,
                target,
                over,
                body,
            } => Goal::Aggregate {
                op: *op,
                target: self.subst_term(target, map, renames),
                over: over.as_ref().map(|t| self.subst_term(t, map, renames)),
                body: Box::new(self.subst_goal(body, map, renames)),
            },
            Goal::Extremal {
                target,
                score,
                maximize,
                body,
            } => Goal::Extremal {
                target: self.subst_term(target, map, renames),
                score: self.subst_term(score, map, renames),
                maximize: *maximize,
                body: Box::new(self.subst_goal(body, map, renames)),
            },
            Goal::Definition { definition, args } => Goal::Definition {
                definition: Arc::clone(definition),
                args: args.iter().map(|a| self.subst_term(a, map, renames)).collect(),
            },
        }
    }

    // ========================================================================
    // Call emission
    // ========================================================================

    fn emit(&mut self, analyzer: &mut Analyzer, scope: &mut Scope, goal: &Goal) -> Result<Call> {
        match goal {
            Goal::True => Ok(Call::And(AndCall::new(Vec::new()))),
            Goal::False => Ok(Call::Fail),

            Goal::Atom { predicate, args } => self.emit_atom(analyzer, scope, *predicate, args),

            Goal::And(goals) => {
                let mut children = Vec::with_capacity(goals.len());
                for g in goals {
                    children.push(self.emit(analyzer, scope, g)?);
                }
                Ok(Call::And(AndCall::new(children)))
            }

            Goal::Or(branches) => {
                let mut calls = Vec::with_capacity(branches.len());
                for branch in branches {
                    let mut child = scope.child();
                    calls.push(self.emit(analyzer, &mut child, branch)?);
                }
                Ok(Call::Or(OrCall::new(calls)))
            }

            Goal::Not(body) => {
                let mut child = scope.child();
                let body = self.emit(analyzer, &mut child, body)?;
                Ok(Call::Not(NotCall::new(body)))
            }

            Goal::Once(body) => {
                let mut child = scope.child();
                let body = self.emit(analyzer, &mut child, body)?;
                Ok(Call::Once(OnceCall::new(body)))
            }

            Goal::Limit { max, body } => {
                let mut child = scope.child();
                let body = self.emit(analyzer, &mut child, body)?;
                Ok(Call::Limit(LimitCall::new(*max, body)))
            }

            Goal::FirstOf(branches) => {
                let mut calls = Vec::with_capacity(branches.len());
                for branch in branches {
                    let mut child = scope.child();
                    calls.push(self.emit(analyzer, &mut child, branch)?);
                }
                Ok(Call::FirstOf(FirstOfCall::new(calls)))
            }

            Goal::In { item, collection } => {
                let collection = analyzer.compile_expr(scope, collection)?;
                let item = analyzer.bind_term(scope, item, None, "In item")?;
                Ok(Call::In(InCall::new(item, collection)))
            }

            Goal::Eval { target, expr } => {
                let expr = analyzer.compile_expr(scope, expr)?;
                let target = analyzer.bind_term(scope, target, None, "Eval target")?;
                Ok(Call::Eval(EvalCall::new(target, expr)))
            }

            Goal::Compare { op, left, right } => {
                let left = analyzer.compile_expr(scope, left)?;
                let right = analyzer.compile_expr(scope, right)?;
                Ok(Call::Compare(CompareCall::new(*op, left, right)))
            }

            Goal::Prob { p } => {
                let p = analyzer.compile_expr(scope, p)?;
                Ok(Call::Prob(ProbCall::new(p)))
            }

            Goal::RandomElement { predicate, args } => {
                analyzer.add_dependency(*predicate);
                let match_ops = self.bind_columns(analyzer, scope, *predicate, args)?;
                Ok(Call::Random(RandomCall::new(*predicate, match_ops)))
            }

            Goal::PickRandomly { target, choices } => {
                let target = analyzer.bind_term(scope, target, None, "PickRandomly target")?;
                Ok(Call::Pick(PickCall::new(target, choices.clone())))
            }

            Goal::Aggregate {
                op,
                target,
                over,
                body,
            } => {
                let mut child = scope.child();
                let body = self.emit(analyzer, &mut child, body)?;
                let over = match over {
                    Some(t) => Some(analyzer.compile_expr(&child, t)?),
                    None => None,
                };
                let target = analyzer.bind_term(scope, target, None, "aggregate target")?;
                Ok(Call::Aggregate(AggregateCall::new(*op, target, over, body)))
            }

            Goal::Extremal {
                target,
                score,
                maximize,
                body,
            } => {
                let mut child = scope.child();
                let body = self.emit(analyzer, &mut child, body)?;
                let target_var = target
                    .as_variable()
                    .ok_or_else(|| Error::BadTerm("extremal target must be a variable".into()))?;
                let score_var = score
                    .as_variable()
                    .ok_or_else(|| Error::BadTerm("extremal score must be a variable".into()))?;
                let target_cell = analyzer.cell_for(target_var)?;
                let score_cell = analyzer.cell_for(score_var)?;
                if !child.is_bound(target_cell) {
                    return Err(Error::UnboundVariable(target_var.name().to_string()));
                }
                if !child.is_bound(score_cell) {
                    return Err(Error::UnboundVariable(score_var.name().to_string()));
                }
                // The search itself publishes both cells.
                scope.mark_bound(target_cell);
                scope.mark_bound(score_cell);
                Ok(Call::Extremal(ExtremalCall::new(
                    target_cell,
                    score_cell,
                    *maximize,
                    body,
                )))
            }

            Goal::Definition { definition, .. } => Err(Error::BadTerm(format!(
                "definition '{}' survived canonicalization",
                definition.name
            ))),
        }
    }

    fn bind_columns(
        &mut self,
        analyzer: &mut Analyzer,
        scope: &mut Scope,
        predicate: PredicateId,
        args: &[Term],
    ) -> Result<Vec<MatchOp>> {
        let pred = &self.predicates[predicate.index()];
        let schema = pred.schema();
        if args.len() != schema.arity() {
            return Err(Error::ArityMismatch {
                predicate: pred.name().to_string(),
                expected: schema.arity(),
                got: args.len(),
            });
        }
        let mut match_ops = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let expected = schema.field_type(i);
            let position = schema.field_name(i).unwrap_or("?");
            match_ops.push(analyzer.bind_term(scope, arg, expected, position)?);
        }
        Ok(match_ops)
    }

    fn emit_atom(
        &mut self,
        analyzer: &mut Analyzer,
        scope: &mut Scope,
        predicate: PredicateId,
        args: &[Term],
    ) -> Result<Call> {
        analyzer.add_dependency(predicate);
        let match_ops = self.bind_columns(analyzer, scope, predicate, args)?;

        // Pick the highest-priority index whose columns are all read-mode.
        let read_mode = |col: usize| matches!(match_ops[col], MatchOp::Read(_) | MatchOp::Const(_));
        let table = self.predicates[predicate.index()].table();
        let mut best: Option<(u32, Access)> = None;
        if let Some(ki) = table.key_index() {
            if ki.columns().iter().all(|&c| read_mode(c)) {
                best = Some((ki.priority(), Access::Key { done: false }));
            }
        }
        for (i, ix) in table.general_indices().iter().enumerate() {
            if read_mode(ix.column()) {
                let candidate = (
                    ix.priority(),
                    Access::General {
                        index: i,
                        cursor: crate::table::NO_ROW,
                        primed: false,
                    },
                );
                match &best {
                    Some((p, _)) if *p >= candidate.0 => {}
                    _ => best = Some(candidate),
                }
            }
        }
        let access = match best {
            Some((_, access)) => access,
            None => Access::Scan { cursor: 0 },
        };

        Ok(Call::Table(TableCall {
            predicate,
            match_ops,
            access,
        }))
    }
}
