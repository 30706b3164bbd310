//! Fluent construction helpers for goals and terms.
//!
//! Rule bodies read better as `and([atom(p, ...), not(atom(q, ...))])` than
//! as bare enum literals. These are thin wrappers; nothing here adds
//! semantics.

use std::sync::Arc;

use crate::ast::{AggregateOp, CmpOp, FuncOp, Goal, Term, Var};
use crate::predicate::PredicateId;
use crate::value::Value;

/// Goal matching rows of `predicate`.
pub fn atom(predicate: PredicateId, args: Vec<Term>) -> Goal {
    Goal::Atom { predicate, args }
}

pub fn and(goals: Vec<Goal>) -> Goal {
    Goal::And(goals)
}

pub fn or(goals: Vec<Goal>) -> Goal {
    Goal::Or(goals)
}

pub fn not(goal: Goal) -> Goal {
    Goal::Not(Box::new(goal))
}

pub fn once(goal: Goal) -> Goal {
    Goal::Once(Box::new(goal))
}

pub fn limit(max: usize, goal: Goal) -> Goal {
    Goal::Limit {
        max,
        body: Box::new(goal),
    }
}

pub fn first_of(branches: Vec<Goal>) -> Goal {
    Goal::FirstOf(branches)
}

/// Generate elements of `collection` into `item`, or test membership when
/// `item` is already bound.
pub fn within(item: Term, collection: Term) -> Goal {
    Goal::In { item, collection }
}

/// Compute `expr` and bind or compare `target`.
pub fn eval(target: Term, expr: Term) -> Goal {
    Goal::Eval { target, expr }
}

pub fn cmp(op: CmpOp, left: Term, right: Term) -> Goal {
    Goal::Compare { op, left, right }
}

/// Succeed with probability `p`.
pub fn prob(p: f64) -> Goal {
    Goal::Prob {
        p: Term::Const(Value::Float(p)),
    }
}

pub fn random_element(predicate: PredicateId, args: Vec<Term>) -> Goal {
    Goal::RandomElement { predicate, args }
}

pub fn pick_randomly(target: Term, choices: Vec<Value>) -> Goal {
    Goal::PickRandomly { target, choices }
}

pub fn count_of(target: &Var, body: Goal) -> Goal {
    Goal::Aggregate {
        op: AggregateOp::Count,
        target: Term::var(target),
        over: None,
        body: Box::new(body),
    }
}

pub fn sum_of(target: &Var, over: Term, body: Goal) -> Goal {
    aggregate(AggregateOp::Sum, target, over, body)
}

pub fn min_of(target: &Var, over: Term, body: Goal) -> Goal {
    aggregate(AggregateOp::Min, target, over, body)
}

pub fn max_of(target: &Var, over: Term, body: Goal) -> Goal {
    aggregate(AggregateOp::Max, target, over, body)
}

fn aggregate(op: AggregateOp, target: &Var, over: Term, body: Goal) -> Goal {
    Goal::Aggregate {
        op,
        target: Term::var(target),
        over: Some(over),
        body: Box::new(body),
    }
}

/// Bind `target` to the value for which `score` is maximal over the body's
/// solutions.
pub fn maximal(target: &Var, score: &Var, body: Goal) -> Goal {
    Goal::Extremal {
        target: Term::var(target),
        score: Term::var(score),
        maximize: true,
        body: Box::new(body),
    }
}

/// Bind `target` to the value for which `score` is minimal over the body's
/// solutions.
pub fn minimal(target: &Var, score: &Var, body: Goal) -> Goal {
    Goal::Extremal {
        target: Term::var(target),
        score: Term::var(score),
        maximize: false,
        body: Box::new(body),
    }
}

/// Binary functional expression.
pub fn apply2(op: FuncOp, left: Term, right: Term) -> Term {
    Term::Apply {
        op,
        args: vec![left, right],
    }
}

/// Unary functional expression.
pub fn apply1(op: FuncOp, arg: Term) -> Term {
    Term::Apply { op, args: vec![arg] }
}

/// Shared string constant.
pub fn text(s: &str) -> Term {
    Term::Const(Value::Str(Arc::from(s)))
}
