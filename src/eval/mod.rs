//! # Call Protocol
//!
//! Every primitive of a canonical rule body is a restartable iterator: a
//! struct with explicit state and two entry points, `reset` (rewind to the
//! first solution) and `next` (produce the next solution). `next` returning
//! `true` means a solution is available and the call's writes are in effect;
//! `false` means no more solutions, and the caller must not read its writes.
//!
//! Evaluation is strictly single-threaded and left-to-right. The enclosing
//! conjunction drives the pipeline: each new solution of child *i* resets
//! child *i+1*; when a child ends, control backtracks to retry its left
//! neighbour. One call instance exists per call site and is reused across
//! every firing of its rule.

pub mod ops;

use std::collections::HashSet;

use crate::ast::{AggregateOp, CmpOp, FuncOp};
use crate::error::{Error, Result};
use crate::predicate::{Predicate, PredicateId};
use crate::rng::EngineRng;
use crate::table::{valid_row, NO_ROW, RowId};
use crate::value::{Tuple, Value};

pub use ops::OpTable;

/// Index of a value cell within a rule's frame.
pub type CellId = usize;

/// Per-argument opcode applied when probing a row, baked once by the
/// preprocessor.
#[derive(Debug, Clone)]
pub enum MatchOp {
    /// Compare the cell's current value to the row column (subsequent use)
    Read(CellId),
    /// Store the row column into the cell (first use)
    Write(CellId),
    /// Compare a literal to the row column
    Const(Value),
}

/// How one head column is produced from a solution.
#[derive(Debug, Clone)]
pub enum HeadOp {
    Cell(CellId),
    Const(Value),
}

/// A compiled functional expression: constants, cell reads, and operator
/// applications. All variables inside were bound before this point in body
/// order, so evaluation is a pure fold over the frame.
#[derive(Debug, Clone)]
pub enum Expr {
    Const(Value),
    Cell(CellId),
    Apply { op: FuncOp, args: Vec<Expr> },
}

impl Expr {
    pub fn eval(&self, frame: &[Value], ops: &OpTable) -> Result<Value> {
        match self {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Cell(c) => Ok(frame[*c].clone()),
            Expr::Apply { op, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.eval(frame, ops)?);
                }
                ops.apply(*op, &values)
            }
        }
    }

    /// Fold to a literal when no cell is involved.
    pub fn try_fold(&self, ops: &OpTable) -> Option<Value> {
        match self {
            Expr::Const(v) => Some(v.clone()),
            Expr::Cell(_) => None,
            Expr::Apply { op, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.try_fold(ops)?);
                }
                ops.apply(*op, &values).ok()
            }
        }
    }
}

/// Everything a call may touch while producing solutions: the predicate
/// arena (read-only during rule evaluation), the rule's cell frame, the
/// program RNG and the operator table.
pub struct EvalCx<'a> {
    pub predicates: &'a [Predicate],
    pub frame: &'a mut Vec<Value>,
    pub rng: &'a mut EngineRng,
    pub ops: &'a OpTable,
}

/// A rule body after preprocessing: the root call tree, the head recipe,
/// the frame size, and the closure of tables the body reads.
#[derive(Debug)]
pub struct CompiledRule {
    pub(crate) root: Call,
    pub(crate) head: Vec<HeadOp>,
    pub(crate) cell_count: usize,
    pub(crate) deps: HashSet<PredicateId>,
}

impl CompiledRule {
    pub fn dependencies(&self) -> &HashSet<PredicateId> {
        &self.deps
    }

    pub(crate) fn new_frame(&self) -> Vec<Value> {
        vec![Value::Null; self.cell_count]
    }

    pub(crate) fn head_tuple(&self, frame: &[Value]) -> Tuple {
        Tuple::new(
            self.head
                .iter()
                .map(|op| match op {
                    HeadOp::Cell(c) => frame[*c].clone(),
                    HeadOp::Const(v) => v.clone(),
                })
                .collect(),
        )
    }
}

// ============================================================================
// Match-op helpers
// ============================================================================

/// Check every read-mode column of `row` against the frame.
fn reads_match(match_ops: &[MatchOp], row: &Tuple, frame: &[Value]) -> bool {
    match_ops.iter().enumerate().all(|(col, op)| match op {
        MatchOp::Read(c) => frame[*c] == row[col],
        MatchOp::Const(v) => *v == row[col],
        MatchOp::Write(_) => true,
    })
}

/// Store every write-mode column of `row` into the frame.
fn write_columns(match_ops: &[MatchOp], row: &Tuple, frame: &mut [Value]) {
    for (col, op) in match_ops.iter().enumerate() {
        if let MatchOp::Write(c) = op {
            frame[*c] = row[col].clone();
        }
    }
}

/// Resolve a read-mode op to its current value. `None` for write-mode ops.
fn read_value(op: &MatchOp, frame: &[Value]) -> Option<Value> {
    match op {
        MatchOp::Read(c) => Some(frame[*c].clone()),
        MatchOp::Const(v) => Some(v.clone()),
        MatchOp::Write(_) => None,
    }
}

/// Bind or check a single computed value against a target op.
fn settle(target: &MatchOp, value: Value, frame: &mut [Value]) -> bool {
    match target {
        MatchOp::Write(c) => {
            frame[*c] = value;
            true
        }
        MatchOp::Read(c) => frame[*c] == value,
        MatchOp::Const(v) => *v == value,
    }
}

// ============================================================================
// Calls
// ============================================================================

/// One primitive of a canonical body.
#[derive(Debug)]
pub enum Call {
    /// The singleton false body: never yields
    Fail,
    Table(TableCall),
    And(AndCall),
    Or(OrCall),
    Not(NotCall),
    Once(OnceCall),
    Limit(LimitCall),
    FirstOf(FirstOfCall),
    In(InCall),
    Eval(EvalCall),
    Compare(CompareCall),
    Prob(ProbCall),
    Random(RandomCall),
    Pick(PickCall),
    Aggregate(AggregateCall),
    Extremal(ExtremalCall),
}

impl Call {
    /// Rewind to produce solutions from the start.
    pub fn reset(&mut self) {
        match self {
            Call::Fail => {}
            Call::Table(c) => c.reset(),
            Call::And(c) => c.reset(),
            Call::Or(c) => c.reset(),
            Call::Not(c) => c.done = false,
            Call::Once(c) => c.done = false,
            Call::Limit(c) => c.reset(),
            Call::FirstOf(c) => c.done = false,
            Call::In(c) => c.reset(),
            Call::Eval(c) => c.done = false,
            Call::Compare(c) => c.done = false,
            Call::Prob(c) => c.done = false,
            Call::Random(c) => c.done = false,
            Call::Pick(c) => c.done = false,
            Call::Aggregate(c) => c.done = false,
            Call::Extremal(c) => c.done = false,
        }
    }

    /// Produce the next solution. After returning `false` the call keeps
    /// returning `false` until reset.
    pub fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        match self {
            Call::Fail => Ok(false),
            Call::Table(c) => c.next(cx),
            Call::And(c) => c.next(cx),
            Call::Or(c) => c.next(cx),
            Call::Not(c) => c.next(cx),
            Call::Once(c) => c.next(cx),
            Call::Limit(c) => c.next(cx),
            Call::FirstOf(c) => c.next(cx),
            Call::In(c) => c.next(cx),
            Call::Eval(c) => c.next(cx),
            Call::Compare(c) => c.next(cx),
            Call::Prob(c) => c.next(cx),
            Call::Random(c) => c.next(cx),
            Call::Pick(c) => c.next(cx),
            Call::Aggregate(c) => c.next(cx),
            Call::Extremal(c) => c.next(cx),
        }
    }
}

/// Table access strategy chosen by the preprocessor.
#[derive(Debug)]
pub enum Access {
    /// Iterate every live row
    Scan { cursor: usize },
    /// Resolve at most one row through the key index
    Key { done: bool },
    /// Walk the value list of one general index
    General {
        index: usize,
        cursor: RowId,
        primed: bool,
    },
}

/// Goal call against a predicate's table.
#[derive(Debug)]
pub struct TableCall {
    pub(crate) predicate: PredicateId,
    pub(crate) match_ops: Vec<MatchOp>,
    pub(crate) access: Access,
}

impl TableCall {
    fn reset(&mut self) {
        match &mut self.access {
            Access::Scan { cursor } => *cursor = 0,
            Access::Key { done } => *done = false,
            Access::General { cursor, primed, .. } => {
                *cursor = NO_ROW;
                *primed = false;
            }
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        let predicates = cx.predicates;
        let table = predicates[self.predicate.index()].table();

        match &mut self.access {
            Access::Scan { cursor } => {
                while *cursor < table.len() {
                    let row = table.row(*cursor as RowId);
                    *cursor += 1;
                    if reads_match(&self.match_ops, row, cx.frame) {
                        write_columns(&self.match_ops, row, cx.frame);
                        return Ok(true);
                    }
                }
                Ok(false)
            }

            Access::Key { done } => {
                if *done {
                    return Ok(false);
                }
                *done = true;
                let Some(key_index) = table.key_index() else {
                    return Ok(false);
                };
                let mut key = Vec::with_capacity(key_index.columns().len());
                for &col in key_index.columns() {
                    match read_value(&self.match_ops[col], cx.frame) {
                        Some(v) => key.push(v),
                        None => return Ok(false),
                    }
                }
                let row_id = key_index.row_with_key(&Tuple::new(key));
                if !valid_row(row_id) {
                    return Ok(false);
                }
                let row = table.row(row_id);
                if reads_match(&self.match_ops, row, cx.frame) {
                    write_columns(&self.match_ops, row, cx.frame);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }

            Access::General { index, cursor, primed } => {
                let ix = table.general_index(*index);
                if !*primed {
                    *primed = true;
                    let value = match read_value(&self.match_ops[ix.column()], cx.frame) {
                        Some(v) => v,
                        None => return Ok(false),
                    };
                    *cursor = ix.first_row_with_value(&value);
                }
                while *cursor != NO_ROW {
                    let row_id = *cursor;
                    *cursor = ix.next_row_with_value(row_id);
                    let row = table.row(row_id);
                    if reads_match(&self.match_ops, row, cx.frame) {
                        write_columns(&self.match_ops, row, cx.frame);
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Left-to-right conjunction with rightmost-first backtracking.
#[derive(Debug)]
pub struct AndCall {
    pub(crate) children: Vec<Call>,
    pos: usize,
    done: bool,
}

impl AndCall {
    pub(crate) fn new(children: Vec<Call>) -> AndCall {
        AndCall {
            children,
            pos: 0,
            done: false,
        }
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.done = false;
        if let Some(first) = self.children.first_mut() {
            first.reset();
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        let n = self.children.len();
        if n == 0 {
            // An all-pruned body is trivially true: one empty solution.
            self.done = true;
            return Ok(true);
        }
        let mut pos = self.pos.min(n - 1);
        loop {
            if self.children[pos].next(cx)? {
                if pos == n - 1 {
                    self.pos = n;
                    return Ok(true);
                }
                pos += 1;
                self.children[pos].reset();
            } else {
                if pos == 0 {
                    self.pos = 0;
                    self.done = true;
                    return Ok(false);
                }
                pos -= 1;
            }
        }
    }
}

/// Ordered disjunction: branches tried left to right, each drained fully.
#[derive(Debug)]
pub struct OrCall {
    pub(crate) branches: Vec<Call>,
    current: usize,
    started: bool,
}

impl OrCall {
    pub(crate) fn new(branches: Vec<Call>) -> OrCall {
        OrCall {
            branches,
            current: 0,
            started: false,
        }
    }

    fn reset(&mut self) {
        self.current = 0;
        self.started = false;
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        while self.current < self.branches.len() {
            if !self.started {
                self.branches[self.current].reset();
                self.started = true;
            }
            if self.branches[self.current].next(cx)? {
                return Ok(true);
            }
            self.current += 1;
            self.started = false;
        }
        Ok(false)
    }
}

/// Negation as failure over a scoped sub-body. Publishes no bindings.
#[derive(Debug)]
pub struct NotCall {
    pub(crate) body: Box<Call>,
    done: bool,
}

impl NotCall {
    pub(crate) fn new(body: Call) -> NotCall {
        NotCall {
            body: Box::new(body),
            done: false,
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        self.body.reset();
        Ok(!self.body.next(cx)?)
    }
}

/// At most one solution from the sub-body.
#[derive(Debug)]
pub struct OnceCall {
    pub(crate) body: Box<Call>,
    done: bool,
}

impl OnceCall {
    pub(crate) fn new(body: Call) -> OnceCall {
        OnceCall {
            body: Box::new(body),
            done: false,
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        self.body.reset();
        self.body.next(cx)
    }
}

/// At most `max` solutions from the sub-body.
#[derive(Debug)]
pub struct LimitCall {
    pub(crate) max: usize,
    pub(crate) body: Box<Call>,
    yielded: usize,
}

impl LimitCall {
    pub(crate) fn new(max: usize, body: Call) -> LimitCall {
        LimitCall {
            max,
            body: Box::new(body),
            yielded: 0,
        }
    }

    fn reset(&mut self) {
        self.yielded = 0;
        self.body.reset();
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.yielded >= self.max {
            return Ok(false);
        }
        if self.body.next(cx)? {
            self.yielded += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Committed choice: the first branch that yields wins, no re-entry into it
/// or any later branch.
#[derive(Debug)]
pub struct FirstOfCall {
    pub(crate) branches: Vec<Call>,
    done: bool,
}

impl FirstOfCall {
    pub(crate) fn new(branches: Vec<Call>) -> FirstOfCall {
        FirstOfCall {
            branches,
            done: false,
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        for branch in &mut self.branches {
            branch.reset();
            if branch.next(cx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Collection membership: generate elements when the item is write-mode,
/// test membership when it is read-mode.
#[derive(Debug)]
pub struct InCall {
    pub(crate) item: MatchOp,
    pub(crate) collection: Expr,
    items: Vec<Value>,
    pos: usize,
    primed: bool,
    done: bool,
}

impl InCall {
    pub(crate) fn new(item: MatchOp, collection: Expr) -> InCall {
        InCall {
            item,
            collection,
            items: Vec::new(),
            pos: 0,
            primed: false,
            done: false,
        }
    }

    fn reset(&mut self) {
        self.items.clear();
        self.pos = 0;
        self.primed = false;
        self.done = false;
    }

    fn load(&mut self, cx: &mut EvalCx<'_>) -> Result<()> {
        if self.primed {
            return Ok(());
        }
        self.primed = true;
        let collection = self.collection.eval(cx.frame, cx.ops)?;
        match collection.as_list() {
            Some(items) => {
                self.items = items.to_vec();
                Ok(())
            }
            None => Err(Error::BadTerm(format!(
                "In requires a list collection, got {}",
                collection.data_type()
            ))),
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        self.load(cx)?;
        match self.item.clone() {
            MatchOp::Write(cell) => {
                if self.pos < self.items.len() {
                    cx.frame[cell] = self.items[self.pos].clone();
                    self.pos += 1;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            read_mode => {
                if self.done {
                    return Ok(false);
                }
                self.done = true;
                let value = match read_value(&read_mode, cx.frame) {
                    Some(v) => v,
                    None => return Ok(false),
                };
                Ok(self.items.contains(&value))
            }
        }
    }
}

/// Compute a functional expression once per solution and bind or compare
/// the target.
#[derive(Debug)]
pub struct EvalCall {
    pub(crate) target: MatchOp,
    pub(crate) expr: Expr,
    done: bool,
}

impl EvalCall {
    pub(crate) fn new(target: MatchOp, expr: Expr) -> EvalCall {
        EvalCall {
            target,
            expr,
            done: false,
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        let value = self.expr.eval(cx.frame, cx.ops)?;
        Ok(settle(&self.target, value, cx.frame))
    }
}

/// Comparison over two bound expressions.
#[derive(Debug)]
pub struct CompareCall {
    pub(crate) op: CmpOp,
    pub(crate) left: Expr,
    pub(crate) right: Expr,
    done: bool,
}

impl CompareCall {
    pub(crate) fn new(op: CmpOp, left: Expr, right: Expr) -> CompareCall {
        CompareCall {
            op,
            left,
            right,
            done: false,
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        let left = self.left.eval(cx.frame, cx.ops)?;
        let right = self.right.eval(cx.frame, cx.ops)?;
        cx.ops.compare(self.op, &left, &right)
    }
}

/// Succeed with the given probability.
#[derive(Debug)]
pub struct ProbCall {
    pub(crate) p: Expr,
    done: bool,
}

impl ProbCall {
    pub(crate) fn new(p: Expr) -> ProbCall {
        ProbCall { p, done: false }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        let p = self.p.eval(cx.frame, cx.ops)?;
        let p = p
            .as_float()
            .ok_or_else(|| Error::BadTerm(format!("Prob requires a number, got {}", p.data_type())))?;
        Ok(cx.rng.f64() < p)
    }
}

/// Bind arguments against one uniformly selected row; ends when the table
/// is empty or the chosen row fails a read-mode check.
#[derive(Debug)]
pub struct RandomCall {
    pub(crate) predicate: PredicateId,
    pub(crate) match_ops: Vec<MatchOp>,
    done: bool,
}

impl RandomCall {
    pub(crate) fn new(predicate: PredicateId, match_ops: Vec<MatchOp>) -> RandomCall {
        RandomCall {
            predicate,
            match_ops,
            done: false,
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        let predicates = cx.predicates;
        let table = predicates[self.predicate.index()].table();
        if table.is_empty() {
            return Ok(false);
        }
        let row = table.row(cx.rng.index(table.len()) as RowId);
        if reads_match(&self.match_ops, row, cx.frame) {
            write_columns(&self.match_ops, row, cx.frame);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Bind the target to one uniformly chosen literal.
#[derive(Debug)]
pub struct PickCall {
    pub(crate) target: MatchOp,
    pub(crate) choices: Vec<Value>,
    done: bool,
}

impl PickCall {
    pub(crate) fn new(target: MatchOp, choices: Vec<Value>) -> PickCall {
        PickCall {
            target,
            choices,
            done: false,
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        if self.choices.is_empty() {
            return Ok(false);
        }
        let choice = self.choices[cx.rng.index(self.choices.len())].clone();
        Ok(settle(&self.target, choice, cx.frame))
    }
}

/// Fold every solution of the sub-body into a single aggregate, then yield
/// once with the result.
#[derive(Debug)]
pub struct AggregateCall {
    pub(crate) op: AggregateOp,
    pub(crate) target: MatchOp,
    pub(crate) over: Option<Expr>,
    pub(crate) body: Box<Call>,
    done: bool,
}

impl AggregateCall {
    pub(crate) fn new(op: AggregateOp, target: MatchOp, over: Option<Expr>, body: Call) -> AggregateCall {
        AggregateCall {
            op,
            target,
            over,
            body: Box::new(body),
            done: false,
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        self.body.reset();

        if self.op == AggregateOp::Count {
            let mut count: i64 = 0;
            while self.body.next(cx)? {
                count += 1;
            }
            return Ok(settle(&self.target, Value::Int(count), cx.frame));
        }

        let over = self
            .over
            .as_ref()
            .ok_or_else(|| Error::BadTerm(format!("{} needs a value to aggregate", self.op.as_str())))?
            .clone();
        let mut acc: Option<Value> = None;
        while self.body.next(cx)? {
            let v = over.eval(cx.frame, cx.ops)?;
            acc = Some(match acc {
                None => v,
                Some(a) => match self.op {
                    AggregateOp::Sum => cx.ops.binary(FuncOp::Add, &a, &v)?,
                    AggregateOp::Min => cx.ops.binary(FuncOp::Min, &a, &v)?,
                    AggregateOp::Max => cx.ops.binary(FuncOp::Max, &a, &v)?,
                    AggregateOp::Count => a,
                },
            });
        }
        match (acc, self.op) {
            (Some(result), _) => Ok(settle(&self.target, result, cx.frame)),
            // An empty sum is zero; an empty min/max has no witness.
            (None, AggregateOp::Sum) => Ok(settle(&self.target, Value::Int(0), cx.frame)),
            (None, _) => Ok(false),
        }
    }
}

/// Bind the target value for which the body's score is extremal, provided
/// the body has at least one solution.
#[derive(Debug)]
pub struct ExtremalCall {
    pub(crate) target: CellId,
    pub(crate) score: CellId,
    pub(crate) maximize: bool,
    pub(crate) body: Box<Call>,
    done: bool,
}

impl ExtremalCall {
    pub(crate) fn new(target: CellId, score: CellId, maximize: bool, body: Call) -> ExtremalCall {
        ExtremalCall {
            target,
            score,
            maximize,
            body: Box::new(body),
            done: false,
        }
    }

    fn next(&mut self, cx: &mut EvalCx<'_>) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        self.body.reset();

        let mut best: Option<(Value, Value)> = None;
        while self.body.next(cx)? {
            let score = cx.frame[self.score].clone();
            let value = cx.frame[self.target].clone();
            best = Some(match best {
                None => (score, value),
                Some((best_score, best_value)) => {
                    let ord = score.compare(&best_score).ok_or_else(|| Error::UndefinedOperator {
                        op: "compare".to_string(),
                        left: score.data_type().to_string(),
                        right: best_score.data_type().to_string(),
                    })?;
                    let replace = if self.maximize {
                        ord == std::cmp::Ordering::Greater
                    } else {
                        ord == std::cmp::Ordering::Less
                    };
                    if replace {
                        (score, value)
                    } else {
                        (best_score, best_value)
                    }
                }
            });
        }
        match best {
            Some((score, value)) => {
                cx.frame[self.score] = score;
                cx.frame[self.target] = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
