//! # Program
//!
//! A program owns the predicate arena, the operator table, the RNG and the
//! per-tick scheduler. `update()` is one tick: dynamic predicates are
//! brought up to date in topological dependency order, each through the
//! same pipeline (clear if derived, initial values on the first tick,
//! additive input merge, rule firing, keyed column updates).
//!
//! During rule evaluation every table is read-only; derived rows are staged
//! and merged after each rule finishes, so a determinism error leaves the
//! offending table exactly as it was before the offending insert.

use std::collections::HashMap;
use std::mem;

use tracing::{debug, trace};

use crate::ast::{Goal, Term};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::eval::{CompiledRule, EvalCx, OpTable};
use crate::predicate::{ColumnUpdate, Predicate, PredicateId, Timing};
use crate::preprocess::Preprocessor;
use crate::rng::EngineRng;
use crate::schedule;
use crate::table::{valid_row, ReclaimFn};
use crate::value::{DataType, Tuple, TupleSchema, Value};

/// One logical simulation: predicates, rules, and their update loop.
pub struct Program {
    name: String,
    predicates: Vec<Predicate>,
    by_name: HashMap<String, PredicateId>,
    rng: EngineRng,
    ops: OpTable,
    config: EngineConfig,
    update_order: Option<Vec<PredicateId>>,
    tick: u64,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Program {
        Program::with_config(name, EngineConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: EngineConfig) -> Program {
        Program {
            name: name.into(),
            predicates: Vec::new(),
            by_name: HashMap::new(),
            rng: EngineRng::with_seed(config.seed),
            ops: OpTable::new(),
            config,
            update_order: None,
            tick: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ticks completed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Reseed the program RNG; the next update draws a fresh stream.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng.set_seed(seed);
    }

    /// Operator table for host-registered overrides.
    pub fn op_table_mut(&mut self) -> &mut OpTable {
        &mut self.ops
    }

    pub(crate) fn op_table(&self) -> &OpTable {
        &self.ops
    }

    // ========================================================================
    // Declaration surface
    // ========================================================================

    /// Declare a predicate with named, typed columns.
    pub fn add_predicate(
        &mut self,
        name: &str,
        columns: Vec<(&str, DataType)>,
        timing: Timing,
    ) -> Result<PredicateId> {
        if self.by_name.contains_key(name) {
            return Err(Error::DuplicatePredicate(name.to_string()));
        }
        let id = PredicateId::from_index(self.predicates.len());
        let schema = TupleSchema::new(
            columns
                .into_iter()
                .map(|(n, ty)| (n.to_string(), ty))
                .collect(),
        );
        let mut pred = Predicate::new(id, name.to_string(), schema, timing, self.config.initial_capacity);
        pred.table_mut()
            .set_post_compaction_target_load(self.config.post_compaction_target_load);
        self.predicates.push(pred);
        self.by_name.insert(name.to_string(), id);
        self.update_order = None;
        Ok(id)
    }

    /// Attach a rule deriving rows for `head`. The body is preprocessed
    /// immediately; a dependency cycle is rejected here.
    pub fn rule(&mut self, head: PredicateId, head_terms: Vec<Term>, body: Vec<Goal>) -> Result<()> {
        let compiled = {
            let mut preprocessor =
                Preprocessor::new(&self.predicates, &self.ops, self.config.raise_on_dead_rule);
            preprocessor.compile_rule(head, &head_terms, &body)?
        };
        if schedule::would_create_cycle(&self.predicates, head, compiled.dependencies()) {
            return Err(Error::RecursiveRule(
                self.predicates[head.index()].name().to_string(),
            ));
        }
        self.predicates[head.index()].rules.push(compiled);
        self.update_order = None;
        Ok(())
    }

    /// Declare a general index over one column. Enumerated columns get a
    /// direct-addressed index; extensional tables get back-links so keyed
    /// updates can relink rows in place.
    pub fn index_by(&mut self, id: PredicateId, column: &str) -> Result<()> {
        let pred = &mut self.predicates[id.index()];
        let col = pred.column_index(column)?;
        let variants = pred.enum_variant_count(col);
        let mutable = pred.is_extensional();
        pred.table_mut().add_general_index(col, variants, mutable)
    }

    /// Declare the unique-key index over one column.
    pub fn index_by_key(&mut self, id: PredicateId, column: &str) -> Result<()> {
        let pred = &mut self.predicates[id.index()];
        let col = pred.column_index(column)?;
        pred.table_mut().add_key_index(vec![col])
    }

    /// Declare the unique-key index over several columns; probes project a
    /// tuple key.
    pub fn index_by_key_columns(&mut self, id: PredicateId, columns: &[&str]) -> Result<()> {
        let pred = &mut self.predicates[id.index()];
        let mut cols = Vec::with_capacity(columns.len());
        for c in columns {
            cols.push(pred.column_index(c)?);
        }
        pred.table_mut().add_key_index(cols)
    }

    /// Override the preprocessor priority of the index over `column`.
    pub fn set_index_priority(&mut self, id: PredicateId, column: &str, priority: u32) -> Result<()> {
        let pred = &mut self.predicates[id.index()];
        let col = pred.column_index(column)?;
        pred.table_mut().set_index_priority(col, priority);
        Ok(())
    }

    /// Enforce row uniqueness (set semantics) on a predicate's table.
    pub fn set_unique(&mut self, id: PredicateId, unique: bool) {
        self.predicates[id.index()].table_mut().set_unique(unique);
    }

    /// Install a reclamation test; on overflow, rows passing it are dropped
    /// instead of growing the table.
    pub fn set_reclaim(&mut self, id: PredicateId, test: ReclaimFn) {
        self.predicates[id.index()].table_mut().set_reclaim(test);
    }

    // ========================================================================
    // Data surface
    // ========================================================================

    pub fn lookup(&self, name: &str) -> Result<PredicateId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UndefinedPredicate(name.to_string()))
    }

    pub fn predicate(&self, id: PredicateId) -> &Predicate {
        &self.predicates[id.index()]
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn rows(&self, id: PredicateId) -> &[Tuple] {
        self.predicates[id.index()].rows()
    }

    /// Rows applied once, on the first update. Static extensional tables
    /// are host-owned and take the rows immediately.
    pub fn initially(&mut self, id: PredicateId, row: Vec<Value>) -> Result<()> {
        let pred = &mut self.predicates[id.index()];
        if pred.is_intensional() {
            return Err(Error::DerivedPredicate(pred.name().to_string()));
        }
        let row = Tuple::new(row);
        pred.validate_row(&row)?;
        if pred.is_dynamic() {
            pred.initially.push(row);
        } else {
            pred.table_mut().add(row)?;
        }
        Ok(())
    }

    /// Additive input: merged into the table at the start of the next tick.
    /// Static extensional tables take the row immediately.
    pub fn insert(&mut self, id: PredicateId, row: Vec<Value>) -> Result<()> {
        let pred = &mut self.predicates[id.index()];
        if pred.is_intensional() {
            return Err(Error::DerivedPredicate(pred.name().to_string()));
        }
        let row = Tuple::new(row);
        pred.validate_row(&row)?;
        if pred.is_dynamic() {
            pred.pending_inputs.push(row);
        } else {
            pred.table_mut().add(row)?;
        }
        Ok(())
    }

    /// Keyed column update, applied at end of the next tick through the key
    /// index.
    pub fn set(&mut self, id: PredicateId, key: Vec<Value>, column: &str, value: Value) -> Result<()> {
        let pred = &mut self.predicates[id.index()];
        if pred.is_intensional() {
            return Err(Error::DerivedPredicate(pred.name().to_string()));
        }
        if pred.table().key_index().is_none() {
            return Err(Error::KeyIndexRequired(pred.name().to_string()));
        }
        let col = pred.column_index(column)?;
        pred.pending_updates.push(ColumnUpdate {
            column: col,
            key: Tuple::new(key),
            value,
        });
        Ok(())
    }

    // ========================================================================
    // The tick
    // ========================================================================

    /// Bring every dynamic predicate up to date, in dependency order.
    pub fn update(&mut self) -> Result<()> {
        let order = match &self.update_order {
            Some(order) => order.clone(),
            None => {
                let order = schedule::update_order(&self.predicates)?;
                self.update_order = Some(order.clone());
                order
            }
        };

        let first_tick = self.tick == 0;
        debug!(program = %self.name, tick = self.tick, "update");

        for pid in order {
            {
                let pred = &mut self.predicates[pid.index()];
                // Intensional static predicates derive once, on tick zero.
                if !pred.is_dynamic() && !first_tick {
                    continue;
                }
                trace!(predicate = %pred.name(), "bringing up to date");
                if pred.is_intensional() && pred.is_dynamic() {
                    pred.table_mut().clear();
                }
                if first_tick {
                    let rows = mem::take(&mut pred.initially);
                    for row in rows {
                        pred.table_mut().add(row)?;
                    }
                }
                let inputs = mem::take(&mut pred.pending_inputs);
                for row in inputs {
                    pred.table_mut().add(row)?;
                }
            }

            if self.predicates[pid.index()].is_intensional() {
                self.fire_rules(pid)?;
            }

            let pred = &mut self.predicates[pid.index()];
            let updates = mem::take(&mut pred.pending_updates);
            for update in updates {
                let row = pred.table().row_with_key(&update.key)?;
                if !valid_row(row) {
                    return Err(Error::MissingKey {
                        predicate: pred.name().to_string(),
                        key: update.key.to_string(),
                    });
                }
                pred.table_mut().update_column(row, update.column, update.value)?;
            }
        }

        self.tick += 1;
        Ok(())
    }

    fn fire_rules(&mut self, pid: PredicateId) -> Result<()> {
        // Rules come out of the arena for the duration of the firing so the
        // call trees can hold mutable state while every table stays
        // readable.
        let mut rules = mem::take(&mut self.predicates[pid.index()].rules);
        let outcome = self.run_rules(pid, &mut rules);
        self.predicates[pid.index()].rules = rules;
        outcome
    }

    fn run_rules(&mut self, pid: PredicateId, rules: &mut [CompiledRule]) -> Result<()> {
        for (i, rule) in rules.iter_mut().enumerate() {
            let mut frame = rule.new_frame();
            rule.root.reset();
            let mut staged = Vec::new();
            loop {
                let produced = {
                    let mut cx = EvalCx {
                        predicates: &self.predicates,
                        frame: &mut frame,
                        rng: &mut self.rng,
                        ops: &self.ops,
                    };
                    rule.root.next(&mut cx)?
                };
                if !produced {
                    break;
                }
                staged.push(rule.head_tuple(&frame));
            }
            trace!(
                predicate = %self.predicates[pid.index()].name(),
                rule = i,
                derived = staged.len(),
                "rule fired"
            );
            let table = self.predicates[pid.index()].table_mut();
            for row in staged {
                table.add(row)?;
            }
        }
        Ok(())
    }

    /// Evaluate a compiled body once, outside the tick, collecting one head
    /// tuple per solution. Used by the query collaborator.
    pub(crate) fn run_detached(&mut self, rule: &mut CompiledRule) -> Result<Vec<Tuple>> {
        let mut frame = rule.new_frame();
        rule.root.reset();
        let mut out = Vec::new();
        loop {
            let produced = {
                let mut cx = EvalCx {
                    predicates: &self.predicates,
                    frame: &mut frame,
                    rng: &mut self.rng,
                    ops: &self.ops,
                };
                rule.root.next(&mut cx)?
            };
            if !produced {
                break;
            }
            out.push(rule.head_tuple(&frame));
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("predicates", &self.predicates.len())
            .field("tick", &self.tick)
            .finish()
    }
}
