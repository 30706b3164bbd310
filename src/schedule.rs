//! # Update Scheduling
//!
//! Dependency analysis over the predicate arena and the per-tick update
//! order. A predicate depends on every table its rules read, transitively
//! including tables reached through nested sub-bodies and higher-order
//! arguments; the scheduler topologically sorts the scheduled predicates so
//! every dependency is brought up to date before its readers.
//!
//! Cycles are rejected when rules are attached. Self-recursive predicates
//! would need an explicit fixed-point construct, which the update loop does
//! not provide.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::predicate::{Predicate, PredicateId};

/// Dependency edges among predicates: `edges[p]` is the set of predicates
/// whose tables `p`'s rules read.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<PredicateId, HashSet<PredicateId>>,
}

impl DependencyGraph {
    pub fn build(predicates: &[Predicate]) -> DependencyGraph {
        let mut edges: HashMap<PredicateId, HashSet<PredicateId>> = HashMap::new();
        for pred in predicates {
            let deps = edges.entry(pred.id()).or_default();
            for rule in pred.rules() {
                deps.extend(rule.dependencies().iter().copied());
            }
        }
        DependencyGraph { edges }
    }

    pub fn dependencies_of(&self, id: PredicateId) -> Option<&HashSet<PredicateId>> {
        self.edges.get(&id)
    }

    /// Whether `from` can reach `to` along dependency edges.
    pub fn reaches(&self, from: PredicateId, to: PredicateId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(p) = stack.pop() {
            if p == to {
                return true;
            }
            if !visited.insert(p) {
                continue;
            }
            if let Some(deps) = self.edges.get(&p) {
                stack.extend(deps.iter().copied());
            }
        }
        false
    }
}

/// Would attaching a rule with these dependencies to `head` close a cycle?
/// True also for direct self-recursion.
pub fn would_create_cycle(
    predicates: &[Predicate],
    head: PredicateId,
    deps: &HashSet<PredicateId>,
) -> bool {
    if deps.contains(&head) {
        return true;
    }
    let graph = DependencyGraph::build(predicates);
    deps.iter().any(|&d| graph.reaches(d, head))
}

/// Predicates the per-tick loop visits: every dynamic predicate, plus
/// intensional static predicates (derived once, on the first update).
fn scheduled(predicates: &[Predicate]) -> Vec<PredicateId> {
    predicates
        .iter()
        .filter(|p| p.is_dynamic() || p.is_intensional())
        .map(|p| p.id())
        .collect()
}

/// Topological update order. Predicates with no incoming dependencies rank
/// first; ties resolve in declaration order so runs are reproducible.
pub fn update_order(predicates: &[Predicate]) -> Result<Vec<PredicateId>> {
    let graph = DependencyGraph::build(predicates);
    let nodes = scheduled(predicates);
    let node_set: HashSet<PredicateId> = nodes.iter().copied().collect();

    // Count only dependencies that are themselves scheduled; static
    // extensional tables are always ready.
    let mut remaining: HashMap<PredicateId, usize> = nodes
        .iter()
        .map(|&p| {
            let n = graph
                .dependencies_of(p)
                .map(|deps| deps.iter().filter(|d| node_set.contains(d) && **d != p).count())
                .unwrap_or(0);
            (p, n)
        })
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    let mut emitted: HashSet<PredicateId> = HashSet::new();
    while order.len() < nodes.len() {
        let mut advanced = false;
        for &p in &nodes {
            if emitted.contains(&p) {
                continue;
            }
            if remaining.get(&p).copied().unwrap_or(0) == 0 {
                emitted.insert(p);
                order.push(p);
                advanced = true;
                // Release everyone waiting on p.
                for &q in &nodes {
                    if emitted.contains(&q) {
                        continue;
                    }
                    if let Some(deps) = graph.dependencies_of(q) {
                        if deps.contains(&p) {
                            if let Some(n) = remaining.get_mut(&q) {
                                *n = n.saturating_sub(1);
                            }
                        }
                    }
                }
            }
        }
        if !advanced {
            let stuck = nodes
                .iter()
                .find(|p| !emitted.contains(p))
                .map(|p| predicates[p.index()].name().to_string())
                .unwrap_or_default();
            return Err(Error::RecursiveRule(stuck));
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Timing;
    use crate::value::{DataType, TupleSchema};

    fn pred(index: usize, name: &str, timing: Timing) -> Predicate {
        Predicate::new(
            PredicateId::from_index(index),
            name.to_string(),
            TupleSchema::new(vec![("x".to_string(), DataType::Int)]),
            timing,
            4,
        )
    }

    fn attach_dep(p: &mut Predicate, on: &[usize]) {
        use crate::eval::{AndCall, Call, CompiledRule};
        let deps = on.iter().map(|&i| PredicateId::from_index(i)).collect();
        p.rules.push(CompiledRule {
            root: Call::And(AndCall::new(Vec::new())),
            head: Vec::new(),
            cell_count: 0,
            deps,
        });
    }

    #[test]
    fn test_order_respects_dependencies() {
        let mut preds = vec![
            pred(0, "base", Timing::Dynamic),
            pred(1, "mid", Timing::Dynamic),
            pred(2, "top", Timing::Dynamic),
        ];
        attach_dep(&mut preds[2], &[1]);
        attach_dep(&mut preds[1], &[0]);

        let order = update_order(&preds).unwrap();
        let pos = |i: usize| {
            order
                .iter()
                .position(|p| p.index() == i)
                .unwrap()
        };
        assert!(pos(0) < pos(1));
        assert!(pos(1) < pos(2));
    }

    #[test]
    fn test_static_extensional_not_scheduled() {
        let mut preds = vec![pred(0, "constants", Timing::Static), pred(1, "derived", Timing::Dynamic)];
        attach_dep(&mut preds[1], &[0]);

        let order = update_order(&preds).unwrap();
        assert_eq!(order.len(), 1);
        assert_eq!(order[0].index(), 1);
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut preds = vec![pred(0, "a", Timing::Dynamic), pred(1, "b", Timing::Dynamic)];
        attach_dep(&mut preds[0], &[1]);
        attach_dep(&mut preds[1], &[0]);

        assert!(matches!(update_order(&preds), Err(Error::RecursiveRule(_))));
    }

    #[test]
    fn test_would_create_cycle() {
        let mut preds = vec![pred(0, "a", Timing::Dynamic), pred(1, "b", Timing::Dynamic)];
        attach_dep(&mut preds[1], &[0]);

        // a depending on b would close a <- b <- a.
        let deps: HashSet<PredicateId> = [PredicateId::from_index(1)].into_iter().collect();
        assert!(would_create_cycle(&preds, PredicateId::from_index(0), &deps));

        // Self-recursion counts.
        let self_dep: HashSet<PredicateId> = [PredicateId::from_index(0)].into_iter().collect();
        assert!(would_create_cycle(&preds, PredicateId::from_index(0), &self_dep));

        // b -> a is already there and closes nothing new.
        let fine: HashSet<PredicateId> = [PredicateId::from_index(0)].into_iter().collect();
        assert!(!would_create_cycle(&preds, PredicateId::from_index(1), &fine));
    }
}
