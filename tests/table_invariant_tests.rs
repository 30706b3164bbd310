//! Universal storage invariants, checked over arbitrary operation
//! sequences: key-index bijection, general-index list/count consistency,
//! bucket sizing, uniqueness, and reclamation order.

use proptest::prelude::*;
use std::collections::HashMap;

use ted::{Table, Tuple, Value, NO_ROW};

fn row(key: i64, value: i64) -> Tuple {
    Tuple::new(vec![Value::Int(key), Value::Int(value)])
}

/// Check every documented invariant of a two-column table with a key index
/// on column 0 and a general index on column 1 against a model of the
/// expected live rows.
fn assert_invariants(table: &Table, model: &[(i64, i64)]) {
    assert_eq!(table.len(), model.len());
    assert!(table.capacity().is_power_of_two());

    // Rows match the model exactly, in order.
    for (i, &(k, v)) in model.iter().enumerate() {
        assert_eq!(table.row(i as u32), &row(k, v));
    }

    // Key index: bijection between keys and live rows, sized at twice the
    // table capacity.
    let ki = table.key_index().unwrap();
    assert_eq!(ki.bucket_count(), 2 * table.capacity());
    assert_eq!(ki.mask(), ki.bucket_count() - 1);
    assert_eq!(ki.entries().count(), model.len());
    for (i, &(k, _)) in model.iter().enumerate() {
        assert_eq!(ki.row_with_key(&Tuple::new(vec![Value::Int(k)])), i as u32);
    }

    // General index: per-value lists hold exactly the rows with that value,
    // and counts agree with list lengths.
    let gi = table.general_index_on(1).unwrap();
    assert_eq!(gi.bucket_count(), 2 * table.capacity());
    let mut by_value: HashMap<i64, Vec<u32>> = HashMap::new();
    for (i, &(_, v)) in model.iter().enumerate() {
        by_value.entry(v).or_default().push(i as u32);
    }
    for (&v, rows) in &by_value {
        let mut listed = Vec::new();
        let mut r = gi.first_row_with_value(&Value::Int(v));
        while r != NO_ROW {
            listed.push(r);
            r = gi.next_row_with_value(r);
        }
        listed.sort_unstable();
        assert_eq!(&listed, rows, "rows listed for value {v}");
        assert_eq!(gi.count_with_value(&Value::Int(v)), rows.len() as u32);
    }
    let absent = by_value.keys().max().copied().unwrap_or(0) + 1;
    assert_eq!(gi.first_row_with_value(&Value::Int(absent)), NO_ROW);
    assert_eq!(gi.count_with_value(&Value::Int(absent)), 0);
}

#[derive(Debug, Clone)]
enum Op {
    Add { key: i64, value: i64 },
    Replace { key: i64, value: i64 },
    Remove { pick: usize },
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0i64..40, 0i64..8).prop_map(|(key, value)| Op::Add { key, value }),
        2 => (0i64..40, 0i64..8).prop_map(|(key, value)| Op::Replace { key, value }),
        2 => (0usize..64).prop_map(|pick| Op::Remove { pick }),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #[test]
    fn prop_indices_stay_consistent(ops in proptest::collection::vec(op_strategy(), 1..120)) {
        let mut table = Table::new("t", 4);
        table.add_key_index(vec![0]).unwrap();
        table.add_general_index(1, None, true).unwrap();

        let mut model: Vec<(i64, i64)> = Vec::new();
        for op in ops {
            match op {
                Op::Add { key, value } => {
                    if model.iter().any(|&(k, _)| k == key) {
                        assert!(table.add(row(key, value)).is_err());
                    } else {
                        table.add(row(key, value)).unwrap();
                        model.push((key, value));
                    }
                }
                Op::Replace { key, value } => {
                    table.add_or_replace(row(key, value)).unwrap();
                    match model.iter_mut().find(|(k, _)| *k == key) {
                        Some(entry) => entry.1 = value,
                        None => model.push((key, value)),
                    }
                }
                Op::Remove { pick } => {
                    if !model.is_empty() {
                        let i = pick % model.len();
                        table.remove(i as u32).unwrap();
                        // Removal swaps the last row into the hole.
                        model.swap_remove(i);
                    }
                }
                Op::Clear => {
                    table.clear();
                    model.clear();
                }
            }
            assert_invariants(&table, &model);
        }
    }

    #[test]
    fn prop_uniqueness_holds_under_duplicates(values in proptest::collection::vec((0i64..6, 0i64..6), 1..80)) {
        let mut table = Table::new("set", 4);
        table.set_unique(true);

        let mut model: Vec<(i64, i64)> = Vec::new();
        for (a, b) in values {
            let added = table.add(row(a, b)).unwrap();
            if model.contains(&(a, b)) {
                assert!(added.is_none());
            } else {
                assert!(added.is_some());
                model.push((a, b));
            }
        }

        assert_eq!(table.len(), model.len());
        // No two live rows are equal.
        for i in 0..table.len() {
            for j in (i + 1)..table.len() {
                assert_ne!(table.row(i as u32), table.row(j as u32));
            }
        }
    }

    #[test]
    fn prop_reclamation_preserves_survivor_order(values in proptest::collection::vec(0i64..100, 1..200)) {
        let mut table = Table::new("r", 8);
        // Multiples of three are reclaimable.
        table.set_reclaim(Box::new(|t| matches!(t[0], Value::Int(v) if v % 3 == 0)));

        let mut inserted: Vec<i64> = Vec::new();
        for v in values {
            table.add(Tuple::new(vec![Value::Int(v)])).unwrap();
            inserted.push(v);
        }

        table.reclaim_now();
        let survivors: Vec<i64> = table.rows().iter().map(|t| t[0].as_int().unwrap()).collect();

        // Reclaimable rows are dropped (some already at overflow time);
        // everything else keeps its relative order.
        let expected: Vec<i64> = inserted.iter().copied().filter(|v| v % 3 != 0).collect();
        assert_eq!(survivors, expected);
        assert!(table.capacity().is_power_of_two());
    }
}

#[test]
fn test_enum_direct_bucket_count_tracks_variants() {
    use ted::{DataType, EnumType};

    let color = EnumType::new("Color", ["Red", "Green", "Blue"]);
    let mut table = Table::new("paint", 4);
    table.add_general_index(0, Some(color.len()), false).unwrap();

    for _ in 0..20 {
        for name in ["Red", "Blue"] {
            table
                .add(Tuple::new(vec![Value::enumeration(&color, name).unwrap()]))
                .unwrap();
        }
    }

    let gi = table.general_index_on(0).unwrap();
    assert!(gi.is_enum_direct());
    assert_eq!(gi.bucket_count(), 3);
    assert_eq!(gi.mask(), usize::MAX);
    assert_eq!(gi.count_with_value(&Value::enumeration(&color, "Red").unwrap()), 20);
    assert_eq!(gi.count_with_value(&Value::enumeration(&color, "Green").unwrap()), 0);
    let _ = DataType::Enum(color);
}
