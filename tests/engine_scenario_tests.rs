//! End-to-end scenarios: declare predicates, attach rules, tick, and check
//! the derived tables against hand-computed results.

use ted::ast::builders::*;
use ted::{CmpOp, DataType, EnumType, Error, FuncOp, Program, Term, Timing, Tuple, Value, Var};

fn ints(values: &[i64]) -> Vec<Tuple> {
    values.iter().map(|&v| Tuple::new(vec![Value::Int(v)])).collect()
}

fn int_var(name: &str) -> Var {
    Var::new(name, DataType::Int)
}

/// Static single-column Int predicate populated with the given values.
fn int_relation(program: &mut Program, name: &str, values: &[i64]) -> ted::PredicateId {
    let id = program
        .add_predicate(name, vec![("n", DataType::Int)], Timing::Static)
        .unwrap();
    for &v in values {
        program.insert(id, vec![Value::Int(v)]).unwrap();
    }
    id
}

#[test]
fn test_intersection_rule() {
    let mut program = Program::new("intersection");
    let p = int_relation(&mut program, "p", &[1, 2, 3, 4, 5, 6]);
    let q = int_relation(&mut program, "q", &[2, 4, 6, 8, 10]);
    let r = program
        .add_predicate("r", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();

    let a = int_var("a");
    program
        .rule(
            r,
            vec![Term::var(&a)],
            vec![atom(p, vec![Term::var(&a)]), atom(q, vec![Term::var(&a)])],
        )
        .unwrap();

    program.update().unwrap();
    assert_eq!(program.rows(r), ints(&[2, 4, 6]).as_slice());
}

#[test]
fn test_symmetric_difference_via_dual_rules() {
    let mut program = Program::new("symdiff");
    let p = int_relation(&mut program, "p", &[1, 2, 3, 4, 5, 6]);
    let q = int_relation(&mut program, "q", &[2, 4, 6, 8, 10]);
    let r = program
        .add_predicate("r", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();

    let a = int_var("a");
    program
        .rule(
            r,
            vec![Term::var(&a)],
            vec![atom(p, vec![Term::var(&a)]), not(atom(q, vec![Term::var(&a)]))],
        )
        .unwrap();
    program
        .rule(
            r,
            vec![Term::var(&a)],
            vec![atom(q, vec![Term::var(&a)]), not(atom(p, vec![Term::var(&a)]))],
        )
        .unwrap();

    program.update().unwrap();
    assert_eq!(program.rows(r), ints(&[1, 3, 5, 8, 10]).as_slice());
}

#[test]
fn test_key_indexed_join_follows_iteration_order() {
    let day = EnumType::new("Day", ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]);
    let on = |name: &str| Value::enumeration(&day, name).unwrap();

    let mut program = Program::new("week");
    let days = program
        .add_predicate("day", vec![("d", DataType::Enum(day.clone()))], Timing::Static)
        .unwrap();
    let next_day = program
        .add_predicate(
            "next_day",
            vec![
                ("d", DataType::Enum(day.clone())),
                ("n", DataType::Enum(day.clone())),
            ],
            Timing::Static,
        )
        .unwrap();
    program.index_by_key(next_day, "d").unwrap();

    let names = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for name in names {
        program.insert(days, vec![on(name)]).unwrap();
    }
    for pair in names.windows(2) {
        program.insert(next_day, vec![on(pair[0]), on(pair[1])]).unwrap();
    }
    program.insert(next_day, vec![on("Sun"), on("Mon")]).unwrap();

    let m = program
        .add_predicate(
            "m",
            vec![
                ("d", DataType::Enum(day.clone())),
                ("n", DataType::Enum(day.clone())),
            ],
            Timing::Dynamic,
        )
        .unwrap();
    let d = Var::new("d", DataType::Enum(day.clone()));
    let n = Var::new("n", DataType::Enum(day.clone()));
    program
        .rule(
            m,
            vec![Term::var(&d), Term::var(&n)],
            vec![
                atom(days, vec![Term::var(&d)]),
                atom(next_day, vec![Term::var(&d), Term::var(&n)]),
            ],
        )
        .unwrap();

    program.update().unwrap();
    // One row per day, in day-iteration order.
    let expected: Vec<Tuple> = names
        .iter()
        .enumerate()
        .map(|(i, name)| Tuple::new(vec![on(name), on(names[(i + 1) % names.len()])]))
        .collect();
    assert_eq!(program.rows(m), expected.as_slice());
}

#[test]
fn test_first_of_commits_to_one_branch() {
    let mut program = Program::new("firstof");
    let p = int_relation(&mut program, "p", &[1, 2, 3, 4, 5, 6]);
    let q = program
        .add_predicate("q", vec![("label", DataType::Str)], Timing::Dynamic)
        .unwrap();

    let a = int_var("a");
    let b = Var::new("b", DataType::Str);
    let odd = cmp(
        CmpOp::Eq,
        apply2(FuncOp::Mod, Term::var(&a), Term::val(2i64)),
        Term::val(1i64),
    );
    program
        .rule(
            q,
            vec![Term::var(&b)],
            vec![
                atom(p, vec![Term::var(&a)]),
                first_of(vec![
                    and(vec![odd, eval(Term::var(&b), text("odd"))]),
                    eval(Term::var(&b), text("even")),
                ]),
            ],
        )
        .unwrap();

    program.update().unwrap();
    let labels: Vec<&str> = program
        .rows(q)
        .iter()
        .map(|t| t[0].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["odd", "even", "odd", "even", "odd", "even"]);
}

#[test]
fn test_maximal_binds_the_argmax() {
    let mut program = Program::new("maximal");
    let test = program
        .add_predicate(
            "test",
            vec![("name", DataType::Str), ("age", DataType::Int)],
            Timing::Static,
        )
        .unwrap();
    for (name, age) in [("Alice", 9), ("Jenny", 12), ("Bob", 11)] {
        program
            .insert(test, vec![Value::string(name), Value::Int(age)])
            .unwrap();
    }

    let m = program
        .add_predicate(
            "m",
            vec![("name", DataType::Str), ("age", DataType::Float)],
            Timing::Dynamic,
        )
        .unwrap();
    let name = Var::new("name", DataType::Str);
    let age = int_var("age");
    let age_f = Var::new("age_f", DataType::Float);
    program
        .rule(
            m,
            vec![Term::var(&name), Term::var(&age_f)],
            vec![maximal(
                &name,
                &age_f,
                and(vec![
                    atom(test, vec![Term::var(&name), Term::var(&age)]),
                    eval(Term::var(&age_f), apply1(FuncOp::ToFloat, Term::var(&age))),
                ]),
            )],
        )
        .unwrap();

    program.update().unwrap();
    assert_eq!(
        program.rows(m),
        vec![Tuple::new(vec![Value::string("Jenny"), Value::Float(12.0)])].as_slice()
    );
}

#[test]
fn test_once_yields_a_single_solution() {
    let mut program = Program::new("once");
    let p = int_relation(&mut program, "p", &[1, 2, 3]);
    let q = program
        .add_predicate("q", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();

    let x = int_var("x");
    program
        .rule(q, vec![Term::var(&x)], vec![once(atom(p, vec![Term::var(&x)]))])
        .unwrap();

    program.update().unwrap();
    assert_eq!(program.rows(q), ints(&[1]).as_slice());
}

#[test]
fn test_general_index_self_join() {
    let mut program = Program::new("selfjoin");
    let p = program
        .add_predicate(
            "p",
            vec![("a", DataType::Int), ("b", DataType::Int)],
            Timing::Static,
        )
        .unwrap();
    program.index_by(p, "a").unwrap();
    for a in 0..10 {
        for b in (0..20).filter(|b| b % 2 == 0) {
            program.insert(p, vec![Value::Int(a), Value::Int(b)]).unwrap();
        }
    }

    let q = program
        .add_predicate(
            "q",
            vec![("i", DataType::Int), ("j", DataType::Int)],
            Timing::Dynamic,
        )
        .unwrap();
    let i = int_var("i");
    let j = int_var("j");
    program
        .rule(
            q,
            vec![Term::var(&i), Term::var(&j)],
            vec![
                atom(p, vec![Term::var(&i), Term::var(&j)]),
                atom(p, vec![Term::var(&j), Term::var(&i)]),
            ],
        )
        .unwrap();

    program.update().unwrap();

    let p_rows: std::collections::HashSet<(i64, i64)> = program
        .rows(p)
        .iter()
        .map(|t| (t[0].as_int().unwrap(), t[1].as_int().unwrap()))
        .collect();
    let derived: std::collections::HashSet<(i64, i64)> = program
        .rows(q)
        .iter()
        .map(|t| (t[0].as_int().unwrap(), t[1].as_int().unwrap()))
        .collect();
    let expected: std::collections::HashSet<(i64, i64)> = p_rows
        .iter()
        .copied()
        .filter(|&(i, j)| p_rows.contains(&(j, i)))
        .collect();
    assert_eq!(derived, expected);
    assert_eq!(derived.len(), 25);
}

#[test]
fn test_duplicate_key_aborts_and_preserves_table() {
    let mut program = Program::new("dupkey");
    let keyed = program
        .add_predicate(
            "keyed",
            vec![("id", DataType::Int), ("v", DataType::Int)],
            Timing::Dynamic,
        )
        .unwrap();
    program.index_by_key(keyed, "id").unwrap();

    program.insert(keyed, vec![Value::Int(1), Value::Int(10)]).unwrap();
    program.insert(keyed, vec![Value::Int(1), Value::Int(20)]).unwrap();

    let err = program.update().unwrap_err();
    assert!(matches!(err, Error::DuplicateKey { .. }));

    // The first insert landed; the offending one left no trace.
    assert_eq!(
        program.rows(keyed),
        vec![Tuple::new(vec![Value::Int(1), Value::Int(10)])].as_slice()
    );
}

#[test]
fn test_disjunction_covers_both_branches() {
    let mut program = Program::new("or");
    let p = int_relation(&mut program, "p", &[1, 2]);
    let q = int_relation(&mut program, "q", &[7, 8]);
    let r = program
        .add_predicate("r", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();

    let x = int_var("x");
    program
        .rule(
            r,
            vec![Term::var(&x)],
            vec![or(vec![atom(p, vec![Term::var(&x)]), atom(q, vec![Term::var(&x)])])],
        )
        .unwrap();

    program.update().unwrap();
    assert_eq!(program.rows(r), ints(&[1, 2, 7, 8]).as_slice());
}

#[test]
fn test_limit_truncates_solutions() {
    let mut program = Program::new("limit");
    let p = int_relation(&mut program, "p", &[1, 2, 3, 4, 5]);
    let r = program
        .add_predicate("r", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();

    let x = int_var("x");
    program
        .rule(
            r,
            vec![Term::var(&x)],
            vec![limit(2, atom(p, vec![Term::var(&x)]))],
        )
        .unwrap();

    program.update().unwrap();
    assert_eq!(program.rows(r), ints(&[1, 2]).as_slice());
}

#[test]
fn test_membership_generates_and_tests() {
    let mut program = Program::new("membership");
    let p = int_relation(&mut program, "p", &[2, 3, 4]);
    let gen = program
        .add_predicate("gen", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();
    let filtered = program
        .add_predicate("filtered", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();

    let x = int_var("x");
    let collection = Term::Const(Value::list([Value::Int(3), Value::Int(9)]));

    // Generate mode: x iterates the collection.
    program
        .rule(
            gen,
            vec![Term::var(&x)],
            vec![within(Term::var(&x), collection.clone())],
        )
        .unwrap();
    // Test mode: x comes from p and must be a member.
    program
        .rule(
            filtered,
            vec![Term::var(&x)],
            vec![
                atom(p, vec![Term::var(&x)]),
                within(Term::var(&x), collection),
            ],
        )
        .unwrap();

    program.update().unwrap();
    assert_eq!(program.rows(gen), ints(&[3, 9]).as_slice());
    assert_eq!(program.rows(filtered), ints(&[3]).as_slice());
}

#[test]
fn test_aggregates_fold_the_body() {
    let mut program = Program::new("aggregates");
    let p = int_relation(&mut program, "p", &[3, 1, 4, 1, 5]);
    let stats = program
        .add_predicate(
            "stats",
            vec![
                ("count", DataType::Int),
                ("total", DataType::Int),
                ("least", DataType::Int),
                ("greatest", DataType::Int),
            ],
            Timing::Dynamic,
        )
        .unwrap();

    let x = int_var("x");
    let c = int_var("c");
    let s = int_var("s");
    let lo = int_var("lo");
    let hi = int_var("hi");
    program
        .rule(
            stats,
            vec![Term::var(&c), Term::var(&s), Term::var(&lo), Term::var(&hi)],
            vec![
                count_of(&c, atom(p, vec![Term::var(&x)])),
                sum_of(&s, Term::var(&x), atom(p, vec![Term::var(&x)])),
                min_of(&lo, Term::var(&x), atom(p, vec![Term::var(&x)])),
                max_of(&hi, Term::var(&x), atom(p, vec![Term::var(&x)])),
            ],
        )
        .unwrap();

    program.update().unwrap();
    assert_eq!(
        program.rows(stats),
        vec![Tuple::new(vec![
            Value::Int(5),
            Value::Int(14),
            Value::Int(1),
            Value::Int(5),
        ])]
        .as_slice()
    );
}

#[test]
fn test_update_pipeline_initial_inputs_and_sets() {
    let mut program = Program::new("lifecycle");
    let unit = program
        .add_predicate(
            "unit",
            vec![("name", DataType::Str), ("hp", DataType::Int)],
            Timing::Dynamic,
        )
        .unwrap();
    program.index_by_key(unit, "name").unwrap();

    program
        .initially(unit, vec![Value::string("orc"), Value::Int(10)])
        .unwrap();
    program
        .set(unit, vec![Value::string("orc")], "hp", Value::Int(3))
        .unwrap();

    // Tick 1: initial row lands, then the keyed update mutates it.
    program.update().unwrap();
    assert_eq!(
        program.rows(unit),
        vec![Tuple::new(vec![Value::string("orc"), Value::Int(3)])].as_slice()
    );

    // Tick 2: additive input merges; existing rows persist.
    program
        .insert(unit, vec![Value::string("elf"), Value::Int(7)])
        .unwrap();
    program.update().unwrap();
    assert_eq!(program.rows(unit).len(), 2);

    // A keyed update against a missing key aborts the tick.
    program
        .set(unit, vec![Value::string("troll")], "hp", Value::Int(1))
        .unwrap();
    assert!(matches!(program.update(), Err(Error::MissingKey { .. })));
}

#[test]
fn test_derived_predicates_recompute_each_tick() {
    let mut program = Program::new("recompute");
    let base = program
        .add_predicate("base", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();
    let double = program
        .add_predicate("double", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();

    let x = int_var("x");
    program
        .rule(
            double,
            vec![apply2(FuncOp::Mul, Term::var(&x), Term::val(2i64))],
            vec![atom(base, vec![Term::var(&x)])],
        )
        .unwrap();

    program.insert(base, vec![Value::Int(1)]).unwrap();
    program.update().unwrap();
    assert_eq!(program.rows(double), ints(&[2]).as_slice());

    program.insert(base, vec![Value::Int(5)]).unwrap();
    program.update().unwrap();
    // Rederived from scratch: still one row per base row, no stale rows.
    assert_eq!(program.rows(double), ints(&[2, 10]).as_slice());
}

#[test]
fn test_rule_cycles_are_rejected_at_attach_time() {
    let mut program = Program::new("cycles");
    let a = program
        .add_predicate("a", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();
    let b = program
        .add_predicate("b", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();

    let x = int_var("x");
    // Self-recursion is rejected outright.
    let err = program
        .rule(a, vec![Term::var(&x)], vec![atom(a, vec![Term::var(&x)])])
        .unwrap_err();
    assert!(matches!(err, Error::RecursiveRule(_)));

    // A two-step cycle is rejected when the closing rule is attached.
    program
        .rule(a, vec![Term::var(&x)], vec![atom(b, vec![Term::var(&x)])])
        .unwrap();
    let err = program
        .rule(b, vec![Term::var(&x)], vec![atom(a, vec![Term::var(&x)])])
        .unwrap_err();
    assert!(matches!(err, Error::RecursiveRule(_)));
}

#[test]
fn test_fixed_seed_runs_are_identical() {
    fn build_and_run(seed: u64) -> (Vec<Tuple>, Vec<Tuple>) {
        let mut program = Program::new("random");
        program.set_seed(seed);
        let p = int_relation(&mut program, "p", &(1..=50).collect::<Vec<_>>());
        let kept = program
            .add_predicate("kept", vec![("n", DataType::Int)], Timing::Dynamic)
            .unwrap();
        let picked = program
            .add_predicate("picked", vec![("n", DataType::Int)], Timing::Dynamic)
            .unwrap();

        let x = int_var("x");
        program
            .rule(
                kept,
                vec![Term::var(&x)],
                vec![atom(p, vec![Term::var(&x)]), prob(0.5)],
            )
            .unwrap();
        program
            .rule(
                picked,
                vec![Term::var(&x)],
                vec![random_element(p, vec![Term::var(&x)])],
            )
            .unwrap();

        program.update().unwrap();
        (program.rows(kept).to_vec(), program.rows(picked).to_vec())
    }

    let (kept_a, picked_a) = build_and_run(42);
    let (kept_b, picked_b) = build_and_run(42);
    assert_eq!(kept_a, kept_b);
    assert_eq!(picked_a, picked_b);
    assert_eq!(picked_a.len(), 1);

    // Some elements survive, some do not.
    assert!(!kept_a.is_empty());
    assert!(kept_a.len() < 50);

    let (kept_c, _) = build_and_run(7);
    assert_ne!(kept_a, kept_c);
}

#[test]
fn test_pick_randomly_chooses_a_literal() {
    let mut program = Program::new("pick");
    program.set_seed(11);
    let coin = program
        .add_predicate("coin", vec![("face", DataType::Str)], Timing::Dynamic)
        .unwrap();

    let f = Var::new("f", DataType::Str);
    program
        .rule(
            coin,
            vec![Term::var(&f)],
            vec![pick_randomly(
                Term::var(&f),
                vec![Value::string("heads"), Value::string("tails")],
            )],
        )
        .unwrap();

    program.update().unwrap();
    let face = program.rows(coin)[0][0].as_str().unwrap().to_string();
    assert!(face == "heads" || face == "tails");
}

#[test]
fn test_definitions_expand_into_their_bodies() {
    let mut program = Program::new("definitions");
    let p = int_relation(&mut program, "p", &[1, 2, 3, 4, 5, 6]);
    let r = program
        .add_predicate("r", vec![("n", DataType::Int)], Timing::Dynamic)
        .unwrap();

    let n = int_var("n");
    let even = ted::Definition::new(
        "even",
        vec![n.clone()],
        vec![cmp(
            CmpOp::Eq,
            apply2(FuncOp::Mod, Term::var(&n), Term::val(2i64)),
            Term::val(0i64),
        )],
    );

    let x = int_var("x");
    program
        .rule(
            r,
            vec![Term::var(&x)],
            vec![atom(p, vec![Term::var(&x)]), even.call(vec![Term::var(&x)])],
        )
        .unwrap();

    program.update().unwrap();
    assert_eq!(program.rows(r), ints(&[2, 4, 6]).as_slice());
}

#[test]
fn test_uniqueness_deduplicates_derived_rows() {
    let mut program = Program::new("unique");
    let p = program
        .add_predicate(
            "p",
            vec![("a", DataType::Int), ("b", DataType::Int)],
            Timing::Static,
        )
        .unwrap();
    for (a, b) in [(1, 10), (2, 10), (3, 20)] {
        program.insert(p, vec![Value::Int(a), Value::Int(b)]).unwrap();
    }

    let seen = program
        .add_predicate("seen", vec![("b", DataType::Int)], Timing::Dynamic)
        .unwrap();
    program.set_unique(seen, true);

    let a = int_var("a");
    let b = int_var("b");
    program
        .rule(
            seen,
            vec![Term::var(&b)],
            vec![atom(p, vec![Term::var(&a), Term::var(&b)])],
        )
        .unwrap();

    program.update().unwrap();
    assert_eq!(program.rows(seen), ints(&[10, 20]).as_slice());
}
