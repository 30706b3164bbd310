//! Update-loop benchmarks: joins through each table-access strategy.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ted::ast::builders::*;
use ted::{DataType, Program, Term, Timing, Value, Var};

fn join_program(index_edges: bool, nodes: i64) -> Program {
    let mut program = Program::new("bench");
    let edge = program
        .add_predicate(
            "edge",
            vec![("src", DataType::Int), ("dst", DataType::Int)],
            Timing::Static,
        )
        .unwrap();
    if index_edges {
        program.index_by(edge, "src").unwrap();
    }
    for i in 0..nodes {
        program
            .insert(edge, vec![Value::Int(i), Value::Int((i + 1) % nodes)])
            .unwrap();
        program
            .insert(edge, vec![Value::Int(i), Value::Int((i + 7) % nodes)])
            .unwrap();
    }

    let two_hop = program
        .add_predicate(
            "two_hop",
            vec![("src", DataType::Int), ("dst", DataType::Int)],
            Timing::Dynamic,
        )
        .unwrap();
    let a = Var::new("a", DataType::Int);
    let b = Var::new("b", DataType::Int);
    let c = Var::new("c", DataType::Int);
    program
        .rule(
            two_hop,
            vec![Term::var(&a), Term::var(&c)],
            vec![
                atom(edge, vec![Term::var(&a), Term::var(&b)]),
                atom(edge, vec![Term::var(&b), Term::var(&c)]),
            ],
        )
        .unwrap();
    program
}

fn bench_two_hop_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("two_hop_join");
    group.bench_function("linear_scan", |bench| {
        let mut program = join_program(false, 200);
        bench.iter(|| {
            program.update().unwrap();
            black_box(program.rows(program.lookup("two_hop").unwrap()).len())
        });
    });
    group.bench_function("general_index", |bench| {
        let mut program = join_program(true, 200);
        bench.iter(|| {
            program.update().unwrap();
            black_box(program.rows(program.lookup("two_hop").unwrap()).len())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_two_hop_join);
criterion_main!(benches);
