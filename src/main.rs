//! # TED REPL
//!
//! A small interactive shell over a demonstration program. Enter queries of
//! the form `pred(arg, ...)` with variables as bare identifiers, or dot
//! commands:
//!
//! ```text
//! > edge(x, y)
//! > path(1, z)
//! > .tick 5
//! > .load edge data/edges.csv
//! ```

use anyhow::Context;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use ted::ast::builders::*;
use ted::{Config, DataType, Program, Term, Timing, Value, Var};

#[derive(Parser, Debug)]
#[command(name = "ted", about = "Interactive shell for the TED engine")]
struct Args {
    /// Configuration file (defaults to ted.toml / ted.local.toml / TED_* env)
    #[arg(long)]
    config: Option<String>,

    /// RNG seed override
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::from_file(path).context("loading configuration")?,
        None => Config::load().unwrap_or_default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    let mut program = demo_program(&config)?;
    if let Some(seed) = args.seed {
        program.set_seed(seed);
    }
    program.update()?;

    println!("TED interactive shell");
    println!("Example relations: edge(src, dst), path(src, dst)");
    println!("Type a query like `path(1, x)`, or .help\n");

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                if !dispatch(&mut program, &line)? {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Handle one input line. Returns false to exit.
fn dispatch(program: &mut Program, line: &str) -> anyhow::Result<bool> {
    if line == ".quit" || line == ".exit" {
        return Ok(false);
    }
    if line == ".help" {
        println!(".tick [n]          advance the program n ticks (default 1)");
        println!(".seed <n>          reseed the program RNG");
        println!(".load <pred> <csv> load a CSV file into a predicate");
        println!(".save <pred> <csv> snapshot a predicate as CSV");
        println!(".preds             list predicates");
        println!(".quit              exit");
        println!("anything else      run it as a query: pred(arg, ...), ...");
        return Ok(true);
    }
    if let Some(rest) = line.strip_prefix(".tick") {
        let n: u64 = rest.trim().parse().unwrap_or(1);
        for _ in 0..n {
            if let Err(e) = program.update() {
                println!("error: {e}");
                return Ok(true);
            }
        }
        println!("tick = {}", program.tick());
        return Ok(true);
    }
    if let Some(rest) = line.strip_prefix(".seed") {
        match rest.trim().parse::<u64>() {
            Ok(seed) => {
                program.set_seed(seed);
                println!("seed = {seed}");
            }
            Err(_) => println!("usage: .seed <number>"),
        }
        return Ok(true);
    }
    if let Some(rest) = line.strip_prefix(".load") {
        let parts: Vec<&str> = rest.split_whitespace().collect();
        if let [pred, path] = parts.as_slice() {
            match program
                .lookup(pred)
                .and_then(|id| program.load_csv(id, path))
            {
                Ok(n) => println!("loaded {n} rows into '{pred}'"),
                Err(e) => println!("error: {e}"),
            }
        } else {
            println!("usage: .load <pred> <file.csv>");
        }
        return Ok(true);
    }
    if let Some(rest) = line.strip_prefix(".save") {
        let parts: Vec<&str> = rest.split_whitespace().collect();
        if let [pred, path] = parts.as_slice() {
            match program.lookup(pred).and_then(|id| program.save_csv(id, path)) {
                Ok(()) => println!("wrote {path}"),
                Err(e) => println!("error: {e}"),
            }
        } else {
            println!("usage: .save <pred> <file.csv>");
        }
        return Ok(true);
    }
    if line == ".preds" {
        for pred in program.predicates() {
            println!(
                "{}({}) - {} rows",
                pred.name(),
                pred.schema()
                    .field_names()
                    .collect::<Vec<_>>()
                    .join(", "),
                pred.len()
            );
        }
        return Ok(true);
    }

    match program.query(line) {
        Ok(result) => {
            println!("{}", result.columns.join(", "));
            for row in &result.rows {
                println!("{row}");
            }
            println!("({} rows)", result.rows.len());
        }
        Err(e) => println!("error: {e}"),
    }
    Ok(true)
}

/// A small graph program so the shell has something to chew on: a static
/// edge relation and a two-hop path view.
fn demo_program(config: &Config) -> ted::Result<Program> {
    let mut program = Program::with_config("demo", config.engine.clone());

    let edge = program.add_predicate(
        "edge",
        vec![("src", DataType::Int), ("dst", DataType::Int)],
        Timing::Static,
    )?;
    let path = program.add_predicate(
        "path",
        vec![("src", DataType::Int), ("dst", DataType::Int)],
        Timing::Dynamic,
    )?;

    for (a, b) in [(1, 2), (2, 3), (3, 4), (4, 5), (2, 5)] {
        program.insert(edge, vec![Value::Int(a), Value::Int(b)])?;
    }
    program.index_by(edge, "src")?;

    // path(a, c) :- edge(a, b), edge(b, c)
    let a = Var::new("a", DataType::Int);
    let b = Var::new("b", DataType::Int);
    let c = Var::new("c", DataType::Int);
    program.rule(
        path,
        vec![Term::var(&a), Term::var(&c)],
        vec![
            atom(edge, vec![Term::var(&a), Term::var(&b)]),
            atom(edge, vec![Term::var(&b), Term::var(&c)]),
        ],
    )?;
    program.set_unique(path, true);

    Ok(program)
}
