//! Query parsing for the REPL collaborator.
//!
//! Parses strings of the form `pred(arg, …), pred(arg, …)` into a detached
//! body and runs it against the current tables. An `arg` is a number, a
//! quoted string, an identifier (bound to a fresh or reused variable), or a
//! `$name` / `$"text"` external constant resolved through a host callback.
//! The result is a synthesized relation whose columns are the variables in
//! discovery order.

use std::collections::HashMap;

use crate::ast::{Goal, Term, Var};
use crate::error::{Error, Result};
use crate::predicate::PredicateId;
use crate::preprocess::Preprocessor;
use crate::program::Program;
use crate::value::{DataType, Tuple, Value};

/// Host callback resolving `$name` external constants.
pub type ExternalResolver<'a> = &'a dyn Fn(&str) -> Option<Value>;

/// Rows produced by a query, with the synthesized column names.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Tuple>,
}

pub(crate) struct ParsedQuery {
    pub goals: Vec<Goal>,
    pub vars: Vec<Var>,
}

impl Program {
    /// Parse and run a query against the current tables.
    pub fn query(&mut self, text: &str) -> Result<QueryResult> {
        self.query_with(text, None)
    }

    /// Like [`Program::query`], with a resolver for `$name` constants.
    pub fn query_with(
        &mut self,
        text: &str,
        resolver: Option<ExternalResolver<'_>>,
    ) -> Result<QueryResult> {
        let parsed = parse_query(self, text, resolver)?;
        let mut compiled = {
            let mut preprocessor = Preprocessor::new(self.predicates(), self.op_table(), false);
            preprocessor.compile_query(&parsed.vars, &parsed.goals)?
        };
        let rows = self.run_detached(&mut compiled)?;
        Ok(QueryResult {
            columns: parsed.vars.iter().map(|v| v.name().to_string()).collect(),
            rows,
        })
    }
}

pub(crate) fn parse_query(
    program: &Program,
    text: &str,
    resolver: Option<ExternalResolver<'_>>,
) -> Result<ParsedQuery> {
    let mut parser = QueryParser {
        program,
        resolver,
        vars: Vec::new(),
        by_name: HashMap::new(),
    };
    let goals = parser.parse(text)?;
    Ok(ParsedQuery {
        goals,
        vars: parser.vars,
    })
}

struct QueryParser<'a> {
    program: &'a Program,
    resolver: Option<ExternalResolver<'a>>,
    vars: Vec<Var>,
    by_name: HashMap<String, usize>,
}

impl QueryParser<'_> {
    fn parse(&mut self, text: &str) -> Result<Vec<Goal>> {
        let text = text.trim().trim_end_matches('.');
        if text.is_empty() {
            return Err(Error::Parse("empty query".to_string()));
        }
        let mut goals = Vec::new();
        for segment in split_top_level(text) {
            goals.push(self.parse_goal(segment.trim())?);
        }
        Ok(goals)
    }

    fn parse_goal(&mut self, text: &str) -> Result<Goal> {
        let open = text
            .find('(')
            .ok_or_else(|| Error::Parse(format!("expected 'pred(args)', got '{text}'")))?;
        if !text.ends_with(')') {
            return Err(Error::Parse(format!("missing ')' in '{text}'")));
        }
        let name = text[..open].trim();
        let inner = &text[open + 1..text.len() - 1];

        let predicate = self.program.lookup(name)?;
        let arity = self.program.predicate(predicate).arity();
        let parts: Vec<String> = if inner.trim().is_empty() {
            Vec::new()
        } else {
            split_top_level(inner)
        };
        if parts.len() != arity {
            return Err(Error::ArityMismatch {
                predicate: name.to_string(),
                expected: arity,
                got: parts.len(),
            });
        }

        let mut args = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let column_type = self
                .program
                .predicate(predicate)
                .schema()
                .field_type(i)
                .cloned()
                .unwrap_or(DataType::Null);
            args.push(self.parse_term(predicate, part.trim(), &column_type)?);
        }
        Ok(Goal::Atom { predicate, args })
    }

    fn parse_term(&mut self, _predicate: PredicateId, text: &str, ty: &DataType) -> Result<Term> {
        if text.is_empty() {
            return Err(Error::Parse("empty argument".to_string()));
        }

        // External constant: $name or $"text"
        if let Some(rest) = text.strip_prefix('$') {
            let key = if rest.starts_with('"') {
                parse_quoted(rest)?
            } else {
                rest.to_string()
            };
            let resolver = self
                .resolver
                .ok_or_else(|| Error::UnresolvedExternal(key.clone()))?;
            let value = resolver(&key).ok_or_else(|| Error::UnresolvedExternal(key))?;
            return Ok(Term::Const(value));
        }

        // Quoted string
        if text.starts_with('"') {
            return Ok(Term::Const(Value::string(parse_quoted(text)?)));
        }

        // Numbers
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Term::Const(Value::Int(i)));
        }
        if let Ok(f) = text.parse::<f64>() {
            return Ok(Term::Const(Value::Float(f)));
        }

        // Booleans
        if text.eq_ignore_ascii_case("true") {
            return Ok(Term::Const(Value::Bool(true)));
        }
        if text.eq_ignore_ascii_case("false") {
            return Ok(Term::Const(Value::Bool(false)));
        }

        // Identifier: fresh or reused variable, typed by the column where it
        // first appears.
        if text.chars().all(|c| c.is_alphanumeric() || c == '_') {
            if let Some(&i) = self.by_name.get(text) {
                return Ok(Term::var(&self.vars[i]));
            }
            let var = Var::new(text, ty.clone());
            self.by_name.insert(text.to_string(), self.vars.len());
            self.vars.push(var.clone());
            return Ok(Term::Var(var));
        }

        Err(Error::Parse(format!("invalid argument '{text}'")))
    }
}

/// Parse a double-quoted literal with doubled-quote escaping.
fn parse_quoted(text: &str) -> Result<String> {
    if !text.starts_with('"') || !text.ends_with('"') || text.len() < 2 {
        return Err(Error::Parse(format!("malformed string literal {text}")));
    }
    let inner = &text[1..text.len() - 1];
    Ok(inner.replace("\"\"", "\""))
}

/// Split by comma, respecting parentheses and string literals.
fn split_top_level(input: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut paren_depth = 0;
    let mut in_string = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_string = !in_string;
                current.push(ch);
            }
            '(' if !in_string => {
                paren_depth += 1;
                current.push(ch);
            }
            ')' if !in_string => {
                paren_depth -= 1;
                current.push(ch);
            }
            ',' if paren_depth == 0 && !in_string => {
                result.push(current.clone());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        result.push(current);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Timing;

    fn sample_program() -> Program {
        let mut program = Program::new("test");
        let edge = program
            .add_predicate("edge", vec![("src", DataType::Int), ("dst", DataType::Int)], Timing::Static)
            .unwrap();
        for (a, b) in [(1, 2), (2, 3), (3, 4)] {
            program
                .insert(edge, vec![Value::Int(a), Value::Int(b)])
                .unwrap();
        }
        program
    }

    #[test]
    fn test_query_binds_variables_in_discovery_order() {
        let mut program = sample_program();
        let result = program.query("edge(x, y), edge(y, z)").unwrap();
        assert_eq!(result.columns, vec!["x", "y", "z"]);
        assert_eq!(result.rows.len(), 2);
        assert!(result
            .rows
            .contains(&Tuple::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)])));
        assert!(result
            .rows
            .contains(&Tuple::new(vec![Value::Int(2), Value::Int(3), Value::Int(4)])));
    }

    #[test]
    fn test_query_with_constants() {
        let mut program = sample_program();
        let result = program.query("edge(2, y)").unwrap();
        assert_eq!(result.columns, vec!["y"]);
        assert_eq!(result.rows, vec![Tuple::new(vec![Value::Int(3)])]);
    }

    #[test]
    fn test_query_external_constant() {
        let mut program = sample_program();
        let resolve = |name: &str| (name == "start").then_some(Value::Int(3));
        let result = program.query_with("edge($start, y)", Some(&resolve)).unwrap();
        assert_eq!(result.rows, vec![Tuple::new(vec![Value::Int(4)])]);

        let err = program.query("edge($start, y)").unwrap_err();
        assert!(matches!(err, Error::UnresolvedExternal(_)));
    }

    #[test]
    fn test_query_errors() {
        let mut program = sample_program();
        assert!(matches!(
            program.query("nosuch(x)"),
            Err(Error::UndefinedPredicate(_))
        ));
        assert!(matches!(
            program.query("edge(x)"),
            Err(Error::ArityMismatch { .. })
        ));
        assert!(matches!(program.query("edge x, y"), Err(Error::Parse(_))));
    }
}
