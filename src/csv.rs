//! CSV ingestion and export.
//!
//! Loads a header row plus data rows into a predicate's schema, and writes
//! tables back out. Cell parsing is pluggable per type: the host may
//! register a `DataType -> parser` override; defaults handle integers,
//! floats, booleans, strings and enumerations (case-insensitive).
//!
//! Embedded delimiters and quotes are supported only in the quoted-cell
//! form with doubled-quote escaping:
//!
//! ```csv
//! name,motto
//! Alice,"say ""hi"", then leave"
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::predicate::PredicateId;
use crate::program::Program;
use crate::value::{DataType, Tuple, TupleSchema, Value};

/// Options for CSV parsing
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter (default: ',')
    pub delimiter: char,
    /// Whether the first row contains headers (default: true)
    pub has_header: bool,
    /// Quote character (default: '"')
    pub quote_char: char,
    /// Whether to trim whitespace from fields (default: true)
    pub trim_whitespace: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: ',',
            has_header: true,
            quote_char: '"',
            trim_whitespace: true,
        }
    }
}

/// Pluggable cell parser for one data type.
pub type CellParser = Arc<dyn Fn(&str) -> Result<Value>>;

/// Per-type parser registry consulted before the defaults.
#[derive(Default, Clone)]
pub struct CellParsers {
    parsers: HashMap<DataType, CellParser>,
}

impl CellParsers {
    pub fn new() -> CellParsers {
        CellParsers::default()
    }

    pub fn register(&mut self, ty: DataType, parser: CellParser) {
        self.parsers.insert(ty, parser);
    }

    pub fn parse(&self, ty: &DataType, cell: &str) -> Result<Value> {
        if let Some(parser) = self.parsers.get(ty) {
            return parser(cell);
        }
        default_parse(ty, cell)
    }
}

/// Default cell parsing by column type. Empty cells read as Null.
pub fn default_parse(ty: &DataType, cell: &str) -> Result<Value> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(Value::Null);
    }
    match ty {
        DataType::Int => cell
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Error::Csv(format!("'{cell}' is not an integer"))),
        DataType::Float => cell
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| Error::Csv(format!("'{cell}' is not a number"))),
        DataType::Bool => {
            if cell.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if cell.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err(Error::Csv(format!("'{cell}' is not a boolean")))
            }
        }
        DataType::Str => Ok(Value::string(cell)),
        DataType::Enum(ty) => Value::enumeration(ty, cell),
        DataType::Null | DataType::List => {
            Err(Error::Csv(format!("no default parser for {ty} columns")))
        }
    }
}

/// Load rows matching `schema` from a CSV file. With a header, columns map
/// by name (case-insensitive) and may appear in any order; without one, the
/// cells are positional.
pub fn load_rows<P: AsRef<Path>>(
    path: P,
    schema: &TupleSchema,
    parsers: &CellParsers,
    options: &CsvOptions,
) -> Result<Vec<Tuple>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    // column_order[i] = schema position of the i-th CSV column.
    let mut column_order: Vec<usize> = (0..schema.arity()).collect();
    if options.has_header {
        let header = match lines.next() {
            Some(line) => line?,
            None => return Ok(Vec::new()),
        };
        let names = parse_csv_line(&header, options);
        if names.len() != schema.arity() {
            return Err(Error::Csv(format!(
                "header has {} columns, expected {}",
                names.len(),
                schema.arity()
            )));
        }
        column_order.clear();
        for name in &names {
            let position = schema
                .field_names()
                .position(|n| n.eq_ignore_ascii_case(name))
                .ok_or_else(|| Error::Csv(format!("unknown column '{name}'")))?;
            column_order.push(position);
        }
    }

    let mut rows = Vec::new();
    let mut row_num = if options.has_header { 2 } else { 1 };
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            row_num += 1;
            continue;
        }
        let cells = parse_csv_line(&line, options);
        if cells.len() != schema.arity() {
            return Err(Error::Csv(format!(
                "row {} has {} fields, expected {}",
                row_num,
                cells.len(),
                schema.arity()
            )));
        }
        let mut values = vec![Value::Null; schema.arity()];
        for (i, cell) in cells.iter().enumerate() {
            let position = column_order[i];
            let ty = schema
                .field_type(position)
                .ok_or_else(|| Error::Csv(format!("row {row_num} is too wide")))?;
            values[position] = parsers.parse(ty, cell)?;
        }
        rows.push(Tuple::new(values));
        row_num += 1;
    }
    Ok(rows)
}

/// Write rows out with a header line of the schema's column names.
pub fn save_rows<P: AsRef<Path>>(
    path: P,
    schema: &TupleSchema,
    rows: &[Tuple],
    options: &CsvOptions,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let delimiter = options.delimiter.to_string();
    if options.has_header {
        let header = schema
            .field_names()
            .map(|name| escape_csv_field(name, options))
            .collect::<Vec<_>>()
            .join(&delimiter);
        writeln!(writer, "{header}")?;
    }
    for row in rows {
        let line = row
            .iter()
            .map(|v| value_to_csv(v, options))
            .collect::<Vec<_>>()
            .join(&delimiter);
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

impl Program {
    /// Load a CSV file into an extensional predicate through its input
    /// pipeline.
    pub fn load_csv<P: AsRef<Path>>(&mut self, id: PredicateId, path: P) -> Result<usize> {
        self.load_csv_with(id, path, &CellParsers::new(), &CsvOptions::default())
    }

    pub fn load_csv_with<P: AsRef<Path>>(
        &mut self,
        id: PredicateId,
        path: P,
        parsers: &CellParsers,
        options: &CsvOptions,
    ) -> Result<usize> {
        let schema = self.predicate(id).schema().clone();
        let rows = load_rows(path, &schema, parsers, options)?;
        let count = rows.len();
        for row in rows {
            self.insert(id, row.values().to_vec())?;
        }
        Ok(count)
    }

    /// Snapshot one table as CSV.
    pub fn save_csv<P: AsRef<Path>>(&self, id: PredicateId, path: P) -> Result<()> {
        let pred = self.predicate(id);
        save_rows(path, pred.schema(), pred.rows(), &CsvOptions::default())
    }
}

/// Split one CSV line into cells, honoring quoting with doubled-quote
/// escaping.
fn parse_csv_line(line: &str, options: &CsvOptions) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == options.quote_char {
                if chars.peek() == Some(&options.quote_char) {
                    chars.next();
                    current.push(options.quote_char);
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == options.quote_char {
            in_quotes = true;
        } else if c == options.delimiter {
            cells.push(finish_cell(&mut current, options));
        } else {
            current.push(c);
        }
    }
    cells.push(finish_cell(&mut current, options));
    cells
}

fn finish_cell(current: &mut String, options: &CsvOptions) -> String {
    let cell = if options.trim_whitespace {
        current.trim().to_string()
    } else {
        current.clone()
    };
    current.clear();
    cell
}

fn value_to_csv(value: &Value, options: &CsvOptions) -> String {
    match value {
        Value::Null => String::new(),
        Value::Str(s) => escape_csv_field(s, options),
        other => escape_csv_field(&other.to_string(), options),
    }
}

fn escape_csv_field(s: &str, options: &CsvOptions) -> String {
    let needs_quoting = s.contains(options.delimiter)
        || s.contains(options.quote_char)
        || s.contains('\n')
        || s.contains('\r');
    if needs_quoting {
        let doubled = s.replace(
            options.quote_char,
            &format!("{}{}", options.quote_char, options.quote_char),
        );
        format!("{}{}{}", options.quote_char, doubled, options.quote_char)
    } else {
        s.to_string()
    }
}
