//! CSV collaborator: load into a predicate, snapshot a table back out, and
//! custom per-type cell parsers.

use std::sync::Arc;

use tempfile::TempDir;

use ted::csv::{load_rows, save_rows, CellParsers, CsvOptions};
use ted::{DataType, EnumType, Program, Timing, Tuple, TupleSchema, Value};

fn unit_schema(day: &Arc<EnumType>) -> TupleSchema {
    TupleSchema::new(vec![
        ("name".to_string(), DataType::Str),
        ("hp".to_string(), DataType::Int),
        ("born".to_string(), DataType::Enum(day.clone())),
    ])
}

#[test]
fn test_round_trip_through_a_program() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("units.csv");
    let day = EnumType::new("Day", ["Mon", "Tue", "Wed"]);

    let mut program = Program::new("csv");
    let unit = program
        .add_predicate(
            "unit",
            vec![
                ("name", DataType::Str),
                ("hp", DataType::Int),
                ("born", DataType::Enum(day.clone())),
            ],
            Timing::Dynamic,
        )
        .unwrap();

    let rows = vec![
        Tuple::new(vec![
            Value::string("orc, the green"),
            Value::Int(10),
            Value::enumeration(&day, "Mon").unwrap(),
        ]),
        Tuple::new(vec![
            Value::string("elf \"swift\""),
            Value::Int(7),
            Value::enumeration(&day, "Wed").unwrap(),
        ]),
    ];
    save_rows(&path, &unit_schema(&day), &rows, &CsvOptions::default()).unwrap();

    let loaded = program.load_csv(unit, &path).unwrap();
    assert_eq!(loaded, 2);
    program.update().unwrap();
    assert_eq!(program.rows(unit), rows.as_slice());
}

#[test]
fn test_header_names_map_columns_in_any_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reordered.csv");
    std::fs::write(&path, "hp,born,name\n10,tue,orc\n").unwrap();

    let day = EnumType::new("Day", ["Mon", "Tue", "Wed"]);
    let rows = load_rows(
        &path,
        &unit_schema(&day),
        &CellParsers::new(),
        &CsvOptions::default(),
    )
    .unwrap();
    assert_eq!(
        rows,
        vec![Tuple::new(vec![
            Value::string("orc"),
            Value::Int(10),
            Value::enumeration(&day, "Tue").unwrap(),
        ])]
    );
}

#[test]
fn test_registered_parser_overrides_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hex.csv");
    std::fs::write(&path, "n\n0x10\n0xff\n").unwrap();

    let schema = TupleSchema::new(vec![("n".to_string(), DataType::Int)]);
    let mut parsers = CellParsers::new();
    parsers.register(
        DataType::Int,
        Arc::new(|cell| {
            let cell = cell.trim();
            let parsed = match cell.strip_prefix("0x") {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => cell.parse(),
            };
            parsed
                .map(Value::Int)
                .map_err(|_| ted::Error::Csv(format!("bad int '{cell}'")))
        }),
    );

    let rows = load_rows(&path, &schema, &parsers, &CsvOptions::default()).unwrap();
    assert_eq!(
        rows,
        vec![
            Tuple::new(vec![Value::Int(16)]),
            Tuple::new(vec![Value::Int(255)]),
        ]
    );
}

#[test]
fn test_malformed_rows_are_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.csv");

    let schema = TupleSchema::new(vec![
        ("a".to_string(), DataType::Int),
        ("b".to_string(), DataType::Int),
    ]);

    std::fs::write(&path, "a,b\n1\n").unwrap();
    let err = load_rows(&path, &schema, &CellParsers::new(), &CsvOptions::default()).unwrap_err();
    assert!(matches!(err, ted::Error::Csv(_)));

    std::fs::write(&path, "a,wrong\n1,2\n").unwrap();
    let err = load_rows(&path, &schema, &CellParsers::new(), &CsvOptions::default()).unwrap_err();
    assert!(matches!(err, ted::Error::Csv(_)));

    std::fs::write(&path, "a,b\n1,x\n").unwrap();
    let err = load_rows(&path, &schema, &CellParsers::new(), &CsvOptions::default()).unwrap_err();
    assert!(matches!(err, ted::Error::Csv(_)));
}
