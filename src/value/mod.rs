//! # Value Type System
//!
//! Runtime values for predicate columns: Int, Float, Bool, Str, enumerations,
//! lists, and Null. Tuples of arbitrary arity carry one row of a predicate;
//! a [`TupleSchema`] names and types the columns.
//!
//! Floats get bit-total equality and hashing so every value can live in a
//! hash index bucket. Cross-run determinism of iteration therefore depends
//! only on insertion order, never on address-based hashing.
//!
//! ## Usage
//!
//! ```rust
//! use ted::value::{Value, Tuple, TupleSchema, DataType};
//!
//! let tuple = Tuple::new(vec![
//!     Value::Int(1),
//!     Value::string("hello"),
//!     Value::Float(3.14),
//! ]);
//!
//! let schema = TupleSchema::new(vec![
//!     ("id".to_string(), DataType::Int),
//!     ("name".to_string(), DataType::Str),
//!     ("score".to_string(), DataType::Float),
//! ]);
//! assert!(schema.validate(&tuple).is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A named enumeration type: a fixed list of variants in declaration order.
///
/// Enumerated columns are indexed by ordinal (direct addressing, no hashing),
/// so declaration order is also iteration order wherever enum keys are walked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumType {
    name: String,
    variants: Vec<String>,
}

impl EnumType {
    /// Define an enumeration. Variant order is significant.
    pub fn new(name: impl Into<String>, variants: impl IntoIterator<Item = impl Into<String>>) -> Arc<Self> {
        Arc::new(EnumType {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of variants (one past the largest ordinal).
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Ordinal of a variant by name, case-insensitive.
    pub fn ordinal_of(&self, variant: &str) -> Option<u32> {
        self.variants
            .iter()
            .position(|v| v.eq_ignore_ascii_case(variant))
            .map(|p| p as u32)
    }

    /// Variant name for an ordinal.
    pub fn variant(&self, ordinal: u32) -> Option<&str> {
        self.variants.get(ordinal as usize).map(String::as_str)
    }

    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(String::as_str)
    }
}

/// Column data types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Enum(Arc<EnumType>),
    List,
}

impl DataType {
    /// Structural tag without enum identity, used to key operator dispatch.
    pub fn tag(&self) -> TypeTag {
        match self {
            DataType::Null => TypeTag::Null,
            DataType::Bool => TypeTag::Bool,
            DataType::Int => TypeTag::Int,
            DataType::Float => TypeTag::Float,
            DataType::Str => TypeTag::Str,
            DataType::Enum(_) => TypeTag::Enum,
            DataType::List => TypeTag::List,
        }
    }
}

impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataType::Enum(a), DataType::Enum(b)) => a.name == b.name,
            (a, b) => a.tag() == b.tag(),
        }
    }
}

impl Eq for DataType {}

impl Hash for DataType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        if let DataType::Enum(ty) = self {
            ty.name.hash(state);
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "null"),
            DataType::Bool => write!(f, "bool"),
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Str => write!(f, "string"),
            DataType::Enum(ty) => write!(f, "{}", ty.name()),
            DataType::List => write!(f, "list"),
        }
    }
}

/// Coarse type tag for operator dispatch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Enum,
    List,
}

/// A single runtime value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Enum { ty: Arc<EnumType>, ordinal: u32 },
    List(Arc<Vec<Value>>),
}

impl Value {
    /// Convenience constructor for string values.
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Convenience constructor for list values.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    /// Enumeration value by variant name, case-insensitive.
    pub fn enumeration(ty: &Arc<EnumType>, variant: &str) -> Result<Value> {
        let ordinal = ty
            .ordinal_of(variant)
            .ok_or_else(|| Error::UnknownVariant {
                enumeration: ty.name().to_string(),
                variant: variant.to_string(),
            })?;
        Ok(Value::Enum { ty: Arc::clone(ty), ordinal })
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Str(_) => DataType::Str,
            Value::Enum { ty, .. } => DataType::Enum(Arc::clone(ty)),
            Value::List(_) => DataType::List,
        }
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Str(_) => TypeTag::Str,
            Value::Enum { .. } => TypeTag::Enum,
            Value::List(_) => TypeTag::List,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Ordinal of an enumeration value.
    pub fn ordinal(&self) -> Option<u32> {
        match self {
            Value::Enum { ordinal, .. } => Some(*ordinal),
            _ => None,
        }
    }

    /// Total order within a type; Int and Float compare numerically with each
    /// other. Values of unrelated types are incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Some(a.total_cmp(b)),
            (Value::Int(a), Value::Float(b)) => Some((*a as f64).total_cmp(b)),
            (Value::Float(a), Value::Int(b)) => Some(a.total_cmp(&(*b as f64))),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Enum { ty: ta, ordinal: a }, Value::Enum { ty: tb, ordinal: b })
                if ta.name() == tb.name() =>
            {
                Some(a.cmp(b))
            }
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Enum { ty: ta, ordinal: a }, Value::Enum { ty: tb, ordinal: b }) => {
                a == b && ta.name() == tb.name()
            }
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Enum { ty, ordinal } => {
                ty.name().hash(state);
                ordinal.hash(state);
            }
            Value::List(items) => items.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Enum { ty, ordinal } => {
                write!(f, "{}", ty.variant(*ordinal).unwrap_or("?"))
            }
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

/// One row of a predicate's table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tuple(Vec<Value>);

impl Tuple {
    pub fn new(values: Vec<Value>) -> Tuple {
        Tuple(values)
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, column: usize) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub(crate) fn set(&mut self, column: usize, value: Value) {
        self.0[column] = value;
    }

    /// Project a sub-tuple out of the named columns, in the order given.
    pub fn project(&self, columns: &[usize]) -> Tuple {
        Tuple(columns.iter().map(|&c| self.0[c].clone()).collect())
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Tuple(values)
    }
}

impl std::ops::Index<usize> for Tuple {
    type Output = Value;

    fn index(&self, column: usize) -> &Value {
        &self.0[column]
    }
}

/// Named, typed columns of a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleSchema {
    fields: Vec<(String, DataType)>,
}

impl TupleSchema {
    pub fn new(fields: Vec<(String, DataType)>) -> TupleSchema {
        TupleSchema { fields }
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    pub fn field_type(&self, index: usize) -> Option<&DataType> {
        self.fields.get(index).map(|(_, ty)| ty)
    }

    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|(name, _)| name.as_str())
    }

    /// Check a tuple's arity and column types against this schema.
    pub fn validate(&self, tuple: &Tuple) -> Result<()> {
        if tuple.arity() != self.arity() {
            return Err(Error::RowArityMismatch {
                expected: self.arity(),
                got: tuple.arity(),
            });
        }
        for (i, (name, ty)) in self.fields.iter().enumerate() {
            let value = &tuple[i];
            if matches!(value, Value::Null) {
                continue;
            }
            if value.data_type() != *ty {
                return Err(Error::ColumnTypeMismatch {
                    column: name.clone(),
                    expected: ty.to_string(),
                    got: value.data_type().to_string(),
                });
            }
        }
        Ok(())
    }
}
