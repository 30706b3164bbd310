//! Operator resolution for `Eval` and comparison goals.
//!
//! Implementations are looked up in a dispatch table keyed by operator and
//! operand type tags. Hosts may override or extend the table per program;
//! built-in numeric types fall back to native arithmetic. Int promotes to
//! Float when the operands mix.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{CmpOp, FuncOp};
use crate::error::{Error, Result};
use crate::value::{TypeTag, Value};

/// Host-registered binary operator implementation.
pub type BinaryFn = Arc<dyn Fn(&Value, &Value) -> Result<Value>>;

/// Host-registered unary operator implementation.
pub type UnaryFn = Arc<dyn Fn(&Value) -> Result<Value>>;

/// Per-program operator dispatch table.
#[derive(Default)]
pub struct OpTable {
    binary: HashMap<(FuncOp, TypeTag, TypeTag), BinaryFn>,
    unary: HashMap<(FuncOp, TypeTag), UnaryFn>,
}

impl OpTable {
    pub fn new() -> OpTable {
        OpTable::default()
    }

    /// Override `op` for a pair of operand types.
    pub fn register_binary(&mut self, op: FuncOp, left: TypeTag, right: TypeTag, f: BinaryFn) {
        self.binary.insert((op, left, right), f);
    }

    /// Override `op` for one operand type.
    pub fn register_unary(&mut self, op: FuncOp, operand: TypeTag, f: UnaryFn) {
        self.unary.insert((op, operand), f);
    }

    /// Dispatch by arity.
    pub fn apply(&self, op: FuncOp, args: &[Value]) -> Result<Value> {
        match args {
            [a] => self.unary(op, a),
            [a, b] => self.binary(op, a, b),
            _ => Err(Error::BadTerm(format!(
                "operator '{}' takes {} arguments, got {}",
                op.as_str(),
                op.arity(),
                args.len()
            ))),
        }
    }

    pub fn binary(&self, op: FuncOp, a: &Value, b: &Value) -> Result<Value> {
        if let Some(f) = self.binary.get(&(op, a.tag(), b.tag())) {
            return f(a, b);
        }
        native_binary(op, a, b)
    }

    pub fn unary(&self, op: FuncOp, a: &Value) -> Result<Value> {
        if let Some(f) = self.unary.get(&(op, a.tag())) {
            return f(a);
        }
        native_unary(op, a)
    }

    /// Comparison goals. Equality is structural; orderings require the
    /// operands to be comparable.
    pub fn compare(&self, op: CmpOp, a: &Value, b: &Value) -> Result<bool> {
        match op {
            CmpOp::Eq => Ok(a == b),
            CmpOp::Ne => Ok(a != b),
            _ => {
                let ord = a.compare(b).ok_or_else(|| undefined(op.as_str(), a, b))?;
                Ok(match op {
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Le => ord != Ordering::Greater,
                    CmpOp::Gt => ord == Ordering::Greater,
                    CmpOp::Ge => ord != Ordering::Less,
                    CmpOp::Eq | CmpOp::Ne => unreachable!(),
                })
            }
        }
    }
}

fn undefined(op: &str, a: &Value, b: &Value) -> Error {
    Error::UndefinedOperator {
        op: op.to_string(),
        left: a.data_type().to_string(),
        right: b.data_type().to_string(),
    }
}

fn undefined_unary(op: &str, a: &Value) -> Error {
    Error::UndefinedUnaryOperator {
        op: op.to_string(),
        operand: a.data_type().to_string(),
    }
}

/// Built-in arithmetic. Integer arithmetic wraps; integer division and
/// modulo by zero are errors.
pub fn native_binary(op: FuncOp, a: &Value, b: &Value) -> Result<Value> {
    use FuncOp::*;
    use Value::{Float, Int, Str};

    match (op, a, b) {
        (Add, Int(x), Int(y)) => Ok(Int(x.wrapping_add(*y))),
        (Sub, Int(x), Int(y)) => Ok(Int(x.wrapping_sub(*y))),
        (Mul, Int(x), Int(y)) => Ok(Int(x.wrapping_mul(*y))),
        (Div, Int(x), Int(y)) => {
            if *y == 0 {
                Err(Error::DivisionByZero)
            } else {
                Ok(Int(x.wrapping_div(*y)))
            }
        }
        (Mod, Int(x), Int(y)) => {
            if *y == 0 {
                Err(Error::DivisionByZero)
            } else {
                Ok(Int(x.wrapping_rem(*y)))
            }
        }

        (Add, Float(x), Float(y)) => Ok(Float(x + y)),
        (Sub, Float(x), Float(y)) => Ok(Float(x - y)),
        (Mul, Float(x), Float(y)) => Ok(Float(x * y)),
        (Div, Float(x), Float(y)) => Ok(Float(x / y)),
        (Mod, Float(x), Float(y)) => Ok(Float(x % y)),

        // Mixed numeric operands promote to float.
        (_, Int(x), Float(y)) => native_binary(op, &Float(*x as f64), &Float(*y)),
        (_, Float(x), Int(y)) => native_binary(op, &Float(*x), &Float(*y as f64)),

        (Add, Str(x), Str(y)) => {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Ok(Value::string(s))
        }

        (Min, x, y) => match x.compare(y).ok_or_else(|| undefined("min", x, y))? {
            Ordering::Greater => Ok(y.clone()),
            _ => Ok(x.clone()),
        },
        (Max, x, y) => match x.compare(y).ok_or_else(|| undefined("max", x, y))? {
            Ordering::Less => Ok(y.clone()),
            _ => Ok(x.clone()),
        },

        _ => Err(undefined(op.as_str(), a, b)),
    }
}

pub fn native_unary(op: FuncOp, a: &Value) -> Result<Value> {
    use FuncOp::*;
    use Value::{Float, Int};

    match (op, a) {
        (Neg, Int(x)) => Ok(Int(x.wrapping_neg())),
        (Neg, Float(x)) => Ok(Float(-x)),
        (Abs, Int(x)) => Ok(Int(x.wrapping_abs())),
        (Abs, Float(x)) => Ok(Float(x.abs())),
        (ToFloat, Int(x)) => Ok(Float(*x as f64)),
        (ToFloat, Float(x)) => Ok(Float(*x)),
        (ToInt, Int(x)) => Ok(Int(*x)),
        (ToInt, Float(x)) => Ok(Int(*x as i64)),
        _ => Err(undefined_unary(op.as_str(), a)),
    }
}
