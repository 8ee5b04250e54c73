//! Binary arithmetic and comparison operators.

use super::VmError;
use crate::values::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Lt,
}

/// Applies `left OP right`. The dispatcher pops the right operand first,
/// then the left, before calling in.
pub(crate) fn binary_op(op: BinaryOp, left: Value, right: Value) -> Result<Value, VmError> {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => int_arith(left, right, |a, b| Ok(a.wrapping_sub(b))),
        BinaryOp::Mul => int_arith(left, right, |a, b| Ok(a.wrapping_mul(b))),
        BinaryOp::Div => int_arith(left, right, |a, b| {
            if b == 0 {
                return Err(VmError::DivisionByZero);
            }
            Ok(a.wrapping_div(b))
        }),
        BinaryOp::Mod => int_arith(left, right, |a, b| {
            if b == 0 {
                return Err(VmError::DivisionByZero);
            }
            Ok(a.wrapping_rem(b))
        }),
        BinaryOp::Eq => Ok(Value::Int((left == right) as i64)),
        BinaryOp::Lt => {
            // Non-integer comparisons fall back to false rather than failing.
            let less = match (left.as_int(), right.as_int()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            };
            Ok(Value::Int(less as i64))
        }
    }
}

/// ADD is overloaded: integer addition when the left operand is an int,
/// textual concatenation otherwise.
fn add(left: Value, right: Value) -> Result<Value, VmError> {
    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
        (Value::Int(_), _) => Err(VmError::TypeError(format!(
            "cannot add {} to int",
            right.type_name()
        ))),
        _ => Ok(Value::Str(format!("{}{}", left.render(), right.render()))),
    }
}

fn int_arith(
    left: Value,
    right: Value,
    f: impl Fn(i64, i64) -> Result<i64, VmError>,
) -> Result<Value, VmError> {
    match (left.as_int(), right.as_int()) {
        (Some(a), Some(b)) => Ok(Value::Int(f(a, b)?)),
        _ => Err(VmError::TypeError(format!(
            "arithmetic requires two ints, got {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}
