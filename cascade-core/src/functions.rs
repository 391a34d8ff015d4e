//! Built-in Numeric Relations
//!
//! Ready-made computation functions for the arithmetic relationships that
//! most equation sets are built from (`c = a + b`, `e = c * d`, ...).
//!
//! All of them follow the same rules:
//!
//! - Integer inputs stay integers; any float input promotes the result to float.
//! - Integer arithmetic is checked and fails with [`ComputeError::Overflow`].
//! - Non-numeric inputs fail with [`ComputeError::TypeMismatch`].
//!
//! Each function has the shape `fn(&[Value]) -> Result<Value, ComputeError>`
//! and can be passed straight to `declare_equation`.

use crate::compute::{expect_arity, ComputeError};
use crate::value::Value;

/// Two numeric operands, either both integers or promoted to floats.
enum Operands {
    Int(i64, i64),
    Float(f64, f64),
}

fn operands(lhs: &Value, rhs: &Value) -> Result<Operands, ComputeError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Operands::Int(*a, *b)),
        _ => Ok(Operands::Float(lhs.as_f64()?, rhs.as_f64()?)),
    }
}

fn fold(
    inputs: &[Value],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, ComputeError> {
    let Some((first, rest)) = inputs.split_first() else {
        return Err(ComputeError::Arity {
            expected: 1,
            found: 0,
        });
    };
    // validate the first operand even when it is the only one
    first.as_f64()?;
    let mut acc = first.clone();
    for value in rest {
        acc = match operands(&acc, value)? {
            Operands::Int(a, b) => Value::Int(int_op(a, b).ok_or(ComputeError::Overflow)?),
            Operands::Float(a, b) => Value::Float(float_op(a, b)),
        };
    }
    Ok(acc)
}

/// Sum of one or more inputs.
pub fn sum(inputs: &[Value]) -> Result<Value, ComputeError> {
    fold(inputs, i64::checked_add, |a, b| a + b)
}

/// Product of one or more inputs.
pub fn product(inputs: &[Value]) -> Result<Value, ComputeError> {
    fold(inputs, i64::checked_mul, |a, b| a * b)
}

/// `inputs[0] - inputs[1]`.
pub fn difference(inputs: &[Value]) -> Result<Value, ComputeError> {
    expect_arity(inputs, 2)?;
    fold(inputs, i64::checked_sub, |a, b| a - b)
}

/// `inputs[0] / inputs[1]`, always a float.
pub fn quotient(inputs: &[Value]) -> Result<Value, ComputeError> {
    expect_arity(inputs, 2)?;
    let numerator = inputs[0].as_f64()?;
    let denominator = inputs[1].as_f64()?;
    if denominator == 0.0 {
        return Err(ComputeError::DivisionByZero);
    }
    Ok(Value::Float(numerator / denominator))
}

/// Copy the single input.
pub fn identity(inputs: &[Value]) -> Result<Value, ComputeError> {
    expect_arity(inputs, 1)?;
    Ok(inputs[0].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn sum_keeps_integers() {
        assert_eq!(sum(&[Value::Int(2), Value::Int(3)]), Ok(Value::Int(5)));
        assert_eq!(
            sum(&[Value::Int(1), Value::Int(2), Value::Int(3)]),
            Ok(Value::Int(6))
        );
    }

    #[test]
    fn mixed_operands_promote_to_float() {
        assert_eq!(sum(&[Value::Int(2), Value::Float(0.5)]), Ok(Value::Float(2.5)));
        assert_eq!(
            product(&[Value::Float(1.5), Value::Int(4)]),
            Ok(Value::Float(6.0))
        );
    }

    #[test]
    fn difference_is_ordered() {
        assert_eq!(difference(&[Value::Int(8), Value::Int(3)]), Ok(Value::Int(5)));
        assert_eq!(
            difference(&[Value::Int(8)]),
            Err(ComputeError::Arity {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn quotient_rejects_zero_divisor() {
        assert_eq!(
            quotient(&[Value::Int(7), Value::Int(2)]),
            Ok(Value::Float(3.5))
        );
        assert_eq!(
            quotient(&[Value::Int(7), Value::Int(0)]),
            Err(ComputeError::DivisionByZero)
        );
        assert_eq!(
            quotient(&[Value::Int(7), Value::Float(0.0)]),
            Err(ComputeError::DivisionByZero)
        );
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(
            sum(&[Value::Int(i64::MAX), Value::Int(1)]),
            Err(ComputeError::Overflow)
        );
    }

    #[test]
    fn non_numeric_inputs_fail() {
        assert_eq!(
            sum(&[Value::Int(1), Value::Null]),
            Err(ComputeError::TypeMismatch {
                expected: ValueKind::Number,
                found: ValueKind::Null
            })
        );
        assert!(sum(&[Value::from("x")]).is_err());
        assert!(sum(&[]).is_err());
    }

    #[test]
    fn identity_copies_any_value() {
        assert_eq!(identity(&[Value::from("x")]), Ok(Value::from("x")));
    }
}
