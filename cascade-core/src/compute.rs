//! Computation Functions
//!
//! An equation's behaviour is a [`Compute`] implementation: a pure mapping from
//! the ordered input values to the output value. Closures of the shape
//! `Fn(&[Value]) -> Result<Value, ComputeError>` implement it directly.
//!
//! Computations must be deterministic. The engine skips writes whose result
//! equals the current value and relies on re-evaluation with equal inputs
//! producing equal outputs.

use thiserror::Error;

use crate::value::{Value, ValueKind};

/// A domain error raised by a computation function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("wrong number of inputs: expected {expected}, found {found}")]
    Arity { expected: usize, found: usize },

    #[error("integer overflow")]
    Overflow,

    /// Any other failure reported by a user-supplied function.
    #[error("{0}")]
    Domain(String),
}

impl ComputeError {
    pub fn mismatch(expected: ValueKind, found: ValueKind) -> Self {
        Self::TypeMismatch { expected, found }
    }

    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(message.into())
    }
}

/// A pure computation mapping input values to an output value.
pub trait Compute: Send + Sync {
    /// Compute the output from the inputs, given in declaration order.
    fn compute(&self, inputs: &[Value]) -> Result<Value, ComputeError>;
}

impl<F> Compute for F
where
    F: Fn(&[Value]) -> Result<Value, ComputeError> + Send + Sync,
{
    fn compute(&self, inputs: &[Value]) -> Result<Value, ComputeError> {
        self(inputs)
    }
}

/// Fail with [`ComputeError::Arity`] unless exactly `expected` inputs were given.
pub fn expect_arity(inputs: &[Value], expected: usize) -> Result<(), ComputeError> {
    if inputs.len() == expected {
        Ok(())
    } else {
        Err(ComputeError::Arity {
            expected,
            found: inputs.len(),
        })
    }
}
