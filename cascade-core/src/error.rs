//! Error types for graph construction and change propagation.

use thiserror::Error;

use crate::compute::ComputeError;
use crate::runtime::TransactionState;
use crate::value::ValueKind;

/// Result alias used throughout the crate.
pub type Result<T, E = GraphError> = std::result::Result<T, E>;

/// Errors raised by the engine.
///
/// Structural errors (`DuplicateId` through `SignatureMismatch`) are raised
/// synchronously while the graph is being built and never leave it partially
/// modified. `Evaluation` aborts a transaction; the committed graph stays at
/// its pre-transaction state.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("variable `{0}` is already declared")]
    DuplicateId(String),

    /// The graph already holds as many variables as `NodeId` can address.
    #[error("graph is full: at most {0} variables can be declared")]
    CapacityExceeded(usize),

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("variable `{0}` is already produced by another equation")]
    OutputAlreadyProduced(String),

    /// The proposed equation would close a cycle. `cycle` lists the variables
    /// along it, starting and ending with the same id.
    #[error("equation for `{output}` would create a cycle: {}", .cycle.join(" -> "))]
    Cycle { output: String, cycle: Vec<String> },

    #[error("variable `{0}` has no producing equation")]
    NoSuchEquation(String),

    #[error("equation for `{variable}` expects {expected} but `{input}` holds {found}")]
    SignatureMismatch {
        variable: String,
        input: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("equation for `{variable}` declares {expected} inputs but {found} were given")]
    SignatureArity {
        variable: String,
        expected: usize,
        found: usize,
    },

    /// A change targeted a variable computed by an equation.
    #[error("variable `{0}` is computed by an equation and cannot be set directly")]
    DerivedTarget(String),

    /// The same variable appeared more than once in one change set.
    #[error("variable `{0}` appears more than once in the change set")]
    ConflictingChange(String),

    /// A computation failed; the transaction was aborted.
    #[error("evaluating `{variable}` failed: {source}")]
    Evaluation {
        variable: String,
        #[source]
        source: ComputeError,
    },

    /// A transaction step was called out of order, e.g. committing an
    /// aborted transaction.
    #[error("transaction {transaction} is {state:?}")]
    InvalidTransactionState {
        transaction: u64,
        state: TransactionState,
    },

    /// The exclusion boundary could not be entered within the configured timeout.
    #[error("another transaction or structural change is in progress")]
    ConcurrentTransaction,
}

impl GraphError {
    /// The variable whose equation failed, for evaluation errors.
    pub fn failing_variable(&self) -> Option<&str> {
        match self {
            GraphError::Evaluation { variable, .. } => Some(variable),
            _ => None,
        }
    }

    /// Whether this error came from a structural check rather than evaluation.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            GraphError::Evaluation { .. }
                | GraphError::InvalidTransactionState { .. }
                | GraphError::ConcurrentTransaction
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lists_path() {
        let err = GraphError::Cycle {
            output: "a".into(),
            cycle: vec!["a".into(), "c".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "equation for `a` would create a cycle: a -> c -> a"
        );
    }

    #[test]
    fn evaluation_error_exposes_failing_variable() {
        let err = GraphError::Evaluation {
            variable: "d".into(),
            source: ComputeError::DivisionByZero,
        };
        assert_eq!(err.failing_variable(), Some("d"));
        assert!(!err.is_structural());
        assert_eq!(err.to_string(), "evaluating `d` failed: division by zero");
        assert!(GraphError::DuplicateId("a".into()).is_structural());
    }

    #[test]
    fn transaction_state_error_names_the_state() {
        let err = GraphError::InvalidTransactionState {
            transaction: 7,
            state: TransactionState::Aborted,
        };
        assert_eq!(err.to_string(), "transaction 7 is Aborted");
        assert!(!err.is_structural());
    }
}
