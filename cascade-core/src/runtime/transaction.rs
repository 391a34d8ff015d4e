//! Change Transactions
//!
//! A transaction is one atomic propagation pass:
//!
//! ```text
//! Pending --evaluate--> Evaluating --commit--> Committed
//!                           |
//!                           +--(equation fails)--> Aborted
//! ```
//!
//! - `Pending`: the caller's source writes sit in the working snapshot and the
//!   plan has been computed from the sources that actually changed.
//! - `Evaluating`: planned equations run in order, reading the working
//!   snapshot first and the committed graph second. Only equations with at
//!   least one changed input run; outputs are written only if they differ
//!   from the current value (see [`Value::same_as`]).
//! - `Aborted`: a computation failed. The snapshot is discarded and the
//!   committed graph was never touched.
//! - `Committed`: the snapshot is written into the graph in evaluation order
//!   and a [`ChangeBatch`] is produced for subscribers.
//!
//! Every planned equation starts `MaybeDirty`. Once visited it is either
//! `Dirty` (evaluated, output changed) or `Clean` (skipped, or evaluated to
//! its current value).
//!
//! The transaction only borrows the graph for the duration of each call, so
//! the engine can hold a read lock while evaluating and a write lock for the
//! commit alone.

use std::collections::{HashMap, HashSet};

use tracing::{trace, warn};

use super::event::{ChangeBatch, ChangeEvent};
use crate::error::{GraphError, Result};
use crate::graph::{DirtyState, Equation, Graph, NodeId, Plan, Scheduler};
use crate::value::Value;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Evaluating,
    Committed,
    Aborted,
}

/// Summary of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Transaction id, increasing in commit order.
    pub transaction: u64,

    /// Variables whose value changed, in evaluation order.
    pub changed: Vec<String>,

    /// Number of equations actually evaluated.
    pub evaluated: usize,
}

/// A single propagation pass over a graph.
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    state: TransactionState,
    plan: Plan,

    /// Values written by this transaction, not yet committed.
    working: HashMap<NodeId, Value>,

    /// Write order. Source writes first, then equation outputs.
    written: Vec<NodeId>,

    /// Equations evaluated even if none of their inputs changed.
    forced: HashSet<NodeId>,

    /// Dirty state of every planned equation, keyed by output.
    states: HashMap<NodeId, DirtyState>,

    evaluated: usize,
}

impl Transaction {
    /// Start a transaction applying `changes` to source variables.
    ///
    /// Validates the whole change set before anything is written: every id
    /// must exist, appear once, and name a source. Writes equal to the
    /// committed value are dropped, so a change set that alters nothing
    /// plans nothing.
    pub fn begin<I, K, V>(graph: &Graph, id: u64, changes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut proposed: Vec<(NodeId, Value)> = Vec::new();
        let mut seen = HashSet::new();

        for (name, value) in changes {
            let name = name.as_ref();
            let node = graph.resolve(name)?;
            if !seen.insert(node) {
                return Err(GraphError::ConflictingChange(name.to_string()));
            }
            let is_source = graph.variable(node).is_some_and(|var| var.is_source());
            if !is_source {
                return Err(GraphError::DerivedTarget(name.to_string()));
            }
            proposed.push((node, value.into()));
        }

        proposed.sort_by(|(lhs, _), (rhs, _)| graph.name_of(*lhs).cmp(graph.name_of(*rhs)));

        let mut working = HashMap::new();
        let mut written = Vec::new();
        for (node, value) in proposed {
            let unchanged = graph
                .variable(node)
                .is_some_and(|var| var.value().same_as(&value));
            if unchanged {
                continue;
            }
            working.insert(node, value);
            written.push(node);
        }

        let plan = Scheduler::new(graph).plan(written.iter().copied());
        trace!(transaction = id, sources = written.len(), planned = plan.len(), "transaction pending");

        Ok(Self {
            id,
            state: TransactionState::Pending,
            states: initial_states(&plan),
            plan,
            working,
            written,
            forced: HashSet::new(),
            evaluated: 0,
        })
    }

    /// Start a transaction that re-evaluates equations without changing sources.
    ///
    /// With `outputs`, the equations producing them and everything downstream
    /// are evaluated. Without, every equation in the graph is.
    pub fn recompute(graph: &Graph, id: u64, outputs: Option<&[NodeId]>) -> Self {
        let scheduler = Scheduler::new(graph);
        let plan = match outputs {
            Some(outputs) => scheduler.plan_equations(outputs.iter().copied()),
            None => scheduler.plan_all(),
        };
        let forced = match outputs {
            Some(outputs) => outputs.iter().copied().collect(),
            None => plan.order().iter().copied().collect(),
        };

        Self {
            id,
            state: TransactionState::Pending,
            states: initial_states(&plan),
            plan,
            working: HashMap::new(),
            written: Vec::new(),
            forced,
            evaluated: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Dirty state of the planned equation producing `output`.
    pub fn dirty_state(&self, output: NodeId) -> Option<DirtyState> {
        self.states.get(&output).copied()
    }

    /// Run every planned equation against `graph`.
    ///
    /// On failure the transaction is aborted, its snapshot discarded, and the
    /// error names the failing equation's output. A transaction is evaluated
    /// once; calling this outside `Pending` fails with `InvalidTransactionState`.
    pub fn evaluate(&mut self, graph: &Graph) -> Result<()> {
        self.expect_state(TransactionState::Pending)?;
        self.state = TransactionState::Evaluating;

        let mut changed: HashSet<NodeId> = self.written.iter().copied().collect();
        let order = self.plan.order().to_vec();

        for output in order {
            let Some(equation) = graph.equation(output) else {
                continue;
            };

            if !self.needs_evaluation(equation, &changed) {
                trace!(variable = graph.name_of(output), "inputs unchanged, skipping");
                self.states.insert(output, DirtyState::Clean);
                continue;
            }

            let result = match self.evaluate_equation(graph, equation) {
                Ok(value) => value,
                Err(source) => {
                    let variable = graph.name_of(output).to_string();
                    warn!(transaction = self.id, %variable, error = %source, "evaluation failed, aborting");
                    self.abort();
                    return Err(GraphError::Evaluation { variable, source });
                }
            };
            self.evaluated += 1;

            if result.same_as(self.current(graph, output)) {
                trace!(variable = graph.name_of(output), "output unchanged");
                self.states.insert(output, DirtyState::Clean);
                continue;
            }
            trace!(variable = graph.name_of(output), value = %result, "output changed");
            self.states.insert(output, DirtyState::Dirty);
            self.working.insert(output, result);
            self.written.push(output);
            changed.insert(output);
        }

        Ok(())
    }

    fn needs_evaluation(&self, equation: &Equation, changed: &HashSet<NodeId>) -> bool {
        self.forced.contains(&equation.output())
            || equation.inputs().iter().any(|input| changed.contains(input))
    }

    fn expect_state(&self, expected: TransactionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(GraphError::InvalidTransactionState {
                transaction: self.id,
                state: self.state,
            })
        }
    }

    fn evaluate_equation(
        &self,
        graph: &Graph,
        equation: &Equation,
    ) -> std::result::Result<Value, crate::compute::ComputeError> {
        let inputs: Vec<Value> = equation
            .inputs()
            .iter()
            .map(|&input| self.current(graph, input).clone())
            .collect();

        if let Some(signature) = equation.signature() {
            signature.check_inputs(&inputs)?;
        }
        let value = equation.compute().compute(&inputs)?;
        if let Some(signature) = equation.signature() {
            signature.check_output(&value)?;
        }
        Ok(value)
    }

    /// Value of `node` as seen by this transaction.
    fn current<'a>(&'a self, graph: &'a Graph, node: NodeId) -> &'a Value {
        static NULL: Value = Value::Null;
        self.working
            .get(&node)
            .or_else(|| graph.variable(node).map(|var| var.value()))
            .unwrap_or(&NULL)
    }

    fn abort(&mut self) {
        self.working.clear();
        self.written.clear();
        self.state = TransactionState::Aborted;
    }

    /// Write the snapshot into `graph`.
    ///
    /// Must follow a successful [`Transaction::evaluate`]; a pending or
    /// aborted transaction fails with `InvalidTransactionState` and leaves
    /// `graph` untouched. Returns the summary for the caller and the events
    /// for subscribers.
    pub fn commit(mut self, graph: &mut Graph) -> Result<(Committed, ChangeBatch)> {
        self.expect_state(TransactionState::Evaluating)?;

        let mut changed = Vec::with_capacity(self.written.len());
        let mut events = Vec::with_capacity(self.written.len());
        for node in std::mem::take(&mut self.written) {
            let Some(new) = self.working.remove(&node) else {
                continue;
            };
            let name = graph.name_of(node).to_string();
            if let Some(old) = graph.commit_value(node, new.clone()) {
                changed.push(name.clone());
                events.push(ChangeEvent {
                    variable: name,
                    old,
                    new,
                });
            }
        }
        self.state = TransactionState::Committed;

        let committed = Committed {
            transaction: self.id,
            changed,
            evaluated: self.evaluated,
        };
        Ok((committed, ChangeBatch::new(self.id, events)))
    }
}

fn initial_states(plan: &Plan) -> HashMap<NodeId, DirtyState> {
    plan.order()
        .iter()
        .map(|&output| (output, DirtyState::MaybeDirty))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::ComputeError;
    use crate::functions;

    /// a=2, b=3, c=3 (c = a + b), d=0 (d = a / b)
    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph.declare_variable("a", 2).unwrap();
        graph.declare_variable("b", 3).unwrap();
        graph.declare_variable("c", 3).unwrap();
        graph.declare_variable("d", 0).unwrap();
        graph.declare_equation("c", &["a", "b"], functions::sum).unwrap();
        graph.declare_equation("d", &["a", "b"], functions::quotient).unwrap();
        graph
    }

    #[test]
    fn state_transitions_on_commit() {
        let mut graph = graph();
        let mut txn = Transaction::begin(&graph, 1, [("a", 5)]).unwrap();
        let c = graph.resolve("c").unwrap();
        assert_eq!(txn.state(), TransactionState::Pending);
        assert_eq!(txn.plan().len(), 2);
        assert_eq!(txn.dirty_state(c), Some(DirtyState::MaybeDirty));

        txn.evaluate(&graph).unwrap();
        assert_eq!(txn.state(), TransactionState::Evaluating);
        assert_eq!(txn.dirty_state(c), Some(DirtyState::Dirty));

        let (committed, batch) = txn.commit(&mut graph).unwrap();
        assert_eq!(committed.changed, vec!["a", "c", "d"]);
        assert_eq!(committed.evaluated, 2);
        assert_eq!(batch.len(), 3);
        assert_eq!(graph.value("c").unwrap(), &Value::Int(8));
        assert_eq!(graph.value("d").unwrap(), &Value::Float(5.0 / 3.0));
    }

    #[test]
    fn evaluation_does_not_touch_graph() {
        let graph = graph();
        let mut txn = Transaction::begin(&graph, 1, [("a", 5)]).unwrap();
        txn.evaluate(&graph).unwrap();

        assert_eq!(graph.value("a").unwrap(), &Value::Int(2));
        assert_eq!(graph.value("c").unwrap(), &Value::Int(3));
        assert_eq!(graph.version("a").unwrap(), 0);
    }

    #[test]
    fn failure_aborts_and_names_output() {
        let graph = graph();
        let mut txn = Transaction::begin(&graph, 1, [("b", 0)]).unwrap();

        let err = txn.evaluate(&graph).unwrap_err();
        assert_eq!(
            err,
            GraphError::Evaluation {
                variable: "d".into(),
                source: ComputeError::DivisionByZero,
            }
        );
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert!(txn.working.is_empty());
    }

    #[test]
    fn aborted_transaction_cannot_commit() {
        let mut graph = graph();
        let mut txn = Transaction::begin(&graph, 4, [("b", 0)]).unwrap();
        txn.evaluate(&graph).unwrap_err();

        assert_eq!(
            txn.commit(&mut graph).unwrap_err(),
            GraphError::InvalidTransactionState {
                transaction: 4,
                state: TransactionState::Aborted,
            }
        );
        assert_eq!(graph.value("b").unwrap(), &Value::Int(3));
        assert_eq!(graph.version("c").unwrap(), 0);
    }

    #[test]
    fn state_machine_rejects_out_of_order_calls() {
        let mut graph = graph();

        let pending = Transaction::begin(&graph, 1, [("a", 5)]).unwrap();
        assert!(matches!(
            pending.commit(&mut graph),
            Err(GraphError::InvalidTransactionState {
                state: TransactionState::Pending,
                ..
            })
        ));
        assert_eq!(graph.value("a").unwrap(), &Value::Int(2));

        let mut txn = Transaction::begin(&graph, 2, [("a", 5)]).unwrap();
        txn.evaluate(&graph).unwrap();
        assert!(matches!(
            txn.evaluate(&graph),
            Err(GraphError::InvalidTransactionState {
                state: TransactionState::Evaluating,
                ..
            })
        ));
        // the first evaluation is still committable
        let (committed, _) = txn.commit(&mut graph).unwrap();
        assert_eq!(committed.changed, vec!["a", "c", "d"]);
    }

    #[test]
    fn identical_nan_is_not_a_change() {
        let mut graph = Graph::new();
        graph.declare_variable("a", f64::NAN).unwrap();
        graph.declare_variable("b", f64::NAN).unwrap();
        graph.declare_equation("b", &["a"], functions::identity).unwrap();

        let mut txn = Transaction::begin(&graph, 1, [("a", f64::NAN)]).unwrap();
        assert!(txn.plan().is_empty());
        txn.evaluate(&graph).unwrap();
        let (committed, batch) = txn.commit(&mut graph).unwrap();
        assert!(committed.changed.is_empty());
        assert!(batch.is_empty());

        // forced evaluation producing the same NaN writes nothing
        let mut txn = Transaction::recompute(&graph, 2, None);
        txn.evaluate(&graph).unwrap();
        let b = graph.resolve("b").unwrap();
        assert_eq!(txn.dirty_state(b), Some(DirtyState::Clean));
        let (committed, _) = txn.commit(&mut graph).unwrap();
        assert_eq!(committed.evaluated, 1);
        assert!(committed.changed.is_empty());
        assert_eq!(graph.version("b").unwrap(), 0);
    }

    #[test]
    fn unchanged_sources_plan_nothing() {
        let graph = graph();
        let mut txn = Transaction::begin(&graph, 1, [("a", 2), ("b", 3)]).unwrap();
        assert!(txn.plan().is_empty());

        txn.evaluate(&graph).unwrap();
        assert_eq!(txn.evaluated, 0);
    }

    #[test]
    fn change_set_is_validated_up_front() {
        let graph = graph();
        assert_eq!(
            Transaction::begin(&graph, 1, [("zz", 1)]).unwrap_err(),
            GraphError::UnknownVariable("zz".into())
        );
        assert_eq!(
            Transaction::begin(&graph, 1, [("a", 1), ("a", 2)]).unwrap_err(),
            GraphError::ConflictingChange("a".into())
        );
        assert_eq!(
            Transaction::begin(&graph, 1, [("c", 1)]).unwrap_err(),
            GraphError::DerivedTarget("c".into())
        );
    }

    #[test]
    fn sources_are_written_in_name_order() {
        let mut graph = graph();
        let mut txn = Transaction::begin(&graph, 1, [("b", 4), ("a", 1)]).unwrap();
        txn.evaluate(&graph).unwrap();
        let (committed, _) = txn.commit(&mut graph).unwrap();
        assert_eq!(committed.changed[..2], ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unchanged_output_stops_propagation() {
        let mut graph = Graph::new();
        graph.declare_variable("x", 1).unwrap();
        graph.declare_variable("sign", 1).unwrap();
        graph.declare_variable("label", "pos").unwrap();
        let sign = |inputs: &[Value]| -> std::result::Result<Value, ComputeError> {
            Ok(Value::Int(inputs[0].as_i64()?.signum()))
        };
        let label = |inputs: &[Value]| -> std::result::Result<Value, ComputeError> {
            let text = if inputs[0].as_i64()? >= 0 { "pos" } else { "neg" };
            Ok(Value::from(text))
        };
        graph.declare_equation("sign", &["x"], sign).unwrap();
        graph.declare_equation("label", &["sign"], label).unwrap();

        let mut txn = Transaction::begin(&graph, 1, [("x", 7)]).unwrap();
        assert_eq!(txn.plan().len(), 2);
        txn.evaluate(&graph).unwrap();
        // sign stays 1, so label is skipped
        assert_eq!(txn.evaluated, 1);
        assert_eq!(txn.dirty_state(graph.resolve("sign").unwrap()), Some(DirtyState::Clean));
        assert_eq!(txn.dirty_state(graph.resolve("label").unwrap()), Some(DirtyState::Clean));
        assert_eq!(txn.dirty_state(graph.resolve("x").unwrap()), None);

        let (committed, _) = txn.commit(&mut graph).unwrap();
        assert_eq!(committed.changed, vec!["x"]);
    }

    #[test]
    fn recompute_forces_evaluation() {
        let mut graph = graph();
        let mut txn = Transaction::recompute(&graph, 1, None);
        txn.evaluate(&graph).unwrap();
        let (committed, _) = txn.commit(&mut graph).unwrap();

        assert_eq!(committed.evaluated, 2);
        assert_eq!(committed.changed, vec!["c", "d"]);
        assert_eq!(graph.value("c").unwrap(), &Value::Int(5));
    }

    #[test]
    fn output_signature_is_enforced() {
        let mut graph = Graph::new();
        graph.declare_variable("a", 1).unwrap();
        graph.declare_variable("b", 0).unwrap();
        let to_text = |inputs: &[Value]| -> std::result::Result<Value, ComputeError> {
            Ok(Value::from(inputs[0].to_string()))
        };
        graph
            .declare_typed_equation(
                "b",
                &["a"],
                crate::value::Signature::numeric(1),
                to_text,
            )
            .unwrap();

        let mut txn = Transaction::begin(&graph, 1, [("a", 2)]).unwrap();
        assert!(matches!(
            txn.evaluate(&graph),
            Err(GraphError::Evaluation {
                source: ComputeError::TypeMismatch { .. },
                ..
            })
        ));
    }
}
