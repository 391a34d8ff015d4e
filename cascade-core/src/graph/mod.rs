//! Dependency Graph
//!
//! This module implements the graph of variables and the equations that
//! relate them, together with the structural checks that keep it valid.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are variables holding a [`Value`]
//! - Each equation adds an edge from every one of its inputs to its output
//!
//! A variable has at most one producing equation. Variables without one are
//! sources: the only values callers may change directly.
//!
//! # Design Decisions
//!
//! 1. Variables live in an arena addressed by [`NodeId`]. Equations refer to
//!    variables by id, never by reference, so there are no ownership cycles
//!    between variables and the equations that read or produce them.
//!
//! 2. Equations are stored keyed by their output, which gives the forward
//!    index (output -> equation) and enforces the single-writer rule.
//!
//! 3. Every variable keeps the set of outputs of equations reading it (the
//!    reverse index). Propagation and cycle detection both walk it, so neither
//!    scans the whole graph.
//!
//! 4. Every check runs before anything is inserted. A failed declaration
//!    leaves the graph untouched.

mod cycle;
mod node;
mod scheduler;

pub use node::{DirtyState, Equation, Inputs, NodeId, NodeKind, Variable};
pub use scheduler::{Plan, Scheduler};

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::compute::Compute;
use crate::error::{GraphError, Result};
use crate::value::{Signature, Value};

/// Handle to a declared variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    pub id: NodeId,
    pub name: String,
}

/// Handle to a declared equation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquationRef {
    pub output: NodeId,
    pub name: String,
    pub inputs: Vec<String>,
}

/// The committed graph: variables, equations, and their indices.
///
/// A graph holds at most `u32::MAX + 1` variables, the range of [`NodeId`].
/// Declaring one more fails with `CapacityExceeded`.
#[derive(Debug, Default)]
pub struct Graph {
    /// Variable arena, indexed by `NodeId`.
    variables: Vec<Variable>,

    /// Name lookup, in declaration order.
    names: IndexMap<String, NodeId>,

    /// Producing equation of each derived variable, keyed by output.
    equations: HashMap<NodeId, Equation>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new source variable with an initial value.
    pub fn declare_variable(
        &mut self,
        name: impl Into<String>,
        initial: impl Into<Value>,
    ) -> Result<VariableRef> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicateId(name));
        }

        let id = NodeId::try_from_index(self.variables.len())
            .ok_or(GraphError::CapacityExceeded(self.variables.len()))?;
        self.variables
            .push(Variable::new(id, name.clone(), initial.into()));
        self.names.insert(name.clone(), id);

        debug!(variable = %name, %id, "declared variable");
        Ok(VariableRef { id, name })
    }

    /// Declare an equation computing `output` from `inputs`.
    ///
    /// Fails if any variable is unknown, if `output` already has a producing
    /// equation, or if the new edges would create a cycle.
    pub fn declare_equation<S, C>(
        &mut self,
        output: &str,
        inputs: &[S],
        compute: C,
    ) -> Result<EquationRef>
    where
        S: AsRef<str>,
        C: Compute + 'static,
    {
        self.insert_equation(output, inputs, Arc::new(compute), None)
    }

    /// Declare an equation with declared input and output kinds.
    ///
    /// On top of the checks of [`Graph::declare_equation`], the signature's
    /// arity must match `inputs`, and the current values of the inputs and
    /// the output must have the declared kinds.
    pub fn declare_typed_equation<S, C>(
        &mut self,
        output: &str,
        inputs: &[S],
        signature: Signature,
        compute: C,
    ) -> Result<EquationRef>
    where
        S: AsRef<str>,
        C: Compute + 'static,
    {
        self.insert_equation(output, inputs, Arc::new(compute), Some(signature))
    }

    fn insert_equation<S: AsRef<str>>(
        &mut self,
        output: &str,
        inputs: &[S],
        compute: Arc<dyn Compute>,
        signature: Option<Signature>,
    ) -> Result<EquationRef> {
        let output_id = self.resolve(output)?;
        let input_ids = inputs
            .iter()
            .map(|name| self.resolve(name.as_ref()))
            .collect::<Result<Inputs>>()?;

        if self.equations.contains_key(&output_id) {
            return Err(GraphError::OutputAlreadyProduced(output.to_string()));
        }

        let distinct: BTreeSet<NodeId> = input_ids.iter().copied().collect();
        if let Some(path) = cycle::find_cycle(&self.variables, output_id, &distinct) {
            return Err(GraphError::Cycle {
                output: output.to_string(),
                cycle: path.iter().map(|&id| self.name_of(id).to_string()).collect(),
            });
        }

        if let Some(signature) = &signature {
            self.check_signature(output_id, &input_ids, signature)?;
        }

        for &input in &distinct {
            self.variables[input.index()].add_dependent(output_id);
        }
        self.variables[output_id.index()].set_produced(true);

        let input_names: Vec<String> = input_ids
            .iter()
            .map(|&id| self.name_of(id).to_string())
            .collect();
        self.equations.insert(
            output_id,
            Equation::new(output_id, input_ids, compute, signature),
        );

        debug!(output, inputs = ?input_names, "declared equation");
        Ok(EquationRef {
            output: output_id,
            name: output.to_string(),
            inputs: input_names,
        })
    }

    fn check_signature(
        &self,
        output: NodeId,
        inputs: &[NodeId],
        signature: &Signature,
    ) -> Result<()> {
        if signature.inputs.len() != inputs.len() {
            return Err(GraphError::SignatureArity {
                variable: self.name_of(output).to_string(),
                expected: signature.inputs.len(),
                found: inputs.len(),
            });
        }

        let declared = inputs
            .iter()
            .zip(&signature.inputs)
            .chain(std::iter::once((&output, &signature.output)));
        for (&id, &expected) in declared {
            let found = self.variables[id.index()].value().kind();
            if !expected.accepts(found) {
                return Err(GraphError::SignatureMismatch {
                    variable: self.name_of(output).to_string(),
                    input: self.name_of(id).to_string(),
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Remove the equation producing `output`.
    ///
    /// The output keeps its current value and becomes a source again.
    pub fn remove_equation(&mut self, output: &str) -> Result<EquationRef> {
        let output_id = self.resolve(output)?;
        let equation = self
            .equations
            .remove(&output_id)
            .ok_or_else(|| GraphError::NoSuchEquation(output.to_string()))?;

        for input in equation.distinct_inputs() {
            self.variables[input.index()].remove_dependent(output_id);
        }
        self.variables[output_id.index()].set_produced(false);

        debug!(output, "removed equation");
        Ok(EquationRef {
            output: output_id,
            name: output.to_string(),
            inputs: equation
                .inputs()
                .iter()
                .map(|&id| self.name_of(id).to_string())
                .collect(),
        })
    }

    /// Look up a variable's id by name.
    pub fn resolve(&self, name: &str) -> Result<NodeId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownVariable(name.to_string()))
    }

    pub fn variable(&self, id: NodeId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    pub fn variable_named(&self, name: &str) -> Result<&Variable> {
        let id = self.resolve(name)?;
        Ok(&self.variables[id.index()])
    }

    /// The equation producing `output`, if any.
    pub fn equation(&self, output: NodeId) -> Option<&Equation> {
        self.equations.get(&output)
    }

    /// Name of a variable. Empty for ids from another graph.
    pub fn name_of(&self, id: NodeId) -> &str {
        self.variables.get(id.index()).map_or("", Variable::name)
    }

    pub fn value(&self, name: &str) -> Result<&Value> {
        Ok(self.variable_named(name)?.value())
    }

    pub fn version(&self, name: &str) -> Result<u64> {
        Ok(self.variable_named(name)?.version())
    }

    /// Names of the variables computed directly from `name`.
    pub fn dependents(&self, name: &str) -> Result<Vec<String>> {
        let variable = self.variable_named(name)?;
        Ok(variable
            .dependents()
            .iter()
            .map(|&id| self.name_of(id).to_string())
            .collect())
    }

    /// Inputs of the equation producing `name`, or `None` for a source.
    pub fn producer_inputs(&self, name: &str) -> Result<Option<Vec<String>>> {
        let id = self.resolve(name)?;
        Ok(self.equations.get(&id).map(|eq| {
            eq.inputs()
                .iter()
                .map(|&input| self.name_of(input).to_string())
                .collect()
        }))
    }

    /// Outputs of every equation, in no particular order.
    pub fn equation_outputs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.equations.keys().copied()
    }

    /// Variables in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    /// Committed values in declaration order.
    pub fn values(&self) -> IndexMap<String, Value> {
        self.variables
            .iter()
            .map(|var| (var.name().to_string(), var.value().clone()))
            .collect()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn equation_count(&self) -> usize {
        self.equations.len()
    }

    /// Overwrite a committed value, bumping its version. Returns the old value.
    pub(crate) fn commit_value(&mut self, id: NodeId, value: Value) -> Option<Value> {
        self.variables
            .get_mut(id.index())
            .map(|variable| variable.commit(value))
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, var) in self.variables.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", var.name(), var.value())?;
        }
        f.write_str("}")
    }
}
