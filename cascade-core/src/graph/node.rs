//! Graph Nodes
//!
//! This module defines the records that live in the graph arena: variables
//! and the equations that produce them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::compute::Compute;
use crate::value::{Signature, Value};

/// Stable identifier of a variable: its slot in the graph arena.
///
/// Ids are assigned densely in declaration order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Id for arena slot `index`, or `None` if it does not fit in a `u32`.
    pub(crate) fn try_from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    #[cfg(test)]
    pub(crate) fn from_index(index: usize) -> Self {
        Self::try_from_index(index).expect("test index fits in u32")
    }

    /// Get the arena index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The role a variable plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An independent input. Only changed by callers.
    Source,

    /// Computed by exactly one equation. Never set directly.
    Derived,
}

/// Dirty state of a scheduled equation within one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// Visited, and the output kept its value: either no input changed or
    /// the equation recomputed the current value. Propagation stops here.
    Clean,

    /// In the propagation closure but not visited yet.
    MaybeDirty,

    /// Evaluated to a new value. Its dependents must be visited.
    Dirty,
}

/// A variable in the graph.
#[derive(Debug)]
pub struct Variable {
    id: NodeId,
    name: String,
    value: Value,

    /// Incremented on every committed change of `value`.
    version: u64,

    /// Outputs of the equations that read this variable.
    dependents: BTreeSet<NodeId>,

    /// Whether an equation produces this variable.
    produced: bool,
}

impl Variable {
    pub(crate) fn new(id: NodeId, name: String, value: Value) -> Self {
        Self {
            id,
            name,
            value,
            version: 0,
            dependents: BTreeSet::new(),
            produced: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn kind(&self) -> NodeKind {
        if self.produced {
            NodeKind::Derived
        } else {
            NodeKind::Source
        }
    }

    pub fn is_source(&self) -> bool {
        !self.produced
    }

    /// Outputs of the equations that read this variable.
    pub fn dependents(&self) -> &BTreeSet<NodeId> {
        &self.dependents
    }

    /// Replace the committed value and bump the version.
    pub(crate) fn commit(&mut self, value: Value) -> Value {
        self.version += 1;
        std::mem::replace(&mut self.value, value)
    }

    pub(crate) fn add_dependent(&mut self, output: NodeId) {
        self.dependents.insert(output);
    }

    pub(crate) fn remove_dependent(&mut self, output: NodeId) {
        self.dependents.remove(&output);
    }

    pub(crate) fn set_produced(&mut self, produced: bool) {
        self.produced = produced;
    }
}

/// Input list of an equation. Most equations read a handful of variables.
pub type Inputs = SmallVec<[NodeId; 4]>;

/// A directed relation computing one variable from others.
#[derive(Clone)]
pub struct Equation {
    output: NodeId,
    inputs: Inputs,
    compute: Arc<dyn Compute>,
    signature: Option<Signature>,
}

impl Equation {
    pub(crate) fn new(
        output: NodeId,
        inputs: Inputs,
        compute: Arc<dyn Compute>,
        signature: Option<Signature>,
    ) -> Self {
        Self {
            output,
            inputs,
            compute,
            signature,
        }
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Input variables, in the order the computation receives them.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub(crate) fn compute(&self) -> &dyn Compute {
        self.compute.as_ref()
    }

    /// Distinct inputs. An equation may read the same variable twice.
    pub(crate) fn distinct_inputs(&self) -> BTreeSet<NodeId> {
        self.inputs.iter().copied().collect()
    }
}

impl fmt::Debug for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Equation")
            .field("output", &self.output)
            .field("inputs", &self.inputs)
            .field("signature", &self.signature)
            .finish()
    }
}
