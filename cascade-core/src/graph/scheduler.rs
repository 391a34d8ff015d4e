//! Propagation Scheduler
//!
//! The scheduler determines which equations a change affects and the order
//! in which they must run. It ensures every equation runs after all the
//! equations producing its inputs.
//!
//! # Algorithm
//!
//! 1. Starting from the changed variables, walk the reverse index
//!    (variable -> dependent equation outputs) to collect the forward closure.
//! 2. Topologically sort the closure with Kahn's algorithm, counting only the
//!    edges that stay inside it.
//! 3. Among equations that are ready at the same time, pick the one whose
//!    output name sorts first. This makes the order reproducible regardless
//!    of declaration order or hashing.
//!
//! The plan is rebuilt for every transaction since equations may have been
//! added or removed since the last one.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};

use super::node::NodeId;
use super::Graph;

/// An ordered list of equations to evaluate, identified by their outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    order: Vec<NodeId>,
}

impl Plan {
    /// Equation outputs in evaluation order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl IntoIterator for Plan {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}

/// Computes evaluation plans over a borrowed graph.
pub struct Scheduler<'g> {
    graph: &'g Graph,
}

impl<'g> Scheduler<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Plan the equations affected by a change to `changed`.
    ///
    /// The changed variables themselves are not part of the plan unless an
    /// equation produces them.
    pub fn plan<I>(&self, changed: I) -> Plan
    where
        I: IntoIterator<Item = NodeId>,
    {
        let seeds = changed
            .into_iter()
            .filter_map(|id| self.graph.variable(id))
            .flat_map(|variable| variable.dependents().iter().copied());
        let closure = self.forward_closure(seeds);
        self.topological_sort(&closure)
    }

    /// Plan the equations producing `outputs` and everything downstream of them.
    pub fn plan_equations<I>(&self, outputs: I) -> Plan
    where
        I: IntoIterator<Item = NodeId>,
    {
        let seeds = outputs
            .into_iter()
            .filter(|&id| self.graph.equation(id).is_some());
        let closure = self.forward_closure(seeds);
        self.topological_sort(&closure)
    }

    /// Plan every equation in the graph.
    pub fn plan_all(&self) -> Plan {
        let closure: HashSet<NodeId> = self.graph.equation_outputs().collect();
        self.topological_sort(&closure)
    }

    /// Collect `seeds` (equation outputs) and every equation output
    /// transitively downstream of them.
    fn forward_closure<I>(&self, seeds: I) -> HashSet<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut closure = HashSet::new();
        let mut queue: VecDeque<NodeId> = seeds.into_iter().collect();

        while let Some(node) = queue.pop_front() {
            if !closure.insert(node) {
                continue;
            }
            if let Some(variable) = self.graph.variable(node) {
                for &dependent in variable.dependents() {
                    if !closure.contains(&dependent) {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        closure
    }

    /// Kahn's algorithm over the subgraph induced by `nodes`.
    fn topological_sort(&self, nodes: &HashSet<NodeId>) -> Plan {
        let mut in_degree: HashMap<NodeId, usize> = HashMap::with_capacity(nodes.len());
        let mut ready = BinaryHeap::new();

        for &node in nodes {
            let degree = self
                .graph
                .equation(node)
                .map(|eq| {
                    eq.distinct_inputs()
                        .iter()
                        .filter(|input| nodes.contains(*input))
                        .count()
                })
                .unwrap_or(0);
            in_degree.insert(node, degree);
            if degree == 0 {
                ready.push(Reverse((self.graph.name_of(node), node)));
            }
        }

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(Reverse((_, node))) = ready.pop() {
            order.push(node);

            let dependents: &BTreeSet<NodeId> = match self.graph.variable(node) {
                Some(variable) => variable.dependents(),
                None => continue,
            };
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.push(Reverse((self.graph.name_of(*dependent), *dependent)));
                    }
                }
            }
        }

        // the graph is acyclic, so every node in the closure is emitted
        debug_assert_eq!(order.len(), nodes.len(), "cycle inside propagation closure");

        Plan { order }
    }
}
