//! Cycle Detection
//!
//! Before an equation `output <- inputs` is inserted, we check that none of
//! the inputs is reachable from `output` through existing edges. If one is,
//! the new edge `input -> output` would close a cycle.
//!
//! The search is a depth-first walk forward from `output` over the reverse
//! index (variable -> dependent equation outputs). It only visits the part of
//! the graph downstream of `output`, so declaring an equation near the leaves
//! of a large graph stays cheap.

use std::collections::{BTreeSet, HashMap};

use super::node::{NodeId, Variable};

/// Find the cycle that adding `output <- inputs` would create, if any.
///
/// Returns the cycle as a node path that starts and ends at `output`, e.g.
/// `[a, c, a]` for `a <- c` when `c` already depends on `a`.
pub(crate) fn find_cycle(
    variables: &[Variable],
    output: NodeId,
    inputs: &BTreeSet<NodeId>,
) -> Option<Vec<NodeId>> {
    if inputs.contains(&output) {
        return Some(vec![output, output]);
    }

    // parent links of the DFS tree, for reconstructing the path
    let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
    let mut stack = vec![output];
    parent.insert(output, output);

    while let Some(node) = stack.pop() {
        if inputs.contains(&node) {
            return Some(trace_back(&parent, output, node));
        }
        let Some(variable) = variables.get(node.index()) else {
            continue;
        };
        // reverse so lower ids are explored first
        for &next in variable.dependents().iter().rev() {
            if !parent.contains_key(&next) {
                parent.insert(next, node);
                stack.push(next);
            }
        }
    }

    None
}

/// Rebuild `output -> ... -> reached -> output` from the DFS parent links.
fn trace_back(parent: &HashMap<NodeId, NodeId>, output: NodeId, reached: NodeId) -> Vec<NodeId> {
    let mut path = vec![reached];
    let mut node = reached;
    while node != output {
        match parent.get(&node) {
            Some(&prev) => {
                path.push(prev);
                node = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path.push(output);
    path
}
