/// Infinite-loop detection.
///
/// A node is safe when some path from it reaches a terminal node. Terminal
/// nodes have no children or an unconnected declared branch.
use rustc_hash::FxHashSet;

use crate::core::diagnostics::{ErrorCollection, ExportErrorKind};
use crate::core::graph::{DialogGraph, GraphNode, NodeIdx};

fn is_terminal(node: &GraphNode) -> bool {
    node.children.is_empty() || node.has_open_branch()
}

/// Depth-first search from `start` for a terminal or already safe node.
/// Returns the path that got there.
fn walk_from(graph: &DialogGraph, start: NodeIdx) -> Option<Vec<NodeIdx>> {
    let mut visited = FxHashSet::default();
    // (node, index of the next child to try)
    let mut stack: Vec<(NodeIdx, usize)> = vec![(start, 0)];
    visited.insert(start);

    loop {
        let (idx, next_child) = *stack.last()?;
        let node = graph.node(idx);
        if next_child == 0 && (node.reaches_end || is_terminal(node)) {
            return Some(stack.into_iter().map(|(idx, _)| idx).collect());
        }

        match node.children.get(next_child) {
            Some(child) => {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                if visited.insert(child.target) {
                    stack.push((child.target, 0));
                }
            }
            None => {
                stack.pop();
            }
        }
    }
}

/// Check that every node of the graph can reach an end of the dialog.
///
/// Records a single `InfinityLoop` diagnostic for the first node that
/// cannot, and returns whether all nodes terminate.
pub fn check_for_infinite_loops(graph: &mut DialogGraph, errors: &mut ErrorCollection) -> bool {
    for idx in graph.bfs_order() {
        if graph.node(idx).reaches_end {
            continue;
        }
        match walk_from(graph, idx) {
            Some(path) => {
                for on_path in path {
                    graph.node_mut(on_path).reaches_end = true;
                }
            }
            None => {
                let id = &graph.node(idx).id;
                tracing::debug!(dialog = graph.dialog_id(), node = %id, "node never reaches an end");
                errors.add(
                    ExportErrorKind::InfinityLoop,
                    format!("node '{}' can never reach the end of the dialog", id),
                );
                return false;
            }
        }
    }
    true
}
