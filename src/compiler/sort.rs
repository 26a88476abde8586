//! Topological sort with cycle detection.

use super::dependency::{DependencyGraph, NodeIndex};
use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Order the nodes so every producer precedes its consumers.
///
/// Depth-first search over dependent edges; the result is the reversed
/// post-order. A back edge to a node still on the recursion stack is a cycle
/// and aborts the compile, naming the pass the cycle closes on.
pub(crate) fn topological_sort(graph: &DependencyGraph<'_>) -> CompileResult<Vec<NodeIndex>> {
    let mut marks = vec![Mark::Unvisited; graph.len()];
    let mut post_order = Vec::with_capacity(graph.len());

    for root in 0..graph.len() {
        if marks[root] == Mark::Unvisited {
            visit(graph, root, &mut marks, &mut post_order)?;
        }
    }

    post_order.reverse();
    Ok(post_order)
}

fn visit(
    graph: &DependencyGraph<'_>,
    index: NodeIndex,
    marks: &mut [Mark],
    post_order: &mut Vec<NodeIndex>,
) -> CompileResult<()> {
    marks[index] = Mark::OnStack;

    for &dependent in &graph.node(index).dependents {
        match marks[dependent] {
            Mark::Unvisited => visit(graph, dependent, marks, post_order)?,
            Mark::OnStack => {
                return Err(CompileError::GraphCycle {
                    pass: graph.pass(dependent).name().to_string(),
                });
            }
            Mark::Done => {}
        }
    }

    marks[index] = Mark::Done;
    post_order.push(index);
    Ok(())
}
