//! Cross-queue synchronization culling.
//!
//! Every queue executes its passes in submission order, and each pass has a
//! monotonically increasing local index on its queue. Waiting for queue `Q` to
//! reach local index `N` therefore also covers everything `Q` ran before `N`,
//! including whatever those passes waited for. The culler uses this to replace
//! the raw list of cross-queue producers of each node with a small set of
//! waits that is transitively equivalent to it.
//!
//! Each node carries a synchronization index set: per queue, the highest local
//! index the node is guaranteed to run after. A candidate wait covers a queue
//! if its own set reaches the local index the node needs on that queue.
//! Picking the fewest covering waits is a set cover problem; the greedy
//! choice below is exact whenever a single wait covers everything, which is
//! the common case with two or three queues.

use std::collections::BTreeMap;

use super::dependency::{DependencyGraph, NodeIndex};
use crate::graph::{PassHandle, QueueIndex};

/// A wait a pass performs before its work starts.
///
/// The pass must not begin until `queue` has finished its pass with
/// `local_index` (the pass identified by `pass`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueWait {
    /// Queue to wait on.
    pub queue: QueueIndex,
    /// Local execution index on `queue` that must have completed.
    pub local_index: usize,
    /// The pass that signals this point.
    pub pass: PassHandle,
}

/// Reduce every node's raw cross-queue producers to the waits it actually needs.
///
/// `execution_order` lists all nodes in dependency-level order, so a node's
/// producers and its predecessor on its own queue are final when it is reached.
/// When `cull` is false every node keeps one wait per producing queue (the
/// closest producer) and no transitive reduction is made.
pub(crate) fn cull_redundant_synchronizations(
    graph: &mut DependencyGraph<'_>,
    execution_order: &[NodeIndex],
    cull: bool,
) {
    let queue_count = graph.queue_count();
    for node in graph.nodes_mut() {
        node.sync_indices = vec![None; queue_count];
    }

    let mut previous_on_queue: Vec<Option<NodeIndex>> = vec![None; queue_count];
    let mut raw_waits = 0usize;
    let mut final_waits = 0usize;

    for &index in execution_order {
        let queue = graph.node(index).queue_slot;
        let local_index = graph.node(index).local_index;
        let candidates = dedup(&graph.node(index).nodes_to_sync_with);
        raw_waits += candidates.len();

        // Closest producer on every other queue.
        let mut closest: Vec<Option<NodeIndex>> = vec![None; queue_count];
        for &candidate in &candidates {
            let candidate_queue = graph.node(candidate).queue_slot;
            if candidate_queue == queue {
                continue;
            }
            let replace = match closest[candidate_queue] {
                Some(current) => {
                    graph.node(candidate).local_index > graph.node(current).local_index
                }
                None => true,
            };
            if replace {
                closest[candidate_queue] = Some(candidate);
            }
        }

        // What the node knows without any new wait: its queue predecessor's set.
        let inherited = previous_on_queue[queue]
            .map(|previous| graph.node(previous).sync_indices.clone())
            .unwrap_or_else(|| vec![None; queue_count]);

        let mut sync_indices = inherited.clone();
        let mut required: BTreeMap<usize, usize> = BTreeMap::new();
        for &producer in closest.iter().flatten() {
            let node = graph.node(producer);
            let producer_queue = node.queue_slot;
            for (slot, &known) in node.sync_indices.iter().enumerate() {
                sync_indices[slot] = max_index(sync_indices[slot], known);
            }
            sync_indices[producer_queue] =
                max_index(sync_indices[producer_queue], Some(node.local_index));

            let satisfied = inherited[producer_queue].map_or(false, |have| have >= node.local_index);
            if !cull || !satisfied {
                required.insert(producer_queue, node.local_index);
            }
        }
        sync_indices[queue] = Some(local_index);

        let waits = if cull {
            greedy_cover(graph, &candidates, required)
        } else {
            closest.iter().flatten().copied().collect()
        };

        log::trace!(
            "'{}' waits on {} of {} cross-queue producers",
            graph.pass(index).name(),
            waits.len(),
            candidates.len()
        );
        final_waits += waits.len();

        let node = graph.node_mut(index);
        node.sync_indices = sync_indices;
        node.nodes_to_sync_with = waits;
        previous_on_queue[queue] = Some(index);
    }

    // Only producers somebody still waits on need to signal.
    for node in graph.nodes_mut() {
        node.signal_required = false;
    }
    for &index in execution_order {
        let waits = graph.node(index).nodes_to_sync_with.clone();
        for producer in waits {
            graph.node_mut(producer).signal_required = true;
        }
    }

    log::debug!(
        "Synchronization culling kept {} of {} cross-queue waits",
        final_waits,
        raw_waits
    );
}

/// Greedily pick waits until every required queue is covered.
///
/// `required` maps a queue slot to the local index the node needs on it. A
/// candidate covers a queue when its synchronization index set reaches that
/// index. The closest producer of a queue always covers it, so the loop
/// terminates.
fn greedy_cover(
    graph: &DependencyGraph<'_>,
    candidates: &[NodeIndex],
    mut required: BTreeMap<usize, usize>,
) -> Vec<NodeIndex> {
    let mut remaining = candidates.to_vec();
    let mut chosen = Vec::new();

    while !required.is_empty() {
        let best = remaining
            .iter()
            .enumerate()
            .map(|(slot, &candidate)| {
                let covered: Vec<usize> = required
                    .iter()
                    .filter(|&(&queue, &needed)| {
                        graph.node(candidate).sync_indices[queue]
                            .map_or(false, |have| have >= needed)
                    })
                    .map(|(&queue, _)| queue)
                    .collect();
                (slot, candidate, covered)
            })
            .max_by_key(|(_, candidate, covered)| {
                (covered.len(), graph.node(*candidate).global_index)
            });

        let Some((slot, candidate, covered)) = best else {
            break;
        };
        if covered.is_empty() {
            log::error!(
                "No producer covers queues {:?}; synchronization is incomplete",
                required
                    .keys()
                    .map(|&slot| graph.queues()[slot])
                    .collect::<Vec<_>>()
            );
            break;
        }

        for queue in covered {
            required.remove(&queue);
        }
        chosen.push(candidate);
        remaining.swap_remove(slot);
    }

    chosen.sort_by_key(|&node| graph.node(node).queue);
    chosen
}

fn dedup(nodes: &[NodeIndex]) -> Vec<NodeIndex> {
    let mut unique = nodes.to_vec();
    unique.sort_unstable();
    unique.dedup();
    unique
}

fn max_index(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Convert a node's pruned wait list into queue waits.
pub(crate) fn queue_waits(graph: &DependencyGraph<'_>, index: NodeIndex) -> Vec<QueueWait> {
    graph
        .node(index)
        .nodes_to_sync_with
        .iter()
        .map(|&producer| {
            let node = graph.node(producer);
            QueueWait {
                queue: node.queue,
                local_index: node.local_index,
                pass: DependencyGraph::handle(producer),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::levels::build_levels;
    use crate::compiler::sort::topological_sort;
    use crate::graph::RenderGraphBuilder;

    fn culled<'a>(builder: &'a RenderGraphBuilder, cull: bool) -> DependencyGraph<'a> {
        let mut graph = DependencyGraph::build(builder.passes());
        let order = topological_sort(&graph).unwrap();
        let schedule = build_levels(&mut graph, &order);
        cull_redundant_synchronizations(&mut graph, &schedule.execution_order, cull);
        graph
    }

    #[test]
    fn test_single_cross_queue_wait() {
        let mut builder = RenderGraphBuilder::new();
        let lighting = builder.add_pass("Lighting", 0, false);
        let post = builder.add_pass("Postprocess", 1, false);
        builder.add_write_dependency(lighting, "Color", 0).unwrap();
        builder.add_read_dependency(post, "Color", 0).unwrap();

        let graph = culled(&builder, true);
        assert_eq!(
            queue_waits(&graph, post.index()),
            vec![QueueWait {
                queue: QueueIndex(0),
                local_index: 0,
                pass: lighting
            }]
        );
        assert!(graph.node(lighting.index()).signal_required);
        assert!(!graph.node(post.index()).signal_required);
    }

    #[test]
    fn test_diamond_waits_once_per_queue() {
        // A feeds B and C on queue 0; D on queue 1 reads both.
        let mut builder = RenderGraphBuilder::new();
        let a = builder.add_pass("A", 0, false);
        let b = builder.add_pass("B", 0, false);
        let c = builder.add_pass("C", 0, false);
        let d = builder.add_pass("D", 1, false);
        builder.add_write_dependency(a, "Source", 0).unwrap();
        builder.add_read_dependency(b, "Source", 0).unwrap();
        builder.add_read_dependency(c, "Source", 0).unwrap();
        builder.add_write_dependency(b, "Left", 0).unwrap();
        builder.add_write_dependency(c, "Right", 0).unwrap();
        builder.add_read_dependency(d, "Left", 0).unwrap();
        builder.add_read_dependency(d, "Right", 0).unwrap();

        let graph = culled(&builder, true);
        let waits = queue_waits(&graph, d.index());
        assert_eq!(waits.len(), 1);
        let later = if graph.node(b.index()).local_index > graph.node(c.index()).local_index {
            b
        } else {
            c
        };
        assert_eq!(waits[0].pass, later);
        assert_eq!(waits[0].local_index, 2);
    }

    #[test]
    fn test_transitive_wait_covers_other_queue() {
        // A (q0) -> B (q1) -> C (q2), and C also reads A directly.
        // Waiting for B already implies A, so C only waits on queue 1.
        let mut builder = RenderGraphBuilder::new();
        let a = builder.add_pass("A", 0, false);
        let b = builder.add_pass("B", 1, false);
        let c = builder.add_pass("C", 2, false);
        builder.add_write_dependency(a, "AB", 0).unwrap();
        builder.add_read_dependency(b, "AB", 0).unwrap();
        builder.add_read_dependency(c, "AB", 0).unwrap();
        builder.add_write_dependency(b, "BC", 0).unwrap();
        builder.add_read_dependency(c, "BC", 0).unwrap();

        let graph = culled(&builder, true);
        let waits = queue_waits(&graph, c.index());
        assert_eq!(waits.len(), 1);
        assert_eq!(waits[0].pass, b);
        assert_eq!(graph.node(c.index()).sync_indices, vec![Some(0), Some(0), Some(0)]);
        // A is still waited on by B.
        assert!(graph.node(a.index()).signal_required);
    }

    #[test]
    fn test_without_culling_keeps_closest_per_queue() {
        let mut builder = RenderGraphBuilder::new();
        let a = builder.add_pass("A", 0, false);
        let b = builder.add_pass("B", 1, false);
        let c = builder.add_pass("C", 2, false);
        builder.add_write_dependency(a, "AB", 0).unwrap();
        builder.add_read_dependency(b, "AB", 0).unwrap();
        builder.add_read_dependency(c, "AB", 0).unwrap();
        builder.add_write_dependency(b, "BC", 0).unwrap();
        builder.add_read_dependency(c, "BC", 0).unwrap();

        let graph = culled(&builder, false);
        let waits = queue_waits(&graph, c.index());
        assert_eq!(waits.len(), 2);
        assert_eq!(waits[0].pass, a);
        assert_eq!(waits[1].pass, b);
    }

    #[test]
    fn test_queue_history_satisfies_requirement() {
        // P (q0) is waited on by X (q1); Y follows X on q1 and also reads P.
        let mut builder = RenderGraphBuilder::new();
        let p = builder.add_pass("P", 0, false);
        let x = builder.add_pass("X", 1, false);
        let y = builder.add_pass("Y", 1, false);
        builder.add_write_dependency(p, "Data", 0).unwrap();
        builder.add_read_dependency(x, "Data", 0).unwrap();
        builder.add_write_dependency(x, "Stage", 0).unwrap();
        builder.add_read_dependency(y, "Stage", 0).unwrap();
        builder.add_read_dependency(y, "Data", 0).unwrap();

        let graph = culled(&builder, true);
        assert_eq!(queue_waits(&graph, x.index()).len(), 1);
        assert!(queue_waits(&graph, y.index()).is_empty());
    }

    #[test]
    fn test_independent_queues_never_wait() {
        let mut builder = RenderGraphBuilder::new();
        let a = builder.add_pass("A", 0, false);
        let b = builder.add_pass("B", 1, false);
        builder.add_write_dependency(a, "X", 0).unwrap();
        builder.add_write_dependency(b, "Y", 0).unwrap();

        let graph = culled(&builder, true);
        assert!(queue_waits(&graph, a.index()).is_empty());
        assert!(queue_waits(&graph, b.index()).is_empty());
        assert!(!graph.node(a.index()).signal_required);
        assert!(!graph.node(b.index()).signal_required);
    }

    #[test]
    fn test_max_index() {
        assert_eq!(max_index(None, None), None);
        assert_eq!(max_index(Some(3), None), Some(3));
        assert_eq!(max_index(None, Some(1)), Some(1));
        assert_eq!(max_index(Some(3), Some(5)), Some(5));
    }
}
