//! Dependency graph construction.
//!
//! Every pass becomes a [`Node`] in an arena indexed by the pass's own index,
//! so a [`PassHandle`] and a node index are interchangeable. Edges are plain
//! indices into the arena and are resolved once all nodes exist.

use std::collections::BTreeSet;

use crate::graph::{Pass, PassHandle, QueueIndex, ResourceId};

/// Index of a node in the [`DependencyGraph`] arena.
pub(crate) type NodeIndex = usize;

/// Scheduling metadata of a single pass.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) queue: QueueIndex,
    /// Position of `queue` among the queues the graph uses.
    pub(crate) queue_slot: usize,
    /// Resources read or written by the pass, at resource granularity.
    pub(crate) touched: BTreeSet<ResourceId>,
    /// Nodes whose writes this node reads.
    pub(crate) dependencies: Vec<NodeIndex>,
    /// Nodes reading what this node writes.
    pub(crate) dependents: Vec<NodeIndex>,
    pub(crate) global_index: usize,
    pub(crate) local_index: usize,
    pub(crate) level: usize,
    pub(crate) signal_required: bool,
    /// Per queue slot, the highest local index this node is known to run after.
    pub(crate) sync_indices: Vec<Option<usize>>,
    /// Cross-queue producers this node waits on. Raw after construction,
    /// pruned by the synchronization culler.
    pub(crate) nodes_to_sync_with: Vec<NodeIndex>,
}

impl Node {
    fn new(pass: &Pass) -> Self {
        let touched = pass
            .reads()
            .iter()
            .chain(pass.writes().iter())
            .map(|name| name.resource())
            .collect();
        Self {
            queue: pass.queue(),
            queue_slot: 0,
            touched,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            global_index: 0,
            local_index: 0,
            level: 0,
            signal_required: false,
            sync_indices: Vec::new(),
            nodes_to_sync_with: Vec::new(),
        }
    }
}

/// Directed graph of cross-pass dependencies.
#[derive(Debug)]
pub(crate) struct DependencyGraph<'a> {
    passes: &'a [Pass],
    nodes: Vec<Node>,
    /// Distinct queues referenced by the passes, ascending.
    queues: Vec<QueueIndex>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the graph: `B` depends on `A` when `B` reads a subresource `A` writes.
    ///
    /// Each pair of passes is compared directly, which is quadratic in the pass
    /// count. Frame graphs hold tens of passes, so this stays cheap.
    pub(crate) fn build(passes: &'a [Pass]) -> Self {
        let mut nodes: Vec<Node> = passes.iter().map(Node::new).collect();
        let queues: Vec<QueueIndex> = passes
            .iter()
            .map(Pass::queue)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for node in &mut nodes {
            node.queue_slot = slot_of(&queues, node.queue);
        }

        for (consumer, reader) in passes.iter().enumerate() {
            for (producer, writer) in passes.iter().enumerate() {
                if producer == consumer {
                    continue;
                }
                let depends = reader
                    .reads()
                    .iter()
                    .any(|name| writer.writes().contains(name));
                if !depends {
                    continue;
                }

                nodes[consumer].dependencies.push(producer);
                nodes[producer].dependents.push(consumer);

                if writer.queue() != reader.queue() {
                    nodes[producer].signal_required = true;
                    nodes[consumer].nodes_to_sync_with.push(producer);
                }
                log::trace!(
                    "'{}' depends on '{}'",
                    reader.name(),
                    writer.name()
                );
            }
        }

        Self {
            passes,
            nodes,
            queues,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct queues referenced by the passes.
    ///
    /// Per-queue data is indexed by queue slot, so sparse queue indices cost
    /// nothing extra.
    pub(crate) fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub(crate) fn queues(&self) -> &[QueueIndex] {
        &self.queues
    }

    pub(crate) fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index]
    }

    pub(crate) fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        &mut self.nodes[index]
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub(crate) fn pass(&self, index: NodeIndex) -> &'a Pass {
        &self.passes[index]
    }

    pub(crate) fn handle(index: NodeIndex) -> PassHandle {
        PassHandle::new(index as u32)
    }
}

fn slot_of(queues: &[QueueIndex], queue: QueueIndex) -> usize {
    queues.binary_search(&queue).unwrap_or_else(|slot| slot)
}
