//! Dependency levels and execution indices.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use super::dependency::{DependencyGraph, NodeIndex};
use crate::graph::{PassHandle, QueueIndex, ResourceId, SubresourceName};

/// A group of passes with the same longest-path distance from a root.
///
/// Passes in one level have no path dependency on each other, so passes of a
/// level that live on different queues may execute concurrently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyLevel {
    index: usize,
    passes: Vec<PassHandle>,
    queue_passes: BTreeMap<QueueIndex, Vec<PassHandle>>,
    multi_queue_reads: BTreeSet<SubresourceName>,
}

impl DependencyLevel {
    /// Position of the level in the schedule.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Passes of this level in execution order.
    pub fn passes(&self) -> &[PassHandle] {
        &self.passes
    }

    /// Passes of this level that execute on `queue`.
    pub fn queue_passes(&self, queue: QueueIndex) -> &[PassHandle] {
        self.queue_passes
            .get(&queue)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Subresources read by more than one queue within this level.
    pub fn multi_queue_reads(&self) -> &BTreeSet<SubresourceName> {
        &self.multi_queue_reads
    }
}

/// Span of the schedule during which a resource is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceUsageTimeline {
    /// First global execution index referencing the resource.
    pub first_execution: usize,
    /// Last global execution index referencing the resource.
    pub last_execution: usize,
    /// First dependency level referencing the resource.
    pub first_level: usize,
    /// Last dependency level referencing the resource.
    pub last_level: usize,
}

impl ResourceUsageTimeline {
    fn new(execution: usize, level: usize) -> Self {
        Self {
            first_execution: execution,
            last_execution: execution,
            first_level: level,
            last_level: level,
        }
    }

    fn extend(&mut self, execution: usize, level: usize) {
        self.first_execution = self.first_execution.min(execution);
        self.last_execution = self.last_execution.max(execution);
        self.first_level = self.first_level.min(level);
        self.last_level = self.last_level.max(level);
    }

    /// Global execution indices covered by the timeline.
    pub fn executions(&self) -> RangeInclusive<usize> {
        self.first_execution..=self.last_execution
    }

    /// Dependency levels covered by the timeline.
    pub fn levels(&self) -> RangeInclusive<usize> {
        self.first_level..=self.last_level
    }
}

/// Output of the level builder.
#[derive(Debug, Default)]
pub(crate) struct LevelSchedule {
    pub(crate) levels: Vec<DependencyLevel>,
    /// Every node in global execution order.
    pub(crate) execution_order: Vec<NodeIndex>,
    pub(crate) queue_order: BTreeMap<QueueIndex, Vec<PassHandle>>,
    pub(crate) timelines: BTreeMap<ResourceId, ResourceUsageTimeline>,
    pub(crate) first_ray_tracing: Option<PassHandle>,
}

/// Group nodes into dependency levels and assign execution indices.
///
/// `topological_order` must list every node with producers before consumers.
pub(crate) fn build_levels(
    graph: &mut DependencyGraph<'_>,
    topological_order: &[NodeIndex],
) -> LevelSchedule {
    // Longest path from any root, relaxed in topological order.
    let mut distances = vec![0usize; graph.len()];
    for &index in topological_order {
        let distance = distances[index];
        for &dependent in &graph.node(index).dependents {
            distances[dependent] = distances[dependent].max(distance + 1);
        }
    }

    let level_count = distances.iter().max().map_or(0, |&max| max + 1);
    let queue_count = graph.queue_count();
    let mut levels: Vec<DependencyLevel> = (0..level_count)
        .map(|index| DependencyLevel {
            index,
            ..DependencyLevel::default()
        })
        .collect();
    let mut level_nodes: Vec<Vec<NodeIndex>> = vec![Vec::new(); level_count];
    for &index in topological_order {
        level_nodes[distances[index]].push(index);
    }

    let mut schedule = LevelSchedule::default();
    let mut queue_counters = vec![0usize; queue_count];
    let mut global_counter = 0usize;

    for (level_index, nodes) in level_nodes.iter().enumerate() {
        let level = &mut levels[level_index];
        let mut readers: BTreeMap<SubresourceName, BTreeSet<QueueIndex>> = BTreeMap::new();

        for &index in nodes {
            let handle = DependencyGraph::handle(index);
            let pass = graph.pass(index);
            let queue = pass.queue();

            let node = graph.node_mut(index);
            node.level = level_index;
            node.global_index = global_counter;
            node.local_index = queue_counters[node.queue_slot];
            global_counter += 1;
            queue_counters[node.queue_slot] += 1;

            for &resource in &node.touched {
                schedule
                    .timelines
                    .entry(resource)
                    .and_modify(|timeline| timeline.extend(node.global_index, level_index))
                    .or_insert_with(|| ResourceUsageTimeline::new(node.global_index, level_index));
            }

            for &name in pass.reads() {
                readers.entry(name).or_default().insert(queue);
            }

            if pass.uses_ray_tracing() && schedule.first_ray_tracing.is_none() {
                schedule.first_ray_tracing = Some(handle);
            }

            level.passes.push(handle);
            level.queue_passes.entry(queue).or_default().push(handle);
            schedule.queue_order.entry(queue).or_default().push(handle);
            schedule.execution_order.push(index);
        }

        level.multi_queue_reads = readers
            .into_iter()
            .filter(|(_, queues)| queues.len() > 1)
            .map(|(name, _)| name)
            .collect();
    }

    log::debug!(
        "Built {} dependency levels over {} queues",
        level_count,
        queue_count
    );

    schedule.levels = levels;
    schedule
}
