//! Render graph compilation.
//!
//! This module turns the declarations of a
//! [`RenderGraphBuilder`](crate::RenderGraphBuilder) into an execution plan
//! ([`CompiledGraph`]).
//!
//! Compilation runs these stages in order:
//!
//! 1. **Dependency graph** - a pass depends on every pass writing a
//!    subresource it reads
//! 2. **Topological sort** - order passes respecting dependencies, failing on
//!    cycles
//! 3. **Dependency levels** - group passes by longest path from a root and
//!    assign global and per-queue execution indices
//! 4. **Synchronization culling** - reduce cross-queue waits to a minimal set
//!    that still orders every producer before its consumers
//! 5. **State optimization** - merge runs of read-only state requests
//! 6. **Memory aliasing** - overlap transient resources whose lifetimes are
//!    disjoint
//!
//! Every stage is rebuilt from scratch on each compile. A failing stage aborts
//! the whole compile and no partial plan is produced.

mod aliasing;
mod dependency;
mod levels;
mod sort;
mod states;
mod sync;

use std::collections::BTreeMap;

pub use aliasing::{AliasingBarrier, AliasingGroup, AliasingMetadata, Lifetime, MemoryLayout};
pub use levels::{DependencyLevel, ResourceUsageTimeline};
pub use states::{PassResourceState, PipelineResourceSchedulingInfo};
pub use sync::QueueWait;

use crate::error::CompileResult;
use crate::graph::{
    PassHandle, QueueIndex, RenderGraphBuilder, ResourceId, ResourceRegistry,
};
use dependency::DependencyGraph;

/// Scheduling information of one pass in a compiled graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledPass {
    /// Handle returned by `add_pass`.
    pub handle: PassHandle,
    /// Name the pass was declared with.
    pub name: String,
    /// Queue the pass is submitted to.
    pub queue: QueueIndex,
    /// Position in the global execution order.
    pub global_index: usize,
    /// Position on the pass's own queue.
    pub local_index: usize,
    /// Dependency level of the pass.
    pub level: usize,
    /// Passes writing something this pass reads.
    pub dependencies: Vec<PassHandle>,
    /// Cross-queue waits to perform before the pass starts, ordered by queue.
    pub waits: Vec<QueueWait>,
    /// Another queue waits on this pass, so it must signal on completion.
    pub signal_required: bool,
    /// The pass traces rays and needs acceleration structures built before it.
    pub uses_ray_tracing: bool,
}

/// A compiled render graph ready for execution.
///
/// Holds per-queue pass orders, cross-queue waits, optimized resource states
/// and the memory layout of transient resources. The plan is immutable plain
/// data.
#[derive(Debug, Clone, Default)]
pub struct CompiledGraph {
    /// Indexed by pass handle.
    passes: Vec<ScheduledPass>,
    execution_order: Vec<PassHandle>,
    queue_order: BTreeMap<QueueIndex, Vec<PassHandle>>,
    levels: Vec<DependencyLevel>,
    timelines: BTreeMap<ResourceId, ResourceUsageTimeline>,
    resource_states: BTreeMap<ResourceId, PipelineResourceSchedulingInfo>,
    memory: MemoryLayout,
    first_ray_tracing: Option<PassHandle>,
    resources: ResourceRegistry,
}

impl CompiledGraph {
    /// Get the number of distinct queues the plan uses.
    pub fn queue_count(&self) -> usize {
        self.queue_order.len()
    }

    /// Get the queues the plan uses, ascending.
    pub fn queues(&self) -> impl Iterator<Item = QueueIndex> + '_ {
        self.queue_order.keys().copied()
    }

    /// Get the passes executing on `queue`, in submission order.
    pub fn queue_order(&self, queue: QueueIndex) -> &[PassHandle] {
        self.queue_order
            .get(&queue)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Get all passes in global execution order.
    pub fn execution_order(&self) -> &[PassHandle] {
        &self.execution_order
    }

    /// Get the scheduling information of a pass.
    pub fn pass(&self, handle: PassHandle) -> Option<&ScheduledPass> {
        self.passes.get(handle.index())
    }

    /// Get every scheduled pass in declaration order.
    pub fn passes(&self) -> &[ScheduledPass] {
        &self.passes
    }

    /// Get the waits a pass performs before it starts.
    pub fn waits(&self, handle: PassHandle) -> &[QueueWait] {
        self.pass(handle)
            .map(|pass| pass.waits.as_slice())
            .unwrap_or(&[])
    }

    /// Get the dependency levels, in execution order.
    pub fn levels(&self) -> &[DependencyLevel] {
        &self.levels
    }

    /// Get the usage timeline of a resource.
    pub fn timeline(&self, resource: ResourceId) -> Option<&ResourceUsageTimeline> {
        self.timelines.get(&resource)
    }

    /// Check if a resource is referenced at a given global execution index.
    pub fn is_resource_alive(&self, resource: ResourceId, step: usize) -> bool {
        self.timelines
            .get(&resource)
            .is_some_and(|timeline| timeline.executions().contains(&step))
    }

    /// Get the optimized state of `resource` in `pass`.
    pub fn resource_state(&self, resource: ResourceId, pass: PassHandle) -> Option<&PassResourceState> {
        self.resource_states.get(&resource)?.pass_state(pass)
    }

    /// Get the optimized states of `resource` across the schedule.
    pub fn resource_states(&self, resource: ResourceId) -> Option<&PipelineResourceSchedulingInfo> {
        self.resource_states.get(&resource)
    }

    /// Get the memory layout of transient resources.
    pub fn memory(&self) -> &MemoryLayout {
        &self.memory
    }

    /// Get the first pass in schedule order that uses ray tracing.
    pub fn first_ray_tracing_pass(&self) -> Option<PassHandle> {
        self.first_ray_tracing
    }

    /// Get the id of a resource by name.
    pub fn resource_id(&self, name: &str) -> Option<ResourceId> {
        self.resources.lookup(name)
    }

    /// Get the name of a resource.
    pub fn resource_name(&self, id: ResourceId) -> &str {
        self.resources.name(id)
    }

    /// Get the number of resources referenced by the graph.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Get the number of passes in the compiled graph.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Check if the compiled graph is empty.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

/// Compile the declarations of `builder` into an execution plan.
///
/// # Errors
///
/// Returns [`CompileError::GraphCycle`](crate::CompileError::GraphCycle) if
/// pass dependencies form a cycle, and
/// [`CompileError::AllocationOverflow`](crate::CompileError::AllocationOverflow)
/// if transient memory exceeds the configured heap limit.
pub(crate) fn compile(builder: &RenderGraphBuilder) -> CompileResult<CompiledGraph> {
    let config = builder.config();
    let mut graph = DependencyGraph::build(builder.passes());
    let topological_order = sort::topological_sort(&graph)?;
    let schedule = levels::build_levels(&mut graph, &topological_order);
    sync::cull_redundant_synchronizations(
        &mut graph,
        &schedule.execution_order,
        config.cull_redundant_syncs,
    );

    let mut resource_states = BTreeMap::new();
    for (&resource, requests) in builder.state_requests() {
        let mut ordered = requests.clone();
        ordered.sort_by_key(|(pass, _)| graph.node(pass.index()).global_index);
        resource_states.insert(
            resource,
            PipelineResourceSchedulingInfo::new(resource, &ordered),
        );
    }

    let memory = aliasing::alias_memory(
        builder.allocations(),
        &schedule.timelines,
        schedule.levels.len(),
        config,
        builder.registry(),
    )?;

    let passes: Vec<ScheduledPass> = (0..graph.len())
        .map(|index| {
            let pass = graph.pass(index);
            let node = graph.node(index);
            if node.touched.is_empty() {
                log::warn!("Pass '{}' declares no resource dependencies", pass.name());
            }
            ScheduledPass {
                handle: DependencyGraph::handle(index),
                name: pass.name().to_string(),
                queue: node.queue,
                global_index: node.global_index,
                local_index: node.local_index,
                level: node.level,
                dependencies: node
                    .dependencies
                    .iter()
                    .map(|&producer| DependencyGraph::handle(producer))
                    .collect(),
                waits: sync::queue_waits(&graph, index),
                signal_required: node.signal_required,
                uses_ray_tracing: pass.uses_ray_tracing(),
            }
        })
        .collect();

    let wait_count: usize = passes.iter().map(|pass| pass.waits.len()).sum();
    log::info!(
        "Compiled render graph: {} passes, {} levels, {} queues, {} cross-queue waits, {} bytes of transient memory",
        passes.len(),
        schedule.levels.len(),
        schedule.queue_order.len(),
        wait_count,
        memory.total_size()
    );

    Ok(CompiledGraph {
        passes,
        execution_order: schedule
            .execution_order
            .iter()
            .map(|&index| DependencyGraph::handle(index))
            .collect(),
        queue_order: schedule.queue_order,
        levels: schedule.levels,
        timelines: schedule.timelines,
        resource_states,
        memory,
        first_ray_tracing: schedule.first_ray_tracing,
        resources: builder.registry().clone(),
    })
}
