//! Pass declarations.

use std::collections::BTreeSet;

use super::resource::{ResourceId, SubresourceName};

/// Index of the hardware queue a pass executes on.
///
/// Queue 0 is the primary (graphics) queue; higher indices are secondary
/// queues such as async compute or copy. Indices need not be contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct QueueIndex(pub u32);

impl QueueIndex {
    /// The primary graphics queue.
    pub const GRAPHICS: Self = Self(0);

    /// Get the raw index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for QueueIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

/// A unit of scheduled GPU work and the subresources it touches.
///
/// Passes are created through
/// [`RenderGraphBuilder::add_pass`](crate::RenderGraphBuilder::add_pass) and
/// filled in by the dependency declarations made against their handle.
#[derive(Debug, Clone)]
pub struct Pass {
    name: String,
    queue: QueueIndex,
    uses_ray_tracing: bool,
    reads: BTreeSet<SubresourceName>,
    writes: BTreeSet<SubresourceName>,
}

impl Pass {
    pub(crate) fn new(name: String, queue: QueueIndex, uses_ray_tracing: bool) -> Self {
        Self {
            name,
            queue,
            uses_ray_tracing,
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
        }
    }

    /// Get the pass name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the queue this pass executes on.
    pub fn queue(&self) -> QueueIndex {
        self.queue
    }

    /// Check if the pass dispatches ray-tracing work.
    pub fn uses_ray_tracing(&self) -> bool {
        self.uses_ray_tracing
    }

    /// Subresources read by this pass.
    pub fn reads(&self) -> &BTreeSet<SubresourceName> {
        &self.reads
    }

    /// Subresources written by this pass.
    pub fn writes(&self) -> &BTreeSet<SubresourceName> {
        &self.writes
    }

    /// Check if the pass reads or writes any subresource of `resource`.
    pub fn touches(&self, resource: ResourceId) -> bool {
        self.reads
            .iter()
            .chain(self.writes.iter())
            .any(|name| name.resource() == resource)
    }

    pub(crate) fn add_read(&mut self, name: SubresourceName) {
        self.reads.insert(name);
    }

    pub(crate) fn add_write(&mut self, name: SubresourceName) {
        self.writes.insert(name);
    }
}
