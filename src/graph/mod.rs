//! Render graph declaration.
//!
//! A [`RenderGraphBuilder`] is the build context for one frame's graph. Passes
//! are added first, then each pass declares the subresources it reads and
//! writes, the GPU state it wants each resource in, and the size of the
//! transient resources it needs memory for. [`RenderGraphBuilder::compile`]
//! turns the declarations into a [`CompiledGraph`](crate::CompiledGraph).
//!
//! The builder owns everything a build needs, including the registry of
//! subresource writers, so independent builders never interfere with each
//! other. Between frames the builder is reset wholesale with
//! [`RenderGraphBuilder::clear`].
//!
//! # Example
//!
//! ```
//! use render_graph_compiler::{QueueIndex, RenderGraphBuilder, Subresources};
//!
//! let mut builder = RenderGraphBuilder::new();
//! let shadow = builder.add_pass("Shadow", 0, false);
//! let lighting = builder.add_pass("Lighting", 0, false);
//! builder.add_write_dependency(shadow, "ShadowMap", Subresources::whole())?;
//! builder.add_read_dependency(lighting, "ShadowMap", Subresources::whole())?;
//!
//! let compiled = builder.compile()?;
//! assert_eq!(compiled.queue_order(QueueIndex(0)), &[shadow, lighting]);
//! # Ok::<(), render_graph_compiler::CompileError>(())
//! ```

mod pass;
mod resource;
mod state;

use std::collections::{BTreeMap, HashMap};

pub use pass::{Pass, QueueIndex};
pub use resource::{ResourceId, SubresourceName, Subresources};
pub use state::ResourceState;

pub(crate) use resource::ResourceRegistry;

use crate::compiler::{self, AliasingGroup, CompiledGraph};
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};

/// Handle to a pass in the render graph.
///
/// `PassHandle` is `Copy` and cheap to pass around. It is only valid within
/// the `RenderGraphBuilder` that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PassHandle(u32);

impl PassHandle {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw index of the pass.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A byte-size request for a transient resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRequest {
    /// Required size in bytes.
    pub size: u64,
    /// Placement class of the resource.
    pub group: AliasingGroup,
}

/// Build context for one render graph.
#[derive(Debug, Default)]
pub struct RenderGraphBuilder {
    config: CompilerConfig,
    passes: Vec<Pass>,
    resources: ResourceRegistry,
    /// Writer of every subresource declared so far.
    writers: HashMap<SubresourceName, PassHandle>,
    /// Requested state per resource, per pass, in declaration order.
    state_requests: BTreeMap<ResourceId, Vec<(PassHandle, ResourceState)>>,
    allocations: BTreeMap<ResourceId, AllocationRequest>,
}

impl RenderGraphBuilder {
    /// Create an empty builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty builder with the given configuration.
    pub fn with_config(config: CompilerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Get the compiler configuration.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Add a pass executing on queue index `queue`.
    pub fn add_pass(
        &mut self,
        name: impl Into<String>,
        queue: u32,
        uses_ray_tracing: bool,
    ) -> PassHandle {
        let handle = PassHandle::new(self.passes.len() as u32);
        self.passes
            .push(Pass::new(name.into(), QueueIndex(queue), uses_ray_tracing));
        handle
    }

    /// Declare that `pass` reads `subresources` of `resource`.
    pub fn add_read_dependency(
        &mut self,
        pass: PassHandle,
        resource: &str,
        subresources: impl Into<Subresources>,
    ) -> CompileResult<()> {
        self.check_pass(pass)?;
        let subresources = subresources.into();
        if subresources.is_empty() {
            log::warn!(
                "Pass '{}' declares an empty read of '{}'",
                self.passes[pass.index()].name(),
                resource
            );
        }

        let id = self.resources.intern(resource);
        let target = &mut self.passes[pass.index()];
        for index in subresources.indices() {
            target.add_read(SubresourceName::new(id, index));
        }
        Ok(())
    }

    /// Declare that `pass` writes `subresources` of `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::DuplicateWrite`] if another pass already writes
    /// one of the subresources. Nothing is recorded in that case.
    pub fn add_write_dependency(
        &mut self,
        pass: PassHandle,
        resource: &str,
        subresources: impl Into<Subresources>,
    ) -> CompileResult<()> {
        self.check_pass(pass)?;
        let subresources = subresources.into();
        if subresources.is_empty() {
            log::warn!(
                "Pass '{}' declares an empty write of '{}'",
                self.passes[pass.index()].name(),
                resource
            );
        }

        let id = self.resources.intern(resource);
        let names: Vec<SubresourceName> = subresources
            .indices()
            .map(|index| SubresourceName::new(id, index))
            .collect();

        for name in &names {
            match self.writers.get(name) {
                Some(&writer) if writer != pass => {
                    return Err(CompileError::DuplicateWrite {
                        resource: resource.to_string(),
                        subresource: name.subresource(),
                        first_writer: self.passes[writer.index()].name().to_string(),
                        second_writer: self.passes[pass.index()].name().to_string(),
                    });
                }
                _ => {}
            }
        }

        for name in names {
            self.writers.insert(name, pass);
            self.passes[pass.index()].add_write(name);
        }
        Ok(())
    }

    /// Request that `resource` is in `state` while `pass` executes.
    ///
    /// Repeated requests for the same (resource, pass) pair are combined.
    ///
    /// # Errors
    ///
    /// The resource must have been declared by some pass, and `pass` itself
    /// must read or write it.
    pub fn request_resource_state(
        &mut self,
        resource: &str,
        pass: PassHandle,
        state: ResourceState,
    ) -> CompileResult<()> {
        self.check_pass(pass)?;
        let id = self.lookup_resource(resource)?;
        let target = &self.passes[pass.index()];
        if !target.touches(id) {
            return Err(CompileError::UndeclaredResourceUsage {
                pass: target.name().to_string(),
                resource: resource.to_string(),
            });
        }

        let requests = self.state_requests.entry(id).or_default();
        match requests.iter_mut().find(|(handle, _)| *handle == pass) {
            Some((_, existing)) => *existing |= state,
            None => requests.push((pass, state)),
        }
        Ok(())
    }

    /// Request backing memory of `size` bytes for `resource`.
    ///
    /// A later request for the same resource replaces the earlier one.
    pub fn request_allocation(
        &mut self,
        resource: &str,
        size: u64,
        group: AliasingGroup,
    ) -> CompileResult<()> {
        let id = self.lookup_resource(resource)?;
        if let Some(previous) = self
            .allocations
            .insert(id, AllocationRequest { size, group })
        {
            log::debug!(
                "Allocation request for '{}' replaced ({} -> {} bytes)",
                resource,
                previous.size,
                size
            );
        }
        Ok(())
    }

    /// Compile the declared graph into an execution plan.
    pub fn compile(&self) -> CompileResult<CompiledGraph> {
        compiler::compile(self)
    }

    /// Remove all passes, resources and requests. The configuration is kept.
    pub fn clear(&mut self) {
        self.passes.clear();
        self.resources.clear();
        self.writers.clear();
        self.state_requests.clear();
        self.allocations.clear();
    }

    /// Get all passes in declaration order.
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    /// Get a pass by handle.
    pub fn pass(&self, handle: PassHandle) -> Option<&Pass> {
        self.passes.get(handle.index())
    }

    /// Get the number of passes.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Get the id of a declared resource.
    pub fn resource_id(&self, name: &str) -> Option<ResourceId> {
        self.resources.lookup(name)
    }

    /// Get the name of a declared resource.
    pub fn resource_name(&self, id: ResourceId) -> &str {
        self.resources.name(id)
    }

    /// Get the pass that writes `name`, if any.
    pub fn writer(&self, name: SubresourceName) -> Option<PassHandle> {
        self.writers.get(&name).copied()
    }

    pub(crate) fn registry(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub(crate) fn state_requests(&self) -> &BTreeMap<ResourceId, Vec<(PassHandle, ResourceState)>> {
        &self.state_requests
    }

    pub(crate) fn allocations(&self) -> &BTreeMap<ResourceId, AllocationRequest> {
        &self.allocations
    }

    fn check_pass(&self, pass: PassHandle) -> CompileResult<()> {
        if pass.index() < self.passes.len() {
            Ok(())
        } else {
            Err(CompileError::UnknownPass { handle: pass })
        }
    }

    fn lookup_resource(&self, name: &str) -> CompileResult<ResourceId> {
        self.resources
            .lookup(name)
            .ok_or_else(|| CompileError::UnknownResource {
                resource: name.to_string(),
            })
    }
}
