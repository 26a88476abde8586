//! # Render Graph Compiler
//!
//! Compiles a declarative per-frame render graph into a multi-queue execution
//! plan.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderGraphBuilder`] - Declaration of passes, subresource reads and
//!   writes, resource state requests and transient allocations
//! - [`CompiledGraph`] - Per-queue pass order, minimal cross-queue waits,
//!   optimized resource states and an aliased memory layout
//! - [`CompilerConfig`] - Placement alignment, heap limits and heap tier
//!
//! The compiler does not talk to a GPU. Recording commands and creating
//! fences, barriers and heaps from the plan is left to the execution layer.
//!
//! ## Example
//!
//! ```
//! use render_graph_compiler::{AliasingGroup, QueueIndex, RenderGraphBuilder, ResourceState};
//!
//! let mut builder = RenderGraphBuilder::new();
//! let lighting = builder.add_pass("Lighting", 0, false);
//! let post = builder.add_pass("Postprocess", 1, false);
//! builder.add_write_dependency(lighting, "Color", 0)?;
//! builder.add_read_dependency(post, "Color", 0)?;
//! builder.request_resource_state("Color", post, ResourceState::NON_PIXEL_SHADER_RESOURCE)?;
//! builder.request_allocation("Color", 8 << 20, AliasingGroup::RenderTargetsAndDepthStencils)?;
//!
//! let compiled = builder.compile()?;
//! assert_eq!(compiled.waits(post)[0].queue, QueueIndex(0));
//! # Ok::<(), render_graph_compiler::CompileError>(())
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod graph;

// Re-export main types for convenience
pub use compiler::{
    AliasingBarrier, AliasingGroup, AliasingMetadata, CompiledGraph, DependencyLevel, Lifetime,
    MemoryLayout, PassResourceState, PipelineResourceSchedulingInfo, QueueWait,
    ResourceUsageTimeline, ScheduledPass,
};
pub use config::{CompilerConfig, HeapTier, DEFAULT_PLACEMENT_ALIGNMENT};
pub use error::{CompileError, CompileResult};
pub use graph::{
    AllocationRequest, Pass, PassHandle, QueueIndex, RenderGraphBuilder, ResourceId,
    ResourceState, SubresourceName, Subresources,
};

/// Compiler library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
