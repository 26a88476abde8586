//! Compiler configuration.

/// Default placement alignment for aliased resources (64 KiB).
pub const DEFAULT_PLACEMENT_ALIGNMENT: u64 = 64 * 1024;

/// Resource heap capabilities of the target hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeapTier {
    /// Render targets, other textures and buffers need separate heaps.
    #[default]
    Tier1,
    /// Any resource kind may share a heap.
    Tier2,
}

/// Configuration for [`RenderGraphBuilder`](crate::RenderGraphBuilder).
///
/// # Example
///
/// ```
/// use render_graph_compiler::{CompilerConfig, HeapTier};
///
/// let config = CompilerConfig::new()
///     .with_placement_alignment(4096)
///     .with_heap_tier(HeapTier::Tier2);
/// assert_eq!(config.placement_alignment, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Alignment applied to aliased sizes and offsets, in bytes.
    pub placement_alignment: u64,
    /// Maximum size of a single heap. `None` means unbounded.
    pub max_heap_size: Option<u64>,
    /// Which aliasing groups may share a heap.
    pub heap_tier: HeapTier,
    /// Prune waits that are already implied by other waits.
    ///
    /// When disabled every pass waits on the closest producer of each other
    /// queue it depends on.
    pub cull_redundant_syncs: bool,
}

impl CompilerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the placement alignment. Zero is treated as one.
    pub fn with_placement_alignment(mut self, alignment: u64) -> Self {
        self.placement_alignment = alignment.max(1);
        self
    }

    /// Limit the size of every heap.
    pub fn with_max_heap_size(mut self, size: u64) -> Self {
        self.max_heap_size = Some(size);
        self
    }

    /// Set the heap tier.
    pub fn with_heap_tier(mut self, tier: HeapTier) -> Self {
        self.heap_tier = tier;
        self
    }

    /// Enable or disable redundant wait culling.
    pub fn with_sync_culling(mut self, enabled: bool) -> Self {
        self.cull_redundant_syncs = enabled;
        self
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            placement_alignment: DEFAULT_PLACEMENT_ALIGNMENT,
            max_heap_size: None,
            heap_tier: HeapTier::Tier1,
            cull_redundant_syncs: true,
        }
    }
}
