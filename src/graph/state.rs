//! GPU-visible resource states.

use bitflags::bitflags;

bitflags! {
    /// State a resource must be in while a pass accesses it.
    ///
    /// Several bits may be combined, but only read-only bits may be combined
    /// with each other; a state containing any write bit stands alone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceState: u32 {
        /// Read as vertex or constant buffer.
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        /// Read as index buffer.
        const INDEX_BUFFER = 1 << 1;
        /// Written as color render target.
        const RENDER_TARGET = 1 << 2;
        /// Read and written through unordered access views.
        const UNORDERED_ACCESS = 1 << 3;
        /// Written as depth/stencil attachment.
        const DEPTH_WRITE = 1 << 4;
        /// Depth test without writes.
        const DEPTH_READ = 1 << 5;
        /// Sampled by non-pixel shader stages.
        const NON_PIXEL_SHADER_RESOURCE = 1 << 6;
        /// Sampled by the pixel shader stage.
        const PIXEL_SHADER_RESOURCE = 1 << 7;
        /// Read as indirect arguments.
        const INDIRECT_ARGUMENT = 1 << 8;
        /// Destination of a copy.
        const COPY_DEST = 1 << 9;
        /// Source of a copy.
        const COPY_SOURCE = 1 << 10;
        /// Destination of a multisample resolve.
        const RESOLVE_DEST = 1 << 11;
        /// Source of a multisample resolve.
        const RESOLVE_SOURCE = 1 << 12;
        /// Ray-tracing acceleration structure.
        const RAYTRACING_ACCELERATION_STRUCTURE = 1 << 13;
        /// Variable rate shading image.
        const SHADING_RATE_SOURCE = 1 << 14;
        /// Presented to a swapchain.
        const PRESENT = 1 << 15;

        /// Shader resource for every stage.
        const SHADER_RESOURCE = Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits();

        /// Every read-only bit. Used by [`ResourceState::is_read_only`].
        const READ_ONLY = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::DEPTH_READ.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits()
            | Self::RESOLVE_SOURCE.bits()
            | Self::RAYTRACING_ACCELERATION_STRUCTURE.bits()
            | Self::SHADING_RATE_SOURCE.bits();
    }
}

impl ResourceState {
    /// The state every resource starts a frame in.
    pub const COMMON: Self = Self::empty();

    /// Check whether the state only contains read-only bits.
    ///
    /// `COMMON` is not read-only: it carries no access information at all.
    pub fn is_read_only(self) -> bool {
        !self.is_empty() && Self::READ_ONLY.contains(self)
    }

    /// Check whether the state contains any write bit.
    pub fn is_write(self) -> bool {
        self.intersects(!Self::READ_ONLY)
    }

    /// Check whether accesses in this state need a UAV hazard barrier.
    pub fn needs_uav_barrier(self) -> bool {
        self.contains(Self::UNORDERED_ACCESS)
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::COMMON
    }
}
