use std::time::Duration;

use crate::memory::MemoryLocation;
use crate::queue::{QueueAssignment, QueueRole};
use crate::swapchain::{ChainConfig, SurfaceSupport};
use crate::FerriteResult;

/// The backend seam. Every GPU object the engine touches is created through this trait
/// and released by dropping the returned value.
pub trait Device: Clone + Send + Sync + 'static {
    type Buffer: Buffer;
    type Texture: Send + Sync + 'static;
    type DepthBuffer: Send + Sync + 'static;
    type Swapchain: Swapchain;
    type RenderPass: Send + Sync + 'static;
    type DescriptorPool: Send + Sync + 'static;
    type DescriptorSet: Send + Sync + 'static;
    type Pipeline: Send + Sync + 'static;
    type Framebuffer: Send + 'static;
    type CommandPool: CommandPool<CommandBuffer = Self::CommandBuffer>;
    type CommandBuffer: CommandBuffer<Device = Self>;
    type Fence: Send + Sync + 'static;
    type Semaphore: Send + Sync + 'static;

    fn queues(&self) -> QueueAssignment;
    fn limits(&self) -> DeviceLimits;

    /// Wait for every queue to drain.
    fn wait_idle(&self) -> FerriteResult<()>;

    fn surface_support(&self) -> FerriteResult<SurfaceSupport>;
    /// `old` is passed to the presentation engine as a reuse hint; the caller keeps
    /// ownership and drops it once the new chain exists.
    fn create_swapchain(&self, config: &ChainConfig, old: Option<&Self::Swapchain>) -> FerriteResult<Self::Swapchain>;
    fn acquire_next_image(
        &self,
        swapchain: &Self::Swapchain,
        signal: &Self::Semaphore,
        timeout: Duration,
    ) -> FerriteResult<AcquireOutcome>;
    fn present(&self, swapchain: &Self::Swapchain, image_index: u32, wait: &Self::Semaphore) -> FerriteResult<PresentOutcome>;

    fn create_depth_buffer(&self, extent: Extent2D, format: TextureFormat) -> FerriteResult<Self::DepthBuffer>;
    fn create_render_pass(&self, color_format: TextureFormat, depth_format: TextureFormat) -> FerriteResult<Self::RenderPass>;
    fn create_framebuffer(
        &self,
        render_pass: &Self::RenderPass,
        swapchain: &Self::Swapchain,
        image_index: u32,
        depth: &Self::DepthBuffer,
    ) -> FerriteResult<Self::Framebuffer>;

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> FerriteResult<Self::Buffer>;
    /// Creates image, memory, view and sampler. The image starts in the undefined layout.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> FerriteResult<Self::Texture>;

    /// Creates the descriptor set layout (sampled image, dynamic uniform buffer and
    /// sampler at the bindings in `pipeline`) together with a pool holding `max_sets`
    /// sets of it.
    fn create_descriptor_pool(&self, max_sets: u32) -> FerriteResult<Self::DescriptorPool>;
    fn allocate_descriptor_set(
        &self,
        pool: &Self::DescriptorPool,
        texture: &Self::Texture,
        uniform: &Self::Buffer,
        uniform_range: u64,
    ) -> FerriteResult<Self::DescriptorSet>;
    fn create_pipeline(&self, descriptor: &PipelineDescriptor<'_, Self>) -> FerriteResult<Self::Pipeline>;

    fn create_command_pool(&self, role: QueueRole) -> FerriteResult<Self::CommandPool>;
    fn create_fence(&self, signaled: bool) -> FerriteResult<Self::Fence>;
    /// Returns `Ok(false)` when the timeout elapsed before the fence signaled.
    fn wait_for_fence(&self, fence: &Self::Fence, timeout: Duration) -> FerriteResult<bool>;
    fn reset_fence(&self, fence: &Self::Fence) -> FerriteResult<()>;
    fn create_semaphore(&self) -> FerriteResult<Self::Semaphore>;

    fn submit(&self, role: QueueRole, command_buffer: &Self::CommandBuffer, info: SubmitInfo<'_, Self>) -> FerriteResult<()>;
}

pub trait Buffer: Send + Sync + 'static {
    fn size(&self) -> u64;
    /// Host-visible buffers only.
    fn write_data(&self, offset: u64, data: &[u8]) -> FerriteResult<()>;
    /// Host-visible buffers only.
    fn read_data(&self, offset: u64, data: &mut [u8]) -> FerriteResult<()>;
    /// Make host writes in `[offset, offset + size)` visible to the device. Both bounds
    /// must already be multiples of the non-coherent atom size; a range running past the
    /// end of the allocation is clamped to it.
    fn flush(&self, offset: u64, size: u64) -> FerriteResult<()>;
}

pub trait Swapchain: Send + Sync + 'static {
    fn extent(&self) -> Extent2D;
    fn format(&self) -> TextureFormat;
    fn image_count(&self) -> u32;
}

pub trait CommandPool: Send + 'static {
    type CommandBuffer;
    fn allocate_command_buffer(&self) -> FerriteResult<Self::CommandBuffer>;
}

pub trait CommandBuffer: Send + 'static {
    type Device: Device;

    /// Begins one-shot recording; any previous contents are discarded.
    fn begin(&mut self) -> FerriteResult<()>;
    fn end(&mut self) -> FerriteResult<()>;

    fn copy_buffer(
        &mut self,
        source: &<Self::Device as Device>::Buffer,
        destination: &<Self::Device as Device>::Buffer,
        source_offset: u64,
        destination_offset: u64,
        size: u64,
    );
    fn copy_buffer_to_texture(
        &mut self,
        source: &<Self::Device as Device>::Buffer,
        destination: &<Self::Device as Device>::Texture,
        extent: Extent2D,
    );
    /// Makes transfer writes to `buffer` visible to vertex input, optionally as one half
    /// of a queue-family ownership transfer.
    fn buffer_barrier(&mut self, buffer: &<Self::Device as Device>::Buffer, ownership: Option<QueueOwnership>);
    fn texture_barrier(
        &mut self,
        texture: &<Self::Device as Device>::Texture,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        ownership: Option<QueueOwnership>,
    );
    /// Fails when `image_index` does not name an image of `swapchain`.
    fn swapchain_barrier(
        &mut self,
        swapchain: &<Self::Device as Device>::Swapchain,
        image_index: u32,
        barrier: PresentBarrier,
    ) -> FerriteResult<()>;

    fn begin_render_pass(
        &mut self,
        render_pass: &<Self::Device as Device>::RenderPass,
        framebuffer: &<Self::Device as Device>::Framebuffer,
        extent: Extent2D,
        clear: ClearValues,
    );
    fn end_render_pass(&mut self);
    fn bind_pipeline(&mut self, pipeline: &<Self::Device as Device>::Pipeline);
    /// Sets a full-extent viewport and scissor.
    fn set_viewport(&mut self, extent: Extent2D);
    fn bind_vertex_buffer(&mut self, buffer: &<Self::Device as Device>::Buffer);
    fn bind_descriptor_set(
        &mut self,
        pipeline: &<Self::Device as Device>::Pipeline,
        set: &<Self::Device as Device>::DescriptorSet,
        dynamic_offset: u32,
    );
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
}

/// Semaphores and fence attached to one queue submission.
pub struct SubmitInfo<'a, D: Device> {
    pub wait: Option<(&'a D::Semaphore, PipelineStage)>,
    pub signal: Option<&'a D::Semaphore>,
    pub fence: Option<&'a D::Fence>,
}

impl<D: Device> Default for SubmitInfo<'_, D> {
    fn default() -> Self {
        Self { wait: None, signal: None, fence: None }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PipelineStage {
    ColorAttachmentOutput,
    Transfer,
    VertexInput,
    FragmentShader,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DeviceLimits {
    pub min_uniform_buffer_offset_alignment: u64,
    pub non_coherent_atom_size: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero-area surface.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TextureFormat {
    Undefined,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Depth32Float,
    /// A format the engine has no name for, carried as the backend's raw value.
    Other(i32),
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Depth32Float => Some(4),
            TextureFormat::Undefined | TextureFormat::Other(_) => None,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ColorSpace {
    SrgbNonlinear,
    Other(i32),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BufferUsage(pub u32);

impl BufferUsage {
    pub const VERTEX: Self = Self(1 << 0);
    pub const INDEX: Self = Self(1 << 1);
    pub const UNIFORM: Self = Self(1 << 2);
    pub const STORAGE: Self = Self(1 << 3);
    pub const COPY_SRC: Self = Self(1 << 4);
    pub const COPY_DST: Self = Self(1 << 5);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Clone, Debug)]
pub struct BufferDescriptor {
    pub label: &'static str,
    pub size: u64,
    pub usage: BufferUsage,
    pub location: MemoryLocation,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddressMode {
    Repeat,
    MirrorRepeat,
    ClampToEdge,
}

#[derive(Clone, Debug)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub filter: FilterMode,
    pub address_mode: AddressMode,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ImageLayout {
    Undefined,
    TransferDst,
    ShaderReadOnly,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct QueueTransfer {
    pub source_family: u32,
    pub destination_family: u32,
}

/// One half of a queue-family ownership transfer. The release is recorded on the
/// source queue, the matching acquire on the destination queue.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum QueueOwnership {
    Release(QueueTransfer),
    Acquire(QueueTransfer),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PresentBarrier {
    /// Acquired image → color attachment.
    ToColorAttachment,
    /// Color attachment → presentation.
    ToPresent,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexLayout {
    pub array_stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

pub struct PipelineDescriptor<'a, D: Device> {
    pub render_pass: &'a D::RenderPass,
    pub descriptor_pool: &'a D::DescriptorPool,
    pub vertex_shader: &'a [u32],
    pub fragment_shader: &'a [u32],
    pub vertex_layout: &'a VertexLayout,
}
