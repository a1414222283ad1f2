//! In-memory backend used by the unit tests. Buffers and textures are byte vectors,
//! submissions execute recorded copies immediately, and every acquire, submit and
//! present is appended to a call log the tests can inspect.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawWindowHandle, WebWindowHandle, WindowHandle,
};

use crate::config::EngineConfig;
use crate::device::*;
use crate::instance::{Instance, InstanceDescriptor, Surface, WindowSurface};
use crate::memory::MemoryLocation;
use crate::queue::{
    assign_queue_families, select_physical_device, PhysicalDeviceInfo, QueueAssignment, QueueCapabilities,
    QueueFamilyInfo, QueueRole,
};
use crate::swapchain::{ChainConfig, PresentMode, SurfaceCapabilities, SurfaceFormat, SurfaceSupport};
use crate::{FerriteError, FerriteResult};

/// Default configuration pointing at freshly written minimal SPIR-V blobs in a
/// directory unique to the calling test.
pub fn test_config() -> EngineConfig {
    static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);
    let dir = std::env::temp_dir().join(format!(
        "ferrite-test-{}-{}",
        std::process::id(),
        NEXT_DIR.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::create_dir_all(&dir).unwrap();

    let blob: Vec<u8> = [crate::shader::SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect();
    let vertex_shader = dir.join("mesh.vert.spv");
    let fragment_shader = dir.join("mesh.frag.spv");
    std::fs::write(&vertex_shader, &blob).unwrap();
    std::fs::write(&fragment_shader, &blob).unwrap();

    EngineConfig { vertex_shader, fragment_shader, ..EngineConfig::default() }
}

#[derive(Clone, Debug)]
pub struct MockSettings {
    pub queues: QueueAssignment,
    pub min_uniform_alignment: u64,
    pub atom_size: u64,
    pub capabilities: SurfaceCapabilities,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
    /// Time between a fenced submission and its fence signaling.
    pub gpu_delay: Duration,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            queues: QueueAssignment { present: 0, graphics: 0, transfer: 0 },
            min_uniform_alignment: 256,
            atom_size: 64,
            capabilities: SurfaceCapabilities {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: Some(Extent2D::new(800, 600)),
                min_image_extent: Extent2D::new(1, 1),
                max_image_extent: Extent2D::new(4096, 4096),
            },
            formats: vec![SurfaceFormat {
                format: TextureFormat::Bgra8UnormSrgb,
                color_space: ColorSpace::SrgbNonlinear,
            }],
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
            gpu_delay: Duration::ZERO,
        }
    }
}

impl MockSettings {
    pub fn split_transfer() -> Self {
        Self {
            queues: QueueAssignment { present: 0, graphics: 0, transfer: 1 },
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MockCommand {
    CopyBuffer { size: u64 },
    CopyBufferToTexture { extent: Extent2D },
    BufferBarrier(Option<QueueOwnership>),
    TextureBarrier { old: ImageLayout, new: ImageLayout, ownership: Option<QueueOwnership> },
    SwapchainBarrier { image_index: u32, barrier: PresentBarrier },
    BeginRenderPass { extent: Extent2D, clear: ClearValues },
    EndRenderPass,
    BindPipeline,
    SetViewport(Extent2D),
    BindVertexBuffer,
    BindDescriptorSet { dynamic_offset: u32 },
    Draw { vertex_count: u32 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum MockCall {
    Acquire(AcquireOutcome),
    Submit {
        role: QueueRole,
        commands: Vec<MockCommand>,
        wait: Option<PipelineStage>,
        signals: bool,
        fenced: bool,
    },
    Present { image_index: u32 },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MockStats {
    pub swapchains_created: usize,
    pub swapchains_created_with_old: usize,
    pub live_swapchains: usize,
    pub live_buffers: usize,
    pub live_textures: usize,
    pub framebuffers_created: usize,
    pub wait_idle_calls: usize,
}

struct MockState {
    settings: MockSettings,
    current_extent: Mutex<Option<Extent2D>>,
    acquire_script: Mutex<VecDeque<AcquireOutcome>>,
    present_script: Mutex<VecDeque<PresentOutcome>>,
    next_image: AtomicU32,
    calls: Mutex<Vec<MockCall>>,
    stats: Mutex<MockStats>,
    live_swapchains: Arc<AtomicUsize>,
    live_buffers: Arc<AtomicUsize>,
    live_textures: Arc<AtomicUsize>,
    busy_until: Mutex<Option<Instant>>,
    fail_next_submit: AtomicBool,
}

#[derive(Clone)]
pub struct MockDevice {
    state: Arc<MockState>,
}

impl MockDevice {
    pub fn new(settings: MockSettings) -> Self {
        let current_extent = settings.capabilities.current_extent;
        Self {
            state: Arc::new(MockState {
                settings,
                current_extent: Mutex::new(current_extent),
                acquire_script: Mutex::new(VecDeque::new()),
                present_script: Mutex::new(VecDeque::new()),
                next_image: AtomicU32::new(0),
                calls: Mutex::new(Vec::new()),
                stats: Mutex::new(MockStats::default()),
                live_swapchains: Arc::new(AtomicUsize::new(0)),
                live_buffers: Arc::new(AtomicUsize::new(0)),
                live_textures: Arc::new(AtomicUsize::new(0)),
                busy_until: Mutex::new(None),
                fail_next_submit: AtomicBool::new(false),
            }),
        }
    }

    pub fn stats(&self) -> MockStats {
        let mut stats = self.state.stats.lock().unwrap().clone();
        stats.live_swapchains = self.state.live_swapchains.load(Ordering::SeqCst);
        stats.live_buffers = self.state.live_buffers.load(Ordering::SeqCst);
        stats.live_textures = self.state.live_textures.load(Ordering::SeqCst);
        stats
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn submissions(&self, role: QueueRole) -> Vec<Vec<MockCommand>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Submit { role: r, commands, .. } if r == role => Some(commands),
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.calls()
            .iter()
            .map(|call| match call {
                MockCall::Submit { commands, .. } => {
                    commands.iter().filter(|c| matches!(c, MockCommand::Draw { .. })).count()
                }
                _ => 0,
            })
            .sum()
    }

    pub fn present_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, MockCall::Present { .. })).count()
    }

    pub fn script_acquire(&self, outcomes: impl IntoIterator<Item = AcquireOutcome>) {
        self.state.acquire_script.lock().unwrap().extend(outcomes);
    }

    pub fn script_present(&self, outcomes: impl IntoIterator<Item = PresentOutcome>) {
        self.state.present_script.lock().unwrap().extend(outcomes);
    }

    pub fn set_current_extent(&self, extent: Option<Extent2D>) {
        *self.state.current_extent.lock().unwrap() = extent;
    }

    /// Makes the next `submit` call fail without executing anything.
    pub fn fail_next_submit(&self) {
        self.state.fail_next_submit.store(true, Ordering::SeqCst);
    }

    /// True once every fenced submission so far has completed.
    pub fn is_idle(&self) -> bool {
        self.state.busy_until.lock().unwrap().is_none_or(|until| Instant::now() >= until)
    }
}

pub struct MockBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    location: MemoryLocation,
    flushes: Mutex<Vec<(u64, u64)>>,
    live: Arc<AtomicUsize>,
}

impl MockBuffer {
    /// Raw contents regardless of memory location.
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> Vec<(u64, u64)> {
        self.flushes.lock().unwrap().clone()
    }

    fn check_range(&self, offset: u64, len: usize) -> FerriteResult<std::ops::Range<usize>> {
        if self.location != MemoryLocation::CpuToGpu {
            return Err(FerriteError::BackendError("Buffer is not host visible".into()));
        }
        let start = offset as usize;
        let end = start + len;
        if end > self.data.lock().unwrap().len() {
            return Err(FerriteError::BackendError(format!("Range {}..{} out of bounds", start, end)));
        }
        Ok(start..end)
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }

    fn write_data(&self, offset: u64, data: &[u8]) -> FerriteResult<()> {
        let range = self.check_range(offset, data.len())?;
        self.data.lock().unwrap()[range].copy_from_slice(data);
        Ok(())
    }

    fn read_data(&self, offset: u64, data: &mut [u8]) -> FerriteResult<()> {
        let range = self.check_range(offset, data.len())?;
        data.copy_from_slice(&self.data.lock().unwrap()[range]);
        Ok(())
    }

    fn flush(&self, offset: u64, size: u64) -> FerriteResult<()> {
        self.flushes.lock().unwrap().push((offset, size));
        Ok(())
    }
}

pub struct MockTexture {
    data: Arc<Mutex<Vec<u8>>>,
    pub extent: Extent2D,
    live: Arc<AtomicUsize>,
}

impl MockTexture {
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl Drop for MockTexture {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockSwapchain {
    config: ChainConfig,
    live: Arc<AtomicUsize>,
}

impl Drop for MockSwapchain {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Swapchain for MockSwapchain {
    fn extent(&self) -> Extent2D {
        self.config.extent
    }

    fn format(&self) -> TextureFormat {
        self.config.surface_format.format
    }

    fn image_count(&self) -> u32 {
        self.config.image_count
    }
}

pub struct MockDepthBuffer {
    pub extent: Extent2D,
}

pub struct MockRenderPass;

pub struct MockDescriptorPool {
    max_sets: u32,
    allocated: AtomicU32,
}

pub struct MockDescriptorSet {
    pub uniform_range: u64,
}

pub struct MockPipeline;

pub struct MockFramebuffer {
    pub image_index: u32,
}

pub struct MockCommandPool {
    role: QueueRole,
}

impl CommandPool for MockCommandPool {
    type CommandBuffer = MockCommandBuffer;

    fn allocate_command_buffer(&self) -> FerriteResult<MockCommandBuffer> {
        Ok(MockCommandBuffer { role: self.role, commands: Vec::new(), copies: Vec::new() })
    }
}

struct PendingCopy {
    source: Arc<Mutex<Vec<u8>>>,
    destination: Arc<Mutex<Vec<u8>>>,
    source_offset: usize,
    destination_offset: usize,
    size: usize,
}

pub struct MockCommandBuffer {
    role: QueueRole,
    commands: Vec<MockCommand>,
    copies: Vec<PendingCopy>,
}

impl CommandBuffer for MockCommandBuffer {
    type Device = MockDevice;

    fn begin(&mut self) -> FerriteResult<()> {
        self.commands.clear();
        self.copies.clear();
        Ok(())
    }

    fn end(&mut self) -> FerriteResult<()> {
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        source: &MockBuffer,
        destination: &MockBuffer,
        source_offset: u64,
        destination_offset: u64,
        size: u64,
    ) {
        self.commands.push(MockCommand::CopyBuffer { size });
        self.copies.push(PendingCopy {
            source: source.data.clone(),
            destination: destination.data.clone(),
            source_offset: source_offset as usize,
            destination_offset: destination_offset as usize,
            size: size as usize,
        });
    }

    fn copy_buffer_to_texture(&mut self, source: &MockBuffer, destination: &MockTexture, extent: Extent2D) {
        self.commands.push(MockCommand::CopyBufferToTexture { extent });
        let size = destination.data.lock().unwrap().len();
        self.copies.push(PendingCopy {
            source: source.data.clone(),
            destination: destination.data.clone(),
            source_offset: 0,
            destination_offset: 0,
            size,
        });
    }

    fn buffer_barrier(&mut self, _buffer: &MockBuffer, ownership: Option<QueueOwnership>) {
        self.commands.push(MockCommand::BufferBarrier(ownership));
    }

    fn texture_barrier(
        &mut self,
        _texture: &MockTexture,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        ownership: Option<QueueOwnership>,
    ) {
        self.commands.push(MockCommand::TextureBarrier { old: old_layout, new: new_layout, ownership });
    }

    fn swapchain_barrier(&mut self, swapchain: &MockSwapchain, image_index: u32, barrier: PresentBarrier) -> FerriteResult<()> {
        if image_index >= swapchain.image_count() {
            return Err(FerriteError::BackendError(format!("No swap chain image {}", image_index)));
        }
        self.commands.push(MockCommand::SwapchainBarrier { image_index, barrier });
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        _render_pass: &MockRenderPass,
        _framebuffer: &MockFramebuffer,
        extent: Extent2D,
        clear: ClearValues,
    ) {
        self.commands.push(MockCommand::BeginRenderPass { extent, clear });
    }

    fn end_render_pass(&mut self) {
        self.commands.push(MockCommand::EndRenderPass);
    }

    fn bind_pipeline(&mut self, _pipeline: &MockPipeline) {
        self.commands.push(MockCommand::BindPipeline);
    }

    fn set_viewport(&mut self, extent: Extent2D) {
        self.commands.push(MockCommand::SetViewport(extent));
    }

    fn bind_vertex_buffer(&mut self, _buffer: &MockBuffer) {
        self.commands.push(MockCommand::BindVertexBuffer);
    }

    fn bind_descriptor_set(&mut self, _pipeline: &MockPipeline, _set: &MockDescriptorSet, dynamic_offset: u32) {
        self.commands.push(MockCommand::BindDescriptorSet { dynamic_offset });
    }

    fn draw(&mut self, vertex_count: u32, _instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.commands.push(MockCommand::Draw { vertex_count });
    }
}

#[derive(Default)]
struct FenceState {
    signaled: bool,
    signal_at: Option<Instant>,
}

pub struct MockFence(Mutex<FenceState>);

pub struct MockSemaphore;

impl Device for MockDevice {
    type Buffer = MockBuffer;
    type Texture = MockTexture;
    type DepthBuffer = MockDepthBuffer;
    type Swapchain = MockSwapchain;
    type RenderPass = MockRenderPass;
    type DescriptorPool = MockDescriptorPool;
    type DescriptorSet = MockDescriptorSet;
    type Pipeline = MockPipeline;
    type Framebuffer = MockFramebuffer;
    type CommandPool = MockCommandPool;
    type CommandBuffer = MockCommandBuffer;
    type Fence = MockFence;
    type Semaphore = MockSemaphore;

    fn queues(&self) -> QueueAssignment {
        self.state.settings.queues
    }

    fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            min_uniform_buffer_offset_alignment: self.state.settings.min_uniform_alignment,
            non_coherent_atom_size: self.state.settings.atom_size,
        }
    }

    fn wait_idle(&self) -> FerriteResult<()> {
        self.state.stats.lock().unwrap().wait_idle_calls += 1;
        let until = *self.state.busy_until.lock().unwrap();
        if let Some(until) = until {
            let now = Instant::now();
            if until > now {
                std::thread::sleep(until - now);
            }
        }
        Ok(())
    }

    fn surface_support(&self) -> FerriteResult<SurfaceSupport> {
        let mut capabilities = self.state.settings.capabilities;
        capabilities.current_extent = *self.state.current_extent.lock().unwrap();
        Ok(SurfaceSupport {
            capabilities,
            formats: self.state.settings.formats.clone(),
            present_modes: self.state.settings.present_modes.clone(),
        })
    }

    fn create_swapchain(&self, config: &ChainConfig, old: Option<&MockSwapchain>) -> FerriteResult<MockSwapchain> {
        {
            let mut stats = self.state.stats.lock().unwrap();
            stats.swapchains_created += 1;
            if old.is_some() {
                stats.swapchains_created_with_old += 1;
            }
        }
        self.state.next_image.store(0, Ordering::SeqCst);
        self.state.live_swapchains.fetch_add(1, Ordering::SeqCst);
        Ok(MockSwapchain { config: *config, live: self.state.live_swapchains.clone() })
    }

    fn acquire_next_image(
        &self,
        swapchain: &MockSwapchain,
        _signal: &MockSemaphore,
        _timeout: Duration,
    ) -> FerriteResult<AcquireOutcome> {
        let scripted = self.state.acquire_script.lock().unwrap().pop_front();
        let outcome = scripted.unwrap_or_else(|| {
            let image_index = self.state.next_image.fetch_add(1, Ordering::SeqCst) % swapchain.image_count();
            AcquireOutcome::Acquired { image_index, suboptimal: false }
        });
        self.state.calls.lock().unwrap().push(MockCall::Acquire(outcome));
        Ok(outcome)
    }

    fn present(&self, _swapchain: &MockSwapchain, image_index: u32, _wait: &MockSemaphore) -> FerriteResult<PresentOutcome> {
        self.state.calls.lock().unwrap().push(MockCall::Present { image_index });
        let scripted = self.state.present_script.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or(PresentOutcome::Presented))
    }

    fn create_depth_buffer(&self, extent: Extent2D, _format: TextureFormat) -> FerriteResult<MockDepthBuffer> {
        Ok(MockDepthBuffer { extent })
    }

    fn create_render_pass(&self, _color: TextureFormat, _depth: TextureFormat) -> FerriteResult<MockRenderPass> {
        Ok(MockRenderPass)
    }

    fn create_framebuffer(
        &self,
        _render_pass: &MockRenderPass,
        _swapchain: &MockSwapchain,
        image_index: u32,
        _depth: &MockDepthBuffer,
    ) -> FerriteResult<MockFramebuffer> {
        self.state.stats.lock().unwrap().framebuffers_created += 1;
        Ok(MockFramebuffer { image_index })
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> FerriteResult<MockBuffer> {
        self.state.live_buffers.fetch_add(1, Ordering::SeqCst);
        Ok(MockBuffer {
            data: Arc::new(Mutex::new(vec![0; descriptor.size as usize])),
            location: descriptor.location,
            flushes: Mutex::new(Vec::new()),
            live: self.state.live_buffers.clone(),
        })
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> FerriteResult<MockTexture> {
        let bytes_per_pixel = descriptor.format.bytes_per_pixel().unwrap_or(4);
        let size = (descriptor.width * descriptor.height * bytes_per_pixel) as usize;
        self.state.live_textures.fetch_add(1, Ordering::SeqCst);
        Ok(MockTexture {
            data: Arc::new(Mutex::new(vec![0; size])),
            extent: Extent2D::new(descriptor.width, descriptor.height),
            live: self.state.live_textures.clone(),
        })
    }

    fn create_descriptor_pool(&self, max_sets: u32) -> FerriteResult<MockDescriptorPool> {
        Ok(MockDescriptorPool { max_sets, allocated: AtomicU32::new(0) })
    }

    fn allocate_descriptor_set(
        &self,
        pool: &MockDescriptorPool,
        _texture: &MockTexture,
        _uniform: &MockBuffer,
        uniform_range: u64,
    ) -> FerriteResult<MockDescriptorSet> {
        if pool.allocated.fetch_add(1, Ordering::SeqCst) >= pool.max_sets {
            return Err(FerriteError::DescriptorPoolExhausted { capacity: pool.max_sets });
        }
        Ok(MockDescriptorSet { uniform_range })
    }

    fn create_pipeline(&self, _descriptor: &PipelineDescriptor<'_, Self>) -> FerriteResult<MockPipeline> {
        Ok(MockPipeline)
    }

    fn create_command_pool(&self, role: QueueRole) -> FerriteResult<MockCommandPool> {
        Ok(MockCommandPool { role })
    }

    fn create_fence(&self, signaled: bool) -> FerriteResult<MockFence> {
        Ok(MockFence(Mutex::new(FenceState { signaled, signal_at: None })))
    }

    fn wait_for_fence(&self, fence: &MockFence, timeout: Duration) -> FerriteResult<bool> {
        let signal_at = {
            let state = fence.0.lock().unwrap();
            if state.signaled {
                return Ok(true);
            }
            state.signal_at
        };

        let deadline = Instant::now() + timeout;
        match signal_at {
            Some(at) if at <= deadline => {
                let now = Instant::now();
                if at > now {
                    std::thread::sleep(at - now);
                }
                fence.0.lock().unwrap().signaled = true;
                Ok(true)
            }
            _ => {
                std::thread::sleep(timeout);
                Ok(false)
            }
        }
    }

    fn reset_fence(&self, fence: &MockFence) -> FerriteResult<()> {
        *fence.0.lock().unwrap() = FenceState::default();
        Ok(())
    }

    fn create_semaphore(&self) -> FerriteResult<MockSemaphore> {
        Ok(MockSemaphore)
    }

    fn submit(&self, role: QueueRole, command_buffer: &MockCommandBuffer, info: SubmitInfo<'_, Self>) -> FerriteResult<()> {
        if self.state.fail_next_submit.swap(false, Ordering::SeqCst) {
            return Err(FerriteError::SubmissionFailed("Injected submission failure".into()));
        }
        let queues = self.queues();
        if queues.family(command_buffer.role) != queues.family(role) {
            return Err(FerriteError::SubmissionFailed(format!(
                "{:?} command buffer submitted to the {:?} queue",
                command_buffer.role, role
            )));
        }

        for copy in &command_buffer.copies {
            let source = copy.source.lock().unwrap()[copy.source_offset..copy.source_offset + copy.size].to_vec();
            copy.destination.lock().unwrap()[copy.destination_offset..copy.destination_offset + copy.size]
                .copy_from_slice(&source);
        }

        let completes_at = Instant::now() + self.state.settings.gpu_delay;
        if let Some(fence) = info.fence {
            let mut state = fence.0.lock().unwrap();
            state.signaled = false;
            state.signal_at = Some(completes_at);
        }
        {
            let mut busy = self.state.busy_until.lock().unwrap();
            if busy.is_none_or(|until| until < completes_at) {
                *busy = Some(completes_at);
            }
        }

        self.state.calls.lock().unwrap().push(MockCall::Submit {
            role,
            commands: command_buffer.commands.clone(),
            wait: info.wait.map(|(_, stage)| stage),
            signals: info.signal.is_some(),
            fenced: info.fence.is_some(),
        });
        Ok(())
    }
}

pub struct MockSurface;

impl Surface for MockSurface {}

pub struct MockWindow {
    pub extent: Extent2D,
}

impl HasWindowHandle for MockWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        let raw = RawWindowHandle::Web(WebWindowHandle::new(1));
        // SAFETY: web handles carry only an id; nothing is dereferenced.
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl HasDisplayHandle for MockWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        Ok(DisplayHandle::web())
    }
}

impl WindowSurface for MockWindow {
    fn inner_extent(&self) -> Extent2D {
        self.extent
    }
}

pub struct MockInstance {
    settings: MockSettings,
    devices: Vec<PhysicalDeviceInfo>,
}

impl MockInstance {
    pub fn with_devices(settings: MockSettings, devices: Vec<PhysicalDeviceInfo>) -> Self {
        Self { settings, devices }
    }
}

impl Instance for MockInstance {
    type Device = MockDevice;
    type Surface = MockSurface;

    fn new(_descriptor: &InstanceDescriptor, _window: &impl WindowSurface) -> FerriteResult<Self> {
        let device = PhysicalDeviceInfo {
            name: "mock".into(),
            queue_families: vec![QueueFamilyInfo {
                index: 0,
                capabilities: QueueCapabilities::GRAPHICS | QueueCapabilities::COMPUTE | QueueCapabilities::TRANSFER,
                queue_count: 2,
                supports_present: true,
            }],
            supports_swapchain: true,
        };
        Ok(Self::with_devices(MockSettings::default(), vec![device]))
    }

    fn create_surface(&self, _window: &impl WindowSurface) -> FerriteResult<MockSurface> {
        Ok(MockSurface)
    }

    fn request_device(&self, _surface: MockSurface, preferred_device: Option<usize>) -> FerriteResult<MockDevice> {
        let index = select_physical_device(&self.devices, preferred_device)?;
        let queues = assign_queue_families(&self.devices[index].queue_families)?;
        Ok(MockDevice::new(MockSettings { queues, ..self.settings.clone() }))
    }
}
