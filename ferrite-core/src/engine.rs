use std::sync::{Arc, Mutex, RwLock};

use log::{debug, error, info};

use crate::config::EngineConfig;
use crate::device::{BufferDescriptor, BufferUsage, Device, Extent2D, FilterMode, AddressMode, TextureDescriptor};
use crate::frame::{FrameRenderer, FrameStatus, RenderLoop, MAX_FRAMES_IN_FLIGHT};
use crate::instance::{Instance, InstanceDescriptor, WindowSurface};
use crate::memory::MemoryLocation;
use crate::pipeline::{PipelineSet, Vertex};
use crate::registry::{Handle, Mesh, ResourceRegistry, Texture, VertexBuffer};
use crate::staging::{ImageData, StagingPipeline};
use crate::swapchain::{ChainSignals, PresentationChain};
use crate::uniform::{Transform, UniformArena, IDENTITY, TRANSFORM_SIZE};
use crate::{FerriteError, FerriteResult};

/// The device context and everything created on it.
///
/// Field order is teardown order: the render loop (and its frame slots) first, then
/// the pipeline objects, uniform buffer, meshes, vertex buffers and textures, the
/// staging buffer, the presentation chain, and finally the device and instance.
pub struct Engine<I: Instance> {
    render_loop: RenderLoop<I::Device>,
    pipeline: Arc<PipelineSet<I::Device>>,
    uniforms: Arc<UniformArena<I::Device>>,
    resources: Arc<RwLock<ResourceRegistry<I::Device>>>,
    staging: StagingPipeline<I::Device>,
    chain: Arc<Mutex<PresentationChain<I::Device>>>,
    signals: Arc<ChainSignals>,
    device: I::Device,
    config: EngineConfig,
    instance: I,
}

impl<I: Instance> Engine<I> {
    pub fn initialize(config: EngineConfig, window: &impl WindowSurface) -> FerriteResult<Self> {
        let instance = I::new(
            &InstanceDescriptor {
                app_name: &config.app_name,
                app_version: config.app_version,
                validation: config.validation,
            },
            window,
        )?;
        Self::with_instance(instance, config, window)
    }

    /// Builds the engine on an already created instance. Anything created before a
    /// failing step is released in reverse order as the locals drop.
    pub fn with_instance(instance: I, config: EngineConfig, window: &impl WindowSurface) -> FerriteResult<Self> {
        config.validate()?;
        let surface = instance.create_surface(window)?;
        let device = instance.request_device(surface, config.preferred_device)?;
        let queues = device.queues();
        info!(
            "Queue families: present {}, graphics {}, transfer {}",
            queues.present, queues.graphics, queues.transfer
        );

        let extent = window.inner_extent();
        let chain = PresentationChain::new(&device, extent)?;
        let signals = Arc::new(ChainSignals::new(extent));
        let staging = StagingPipeline::new(&device, config.staging_capacity, config.fence_timeout)?;
        let resources = Arc::new(RwLock::new(ResourceRegistry::new()));
        let uniforms = Arc::new(UniformArena::new(
            &device,
            device.limits(),
            config.max_meshes,
            MAX_FRAMES_IN_FLIGHT,
        )?);
        let pipeline = Arc::new(PipelineSet::new(&device, chain.format(), &config)?);
        let chain = Arc::new(Mutex::new(chain));

        let renderer = FrameRenderer::new(
            &device,
            chain.clone(),
            pipeline.clone(),
            resources.clone(),
            uniforms.clone(),
            signals.clone(),
            config.clear_color,
            config.fence_timeout,
        )?;

        info!("Engine initialized ({} frame slots)", renderer.slot_count());

        Ok(Self {
            render_loop: RenderLoop::new(renderer),
            pipeline,
            uniforms,
            resources,
            staging,
            chain,
            signals,
            device,
            config,
            instance,
        })
    }

    pub fn device(&self) -> &I::Device {
        &self.device
    }

    pub fn instance(&self) -> &I {
        &self.instance
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> FerriteResult<Handle> {
        if vertices.is_empty() {
            return Err(FerriteError::ResourceCreationFailed(
                "A vertex buffer needs at least one vertex".to_string(),
            ));
        }

        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let buffer = self.device.create_buffer(&BufferDescriptor {
            label: "vertex buffer",
            size: bytes.len() as u64,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST | BufferUsage::COPY_SRC,
            location: MemoryLocation::GpuOnly,
        })?;
        self.staging.upload_buffer(&buffer, bytes)?;

        let handle = self.resources.write()?.vertex_buffers.insert(VertexBuffer {
            buffer,
            vertex_count: vertices.len() as u32,
        })?;
        debug!("Created vertex buffer {} ({} vertices)", handle, vertices.len());
        Ok(handle)
    }

    pub fn create_texture(&mut self, image: &ImageData) -> FerriteResult<Handle> {
        image.validate()?;

        let texture = self.device.create_texture(&TextureDescriptor {
            width: image.width,
            height: image.height,
            format: image.format,
            filter: FilterMode::Linear,
            address_mode: AddressMode::Repeat,
        })?;
        self.staging.upload_texture(&texture, image)?;

        let handle = self.resources.write()?.textures.insert(Texture {
            texture,
            extent: image.extent(),
        })?;
        debug!("Created texture {} ({}x{})", handle, image.width, image.height);
        Ok(handle)
    }

    /// Pairs a vertex buffer with a texture. The mesh starts with the identity
    /// transform and is drawn from the next frame on.
    pub fn create_mesh(&mut self, vertex_buffer: Handle, texture: Handle) -> FerriteResult<Handle> {
        // Every upload the mesh depends on has to land before a frame can draw it.
        self.staging.wait_idle()?;

        let mut resources = self.resources.write()?;
        resources.vertex_buffers.get(vertex_buffer)?;
        let texture_entry = resources.textures.get(texture)?;

        let slot = resources.meshes.next_handle().index();
        if slot >= self.pipeline.max_sets() {
            return Err(FerriteError::DescriptorPoolExhausted { capacity: self.pipeline.max_sets() });
        }
        self.uniforms.offset(0, slot)?;

        let descriptor_set = self.device.allocate_descriptor_set(
            self.pipeline.descriptor_pool(),
            &texture_entry.texture,
            self.uniforms.buffer(),
            TRANSFORM_SIZE,
        )?;

        let handle = resources.meshes.insert(Mesh {
            vertex_buffer,
            texture,
            descriptor_set,
            uniform_slot: slot,
            transform: IDENTITY,
        })?;
        debug!(
            "Created mesh {} (vertex buffer {}, texture {}, uniform slot {})",
            handle, vertex_buffer, texture, slot
        );
        Ok(handle)
    }

    /// Sets the model transform of `mesh`. Frames already submitted keep the value they
    /// were recorded with; the next recorded frame picks up the new one.
    pub fn update_transform(&self, mesh: Handle, transform: &Transform) -> FerriteResult<()> {
        self.resources.write()?.meshes.get_mut(mesh)?.transform = *transform;
        Ok(())
    }

    pub fn destroy_vertex_buffer(&mut self, handle: Handle) -> FerriteResult<()> {
        let mut resources = self.resources.write()?;
        resources.vertex_buffers.get(handle)?;
        if let Some(mesh) = resources.mesh_using_vertex_buffer(handle) {
            debug!("Vertex buffer {} is still drawn by mesh {}", handle, mesh);
            return Err(FerriteError::ResourceInUse(handle));
        }

        self.device.wait_idle()?;
        drop(resources.vertex_buffers.remove(handle)?);
        debug!("Destroyed vertex buffer {}", handle);
        Ok(())
    }

    pub fn destroy_texture(&mut self, handle: Handle) -> FerriteResult<()> {
        let mut resources = self.resources.write()?;
        resources.textures.get(handle)?;
        if let Some(mesh) = resources.mesh_using_texture(handle) {
            debug!("Texture {} is still sampled by mesh {}", handle, mesh);
            return Err(FerriteError::ResourceInUse(handle));
        }

        self.device.wait_idle()?;
        drop(resources.textures.remove(handle)?);
        debug!("Destroyed texture {}", handle);
        Ok(())
    }

    /// Copies a vertex buffer back from the device.
    pub fn read_vertex_buffer(&mut self, handle: Handle) -> FerriteResult<Vec<Vertex>> {
        let resources = self.resources.read()?;
        let entry = resources.vertex_buffers.get(handle)?;
        let size = entry.vertex_count as u64 * std::mem::size_of::<Vertex>() as u64;
        let bytes = self.staging.read_back(&entry.buffer, size)?;

        Ok(bytes
            .chunks_exact(std::mem::size_of::<Vertex>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    pub fn mesh_count(&self) -> FerriteResult<usize> {
        Ok(self.resources.read()?.meshes.len())
    }

    pub fn start(&mut self) -> FerriteResult<()> {
        self.render_loop.start()
    }

    /// Stops the render thread and waits for the device. Returns the error that ended
    /// the loop, if one did.
    pub fn stop(&mut self) -> FerriteResult<()> {
        self.render_loop.stop()
    }

    pub fn is_running(&self) -> bool {
        self.render_loop.is_running()
    }

    /// Renders a single frame on the calling thread while the render loop is stopped.
    pub fn render_frame(&mut self) -> FerriteResult<FrameStatus> {
        self.render_loop.render_frame()
    }

    /// Records a new drawable size; the chain is rebuilt before the next frame.
    pub fn notify_resized(&self, extent: Extent2D) {
        debug!("Resize requested: {}x{}", extent.width, extent.height);
        self.signals.request_resize(extent);
    }

    pub fn extent(&self) -> FerriteResult<Extent2D> {
        Ok(self.chain.lock()?.extent())
    }

    /// Stops rendering and releases every GPU object.
    pub fn destroy(mut self) -> FerriteResult<()> {
        let stopped = self.render_loop.stop();
        let idle = self.device.wait_idle();
        drop(self);
        info!("Engine destroyed");
        stopped.and(idle)
    }
}

impl<I: Instance> Drop for Engine<I> {
    fn drop(&mut self) {
        if let Err(err) = self.render_loop.stop() {
            error!("Render loop ended with an error: {}", err);
        }
        if let Err(err) = self.staging.wait_idle() {
            error!("Pending transfer did not complete before teardown: {}", err);
        }
        if let Err(err) = self.device.wait_idle() {
            error!("Device did not go idle before teardown: {}", err);
        }
    }
}
