use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::device::{
    AcquireOutcome, ClearValues, CommandBuffer, CommandPool, Device, PipelineStage, PresentBarrier, PresentOutcome,
    SubmitInfo,
};
use crate::pipeline::PipelineSet;
use crate::queue::QueueRole;
use crate::registry::ResourceRegistry;
use crate::swapchain::{ChainSignals, PresentationChain};
use crate::uniform::UniformArena;
use crate::{FerriteError, FerriteResult};

pub const RENDER_THREAD_NAME: &str = "ferrite-render";

/// Upper bound on frame slots, and the number of transform regions in the uniform arena.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 4;

/// Back-off while the surface has zero area.
const DEFERRED_FRAME_DELAY: Duration = Duration::from_millis(16);

/// Per swap-chain image synchronization and recording state.
pub struct FrameSlot<D: Device> {
    /// Image index the framebuffer was built for.
    framebuffer: Option<(u32, D::Framebuffer)>,
    command_buffer: D::CommandBuffer,
    command_pool: D::CommandPool,
    in_flight: D::Fence,
    image_acquired: D::Semaphore,
    render_complete: D::Semaphore,
}

impl<D: Device> FrameSlot<D> {
    pub fn new(device: &D) -> FerriteResult<Self> {
        let command_pool = device.create_command_pool(QueueRole::Graphics)?;
        let command_buffer = command_pool.allocate_command_buffer()?;
        Ok(Self {
            framebuffer: None,
            command_buffer,
            command_pool,
            in_flight: device.create_fence(true)?,
            image_acquired: device.create_semaphore()?,
            render_complete: device.create_semaphore()?,
        })
    }
}

/// One slot per swap-chain image, capped at `MAX_FRAMES_IN_FLIGHT`.
fn create_slots<D: Device>(device: &D, image_count: u32) -> FerriteResult<Vec<FrameSlot<D>>> {
    let count = image_count.clamp(1, MAX_FRAMES_IN_FLIGHT);
    if count < image_count {
        debug!("{} swap chain images share {} frame slots", image_count, count);
    }
    (0..count).map(|_| FrameSlot::new(device)).collect()
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FrameStatus {
    Presented,
    /// The swap chain was out of date; it has been rebuilt and nothing was drawn.
    Skipped,
    /// The surface has zero area; the rebuild stays pending.
    Deferred,
}

/// Records, submits and presents frames, cycling through one slot per swap-chain image
/// (up to `MAX_FRAMES_IN_FLIGHT`).
pub struct FrameRenderer<D: Device> {
    slots: Vec<FrameSlot<D>>,
    current: usize,
    pipeline: Arc<PipelineSet<D>>,
    resources: Arc<RwLock<ResourceRegistry<D>>>,
    uniforms: Arc<UniformArena<D>>,
    chain: Arc<Mutex<PresentationChain<D>>>,
    signals: Arc<ChainSignals>,
    device: D,
    clear: ClearValues,
    timeout: Duration,
    frames_presented: u64,
}

impl<D: Device> FrameRenderer<D> {
    pub fn new(
        device: &D,
        chain: Arc<Mutex<PresentationChain<D>>>,
        pipeline: Arc<PipelineSet<D>>,
        resources: Arc<RwLock<ResourceRegistry<D>>>,
        uniforms: Arc<UniformArena<D>>,
        signals: Arc<ChainSignals>,
        clear_color: [f32; 4],
        timeout: Duration,
    ) -> FerriteResult<Self> {
        let image_count = chain.lock()?.image_count();
        Ok(Self {
            slots: create_slots(device, image_count)?,
            current: 0,
            pipeline,
            resources,
            uniforms,
            chain,
            signals,
            device: device.clone(),
            clear: ClearValues { color: clear_color, depth: 1.0 },
            timeout,
            frames_presented: 0,
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn render_frame(&mut self) -> FerriteResult<FrameStatus> {
        if self.signals.is_pending() && !self.rebuild()? {
            return Ok(FrameStatus::Deferred);
        }

        let frame = self.current as u32;
        let slot = &mut self.slots[self.current];
        if !self.device.wait_for_fence(&slot.in_flight, self.timeout)? {
            error!("Frame slot {} fence did not signal within {:?}", self.current, self.timeout);
            return Err(FerriteError::RenderTimeout);
        }

        let chain = self.chain.lock()?;
        let outcome = self
            .device
            .acquire_next_image(chain.swapchain(), &slot.image_acquired, self.timeout)?;
        let (image_index, suboptimal) = match outcome {
            AcquireOutcome::Acquired { image_index, suboptimal } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                drop(chain);
                debug!("Swap chain out of date on acquire");
                self.signals.mark_pending();
                self.rebuild()?;
                return Ok(FrameStatus::Skipped);
            }
        };

        let resources = self.resources.read()?;
        let pipeline = &*self.pipeline;

        let framebuffer = match slot.framebuffer.take() {
            Some((index, framebuffer)) if index == image_index => framebuffer,
            _ => self.device.create_framebuffer(
                pipeline.render_pass(),
                chain.swapchain(),
                image_index,
                chain.depth_buffer(),
            )?,
        };
        let framebuffer = &slot.framebuffer.insert((image_index, framebuffer)).1;

        let extent = chain.extent();
        let commands = &mut slot.command_buffer;
        commands.begin()?;
        commands.swapchain_barrier(chain.swapchain(), image_index, PresentBarrier::ToColorAttachment)?;
        commands.begin_render_pass(pipeline.render_pass(), framebuffer, extent, self.clear);
        commands.bind_pipeline(pipeline.pipeline());
        commands.set_viewport(extent);
        for (mesh, vertex_buffer) in resources.draw_list() {
            // The slot fence has signaled, so this frame's region is no longer read.
            self.uniforms.write(frame, mesh.uniform_slot, &mesh.transform)?;
            let uniform_offset = self.uniforms.offset(frame, mesh.uniform_slot)?;
            commands.bind_vertex_buffer(&vertex_buffer.buffer);
            commands.bind_descriptor_set(pipeline.pipeline(), &mesh.descriptor_set, uniform_offset);
            commands.draw(vertex_buffer.vertex_count, 1, 0, 0);
        }
        commands.end_render_pass();
        commands.swapchain_barrier(chain.swapchain(), image_index, PresentBarrier::ToPresent)?;
        commands.end()?;

        // Reset only once a submission is certain to follow, so a failed acquire or
        // recording never leaves the slot fence unsignaled.
        self.device.reset_fence(&slot.in_flight)?;
        self.device.submit(
            QueueRole::Graphics,
            &slot.command_buffer,
            SubmitInfo {
                wait: Some((&slot.image_acquired, PipelineStage::ColorAttachmentOutput)),
                signal: Some(&slot.render_complete),
                fence: Some(&slot.in_flight),
            },
        )?;
        drop(resources);

        let presented = self
            .device
            .present(chain.swapchain(), image_index, &slot.render_complete)?;
        drop(chain);

        self.current = (self.current + 1) % self.slots.len();
        self.frames_presented += 1;

        if suboptimal || presented != PresentOutcome::Presented {
            debug!("Swap chain needs rebuilding after present ({:?})", presented);
            self.signals.mark_pending();
            self.rebuild()?;
        }
        Ok(FrameStatus::Presented)
    }

    /// Rebuilds the presentation chain and recreates every frame slot. Returns
    /// `Ok(false)` when another rebuild is running or the surface has zero area; the
    /// request then stays pending.
    fn rebuild(&mut self) -> FerriteResult<bool> {
        let Some(guard) = self.signals.try_begin_rebuild() else {
            self.signals.mark_pending();
            return Ok(false);
        };
        self.signals.take_pending();
        let requested = self.signals.requested_extent();

        let mut chain = self.chain.lock()?;
        self.device.wait_idle()?;
        self.slots.clear();
        let rebuilt = chain.rebuild(&self.device, requested);
        let image_count = chain.image_count();
        drop(chain);

        self.slots = create_slots(&self.device, image_count)?;
        self.current = 0;

        if rebuilt? {
            guard.complete();
            Ok(true)
        } else {
            self.signals.mark_pending();
            Ok(false)
        }
    }

    /// Waits for every slot's last submission and then for the whole device.
    pub fn drain(&self) -> FerriteResult<()> {
        for (index, slot) in self.slots.iter().enumerate() {
            if !self.device.wait_for_fence(&slot.in_flight, self.timeout)? {
                warn!("Frame slot {} still busy after {:?}", index, self.timeout);
            }
        }
        self.device.wait_idle()
    }

    fn run(&mut self, stop: &AtomicBool) -> FerriteResult<()> {
        info!("Render loop started with {} frame slots", self.slots.len());
        let result = loop {
            if stop.load(Ordering::Acquire) {
                break Ok(());
            }
            match self.render_frame() {
                Ok(FrameStatus::Deferred) => thread::sleep(DEFERRED_FRAME_DELAY),
                Ok(_) => {}
                Err(err) => {
                    error!("Render loop terminated: {}", err);
                    break Err(err);
                }
            }
        };

        let drained = self.drain();
        info!("Render loop stopped after {} frames", self.frames_presented);
        result.and(drained)
    }
}

type RenderThread<D> = JoinHandle<(FrameRenderer<D>, FerriteResult<()>)>;

/// Owns the background render thread. While stopped the renderer lives here and can
/// be driven one frame at a time.
pub struct RenderLoop<D: Device> {
    thread: Option<RenderThread<D>>,
    renderer: Option<FrameRenderer<D>>,
    stop: Arc<AtomicBool>,
}

impl<D: Device> RenderLoop<D> {
    pub fn new(renderer: FrameRenderer<D>) -> Self {
        Self {
            thread: None,
            renderer: Some(renderer),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// Spawns the render thread. Does nothing while it is already running; a thread
    /// that ended on its own is joined first and its error returned.
    pub fn start(&mut self) -> FerriteResult<()> {
        if self.is_running() {
            return Ok(());
        }
        if self.thread.is_some() {
            self.stop()?;
        }

        let mut renderer = self
            .renderer
            .take()
            .ok_or_else(|| FerriteError::RenderLoopFailed("Frame renderer was lost".to_string()))?;
        self.stop.store(false, Ordering::Release);
        let stop = self.stop.clone();

        let thread = thread::Builder::new()
            .name(RENDER_THREAD_NAME.to_string())
            .spawn(move || {
                let result = renderer.run(&stop);
                (renderer, result)
            })
            .map_err(|e| FerriteError::RenderLoopFailed(format!("Failed to spawn render thread: {}", e)))?;
        self.thread = Some(thread);
        Ok(())
    }

    /// Signals the render thread, joins it and takes the renderer back. Returns the
    /// error that ended the loop, if any. Returns immediately when not running.
    pub fn stop(&mut self) -> FerriteResult<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.stop.store(true, Ordering::Release);

        let (renderer, result) = thread
            .join()
            .map_err(|_| FerriteError::RenderLoopFailed("Render thread panicked".to_string()))?;
        self.renderer = Some(renderer);
        result
    }

    /// Renders one frame on the calling thread. Only valid while stopped.
    pub fn render_frame(&mut self) -> FerriteResult<FrameStatus> {
        if self.thread.is_some() {
            return Err(FerriteError::RenderLoopFailed(
                "Cannot render a frame while the render thread is running".to_string(),
            ));
        }
        self.renderer
            .as_mut()
            .ok_or_else(|| FerriteError::RenderLoopFailed("Frame renderer was lost".to_string()))?
            .render_frame()
    }

    /// Waits for outstanding frame work while stopped.
    pub fn drain(&self) -> FerriteResult<()> {
        match &self.renderer {
            Some(renderer) => renderer.drain(),
            None => Ok(()),
        }
    }
}

impl<D: Device> Drop for RenderLoop<D> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!("Render loop ended with an error during teardown: {}", err);
        }
        if let Err(err) = self.drain() {
            error!("Failed to drain frame work during teardown: {}", err);
        }
    }
}
