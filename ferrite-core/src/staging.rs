use std::time::Duration;

use log::{debug, error, warn};

use crate::device::{
    Buffer, BufferDescriptor, BufferUsage, CommandBuffer, CommandPool, Device, Extent2D, ImageLayout,
    PipelineStage, QueueOwnership, QueueTransfer, SubmitInfo, TextureFormat,
};
use crate::memory::{flush_range, MemoryLocation};
use crate::queue::{QueueAssignment, QueueRole};
use crate::{FerriteError, FerriteResult};

/// Decoded pixels handed to `create_texture`.
#[derive(Clone, Debug)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, format: TextureFormat, pixels: Vec<u8>) -> FerriteResult<Self> {
        let image = Self { width, height, format, pixels };
        image.validate()?;
        Ok(image)
    }

    pub fn rgba8(width: u32, height: u32, pixels: Vec<u8>) -> FerriteResult<Self> {
        Self::new(width, height, TextureFormat::Rgba8UnormSrgb, pixels)
    }

    pub fn extent(&self) -> Extent2D {
        Extent2D::new(self.width, self.height)
    }

    pub fn validate(&self) -> FerriteResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FerriteError::InvalidImageData(format!(
                "Image has zero area ({}x{})",
                self.width, self.height
            )));
        }
        let bytes_per_pixel = self.format.bytes_per_pixel().filter(|_| !self.format.is_depth()).ok_or_else(|| {
            FerriteError::InvalidImageData(format!("{:?} cannot be sampled as a color texture", self.format))
        })?;
        let expected = self.width as u64 * self.height as u64 * bytes_per_pixel as u64;
        if self.pixels.len() as u64 != expected {
            return Err(FerriteError::InvalidImageData(format!(
                "Expected {} bytes for {}x{} {:?}, got {}",
                expected,
                self.width,
                self.height,
                self.format,
                self.pixels.len()
            )));
        }
        Ok(())
    }
}

/// Moves host data into device-local resources through one reusable staging buffer.
///
/// The transfer fence guards the staging buffer: every transfer waits for it before
/// overwriting staging memory, and it is only reset immediately before the submission
/// that signals it again. When the transfer family differs from the graphics
/// family each upload ends with a release barrier on the transfer queue and a matching
/// acquire on the graphics queue, chained through the hand-off semaphore.
pub struct StagingPipeline<D: Device> {
    transfer_commands: D::CommandBuffer,
    graphics_commands: D::CommandBuffer,
    transfer_pool: D::CommandPool,
    graphics_pool: D::CommandPool,
    staging: D::Buffer,
    fence: D::Fence,
    handoff: D::Semaphore,
    device: D,
    queues: QueueAssignment,
    capacity: u64,
    timeout: Duration,
}

impl<D: Device> StagingPipeline<D> {
    pub fn new(device: &D, capacity: u64, timeout: Duration) -> FerriteResult<Self> {
        if capacity == 0 {
            return Err(FerriteError::InvalidConfig("Staging capacity must be at least one byte".into()));
        }

        let staging = device.create_buffer(&BufferDescriptor {
            label: "staging",
            size: capacity,
            usage: BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
            location: MemoryLocation::CpuToGpu,
        })?;

        let transfer_pool = device.create_command_pool(QueueRole::Transfer)?;
        let graphics_pool = device.create_command_pool(QueueRole::Graphics)?;
        let transfer_commands = transfer_pool.allocate_command_buffer()?;
        let graphics_commands = graphics_pool.allocate_command_buffer()?;

        let queues = device.queues();
        debug!(
            "Staging pipeline: {} bytes, transfer family {}, graphics family {}",
            capacity, queues.transfer, queues.graphics
        );

        Ok(Self {
            transfer_commands,
            graphics_commands,
            transfer_pool,
            graphics_pool,
            staging,
            fence: device.create_fence(true)?,
            handoff: device.create_semaphore()?,
            device: device.clone(),
            queues,
            capacity,
            timeout,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Blocks until the last transfer has completed. The fence stays signaled.
    pub fn wait_idle(&self) -> FerriteResult<()> {
        if self.device.wait_for_fence(&self.fence, self.timeout)? {
            Ok(())
        } else {
            error!("Transfer fence did not signal within {:?}", self.timeout);
            Err(FerriteError::TransferTimeout)
        }
    }

    fn ownership(&self) -> Option<QueueTransfer> {
        self.queues.has_split_transfer().then_some(QueueTransfer {
            source_family: self.queues.transfer,
            destination_family: self.queues.graphics,
        })
    }

    /// Waits for the previous transfer, then copies `data` into staging memory.
    fn stage(&mut self, data: &[u8]) -> FerriteResult<()> {
        self.wait_idle()?;
        self.staging.write_data(0, data)?;
        let (start, size) = flush_range(0, data.len() as u64, self.device.limits().non_coherent_atom_size);
        self.staging.flush(start, size)
    }

    /// Resets the transfer fence and runs `submit`, which must signal it. When the
    /// submission fails nothing will ever signal the reset fence, so it is swapped for a
    /// signaled one once the device drains.
    fn fenced_submit(&mut self, submit: impl FnOnce(&Self) -> FerriteResult<()>) -> FerriteResult<()> {
        self.device.reset_fence(&self.fence)?;
        let result = submit(self);
        if let Err(err) = &result {
            warn!("Transfer submission failed ({}), replacing the transfer fence", err);
            self.device.wait_idle()?;
            self.fence = self.device.create_fence(true)?;
            self.handoff = self.device.create_semaphore()?;
        }
        result
    }

    fn submit(&mut self, acquire_stage: PipelineStage) -> FerriteResult<()> {
        self.fenced_submit(|this| this.submit_recorded(acquire_stage))
    }

    /// Submits the recorded transfer commands. With split queues the graphics command
    /// buffer holds the matching acquire and signals the fence once the hand-off
    /// semaphore fires; otherwise the transfer submission signals it directly.
    fn submit_recorded(&self, acquire_stage: PipelineStage) -> FerriteResult<()> {
        if self.ownership().is_none() {
            return self.device.submit(
                QueueRole::Transfer,
                &self.transfer_commands,
                SubmitInfo { fence: Some(&self.fence), ..Default::default() },
            );
        }

        self.device.submit(
            QueueRole::Transfer,
            &self.transfer_commands,
            SubmitInfo { signal: Some(&self.handoff), ..Default::default() },
        )?;
        self.device.submit(
            QueueRole::Graphics,
            &self.graphics_commands,
            SubmitInfo {
                wait: Some((&self.handoff, acquire_stage)),
                fence: Some(&self.fence),
                ..Default::default()
            },
        )
    }

    /// Copies `data` into `destination` starting at byte 0. Data larger than the
    /// staging buffer is sent in capacity-sized chunks; only the final chunk carries
    /// the visibility barrier (and ownership release).
    pub fn upload_buffer(&mut self, destination: &D::Buffer, data: &[u8]) -> FerriteResult<()> {
        if data.len() as u64 > destination.size() {
            return Err(FerriteError::ResourceCreationFailed(format!(
                "Upload of {} bytes exceeds destination size {}",
                data.len(),
                destination.size()
            )));
        }

        let chunk_size = self.capacity as usize;
        let chunk_count = data.len().div_ceil(chunk_size).max(1);
        for (index, chunk) in data.chunks(chunk_size).enumerate() {
            let last = index + 1 == chunk_count;
            let offset = (index * chunk_size) as u64;
            self.stage(chunk)?;

            self.transfer_commands.begin()?;
            self.transfer_commands
                .copy_buffer(&self.staging, destination, 0, offset, chunk.len() as u64);

            if !last {
                self.transfer_commands.end()?;
                self.fenced_submit(|this| {
                    this.device.submit(
                        QueueRole::Transfer,
                        &this.transfer_commands,
                        SubmitInfo { fence: Some(&this.fence), ..Default::default() },
                    )
                })?;
                continue;
            }

            let ownership = self.ownership();
            self.transfer_commands
                .buffer_barrier(destination, ownership.map(QueueOwnership::Release));
            self.transfer_commands.end()?;

            if let Some(transfer) = ownership {
                self.graphics_commands.begin()?;
                self.graphics_commands
                    .buffer_barrier(destination, Some(QueueOwnership::Acquire(transfer)));
                self.graphics_commands.end()?;
            }
            self.submit(PipelineStage::VertexInput)?;
        }

        debug!("Uploaded {} bytes in {} chunk(s)", data.len(), chunk_count);
        Ok(())
    }

    /// Uploads `image` into `texture` and leaves it in the shader-read-only layout.
    pub fn upload_texture(&mut self, texture: &D::Texture, image: &ImageData) -> FerriteResult<()> {
        let requested = image.pixels.len() as u64;
        if requested > self.capacity {
            return Err(FerriteError::StagingOverflow { requested, capacity: self.capacity });
        }

        self.stage(&image.pixels)?;
        let ownership = self.ownership();

        self.transfer_commands.begin()?;
        self.transfer_commands
            .texture_barrier(texture, ImageLayout::Undefined, ImageLayout::TransferDst, None);
        self.transfer_commands
            .copy_buffer_to_texture(&self.staging, texture, image.extent());
        self.transfer_commands.texture_barrier(
            texture,
            ImageLayout::TransferDst,
            ImageLayout::ShaderReadOnly,
            ownership.map(QueueOwnership::Release),
        );
        self.transfer_commands.end()?;

        if let Some(transfer) = ownership {
            self.graphics_commands.begin()?;
            self.graphics_commands.texture_barrier(
                texture,
                ImageLayout::TransferDst,
                ImageLayout::ShaderReadOnly,
                Some(QueueOwnership::Acquire(transfer)),
            );
            self.graphics_commands.end()?;
        }
        self.submit(PipelineStage::FragmentShader)?;

        debug!("Uploaded {}x{} texture ({} bytes)", image.width, image.height, requested);
        Ok(())
    }

    /// Copies the first `size` bytes of a device-local buffer back to the host.
    /// Runs on the graphics queue, which owns every uploaded resource.
    pub fn read_back(&mut self, source: &D::Buffer, size: u64) -> FerriteResult<Vec<u8>> {
        let mut out = vec![0u8; size as usize];
        let chunk_size = self.capacity as usize;

        for (index, chunk) in out.chunks_mut(chunk_size).enumerate() {
            let offset = (index * chunk_size) as u64;
            self.wait_idle()?;

            self.graphics_commands.begin()?;
            self.graphics_commands
                .copy_buffer(source, &self.staging, offset, 0, chunk.len() as u64);
            self.graphics_commands.end()?;
            self.fenced_submit(|this| {
                this.device.submit(
                    QueueRole::Graphics,
                    &this.graphics_commands,
                    SubmitInfo { fence: Some(&this.fence), ..Default::default() },
                )
            })?;

            self.wait_idle()?;
            self.staging.read_data(0, chunk)?;
        }
        Ok(out)
    }
}
