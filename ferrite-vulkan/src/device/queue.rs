use std::time::Duration;

use ash::vk;
use ferrite_core::device::{
    AcquireOutcome, BufferDescriptor, DeviceLimits, Extent2D, PipelineDescriptor, PipelineStage, PresentOutcome,
    SubmitInfo, TextureDescriptor, TextureFormat,
};
use ferrite_core::queue::{QueueAssignment, QueueRole};
use ferrite_core::swapchain::{ChainConfig, SurfaceSupport};
use ferrite_core::{FerriteError, FerriteResult};

use crate::VulkanDevice;

fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

fn map_pipeline_stage(stage: PipelineStage) -> vk::PipelineStageFlags {
    match stage {
        PipelineStage::ColorAttachmentOutput => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        PipelineStage::Transfer => vk::PipelineStageFlags::TRANSFER,
        PipelineStage::VertexInput => vk::PipelineStageFlags::VERTEX_INPUT,
        PipelineStage::FragmentShader => vk::PipelineStageFlags::FRAGMENT_SHADER,
    }
}

impl ferrite_core::Device for VulkanDevice {
    type Buffer = crate::VulkanBuffer;
    type Texture = crate::VulkanTexture;
    type DepthBuffer = crate::VulkanDepthBuffer;
    type Swapchain = crate::VulkanSwapchain;
    type RenderPass = crate::VulkanRenderPass;
    type DescriptorPool = crate::VulkanDescriptorPool;
    type DescriptorSet = crate::VulkanDescriptorSet;
    type Pipeline = crate::VulkanPipeline;
    type Framebuffer = crate::VulkanFramebuffer;
    type CommandPool = crate::VulkanCommandPool;
    type CommandBuffer = crate::VulkanCommandBuffer;
    type Fence = crate::VulkanFence;
    type Semaphore = crate::VulkanSemaphore;

    fn queues(&self) -> QueueAssignment {
        self.assignment
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn wait_idle(&self) -> FerriteResult<()> {
        // Holding every queue keeps other threads from submitting while we drain.
        let _guards = self
            .queues
            .iter()
            .map(|q| q.queue.lock())
            .collect::<Result<Vec<_>, _>>()?;
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| FerriteError::BackendError(format!("Device wait idle failed: {}", e)))
        }
    }

    fn surface_support(&self) -> FerriteResult<SurfaceSupport> {
        self.surface_support_impl()
    }

    fn create_swapchain(&self, config: &ChainConfig, old: Option<&Self::Swapchain>) -> FerriteResult<Self::Swapchain> {
        self.create_swapchain_impl(config, old)
    }

    fn acquire_next_image(
        &self,
        swapchain: &Self::Swapchain,
        signal: &Self::Semaphore,
        timeout: Duration,
    ) -> FerriteResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                swapchain.swapchain,
                timeout_nanos(timeout),
                signal.semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(FerriteError::RenderTimeout),
            Err(e) => Err(FerriteError::PresentationFailed(format!("Failed to acquire swapchain image: {}", e))),
        }
    }

    fn present(&self, swapchain: &Self::Swapchain, image_index: u32, wait: &Self::Semaphore) -> FerriteResult<PresentOutcome> {
        let present_info = vk::PresentInfoKHR {
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait.semaphore,
            swapchain_count: 1,
            p_swapchains: &swapchain.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };

        let queue = self.queue(QueueRole::Present)?;
        let result = unsafe { self.swapchain_loader.queue_present(*queue, &present_info) };

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(FerriteError::PresentationFailed(format!("Failed to present: {}", e))),
        }
    }

    fn create_depth_buffer(&self, extent: Extent2D, format: TextureFormat) -> FerriteResult<Self::DepthBuffer> {
        self.create_depth_buffer_impl(extent, format)
    }

    fn create_render_pass(&self, color_format: TextureFormat, depth_format: TextureFormat) -> FerriteResult<Self::RenderPass> {
        self.create_render_pass_impl(color_format, depth_format)
    }

    fn create_framebuffer(
        &self,
        render_pass: &Self::RenderPass,
        swapchain: &Self::Swapchain,
        image_index: u32,
        depth: &Self::DepthBuffer,
    ) -> FerriteResult<Self::Framebuffer> {
        self.create_framebuffer_impl(render_pass, swapchain, image_index, depth)
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> FerriteResult<Self::Buffer> {
        self.create_buffer_impl(descriptor)
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> FerriteResult<Self::Texture> {
        self.create_texture_impl(descriptor)
    }

    fn create_descriptor_pool(&self, max_sets: u32) -> FerriteResult<Self::DescriptorPool> {
        self.create_descriptor_pool_impl(max_sets)
    }

    fn allocate_descriptor_set(
        &self,
        pool: &Self::DescriptorPool,
        texture: &Self::Texture,
        uniform: &Self::Buffer,
        uniform_range: u64,
    ) -> FerriteResult<Self::DescriptorSet> {
        self.allocate_descriptor_set_impl(pool, texture, uniform, uniform_range)
    }

    fn create_pipeline(&self, descriptor: &PipelineDescriptor<'_, Self>) -> FerriteResult<Self::Pipeline> {
        self.create_pipeline_impl(descriptor)
    }

    fn create_command_pool(&self, role: QueueRole) -> FerriteResult<Self::CommandPool> {
        let create_info = vk::CommandPoolCreateInfo {
            queue_family_index: self.assignment.family(role),
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };

        let pool = unsafe {
            self.device
                .create_command_pool(&create_info, None)
                .map_err(|e| FerriteError::ResourceCreationFailed(format!("Failed to create command pool: {}", e)))?
        };

        Ok(crate::VulkanCommandPool {
            pool,
            device: self.clone(),
        })
    }

    fn create_fence(&self, signaled: bool) -> FerriteResult<Self::Fence> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let create_info = vk::FenceCreateInfo {
            flags,
            ..Default::default()
        };
        let fence = unsafe {
            self.device
                .create_fence(&create_info, None)
                .map_err(|e| FerriteError::ResourceCreationFailed(format!("Failed to create fence: {}", e)))?
        };
        Ok(crate::VulkanFence {
            fence,
            device: self.clone(),
        })
    }

    fn wait_for_fence(&self, fence: &Self::Fence, timeout: Duration) -> FerriteResult<bool> {
        let result = unsafe { self.device.wait_for_fences(&[fence.fence], true, timeout_nanos(timeout)) };
        match result {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(FerriteError::BackendError(format!("Wait for fence failed: {}", e))),
        }
    }

    fn reset_fence(&self, fence: &Self::Fence) -> FerriteResult<()> {
        unsafe {
            self.device
                .reset_fences(&[fence.fence])
                .map_err(|e| FerriteError::BackendError(format!("Reset fence failed: {}", e)))
        }
    }

    fn create_semaphore(&self) -> FerriteResult<Self::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe {
            self.device
                .create_semaphore(&create_info, None)
                .map_err(|e| FerriteError::ResourceCreationFailed(format!("Failed to create semaphore: {}", e)))?
        };
        Ok(crate::VulkanSemaphore {
            semaphore,
            device: self.clone(),
        })
    }

    fn submit(&self, role: QueueRole, command_buffer: &Self::CommandBuffer, info: SubmitInfo<'_, Self>) -> FerriteResult<()> {
        let wait_semaphores: Vec<vk::Semaphore> = info.wait.iter().map(|(s, _)| s.semaphore).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = info.wait.iter().map(|&(_, stage)| map_pipeline_stage(stage)).collect();
        let signal_semaphores: Vec<vk::Semaphore> = info.signal.iter().map(|s| s.semaphore).collect();

        let submit_info = vk::SubmitInfo {
            wait_semaphore_count: wait_semaphores.len() as u32,
            p_wait_semaphores: wait_semaphores.as_ptr(),
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &command_buffer.buffer,
            signal_semaphore_count: signal_semaphores.len() as u32,
            p_signal_semaphores: signal_semaphores.as_ptr(),
            ..Default::default()
        };

        let fence = info.fence.map_or(vk::Fence::null(), |f| f.fence);

        let queue = self.queue(role)?;
        unsafe {
            self.device
                .queue_submit(*queue, &[submit_info], fence)
                .map_err(|e| FerriteError::SubmissionFailed(format!("Failed to submit command buffer: {}", e)))
        }
    }
}
