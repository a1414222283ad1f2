use ash::vk;
use ferrite_core::device::{ClearValues, Extent2D, ImageLayout, PresentBarrier, QueueOwnership};
use ferrite_core::{FerriteError, FerriteResult};

use crate::{VulkanBuffer, VulkanDevice, VulkanSwapchain, VulkanTexture};

pub use crate::device::descriptor::{VulkanDescriptorPool, VulkanDescriptorSet};

pub struct VulkanRenderPass {
    pub render_pass: vk::RenderPass,
    pub device: VulkanDevice,
}

impl Drop for VulkanRenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

pub struct VulkanPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub device: VulkanDevice,
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

pub struct VulkanFramebuffer {
    pub framebuffer: vk::Framebuffer,
    pub device: VulkanDevice,
}

impl Drop for VulkanFramebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

pub struct VulkanFence {
    pub fence: vk::Fence,
    pub device: VulkanDevice,
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_fence(self.fence, None);
        }
    }
}

pub struct VulkanSemaphore {
    pub semaphore: vk::Semaphore,
    pub device: VulkanDevice,
}

impl Drop for VulkanSemaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

pub struct VulkanCommandPool {
    pub pool: vk::CommandPool,
    pub device: VulkanDevice,
}

impl Drop for VulkanCommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_command_pool(self.pool, None);
        }
    }
}

impl ferrite_core::device::CommandPool for VulkanCommandPool {
    type CommandBuffer = VulkanCommandBuffer;

    fn allocate_command_buffer(&self) -> FerriteResult<Self::CommandBuffer> {
        let allocate_info = vk::CommandBufferAllocateInfo {
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };

        let command_buffers = unsafe {
            self.device.device.allocate_command_buffers(&allocate_info).map_err(|e| {
                FerriteError::ResourceCreationFailed(format!("Failed to allocate command buffer: {}", e))
            })?
        };

        let buffer = command_buffers
            .into_iter()
            .next()
            .ok_or_else(|| FerriteError::ResourceCreationFailed("Driver returned no command buffer".to_string()))?;

        Ok(VulkanCommandBuffer {
            buffer,
            device: self.device.clone(),
        })
    }
}

/// Freed together with its pool.
pub struct VulkanCommandBuffer {
    pub buffer: vk::CommandBuffer,
    pub device: VulkanDevice,
}

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

fn map_image_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
}

/// Stage and access that last touched, or will next touch, an image in `layout`.
fn layout_scope(layout: ImageLayout) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    match layout {
        ImageLayout::Undefined => (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()),
        ImageLayout::TransferDst => (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
        ImageLayout::ShaderReadOnly => (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ),
    }
}

type Scope = (vk::PipelineStageFlags, vk::AccessFlags);

/// Narrows the barrier scopes for one half of an ownership transfer and returns the
/// queue family pair to record. The release half has no destination scope and the
/// acquire half no source scope.
fn ownership_scopes(src: Scope, dst: Scope, ownership: Option<QueueOwnership>) -> (Scope, Scope, u32, u32) {
    let none = (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty());
    match ownership {
        None => (src, dst, vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED),
        Some(QueueOwnership::Release(t)) => (
            src,
            (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty()),
            t.source_family,
            t.destination_family,
        ),
        Some(QueueOwnership::Acquire(t)) => (none, dst, t.source_family, t.destination_family),
    }
}

impl VulkanCommandBuffer {
    fn image_barrier(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        (src, dst, src_family, dst_family): (Scope, Scope, u32, u32),
    ) {
        let barrier = vk::ImageMemoryBarrier {
            src_access_mask: src.1,
            dst_access_mask: dst.1,
            old_layout,
            new_layout,
            src_queue_family_index: src_family,
            dst_queue_family_index: dst_family,
            image,
            subresource_range: COLOR_RANGE,
            ..Default::default()
        };

        unsafe {
            self.device.device.cmd_pipeline_barrier(
                self.buffer,
                src.0,
                dst.0,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }
}

impl ferrite_core::device::CommandBuffer for VulkanCommandBuffer {
    type Device = VulkanDevice;

    fn begin(&mut self) -> FerriteResult<()> {
        let begin_info = vk::CommandBufferBeginInfo {
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };

        unsafe {
            self.device
                .device
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| FerriteError::BackendError(format!("Failed to reset command buffer: {}", e)))?;
            self.device
                .device
                .begin_command_buffer(self.buffer, &begin_info)
                .map_err(|e| FerriteError::BackendError(format!("Failed to begin command buffer: {}", e)))
        }
    }

    fn end(&mut self) -> FerriteResult<()> {
        unsafe {
            self.device
                .device
                .end_command_buffer(self.buffer)
                .map_err(|e| FerriteError::BackendError(format!("Failed to end command buffer: {}", e)))
        }
    }

    fn copy_buffer(
        &mut self,
        source: &VulkanBuffer,
        destination: &VulkanBuffer,
        source_offset: u64,
        destination_offset: u64,
        size: u64,
    ) {
        let region = vk::BufferCopy {
            src_offset: source_offset,
            dst_offset: destination_offset,
            size,
        };
        unsafe {
            self.device
                .device
                .cmd_copy_buffer(self.buffer, source.buffer, destination.buffer, &[region]);
        }
    }

    fn copy_buffer_to_texture(&mut self, source: &VulkanBuffer, destination: &VulkanTexture, extent: Extent2D) {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D { width: extent.width, height: extent.height, depth: 1 },
        };
        unsafe {
            self.device.device.cmd_copy_buffer_to_image(
                self.buffer,
                source.buffer,
                destination.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    fn buffer_barrier(&mut self, buffer: &VulkanBuffer, ownership: Option<QueueOwnership>) {
        let (src, dst, src_family, dst_family) = ownership_scopes(
            (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
            (vk::PipelineStageFlags::VERTEX_INPUT, vk::AccessFlags::VERTEX_ATTRIBUTE_READ),
            ownership,
        );

        let barrier = vk::BufferMemoryBarrier {
            src_access_mask: src.1,
            dst_access_mask: dst.1,
            src_queue_family_index: src_family,
            dst_queue_family_index: dst_family,
            buffer: buffer.buffer,
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        };

        unsafe {
            self.device.device.cmd_pipeline_barrier(
                self.buffer,
                src.0,
                dst.0,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            );
        }
    }

    fn texture_barrier(
        &mut self,
        texture: &VulkanTexture,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        ownership: Option<QueueOwnership>,
    ) {
        let scopes = ownership_scopes(layout_scope(old_layout), layout_scope(new_layout), ownership);
        self.image_barrier(
            texture.image,
            map_image_layout(old_layout),
            map_image_layout(new_layout),
            scopes,
        );
    }

    fn swapchain_barrier(
        &mut self,
        swapchain: &VulkanSwapchain,
        image_index: u32,
        barrier: PresentBarrier,
    ) -> FerriteResult<()> {
        let image = swapchain_image(&swapchain.images, image_index)?;

        let output = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let (old_layout, new_layout, src, dst) = match barrier {
            // Chained to the acquire semaphore, which is waited on at this stage.
            PresentBarrier::ToColorAttachment => (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                (output, vk::AccessFlags::empty()),
                (output, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
            ),
            PresentBarrier::ToPresent => (
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
                (output, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
                (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty()),
            ),
        };

        // Swap chain images are created CONCURRENT across graphics and present
        // families, so no ownership transfer is recorded here.
        self.image_barrier(
            image,
            old_layout,
            new_layout,
            (src, dst, vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED),
        );
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        render_pass: &VulkanRenderPass,
        framebuffer: &VulkanFramebuffer,
        extent: Extent2D,
        clear: ClearValues,
    ) {
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: clear.color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: clear.depth, stencil: 0 },
            },
        ];

        let render_pass_begin_info = vk::RenderPassBeginInfo {
            render_pass: render_pass.render_pass,
            framebuffer: framebuffer.framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D { width: extent.width, height: extent.height },
            },
            clear_value_count: clear_values.len() as u32,
            p_clear_values: clear_values.as_ptr(),
            ..Default::default()
        };

        unsafe {
            self.device
                .device
                .cmd_begin_render_pass(self.buffer, &render_pass_begin_info, vk::SubpassContents::INLINE);
        }
    }

    fn end_render_pass(&mut self) {
        unsafe {
            self.device.device.cmd_end_render_pass(self.buffer);
        }
    }

    fn bind_pipeline(&mut self, pipeline: &VulkanPipeline) {
        unsafe {
            self.device
                .device
                .cmd_bind_pipeline(self.buffer, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
        }
    }

    fn set_viewport(&mut self, extent: Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width: extent.width, height: extent.height },
        };
        unsafe {
            self.device.device.cmd_set_viewport(self.buffer, 0, &[viewport]);
            self.device.device.cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: &VulkanBuffer) {
        unsafe {
            self.device
                .device
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer.buffer], &[0]);
        }
    }

    fn bind_descriptor_set(&mut self, pipeline: &VulkanPipeline, set: &VulkanDescriptorSet, dynamic_offset: u32) {
        unsafe {
            self.device.device.cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                0,
                &[set.set],
                &[dynamic_offset],
            );
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device
                .device
                .cmd_draw(self.buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
    }
}

/// Looks up a swap chain image, rejecting indices the chain never handed out.
fn swapchain_image(images: &[vk::Image], image_index: u32) -> FerriteResult<vk::Image> {
    images.get(image_index as usize).copied().ok_or_else(|| {
        log::error!("Barrier on swapchain image {} which does not exist", image_index);
        FerriteError::BackendError(format!(
            "Swapchain image index {} out of range ({} images)",
            image_index,
            images.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_core::device::QueueTransfer;

    const TRANSFER: QueueTransfer = QueueTransfer { source_family: 2, destination_family: 0 };

    fn upload_scopes(ownership: Option<QueueOwnership>) -> (Scope, Scope, u32, u32) {
        ownership_scopes(
            layout_scope(ImageLayout::TransferDst),
            layout_scope(ImageLayout::ShaderReadOnly),
            ownership,
        )
    }

    #[test]
    fn same_family_barrier_keeps_both_scopes() {
        let (src, dst, src_family, dst_family) = upload_scopes(None);
        assert_eq!(src, (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE));
        assert_eq!(dst, (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ));
        assert_eq!((src_family, dst_family), (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED));
    }

    #[test]
    fn release_drops_destination_scope() {
        let (src, dst, src_family, dst_family) = upload_scopes(Some(QueueOwnership::Release(TRANSFER)));
        assert_eq!(src.1, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst, (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty()));
        assert_eq!((src_family, dst_family), (2, 0));
    }

    #[test]
    fn acquire_drops_source_scope() {
        let (src, dst, src_family, dst_family) = upload_scopes(Some(QueueOwnership::Acquire(TRANSFER)));
        assert_eq!(src, (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()));
        assert_eq!(dst.1, vk::AccessFlags::SHADER_READ);
        assert_eq!((src_family, dst_family), (2, 0));
    }

    #[test]
    fn upload_layouts_map_to_vulkan_layouts() {
        assert_eq!(map_image_layout(ImageLayout::Undefined), vk::ImageLayout::UNDEFINED);
        assert_eq!(map_image_layout(ImageLayout::TransferDst), vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(map_image_layout(ImageLayout::ShaderReadOnly), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn swapchain_image_index_is_bounds_checked() {
        use vk::Handle;
        let images = [vk::Image::from_raw(1), vk::Image::from_raw(2)];

        assert_eq!(swapchain_image(&images, 1).unwrap(), images[1]);
        assert!(matches!(swapchain_image(&images, 2), Err(FerriteError::BackendError(_))));
        assert!(swapchain_image(&[], 0).is_err());
    }
}
