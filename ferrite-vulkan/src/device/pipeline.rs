use ash::vk;
use ferrite_core::device::{PipelineDescriptor, TextureFormat, VertexFormat};
use ferrite_core::{FerriteError, FerriteResult};

use crate::device::resource::map_texture_format;
use crate::{VulkanDepthBuffer, VulkanDevice, VulkanFramebuffer, VulkanPipeline, VulkanRenderPass, VulkanSwapchain};

impl VulkanDevice {
    fn create_shader_module_impl(&self, code: &[u32]) -> FerriteResult<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo {
            code_size: code.len() * 4,
            p_code: code.as_ptr(),
            ..Default::default()
        };

        unsafe {
            self.device
                .create_shader_module(&create_info, None)
                .map_err(|e| FerriteError::PipelineCreationFailed(format!("Failed to create shader module: {}", e)))
        }
    }

    /// One subpass with a cleared color attachment and a cleared depth attachment. The
    /// color image is moved in and out of the attachment layout by explicit barriers.
    pub fn create_render_pass_impl(
        &self,
        color_format: TextureFormat,
        depth_format: TextureFormat,
    ) -> FerriteResult<VulkanRenderPass> {
        if color_format.is_depth() {
            return Err(FerriteError::PipelineCreationFailed(format!(
                "Cannot use {:?} as color format",
                color_format
            )));
        }
        if !depth_format.is_depth() {
            return Err(FerriteError::PipelineCreationFailed(format!(
                "{:?} is not a depth format",
                depth_format
            )));
        }

        let attachments = [
            vk::AttachmentDescription {
                format: map_texture_format(color_format),
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                ..Default::default()
            },
            vk::AttachmentDescription {
                format: map_texture_format(depth_format),
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ..Default::default()
            },
        ];

        let color_attachment_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_attachment_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_attachment_ref,
            p_depth_stencil_attachment: &depth_attachment_ref,
            ..Default::default()
        };

        // The depth image is shared by every frame in flight.
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: stages,
            dst_stage_mask: stages,
            src_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ..Default::default()
        };

        let create_info = vk::RenderPassCreateInfo {
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };

        let render_pass = unsafe {
            self.device
                .create_render_pass(&create_info, None)
                .map_err(|e| FerriteError::PipelineCreationFailed(format!("Failed to create render pass: {}", e)))?
        };

        Ok(VulkanRenderPass {
            render_pass,
            device: self.clone(),
        })
    }

    pub fn create_pipeline_impl(&self, descriptor: &PipelineDescriptor<'_, Self>) -> FerriteResult<VulkanPipeline> {
        let layout_info = vk::PipelineLayoutCreateInfo {
            set_layout_count: 1,
            p_set_layouts: &descriptor.descriptor_pool.layout,
            ..Default::default()
        };

        let layout = unsafe {
            self.device
                .create_pipeline_layout(&layout_info, None)
                .map_err(|e| FerriteError::PipelineCreationFailed(format!("Failed to create pipeline layout: {}", e)))?
        };
        // Owns the layout from here; a failed pipeline leaves a null pipeline handle.
        let mut wrapped = VulkanPipeline {
            pipeline: vk::Pipeline::null(),
            layout,
            device: self.clone(),
        };

        let vertex_module = self.create_shader_module_impl(descriptor.vertex_shader)?;
        let fragment_module = match self.create_shader_module_impl(descriptor.fragment_shader) {
            Ok(module) => module,
            Err(e) => {
                unsafe { self.device.destroy_shader_module(vertex_module, None) };
                return Err(e);
            }
        };

        let result = self.build_graphics_pipeline(descriptor, layout, vertex_module, fragment_module);

        unsafe {
            self.device.destroy_shader_module(vertex_module, None);
            self.device.destroy_shader_module(fragment_module, None);
        }

        wrapped.pipeline = result?;
        Ok(wrapped)
    }

    fn build_graphics_pipeline(
        &self,
        descriptor: &PipelineDescriptor<'_, Self>,
        layout: vk::PipelineLayout,
        vertex_module: vk::ShaderModule,
        fragment_module: vk::ShaderModule,
    ) -> FerriteResult<vk::Pipeline> {
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo {
                stage: vk::ShaderStageFlags::VERTEX,
                module: vertex_module,
                p_name: c"main".as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: fragment_module,
                p_name: c"main".as_ptr(),
                ..Default::default()
            },
        ];

        let vertex_layout = descriptor.vertex_layout;
        let vertex_binding_descriptions = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: vertex_layout.array_stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let vertex_attribute_descriptions: Vec<vk::VertexInputAttributeDescription> = vertex_layout
            .attributes
            .iter()
            .map(|attr| vk::VertexInputAttributeDescription {
                location: attr.location,
                binding: 0,
                format: match attr.format {
                    VertexFormat::Float32x2 => vk::Format::R32G32_SFLOAT,
                    VertexFormat::Float32x3 => vk::Format::R32G32B32_SFLOAT,
                    VertexFormat::Float32x4 => vk::Format::R32G32B32A32_SFLOAT,
                },
                offset: attr.offset,
            })
            .collect();

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo {
            vertex_binding_description_count: vertex_binding_descriptions.len() as u32,
            p_vertex_binding_descriptions: vertex_binding_descriptions.as_ptr(),
            vertex_attribute_description_count: vertex_attribute_descriptions.len() as u32,
            p_vertex_attribute_descriptions: vertex_attribute_descriptions.as_ptr(),
            ..Default::default()
        };

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            ..Default::default()
        };

        let rasterizer = vk::PipelineRasterizationStateCreateInfo {
            polygon_mode: vk::PolygonMode::FILL,
            line_width: 1.0,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            ..Default::default()
        };

        let multisampling = vk::PipelineMultisampleStateCreateInfo {
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::RGBA,
            blend_enable: vk::FALSE,
            ..Default::default()
        };

        let color_blending = vk::PipelineColorBlendStateCreateInfo {
            attachment_count: 1,
            p_attachments: &color_blend_attachment,
            ..Default::default()
        };

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo {
            dynamic_state_count: dynamic_states.len() as u32,
            p_dynamic_states: dynamic_states.as_ptr(),
            ..Default::default()
        };

        let viewport_state = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        let depth_stencil_info = vk::PipelineDepthStencilStateCreateInfo {
            depth_test_enable: vk::TRUE,
            depth_write_enable: vk::TRUE,
            depth_compare_op: vk::CompareOp::LESS,
            max_depth_bounds: 1.0,
            ..Default::default()
        };

        let create_info = vk::GraphicsPipelineCreateInfo {
            stage_count: shader_stages.len() as u32,
            p_stages: shader_stages.as_ptr(),
            p_vertex_input_state: &vertex_input_info,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &rasterizer,
            p_multisample_state: &multisampling,
            p_color_blend_state: &color_blending,
            p_depth_stencil_state: &depth_stencil_info,
            p_dynamic_state: &dynamic_state_info,
            layout,
            render_pass: descriptor.render_pass.render_pass,
            subpass: 0,
            ..Default::default()
        };

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| {
                    FerriteError::PipelineCreationFailed(format!("Failed to create graphics pipeline: {:?}", e))
                })?
        };

        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| FerriteError::PipelineCreationFailed("Driver returned no pipeline".to_string()))
    }

    pub fn create_framebuffer_impl(
        &self,
        render_pass: &VulkanRenderPass,
        swapchain: &VulkanSwapchain,
        image_index: u32,
        depth: &VulkanDepthBuffer,
    ) -> FerriteResult<VulkanFramebuffer> {
        let color_view = swapchain.image_views.get(image_index as usize).ok_or_else(|| {
            FerriteError::ResourceCreationFailed(format!(
                "Swapchain image {} out of range ({} images)",
                image_index,
                swapchain.image_views.len()
            ))
        })?;
        let attachments = [*color_view, depth.view];

        let create_info = vk::FramebufferCreateInfo {
            render_pass: render_pass.render_pass,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            width: swapchain.extent.width,
            height: swapchain.extent.height,
            layers: 1,
            ..Default::default()
        };

        let framebuffer = unsafe {
            self.device
                .create_framebuffer(&create_info, None)
                .map_err(|e| FerriteError::ResourceCreationFailed(format!("Failed to create framebuffer: {}", e)))?
        };

        Ok(VulkanFramebuffer {
            framebuffer,
            device: self.clone(),
        })
    }
}
