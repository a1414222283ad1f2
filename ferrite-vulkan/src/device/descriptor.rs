use ash::vk;
use ferrite_core::pipeline::{SAMPLER_BINDING, TEXTURE_BINDING, TRANSFORM_BINDING};
use ferrite_core::{FerriteError, FerriteResult};

use crate::{VulkanBuffer, VulkanDevice, VulkanTexture};

/// The per-mesh descriptor set layout and the pool its sets come from.
pub struct VulkanDescriptorPool {
    pub layout: vk::DescriptorSetLayout,
    pub pool: vk::DescriptorPool,
    pub max_sets: u32,
    pub device: VulkanDevice,
}

impl Drop for VulkanDescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_descriptor_pool(self.pool, None);
            self.device.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Freed together with its pool.
pub struct VulkanDescriptorSet {
    pub set: vk::DescriptorSet,
}

impl VulkanDevice {
    pub fn create_descriptor_pool_impl(&self, max_sets: u32) -> FerriteResult<VulkanDescriptorPool> {
        // Texture and sampler are separate descriptors; naga emits them as distinct
        // image and sampler variables.
        let bindings = [
            vk::DescriptorSetLayoutBinding {
                binding: TEXTURE_BINDING,
                descriptor_type: vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                ..Default::default()
            },
            vk::DescriptorSetLayoutBinding {
                binding: TRANSFORM_BINDING,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::VERTEX,
                ..Default::default()
            },
            vk::DescriptorSetLayoutBinding {
                binding: SAMPLER_BINDING,
                descriptor_type: vk::DescriptorType::SAMPLER,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                ..Default::default()
            },
        ];

        let layout_info = vk::DescriptorSetLayoutCreateInfo {
            binding_count: bindings.len() as u32,
            p_bindings: bindings.as_ptr(),
            ..Default::default()
        };

        let layout = unsafe {
            self.device.create_descriptor_set_layout(&layout_info, None).map_err(|e| {
                FerriteError::ResourceCreationFailed(format!("Failed to create descriptor set layout: {}", e))
            })?
        };

        let pool_sizes = [
            vk::DescriptorPoolSize { ty: vk::DescriptorType::SAMPLED_IMAGE, descriptor_count: max_sets },
            vk::DescriptorPoolSize { ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, descriptor_count: max_sets },
            vk::DescriptorPoolSize { ty: vk::DescriptorType::SAMPLER, descriptor_count: max_sets },
        ];

        let pool_info = vk::DescriptorPoolCreateInfo {
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            max_sets,
            ..Default::default()
        };

        let pool = unsafe {
            self.device.create_descriptor_pool(&pool_info, None).map_err(|e| {
                self.device.destroy_descriptor_set_layout(layout, None);
                FerriteError::ResourceCreationFailed(format!("Failed to create descriptor pool: {}", e))
            })?
        };

        Ok(VulkanDescriptorPool {
            layout,
            pool,
            max_sets,
            device: self.clone(),
        })
    }

    pub fn allocate_descriptor_set_impl(
        &self,
        pool: &VulkanDescriptorPool,
        texture: &VulkanTexture,
        uniform: &VulkanBuffer,
        uniform_range: u64,
    ) -> FerriteResult<VulkanDescriptorSet> {
        let allocate_info = vk::DescriptorSetAllocateInfo {
            descriptor_pool: pool.pool,
            descriptor_set_count: 1,
            p_set_layouts: &pool.layout,
            ..Default::default()
        };

        let sets = unsafe {
            self.device.allocate_descriptor_sets(&allocate_info).map_err(|e| match e {
                vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                    FerriteError::DescriptorPoolExhausted { capacity: pool.max_sets }
                }
                e => FerriteError::ResourceCreationFailed(format!("Failed to allocate descriptor set: {}", e)),
            })?
        };
        let set = sets[0];

        let image_info = vk::DescriptorImageInfo {
            image_view: texture.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ..Default::default()
        };
        let sampler_info = vk::DescriptorImageInfo {
            sampler: texture.sampler,
            ..Default::default()
        };
        let buffer_info = vk::DescriptorBufferInfo {
            buffer: uniform.buffer,
            offset: 0,
            range: uniform_range,
        };

        let writes = [
            vk::WriteDescriptorSet {
                dst_set: set,
                dst_binding: TEXTURE_BINDING,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::SAMPLED_IMAGE,
                p_image_info: &image_info,
                ..Default::default()
            },
            vk::WriteDescriptorSet {
                dst_set: set,
                dst_binding: TRANSFORM_BINDING,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                p_buffer_info: &buffer_info,
                ..Default::default()
            },
            vk::WriteDescriptorSet {
                dst_set: set,
                dst_binding: SAMPLER_BINDING,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::SAMPLER,
                p_image_info: &sampler_info,
                ..Default::default()
            },
        ];

        unsafe {
            self.device.update_descriptor_sets(&writes, &[]);
        }

        Ok(VulkanDescriptorSet { set })
    }
}
