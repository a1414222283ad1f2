use ash::vk;
use ferrite_core::device::{Extent2D, TextureFormat};

use crate::VulkanDevice;

/// A sampled 2D image with its own memory, view and sampler.
pub struct VulkanTexture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub format: TextureFormat,
    pub extent: Extent2D,
    pub device: VulkanDevice,
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_sampler(self.sampler, None);
            self.device.device.destroy_image_view(self.view, None);
            self.device.device.destroy_image(self.image, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

pub struct VulkanDepthBuffer {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub extent: Extent2D,
    pub device: VulkanDevice,
}

impl Drop for VulkanDepthBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_image_view(self.view, None);
            self.device.device.destroy_image(self.image, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}
