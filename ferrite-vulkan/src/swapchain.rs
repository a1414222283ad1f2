use ash::vk;
use ferrite_core::device::{Extent2D, TextureFormat};

use crate::VulkanDevice;

pub struct VulkanSwapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub extent: Extent2D,
    pub format: TextureFormat,
    pub device: VulkanDevice,
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            log::debug!("Destroying swapchain {:?}", self.swapchain);
            self.device.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

impl ferrite_core::device::Swapchain for VulkanSwapchain {
    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn image_count(&self) -> u32 {
        self.images.len() as u32
    }
}
