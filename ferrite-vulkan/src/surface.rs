use std::sync::Arc;

use ash::vk;

use crate::instance::VulkanInstanceInner;

pub struct VulkanSurface {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    // Keeps the instance alive until the surface is gone.
    pub(crate) _instance: Arc<VulkanInstanceInner>,
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        unsafe {
            log::debug!("Destroying Vulkan surface {:?}", self.surface);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

impl ferrite_core::instance::Surface for VulkanSurface {}
