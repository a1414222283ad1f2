//! Vulkan backend for `ferrite-core`, built directly on `ash`.

pub mod instance;
mod surface;
mod device;
mod swapchain;
mod pipeline;
mod buffer;
mod texture;

pub use instance::VulkanInstance;
pub use surface::VulkanSurface;
pub use device::VulkanDevice;
pub use swapchain::VulkanSwapchain;
pub use texture::{VulkanTexture, VulkanDepthBuffer};
pub use pipeline::*;
pub use buffer::VulkanBuffer;
