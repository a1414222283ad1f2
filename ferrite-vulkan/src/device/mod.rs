use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use ferrite_core::device::DeviceLimits;
use ferrite_core::memory::{find_memory_type, MemoryLocation, MemoryPropertyFlags};
use ferrite_core::queue::{QueueAssignment, QueueRole};
use ferrite_core::{FerriteError, FerriteResult};

use crate::instance::VulkanInstanceInner;
use crate::VulkanSurface;

pub mod descriptor;
pub mod pipeline;
pub mod queue;
pub mod resource;

/// One queue per distinct family. Submissions and presents lock the queue they use.
pub struct QueueEntry {
    pub family: u32,
    pub queue: Mutex<vk::Queue>,
}

pub struct VulkanDeviceInner {
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub queues: Vec<QueueEntry>,
    pub assignment: QueueAssignment,
    pub limits: DeviceLimits,
    pub memory_types: Vec<MemoryPropertyFlags>,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    // Destroyed after the device, in this order.
    pub surface: Arc<VulkanSurface>,
    pub _instance: Arc<VulkanInstanceInner>,
}

#[derive(Clone)]
pub struct VulkanDevice {
    pub inner: Arc<VulkanDeviceInner>,
}

impl std::ops::Deref for VulkanDevice {
    type Target = VulkanDeviceInner;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl VulkanDevice {
    pub(crate) fn new(
        instance: Arc<VulkanInstanceInner>,
        surface: VulkanSurface,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        assignment: QueueAssignment,
    ) -> Self {
        let queues = assignment
            .unique_families()
            .into_iter()
            .map(|family| QueueEntry {
                family,
                queue: Mutex::new(unsafe { device.get_device_queue(family, 0) }),
            })
            .collect();

        let props = unsafe { instance.instance.get_physical_device_properties(physical_device) };
        let limits = DeviceLimits {
            min_uniform_buffer_offset_alignment: props.limits.min_uniform_buffer_offset_alignment,
            non_coherent_atom_size: props.limits.non_coherent_atom_size,
        };

        let memory_properties = unsafe { instance.instance.get_physical_device_memory_properties(physical_device) };
        let memory_types = memory_properties.memory_types[..memory_properties.memory_type_count as usize]
            .iter()
            .map(|t| MemoryPropertyFlags(t.property_flags.as_raw()))
            .collect();

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance.instance, &device);

        log::info!("Vulkan device created ({:?})", limits);

        Self {
            inner: Arc::new(VulkanDeviceInner {
                swapchain_loader,
                queues,
                assignment,
                limits,
                memory_types,
                physical_device,
                device,
                surface: Arc::new(surface),
                _instance: instance,
            }),
        }
    }

    pub(crate) fn queue(&self, role: QueueRole) -> FerriteResult<MutexGuard<'_, vk::Queue>> {
        let family = self.assignment.family(role);
        let entry = self
            .queues
            .iter()
            .find(|q| q.family == family)
            .ok_or_else(|| FerriteError::BackendError(format!("No queue created for family {}", family)))?;
        Ok(entry.queue.lock()?)
    }

    /// Allocates memory for `requirements` in a type matching `location`.
    pub(crate) fn allocate_memory(
        &self,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
    ) -> FerriteResult<vk::DeviceMemory> {
        let memory_type_index = find_memory_type(
            &self.memory_types,
            requirements.memory_type_bits,
            location.required_flags(),
        )?;

        let allocate_info = vk::MemoryAllocateInfo {
            allocation_size: requirements.size,
            memory_type_index,
            ..Default::default()
        };

        unsafe {
            self.device
                .allocate_memory(&allocate_info, None)
                .map_err(|e| FerriteError::ResourceCreationFailed(format!("Failed to allocate memory: {}", e)))
        }
    }
}

impl Drop for VulkanDeviceInner {
    fn drop(&mut self) {
        unsafe {
            log::info!("Destroying Vulkan device");
            self.device.destroy_device(None);
        }
    }
}
