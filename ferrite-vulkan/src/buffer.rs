use std::ptr::NonNull;

use ash::vk;
use ferrite_core::{FerriteError, FerriteResult};

use crate::VulkanDevice;

pub struct VulkanBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: u64,
    /// Bytes actually allocated; may exceed `size`.
    pub allocation_size: u64,
    /// Persistent mapping of host-visible buffers.
    pub mapped: Option<NonNull<u8>>,
    pub device: VulkanDevice,
}

// SAFETY: the mapped pointer refers to memory owned by this buffer and stays valid until
// drop. Callers serialize conflicting ranges through the engine's own locks.
unsafe impl Send for VulkanBuffer {}
unsafe impl Sync for VulkanBuffer {}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.mapped.is_some() {
                self.device.device.unmap_memory(self.memory);
            }
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

impl VulkanBuffer {
    fn mapped_range(&self, offset: u64, len: usize) -> FerriteResult<*mut u8> {
        let ptr = self
            .mapped
            .ok_or_else(|| FerriteError::BackendError("Buffer is not CPU-mappable or not mapped".to_string()))?;
        let end = offset
            .checked_add(len as u64)
            .filter(|&end| end <= self.size)
            .ok_or_else(|| {
                FerriteError::BackendError(format!(
                    "Range {}+{} is outside buffer of {} bytes",
                    offset, len, self.size
                ))
            })?;
        debug_assert!(end <= self.allocation_size);
        Ok(unsafe { ptr.as_ptr().add(offset as usize) })
    }
}

impl ferrite_core::device::Buffer for VulkanBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn write_data(&self, offset: u64, data: &[u8]) -> FerriteResult<()> {
        let dst = self.mapped_range(offset, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    fn read_data(&self, offset: u64, data: &mut [u8]) -> FerriteResult<()> {
        let src = self.mapped_range(offset, data.len())?;
        let range = vk::MappedMemoryRange {
            memory: self.memory,
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        };
        unsafe {
            self.device
                .device
                .invalidate_mapped_memory_ranges(&[range])
                .map_err(|e| FerriteError::BackendError(format!("Failed to invalidate mapped memory: {}", e)))?;
            std::ptr::copy_nonoverlapping(src as *const u8, data.as_mut_ptr(), data.len());
        }
        Ok(())
    }

    fn flush(&self, offset: u64, size: u64) -> FerriteResult<()> {
        if self.mapped.is_none() {
            return Err(FerriteError::BackendError("Cannot flush an unmapped buffer".to_string()));
        }
        let size = if offset.saturating_add(size) >= self.allocation_size { vk::WHOLE_SIZE } else { size };
        let range = vk::MappedMemoryRange {
            memory: self.memory,
            offset,
            size,
            ..Default::default()
        };
        unsafe {
            self.device
                .device
                .flush_mapped_memory_ranges(&[range])
                .map_err(|e| FerriteError::BackendError(format!("Failed to flush mapped memory: {}", e)))
        }
    }
}
