use std::ptr::NonNull;

use ash::vk;
use ferrite_core::device::{
    AddressMode, BufferDescriptor, BufferUsage, ColorSpace, Extent2D, FilterMode, TextureDescriptor, TextureFormat,
};
use ferrite_core::memory::MemoryLocation;
use ferrite_core::swapchain::{ChainConfig, PresentMode, SharingMode, SurfaceCapabilities, SurfaceFormat, SurfaceSupport};
use ferrite_core::{FerriteError, FerriteResult};

use crate::VulkanDevice;

impl VulkanDevice {
    pub fn create_buffer_impl(&self, descriptor: &BufferDescriptor) -> FerriteResult<crate::VulkanBuffer> {
        let mut usage = vk::BufferUsageFlags::empty();
        let u = descriptor.usage;
        if u.contains(BufferUsage::VERTEX) { usage |= vk::BufferUsageFlags::VERTEX_BUFFER; }
        if u.contains(BufferUsage::INDEX) { usage |= vk::BufferUsageFlags::INDEX_BUFFER; }
        if u.contains(BufferUsage::UNIFORM) { usage |= vk::BufferUsageFlags::UNIFORM_BUFFER; }
        if u.contains(BufferUsage::STORAGE) { usage |= vk::BufferUsageFlags::STORAGE_BUFFER; }
        if u.contains(BufferUsage::COPY_SRC) { usage |= vk::BufferUsageFlags::TRANSFER_SRC; }
        if u.contains(BufferUsage::COPY_DST) { usage |= vk::BufferUsageFlags::TRANSFER_DST; }

        let create_info = vk::BufferCreateInfo {
            size: descriptor.size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };

        let buffer = unsafe {
            self.device.create_buffer(&create_info, None).map_err(|e| {
                FerriteError::ResourceCreationFailed(format!("Failed to create buffer {}: {}", descriptor.label, e))
            })?
        };

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory = match self.allocate_memory(requirements, descriptor.location) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // From here on the wrapper owns both handles and releases them on any error.
        let mut wrapped = crate::VulkanBuffer {
            buffer,
            memory,
            size: descriptor.size,
            allocation_size: requirements.size,
            mapped: None,
            device: self.clone(),
        };

        unsafe {
            self.device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(|e| FerriteError::ResourceCreationFailed(format!("Failed to bind buffer memory: {}", e)))?;
        }

        if descriptor.location == MemoryLocation::CpuToGpu {
            let ptr = unsafe {
                self.device
                    .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                    .map_err(|e| FerriteError::ResourceCreationFailed(format!("Failed to map buffer memory: {}", e)))?
            };
            wrapped.mapped = NonNull::new(ptr.cast::<u8>());
        }

        log::debug!("Created buffer {} ({} bytes, {:?})", descriptor.label, descriptor.size, descriptor.location);
        Ok(wrapped)
    }

    pub fn create_texture_impl(&self, descriptor: &TextureDescriptor) -> FerriteResult<crate::VulkanTexture> {
        let format = map_texture_format(descriptor.format);
        let extent = Extent2D::new(descriptor.width, descriptor.height);
        let (image, memory) = self.create_image(
            format,
            extent,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;
        let view = match self.create_image_view(image, format, vk::ImageAspectFlags::COLOR) {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    self.device.destroy_image(image, None);
                    self.device.free_memory(memory, None);
                }
                return Err(e);
            }
        };

        let filter = match descriptor.filter {
            FilterMode::Nearest => vk::Filter::NEAREST,
            FilterMode::Linear => vk::Filter::LINEAR,
        };
        let address_mode = match descriptor.address_mode {
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        };
        let sampler_info = vk::SamplerCreateInfo {
            mag_filter: filter,
            min_filter: filter,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            max_lod: 0.0,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            ..Default::default()
        };

        let sampler = unsafe {
            self.device.create_sampler(&sampler_info, None).map_err(|e| {
                self.device.destroy_image_view(view, None);
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
                FerriteError::ResourceCreationFailed(format!("Failed to create sampler: {}", e))
            })?
        };

        Ok(crate::VulkanTexture {
            image,
            memory,
            view,
            sampler,
            format: descriptor.format,
            extent,
            device: self.clone(),
        })
    }

    pub fn create_depth_buffer_impl(&self, extent: Extent2D, format: TextureFormat) -> FerriteResult<crate::VulkanDepthBuffer> {
        if !format.is_depth() {
            return Err(FerriteError::ResourceCreationFailed(format!("{:?} is not a depth format", format)));
        }
        let vk_format = map_texture_format(format);
        let (image, memory) = self.create_image(vk_format, extent, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)?;
        let view = match self.create_image_view(image, vk_format, vk::ImageAspectFlags::DEPTH) {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    self.device.destroy_image(image, None);
                    self.device.free_memory(memory, None);
                }
                return Err(e);
            }
        };

        Ok(crate::VulkanDepthBuffer {
            image,
            memory,
            view,
            extent,
            device: self.clone(),
        })
    }

    fn create_image(
        &self,
        format: vk::Format,
        extent: Extent2D,
        usage: vk::ImageUsageFlags,
    ) -> FerriteResult<(vk::Image, vk::DeviceMemory)> {
        let create_info = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D { width: extent.width, height: extent.height, depth: 1 },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };

        let image = unsafe {
            self.device
                .create_image(&create_info, None)
                .map_err(|e| FerriteError::ResourceCreationFailed(format!("Failed to create image: {}", e)))?
        };

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let bound = self.allocate_memory(requirements, MemoryLocation::GpuOnly).and_then(|memory| unsafe {
            self.device.bind_image_memory(image, memory, 0).map(|_| memory).map_err(|e| {
                self.device.free_memory(memory, None);
                FerriteError::ResourceCreationFailed(format!("Failed to bind image memory: {}", e))
            })
        });

        match bound {
            Ok(memory) => Ok((image, memory)),
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                Err(e)
            }
        }
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
    ) -> FerriteResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo {
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };

        unsafe {
            self.device
                .create_image_view(&create_info, None)
                .map_err(|e| FerriteError::ResourceCreationFailed(format!("Failed to create image view: {}", e)))
        }
    }

    pub fn surface_support_impl(&self) -> FerriteResult<SurfaceSupport> {
        let loader = &self.surface.surface_loader;
        let surface = self.surface.surface;
        let query_failed = |e: vk::Result| FerriteError::SwapchainCreationFailed(format!("Surface query failed: {}", e));

        let (caps, formats, present_modes) = unsafe {
            (
                loader
                    .get_physical_device_surface_capabilities(self.physical_device, surface)
                    .map_err(query_failed)?,
                loader
                    .get_physical_device_surface_formats(self.physical_device, surface)
                    .map_err(query_failed)?,
                loader
                    .get_physical_device_surface_present_modes(self.physical_device, surface)
                    .map_err(query_failed)?,
            )
        };

        let to_extent = |e: vk::Extent2D| Extent2D::new(e.width, e.height);
        let capabilities = SurfaceCapabilities {
            min_image_count: caps.min_image_count,
            max_image_count: caps.max_image_count,
            // The special value u32::MAX lets the swapchain pick its own size.
            current_extent: (caps.current_extent.width != u32::MAX).then(|| to_extent(caps.current_extent)),
            min_image_extent: to_extent(caps.min_image_extent),
            max_image_extent: to_extent(caps.max_image_extent),
        };

        Ok(SurfaceSupport {
            capabilities,
            formats: formats
                .iter()
                .map(|f| SurfaceFormat {
                    format: unmap_texture_format(f.format),
                    color_space: unmap_color_space(f.color_space),
                })
                .collect(),
            present_modes: present_modes.iter().filter_map(|&m| unmap_present_mode(m)).collect(),
        })
    }

    pub fn create_swapchain_impl(
        &self,
        config: &ChainConfig,
        old: Option<&crate::VulkanSwapchain>,
    ) -> FerriteResult<crate::VulkanSwapchain> {
        let caps = unsafe {
            self.surface
                .surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface.surface)
                .map_err(|e| FerriteError::SwapchainCreationFailed(format!("Surface query failed: {}", e)))?
        };

        let format = map_texture_format(config.surface_format.format);
        let (sharing_mode, family_indices): (vk::SharingMode, &[u32]) = match &config.sharing {
            SharingMode::Exclusive => (vk::SharingMode::EXCLUSIVE, &[]),
            SharingMode::Concurrent(families) => (vk::SharingMode::CONCURRENT, families.as_slice()),
        };

        let create_info = vk::SwapchainCreateInfoKHR {
            surface: self.surface.surface,
            min_image_count: config.image_count,
            image_format: format,
            image_color_space: map_color_space(config.surface_format.color_space),
            image_extent: vk::Extent2D { width: config.extent.width, height: config.extent.height },
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing_mode,
            queue_family_index_count: family_indices.len() as u32,
            p_queue_family_indices: family_indices.as_ptr(),
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: map_present_mode(config.present_mode),
            clipped: vk::TRUE,
            old_swapchain: old.map_or(vk::SwapchainKHR::null(), |o| o.swapchain),
            ..Default::default()
        };

        let swapchain = unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| FerriteError::SwapchainCreationFailed(format!("Failed to create swapchain: {}", e)))?
        };

        let mut wrapped = crate::VulkanSwapchain {
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            extent: config.extent,
            format: config.surface_format.format,
            device: self.clone(),
        };

        wrapped.images = unsafe {
            self.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| FerriteError::SwapchainCreationFailed(format!("Failed to get swapchain images: {}", e)))?
        };

        for i in 0..wrapped.images.len() {
            let view = self.create_image_view(wrapped.images[i], format, vk::ImageAspectFlags::COLOR)?;
            wrapped.image_views.push(view);
        }

        log::debug!(
            "Created swapchain {:?}: {} images, {}x{}",
            swapchain,
            wrapped.images.len(),
            config.extent.width,
            config.extent.height
        );
        Ok(wrapped)
    }
}

pub fn map_texture_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Undefined => vk::Format::UNDEFINED,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        TextureFormat::Other(raw) => vk::Format::from_raw(raw),
    }
}

pub fn unmap_texture_format(format: vk::Format) -> TextureFormat {
    match format {
        vk::Format::UNDEFINED => TextureFormat::Undefined,
        vk::Format::B8G8R8A8_UNORM => TextureFormat::Bgra8Unorm,
        vk::Format::B8G8R8A8_SRGB => TextureFormat::Bgra8UnormSrgb,
        vk::Format::R8G8B8A8_UNORM => TextureFormat::Rgba8Unorm,
        vk::Format::R8G8B8A8_SRGB => TextureFormat::Rgba8UnormSrgb,
        vk::Format::D32_SFLOAT => TextureFormat::Depth32Float,
        other => TextureFormat::Other(other.as_raw()),
    }
}

fn map_color_space(color_space: ColorSpace) -> vk::ColorSpaceKHR {
    match color_space {
        ColorSpace::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpace::Other(raw) => vk::ColorSpaceKHR::from_raw(raw),
    }
}

fn unmap_color_space(color_space: vk::ColorSpaceKHR) -> ColorSpace {
    match color_space {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => ColorSpace::SrgbNonlinear,
        other => ColorSpace::Other(other.as_raw()),
    }
}

fn map_present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

fn unmap_present_mode(mode: vk::PresentModeKHR) -> Option<PresentMode> {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
        _ => None,
    }
}
