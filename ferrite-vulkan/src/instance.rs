use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::{vk, Entry};
use ferrite_core::instance::{Instance, InstanceDescriptor, WindowSurface};
use ferrite_core::queue::{
    assign_queue_families, select_physical_device, PhysicalDeviceInfo, QueueCapabilities, QueueFamilyInfo,
};
use ferrite_core::{FerriteError, FerriteResult};
use log::{debug, error, info, warn};

use crate::{VulkanDevice, VulkanSurface};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Loader, instance and debug messenger. Shared by the surface and device so the
/// instance is destroyed only after both of them.
pub struct VulkanInstanceInner {
    pub instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub entry: Entry,
}

impl Drop for VulkanInstanceInner {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            info!("Destroying Vulkan instance");
            self.instance.destroy_instance(None);
        }
    }
}

pub struct VulkanInstance {
    pub(crate) inner: Arc<VulkanInstanceInner>,
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = unsafe { *p_callback_data };
    let message_id_number = callback_data.message_id_number;

    let message_id_name = if callback_data.p_message_id_name.is_null() {
        Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy() }
    };

    let message = if callback_data.p_message.is_null() {
        Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let log_level = match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => log::Level::Debug,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Info,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        _ => log::Level::Info,
    };

    log::log!(
        log_level,
        "[Vulkan] {:?} [{} ({})]: {}",
        message_type,
        message_id_name,
        message_id_number,
        message
    );

    vk::FALSE
}

impl Instance for VulkanInstance {
    type Device = VulkanDevice;
    type Surface = VulkanSurface;

    fn new(descriptor: &InstanceDescriptor, window: &impl WindowSurface) -> FerriteResult<Self> {
        info!("Initializing Vulkan instance for application: {}", descriptor.app_name);

        let entry = unsafe {
            Entry::load().map_err(|e| FerriteError::LibraryLoadFailed(format!("Failed to load Vulkan loader: {}", e)))?
        };

        let app_name = CString::new(descriptor.app_name)
            .map_err(|e| FerriteError::InstanceCreationFailed(format!("Invalid application name: {}", e)))?;

        let app_info = vk::ApplicationInfo {
            p_application_name: app_name.as_ptr(),
            application_version: descriptor.app_version,
            p_engine_name: c"Ferrite".as_ptr(),
            engine_version: vk::make_api_version(0, 0, 1, 0),
            api_version: vk::API_VERSION_1_1,
            ..Default::default()
        };

        let display_handle = window
            .display_handle()
            .map_err(|e| FerriteError::InstanceCreationFailed(format!("Failed to get display handle: {}", e)))?;
        let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| FerriteError::InstanceCreationFailed(format!("Unsupported display: {}", e)))?
            .to_vec();

        let validation = descriptor.validation && validation_layer_available(&entry);
        let mut layer_names = Vec::new();
        if validation {
            layer_names.push(VALIDATION_LAYER.as_ptr());
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
        } else if descriptor.validation {
            warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }

        let mut debug_create_info = vk::DebugUtilsMessengerCreateInfoEXT {
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            pfn_user_callback: Some(vulkan_debug_callback),
            ..Default::default()
        };

        let create_info = vk::InstanceCreateInfo {
            p_application_info: &app_info,
            pp_enabled_extension_names: extension_names.as_ptr(),
            enabled_extension_count: extension_names.len() as u32,
            pp_enabled_layer_names: layer_names.as_ptr(),
            enabled_layer_count: layer_names.len() as u32,
            // Covers instance creation and destruction, which the messenger cannot.
            p_next: if validation {
                &mut debug_create_info as *mut _ as *const std::ffi::c_void
            } else {
                std::ptr::null()
            },
            ..Default::default()
        };

        let instance = unsafe {
            entry.create_instance(&create_info, None).map_err(|e| {
                error!("Instance creation error: {:?}", e);
                FerriteError::InstanceCreationFailed(format!("Failed to create Vulkan instance: {}", e))
            })?
        };

        let debug_utils = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match unsafe { loader.create_debug_utils_messenger(&debug_create_info, None) } {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    warn!("Failed to create debug messenger: {:?}", e);
                    None
                }
            }
        } else {
            None
        };

        info!("Vulkan instance created (validation {})", if validation { "on" } else { "off" });

        Ok(VulkanInstance {
            inner: Arc::new(VulkanInstanceInner {
                instance,
                debug_utils,
                entry,
            }),
        })
    }

    fn create_surface(&self, window: &impl WindowSurface) -> FerriteResult<Self::Surface> {
        let display_handle = window
            .display_handle()
            .map_err(|e| FerriteError::SurfaceCreationFailed(format!("Failed to get display handle: {}", e)))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| FerriteError::SurfaceCreationFailed(format!("Failed to get window handle: {}", e)))?;

        let surface = unsafe {
            ash_window::create_surface(
                &self.inner.entry,
                &self.inner.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| FerriteError::SurfaceCreationFailed(format!("Failed to create surface: {}", e)))?
        };

        info!("Vulkan surface created: {:?}", surface);

        Ok(VulkanSurface {
            surface,
            surface_loader: ash::khr::surface::Instance::new(&self.inner.entry, &self.inner.instance),
            _instance: self.inner.clone(),
        })
    }

    fn request_device(&self, surface: Self::Surface, preferred_device: Option<usize>) -> FerriteResult<Self::Device> {
        let instance = &self.inner.instance;
        let physical_devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(|e| FerriteError::DeviceCreationFailed(format!("Failed to enumerate physical devices: {}", e)))?
        };

        info!("Found {} physical devices", physical_devices.len());

        let infos: Vec<PhysicalDeviceInfo> = physical_devices
            .iter()
            .map(|&physical_device| self.describe_physical_device(physical_device, &surface))
            .collect();

        let index = select_physical_device(&infos, preferred_device)?;
        let physical_device = physical_devices[index];
        let assignment = assign_queue_families(&infos[index].queue_families)?;

        info!("Selected physical device {}: {}", index, infos[index].name);

        let priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = assignment
            .unique_families()
            .into_iter()
            .map(|queue_family_index| vk::DeviceQueueCreateInfo {
                queue_family_index,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];

        let device_create_info = vk::DeviceCreateInfo {
            p_queue_create_infos: queue_create_infos.as_ptr(),
            queue_create_info_count: queue_create_infos.len() as u32,
            pp_enabled_extension_names: device_extension_names.as_ptr(),
            enabled_extension_count: device_extension_names.len() as u32,
            ..Default::default()
        };

        let device = unsafe {
            instance.create_device(physical_device, &device_create_info, None).map_err(|e| {
                error!("Failed to create logical device: {:?}", e);
                FerriteError::DeviceCreationFailed(format!("Failed to create logical device: {}", e))
            })?
        };

        Ok(VulkanDevice::new(self.inner.clone(), surface, physical_device, device, assignment))
    }
}

impl VulkanInstance {
    fn describe_physical_device(&self, physical_device: vk::PhysicalDevice, surface: &VulkanSurface) -> PhysicalDeviceInfo {
        let instance = &self.inner.instance;
        let props = unsafe { instance.get_physical_device_properties(physical_device) };
        let name = props
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("<unnamed device>"));

        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) }
            .iter()
            .enumerate()
            .map(|(index, family)| {
                let index = index as u32;
                let supported = unsafe {
                    surface
                        .surface_loader
                        .get_physical_device_surface_support(physical_device, index, surface.surface)
                };
                let supports_present = supported.unwrap_or_else(|e| {
                    warn!("Present support query failed for {} family {}: {:?}", name, index, e);
                    false
                });
                QueueFamilyInfo {
                    index,
                    capabilities: QueueCapabilities(family.queue_flags.as_raw()),
                    queue_count: family.queue_count,
                    supports_present,
                }
            })
            .collect();

        let supports_swapchain = self.supports_swapchain_extension(physical_device, &name);
        debug!(
            "Physical device {} ({:?}, swapchain: {})",
            name, props.device_type, supports_swapchain
        );

        PhysicalDeviceInfo { name, queue_families, supports_swapchain }
    }

    fn supports_swapchain_extension(&self, physical_device: vk::PhysicalDevice, name: &str) -> bool {
        let extensions = match unsafe { self.inner.instance.enumerate_device_extension_properties(physical_device) } {
            Ok(extensions) => extensions,
            Err(e) => {
                warn!("Failed to enumerate extensions of {}: {:?}", name, e);
                return false;
            }
        };
        extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext| ext == ash::khr::swapchain::NAME))
    }
}

fn validation_layer_available(entry: &Entry) -> bool {
    let layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers,
        Err(e) => {
            warn!("Failed to enumerate instance layers: {:?}", e);
            return false;
        }
    };
    layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER))
}
