//! Vulkan instance, device and queue setup
//!
//! The context is created without a surface. A windowing layer that presents
//! passes its surface and swapchain extensions through `extra_*_extensions`
//! and supplies swapchain image views to the renderer separately.

use ash::extensions::ext::DebugUtils;
use ash::{vk, Device, Entry, Instance};
use std::ffi::{c_char, CStr, CString};

use super::{VulkanError, VulkanResult};
use crate::config::settings::DeviceConfig;

const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Queue family and queue handle
#[derive(Debug, Clone, Copy)]
pub struct QueueInfo {
    /// Queue family index
    pub family: u32,
    /// Queue handle
    pub queue: vk::Queue,
}

/// Instance, physical device, logical device and the queues the engine uses
pub struct VulkanContext {
    _entry: Entry,
    instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device: Device,
    graphics: QueueInfo,
    compute: QueueInfo,
}

impl VulkanContext {
    /// Create a headless context
    pub fn new(config: &DeviceConfig) -> VulkanResult<Self> {
        Self::with_extensions(config, &[], &[])
    }

    /// Create a context with additional instance and device extensions
    pub fn with_extensions(
        config: &DeviceConfig,
        extra_instance_extensions: &[&CStr],
        extra_device_extensions: &[&CStr],
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e:?}")))?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid application name: {e}")))?;
        let engine_name = CString::new("DeferredEngine")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_1);

        let validation = config.enable_validation && Self::validation_available(&entry);
        if config.enable_validation && !validation {
            log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }

        let mut extensions: Vec<*const c_char> =
            extra_instance_extensions.iter().map(|e| e.as_ptr()).collect();
        let mut layers: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let debug = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            Some((debug_utils, messenger))
        } else {
            None
        };

        let (physical_device, graphics_family, compute_family) = Self::select_physical_device(&instance)?;
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        log::info!("Selected GPU: {}", unsafe {
            CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy()
        });

        let priorities = [1.0_f32];
        let mut queue_infos = vec![vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_family)
            .queue_priorities(&priorities)
            .build()];
        if compute_family != graphics_family {
            queue_infos.push(
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(compute_family)
                    .queue_priorities(&priorities)
                    .build(),
            );
        }

        let device_extensions: Vec<*const c_char> =
            extra_device_extensions.iter().map(|e| e.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true);
        let device_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&device_extensions)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .create_device(physical_device, &device_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics = QueueInfo {
            family: graphics_family,
            queue: unsafe { device.get_device_queue(graphics_family, 0) },
        };
        let compute = QueueInfo {
            family: compute_family,
            queue: unsafe { device.get_device_queue(compute_family, 0) },
        };
        log::debug!(
            "Logical device created (graphics family {}, compute family {})",
            graphics.family,
            compute.family
        );

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            physical_device,
            properties,
            memory_properties,
            device,
            graphics,
            compute,
        })
    }

    fn validation_available(entry: &Entry) -> bool {
        entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers.iter().any(|layer| {
                    let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                    name == VALIDATION_LAYER
                })
            })
            .unwrap_or(false)
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Pick the first device with a graphics queue, preferring discrete GPUs
    /// and a dedicated compute family when one exists.
    fn select_physical_device(instance: &Instance) -> VulkanResult<(vk::PhysicalDevice, u32, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        let mut best: Option<(vk::PhysicalDevice, u32, u32, bool)> = None;
        for device in devices {
            let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
            let graphics = families
                .iter()
                .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS));
            let Some(graphics) = graphics else {
                continue;
            };
            let compute = families
                .iter()
                .enumerate()
                .find(|(i, f)| *i != graphics && f.queue_flags.contains(vk::QueueFlags::COMPUTE))
                .map_or(graphics, |(i, _)| i);

            let discrete = unsafe { instance.get_physical_device_properties(device) }.device_type
                == vk::PhysicalDeviceType::DISCRETE_GPU;
            #[allow(clippy::cast_possible_truncation)]
            let candidate = (device, graphics as u32, compute as u32, discrete);
            let replace = match best {
                Some((.., true)) => false,
                Some(_) => discrete,
                None => true,
            };
            if replace {
                best = Some(candidate);
            }
        }

        best.map(|(device, graphics, compute, _)| (device, graphics, compute))
            .ok_or_else(|| VulkanError::InitializationFailed("No suitable GPU found".to_string()))
    }

    /// Find a memory type matching `type_filter` with all of `properties`
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        find_memory_type(&self.memory_properties, type_filter, properties)
    }

    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Instance
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Physical device
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Physical device limits
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> QueueInfo {
        self.graphics
    }

    /// Compute queue; same as graphics when no dedicated family exists
    pub fn compute_queue(&self) -> QueueInfo {
        self.compute
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Memory type lookup over a memory properties table
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_table(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = flags.len() as u32;
        for (i, f) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = *f;
        }
        props
    }

    #[test]
    fn test_find_memory_type_respects_filter() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let table = memory_table(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);

        assert_eq!(find_memory_type(&table, 0b111, host).unwrap(), 1);
        assert_eq!(find_memory_type(&table, 0b100, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&table, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn test_find_memory_type_missing() {
        let table = memory_table(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let result = find_memory_type(&table, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }
}
