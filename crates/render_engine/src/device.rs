//! Vulkan device bring-up.
//!
//! [`DeviceContext`] owns the instance, the optional debug messenger, the
//! selected physical device, and the logical device with its single graphics
//! queue. Everything else in the renderer borrows from it.

use std::ffi::{c_void, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain;
use ash::{vk, Device, Entry, Instance};

use crate::error::{vk_check, DeviceInitError, DeviceResult};

const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Routes validation messages into the application log.
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[vulkan {message_type:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[vulkan {message_type:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::info!("[vulkan {message_type:?}] {message}");
    } else {
        log::debug!("[vulkan {message_type:?}] {message}");
    }

    vk::FALSE
}

/// The device stack shared by every renderer object.
pub struct DeviceContext {
    #[allow(dead_code)] // keeps the loader alive for the instance's lifetime
    entry: Entry,
    instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    graphics_family: u32,
    device: Device,
    graphics_queue: vk::Queue,
}

impl DeviceContext {
    /// Bring up the full device stack.
    ///
    /// `surface_extensions` are the instance extensions the presentation
    /// backend needs (GLFW reports these). With `debug` set, the Khronos
    /// validation layer is enabled and its messages are forwarded to `log`.
    pub fn initialize(
        app_name: &str,
        app_version: u32,
        debug: bool,
        surface_extensions: &[String],
    ) -> DeviceResult<Self> {
        let entry = unsafe {
            Entry::load().map_err(|e| DeviceInitError::LoaderUnavailable(e.to_string()))?
        };

        if debug && !Self::validation_layer_available(&entry)? {
            return Err(DeviceInitError::MissingValidationLayers);
        }

        let instance = Self::create_instance(&entry, app_name, app_version, debug, surface_extensions)?;
        let debug_messenger = if debug {
            Some(Self::create_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let (physical_device, graphics_family) = Self::select_physical_device(&instance)?;
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        log::info!(
            "using GPU: {} (graphics queue family {graphics_family})",
            device_name.to_string_lossy()
        );

        let device =
            Self::create_logical_device(&instance, physical_device, graphics_family, debug)?;
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };

        Ok(Self {
            entry,
            instance,
            debug: debug_messenger,
            physical_device,
            properties,
            memory_properties,
            graphics_family,
            device,
            graphics_queue,
        })
    }

    fn validation_layer_available(entry: &Entry) -> DeviceResult<bool> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .map_err(DeviceInitError::Api)?;
        Ok(layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name == VALIDATION_LAYER
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        app_version: u32,
        debug: bool,
        surface_extensions: &[String],
    ) -> DeviceResult<Instance> {
        let app_name = CString::new(app_name).unwrap_or_default();
        let engine_name = CString::new("render_engine").unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(app_version)
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let extension_names: Vec<CString> = surface_extensions
            .iter()
            .map(|name| CString::new(name.as_str()).unwrap_or_default())
            .collect();
        let mut extension_ptrs: Vec<*const i8> =
            extension_names.iter().map(|name| name.as_ptr()).collect();
        if debug {
            extension_ptrs.push(DebugUtils::name().as_ptr());
        }

        let layer_ptrs: Vec<*const i8> = if debug {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(DeviceInitError::Api)
        }
    }

    fn create_debug_messenger(
        entry: &Entry,
        instance: &Instance,
    ) -> DeviceResult<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let loader = DebugUtils::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            loader
                .create_debug_utils_messenger(&create_info, None)
                .map_err(DeviceInitError::Api)?
        };
        Ok((loader, messenger))
    }

    /// Pick a discrete GPU with a graphics queue and the feature set the
    /// forward pipelines rely on.
    fn select_physical_device(instance: &Instance) -> DeviceResult<(vk::PhysicalDevice, u32)> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(DeviceInitError::Api)?
        };
        if devices.is_empty() {
            return Err(DeviceInitError::NoSuitableGpu {
                reason: "no Vulkan-capable devices enumerated".to_string(),
            });
        }

        for device in devices {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            if properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
                continue;
            }

            let features = unsafe { instance.get_physical_device_features(device) };
            if features.geometry_shader == vk::FALSE || features.sampler_anisotropy == vk::FALSE {
                continue;
            }

            let families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };
            let graphics_family = families.iter().position(|family| {
                family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && family.queue_count > 0
            });

            if let Some(family) = graphics_family {
                return Ok((device, family as u32));
            }
        }

        Err(DeviceInitError::NoSuitableGpu {
            reason: "no discrete GPU with graphics queue, geometry shaders, and anisotropic \
                     filtering"
                .to_string(),
        })
    }

    fn create_logical_device(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        graphics_family: u32,
        debug: bool,
    ) -> DeviceResult<Device> {
        let queue_priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_family)
            .queue_priorities(&queue_priorities)
            .build()];

        let extension_ptrs = [Swapchain::name().as_ptr()];

        let features = vk::PhysicalDeviceFeatures::builder()
            .geometry_shader(true)
            .sampler_anisotropy(true)
            .fill_mode_non_solid(true)
            .shader_clip_distance(true)
            .shader_cull_distance(true);

        let layer_ptrs: Vec<*const i8> = if debug {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&features);

        unsafe {
            instance
                .create_device(physical_device, &create_info, None)
                .map_err(DeviceInitError::Api)
        }
    }

    /// Instance loader, for extension loaders that need it.
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The Vulkan instance.
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Raw instance handle, for surface-creation callbacks.
    pub fn instance_handle(&self) -> vk::Instance {
        self.instance.handle()
    }

    /// The logical device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// A clone of the logical device for RAII wrappers.
    pub fn raw_device(&self) -> Device {
        self.device.clone()
    }

    /// The selected physical device.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Queue family index used for graphics and presentation.
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// The graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Cached memory properties of the physical device.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Cached limits of the physical device.
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    /// Block until the device is idle. Fatal on device loss.
    pub fn wait_idle(&self) {
        vk_check(unsafe { self.device.device_wait_idle() }, "vkDeviceWaitIdle");
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
