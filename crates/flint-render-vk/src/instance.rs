// SPDX-License-Identifier: CEPL-1.0
use crate::error::{RenderResult, VkCall};
use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry, Instance};
use flint_render::WindowSystem;
use std::ffi::{c_char, c_void, CStr, CString};
use tracing::{debug, error, info, trace, warn};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// Loader, instance and the window surface. Outlives everything created
/// from the logical device.
pub(crate) struct InstanceContext {
    // libvulkan stays loaded until the instance is destroyed.
    _entry: Entry,
    pub instance: Instance,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    debug: Option<DebugMessenger>,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let p_message = unsafe { (*data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[vulkan {types:?}] {msg}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("[vulkan {types:?}] {msg}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => debug!("[vulkan {types:?}] {msg}"),
        _ => trace!("[vulkan {types:?}] {msg}"),
    }
    vk::FALSE
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

unsafe fn validation_available(entry: &Entry) -> RenderResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }
        .call("vkEnumerateInstanceLayerProperties")?;
    Ok(layers
        .iter()
        .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == VALIDATION_LAYER))
}

impl InstanceContext {
    // STRICT ORDER:
    // 1) Load the library and create the instance (WSI + optional debug ext)
    // 2) Debug messenger, so device selection is already covered
    // 3) Surface FROM THIS INSTANCE; devices are later probed against it
    pub(crate) unsafe fn new(
        window: &dyn WindowSystem,
        app_name: &str,
        validation: bool,
    ) -> RenderResult<Self> {
        let display = window.display_handle()?.as_raw();
        let raw_window = window.window_handle()?.as_raw();

        let entry = unsafe { Entry::load() }?;

        let validation = if validation && !unsafe { validation_available(&entry) }? {
            warn!("{VALIDATION_LAYER:?} requested but not installed; continuing without it");
            false
        } else {
            validation
        };

        let app = CString::new(app_name).unwrap_or_default();
        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: app.as_ptr(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            p_engine_name: c"flint".as_ptr(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };

        let mut extensions = ash_window::enumerate_required_extensions(display)
            .call("enumerate_required_extensions")?
            .to_vec();
        if validation {
            extensions.push(debug_utils::NAME.as_ptr());
        }
        let layers: Vec<*const c_char> = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: extensions.as_ptr(),
            enabled_layer_count: layers.len() as u32,
            pp_enabled_layer_names: layers.as_ptr(),
            ..Default::default()
        };
        let instance =
            unsafe { entry.create_instance(&create_info, None) }.call("vkCreateInstance")?;

        let debug = if validation {
            let loader = debug_utils::Instance::new(&entry, &instance);
            match unsafe { loader.create_debug_utils_messenger(&messenger_info(), None) } {
                Ok(messenger) => Some(DebugMessenger { loader, messenger }),
                Err(result) => {
                    warn!("debug messenger unavailable: {result}");
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = match unsafe {
            ash_window::create_surface(&entry, &instance, display, raw_window, None)
        } {
            Ok(surface) => surface,
            Err(result) => {
                unsafe {
                    if let Some(d) = &debug {
                        d.loader.destroy_debug_utils_messenger(d.messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(result).call("create_surface");
            }
        };

        info!("instance ready (validation={validation})");
        Ok(Self {
            _entry: entry,
            instance,
            surface_loader,
            surface,
            debug,
        })
    }

    /// # Safety
    /// The logical device and everything created from it must be gone.
    pub(crate) unsafe fn destroy(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some(d) = self.debug.take() {
                d.loader.destroy_debug_utils_messenger(d.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
