// Vulkan instance creation
//
// Responsibilities:
// - Assemble the instance extension list (window system + debug utils)
// - Probe extensions and layers before calling into the driver
// - Degrade to "no validation" when the validation layer is missing
// - Route validation output into the `log` facade

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use std::ffi::{CStr, CString};

use super::error::{BootstrapError, BootstrapResult, CapabilityQueryError};
use super::probe;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// The API instance plus the optional validation messenger hanging off it
pub struct VulkanInstance {
    pub instance: ash::Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create the instance.
    ///
    /// `window_extensions` comes from the windowing layer and is always
    /// required. Validation is best-effort: a missing layer only logs a warning.
    pub fn new(
        entry: &Entry,
        app_name: &str,
        engine_name: &str,
        window_extensions: &[&CStr],
        enable_validation: bool,
    ) -> BootstrapResult<Self> {
        let layers = if enable_validation {
            usable_validation_layers(probe::partition_layers(entry, &[VALIDATION_LAYER]))
        } else {
            Vec::new()
        };
        let validation_active = !layers.is_empty();

        let extensions = required_extensions(window_extensions, validation_active);
        probe::check_instance_extensions(entry, &layers, &extensions)?;

        let app_name = driver_name(app_name);
        let engine_name = driver_name(engine_name);
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let extension_ptrs: Vec<_> = extensions.iter().map(|name| name.as_ptr()).collect();
        let layer_ptrs: Vec<_> = layers.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(BootstrapError::InstanceCreation)?;

        log::info!(
            "Vulkan instance created ({} extensions, validation {})",
            extensions.len(),
            if validation_active { "on" } else { "off" }
        );

        let debug_utils = if validation_active {
            Self::setup_debug_messenger(entry, &instance)
        } else {
            None
        };

        Ok(Self {
            instance,
            debug_utils,
        })
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Option<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        match unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) } {
            Ok(messenger) => Some((debug_utils, messenger)),
            Err(e) => {
                log::warn!("Failed to create debug messenger: {}", e);
                None
            }
        }
    }

    /// Destroy the messenger and then the instance. Everything created from
    /// the instance must already be gone.
    pub fn destroy(mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                if messenger != vk::DebugUtilsMessengerEXT::null() {
                    debug_utils.destroy_debug_utils_messenger(messenger, None);
                }
            }
            if self.instance.handle() != vk::Instance::null() {
                self.instance.destroy_instance(None);
            }
        }
        log::debug!("Vulkan instance destroyed");
    }
}

/// Layers to enable after the layer check. Any failure, including the
/// enumeration itself, only costs validation.
fn usable_validation_layers<'a>(
    checked: Result<(Vec<&'a CStr>, Vec<&'a CStr>), CapabilityQueryError>,
) -> Vec<&'a CStr> {
    match checked {
        Ok((supported, missing)) => {
            for layer in missing {
                let reason = CapabilityQueryError::MissingLayer(layer.to_owned());
                log::warn!("{}, continuing without validation", reason);
            }
            supported
        }
        Err(e) => {
            log::warn!("Layer enumeration failed ({}), continuing without validation", e);
            Vec::new()
        }
    }
}

/// Name for the application info. Interior NULs are dropped with a warning.
fn driver_name(name: &str) -> CString {
    CString::new(name).unwrap_or_else(|e| {
        log::warn!("Name {:?} contains a NUL byte, removing it", name);
        let mut bytes = e.into_vec();
        bytes.retain(|&b| b != 0);
        CString::new(bytes).unwrap_or_default()
    })
}

/// Window-system extensions, extended with debug utils when validation is on.
fn required_extensions<'a>(window_extensions: &[&'a CStr], validation: bool) -> Vec<&'a CStr> {
    let mut extensions = window_extensions.to_vec();
    if validation && !extensions.contains(&DebugUtils::name()) {
        extensions.push(DebugUtils::name());
    }
    extensions
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan {:?}] {}", message_type, message);
        }
        _ => {
            log::trace!("[Vulkan {:?}] {}", message_type, message);
        }
    }

    // dont skip driver
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: &CStr = c"VK_KHR_surface";
    const XCB: &CStr = c"VK_KHR_xcb_surface";

    #[test]
    fn window_extensions_pass_through_without_validation() {
        assert_eq!(required_extensions(&[SURFACE, XCB], false), vec![SURFACE, XCB]);
    }

    #[test]
    fn failed_layer_enumeration_disables_validation() {
        let layers = usable_validation_layers(Err(CapabilityQueryError::Driver(
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        )));
        assert!(layers.is_empty());
    }

    #[test]
    fn only_installed_layers_are_enabled() {
        let missing: &CStr = c"VK_LAYER_missing";
        let layers = usable_validation_layers(Ok((vec![VALIDATION_LAYER], vec![missing])));
        assert_eq!(layers, vec![VALIDATION_LAYER]);
    }

    #[test]
    fn nul_bytes_are_removed_from_names() {
        assert_eq!(driver_name("Hello Vulkan").as_bytes(), b"Hello Vulkan");
        assert_eq!(driver_name("Hel\0lo").as_bytes(), b"Hello");
    }

    #[test]
    fn validation_appends_debug_utils_once() {
        let extensions = required_extensions(&[SURFACE, XCB], true);
        assert_eq!(extensions, vec![SURFACE, XCB, DebugUtils::name()]);

        let again = required_extensions(&extensions, true);
        assert_eq!(again.len(), 3);
    }
}
