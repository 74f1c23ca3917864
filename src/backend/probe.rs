// Capability probing
//
// Closed-world checks: a required name list either passes completely or
// fails naming the first entry the driver does not advertise.

use ash::{vk, Entry, Instance};
use std::ffi::CStr;

use super::error::CapabilityQueryError;
use super::surface::PresentationSurface;

/// Name of a driver-reported extension
pub fn extension_name(props: &vk::ExtensionProperties) -> &CStr {
    // The driver guarantees a NUL-terminated name within the fixed array
    unsafe { CStr::from_ptr(props.extension_name.as_ptr()) }
}

/// Name of a driver-reported layer
pub fn layer_name(props: &vk::LayerProperties) -> &CStr {
    unsafe { CStr::from_ptr(props.layer_name.as_ptr()) }
}

/// First entry of `required` that is absent from `available`.
pub fn first_missing<'a, 'b>(
    required: &[&'a CStr],
    available: impl IntoIterator<Item = &'b CStr> + Clone,
) -> Option<&'a CStr> {
    required
        .iter()
        .copied()
        .find(|name| !available.clone().into_iter().any(|candidate| candidate == *name))
}

/// Verify every required instance extension is advertised, either by the
/// driver itself or by one of the layers about to be enabled.
pub fn check_instance_extensions(
    entry: &Entry,
    enabled_layers: &[&CStr],
    required: &[&CStr],
) -> Result<(), CapabilityQueryError> {
    let mut available = entry.enumerate_instance_extension_properties(None)?;
    for &layer in enabled_layers {
        available.extend(entry.enumerate_instance_extension_properties(Some(layer))?);
    }

    match first_missing(required, available.iter().map(extension_name)) {
        Some(missing) => Err(CapabilityQueryError::MissingExtension(missing.to_owned())),
        None => Ok(()),
    }
}

/// Split `requested` layers into the ones the loader can provide and the
/// ones it cannot.
pub fn partition_layers<'a>(
    entry: &Entry,
    requested: &[&'a CStr],
) -> Result<(Vec<&'a CStr>, Vec<&'a CStr>), CapabilityQueryError> {
    let available = entry.enumerate_instance_layer_properties()?;
    Ok(split_supported(requested, available.iter().map(layer_name)))
}

fn split_supported<'a, 'b>(
    requested: &[&'a CStr],
    available: impl IntoIterator<Item = &'b CStr> + Clone,
) -> (Vec<&'a CStr>, Vec<&'a CStr>) {
    requested
        .iter()
        .copied()
        .partition(|name| available.clone().into_iter().any(|candidate| candidate == *name))
}

/// Verify every required device extension is advertised by `physical_device`.
pub fn check_device_extensions(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    required: &[&CStr],
) -> Result<(), CapabilityQueryError> {
    let available = unsafe { instance.enumerate_device_extension_properties(physical_device) }?;

    match first_missing(required, available.iter().map(extension_name)) {
        Some(missing) => Err(CapabilityQueryError::MissingExtension(missing.to_owned())),
        None => Ok(()),
    }
}

/// What a physical device can do with the bound surface
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        surface: &PresentationSurface,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self, CapabilityQueryError> {
        let capabilities = surface.capabilities(physical_device)?;
        let formats = surface.formats(physical_device)?;
        let present_modes = surface.present_modes(physical_device)?;
        Self::new(capabilities, formats, present_modes)
    }

    /// Rejects empty format or present-mode sets; such a device cannot
    /// present to this surface at all.
    pub fn new(
        capabilities: vk::SurfaceCapabilitiesKHR,
        formats: Vec<vk::SurfaceFormatKHR>,
        present_modes: Vec<vk::PresentModeKHR>,
    ) -> Result<Self, CapabilityQueryError> {
        if formats.is_empty() {
            return Err(CapabilityQueryError::NoSurfaceFormats);
        }
        if present_modes.is_empty() {
            return Err(CapabilityQueryError::NoPresentModes);
        }
        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::raw::c_char;

    fn extension(name: &str) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, src) in props.extension_name.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        props
    }

    fn cstr(bytes: &[u8]) -> &CStr {
        CStr::from_bytes_with_nul(bytes).unwrap()
    }

    #[test]
    fn all_present_passes() {
        let available = [extension("VK_KHR_surface"), extension("VK_KHR_xcb_surface")];
        let required = [cstr(b"VK_KHR_surface\0"), cstr(b"VK_KHR_xcb_surface\0")];
        assert_eq!(first_missing(&required, available.iter().map(extension_name)), None);
    }

    #[test]
    fn names_the_exact_missing_extension() {
        let available = [extension("VK_KHR_surface"), extension("VK_KHR_xcb_surface")];
        let required = [
            cstr(b"VK_KHR_surface\0"),
            cstr(b"VK_EXT_debug_utils\0"),
            cstr(b"VK_KHR_wayland_surface\0"),
        ];
        assert_eq!(
            first_missing(&required, available.iter().map(extension_name)),
            Some(cstr(b"VK_EXT_debug_utils\0"))
        );
    }

    #[test]
    fn prefix_of_an_available_name_is_not_a_match() {
        let available = [extension("VK_KHR_surface_protected_capabilities")];
        let required = [cstr(b"VK_KHR_surface\0")];
        assert_eq!(
            first_missing(&required, available.iter().map(extension_name)),
            Some(cstr(b"VK_KHR_surface\0"))
        );
    }

    #[test]
    fn empty_requirement_always_passes() {
        assert_eq!(first_missing(&[], std::iter::empty::<&CStr>()), None);
    }

    #[test]
    fn unsupported_layers_are_split_out() {
        let validation = cstr(b"VK_LAYER_KHRONOS_validation\0");
        let monitor = cstr(b"VK_LAYER_LUNARG_monitor\0");
        let (supported, missing) = split_supported(&[validation, monitor], [monitor]);
        assert_eq!(supported, vec![monitor]);
        assert_eq!(missing, vec![validation]);
    }

    #[test]
    fn surface_without_formats_is_unsuitable() {
        let result = SurfaceSupport::new(
            vk::SurfaceCapabilitiesKHR::default(),
            vec![],
            vec![vk::PresentModeKHR::FIFO],
        );
        assert!(matches!(result, Err(CapabilityQueryError::NoSurfaceFormats)));
    }

    #[test]
    fn surface_without_present_modes_is_unsuitable() {
        let result = SurfaceSupport::new(
            vk::SurfaceCapabilitiesKHR::default(),
            vec![vk::SurfaceFormatKHR::default()],
            vec![],
        );
        assert!(matches!(result, Err(CapabilityQueryError::NoPresentModes)));
    }
}
