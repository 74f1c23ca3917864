// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (first device that can present to the surface)
// - Queue family discovery (graphics + present)
// - Logical device + queue creation

use ash::extensions::khr;
use ash::vk;
use std::ffi::CStr;

use super::error::{BootstrapError, BootstrapResult, CapabilityQueryError};
use super::probe::{self, SurfaceSupport};
use super::surface::PresentationSurface;

/// Optional device features, enabled only where the hardware has them
const WANTED_DEVICE_FEATURES: vk::PhysicalDeviceFeatures = vk::PhysicalDeviceFeatures {
    fill_mode_non_solid: vk::TRUE,
    wide_lines: vk::TRUE,
    sampler_anisotropy: vk::TRUE,
    ..unsafe { std::mem::zeroed() }
};

/// Extensions a device must offer to be considered at all
pub fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Identity of a physical device, for logging and diagnostics
#[derive(Debug, Clone)]
pub struct PhysicalDeviceDescriptor {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub driver_version: u32,
    pub vendor_id: u32,
    pub api_version: u32,
}

impl PhysicalDeviceDescriptor {
    fn describe(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Self {
        let props = unsafe { instance.get_physical_device_properties(handle) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        Self {
            handle,
            name,
            device_type: props.device_type,
            driver_version: props.driver_version,
            vendor_id: props.vendor_id,
            api_version: props.api_version,
        }
    }

    pub fn log_summary(&self) {
        log::info!("Selected GPU: {}", self.name);
        log::info!("  Type: {:?}", self.device_type);
        log::info!("  Driver version: {:#x}", self.driver_version);
        log::info!("  Vendor ID: {:#06x}", self.vendor_id);
        log::info!(
            "  API Version: {}.{}.{}",
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version)
        );
    }
}

/// Queue families found while scanning a device. Either may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both roles, or `None` while either is missing
    pub fn resolve(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Resolved graphics and present family indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Scan queue families for graphics and presentation support.
///
/// Families without queues are skipped. A family that does both wins
/// outright; otherwise the first graphics family and the first present
/// family are recorded independently.
pub fn find_queue_families<E>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> Result<bool, E>,
) -> Result<QueueFamilyIndices, E> {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in families.iter().enumerate() {
        if family.queue_count == 0 {
            continue;
        }
        let index = index as u32;
        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = supports_present(index)?;

        if graphics && present {
            return Ok(QueueFamilyIndices {
                graphics: Some(index),
                present: Some(index),
            });
        }
        if graphics && indices.graphics.is_none() {
            indices.graphics = Some(index);
        }
        if present && indices.present.is_none() {
            indices.present = Some(index);
        }
    }

    Ok(indices)
}

/// The wanted features this device actually supports
pub fn enabled_features(supported: &vk::PhysicalDeviceFeatures) -> vk::PhysicalDeviceFeatures {
    let pick = |wanted: vk::Bool32, available: vk::Bool32| {
        if wanted == vk::TRUE && available == vk::TRUE {
            vk::TRUE
        } else {
            vk::FALSE
        }
    };

    vk::PhysicalDeviceFeatures {
        fill_mode_non_solid: pick(
            WANTED_DEVICE_FEATURES.fill_mode_non_solid,
            supported.fill_mode_non_solid,
        ),
        wide_lines: pick(WANTED_DEVICE_FEATURES.wide_lines, supported.wide_lines),
        sampler_anisotropy: pick(
            WANTED_DEVICE_FEATURES.sampler_anisotropy,
            supported.sampler_anisotropy,
        ),
        ..Default::default()
    }
}

/// A physical device that passed every suitability check
#[derive(Debug, Clone)]
pub struct SelectedDevice {
    pub descriptor: PhysicalDeviceDescriptor,
    pub queues: QueueFamilies,
    pub surface_support: SurfaceSupport,
    pub features: vk::PhysicalDeviceFeatures,
}

/// Pick the first physical device that can render and present to `surface`.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: &PresentationSurface,
) -> BootstrapResult<SelectedDevice> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(CapabilityQueryError::from)?;

    log::debug!("Found {} physical device(s)", devices.len());

    first_suitable(&devices, |handle| {
        let descriptor = PhysicalDeviceDescriptor::describe(instance, handle);
        evaluate_device(instance, surface, descriptor)
    })
}

/// First-fit over `candidates` in order. `evaluate` answers `Ok(None)` or an
/// error for a candidate that does not qualify; later candidates are not
/// evaluated once one does.
pub fn first_suitable<C: Copy, T>(
    candidates: &[C],
    mut evaluate: impl FnMut(C) -> Result<Option<T>, CapabilityQueryError>,
) -> BootstrapResult<T> {
    if candidates.is_empty() {
        return Err(BootstrapError::NoDevice);
    }

    for &candidate in candidates {
        match evaluate(candidate) {
            Ok(Some(selected)) => return Ok(selected),
            Ok(None) => {}
            Err(e) => log::debug!("Skipping device: {}", e),
        }
    }

    Err(BootstrapError::DeviceUnsuitable {
        candidates: candidates.len(),
    })
}

fn evaluate_device(
    instance: &ash::Instance,
    surface: &PresentationSurface,
    descriptor: PhysicalDeviceDescriptor,
) -> Result<Option<SelectedDevice>, CapabilityQueryError> {
    let handle = descriptor.handle;
    let families = unsafe { instance.get_physical_device_queue_family_properties(handle) };
    let indices = find_queue_families(&families, |index| {
        surface.supports_present(handle, index)
    })?;

    let Some(queues) = indices.resolve() else {
        log::debug!("Skipping {}: missing graphics or present queue", descriptor.name);
        return Ok(None);
    };

    probe::check_device_extensions(instance, handle, &required_device_extensions())?;
    let surface_support = SurfaceSupport::query(surface, handle)?;

    let supported = unsafe { instance.get_physical_device_features(handle) };

    Ok(Some(SelectedDevice {
        descriptor,
        queues,
        surface_support,
        features: enabled_features(&supported),
    }))
}

/// Logical device with its graphics and present queues
pub struct LogicalDevice {
    pub device: ash::Device,
    // Submit and present targets, unused until frames are submitted
    #[allow(dead_code)]
    pub graphics_queue: vk::Queue,
    #[allow(dead_code)]
    pub present_queue: vk::Queue,
    pub queues: QueueFamilies,
}

impl LogicalDevice {
    pub fn new(instance: &ash::Instance, selected: &SelectedDevice) -> BootstrapResult<Self> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = selected
            .queues
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<_> = required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&selected.features);

        let device = unsafe {
            instance.create_device(selected.descriptor.handle, &create_info, None)
        }
        .map_err(BootstrapError::LogicalDeviceCreation)?;

        let graphics_queue = unsafe { device.get_device_queue(selected.queues.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(selected.queues.present, 0) };

        log::info!(
            "Logical device created (graphics family {}, present family {})",
            selected.queues.graphics,
            selected.queues.present
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            queues: selected.queues,
        })
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        unsafe { self.device.device_wait_idle() }
    }

    /// Everything created from the device must already be destroyed.
    pub fn destroy(self) {
        if self.device.handle() != vk::Device::null() {
            unsafe { self.device.destroy_device(None) };
            log::debug!("Logical device destroyed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count,
            ..Default::default()
        }
    }

    fn scan(
        families: &[vk::QueueFamilyProperties],
        present: &[u32],
    ) -> QueueFamilyIndices {
        find_queue_families::<()>(families, |i| Ok(present.contains(&i))).unwrap()
    }

    #[test]
    fn single_family_doing_both() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 16)];
        let indices = scan(&families, &[0]);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert!(indices.resolve().unwrap().is_shared());
    }

    #[test]
    fn split_graphics_and_present_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];
        let indices = scan(&families, &[1]);
        let queues = indices.resolve().unwrap();
        assert_eq!(queues.graphics, 0);
        assert_eq!(queues.present, 1);
        assert_eq!(queues.unique(), vec![0, 1]);
    }

    #[test]
    fn family_doing_both_is_preferred_over_earlier_split() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        let indices = scan(&families, &[1, 2]);
        assert_eq!(indices.graphics, Some(2));
        assert_eq!(indices.present, Some(2));
    }

    #[test]
    fn families_without_queues_are_ignored() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 2),
        ];
        let indices = scan(&families, &[0, 1]);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn no_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS, 4)];
        let indices = scan(&families, &[]);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, None);
        assert!(indices.resolve().is_none());
    }

    #[test]
    fn present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let result = find_queue_families(&families, |_| Err(vk::Result::ERROR_SURFACE_LOST_KHR));
        assert_eq!(result, Err(vk::Result::ERROR_SURFACE_LOST_KHR));
    }

    fn support(formats: usize, present_modes: usize) -> Result<SurfaceSupport, CapabilityQueryError> {
        SurfaceSupport::new(
            vk::SurfaceCapabilitiesKHR::default(),
            vec![vk::SurfaceFormatKHR::default(); formats],
            vec![vk::PresentModeKHR::FIFO; present_modes],
        )
    }

    #[test]
    fn no_candidates_means_no_device() {
        let result = first_suitable(&[] as &[u32], |_| Ok(Some(())));
        assert!(matches!(result, Err(BootstrapError::NoDevice)));
    }

    #[test]
    fn device_without_formats_is_skipped_for_the_next() {
        let surfaces = [(0, 1), (2, 1)];
        let selected = first_suitable(&[0usize, 1], |i| {
            let (formats, modes) = surfaces[i];
            support(formats, modes).map(|_| Some(i))
        })
        .unwrap();
        assert_eq!(selected, 1);
    }

    #[test]
    fn device_without_present_modes_is_never_selected() {
        let result = first_suitable(&[0usize], |_| support(1, 0).map(Some));
        assert!(matches!(
            result,
            Err(BootstrapError::DeviceUnsuitable { candidates: 1 })
        ));
    }

    #[test]
    fn selection_stops_at_the_first_qualifying_device() {
        let mut evaluated = Vec::new();
        let selected = first_suitable(&[10u32, 20, 30], |id| {
            evaluated.push(id);
            if id == 10 {
                Err(CapabilityQueryError::NoSurfaceFormats)
            } else {
                Ok(Some(id))
            }
        })
        .unwrap();
        assert_eq!(selected, 20);
        assert_eq!(evaluated, vec![10, 20]);
    }

    #[test]
    fn all_candidates_failing_is_unsuitable() {
        let result = first_suitable(&[1u32, 2, 3], |id| {
            if id == 2 {
                Err(CapabilityQueryError::MissingExtension(
                    required_device_extensions()[0].to_owned(),
                ))
            } else {
                Ok(None::<u32>)
            }
        });
        assert!(matches!(
            result,
            Err(BootstrapError::DeviceUnsuitable { candidates: 3 })
        ));
    }

    #[test]
    fn only_supported_features_are_enabled() {
        let supported = vk::PhysicalDeviceFeatures {
            fill_mode_non_solid: vk::TRUE,
            geometry_shader: vk::TRUE,
            ..Default::default()
        };
        let enabled = enabled_features(&supported);
        assert_eq!(enabled.fill_mode_non_solid, vk::TRUE);
        assert_eq!(enabled.wide_lines, vk::FALSE);
        assert_eq!(enabled.sampler_anisotropy, vk::FALSE);
        // unrequested features stay off even when available
        assert_eq!(enabled.geometry_shader, vk::FALSE);
    }
}
