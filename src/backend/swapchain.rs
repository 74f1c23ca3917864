// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// The selection helpers are pure so they can be checked without a GPU.

use ash::extensions::khr;
use ash::vk;

use super::device::{LogicalDevice, QueueFamilies};
use super::error::{BootstrapError, BootstrapResult, CapabilityQueryError};
use super::probe::SurfaceSupport;
use super::surface::PresentationSurface;

/// Prefer an 8-bit UNORM format in sRGB color space, first match in driver order.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR, CapabilityQueryError> {
    let preferred = formats.iter().find(|f| {
        matches!(
            f.format,
            vk::Format::R8G8B8A8_UNORM | vk::Format::B8G8R8A8_UNORM
        ) && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(format) = preferred {
        return Ok(*format);
    }

    let fallback = formats
        .first()
        .copied()
        .ok_or(CapabilityQueryError::NoSurfaceFormats)?;
    log::warn!(
        "No preferred surface format available, falling back to {:?}/{:?}",
        fallback.format,
        fallback.color_space
    );
    Ok(fallback)
}

/// MAILBOX when offered, otherwise FIFO (always supported)
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        log::warn!("MAILBOX present mode unavailable, using FIFO");
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, unless the surface leaves it to us
/// (`u32::MAX` sentinel), in which case the framebuffer size is clamped
/// into the supported range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: framebuffer_size.width.clamp(min.width, max.width),
        height: framebuffer_size.height.clamp(min.height, max.height),
    }
}

/// One more than the minimum; a max of 0 means no upper bound.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

/// Exclusive when one family does both jobs, concurrent across the pair otherwise.
pub fn image_sharing(queues: &QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if queues.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![queues.graphics, queues.present],
        )
    }
}

/// Everything decided about the swapchain before it is created
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDescriptor {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainDescriptor {
    pub fn from_support(
        support: &SurfaceSupport,
        framebuffer_size: vk::Extent2D,
    ) -> Result<Self, CapabilityQueryError> {
        let surface_format = choose_surface_format(&support.formats)?;

        Ok(Self {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, framebuffer_size),
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }
}

/// Driver-owned image paired with the view we created for it
#[derive(Debug, Clone, Copy)]
pub struct SwapchainImage {
    // Target of layout transitions once frames are recorded
    #[allow(dead_code)]
    pub image: vk::Image,
    pub view: vk::ImageView,
}

pub struct Swapchain {
    loader: khr::Swapchain,
    handle: vk::SwapchainKHR,
    pub images: Vec<SwapchainImage>,
    pub descriptor: SwapchainDescriptor,
}

impl Swapchain {
    pub fn new(
        instance: &ash::Instance,
        logical: &LogicalDevice,
        surface: &PresentationSurface,
        support: &SurfaceSupport,
        framebuffer_size: vk::Extent2D,
    ) -> BootstrapResult<Self> {
        let descriptor = SwapchainDescriptor::from_support(support, framebuffer_size)?;
        let (sharing_mode, family_indices) = image_sharing(&logical.queues);

        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}, {:?}",
            descriptor.extent.width,
            descriptor.extent.height,
            descriptor.image_count,
            descriptor.format,
            descriptor.present_mode
        );

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(descriptor.image_count)
            .image_format(descriptor.format)
            .image_color_space(descriptor.color_space)
            .image_extent(descriptor.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(descriptor.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(descriptor.present_mode)
            .clipped(true);

        let loader = khr::Swapchain::new(instance, &logical.device);
        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(BootstrapError::SwapchainCreation)?;

        let mut swapchain = Self {
            loader,
            handle,
            images: Vec::new(),
            descriptor,
        };

        // From here on a failure must release what was already created
        if let Err(e) = swapchain.create_image_views(&logical.device) {
            swapchain.destroy(&logical.device);
            return Err(e);
        }

        log::info!("Created swapchain with {} images", swapchain.images.len());
        Ok(swapchain)
    }

    fn create_image_views(&mut self, device: &ash::Device) -> BootstrapResult<()> {
        let images = unsafe { self.loader.get_swapchain_images(self.handle) }
            .map_err(BootstrapError::SwapchainCreation)?;

        for image in images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.descriptor.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { device.create_image_view(&create_info, None) }
                .map_err(BootstrapError::ImageViewCreation)?;
            self.images.push(SwapchainImage { image, view });
        }

        Ok(())
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.descriptor.extent
    }

    pub fn format(&self) -> vk::Format {
        self.descriptor.format
    }

    /// Image views first, then the swapchain. Calling again is a no-op.
    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            for image in self.images.drain(..) {
                if image.view != vk::ImageView::null() {
                    device.destroy_image_view(image.view, None);
                }
            }
            if self.handle != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.handle, None);
                self.handle = vk::SwapchainKHR::null();
                log::debug!("Swapchain destroyed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn unorm_format_preferred_over_srgb() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn first_preferred_format_in_driver_order_wins() {
        let formats = [
            format(vk::Format::B8G8R8A8_SRGB),
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::R8G8B8A8_UNORM),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn preferred_format_needs_srgb_color_space() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            },
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn no_formats_is_an_error() {
        assert!(matches!(
            choose_surface_format(&[]),
            Err(CapabilityQueryError::NoSurfaceFormats)
        ));
    }

    #[test]
    fn present_mode_selection() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&[
                vk::PresentModeKHR::IMMEDIATE,
                vk::PresentModeKHR::FIFO,
                vk::PresentModeKHR::MAILBOX,
            ]),
            vk::PresentModeKHR::MAILBOX
        );
        // IMMEDIATE is never picked
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn current_extent_is_used_verbatim() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1024, 768),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, extent(800, 600)), extent(1024, 768));
    }

    #[test]
    fn sentinel_extent_clamps_framebuffer_size() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(100, 100),
            max_image_extent: extent(1920, 1080),
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, extent(800, 600)), extent(800, 600));
        assert_eq!(choose_extent(&capabilities, extent(3840, 50)), extent(1920, 100));
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
    }

    #[test]
    fn sharing_follows_queue_families() {
        let shared = QueueFamilies {
            graphics: 0,
            present: 0,
        };
        assert_eq!(image_sharing(&shared), (vk::SharingMode::EXCLUSIVE, vec![]));

        let split = QueueFamilies {
            graphics: 0,
            present: 2,
        };
        assert_eq!(
            image_sharing(&split),
            (vk::SharingMode::CONCURRENT, vec![0, 2])
        );
    }

    #[test]
    fn descriptor_combines_all_choices() {
        let support = SurfaceSupport::new(
            vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent: extent(640, 480),
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            vec![format(vk::Format::B8G8R8A8_UNORM)],
            vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        )
        .unwrap();

        let descriptor = SwapchainDescriptor::from_support(&support, extent(800, 600)).unwrap();
        assert_eq!(descriptor.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(descriptor.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(descriptor.extent, extent(640, 480));
        assert_eq!(descriptor.image_count, 3);
    }
}
