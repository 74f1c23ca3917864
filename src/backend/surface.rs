// Presentation surface
//
// The window itself belongs to the windowing layer. The renderer only needs
// three things from it: the instance extensions its platform requires, a
// surface created from its raw handles, and its current framebuffer size.

use ash::extensions::khr;
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::CStr;

use super::error::{BootstrapError, BootstrapResult};

/// A window the renderer can present to.
pub trait WindowTarget {
    /// Instance extensions the platform needs to create a surface for this window
    fn required_extensions(&self) -> BootstrapResult<Vec<&'static CStr>>;

    /// # Safety
    /// `instance` must have been created with [`WindowTarget::required_extensions`]
    /// enabled, and the window must outlive the returned surface.
    unsafe fn create_surface(&self, entry: &Entry, instance: &Instance)
        -> BootstrapResult<vk::SurfaceKHR>;

    /// Current drawable size in pixels
    fn framebuffer_size(&self) -> vk::Extent2D;
}

impl WindowTarget for winit::window::Window {
    fn required_extensions(&self) -> BootstrapResult<Vec<&'static CStr>> {
        let names = ash_window::enumerate_required_extensions(self.raw_display_handle())
            .map_err(|e| {
                BootstrapError::WindowHandle(format!(
                    "platform has no Vulkan surface support ({})",
                    e
                ))
            })?;

        // ash-window hands out pointers into its own static name tables
        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect())
    }

    unsafe fn create_surface(
        &self,
        entry: &Entry,
        instance: &Instance,
    ) -> BootstrapResult<vk::SurfaceKHR> {
        ash_window::create_surface(
            entry,
            instance,
            self.raw_display_handle(),
            self.raw_window_handle(),
            None,
        )
        .map_err(BootstrapError::SurfaceCreation)
    }

    fn framebuffer_size(&self) -> vk::Extent2D {
        let size = self.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }
}

/// Surface bound to the application window, plus the loader for its queries
pub struct PresentationSurface {
    loader: khr::Surface,
    handle: vk::SurfaceKHR,
}

impl PresentationSurface {
    pub fn bind(
        entry: &Entry,
        instance: &Instance,
        window: &dyn WindowTarget,
    ) -> BootstrapResult<Self> {
        let handle = unsafe { window.create_surface(entry, instance)? };
        log::debug!("Window surface created");

        Ok(Self {
            loader: khr::Surface::new(entry, instance),
            handle,
        })
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.handle)
        }
    }

    pub fn formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.handle)
        }
    }

    pub fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, vk::Result> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.handle)
        }
    }

    /// Whether `queue_family_index` on `physical_device` can present to this surface
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool, vk::Result> {
        unsafe {
            self.loader.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                self.handle,
            )
        }
    }

    /// Safe to call more than once; the handle is nulled after the first call.
    pub fn destroy(&mut self) {
        if self.handle != vk::SurfaceKHR::null() {
            unsafe { self.loader.destroy_surface(self.handle, None) };
            self.handle = vk::SurfaceKHR::null();
            log::debug!("Window surface destroyed");
        }
    }
}
