// Presentation surface and the window it is created from
//
// The windowing layer stays outside the backend; all it has to provide is
// the instance extensions it needs, a surface for its native handle and
// the drawable size.

use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::CStr;

/// Window that a Vulkan surface can be created for
pub trait PresentationWindow {
    /// Instance extensions the platform needs for presentation
    fn required_extensions(&self) -> VkResult<Vec<&'static CStr>>;

    /// Create a surface for this window's native handle
    fn create_surface(&self, entry: &Entry, instance: &ash::Instance) -> VkResult<vk::SurfaceKHR>;

    /// Drawable size in pixels
    fn framebuffer_size(&self) -> (u32, u32);
}

impl PresentationWindow for winit::window::Window {
    fn required_extensions(&self) -> VkResult<Vec<&'static CStr>> {
        let names = ash_window::enumerate_required_extensions(self.raw_display_handle())?;

        // ash-window hands out pointers into static name tables
        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect())
    }

    fn create_surface(&self, entry: &Entry, instance: &ash::Instance) -> VkResult<vk::SurfaceKHR> {
        unsafe {
            ash_window::create_surface(
                entry,
                instance,
                self.raw_display_handle(),
                self.raw_window_handle(),
                None,
            )
        }
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}

/// Surface handle together with the loader for the surface extension
pub struct PresentationSurface {
    pub loader: khr::Surface,
    pub handle: vk::SurfaceKHR,
}
