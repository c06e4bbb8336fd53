// Capability probing
//
// Read-only queries against the loader, a physical device and the
// presentation surface. Empty result sets are returned as-is; deciding
// whether "no present modes" disqualifies a device is the selector's job.

use ash::{vk, Entry};
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr};

use super::error::{SetupError, SetupResult};
use super::surface::PresentationSurface;

/// Graphics and present queue family indices of one physical device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Resolve the lowest graphics-capable and the lowest present-capable
    /// family. The scan stops once both roles are filled.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> SetupResult<Self>
    where
        F: FnMut(u32) -> SetupResult<bool>,
    {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if indices.graphics_family.is_none()
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics_family = Some(index);
            }

            if indices.present_family.is_none() && supports_present(index)? {
                indices.present_family = Some(index);
            }

            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Whether graphics and present resolve to one family
    pub fn is_shared(&self) -> bool {
        self.graphics_family == self.present_family
    }

    /// Distinct resolved family indices, ascending
    pub fn unique(&self) -> Vec<u32> {
        [self.graphics_family, self.present_family]
            .into_iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// What a device can do with a given surface
#[derive(Debug, Clone, Default)]
pub struct SwapChainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapChainSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Read a fixed-size, NUL-terminated name field from a properties struct
pub fn property_name(raw: &[c_char]) -> &CStr {
    // The driver guarantees the arrays are NUL-terminated
    unsafe { CStr::from_ptr(raw.as_ptr()) }
}

/// Names from `required` that do not appear in `available`, in required order
pub fn missing_names<'a, I>(required: &[&CStr], available: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a CStr>,
{
    let available: BTreeSet<&CStr> = available.into_iter().collect();

    required
        .iter()
        .filter(|name| !available.contains(**name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

pub fn instance_layers(entry: &Entry) -> SetupResult<Vec<vk::LayerProperties>> {
    entry
        .enumerate_instance_layer_properties()
        .map_err(SetupError::CapabilityQuery)
}

pub fn instance_extensions(entry: &Entry) -> SetupResult<Vec<vk::ExtensionProperties>> {
    entry
        .enumerate_instance_extension_properties(None)
        .map_err(SetupError::CapabilityQuery)
}

pub fn device_extensions(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> SetupResult<Vec<vk::ExtensionProperties>> {
    unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .map_err(SetupError::CapabilityQuery)
}

/// Required device extensions the device does not report
pub fn missing_device_extensions(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    required: &[&CStr],
) -> SetupResult<Vec<String>> {
    let available = device_extensions(instance, physical_device)?;
    Ok(missing_names(
        required,
        available.iter().map(|ext| property_name(&ext.extension_name)),
    ))
}

pub fn queue_families(
    instance: &ash::Instance,
    surface: &PresentationSurface,
    physical_device: vk::PhysicalDevice,
) -> SetupResult<QueueFamilyIndices> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    QueueFamilyIndices::find(&families, |index| {
        unsafe {
            surface
                .loader
                .get_physical_device_surface_support(physical_device, index, surface.handle)
        }
        .map_err(SetupError::CapabilityQuery)
    })
}

pub fn swap_chain_support(
    surface: &PresentationSurface,
    physical_device: vk::PhysicalDevice,
) -> SetupResult<SwapChainSupport> {
    unsafe {
        let capabilities = surface
            .loader
            .get_physical_device_surface_capabilities(physical_device, surface.handle)
            .map_err(SetupError::CapabilityQuery)?;
        let formats = surface
            .loader
            .get_physical_device_surface_formats(physical_device, surface.handle)
            .map_err(SetupError::CapabilityQuery)?;
        let present_modes = surface
            .loader
            .get_physical_device_surface_present_modes(physical_device, surface.handle)
            .map_err(SetupError::CapabilityQuery)?;

        Ok(SwapChainSupport {
            capabilities,
            formats,
            present_modes,
        })
    }
}
