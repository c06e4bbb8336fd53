// Physical device selection
//
// Devices are taken in enumeration order and the first one that can
// render and present to our surface wins. No scoring.

use ash::vk;
use std::ffi::CStr;

use super::capabilities::{self, QueueFamilyIndices, SwapChainSupport};
use super::error::{SetupError, SetupResult};
use super::surface::PresentationSurface;

/// The GPU chosen for the logical device
#[derive(Debug, Clone)]
pub struct SelectedDevice {
    pub handle: vk::PhysicalDevice,
    pub queue_families: QueueFamilyIndices,
    pub name: String,
}

/// Everything suitability is decided on for one candidate
#[derive(Debug, Clone, Default)]
pub struct DeviceProbe {
    pub queue_families: QueueFamilyIndices,
    pub missing_extensions: Vec<String>,
    /// Only probed once the required extensions are known to be present
    pub swap_chain: Option<SwapChainSupport>,
}

/// Why a candidate was passed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    IncompleteQueueFamilies,
    MissingExtensions(Vec<String>),
    InadequateSwapChain,
    /// A capability query on this device failed
    QueryFailed(vk::Result),
}

impl DeviceProbe {
    pub fn rejection(&self) -> Option<Rejection> {
        if !self.queue_families.is_complete() {
            return Some(Rejection::IncompleteQueueFamilies);
        }
        if !self.missing_extensions.is_empty() {
            return Some(Rejection::MissingExtensions(self.missing_extensions.clone()));
        }
        match &self.swap_chain {
            Some(support) if support.is_adequate() => None,
            _ => Some(Rejection::InadequateSwapChain),
        }
    }

    pub fn is_suitable(&self) -> bool {
        self.rejection().is_none()
    }
}

/// Probe one physical device against the surface
pub fn probe_device(
    instance: &ash::Instance,
    surface: &PresentationSurface,
    physical_device: vk::PhysicalDevice,
    required_extensions: &[&CStr],
) -> SetupResult<DeviceProbe> {
    let queue_families = capabilities::queue_families(instance, surface, physical_device)?;
    let missing_extensions =
        capabilities::missing_device_extensions(instance, physical_device, required_extensions)?;

    let swap_chain = if missing_extensions.is_empty() {
        Some(capabilities::swap_chain_support(surface, physical_device)?)
    } else {
        None
    };

    Ok(DeviceProbe {
        queue_families,
        missing_extensions,
        swap_chain,
    })
}

/// First candidate whose probe passes, with that probe. A failed query only
/// rules out the device it was made against.
pub fn select_first<T, P>(candidates: Vec<T>, mut probe: P) -> SetupResult<(T, DeviceProbe)>
where
    P: FnMut(&T) -> SetupResult<DeviceProbe>,
{
    if candidates.is_empty() {
        log::error!("Failed to find GPUs with Vulkan support");
        return Err(SetupError::NoSuitableDevice);
    }

    for (index, candidate) in candidates.into_iter().enumerate() {
        let rejection = match probe(&candidate) {
            Ok(result) => match result.rejection() {
                None => return Ok((candidate, result)),
                Some(reason) => reason,
            },
            Err(SetupError::CapabilityQuery(result)) => Rejection::QueryFailed(result),
            Err(e) => return Err(e),
        };
        log::debug!("Skipping device {}: {:?}", index, rejection);
    }

    Err(SetupError::NoSuitableDevice)
}

pub fn pick_physical_device(
    instance: &ash::Instance,
    surface: &PresentationSurface,
    required_extensions: &[&CStr],
) -> SetupResult<SelectedDevice> {
    let devices =
        unsafe { instance.enumerate_physical_devices() }.map_err(SetupError::CapabilityQuery)?;

    let (handle, probe) = select_first(devices, |&device| {
        probe_device(instance, surface, device, required_extensions)
    })?;

    let properties = unsafe { instance.get_physical_device_properties(handle) };
    let name = capabilities::property_name(&properties.device_name)
        .to_string_lossy()
        .into_owned();

    log::info!("Selected GPU: {} ({:?})", name, properties.device_type);
    log::info!(
        "API Version: {}.{}.{}",
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        vk::api_version_patch(properties.api_version)
    );

    Ok(SelectedDevice {
        handle,
        queue_families: probe.queue_families,
        name,
    })
}
