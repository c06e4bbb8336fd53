// Vulkan context - instance, surface and logical device
//
// Responsibilities:
// - Instance creation with optional validation layers
// - Debug messenger that routes validation output into the log
// - Presentation surface for the window
// - Physical device selection (delegated to the selector)
// - Logical device + graphics/present queues
//
// Destruction is driven by the Renderer, which knows what has been
// created so far; see `renderer::teardown_plan`.

use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use std::borrow::Cow;
use std::ffi::{c_char, CStr, CString};

use super::capabilities::{self, QueueFamilyIndices};
use super::error::{SetupError, SetupResult};
use super::selector::{self, SelectedDevice};
use super::surface::{PresentationSurface, PresentationWindow};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device extensions every candidate GPU must support
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[c"VK_KHR_swapchain"];

const ENGINE_NAME: &CStr = c"gpu-bootstrap";

/// One queue per family, at full priority
static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Logical device with its queues and the swapchain loader bound to it
pub struct LogicalDevice {
    pub device: ash::Device,
    pub swapchain_loader: khr::Swapchain,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

/// Raw handles the context currently holds, for building a teardown plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextHandles {
    pub debug_messenger: vk::DebugUtilsMessengerEXT,
    pub surface: vk::SurfaceKHR,
    pub device: bool,
}

pub struct GraphicsContext {
    entry: Entry,
    pub instance: ash::Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface: Option<PresentationSurface>,
    physical_device: Option<SelectedDevice>,
    device: Option<LogicalDevice>,
    enable_validation: bool,
}

impl GraphicsContext {
    /// Load the Vulkan library and create the instance
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Enable Khronos validation and the debug-utils extension
    /// * `window` - Supplies the platform surface extensions
    pub fn create_instance(
        app_name: &str,
        enable_validation: bool,
        window: &dyn PresentationWindow,
    ) -> SetupResult<Self> {
        log::info!("Creating Vulkan instance: {}", app_name);

        // Platform surface extensions, plus debug utils for validation
        let extensions = instance_extension_names(window, enable_validation)?;

        let entry = unsafe { Entry::load() }?;

        let app_name_cstr = CString::new(app_name).unwrap_or_else(|_| ENGINE_NAME.to_owned());
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let layers: Vec<&CStr> = if enable_validation {
            vec![VALIDATION_LAYER]
        } else {
            vec![]
        };

        Self::check_instance_support(&entry, &extensions, &layers)?;

        let extension_names: Vec<*const c_char> = extensions.iter().map(|n| n.as_ptr()).collect();
        let layer_names: Vec<*const c_char> = layers.iter().map(|n| n.as_ptr()).collect();

        // Chained so that instance creation and destruction are validated too
        let mut debug_info = debug_messenger_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names);
        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(SetupError::InstanceCreation)?;

        Ok(Self {
            entry,
            instance,
            debug_utils: None,
            surface: None,
            physical_device: None,
            device: None,
            enable_validation,
        })
    }

    fn check_instance_support(
        entry: &Entry,
        extensions: &[&CStr],
        layers: &[&CStr],
    ) -> SetupResult<()> {
        if !layers.is_empty() {
            let available = capabilities::instance_layers(entry)?;
            let missing = capabilities::missing_names(
                layers,
                available.iter().map(|l| capabilities::property_name(&l.layer_name)),
            );
            if !missing.is_empty() {
                return Err(SetupError::ExtensionOrLayerUnavailable {
                    kind: "validation layers",
                    names: missing,
                });
            }
        }

        let available = capabilities::instance_extensions(entry)?;
        let missing = capabilities::missing_names(
            extensions,
            available.iter().map(|e| capabilities::property_name(&e.extension_name)),
        );
        if !missing.is_empty() {
            return Err(SetupError::ExtensionOrLayerUnavailable {
                kind: "instance extensions",
                names: missing,
            });
        }

        Ok(())
    }

    /// Install the validation callback; nothing to do without validation
    pub fn setup_debug_messenger(&mut self) -> SetupResult<()> {
        if !self.enable_validation {
            return Ok(());
        }

        let debug_utils = DebugUtils::new(&self.entry, &self.instance);
        let messenger =
            unsafe { debug_utils.create_debug_utils_messenger(&debug_messenger_info(), None) }
                .map_err(SetupError::DebugMessengerCreation)?;

        self.debug_utils = Some((debug_utils, messenger));
        Ok(())
    }

    pub fn create_surface(&mut self, window: &dyn PresentationWindow) -> SetupResult<()> {
        let handle = window
            .create_surface(&self.entry, &self.instance)
            .map_err(SetupError::SurfaceCreation)?;

        self.surface = Some(PresentationSurface {
            loader: khr::Surface::new(&self.entry, &self.instance),
            handle,
        });
        Ok(())
    }

    pub fn pick_physical_device(&mut self) -> SetupResult<()> {
        let surface = self.surface()?;
        let selected =
            selector::pick_physical_device(&self.instance, surface, REQUIRED_DEVICE_EXTENSIONS)?;

        self.physical_device = Some(selected);
        Ok(())
    }

    pub fn create_logical_device(&mut self) -> SetupResult<()> {
        let selected = self.physical_device()?;
        let families = selected.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (families.graphics_family, families.present_family)
        else {
            return Err(SetupError::MissingPrerequisite("queue family indices"));
        };

        let queue_infos = queue_create_infos(&families);
        let features = vk::PhysicalDeviceFeatures::default();

        let extension_names: Vec<*const c_char> =
            REQUIRED_DEVICE_EXTENSIONS.iter().map(|n| n.as_ptr()).collect();
        // Device layers are ignored by current loaders but older ones expect them
        let layer_names: Vec<*const c_char> = if self.enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        #[allow(deprecated)]
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names)
            .enabled_features(&features);

        let device = unsafe {
            self.instance
                .create_device(selected.handle, &create_info, None)
        }
        .map_err(SetupError::DeviceCreation)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        let swapchain_loader = khr::Swapchain::new(&self.instance, &device);

        log::info!(
            "Created logical device (graphics family {}, present family {})",
            graphics_family,
            present_family
        );

        self.device = Some(LogicalDevice {
            device,
            swapchain_loader,
            graphics_queue,
            present_queue,
        });
        Ok(())
    }

    pub fn surface(&self) -> SetupResult<&PresentationSurface> {
        self.surface
            .as_ref()
            .ok_or(SetupError::MissingPrerequisite("surface"))
    }

    pub fn physical_device(&self) -> SetupResult<&SelectedDevice> {
        self.physical_device
            .as_ref()
            .ok_or(SetupError::MissingPrerequisite("physical device"))
    }

    pub fn device(&self) -> SetupResult<&LogicalDevice> {
        self.device
            .as_ref()
            .ok_or(SetupError::MissingPrerequisite("logical device"))
    }

    pub fn validation_enabled(&self) -> bool {
        self.enable_validation
    }

    pub fn handles(&self) -> ContextHandles {
        ContextHandles {
            debug_messenger: self
                .debug_utils
                .as_ref()
                .map_or(vk::DebugUtilsMessengerEXT::null(), |(_, m)| *m),
            surface: self
                .surface
                .as_ref()
                .map_or(vk::SurfaceKHR::null(), |s| s.handle),
            device: self.device.is_some(),
        }
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) {
        if let Some(device) = &self.device {
            if let Err(e) = unsafe { device.device.device_wait_idle() } {
                log::warn!("device_wait_idle failed: {}", e);
            }
        }
    }

    pub(crate) fn destroy_device(&mut self) {
        if let Some(device) = self.device.take() {
            unsafe { device.device.destroy_device(None) };
        }
    }

    pub(crate) fn destroy_surface(&mut self) {
        if let Some(surface) = self.surface.take() {
            unsafe { surface.loader.destroy_surface(surface.handle, None) };
        }
    }

    pub(crate) fn destroy_debug_messenger(&mut self) {
        if let Some((debug_utils, messenger)) = self.debug_utils.take() {
            unsafe { debug_utils.destroy_debug_utils_messenger(messenger, None) };
        }
    }

    /// Destroy the instance; every child must already be gone
    pub(crate) fn destroy_instance(self) {
        unsafe { self.instance.destroy_instance(None) };
    }
}

/// Instance extensions the window needs, plus debug utils when validating
fn instance_extension_names(
    window: &dyn PresentationWindow,
    enable_validation: bool,
) -> SetupResult<Vec<&'static CStr>> {
    let mut extensions = window
        .required_extensions()
        .map_err(SetupError::CapabilityQuery)?;
    if enable_validation {
        extensions.push(DebugUtils::name());
    }
    Ok(extensions)
}

/// One queue-create request per distinct family
pub fn queue_create_infos(families: &QueueFamilyIndices) -> Vec<vk::DeviceQueueCreateInfo> {
    families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITIES)
                .build()
        })
        .collect()
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

// Debug callback for validation layers. Must never unwind into the driver.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr((*p_callback_data).p_message).to_string_lossy()
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {:?} {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {:?} {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::debug!("[Vulkan] {:?} {}", message_type, message);
        }
        _ => {
            log::trace!("[Vulkan] {:?} {}", message_type, message);
        }
    }

    vk::FALSE
}
