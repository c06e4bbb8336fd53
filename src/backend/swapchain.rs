// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Format, present mode, extent and image count are negotiated against
// what the surface reports for the selected device.

use ash::prelude::VkResult;
use ash::vk;

use super::capabilities::{self, QueueFamilyIndices, SwapChainSupport};
use super::device::{GraphicsContext, LogicalDevice};
use super::error::{SetupError, SetupResult};
use super::surface::PresentationWindow;

/// 8-bit BGRA in sRGB, the format we ask for first
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Swapchain handle plus its images and one view per image
///
/// The handles are destroyed by the Renderer's teardown, not on drop.
#[derive(Debug, Clone, Default)]
pub struct SwapChainState {
    pub swap_chain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
}

/// Preferred sRGB format if offered, otherwise whatever comes first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first())
        .copied()
}

/// Preferred mode if offered, otherwise whatever comes first
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> Option<vk::PresentModeKHR> {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == preferred)
        .or_else(|| present_modes.first().copied())
}

/// Format and present mode together; an empty list on either side fails
pub fn choose_surface_settings(
    support: &SwapChainSupport,
    preferred_present_mode: vk::PresentModeKHR,
) -> SetupResult<(vk::SurfaceFormatKHR, vk::PresentModeKHR)> {
    let surface_format = choose_surface_format(&support.formats)
        .ok_or(SetupError::SurfaceUnsupported("surface formats"))?;
    let present_mode = choose_present_mode(&support.present_modes, preferred_present_mode)
        .ok_or(SetupError::SurfaceUnsupported("present modes"))?;
    Ok((surface_format, present_mode))
}

/// Current extent when the surface defines one, else the framebuffer size
/// clamped into the surface limits
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: framebuffer_size.0.max(min.width).min(max.width),
        height: framebuffer_size.1.max(min.height).min(max.height),
    }
}

/// One more than the minimum; a zero maximum means unbounded
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        image_count
    }
}

/// Concurrent sharing only when graphics and present use different families
pub fn choose_sharing_mode(families: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, families.unique())
    }
}

/// Create the swapchain and fetch its images. Views are made separately by
/// `create_image_views` so that a failure part way leaves the finished
/// views recorded for teardown.
pub fn create_swap_chain(
    context: &GraphicsContext,
    window: &dyn PresentationWindow,
    preferred_present_mode: vk::PresentModeKHR,
) -> SetupResult<SwapChainState> {
    let surface = context.surface()?;
    let selected = context.physical_device()?;
    let device = context.device()?;

    let support = capabilities::swap_chain_support(surface, selected.handle)?;
    let caps = &support.capabilities;

    let (surface_format, present_mode) = choose_surface_settings(&support, preferred_present_mode)?;
    let extent = choose_extent(caps, window.framebuffer_size());
    let image_count = choose_image_count(caps);
    let (sharing_mode, family_indices) = choose_sharing_mode(&selected.queue_families);

    log::info!(
        "Creating swapchain: {}x{} {:?} {:?}, {} images requested",
        extent.width,
        extent.height,
        surface_format.format,
        present_mode,
        image_count
    );

    let create_info = vk::SwapchainCreateInfoKHR::builder()
        .surface(surface.handle)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(&family_indices)
        .pre_transform(caps.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(vk::SwapchainKHR::null());

    let swap_chain = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }
        .map_err(SetupError::SwapChainCreation)?;

    let mut state = SwapChainState {
        swap_chain,
        images: Vec::new(),
        image_views: Vec::new(),
        format: surface_format.format,
        color_space: surface_format.color_space,
        present_mode,
        extent,
    };

    // The driver may hand back more images than requested
    state.images = match unsafe { device.swapchain_loader.get_swapchain_images(swap_chain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { device.swapchain_loader.destroy_swapchain(swap_chain, None) };
            return Err(SetupError::SwapChainCreation(e));
        }
    };

    log::info!("Created swapchain with {} images", state.images.len());
    Ok(state)
}

/// One 2-D color view per swapchain image
pub fn create_image_views(device: &LogicalDevice, state: &mut SwapChainState) -> SetupResult<()> {
    let SwapChainState {
        images,
        image_views,
        format,
        ..
    } = state;

    fill_image_views(images, image_views, |image| {
        let create_info = image_view_info(image, *format);
        unsafe { device.device.create_image_view(&create_info, None) }
    })
}

/// Push a view for every image, stopping at the first failure. Views made
/// before the failure stay in `views`.
fn fill_image_views<F>(
    images: &[vk::Image],
    views: &mut Vec<vk::ImageView>,
    mut create_view: F,
) -> SetupResult<()>
where
    F: FnMut(vk::Image) -> VkResult<vk::ImageView>,
{
    views.reserve(images.len());
    for &image in images {
        let view = create_view(image).map_err(SetupError::ImageViewCreation)?;
        views.push(view);
    }
    Ok(())
}

fn image_view_info(image: vk::Image, format: vk::Format) -> vk::ImageViewCreateInfo {
    vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
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
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn caps(min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 48,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        }
    }

    #[test]
    fn preferred_format_found_anywhere() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            PREFERRED_SURFACE_FORMAT,
        ];

        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn format_falls_back_to_first() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            // Right format, wrong color space
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];

        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_prefers_requested() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];

        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            Some(vk::PresentModeKHR::MAILBOX)
        );
        assert_eq!(
            choose_present_mode(&modes[..2], vk::PresentModeKHR::MAILBOX),
            Some(vk::PresentModeKHR::FIFO)
        );
        assert_eq!(choose_present_mode(&[], vk::PresentModeKHR::MAILBOX), None);
    }

    #[test]
    fn empty_surface_lists_name_what_is_missing() {
        let mut support = SwapChainSupport {
            present_modes: vec![vk::PresentModeKHR::FIFO],
            ..Default::default()
        };
        assert!(matches!(
            choose_surface_settings(&support, vk::PresentModeKHR::MAILBOX),
            Err(SetupError::SurfaceUnsupported("surface formats"))
        ));

        support.formats.push(PREFERRED_SURFACE_FORMAT);
        support.present_modes.clear();
        let err = choose_surface_settings(&support, vk::PresentModeKHR::MAILBOX).unwrap_err();
        assert_eq!(err.to_string(), "surface reports no supported present modes");

        support.present_modes.push(vk::PresentModeKHR::FIFO);
        let (format, mode) = choose_surface_settings(&support, vk::PresentModeKHR::MAILBOX).unwrap();
        assert_eq!(format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(mode, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn defined_current_extent_is_used_as_is() {
        let mut capabilities = caps(2, 3);
        capabilities.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };

        let extent = choose_extent(&capabilities, (4000, 10));

        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn undefined_extent_is_clamped() {
        let capabilities = caps(2, 3);

        for size in [(0, 0), (10, 5000), (5000, 10), (640, 480), (u32::MAX - 1, 1)] {
            let extent = choose_extent(&capabilities, size);

            assert!((64..=1920).contains(&extent.width), "{:?} -> {:?}", size, extent);
            assert!((48..=1080).contains(&extent.height), "{:?} -> {:?}", size, extent);
        }

        let extent = choose_extent(&capabilities, (640, 480));
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
        // Zero max means no limit
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(16, 0)), 17);
    }

    #[test]
    fn sharing_mode_follows_families() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(choose_sharing_mode(&shared), (vk::SharingMode::EXCLUSIVE, vec![]));

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(
            choose_sharing_mode(&split),
            (vk::SharingMode::CONCURRENT, vec![0, 2])
        );
    }

    #[test]
    fn one_view_per_image_across_counts() {
        // min..=max, the clamped case, and an unbounded maximum
        let cases = [caps(1, 4), caps(2, 3), caps(3, 3), caps(2, 0), caps(6, 0)];

        for capabilities in cases {
            let requested = choose_image_count(&capabilities);
            // Drivers may return more than requested
            for returned in [requested, requested + 2] {
                let images: Vec<vk::Image> =
                    (1..=returned as u64).map(vk::Image::from_raw).collect();
                let mut views = Vec::new();
                let mut next = 100;

                fill_image_views(&images, &mut views, |_| {
                    next += 1;
                    Ok(vk::ImageView::from_raw(next))
                })
                .unwrap();

                assert_eq!(views.len(), images.len());
            }
        }
    }

    #[test]
    fn views_follow_image_order() {
        let images: Vec<vk::Image> = (1..=3).map(vk::Image::from_raw).collect();
        let mut views = Vec::new();

        fill_image_views(&images, &mut views, |image| {
            Ok(vk::ImageView::from_raw(image.as_raw() + 10))
        })
        .unwrap();

        let raw: Vec<u64> = views.iter().map(|v| v.as_raw()).collect();
        assert_eq!(raw, vec![11, 12, 13]);
    }

    #[test]
    fn failed_view_keeps_earlier_views() {
        let images: Vec<vk::Image> = (1..=4).map(vk::Image::from_raw).collect();
        let mut views = Vec::new();

        let result = fill_image_views(&images, &mut views, |image| {
            if image.as_raw() == 3 {
                Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            } else {
                Ok(vk::ImageView::from_raw(image.as_raw()))
            }
        });

        assert!(matches!(
            result,
            Err(SetupError::ImageViewCreation(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
        ));
        assert_eq!(views.len(), 2);
    }

    #[test]
    fn view_info_is_identity_color_2d() {
        let info = image_view_info(vk::Image::from_raw(7), vk::Format::B8G8R8A8_SRGB);

        assert_eq!(info.view_type, vk::ImageViewType::TYPE_2D);
        assert_eq!(info.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(info.components.r, vk::ComponentSwizzle::IDENTITY);
        assert_eq!(info.components.a, vk::ComponentSwizzle::IDENTITY);
        assert_eq!(info.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(info.subresource_range.level_count, 1);
        assert_eq!(info.subresource_range.layer_count, 1);
    }
}
