// Renderer - owns the whole setup chain
//
// `setup()` runs every stage in dependency order and stops at the first
// failure. Whatever was created up to that point stays owned here, and
// `quit()` releases exactly that, newest first.

use ash::vk;
use std::path::PathBuf;

use crate::backend::device::{ContextHandles, GraphicsContext, LogicalDevice};
use crate::backend::pipeline::{self, RenderPipelineState};
use crate::backend::shader;
use crate::backend::swapchain::{self, SwapChainState};
use crate::backend::{PresentationWindow, SetupResult};

/// Everything the setup chain needs from the outside
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub app_name: String,
    pub enable_validation: bool,
    /// Used when the surface offers it, otherwise the first mode listed
    pub preferred_present_mode: vk::PresentModeKHR,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            app_name: "gpu-bootstrap".to_string(),
            enable_validation: false,
            preferred_present_mode: vk::PresentModeKHR::MAILBOX,
            vertex_shader: PathBuf::from("shaders/triangle.vert.spv"),
            fragment_shader: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// One handle to release during teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    RenderPass(vk::RenderPass),
    ImageView(vk::ImageView),
    SwapChain(vk::SwapchainKHR),
    Device,
    Surface(vk::SurfaceKHR),
    DebugMessenger(vk::DebugUtilsMessengerEXT),
    Instance,
}

/// Reverse creation order over the handles that actually exist
pub fn teardown_plan(
    context: Option<ContextHandles>,
    swap_chain: Option<&SwapChainState>,
    pipeline: Option<&RenderPipelineState>,
) -> Vec<Release> {
    let mut plan = Vec::new();

    if let Some(state) = pipeline {
        if state.pipeline != vk::Pipeline::null() {
            plan.push(Release::Pipeline(state.pipeline));
        }
        if state.pipeline_layout != vk::PipelineLayout::null() {
            plan.push(Release::PipelineLayout(state.pipeline_layout));
        }
        if state.render_pass != vk::RenderPass::null() {
            plan.push(Release::RenderPass(state.render_pass));
        }
    }

    if let Some(state) = swap_chain {
        plan.extend(
            state
                .image_views
                .iter()
                .rev()
                .filter(|&&view| view != vk::ImageView::null())
                .map(|&view| Release::ImageView(view)),
        );
        if state.swap_chain != vk::SwapchainKHR::null() {
            plan.push(Release::SwapChain(state.swap_chain));
        }
    }

    if let Some(handles) = context {
        if handles.device {
            plan.push(Release::Device);
        }
        if handles.surface != vk::SurfaceKHR::null() {
            plan.push(Release::Surface(handles.surface));
        }
        if handles.debug_messenger != vk::DebugUtilsMessengerEXT::null() {
            plan.push(Release::DebugMessenger(handles.debug_messenger));
        }
        plan.push(Release::Instance);
    }

    plan
}

/// Run `destroy` against the logical device, if it still exists
fn destroy_device_child(
    context: &GraphicsContext,
    release: Release,
    destroy: impl FnOnce(&LogicalDevice),
) {
    match context.device() {
        Ok(device) => destroy(device),
        Err(_) => log::warn!("No device left to release {:?}", release),
    }
}

pub struct Renderer {
    settings: RendererSettings,
    context: Option<GraphicsContext>,
    swap_chain: Option<SwapChainState>,
    pipeline: Option<RenderPipelineState>,
}

impl Renderer {
    pub fn new(settings: RendererSettings) -> Self {
        Self {
            settings,
            context: None,
            swap_chain: None,
            pipeline: None,
        }
    }

    /// Bring the GPU context up to a render-ready pipeline.
    ///
    /// Any error leaves the renderer unusable for drawing; call `quit()`
    /// (or drop it) to release what was created.
    pub fn setup(&mut self, window: &dyn PresentationWindow) -> SetupResult<()> {
        // Start from scratch if called twice
        self.quit();

        self.run_setup(window).map_err(|e| {
            log::error!("Renderer setup failed: {}", e);
            e
        })
    }

    fn run_setup(&mut self, window: &dyn PresentationWindow) -> SetupResult<()> {
        log::info!("Initializing Vulkan...");

        // Shader code is read before touching the GPU
        let vertex_code = shader::load_spirv(&self.settings.vertex_shader)?;
        let fragment_code = shader::load_spirv(&self.settings.fragment_shader)?;

        // ─────────────────────────────────────────────────────────────────
        // STEP 1: Instance, debug messenger, surface, device
        // ─────────────────────────────────────────────────────────────────
        let context = self.context.insert(GraphicsContext::create_instance(
            &self.settings.app_name,
            self.settings.enable_validation,
            window,
        )?);
        context.setup_debug_messenger()?;
        context.create_surface(window)?;
        context.pick_physical_device()?;
        context.create_logical_device()?;

        // ─────────────────────────────────────────────────────────────────
        // STEP 2: Swapchain and one view per image
        // ─────────────────────────────────────────────────────────────────
        let swap_chain = self.swap_chain.insert(swapchain::create_swap_chain(
            context,
            window,
            self.settings.preferred_present_mode,
        )?);
        let device = context.device()?;
        swapchain::create_image_views(device, swap_chain)?;

        // ─────────────────────────────────────────────────────────────────
        // STEP 3: Render pass, then the pipeline that targets it
        // ─────────────────────────────────────────────────────────────────
        let state = self.pipeline.insert(RenderPipelineState::default());
        state.render_pass = pipeline::create_render_pass(&device.device, swap_chain.format)?;
        state.pipeline_layout = pipeline::create_pipeline_layout(&device.device)?;
        state.pipeline = pipeline::create_graphics_pipeline(
            &device.device,
            state.render_pass,
            state.pipeline_layout,
            &vertex_code,
            &fragment_code,
        )?;

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    /// Release every created handle, newest first. Safe to call repeatedly.
    pub fn quit(&mut self) {
        let plan = teardown_plan(
            self.context.as_ref().map(GraphicsContext::handles),
            self.swap_chain.as_ref(),
            self.pipeline.as_ref(),
        );
        if plan.is_empty() {
            return;
        }

        log::info!("Destroying Vulkan resources ({} handles)...", plan.len());

        if let Some(context) = &self.context {
            context.wait_idle();
        }

        for release in plan {
            self.release(release);
        }

        self.pipeline = None;
        self.swap_chain = None;
        self.context = None;
    }

    fn release(&mut self, release: Release) {
        let Some(context) = self.context.as_mut() else {
            return;
        };

        match release {
            Release::Pipeline(handle) => destroy_device_child(context, release, |device| unsafe {
                device.device.destroy_pipeline(handle, None)
            }),
            Release::PipelineLayout(handle) => {
                destroy_device_child(context, release, |device| unsafe {
                    device.device.destroy_pipeline_layout(handle, None)
                })
            }
            Release::RenderPass(handle) => destroy_device_child(context, release, |device| unsafe {
                device.device.destroy_render_pass(handle, None)
            }),
            Release::ImageView(handle) => destroy_device_child(context, release, |device| unsafe {
                device.device.destroy_image_view(handle, None)
            }),
            Release::SwapChain(handle) => destroy_device_child(context, release, |device| unsafe {
                device.swapchain_loader.destroy_swapchain(handle, None)
            }),
            Release::Device => context.destroy_device(),
            Release::Surface(_) => context.destroy_surface(),
            Release::DebugMessenger(_) => context.destroy_debug_messenger(),
            Release::Instance => {
                if let Some(context) = self.context.take() {
                    context.destroy_instance();
                }
            }
        }
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn context(&self) -> Option<&GraphicsContext> {
        self.context.as_ref()
    }

    pub fn swap_chain(&self) -> Option<&SwapChainState> {
        self.swap_chain.as_ref()
    }

    pub fn pipeline(&self) -> Option<&RenderPipelineState> {
        self.pipeline.as_ref()
    }

    /// Whether every stage completed
    pub fn is_ready(&self) -> bool {
        self.pipeline
            .is_some_and(|state| state.pipeline != vk::Pipeline::null())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.quit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SetupError;
    use ash::vk::Handle;

    fn context(device: bool, surface: u64, debug_messenger: u64) -> ContextHandles {
        ContextHandles {
            debug_messenger: vk::DebugUtilsMessengerEXT::from_raw(debug_messenger),
            surface: vk::SurfaceKHR::from_raw(surface),
            device,
        }
    }

    fn swap_chain(raw: u64, views: &[u64]) -> SwapChainState {
        SwapChainState {
            swap_chain: vk::SwapchainKHR::from_raw(raw),
            images: views.iter().map(|&v| vk::Image::from_raw(v + 100)).collect(),
            image_views: views.iter().map(|&v| vk::ImageView::from_raw(v)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn nothing_created_nothing_released() {
        assert!(teardown_plan(None, None, None).is_empty());
    }

    #[test]
    fn full_setup_releases_in_reverse_creation_order() {
        let swap = swap_chain(50, &[11, 12, 13]);
        let state = RenderPipelineState {
            render_pass: vk::RenderPass::from_raw(60),
            pipeline_layout: vk::PipelineLayout::from_raw(61),
            pipeline: vk::Pipeline::from_raw(62),
        };

        let plan = teardown_plan(Some(context(true, 2, 1)), Some(&swap), Some(&state));

        assert_eq!(
            plan,
            vec![
                Release::Pipeline(vk::Pipeline::from_raw(62)),
                Release::PipelineLayout(vk::PipelineLayout::from_raw(61)),
                Release::RenderPass(vk::RenderPass::from_raw(60)),
                Release::ImageView(vk::ImageView::from_raw(13)),
                Release::ImageView(vk::ImageView::from_raw(12)),
                Release::ImageView(vk::ImageView::from_raw(11)),
                Release::SwapChain(vk::SwapchainKHR::from_raw(50)),
                Release::Device,
                Release::Surface(vk::SurfaceKHR::from_raw(2)),
                Release::DebugMessenger(vk::DebugUtilsMessengerEXT::from_raw(1)),
                Release::Instance,
            ]
        );
    }

    #[test]
    fn device_created_but_no_swap_chain() {
        // Validation off, so no debug messenger either
        let plan = teardown_plan(Some(context(true, 2, 0)), None, None);

        assert_eq!(
            plan,
            vec![
                Release::Device,
                Release::Surface(vk::SurfaceKHR::from_raw(2)),
                Release::Instance,
            ]
        );
    }

    #[test]
    fn partial_views_are_released() {
        // View creation failed after two of four images
        let mut swap = swap_chain(50, &[11, 12]);
        swap.images.push(vk::Image::from_raw(113));
        swap.images.push(vk::Image::from_raw(114));

        let plan = teardown_plan(Some(context(true, 2, 0)), Some(&swap), None);

        assert_eq!(
            &plan[..3],
            &[
                Release::ImageView(vk::ImageView::from_raw(12)),
                Release::ImageView(vk::ImageView::from_raw(11)),
                Release::SwapChain(vk::SwapchainKHR::from_raw(50)),
            ]
        );
    }

    #[test]
    fn null_handles_are_skipped() {
        // Render pass made, layout creation failed
        let state = RenderPipelineState {
            render_pass: vk::RenderPass::from_raw(60),
            ..Default::default()
        };
        let swap = swap_chain(50, &[]);

        let plan = teardown_plan(Some(context(true, 2, 0)), Some(&swap), Some(&state));

        assert_eq!(plan[0], Release::RenderPass(vk::RenderPass::from_raw(60)));
        assert!(!plan.iter().any(|r| matches!(
            r,
            Release::Pipeline(_) | Release::PipelineLayout(_) | Release::ImageView(_)
        )));
    }

    #[test]
    fn instance_only() {
        let plan = teardown_plan(Some(context(false, 0, 0)), None, None);
        assert_eq!(plan, vec![Release::Instance]);
    }

    #[test]
    fn quit_without_setup_is_a_no_op() {
        let mut renderer = Renderer::new(RendererSettings::default());

        renderer.quit();
        renderer.quit();

        assert!(renderer.context().is_none());
        assert!(!renderer.is_ready());
    }

    #[test]
    fn missing_shader_fails_before_any_gpu_call() {
        struct NoWindow;

        impl PresentationWindow for NoWindow {
            fn required_extensions(&self) -> ash::prelude::VkResult<Vec<&'static std::ffi::CStr>> {
                panic!("instance creation must not start");
            }

            fn create_surface(
                &self,
                _entry: &ash::Entry,
                _instance: &ash::Instance,
            ) -> ash::prelude::VkResult<vk::SurfaceKHR> {
                panic!("surface creation must not start");
            }

            fn framebuffer_size(&self) -> (u32, u32) {
                (0, 0)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut renderer = Renderer::new(RendererSettings {
            vertex_shader: dir.path().join("missing.vert.spv"),
            fragment_shader: dir.path().join("missing.frag.spv"),
            ..Default::default()
        });

        let result = renderer.setup(&NoWindow);

        assert!(matches!(result, Err(SetupError::ShaderLoad { .. })));
        assert!(renderer.context().is_none());
        assert!(renderer.swap_chain().is_none());
    }

    #[test]
    fn default_settings_prefer_mailbox() {
        let settings = RendererSettings::default();
        assert_eq!(settings.preferred_present_mode, vk::PresentModeKHR::MAILBOX);
        assert!(!settings.enable_validation);
    }
}
