// Backend module - Vulkan setup chain
//
// Design: Thin wrapper around ash, one module per setup stage
// Order: instance -> surface -> device -> swapchain -> render pass -> pipeline

pub mod capabilities;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod selector;
pub mod shader;
pub mod surface;
pub mod swapchain;

pub use capabilities::{QueueFamilyIndices, SwapChainSupport};
pub use device::{GraphicsContext, LogicalDevice};
pub use error::{SetupError, SetupResult};
pub use pipeline::RenderPipelineState;
pub use surface::PresentationWindow;
pub use swapchain::SwapChainState;
