//! Vulkan bring-up: instance, device, swapchain, render pass and pipeline.
//!
//! The [`Renderer`] runs the setup chain against any window implementing
//! [`backend::PresentationWindow`] and releases everything in `quit()`.

pub mod backend;
pub mod config;
pub mod renderer;

pub use renderer::{Renderer, RendererSettings};
