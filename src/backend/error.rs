// Setup errors
//
// Every step of the bring-up chain maps its failure to one variant here.
// None of them are retried: the caller treats any of them as "GPU context
// unusable".

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

use super::shader::ShaderStage;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("failed to load Vulkan library: {0}")]
    LibraryLoad(#[from] ash::LoadingError),

    #[error("required {kind} not available: {}", .names.join(", "))]
    ExtensionOrLayerUnavailable { kind: &'static str, names: Vec<String> },

    #[error("failed to create Vulkan instance: {0}")]
    InstanceCreation(vk::Result),

    #[error("failed to set up debug messenger: {0}")]
    DebugMessengerCreation(vk::Result),

    #[error("failed to create window surface: {0}")]
    SurfaceCreation(vk::Result),

    #[error("capability query failed: {0}")]
    CapabilityQuery(vk::Result),

    #[error("failed to find a suitable GPU")]
    NoSuitableDevice,

    #[error("failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    /// The surface offers nothing to pick from for this setting
    #[error("surface reports no supported {0}")]
    SurfaceUnsupported(&'static str),

    #[error("failed to create swap chain: {0}")]
    SwapChainCreation(vk::Result),

    #[error("failed to create image view: {0}")]
    ImageViewCreation(vk::Result),

    #[error("failed to create render pass: {0}")]
    RenderPassCreation(vk::Result),

    #[error("failed to load shader {}: {source}", .path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create {stage} shader module: {result}")]
    ShaderModuleCreation { stage: ShaderStage, result: vk::Result },

    #[error("failed to create pipeline layout: {0}")]
    PipelineLayoutCreation(vk::Result),

    #[error("failed to create graphics pipeline: {0}")]
    PipelineCreation(vk::Result),

    /// A step ran before the step it depends on
    #[error("{0} has not been created yet")]
    MissingPrerequisite(&'static str),
}

pub type SetupResult<T> = Result<T, SetupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_names_are_listed() {
        let err = SetupError::ExtensionOrLayerUnavailable {
            kind: "validation layers",
            names: vec!["VK_LAYER_KHRONOS_validation".into(), "VK_LAYER_other".into()],
        };
        assert_eq!(
            err.to_string(),
            "required validation layers not available: VK_LAYER_KHRONOS_validation, VK_LAYER_other"
        );
    }

    #[test]
    fn shader_stage_appears_in_message() {
        let err = SetupError::ShaderModuleCreation {
            stage: ShaderStage::Fragment,
            result: vk::Result::ERROR_INVALID_SHADER_NV,
        };
        assert!(err.to_string().starts_with("failed to create fragment shader module"));
    }
}
