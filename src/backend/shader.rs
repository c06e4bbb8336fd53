// Shader module loading and management
//
// Vulkan uses SPIR-V bytecode for shaders. Code is read whole from disk
// into 32-bit words; modules only live as long as pipeline creation needs
// them and are destroyed when the guard drops.

use ash::vk;
use std::ffi::CStr;
use std::fmt;
use std::fs::File;
use std::path::Path;

use super::error::{SetupError, SetupResult};

/// Entry point every stage is compiled with
pub const SHADER_ENTRY_POINT: &CStr = c"main";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Read a SPIR-V binary into words. Handles either byte order.
pub fn load_spirv<P: AsRef<Path>>(path: P) -> SetupResult<Vec<u32>> {
    let path = path.as_ref();
    let load_error = |source| SetupError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(load_error)?;
    let code = ash::util::read_spv(&mut file).map_err(load_error)?;

    log::debug!("Loaded {} SPIR-V words from {:?}", code.len(), path);
    Ok(code)
}

/// Shader module destroyed on drop
pub struct ShaderModule<'a> {
    device: &'a ash::Device,
    handle: vk::ShaderModule,
    stage: ShaderStage,
}

impl<'a> ShaderModule<'a> {
    pub fn new(device: &'a ash::Device, stage: ShaderStage, code: &[u32]) -> SetupResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

        let handle = unsafe { device.create_shader_module(&create_info, None) }
            .map_err(|result| SetupError::ShaderModuleCreation { stage, result })?;

        Ok(Self {
            device,
            handle,
            stage,
        })
    }

    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage.flags())
            .module(self.handle)
            .name(SHADER_ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.handle, None) };
    }
}
