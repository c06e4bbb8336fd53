// Render pass and graphics pipeline
//
// One color attachment, one subpass, and a pipeline with no vertex input
// (the vertex shader generates its own geometry). Viewport and scissor are
// dynamic so the pipeline does not bake in the swapchain extent.

use ash::vk;

use super::error::{SetupError, SetupResult};
use super::shader::{ShaderModule, ShaderStage};

pub const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Render pass, layout and pipeline; null until created
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderPipelineState {
    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

/// The swapchain image: cleared on load, kept for presentation
fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

/// Create a render pass for basic color attachment rendering
pub fn create_render_pass(device: &ash::Device, format: vk::Format) -> SetupResult<vk::RenderPass> {
    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    let attachments = &[color_attachment(format)];
    let subpasses = &[subpass];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses);

    let render_pass = unsafe { device.create_render_pass(&render_pass_info, None) }
        .map_err(SetupError::RenderPassCreation)?;

    log::info!("Created render pass ({:?})", format);
    Ok(render_pass)
}

/// Empty layout: no descriptor sets, no push constants
pub fn create_pipeline_layout(device: &ash::Device) -> SetupResult<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::builder();

    unsafe { device.create_pipeline_layout(&layout_info, None) }
        .map_err(SetupError::PipelineLayoutCreation)
}

fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
        .build()
}

/// Opaque overwrite: blending off, all channels written
fn color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build()
}

/// Create the graphics pipeline from vertex and fragment SPIR-V
///
/// Both shader modules are released before this returns, whether or not
/// the pipeline was created.
pub fn create_graphics_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    vertex_code: &[u32],
    fragment_code: &[u32],
) -> SetupResult<vk::Pipeline> {
    let vert_shader = ShaderModule::new(device, ShaderStage::Vertex, vertex_code)?;
    let frag_shader = ShaderModule::new(device, ShaderStage::Fragment, fragment_code)?;

    let shader_stages = &[vert_shader.stage_info(), frag_shader.stage_info()];

    // Geometry comes from the vertex shader
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Counts only; the actual viewport and scissor are set when drawing
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let rasterizer = rasterization_state();

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let color_blend_attachments = &[color_blend_attachment()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(color_blend_attachments)
        .blend_constants([0.0; 4]);

    let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(pipeline_layout)
        .render_pass(render_pass)
        .subpass(0)
        .base_pipeline_handle(vk::Pipeline::null())
        .build();

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| SetupError::PipelineCreation(e))?;

    log::info!("Created graphics pipeline");
    pipelines
        .first()
        .copied()
        .ok_or(SetupError::PipelineCreation(vk::Result::ERROR_UNKNOWN))
}
