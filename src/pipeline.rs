//! Render pass and graphics pipeline. Both are created once and outlive every
//! swapchain generation: neither depends on the surface extent.

use anyhow::{anyhow, Result};
use vulkanalia::prelude::v1_3::*;

use crate::context::VulkanContext;
use crate::teardown::DeviceObject;
use crate::vertex::Vertex;

const VERTEX_SHADER: &str = include_str!("../shaders/triangle.vert");
const FRAGMENT_SHADER: &str = include_str!("../shaders/triangle.frag");

pub fn create_render_pass(ctx: &mut VulkanContext, format: vk::Format) -> Result<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments);

    // The layout transition must wait until the acquire semaphore has been
    // waited on, which happens at color attachment output.
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    let attachments = &[color_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];
    let info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    let render_pass = unsafe { ctx.device().create_render_pass(&info, None)? };
    ctx.register(DeviceObject::RenderPass(render_pass));
    log::debug!("Created render pass for {format:?}.");
    Ok(render_pass)
}

pub fn create_pipeline(ctx: &mut VulkanContext, render_pass: vk::RenderPass) -> Result<vk::Pipeline> {
    let compiler = shaderc::Compiler::new()
        .map_err(|e| anyhow!("Failed to create shader compiler: {}", e))?;

    let vert_compiled = compiler
        .compile_into_spirv(
            VERTEX_SHADER,
            shaderc::ShaderKind::Vertex,
            "triangle.vert",
            "main",
            None,
        )
        .map_err(|e| anyhow!("Failed to compile vertex shader: {}", e))?;

    let frag_compiled = compiler
        .compile_into_spirv(
            FRAGMENT_SHADER,
            shaderc::ShaderKind::Fragment,
            "triangle.frag",
            "main",
            None,
        )
        .map_err(|e| anyhow!("Failed to compile fragment shader: {}", e))?;

    let vert_shader_module = create_shader_module(ctx.device(), vert_compiled.as_binary())?;
    let frag_shader_module = match create_shader_module(ctx.device(), frag_compiled.as_binary()) {
        Ok(module) => module,
        Err(error) => {
            unsafe { ctx.device().destroy_shader_module(vert_shader_module, None) };
            return Err(error);
        }
    };

    let built = build_pipeline(ctx, render_pass, vert_shader_module, frag_shader_module);

    unsafe {
        ctx.device().destroy_shader_module(vert_shader_module, None);
        ctx.device().destroy_shader_module(frag_shader_module, None);
    }

    let (layout, pipeline) = built?;
    ctx.register(DeviceObject::PipelineLayout(layout));
    ctx.register(DeviceObject::Pipeline(pipeline));
    log::info!("Created graphics pipeline.");
    Ok(pipeline)
}

fn build_pipeline(
    ctx: &VulkanContext,
    render_pass: vk::RenderPass,
    vert_shader_module: vk::ShaderModule,
    frag_shader_module: vk::ShaderModule,
) -> Result<(vk::PipelineLayout, vk::Pipeline)> {
    let device = ctx.device();

    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_shader_module)
        .name(b"main\0");

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_shader_module)
        .name(b"main\0");

    let binding_descriptions = &[Vertex::binding_description()];
    let attribute_descriptions = &Vertex::attribute_descriptions();
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(binding_descriptions)
        .vertex_attribute_descriptions(attribute_descriptions);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Counts only; the values are set per frame.
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::_1);

    let attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::all())
        .blend_enable(false);

    let attachments = &[attachment];
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(attachments)
        .blend_constants([0.0, 0.0, 0.0, 0.0]);

    let dynamic_states = &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(dynamic_states);

    let layout_info = vk::PipelineLayoutCreateInfo::builder();
    let layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

    let stages = &[vert_stage, frag_stage];
    let info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    match unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None) } {
        Ok((pipelines, _)) => Ok((layout, pipelines[0])),
        Err(error) => {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            Err(error.into())
        }
    }
}

fn create_shader_module(device: &Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::builder()
        .code_size(std::mem::size_of_val(code))
        .code(code);

    Ok(unsafe { device.create_shader_module(&info, None)? })
}
