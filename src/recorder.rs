use vulkanalia::vk;

use crate::device::RenderDevice;
use crate::error::{RenderError, RenderResult};

/// Inputs for one frame's command stream. Nothing is carried over between
/// frames; the buffer is rebuilt from these alone.
#[derive(Clone, Copy, Debug)]
pub struct RecordInputs {
    pub command_buffer: vk::CommandBuffer,
    pub pipeline: vk::Pipeline,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub vertex_buffer: vk::Buffer,
    pub vertex_count: u32,
    pub clear_color: [f32; 4],
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CommandRecorder;

impl CommandRecorder {
    pub fn record<D>(&self, device: &D, inputs: &RecordInputs) -> RenderResult<()>
    where
        D: RenderDevice + ?Sized,
    {
        let command_buffer = inputs.command_buffer;

        device
            .reset_command_buffer(command_buffer)
            .map_err(|e| RenderError::vulkan("reset command buffer", e))?;
        device
            .begin_command_buffer(command_buffer)
            .map_err(|e| RenderError::vulkan("begin command buffer", e))?;

        device.cmd_begin_render_pass(
            command_buffer,
            inputs.render_pass,
            inputs.framebuffer,
            scissor_for(inputs.extent),
            inputs.clear_color,
        );
        device.cmd_bind_pipeline(command_buffer, inputs.pipeline);

        // Viewport and scissor are dynamic state so a new extent never forces
        // a pipeline rebuild.
        device.cmd_set_viewport(command_buffer, viewport_for(inputs.extent));
        device.cmd_set_scissor(command_buffer, scissor_for(inputs.extent));

        device.cmd_bind_vertex_buffer(command_buffer, 0, inputs.vertex_buffer, 0);
        device.cmd_draw(command_buffer, inputs.vertex_count, 1);
        device.cmd_end_render_pass(command_buffer);

        device
            .end_command_buffer(command_buffer)
            .map_err(|e| RenderError::vulkan("end command buffer", e))
    }
}

pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}
