// SPDX-License-Identifier: CEPL-1.0
use crate::error::{RenderResult, VkCall};
use crate::mesh::MeshBuffers;
use ash::vk;

pub(crate) const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Where one frame's draw lands.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DrawTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
}

pub(crate) fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub(crate) fn full_area(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// One render pass, one pipeline, one indexed draw.
///
/// # Safety
/// `cmd` must be in the initial state and not in use by the GPU.
pub(crate) unsafe fn record_draw(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    target: &DrawTarget,
    mesh: &MeshBuffers,
) -> RenderResult<()> {
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ..Default::default()
    };
    let clear = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: CLEAR_COLOR,
        },
    };
    let pass = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: target.render_pass,
        framebuffer: target.framebuffer,
        render_area: full_area(target.extent),
        clear_value_count: 1,
        p_clear_values: &clear,
        ..Default::default()
    };
    let viewport = full_viewport(target.extent);
    let scissor = full_area(target.extent);

    unsafe {
        device
            .begin_command_buffer(cmd, &begin)
            .call("vkBeginCommandBuffer")?;
        device.cmd_begin_render_pass(cmd, &pass, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
        device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
        device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));
        device.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertices.buffer], &[0]);
        device.cmd_bind_index_buffer(cmd, mesh.indices.buffer, 0, vk::IndexType::UINT32);
        device.cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);
        device.cmd_end_render_pass(cmd);
        device.end_command_buffer(cmd).call("vkEndCommandBuffer")
    }
}
