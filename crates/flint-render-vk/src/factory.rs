// SPDX-License-Identifier: CEPL-1.0
//! One-shot creation of device-owned objects.
//!
//! Each function takes already-validated inputs and either returns a live
//! object or an error; nothing partially created is left behind on failure.

use crate::error::{RenderResult, VkCall};
use crate::frame::FrameSlot;
use ash::vk;

pub(crate) fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    }
}

/// Holds color writes of the subpass until the acquired image is available.
pub(crate) fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

pub(crate) fn fence_info() -> vk::FenceCreateInfo<'static> {
    vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags: vk::FenceCreateFlags::SIGNALED,
        ..Default::default()
    }
}

pub(crate) unsafe fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
) -> RenderResult<vk::RenderPass> {
    let attachment = color_attachment(format);
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        ..Default::default()
    };
    let dependency = external_dependency();

    let info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &attachment,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    unsafe { device.create_render_pass(&info, None) }.call("vkCreateRenderPass")
}

pub(crate) unsafe fn create_image_views(
    device: &ash::Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RenderResult<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());
    for &image in images {
        let info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            components: vk::ComponentMapping::default(),
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        match unsafe { device.create_image_view(&info, None) } {
            Ok(view) => views.push(view),
            Err(result) => {
                unsafe { destroy_image_views(device, &views) };
                return Err(result).call("vkCreateImageView");
            }
        }
    }
    Ok(views)
}

pub(crate) unsafe fn destroy_image_views(device: &ash::Device, views: &[vk::ImageView]) {
    for &view in views {
        unsafe { device.destroy_image_view(view, None) };
    }
}

pub(crate) unsafe fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> RenderResult<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(views.len());
    for view in views {
        let info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: 1,
            p_attachments: view,
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        match unsafe { device.create_framebuffer(&info, None) } {
            Ok(fb) => framebuffers.push(fb),
            Err(result) => {
                unsafe { destroy_framebuffers(device, &framebuffers) };
                return Err(result).call("vkCreateFramebuffer");
            }
        }
    }
    Ok(framebuffers)
}

pub(crate) unsafe fn destroy_framebuffers(device: &ash::Device, framebuffers: &[vk::Framebuffer]) {
    for &fb in framebuffers {
        unsafe { device.destroy_framebuffer(fb, None) };
    }
}

pub(crate) unsafe fn create_command_pool(
    device: &ash::Device,
    queue_family: u32,
) -> RenderResult<vk::CommandPool> {
    let info = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        queue_family_index: queue_family,
        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        ..Default::default()
    };
    unsafe { device.create_command_pool(&info, None) }.call("vkCreateCommandPool")
}

pub(crate) unsafe fn allocate_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: u32,
) -> RenderResult<Vec<vk::CommandBuffer>> {
    let info = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: count,
        ..Default::default()
    };
    unsafe { device.allocate_command_buffers(&info) }.call("vkAllocateCommandBuffers")
}

/// `count` frame slots, each with its own command buffer from `pool`.
/// Fences start signaled so the first wait on each slot returns at once.
pub(crate) unsafe fn create_frame_slots(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: usize,
) -> RenderResult<Vec<FrameSlot>> {
    let command_buffers = unsafe { allocate_command_buffers(device, pool, count as u32) }?;

    let sem_info = vk::SemaphoreCreateInfo::default();
    let fence_info = fence_info();
    let mut slots = Vec::with_capacity(count);

    for &command_buffer in &command_buffers {
        match unsafe { create_frame_slot(device, &sem_info, &fence_info, command_buffer) } {
            Ok(slot) => slots.push(slot),
            Err(err) => {
                unsafe {
                    destroy_frame_slots(device, &slots);
                    device.free_command_buffers(pool, &command_buffers);
                }
                return Err(err);
            }
        }
    }
    Ok(slots)
}

unsafe fn create_frame_slot(
    device: &ash::Device,
    sem_info: &vk::SemaphoreCreateInfo,
    fence_info: &vk::FenceCreateInfo,
    command_buffer: vk::CommandBuffer,
) -> RenderResult<FrameSlot> {
    let image_available =
        unsafe { device.create_semaphore(sem_info, None) }.call("vkCreateSemaphore")?;
    let render_finished = match unsafe { device.create_semaphore(sem_info, None) } {
        Ok(s) => s,
        Err(result) => {
            unsafe { device.destroy_semaphore(image_available, None) };
            return Err(result).call("vkCreateSemaphore");
        }
    };
    let in_flight = match unsafe { device.create_fence(fence_info, None) } {
        Ok(f) => f,
        Err(result) => unsafe {
            device.destroy_semaphore(image_available, None);
            device.destroy_semaphore(render_finished, None);
            return Err(result).call("vkCreateFence");
        },
    };
    Ok(FrameSlot {
        image_available,
        render_finished,
        in_flight,
        command_buffer,
    })
}

/// Command buffers are released with their pool.
pub(crate) unsafe fn destroy_frame_slots(device: &ash::Device, slots: &[FrameSlot]) {
    for slot in slots {
        unsafe {
            device.destroy_fence(slot.in_flight, None);
            device.destroy_semaphore(slot.render_finished, None);
            device.destroy_semaphore(slot.image_available, None);
        }
    }
}
