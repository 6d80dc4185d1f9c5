// SPDX-License-Identifier: CEPL-1.0
//! Device-local vertex/index buffers for the single mesh, filled through a
//! staging copy on the transfer queue.

use crate::device::DeviceContext;
use crate::error::{RenderResult, VkCall, VkError};
use ash::vk;
use flint_render::Mesh;
use tracing::debug;

pub(crate) fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    (0..props.memory_type_count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize].property_flags.contains(flags)
        })
        .ok_or(VkError::NoMemoryType { type_bits, flags })
}

/// A buffer and the allocation bound to it.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BoundBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
}

impl BoundBuffer {
    /// Buffers shared by more than one family use concurrent sharing.
    pub(crate) unsafe fn create(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
        families: &[u32],
    ) -> RenderResult<Self> {
        let device = &ctx.device;
        let (sharing_mode, family_count, p_families) = if families.len() > 1 {
            (
                vk::SharingMode::CONCURRENT,
                families.len() as u32,
                families.as_ptr(),
            )
        } else {
            (vk::SharingMode::EXCLUSIVE, 0, std::ptr::null())
        };
        let info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode,
            queue_family_index_count: family_count,
            p_queue_family_indices: p_families,
            ..Default::default()
        };
        let buffer = unsafe { device.create_buffer(&info, None) }.call("vkCreateBuffer")?;

        let bound = unsafe { allocate_and_bind(ctx, buffer, flags) };

        match bound {
            Ok(memory) => Ok(Self { buffer, memory }),
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                Err(err)
            }
        }
    }

    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

unsafe fn allocate_and_bind(
    ctx: &DeviceContext,
    buffer: vk::Buffer,
    flags: vk::MemoryPropertyFlags,
) -> RenderResult<vk::DeviceMemory> {
    let device = &ctx.device;
    let req = unsafe { device.get_buffer_memory_requirements(buffer) };
    let alloc = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: find_memory_type(&ctx.memory, req.memory_type_bits, flags)?,
        ..Default::default()
    };
    let memory = unsafe { device.allocate_memory(&alloc, None) }.call("vkAllocateMemory")?;
    if let Err(result) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
        unsafe { device.free_memory(memory, None) };
        return Err(result).call("vkBindBufferMemory");
    }
    Ok(memory)
}

/// The uploaded Draw Request.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct MeshBuffers {
    pub vertices: BoundBuffer,
    pub indices: BoundBuffer,
    pub index_count: u32,
}

impl MeshBuffers {
    /// # Safety
    /// `transfer_pool` must belong to `ctx.transfer.family`.
    pub(crate) unsafe fn upload(
        ctx: &DeviceContext,
        transfer_pool: vk::CommandPool,
        mesh: &Mesh,
    ) -> RenderResult<Self> {
        if mesh.is_empty() {
            return Err(VkError::EmptyMesh);
        }

        let vertices = unsafe {
            upload_device_local(
                ctx,
                transfer_pool,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                mesh.vertex_bytes(),
            )
        }?;
        let indices = match unsafe {
            upload_device_local(
                ctx,
                transfer_pool,
                vk::BufferUsageFlags::INDEX_BUFFER,
                mesh.index_bytes(),
            )
        } {
            Ok(b) => b,
            Err(err) => {
                unsafe { vertices.destroy(&ctx.device) };
                return Err(err);
            }
        };

        debug!(
            "mesh uploaded: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(Self {
            vertices,
            indices,
            index_count: mesh.index_count(),
        })
    }

    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            self.vertices.destroy(device);
            self.indices.destroy(device);
        }
    }
}

/// Device-local buffer readable by the graphics family and writable by the
/// transfer family, filled from `data`.
unsafe fn upload_device_local(
    ctx: &DeviceContext,
    transfer_pool: vk::CommandPool,
    usage: vk::BufferUsageFlags,
    data: &[u8],
) -> RenderResult<BoundBuffer> {
    let families = [ctx.graphics.family, ctx.transfer.family];
    let dst = unsafe {
        BoundBuffer::create(
            ctx,
            data.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            &families,
        )
    }?;
    match unsafe { upload_via_staging(ctx, transfer_pool, dst.buffer, data) } {
        Ok(()) => Ok(dst),
        Err(err) => {
            unsafe { dst.destroy(&ctx.device) };
            Err(err)
        }
    }
}

/// One-shot staging upload: host -> staging -> `dst`, on the transfer queue.
/// Waits for the queue to go idle before returning.
unsafe fn upload_via_staging(
    ctx: &DeviceContext,
    transfer_pool: vk::CommandPool,
    dst: vk::Buffer,
    data: &[u8],
) -> RenderResult<()> {
    let device = &ctx.device;
    let size = data.len() as vk::DeviceSize;

    // 1) staging buffer (HOST_VISIBLE|COHERENT)
    let staging = unsafe {
        BoundBuffer::create(
            ctx,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &[ctx.transfer.family],
        )
    }?;

    let result = unsafe { copy_through(ctx, transfer_pool, staging, dst, data) };

    // 4) staging is released whether or not the copy went through
    unsafe { staging.destroy(device) };
    result
}

unsafe fn copy_through(
    ctx: &DeviceContext,
    transfer_pool: vk::CommandPool,
    staging: BoundBuffer,
    dst: vk::Buffer,
    data: &[u8],
) -> RenderResult<()> {
    let device = &ctx.device;
    let size = data.len() as vk::DeviceSize;

    unsafe {
        let ptr = device
            .map_memory(staging.memory, 0, size, vk::MemoryMapFlags::empty())
            .call("vkMapMemory")?;
        std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
        device.unmap_memory(staging.memory);
    }

    // 2) one-time copy command
    let ai = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: transfer_pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: 1,
        ..Default::default()
    };
    let cmd = unsafe { device.allocate_command_buffers(&ai) }.call("vkAllocateCommandBuffers")?[0];

    let submitted = unsafe { record_and_submit_copy(ctx, cmd, staging.buffer, dst, size) };

    unsafe { device.free_command_buffers(transfer_pool, std::slice::from_ref(&cmd)) };
    submitted
}

unsafe fn record_and_submit_copy(
    ctx: &DeviceContext,
    cmd: vk::CommandBuffer,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> RenderResult<()> {
    let device = &ctx.device;
    let bi = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ..Default::default()
    };
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    };
    let si = vk::SubmitInfo {
        s_type: vk::StructureType::SUBMIT_INFO,
        command_buffer_count: 1,
        p_command_buffers: &cmd,
        ..Default::default()
    };
    unsafe {
        device
            .begin_command_buffer(cmd, &bi)
            .call("vkBeginCommandBuffer")?;
        device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
        device.end_command_buffer(cmd).call("vkEndCommandBuffer")?;

        // 3) submit and wait
        device
            .queue_submit(ctx.transfer.queue, std::slice::from_ref(&si), vk::Fence::null())
            .call("vkQueueSubmit")?;
        device
            .queue_wait_idle(ctx.transfer.queue)
            .call("vkQueueWaitIdle")
    }
}
