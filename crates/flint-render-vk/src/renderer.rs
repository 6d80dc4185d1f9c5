// SPDX-License-Identifier: CEPL-1.0
use crate::device::DeviceContext;
use crate::error::{RenderResult, VkCall};
use crate::factory;
use crate::frame::{
    Acquired, FrameOps, FrameScheduler, FrameSlot, Presented, FRAMES_IN_FLIGHT,
};
use crate::instance::InstanceContext;
use crate::mesh::MeshBuffers;
use crate::pipeline;
use crate::present::{
    recreate_presentation, ChainSummary, PresentationChain, PresentationOps, Recreation,
};
use crate::probe::{select_physical_device, SurfaceQuery};
use crate::record::{record_draw, DrawTarget};
use crate::support::{format_name, ChainPlan, SwapchainSupport};
use anyhow::{Context, Result};
use ash::khr::swapchain;
use ash::vk;
use flint_render::{
    FrameOutcome, Mesh, RenderSize, Renderer, RendererDesc, ShaderSet, WindowSystem,
};
use tracing::{debug, info};

/// Every Vulkan object the renderer owns.
///
/// Handles that have not been created yet are null, and destroying a null
/// handle is a no-op, so `Drop` is correct at any point after the device
/// exists.
pub(crate) struct RenderCore {
    inst: InstanceContext,
    ctx: DeviceContext,
    swapchain_loader: swapchain::Device,
    support: SwapchainSupport,

    // Format the render pass and pipeline were built for.
    pass_format: vk::Format,
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    shaders: ShaderSet,

    chain: PresentationChain,

    graphics_pool: vk::CommandPool,
    transfer_pool: vk::CommandPool,
    slots: Vec<FrameSlot>,

    mesh: MeshBuffers,
}

impl RenderCore {
    // STRICT ORDER:
    // 1) Instance, debug messenger, surface
    // 2) Physical device probed against the surface, then the logical device
    // 3) Render pass + pipeline for the chosen surface format
    // 4) Presentation chain (swapchain, views, framebuffers)
    // 5) Command pools, frame slots, mesh upload
    pub(crate) unsafe fn new(window: &dyn WindowSystem, desc: &RendererDesc) -> RenderResult<Self> {
        let mut inst = unsafe { InstanceContext::new(window, &desc.app_name, desc.validation) }?;

        let (ctx, support) = match unsafe { open_device(&inst) } {
            Ok(opened) => opened,
            Err(err) => {
                unsafe { inst.destroy() };
                return Err(err);
            }
        };
        let swapchain_loader = swapchain::Device::new(&inst.instance, &ctx.device);

        let mut core = Self {
            inst,
            ctx,
            swapchain_loader,
            support,
            pass_format: vk::Format::UNDEFINED,
            render_pass: vk::RenderPass::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            shaders: desc.shaders.clone(),
            chain: PresentationChain::default(),
            graphics_pool: vk::CommandPool::null(),
            transfer_pool: vk::CommandPool::null(),
            slots: Vec::new(),
            mesh: MeshBuffers::default(),
        };
        // On failure `core` drops here and releases what was built.
        unsafe { core.build(window.framebuffer_size(), &desc.mesh) }?;
        Ok(core)
    }

    unsafe fn build(&mut self, window: RenderSize, mesh: &Mesh) -> RenderResult<()> {
        let plan = ChainPlan::from_support(&self.support, window)?;
        let device = &self.ctx.device;
        unsafe {
            self.render_pass = factory::create_render_pass(device, plan.format.format)?;
            self.pass_format = plan.format.format;
            self.pipeline_layout = pipeline::create_pipeline_layout(device)?;
            self.pipeline = pipeline::create_pipeline(
                device,
                self.render_pass,
                self.pipeline_layout,
                &self.shaders,
            )?;

            self.chain = PresentationChain::init(
                device,
                &self.swapchain_loader,
                self.inst.surface,
                self.ctx.families(),
                &plan,
                self.render_pass,
            )?;

            self.graphics_pool = factory::create_command_pool(device, self.ctx.graphics.family)?;
            self.transfer_pool = factory::create_command_pool(device, self.ctx.transfer.family)?;
            self.slots = factory::create_frame_slots(device, self.graphics_pool, FRAMES_IN_FLIGHT)?;

            self.mesh = MeshBuffers::upload(&self.ctx, self.transfer_pool, mesh)?;
        }
        Ok(())
    }

    /// Swaps the render pass and pipeline for ones matching `format`.
    unsafe fn rebuild_pass(&mut self, format: vk::Format) -> RenderResult<()> {
        let device = &self.ctx.device;
        let render_pass = unsafe { factory::create_render_pass(device, format) }?;
        let pipeline = match unsafe {
            pipeline::create_pipeline(device, render_pass, self.pipeline_layout, &self.shaders)
        } {
            Ok(p) => p,
            Err(err) => {
                unsafe { device.destroy_render_pass(render_pass, None) };
                return Err(err);
            }
        };
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_render_pass(self.render_pass, None);
        }
        self.pipeline = pipeline;
        self.render_pass = render_pass;
        self.pass_format = format;
        info!("render pass rebuilt for {}", format_name(format));
        Ok(())
    }

    /// The old buffers stay in use if the upload fails.
    unsafe fn replace_mesh(&mut self, mesh: &Mesh) -> RenderResult<()> {
        unsafe {
            self.ctx.device.device_wait_idle().call("vkDeviceWaitIdle")?;
            let uploaded = MeshBuffers::upload(&self.ctx, self.transfer_pool, mesh)?;
            let old = std::mem::replace(&mut self.mesh, uploaded);
            old.destroy(&self.ctx.device);
        }
        Ok(())
    }

    fn slot(&self, slot: usize) -> FrameSlot {
        self.slots[slot]
    }
}

unsafe fn open_device(inst: &InstanceContext) -> RenderResult<(DeviceContext, SwapchainSupport)> {
    let selection = select_physical_device(&SurfaceQuery {
        instance: &inst.instance,
        surface_loader: &inst.surface_loader,
        surface: inst.surface,
    })?;
    let ctx = unsafe { DeviceContext::create(&inst.instance, selection.device, selection.families) }?;
    Ok((ctx, selection.support))
}

impl PresentationOps for RenderCore {
    fn wait_device_idle(&mut self) -> RenderResult<()> {
        unsafe { self.ctx.device.device_wait_idle() }.call("vkDeviceWaitIdle")
    }

    fn requery_support(&mut self) -> RenderResult<()> {
        unsafe {
            self.support
                .requery(&self.inst.surface_loader, self.ctx.physical, self.inst.surface)
        }
    }

    fn support(&self) -> &SwapchainSupport {
        &self.support
    }

    fn rebuild_chain(&mut self, window: RenderSize) -> RenderResult<ChainSummary> {
        // Planning can fail; the old chain is still intact at that point.
        let plan = ChainPlan::from_support(&self.support, window)?;

        unsafe {
            self.chain.cleanup(&self.ctx.device, &self.swapchain_loader);
            if plan.format.format != self.pass_format {
                self.rebuild_pass(plan.format.format)?;
            }
            self.chain = PresentationChain::init(
                &self.ctx.device,
                &self.swapchain_loader,
                self.inst.surface,
                self.ctx.families(),
                &plan,
                self.render_pass,
            )?;
        }
        Ok(self.chain.summary())
    }
}

impl FrameOps for RenderCore {
    fn wait_for_slot(&mut self, slot: usize) -> RenderResult<()> {
        let fence = self.slot(slot).in_flight;
        unsafe { self.ctx.device.wait_for_fences(&[fence], true, u64::MAX) }
            .call("vkWaitForFences")
    }

    fn acquire_image(&mut self, slot: usize) -> RenderResult<Acquired> {
        let semaphore = self.slot(slot).image_available;
        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.chain.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
            Err(result) => Err(result).call("vkAcquireNextImageKHR"),
        }
    }

    fn reset_slot(&mut self, slot: usize) -> RenderResult<()> {
        let s = self.slot(slot);
        let device = &self.ctx.device;
        unsafe {
            device.reset_fences(&[s.in_flight]).call("vkResetFences")?;
            device
                .reset_command_buffer(s.command_buffer, vk::CommandBufferResetFlags::empty())
                .call("vkResetCommandBuffer")
        }
    }

    fn record(&mut self, slot: usize, image: u32) -> RenderResult<()> {
        let target = DrawTarget {
            render_pass: self.render_pass,
            framebuffer: self.chain.framebuffers[image as usize],
            pipeline: self.pipeline,
            extent: self.chain.extent,
        };
        let cmd = self.slot(slot).command_buffer;
        unsafe { record_draw(&self.ctx.device, cmd, &target, &self.mesh) }
    }

    fn submit(&mut self, slot: usize) -> RenderResult<()> {
        let s = self.slot(slot);
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let info = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &s.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &s.render_finished,
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .queue_submit(self.ctx.graphics.queue, std::slice::from_ref(&info), s.in_flight)
        }
        .call("vkQueueSubmit")
    }

    fn present(&mut self, slot: usize, image: u32) -> RenderResult<Presented> {
        let s = self.slot(slot);
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.render_finished,
            swapchain_count: 1,
            p_swapchains: &self.chain.swapchain,
            p_image_indices: &image,
            ..Default::default()
        };
        match unsafe {
            self.swapchain_loader
                .queue_present(self.ctx.present.queue, &info)
        } {
            Ok(false) => Ok(Presented::Fresh),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::Stale),
            Err(result) => Err(result).call("vkQueuePresentKHR"),
        }
    }

    fn abandon_slot(&mut self, slot: usize) -> RenderResult<()> {
        let s = self.slot(slot);
        let device = &self.ctx.device;
        debug!("restoring slot {slot}");
        unsafe {
            device
                .reset_command_buffer(s.command_buffer, vk::CommandBufferResetFlags::empty())
                .call("vkResetCommandBuffer")?;
            if device.get_fence_status(s.in_flight).call("vkGetFenceStatus")? {
                device.reset_fences(&[s.in_flight]).call("vkResetFences")?;
            }
            // Consume the acquire semaphore and signal the fence with an empty
            // batch, so the slot's next wait completes.
            let wait_stage = vk::PipelineStageFlags::ALL_COMMANDS;
            let info = vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                wait_semaphore_count: 1,
                p_wait_semaphores: &s.image_available,
                p_wait_dst_stage_mask: &wait_stage,
                ..Default::default()
            };
            device
                .queue_submit(self.ctx.graphics.queue, std::slice::from_ref(&info), s.in_flight)
                .call("vkQueueSubmit")
        }
    }

    fn recreate(&mut self, window: &mut dyn WindowSystem) -> RenderResult<Recreation> {
        recreate_presentation(self, window)
    }
}

impl Drop for RenderCore {
    fn drop(&mut self) {
        unsafe {
            let d = &self.ctx.device;
            d.device_wait_idle().ok();

            // STRICT ORDER: reverse of construction
            self.mesh.destroy(d);
            factory::destroy_frame_slots(d, &self.slots);
            d.destroy_command_pool(self.transfer_pool, None);
            d.destroy_command_pool(self.graphics_pool, None);
            self.chain.cleanup(d, &self.swapchain_loader);
            d.destroy_pipeline(self.pipeline, None);
            d.destroy_pipeline_layout(self.pipeline_layout, None);
            d.destroy_render_pass(self.render_pass, None);
            self.ctx.destroy();

            self.inst.destroy();
        }
    }
}

/// Vulkan backend: one pipeline, one indexed mesh, two frames in flight.
pub struct VkRenderer {
    core: RenderCore,
    scheduler: FrameScheduler,
}

impl VkRenderer {
    pub fn frames_presented(&self) -> u64 {
        self.scheduler.counter().frames()
    }
}

impl Renderer for VkRenderer {
    fn new(window: &dyn WindowSystem, desc: &RendererDesc) -> Result<Self> {
        let core = unsafe { RenderCore::new(window, desc) }.context("vulkan renderer init")?;
        let extent = core.chain.extent;
        info!(
            "Vulkan renderer ready ({}x{}, {})",
            extent.width,
            extent.height,
            format_name(core.chain.format.format)
        );
        Ok(Self {
            core,
            scheduler: FrameScheduler::default(),
        })
    }

    fn render(&mut self, window: &mut dyn WindowSystem) -> Result<FrameOutcome> {
        let outcome = self.scheduler.draw_frame(&mut self.core, window)?;
        Ok(outcome)
    }

    fn replace_mesh(&mut self, mesh: &Mesh) -> Result<()> {
        unsafe { self.core.replace_mesh(mesh) }.context("replace mesh")
    }

    fn surface_size(&self) -> RenderSize {
        let extent = self.core.chain.extent;
        RenderSize::new(extent.width, extent.height)
    }
}
