// SPDX-License-Identifier: CEPL-1.0
//! Presentation chain lifecycle: build, tear down, and the stall-then-rebuild
//! cycle run whenever the surface stops matching the swapchain.

use crate::error::{RenderResult, VkCall};
use crate::factory;
use crate::probe::QueueFamilies;
use crate::support::{format_name, present_mode_name, ChainPlan, SwapchainSupport};
use ash::khr::swapchain;
use ash::vk;
use flint_render::{RenderSize, WindowSystem};
use tracing::info;

/// The live swapchain and its per-image views and framebuffers.
///
/// `images`, `views` and `framebuffers` always have the same length.
#[derive(Debug, Default)]
pub struct PresentationChain {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainSummary {
    pub format: vk::Format,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: usize,
}

impl PresentationChain {
    /// # Safety
    /// `render_pass` must be compatible with `plan.format`, and `families`
    /// must be the ones the device was created with.
    pub(crate) unsafe fn init(
        device: &ash::Device,
        loader: &swapchain::Device,
        surface: vk::SurfaceKHR,
        families: QueueFamilies,
        plan: &ChainPlan,
        render_pass: vk::RenderPass,
    ) -> RenderResult<Self> {
        // Graphics and present are always distinct families.
        let sharing = [families.graphics, families.present];
        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count: plan.image_count,
            image_format: plan.format.format,
            image_color_space: plan.format.color_space,
            image_extent: plan.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::CONCURRENT,
            queue_family_index_count: sharing.len() as u32,
            p_queue_family_indices: sharing.as_ptr(),
            pre_transform: plan.transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: plan.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        let mut chain = Self {
            swapchain: unsafe { loader.create_swapchain(&info, None) }
                .call("vkCreateSwapchainKHR")?,
            format: plan.format,
            present_mode: plan.present_mode,
            extent: plan.extent,
            ..Default::default()
        };

        let filled = unsafe { chain.fill(device, loader, render_pass) };
        if let Err(err) = filled {
            unsafe { chain.cleanup(device, loader) };
            return Err(err);
        }

        info!(
            "chain: format={} mode={} extent={}x{} images={}",
            format_name(chain.format.format),
            present_mode_name(chain.present_mode),
            chain.extent.width,
            chain.extent.height,
            chain.images.len()
        );
        Ok(chain)
    }

    unsafe fn fill(
        &mut self,
        device: &ash::Device,
        loader: &swapchain::Device,
        render_pass: vk::RenderPass,
    ) -> RenderResult<()> {
        unsafe {
            self.images = loader
                .get_swapchain_images(self.swapchain)
                .call("vkGetSwapchainImagesKHR")?;
            self.views = factory::create_image_views(device, &self.images, self.format.format)?;
            self.framebuffers =
                factory::create_framebuffers(device, render_pass, &self.views, self.extent)?;
        }
        Ok(())
    }

    /// Framebuffers, then views, then the swapchain (which owns the images).
    /// Leaves an empty chain behind, so a second call is a no-op.
    pub(crate) unsafe fn cleanup(&mut self, device: &ash::Device, loader: &swapchain::Device) {
        unsafe {
            factory::destroy_framebuffers(device, &self.framebuffers);
            factory::destroy_image_views(device, &self.views);
            if self.swapchain != vk::SwapchainKHR::null() {
                loader.destroy_swapchain(self.swapchain, None);
            }
        }
        *self = Self::default();
    }

    pub fn summary(&self) -> ChainSummary {
        ChainSummary {
            format: self.format.format,
            present_mode: self.present_mode,
            extent: self.extent,
            image_count: self.images.len(),
        }
    }
}

/// The steps `recreate_presentation` drives.
pub trait PresentationOps {
    /// Returns once the GPU no longer uses anything tied to the chain.
    fn wait_device_idle(&mut self) -> RenderResult<()>;
    /// Replaces the support snapshot with one for the current surface.
    fn requery_support(&mut self) -> RenderResult<()>;
    fn support(&self) -> &SwapchainSupport;
    /// Destroys the current chain and builds one from the latest snapshot.
    fn rebuild_chain(&mut self, window: RenderSize) -> RenderResult<ChainSummary>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recreation {
    Rebuilt(ChainSummary),
    /// The window asked to close while it was minimized; the chain is untouched.
    Interrupted,
}

fn surface_is_minimized(support: &SwapchainSupport) -> bool {
    let max = support.max_extent();
    max.width == 0 || max.height == 0
}

/// Full stall-then-rebuild. Blocks on window events while the surface has no
/// area, and rebuilds once a non-zero size is seen.
pub fn recreate_presentation<P>(
    ops: &mut P,
    window: &mut dyn WindowSystem,
) -> RenderResult<Recreation>
where
    P: PresentationOps + ?Sized,
{
    // 1) nothing on the GPU may still reference the old chain
    ops.wait_device_idle()?;

    // 2) fresh snapshot for the current surface
    ops.requery_support()?;

    // 3) minimized: block on events until there is something to draw into
    if surface_is_minimized(ops.support()) || window.framebuffer_size().is_zero_area() {
        info!("surface has no area; waiting for a resize");
        while surface_is_minimized(ops.support()) || window.framebuffer_size().is_zero_area() {
            if window.should_close() {
                return Ok(Recreation::Interrupted);
            }
            window.wait_events();
            ops.requery_support()?;
        }
    }

    // 4) conditions may have moved again while waiting
    ops.requery_support()?;

    // 5) old chain out, new chain and framebuffers in
    let summary = ops.rebuild_chain(window.framebuffer_size())?;
    info!(
        "presentation rebuilt at {}x{}",
        summary.extent.width, summary.extent.height
    );
    Ok(Recreation::Rebuilt(summary))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::VkError;
    use crate::support::tests::caps;
    use crate::support::PREFERRED_FORMAT;
    use crate::testing::FakeWindow;
    use std::collections::VecDeque;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) enum Step {
        Idle,
        Query,
        Rebuild(RenderSize),
    }

    /// Surface whose maximum extent follows a script, one entry per query.
    pub(crate) struct FakeSurface {
        pub extents: VecDeque<(u32, u32)>,
        pub current: (u32, u32),
        pub support: SwapchainSupport,
        pub steps: Vec<Step>,
        pub fail_rebuild: bool,
    }

    impl FakeSurface {
        pub(crate) fn steady(width: u32, height: u32) -> Self {
            Self {
                extents: VecDeque::new(),
                current: (width, height),
                support: SwapchainSupport::default(),
                steps: Vec::new(),
                fail_rebuild: false,
            }
        }

        pub(crate) fn set_extent(&mut self, width: u32, height: u32) {
            self.current = (width, height);
        }

        fn rebuilds(&self) -> usize {
            self.steps
                .iter()
                .filter(|s| matches!(s, Step::Rebuild(_)))
                .count()
        }
    }

    impl PresentationOps for FakeSurface {
        fn wait_device_idle(&mut self) -> RenderResult<()> {
            self.steps.push(Step::Idle);
            Ok(())
        }

        fn requery_support(&mut self) -> RenderResult<()> {
            self.steps.push(Step::Query);
            if let Some(next) = self.extents.pop_front() {
                self.current = next;
            }
            self.support = SwapchainSupport::from_parts(
                caps(self.current, 2),
                vec![PREFERRED_FORMAT],
                vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            );
            Ok(())
        }

        fn support(&self) -> &SwapchainSupport {
            &self.support
        }

        fn rebuild_chain(&mut self, window: RenderSize) -> RenderResult<ChainSummary> {
            self.steps.push(Step::Rebuild(window));
            if self.fail_rebuild {
                return Err(VkError::Api {
                    call: "vkCreateSwapchainKHR",
                    result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                });
            }
            let plan = ChainPlan::from_support(&self.support, window)?;
            Ok(ChainSummary {
                format: plan.format.format,
                present_mode: plan.present_mode,
                extent: plan.extent,
                image_count: plan.image_count as usize,
            })
        }
    }

    #[test]
    fn recreation_is_idempotent_for_an_unchanged_surface() {
        let mut surface = FakeSurface::steady(1024, 768);
        let mut window = FakeWindow::sized(1024, 768);

        let first = recreate_presentation(&mut surface, &mut window).unwrap();
        let second = recreate_presentation(&mut surface, &mut window).unwrap();
        assert_eq!(first, second);

        let Recreation::Rebuilt(summary) = first else {
            panic!("expected a rebuild");
        };
        assert_eq!(summary.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(summary.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(summary.image_count, 2);
        assert_eq!(window.waits, 0);
    }

    #[test]
    fn device_goes_idle_before_anything_is_queried_or_destroyed() {
        let mut surface = FakeSurface::steady(800, 600);
        let mut window = FakeWindow::sized(800, 600);
        recreate_presentation(&mut surface, &mut window).unwrap();
        assert_eq!(
            surface.steps,
            vec![
                Step::Idle,
                Step::Query,
                Step::Query,
                Step::Rebuild(RenderSize::new(800, 600))
            ]
        );
    }

    #[test]
    fn minimized_surface_blocks_until_resized() {
        let mut surface = FakeSurface::steady(0, 0);
        surface.extents = VecDeque::from([(0, 0), (0, 0), (0, 0), (800, 600)]);
        let mut window = FakeWindow::sized(0, 0);
        window.resizes =
            VecDeque::from([RenderSize::new(0, 0), RenderSize::new(0, 0), RenderSize::new(800, 600)]);

        let result = recreate_presentation(&mut surface, &mut window).unwrap();

        assert_eq!(window.waits, 3);
        assert_eq!(surface.rebuilds(), 1);
        let Recreation::Rebuilt(summary) = result else {
            panic!("expected a rebuild");
        };
        assert_eq!(
            summary.extent,
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn zero_window_blocks_even_when_the_surface_has_area() {
        let mut surface = FakeSurface::steady(800, 600);
        let mut window = FakeWindow::sized(800, 0);
        window.resizes = VecDeque::from([RenderSize::new(800, 600)]);

        let result = recreate_presentation(&mut surface, &mut window).unwrap();

        assert_eq!(window.waits, 1);
        assert!(matches!(result, Recreation::Rebuilt(_)));
        assert_eq!(
            surface.steps.last(),
            Some(&Step::Rebuild(RenderSize::new(800, 600)))
        );
        assert_eq!(surface.rebuilds(), 1);
    }

    #[test]
    fn closing_while_minimized_skips_the_rebuild() {
        let mut surface = FakeSurface::steady(0, 0);
        let mut window = FakeWindow::sized(0, 0);
        window.close_after_waits = Some(2);

        let result = recreate_presentation(&mut surface, &mut window).unwrap();
        assert_eq!(result, Recreation::Interrupted);
        assert_eq!(window.waits, 2);
        assert_eq!(surface.rebuilds(), 0);
    }

    #[test]
    fn rebuild_failures_propagate() {
        let mut surface = FakeSurface::steady(800, 600);
        surface.fail_rebuild = true;
        let mut window = FakeWindow::sized(800, 600);
        let err = recreate_presentation(&mut surface, &mut window).unwrap_err();
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
    }
}
