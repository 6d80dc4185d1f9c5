// SPDX-License-Identifier: CEPL-1.0
//! Surface capabilities of one physical device, and the choices the
//! presentation chain makes from them.

use crate::error::{RenderResult, VkCall, VkError};
use ash::khr::surface;
use ash::vk;
use flint_render::RenderSize;

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Owned snapshot of what a device/surface pair supports.
///
/// The two arrays are only ever replaced as a whole: a re-query builds a new
/// value and swaps it in, so a failed query leaves the previous snapshot intact.
#[derive(Clone, Debug, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn from_parts(
        capabilities: vk::SurfaceCapabilitiesKHR,
        formats: Vec<vk::SurfaceFormatKHR>,
        present_modes: Vec<vk::PresentModeKHR>,
    ) -> Self {
        Self {
            capabilities,
            formats,
            present_modes,
        }
    }

    /// # Safety
    /// `phys` must belong to the instance `loader` was created from, and
    /// `surface` must be alive.
    pub(crate) unsafe fn query(
        loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<Self> {
        let capabilities = unsafe { loader.get_physical_device_surface_capabilities(phys, surface) }
            .call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let formats = unsafe { loader.get_physical_device_surface_formats(phys, surface) }
            .call("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let present_modes =
            unsafe { loader.get_physical_device_surface_present_modes(phys, surface) }
                .call("vkGetPhysicalDeviceSurfacePresentModesKHR")?;
        Ok(Self::from_parts(capabilities, formats, present_modes))
    }

    /// Replaces `self` with a fresh query; on failure `self` is unchanged.
    ///
    /// # Safety
    /// Same as [`SwapchainSupport::query`].
    pub(crate) unsafe fn requery(
        &mut self,
        loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<()> {
        *self = unsafe { Self::query(loader, phys, surface) }?;
        Ok(())
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    pub fn max_extent(&self) -> vk::Extent2D {
        self.capabilities.max_image_extent
    }

    /// The preferred BGRA/sRGB pair if offered, else the first entry.
    pub fn choose_surface_format(&self) -> Option<vk::SurfaceFormatKHR> {
        self.formats
            .iter()
            .copied()
            .find(|f| *f == PREFERRED_FORMAT)
            .or_else(|| self.formats.first().copied())
    }

    pub fn choose_present_mode(&self) -> vk::PresentModeKHR {
        if self.present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else {
            vk::PresentModeKHR::FIFO
        }
    }

    /// Maximum image extent, unless the surface leaves the size to the
    /// swapchain, in which case the window size is clamped into range.
    pub fn choose_extent(&self, window: RenderSize) -> vk::Extent2D {
        let caps = &self.capabilities;
        if caps.current_extent.width != u32::MAX {
            return caps.max_image_extent;
        }
        vk::Extent2D {
            width: window
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }

    pub fn image_count(&self) -> u32 {
        self.capabilities.min_image_count
    }
}

/// Everything `vkCreateSwapchainKHR` needs that depends on the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainPlan {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

impl ChainPlan {
    pub fn from_support(support: &SwapchainSupport, window: RenderSize) -> RenderResult<Self> {
        let format = support
            .choose_surface_format()
            .ok_or(VkError::InadequateSurface)?;
        Ok(Self {
            format,
            present_mode: support.choose_present_mode(),
            extent: support.choose_extent(window),
            image_count: support.image_count(),
            transform: support.capabilities.current_transform,
        })
    }
}

pub(crate) fn format_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        vk::Format::A2B10G10R10_UNORM_PACK32 => "A2B10G10R10_UNORM",
        vk::Format::R16G16B16A16_SFLOAT => "R16G16B16A16_SFLOAT",
        _ => "OTHER",
    }
}

pub(crate) fn present_mode_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}
