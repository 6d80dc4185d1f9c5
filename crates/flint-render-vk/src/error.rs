// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VkError {
    #[error("no physical device satisfies the renderer's requirements")]
    NoSuitableDevice,
    #[error("no distinct graphics, present and transfer queue families")]
    NoQueueFamilies,
    #[error("{call} failed: {result}")]
    Api {
        call: &'static str,
        result: vk::Result,
    },
    #[error("no memory type in {type_bits:#x} has {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },
    #[error("surface offers no formats or no present modes")]
    InadequateSurface,
    #[error("mesh needs at least one vertex and one index")]
    EmptyMesh,
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
    #[error("invalid SPIR-V: {0}")]
    Spirv(#[source] std::io::Error),
}

pub type RenderResult<T> = Result<T, VkError>;

impl VkError {
    /// The raw status code, for API failures.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            VkError::Api { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Tags a raw Vulkan status with the name of the call that produced it.
pub(crate) trait VkCall<T> {
    fn call(self, name: &'static str) -> RenderResult<T>;
}

impl<T> VkCall<T> for Result<T, vk::Result> {
    #[inline]
    fn call(self, name: &'static str) -> RenderResult<T> {
        self.map_err(|result| VkError::Api { call: name, result })
    }
}
