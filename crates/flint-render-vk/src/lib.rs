// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

mod device;
mod error;
mod factory;
mod frame;
mod instance;
mod mesh;
mod pipeline;
mod present;
mod probe;
mod record;
mod renderer;
mod support;

#[cfg(test)]
mod testing;

pub use error::{RenderResult, VkError};
pub use frame::{
    Acquired, FrameCounter, FrameOps, FrameScheduler, FrameSlot, Presented, FRAMES_IN_FLIGHT,
};
pub use instance::VALIDATION_LAYER;
pub use pipeline::spirv_words;
pub use present::{
    recreate_presentation, ChainSummary, PresentationChain, PresentationOps, Recreation,
};
pub use probe::{
    select_physical_device, select_queue_families, DeviceQuery, QueueFamilies, Selection,
    REQUIRED_DEVICE_EXTENSIONS,
};
pub use renderer::VkRenderer;
pub use support::{ChainPlan, SwapchainSupport, PREFERRED_FORMAT};

use flint_render::ShaderSet;

static QUAD_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/quad.vert.spv"));
static QUAD_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/quad.frag.spv"));

/// Pass-through shaders for the 2P3C vertex layout, compiled at build time.
pub fn builtin_shaders() -> ShaderSet {
    ShaderSet {
        vertex: QUAD_VERT.to_vec(),
        fragment: QUAD_FRAG.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_shaders_are_valid_spirv() {
        let shaders = builtin_shaders();
        for bytes in [&shaders.vertex, &shaders.fragment] {
            let words = spirv_words(bytes).unwrap();
            assert_eq!(words[0], 0x0723_0203);
        }
    }
}
