// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero-area framebuffer.
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What a renderer needs from the windowing library.
///
/// The renderer never owns the window; it borrows one of these to create its
/// surface and, while the surface is minimized, to keep events flowing.
pub trait WindowSystem: HasWindowHandle + HasDisplayHandle {
    /// Framebuffer size in pixels.
    fn framebuffer_size(&self) -> RenderSize;

    fn should_close(&self) -> bool;

    /// Processes pending events without blocking.
    fn poll_events(&mut self);

    /// Blocks until at least one event arrived, then processes it.
    fn wait_events(&mut self);
}

/// Vertex layout of a draw request: 2D position, RGB colour.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(pos: [f32; 2], color: [f32; 3]) -> Self {
        Self { pos, color }
    }
}

/// One indexed mesh, the only thing the renderer draws.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Compiled SPIR-V for the single graphics pipeline.
#[derive(Clone, Debug, Default)]
pub struct ShaderSet {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct RendererDesc {
    pub app_name: String,
    pub validation: bool,
    pub shaders: ShaderSet,
    pub mesh: Mesh,
}

/// Result of one `Renderer::render` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Image presented; the next frame slot is active.
    Presented,
    /// Image presented, then the presentation chain was rebuilt.
    PresentedAndRecreated,
    /// Acquire found the chain out of date; it was rebuilt and nothing was drawn.
    Skipped,
    /// The chain needed rebuilding but the window closed while it was minimized.
    Interrupted,
    /// An unexpected per-frame error was logged and the frame dropped.
    Abandoned,
}

pub trait Renderer {
    fn new(window: &dyn WindowSystem, desc: &RendererDesc) -> Result<Self>
    where
        Self: Sized;

    /// Runs one frame. Transient presentation problems are handled inside and
    /// reported through the outcome; errors are unrecoverable.
    fn render(&mut self, window: &mut dyn WindowSystem) -> Result<FrameOutcome>;

    fn replace_mesh(&mut self, mesh: &Mesh) -> Result<()>;

    fn surface_size(&self) -> RenderSize;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Mesh {
        Mesh::new(
            vec![
                Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0]),
                Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0]),
                Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0]),
                Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0]),
            ],
            vec![0, 1, 2, 2, 3, 0],
        )
    }

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 5 * 4);
        assert_eq!(std::mem::offset_of!(Vertex, color), 2 * 4);
    }

    #[test]
    fn mesh_byte_views_cover_all_elements() {
        let mesh = quad();
        assert_eq!(mesh.vertex_bytes().len(), 4 * 20);
        assert_eq!(mesh.index_bytes().len(), 6 * 4);
        assert_eq!(mesh.index_count(), 6);
        assert!(!mesh.is_empty());
    }

    #[test]
    fn mesh_without_indices_is_empty() {
        let mut mesh = quad();
        mesh.indices.clear();
        assert!(mesh.is_empty());
    }

    #[test]
    fn zero_area_sizes() {
        assert!(RenderSize::new(0, 600).is_zero_area());
        assert!(RenderSize::new(800, 0).is_zero_area());
        assert!(!RenderSize::new(1, 1).is_zero_area());
    }
}
