//! The seam between the world and whatever draws it.
//!
//! [`World`](crate::world::World) only ever talks to a [`Renderer`]: it sets
//! the viewport and drawing-buffer size and hands over the scene together with
//! the posed camera once per frame. [`Context`](crate::context::Context) is
//! the wgpu implementation; tests substitute a recording one.

use crate::{camera::AnimatedCamera, data_structures::scene_graph::Scene, error::WorldResult};

/// What the backend can do. Only the features the shading degrades on are
/// listed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Screen-space derivatives (`fwidth`) in fragment shaders.
    pub derivatives: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { derivatives: true }
    }
}

pub trait Renderer {
    fn capabilities(&self) -> Capabilities;

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);

    /// Resize the drawing buffer.
    fn set_size(&mut self, width: u32, height: u32);

    fn render(&mut self, scene: &Scene, camera: &AnimatedCamera) -> WorldResult<()>;
}
