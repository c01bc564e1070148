//! vfx-world
//!
//! A small engine for flying an animated camera through a textured 3D world,
//! rendered with wgpu natively and on the web. Everything a world needs
//! (model geometry, image and video textures, fonts) loads asynchronously, and
//! a readiness tracker signals once all of it has arrived so that frames are
//! only rendered from a complete scene.
//!
//! High-level modules
//! - `tracker`: the readiness gate loaders register with
//! - `resources`: asynchronous loaders for textures, geometry, fonts and text
//! - `animation`: keyframe camera animation data and its evaluation
//! - `camera`: the animated camera and its projection
//! - `data_structures`: meshes with UV layers, materials, textures, the scene
//! - `world`: ties tracker, camera, scene and renderer together
//! - `render`: the renderer seam; `context` is its offscreen wgpu implementation
//! - `pipelines`: the multitexture render pipelines
//!

pub mod animation;
pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod tracker;
pub mod world;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use config::{ViolationPolicy, WorldConfig};
pub use error::{ProtocolViolation, WorldError, WorldResult};
pub use render::{Capabilities, Renderer};
pub use tracker::{LoadToken, ReadyReport, Tracker};
pub use wgpu;
pub use world::World;

/// Install the platform's logger: `env_logger` natively (configured through
/// `RUST_LOG`), the browser console on wasm. Safe to call more than once.
pub fn init_logging() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            log::debug!("Logger already initialized: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            log::debug!("Logger already initialized: {}", e);
        }
    }
}
