//! Scene data: meshes with UV layers, materials, textures and colors.
//!
//! - `mesh` holds geometry, UV layers and the UV editing helpers
//! - `material` is the multitexture material and its shader feature set
//! - `texture` is the shared CPU texture handle and its GPU counterpart
//! - `scene_graph` is the root-rotated list of meshes the renderer draws
//! - `color` parses CSS-like color strings

pub mod color;
pub mod material;
pub mod mesh;
pub mod scene_graph;
pub mod texture;
