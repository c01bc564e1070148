#![allow(dead_code)]

use std::{
    cell::Cell,
    path::{Path, PathBuf},
    rc::Rc,
};

use vfx_world::{
    Capabilities, ReadyReport, Renderer, WorldResult,
    camera::AnimatedCamera,
    cgmath::Vector3,
    data_structures::{mesh::MeshId, scene_graph::Scene},
};

/// Camera flying along x from 0 to 10 over frames 0..10, with a 90 degree
/// horizontal field of view and a normalized time range.
pub const ANIMATION_JSON: &str = r#"{
    "range": [0, 10],
    "horizontalFOV": 1.5707963,
    "locationX": [[0, 0], [10, 10]],
    "locationZ": [[0, 5]],
    "rotationZ": [{"time": 0, "value": 0.0, "interpolation": "constant"}]
}"#;

/// A renderer that only writes down what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub derivatives: bool,
    pub viewports: Vec<(u32, u32, u32, u32)>,
    pub sizes: Vec<(u32, u32)>,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub meshes: Vec<MeshId>,
    pub camera_position: Vector3<f32>,
}

impl Renderer for RecordingRenderer {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            derivatives: self.derivatives,
        }
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.viewports.push((x, y, width, height));
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.sizes.push((width, height));
    }

    fn render(&mut self, scene: &Scene, camera: &AnimatedCamera) -> WorldResult<()> {
        self.frames.push(Frame {
            meshes: scene.iter().map(|m| m.id()).collect(),
            camera_position: camera.position(),
        });
        Ok(())
    }
}

/// Ready callback that counts how often it ran.
pub fn counting_callback() -> (Rc<Cell<u32>>, impl FnOnce(ReadyReport) + 'static) {
    let fired = Rc::new(Cell::new(0));
    let counter = fired.clone();
    (fired, move |_| counter.set(counter.get() + 1))
}

/// A fresh scratch directory for one test's assets.
pub fn asset_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vfx-world-{}-{}", test, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create asset dir");
    dir
}

fn path_string(path: &Path) -> String {
    path.to_str().expect("utf-8 temp path").to_string()
}

pub fn write_png(dir: &Path, name: &str, width: u32, height: u32, rgba: [u8; 4]) -> String {
    let path = dir.join(name);
    image::RgbaImage::from_pixel(width, height, image::Rgba(rgba))
        .save(&path)
        .expect("write png");
    path_string(&path)
}

/// A unit quad in the XY plane with UVs spanning [0,1].
pub fn write_obj_quad(dir: &Path, name: &str) -> String {
    let path = dir.join(name);
    std::fs::write(
        &path,
        "o quad\n\
         v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
         vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
         f 1/1 2/2 3/3 4/4\n",
    )
    .expect("write obj");
    path_string(&path)
}

/// A single triangle in a `.gltf` with an external `.bin`, placed by a node
/// translated one unit along x.
pub fn write_gltf_triangle(dir: &Path, name: &str) -> String {
    let bin_name = format!("{name}.bin");
    let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let uvs: [[f32; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    let mut bin = Vec::new();
    for value in positions.iter().flatten().chain(uvs.iter().flatten()) {
        bin.extend_from_slice(&value.to_le_bytes());
    }
    std::fs::write(dir.join(&bin_name), &bin).expect("write bin");

    let json = format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "mesh": 0, "translation": [1.0, 0.0, 0.0] }}],
  "meshes": [{{ "primitives": [{{ "attributes": {{ "POSITION": 0, "TEXCOORD_0": 1 }} }}] }}],
  "buffers": [{{ "uri": "{bin_name}", "byteLength": {len} }}],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 24 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0] }},
    {{ "bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC2" }}
  ]
}}"#,
        len = bin.len()
    );
    let path = dir.join(name);
    std::fs::write(&path, json).expect("write gltf");
    path_string(&path)
}
