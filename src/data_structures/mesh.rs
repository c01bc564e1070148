//! Mesh geometry with multiple UV layers.
//!
//! UVs are stored per face vertex and grouped into layers, so one mesh can
//! carry several independent texture mappings: layer 0 feeds a material's
//! first texture, layer 1 its second. [`set_quad_uvs`] and [`map_uvs`] edit
//! layers in place; both flag the geometry for re-upload.

use std::sync::atomic::{AtomicU64, Ordering};

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::material::MultitextureMaterial,
    error::{WorldError, WorldResult},
};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Uv {
    pub u: f32,
    pub v: f32,
}

impl Uv {
    pub const fn new(u: f32, v: f32) -> Self {
        Self { u, v }
    }
}

/// One list of UVs per face, one UV per face vertex.
pub type UvLayer = Vec<Vec<Uv>>;

/// Triangles and quads over a shared position list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    /// Vertex indices, three or four per face.
    pub faces: Vec<Vec<u32>>,
    pub face_vertex_uvs: Vec<UvLayer>,
}

/// Vertex layout fed to the multitexture pipeline.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub uv2: [f32; 2],
}

impl MeshVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2, 2 => Float32x2];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

impl Geometry {
    /// A unit quad in the XY plane, UVs spanning [0,1] on layer 0.
    pub fn quad(width: f32, height: f32) -> Self {
        let (w, h) = (width / 2.0, height / 2.0);
        Self {
            positions: vec![[-w, -h, 0.0], [w, -h, 0.0], [w, h, 0.0], [-w, h, 0.0]],
            faces: vec![vec![0, 1, 2, 3]],
            face_vertex_uvs: vec![vec![vec![
                Uv::new(0.0, 0.0),
                Uv::new(1.0, 0.0),
                Uv::new(1.0, 1.0),
                Uv::new(0.0, 1.0),
            ]]],
        }
    }

    pub fn layer(&self, layer: usize) -> Option<&UvLayer> {
        self.face_vertex_uvs.get(layer)
    }

    /// Replace `layer`, creating empty intermediate layers if needed.
    pub fn set_layer(&mut self, layer: usize, uvs: UvLayer) {
        if self.face_vertex_uvs.len() <= layer {
            self.face_vertex_uvs.resize_with(layer + 1, Vec::new);
        }
        self.face_vertex_uvs[layer] = uvs;
    }

    /// Flattens faces into a triangle list. Quads are split along their 0-2
    /// diagonal. Missing UVs fall back to the first layer, then to zero.
    pub fn triangulated_vertices(&self) -> Vec<MeshVertex> {
        let uv_at = |layer: usize, face: usize, corner: usize| -> Option<[f32; 2]> {
            self.face_vertex_uvs
                .get(layer)
                .and_then(|l| l.get(face))
                .and_then(|f| f.get(corner))
                .map(|uv| [uv.u, uv.v])
        };
        let mut vertices = Vec::with_capacity(self.faces.len() * 6);
        for (face_idx, face) in self.faces.iter().enumerate() {
            let corners: &[usize] = match face.len() {
                3 => &[0, 1, 2],
                4 => &[0, 1, 2, 0, 2, 3],
                n => {
                    log::warn!("Skipping face {} with {} vertices", face_idx, n);
                    continue;
                }
            };
            for &corner in corners {
                let Some(position) = self.positions.get(face[corner] as usize) else {
                    log::warn!("Face {} references a missing vertex", face_idx);
                    continue;
                };
                let uv = uv_at(0, face_idx, corner).unwrap_or_default();
                let uv2 = uv_at(1, face_idx, corner).unwrap_or(uv);
                vertices.push(MeshVertex {
                    position: *position,
                    uv,
                    uv2,
                });
            }
        }
        vertices
    }
}

/// A drawable: geometry, material and a local transform.
#[derive(Clone, Debug)]
pub struct Mesh {
    id: MeshId,
    pub name: String,
    geometry: Geometry,
    pub material: MultitextureMaterial,
    pub transform: Matrix4<f32>,
    pub visible: bool,
    geometry_version: u64,
}

impl Mesh {
    pub fn new(name: impl Into<String>, geometry: Geometry, material: MultitextureMaterial) -> Self {
        Self {
            id: MeshId(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            geometry,
            material,
            transform: Matrix4::identity(),
            visible: true,
            geometry_version: 0,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Mutable access bumps the geometry version so renderers re-upload it.
    pub fn geometry_mut(&mut self) -> &mut Geometry {
        self.geometry_version += 1;
        &mut self.geometry
    }

    pub fn geometry_version(&self) -> u64 {
        self.geometry_version
    }
}

/// Sets `layer` to a single quad face with the UVs `[u1, v1, .., u4, v4]`.
pub fn set_quad_uvs(mesh: &mut Mesh, layer: usize, uvs: [f32; 8]) {
    let quad = uvs.chunks_exact(2).map(|uv| Uv::new(uv[0], uv[1])).collect();
    mesh.geometry_mut().set_layer(layer, vec![quad]);
}

/// Scales and translates the UVs of `from_layer` so their bounding box spans
/// `[min_u, max_u] x [min_v, max_v]`, and stores the result in `to_layer`.
///
/// An axis along which all source UVs are equal maps onto its minimum.
pub fn map_uvs(
    mesh: &mut Mesh,
    from_layer: usize,
    to_layer: usize,
    min_u: f32,
    min_v: f32,
    max_u: f32,
    max_v: f32,
) -> WorldResult<()> {
    let uvs = mesh
        .geometry()
        .layer(from_layer)
        .ok_or_else(|| WorldError::uv(format!("mesh {} has no uv layer {}", mesh.name, from_layer)))?;

    let (from_min, from_max) = uvs.iter().flatten().fold(
        (Uv::new(f32::INFINITY, f32::INFINITY), Uv::new(f32::NEG_INFINITY, f32::NEG_INFINITY)),
        |(lo, hi), uv| {
            (
                Uv::new(lo.u.min(uv.u), lo.v.min(uv.v)),
                Uv::new(hi.u.max(uv.u), hi.v.max(uv.v)),
            )
        },
    );
    if from_min.u > from_max.u {
        return Err(WorldError::uv(format!(
            "uv layer {} of mesh {} is empty",
            from_layer, mesh.name
        )));
    }

    let remap = |value: f32, from_lo: f32, from_hi: f32, to_lo: f32, to_hi: f32| {
        let from_dist = from_hi - from_lo;
        if from_dist == 0.0 {
            return to_lo;
        }
        to_lo + ((value - from_lo) / from_dist) * (to_hi - to_lo)
    };
    let mapped: UvLayer = uvs
        .iter()
        .map(|face| {
            face.iter()
                .map(|uv| {
                    Uv::new(
                        remap(uv.u, from_min.u, from_max.u, min_u, max_u),
                        remap(uv.v, from_min.v, from_max.v, min_v, max_v),
                    )
                })
                .collect()
        })
        .collect();

    mesh.geometry_mut().set_layer(to_layer, mapped);
    Ok(())
}
