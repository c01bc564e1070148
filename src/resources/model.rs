//! Geometry import from glTF and OBJ files.
//!
//! Imported UVs are converted to a bottom-left origin, the convention the UV
//! layers of a [`Geometry`] use. Materials in the files are ignored: meshes in
//! a world get their material from whoever adds the model.

use std::io::{BufReader, Cursor};

use anyhow::{anyhow, bail};
use cgmath::{Matrix4, Point3, SquareMatrix, Transform};

use crate::{
    data_structures::mesh::{Geometry, Uv},
    resources::{load_binary, load_string, sibling_path},
};

/// Load `file_name` as geometry, picking the importer by file extension.
pub async fn load_geometry(file_name: &str) -> anyhow::Result<Geometry> {
    let extension = file_name
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "gltf" | "glb" => load_gltf_geometry(file_name).await,
        "obj" => load_obj_geometry(file_name).await,
        other => bail!("unsupported model format \"{other}\""),
    }
}

#[derive(Default)]
struct GeometryBuilder {
    geometry: Geometry,
    uvs: Vec<Vec<Uv>>,
    uvs2: Vec<Option<Vec<Uv>>>,
}

impl GeometryBuilder {
    fn push_face(&mut self, indices: Vec<u32>, uvs: Vec<Uv>, uvs2: Option<Vec<Uv>>) {
        self.geometry.faces.push(indices);
        self.uvs.push(uvs);
        self.uvs2.push(uvs2);
    }

    fn finish(mut self) -> Geometry {
        let has_second_layer = self.uvs2.iter().any(Option::is_some);
        let second = has_second_layer.then(|| {
            self.uvs2
                .into_iter()
                .zip(&self.uvs)
                .map(|(second, first)| second.unwrap_or_else(|| first.clone()))
                .collect::<Vec<_>>()
        });
        self.geometry.face_vertex_uvs = std::iter::once(self.uvs).chain(second).collect();
        self.geometry
    }
}

async fn load_gltf_buffers(file_name: &str, gltf: &gltf::Gltf) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .ok_or_else(|| anyhow!("{file_name} references a missing binary chunk"))?;
                buffer_data.push(blob.into());
            }
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                bail!("{file_name}: embedded data URIs are not supported")
            }
            gltf::buffer::Source::Uri(uri) => {
                buffer_data.push(load_binary(&sibling_path(file_name, uri)).await?);
            }
        }
    }
    Ok(buffer_data)
}

fn gltf_uvs(coords: Option<gltf::mesh::util::ReadTexCoords<'_>>) -> Option<Vec<Uv>> {
    coords.map(|coords| coords.into_f32().map(|[u, v]| Uv::new(u, 1.0 - v)).collect())
}

fn append_gltf_node(
    builder: &mut GeometryBuilder,
    node: gltf::Node<'_>,
    parent: Matrix4<f32>,
    buffers: &[Vec<u8>],
) {
    let transform = parent * Matrix4::from(node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping {:?} primitive of mesh {}",
                    primitive.mode(),
                    mesh.name().unwrap_or("unnamed")
                );
                continue;
            }
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let offset = builder.geometry.positions.len() as u32;
            builder.geometry.positions.extend(
                positions.map(|p| -> [f32; 3] { transform.transform_point(Point3::from(p)).into() }),
            );
            let count = builder.geometry.positions.len() as u32 - offset;
            let uvs = gltf_uvs(reader.read_tex_coords(0));
            let uvs2 = gltf_uvs(reader.read_tex_coords(1));
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..count).collect(),
            };
            for triangle in indices.chunks_exact(3) {
                let pick = |layer: &Option<Vec<Uv>>| -> Option<Vec<Uv>> {
                    layer.as_ref().map(|uvs| {
                        triangle
                            .iter()
                            .map(|&i| uvs.get(i as usize).copied().unwrap_or_default())
                            .collect()
                    })
                };
                builder.push_face(
                    triangle.iter().map(|&i| i + offset).collect(),
                    pick(&uvs).unwrap_or_else(|| vec![Uv::default(); 3]),
                    pick(&uvs2),
                );
            }
        }
    }
    for child in node.children() {
        append_gltf_node(builder, child, transform, buffers);
    }
}

pub async fn load_gltf_geometry(file_name: &str) -> anyhow::Result<Geometry> {
    let gltf_bytes = load_binary(file_name).await?;
    let gltf = gltf::Gltf::from_reader(BufReader::new(Cursor::new(gltf_bytes)))?;
    let buffers = load_gltf_buffers(file_name, &gltf).await?;

    let scene = gltf
        .default_scene()
        .or_else(|| gltf.scenes().next())
        .ok_or_else(|| anyhow!("{file_name} contains no scene"))?;
    let mut builder = GeometryBuilder::default();
    for node in scene.nodes() {
        append_gltf_node(&mut builder, node, Matrix4::identity(), &buffers);
    }
    if builder.geometry.faces.is_empty() {
        bail!("{file_name} contains no triangles");
    }
    Ok(builder.finish())
}

pub async fn load_obj_geometry(file_name: &str) -> anyhow::Result<Geometry> {
    let obj_text = load_string(file_name).await?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));

    let (models, _) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            // quads stay quads
            triangulate: false,
            single_index: true,
            ..Default::default()
        },
        |p| async move {
            log::debug!("Ignoring material library {p}");
            let no_materials: tobj::MTLLoadResult = Ok((Vec::new(), Default::default()));
            no_materials
        },
    )
    .await?;

    let mut builder = GeometryBuilder::default();
    for model in &models {
        let mesh = &model.mesh;
        let offset = builder.geometry.positions.len() as u32;
        builder
            .geometry
            .positions
            .extend(mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));
        let uv = |i: u32| {
            let i = i as usize;
            match (mesh.texcoords.get(i * 2), mesh.texcoords.get(i * 2 + 1)) {
                (Some(&u), Some(&v)) => Uv::new(u, v),
                _ => Uv::default(),
            }
        };
        let arities: Vec<usize> = if mesh.face_arities.is_empty() {
            vec![3; mesh.indices.len() / 3]
        } else {
            mesh.face_arities.iter().map(|&n| n as usize).collect()
        };
        let mut start = 0;
        for arity in arities {
            let Some(face) = mesh.indices.get(start..start + arity) else {
                log::warn!("Face list of {} in {} is truncated", model.name, file_name);
                break;
            };
            start += arity;
            if arity != 3 && arity != 4 {
                log::warn!("Skipping {}-gon in {}", arity, model.name);
                continue;
            }
            builder.push_face(
                face.iter().map(|&i| i + offset).collect(),
                face.iter().map(|&i| uv(i)).collect(),
                None,
            );
        }
    }
    if builder.geometry.faces.is_empty() {
        bail!("{file_name} contains no faces");
    }
    Ok(builder.finish())
}
