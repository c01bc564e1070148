//! The scene: a fixed root transform over an ordered list of meshes.

use cgmath::{Matrix4, Rad};

use crate::data_structures::mesh::{Mesh, MeshId};

/// Scenes are authored Z-up; the root rotates them into the Y-up world.
pub const ROOT_ROTATION_X: Rad<f32> = Rad(std::f32::consts::FRAC_PI_2);

#[derive(Debug)]
pub struct Scene {
    root_transform: Matrix4<f32>,
    meshes: Vec<Mesh>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            root_transform: Matrix4::from_angle_x(ROOT_ROTATION_X),
            meshes: Vec::new(),
        }
    }

    pub fn root_transform(&self) -> Matrix4<f32> {
        self.root_transform
    }

    /// A mesh's transform in world space.
    pub fn world_transform(&self, mesh: &Mesh) -> Matrix4<f32> {
        self.root_transform * mesh.transform
    }

    pub fn add(&mut self, mesh: Mesh) -> MeshId {
        let id = mesh.id();
        log::debug!("Adding mesh {} ({:?}) to the scene", mesh.name, id);
        self.meshes.push(mesh);
        id
    }

    pub fn remove(&mut self, id: MeshId) -> Option<Mesh> {
        let idx = self.meshes.iter().position(|m| m.id() == id)?;
        Some(self.meshes.remove(idx))
    }

    pub fn get(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.iter().find(|m| m.id() == id)
    }

    pub fn get_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.meshes.iter_mut().find(|m| m.id() == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Mesh> {
        self.meshes.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mesh> {
        self.meshes.iter()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Point3, Transform};

    use super::*;
    use crate::data_structures::{material::MultitextureMaterial, mesh::Geometry, texture::Texture};

    fn mesh(name: &str) -> Mesh {
        Mesh::new(name, Geometry::quad(1.0, 1.0), MultitextureMaterial::new(Texture::new(name)))
    }

    #[test]
    fn root_rotates_z_up_into_y_up() {
        let scene = Scene::new();
        let up = scene.root_transform().transform_point(Point3::new(0.0, 0.0, 1.0));
        assert!(up.x.abs() < 1e-6);
        assert!((up.y + 1.0).abs() < 1e-6 || (up.y - 1.0).abs() < 1e-6);
        assert!(up.z.abs() < 1e-6);
    }

    #[test]
    fn meshes_keep_insertion_order_and_can_be_removed() {
        let mut scene = Scene::new();
        let a = scene.add(mesh("a"));
        let b = scene.add(mesh("b"));
        assert_eq!(scene.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(scene.find_by_name("b").map(Mesh::id), Some(b));

        scene.get_mut(a).unwrap().visible = false;
        assert!(!scene.get(a).unwrap().visible);

        assert_eq!(scene.remove(a).map(|m| m.name), Some("a".to_string()));
        assert!(scene.get(a).is_none());
        assert_eq!(scene.len(), 1);
        assert!(scene.remove(a).is_none());
    }
}
