//! Camera driven by a keyframe [`Animation`].
//!
//! The camera owns its animation and a [`Projection`]. It is not a scene
//! node: every frame the world poses it via [`AnimatedCamera::set_animation_time`]
//! and hands it to the renderer, which only reads the resulting matrices.
//! Like an authored camera lens, the field of view is fixed when the camera is
//! created and is not re-evaluated per frame or on resize.

use cgmath::{Deg, Matrix, Matrix4, Rad, Vector3};

use crate::animation::{Animation, CameraPose};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub aspect: f32,
    pub fovy: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

#[derive(Clone, Debug)]
pub struct AnimatedCamera {
    animation: Animation,
    projection: Projection,
    pose: CameraPose,
}

impl AnimatedCamera {
    pub fn new(aspect: f32, near: f32, far: f32, animation: Animation) -> Self {
        let fovy = animation.vertical_fov(aspect);
        let pose = animation.evaluate_time(0.0, aspect);
        log::debug!("Animated camera with a {:?} vertical field of view", Deg::from(fovy));
        Self {
            animation,
            projection: Projection {
                aspect,
                fovy,
                znear: near,
                zfar: far,
            },
            pose,
        }
    }

    /// Move the camera to where the animation puts it at `time`.
    pub fn set_animation_time(&mut self, time: f32) {
        let pose = self.animation.evaluate_time(time, self.projection.aspect);
        self.pose.position = pose.position;
        self.pose.rotation = pose.rotation;
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.projection.aspect = aspect;
    }

    pub fn aspect(&self) -> f32 {
        self.projection.aspect
    }

    pub fn fov(&self) -> Deg<f32> {
        self.projection.fovy.into()
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            fov: self.fov(),
            ..self.pose
        }
    }

    pub fn position(&self) -> Vector3<f32> {
        self.pose.position
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    /// Inverse of the camera's world transform (rigid, so a transpose and a translation).
    pub fn view_matrix(&self) -> Matrix4<f32> {
        let rotation = self.pose.rotation_matrix().transpose();
        Matrix4::from(rotation) * Matrix4::from_translation(-self.pose.position)
    }

    pub fn view_proj(&self) -> Matrix4<f32> {
        self.projection.calc_matrix() * self.view_matrix()
    }
}

/// GPU side of the camera.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view_proj: cgmath::Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &AnimatedCamera) {
        self.view_proj = camera.view_proj().into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}
