//! A 3D world flown through by an animated camera.
//!
//! The world ties the pieces together: a [`Tracker`] every loader registers
//! with, the [`AnimatedCamera`], the [`Scene`] and a [`Renderer`]. Usage is:
//!
//! 1. create the world, passing the callback to run once everything loaded,
//! 2. add models and start texture/font loads against [`World::tracker`],
//! 3. call [`World::start_tracking`] once every synchronous registration is done,
//! 4. render frames once the callback fired (or [`World::ready`] resolved).

use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};

use crate::{
    animation::{Animation, AnimationData},
    camera::AnimatedCamera,
    config::{ViolationPolicy, WorldConfig},
    data_structures::{
        material::MultitextureMaterial,
        mesh::{Mesh, MeshId},
        scene_graph::Scene,
        texture::Texture,
    },
    error::{ProtocolViolation, WorldResult},
    render::Renderer,
    resources::{LoadHandle, model::load_geometry, spawn_load, texture::load_image_texture},
    tracker::{ReadyReport, Tracker},
};

/// Aspect ratios wider than this count as widescreen.
pub const WIDESCREEN_ASPECT: f32 = 4.0 / 3.0;

pub struct World<R: Renderer> {
    config: WorldConfig,
    tracker: Tracker,
    camera: AnimatedCamera,
    scene: Rc<RefCell<Scene>>,
    renderer: R,
    widescreen: bool,
}

impl<R: Renderer + std::fmt::Debug> std::fmt::Debug for World<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("tracker", &self.tracker)
            .field("camera", &self.camera)
            .field("meshes", &self.scene.borrow().len())
            .field("renderer", &self.renderer)
            .field("widescreen", &self.widescreen)
            .finish()
    }
}

impl<R: Renderer> World<R> {
    pub fn new(
        config: WorldConfig,
        animation: AnimationData,
        mut renderer: R,
        on_ready: impl FnOnce(ReadyReport) + 'static,
    ) -> WorldResult<Self> {
        let tracker = Tracker::new(on_ready)
            .with_policy(config.violation_policy)
            .with_load_timeout(config.load_timeout);
        let aspect = config.aspect();
        let camera = AnimatedCamera::new(aspect, config.near, config.far, Animation::new(animation)?);

        if !renderer.capabilities().derivatives {
            log::warn!("Renderer lacks shader derivatives, material borders will not be antialiased");
        }
        renderer.set_viewport(0, 0, config.width, config.height);
        log::info!(
            "World of {}x{} created with a {:?} field of view",
            config.width,
            config.height,
            camera.fov()
        );

        Ok(Self {
            tracker,
            camera,
            scene: Rc::new(RefCell::new(Scene::new())),
            renderer,
            widescreen: aspect > WIDESCREEN_ASPECT,
            config,
        })
    }

    /// Ends the registration phase. The ready callback fires once every load
    /// registered so far (and any registered later) has resolved.
    pub fn start_tracking(&self) -> WorldResult<()> {
        Ok(self.tracker.start()?)
    }

    /// Load the model at `url` and add it to the scene with `material`.
    ///
    /// `configure` runs on the new mesh before it joins the scene, e.g. to
    /// edit its UV layers.
    pub fn add_model(
        &self,
        url: &str,
        material: MultitextureMaterial,
        configure: impl FnOnce(&mut Mesh) + 'static,
    ) -> WorldResult<LoadHandle<MeshId>> {
        let token = self.tracker.register(url)?;
        let scene = self.scene.clone();
        let url = url.to_string();
        Ok(spawn_load(token, self.tracker.load_timeout(), async move {
            let geometry = load_geometry(&url).await?;
            let mut mesh = Mesh::new(url, geometry, material);
            configure(&mut mesh);
            Ok(scene.borrow_mut().add(mesh))
        }))
    }

    /// Shorthand for [`load_image_texture`] against this world's tracker.
    pub fn load_texture(&self, url: &str) -> WorldResult<(Texture, LoadHandle<()>)> {
        load_image_texture(url, &self.tracker)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
        let aspect = self.config.aspect();
        self.renderer.set_size(width, height);
        self.renderer.set_viewport(0, 0, width, height);
        self.camera.set_aspect(aspect);
        self.widescreen = aspect > WIDESCREEN_ASPECT;
        log::debug!("Resized to {}x{} (widescreen: {})", width, height, self.widescreen);
    }

    /// Pose the camera at `time` and draw a frame.
    pub fn render(&mut self, time: f32) -> WorldResult<()> {
        if !self.tracker.is_ready() {
            match self.config.violation_policy {
                ViolationPolicy::Strict => return Err(ProtocolViolation::RenderBeforeReady.into()),
                ViolationPolicy::Lenient => log::warn!(
                    "Rendering with {} resource(s) still pending",
                    self.tracker.pending()
                ),
            }
        }
        self.camera.set_animation_time(time);
        let scene = self.scene.borrow();
        self.renderer.render(&scene, &self.camera)
    }

    /// Resolves with the ready report once the ready callback has run.
    pub fn ready(&self) -> impl Future<Output = ReadyReport> + 'static {
        self.tracker.ready()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn scene(&self) -> Ref<'_, Scene> {
        self.scene.borrow()
    }

    pub fn scene_mut(&self) -> RefMut<'_, Scene> {
        self.scene.borrow_mut()
    }

    pub fn camera(&self) -> &AnimatedCamera {
        &self.camera
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn widescreen(&self) -> bool {
        self.widescreen
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }
}
