//! Offscreen wgpu renderer.
//!
//! The context owns the device, a color target plus depth buffer of the
//! drawing-buffer size, and GPU copies of everything the scene references.
//! Scene state stays CPU-side: every [`Renderer::render`] call uploads whatever
//! changed since the previous frame (geometry by version, textures by their
//! `needs_update` flag) and draws every visible mesh. [`Context::read_frame`]
//! copies the color target back into an [`RgbaImage`].

use std::{collections::HashMap, iter, time::Duration};

use anyhow::{Context as _, anyhow};
use cgmath::SquareMatrix;
use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::{
    camera::{AnimatedCamera, CameraUniform},
    config::WorldConfig,
    data_structures::{
        mesh::{Mesh, MeshId},
        scene_graph::Scene,
        texture::{GpuTexture, Texture, TextureId},
    },
    error::{WorldError, WorldResult},
    pipelines::multitexture::{MultitexturePipelines, material_bind_group},
    render::{Capabilities, Renderer},
};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
struct CameraResources {
    uniform: CameraUniform,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug)]
struct TextureEntry {
    gpu: GpuTexture,
    generation: u64,
}

/// Which GPU textures a material bind group was built from. `None` is the
/// default white texture.
type MaterialKey = (Option<(TextureId, u64)>, Option<(TextureId, u64)>);

#[derive(Debug)]
struct GpuMesh {
    vertices: wgpu::Buffer,
    vertex_count: u32,
    geometry_version: u64,
    model_buffer: wgpu::Buffer,
    model_bind_group: wgpu::BindGroup,
    border_buffer: wgpu::Buffer,
    material: Option<(MaterialKey, wgpu::BindGroup)>,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ModelUniform {
    model: [[f32; 4]; 4],
}

#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    capabilities: Capabilities,
    clear_colour: wgpu::Color,
    size: (u32, u32),
    viewport: Viewport,
    target: wgpu::Texture,
    depth_texture: GpuTexture,
    camera: CameraResources,
    pipelines: MultitexturePipelines,
    default_texture: GpuTexture,
    textures: HashMap<TextureId, TextureEntry>,
    texture_generation: u64,
    meshes: HashMap<MeshId, GpuMesh>,
    frames_rendered: u64,
}

fn create_target(device: &wgpu::Device, (width, height): (u32, u32)) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Color Target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    })
}

/// Rows copied out of a texture must be 256-byte aligned.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

impl Context {
    pub async fn new(config: &WorldConfig) -> WorldResult<Self> {
        Self::create(config).await.map_err(WorldError::Render)
    }

    async fn create(config: &WorldConfig) -> anyhow::Result<Self> {
        log::debug!("WGPU setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable graphics adapter")?;

        log::debug!("device and queue");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
            })
            .await
            .context("could not open the graphics device")?;

        let capabilities = Capabilities {
            derivatives: adapter.get_downlevel_capabilities().shader_model != wgpu::ShaderModel::Sm2,
        };

        let size = (config.width, config.height);
        let pipelines = MultitexturePipelines::new(&device, COLOR_FORMAT);

        let uniform = CameraUniform::new();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &pipelines.camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        let target = create_target(&device, size);
        let depth_texture = GpuTexture::create_depth_texture(&device, [size.0, size.1], "depth_texture");
        let default_texture = GpuTexture::create_default(&device, &queue);

        Ok(Self {
            capabilities,
            clear_colour: config.clear_colour,
            size,
            viewport: Viewport {
                x: 0,
                y: 0,
                width: size.0,
                height: size.1,
            },
            target,
            depth_texture,
            camera: CameraResources {
                uniform,
                buffer,
                bind_group,
            },
            pipelines,
            default_texture,
            textures: HashMap::new(),
            texture_generation: 0,
            meshes: HashMap::new(),
            frames_rendered: 0,
            device,
            queue,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn pipeline_variants(&self) -> usize {
        self.pipelines.variant_count()
    }

    /// Uploads `texture` if it changed and reports which GPU copy to bind.
    fn sync_texture(&mut self, texture: &Texture) -> Option<(TextureId, u64)> {
        let id = texture.id();
        let label = texture.label();
        let (device, queue) = (&self.device, &self.queue);
        let textures = &mut self.textures;
        let generation = &mut self.texture_generation;
        texture.consume_update(|img| {
            if let Some(entry) = textures.get(&id).filter(|e| e.gpu.size == img.dimensions()) {
                entry.gpu.write(queue, img);
                return;
            }
            // new or resized: the old GPU texture cannot be written in place
            *generation += 1;
            textures.insert(
                id,
                TextureEntry {
                    gpu: GpuTexture::from_image(device, queue, img, Some(&label)),
                    generation: *generation,
                },
            );
        });
        self.textures.get(&id).map(|entry| (id, entry.generation))
    }

    fn gpu_texture(&self, key: Option<(TextureId, u64)>) -> &GpuTexture {
        key.and_then(|(id, _)| self.textures.get(&id))
            .map_or(&self.default_texture, |entry| &entry.gpu)
    }

    fn sync_mesh(&mut self, mesh: &Mesh, world: cgmath::Matrix4<f32>) {
        let stale = self
            .meshes
            .get(&mesh.id())
            .is_none_or(|gpu| gpu.geometry_version != mesh.geometry_version());
        if stale {
            let vertices = mesh.geometry().triangulated_vertices();
            let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} vertices", mesh.name)),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            match self.meshes.get_mut(&mesh.id()) {
                Some(gpu) => {
                    gpu.vertices = vertex_buffer;
                    gpu.vertex_count = vertices.len() as u32;
                    gpu.geometry_version = mesh.geometry_version();
                }
                None => {
                    let identity: [[f32; 4]; 4] = cgmath::Matrix4::identity().into();
                    let model_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Model Buffer"),
                        contents: bytemuck::cast_slice(&[ModelUniform { model: identity }]),
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    });
                    let model_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        layout: &self.pipelines.model_layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: model_buffer.as_entire_binding(),
                        }],
                        label: Some("model_bind_group"),
                    });
                    let border_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Border Buffer"),
                        contents: bytemuck::cast_slice(&mesh.material.border_uniform()),
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    });
                    self.meshes.insert(
                        mesh.id(),
                        GpuMesh {
                            vertices: vertex_buffer,
                            vertex_count: vertices.len() as u32,
                            geometry_version: mesh.geometry_version(),
                            model_buffer,
                            model_bind_group,
                            border_buffer,
                            material: None,
                        },
                    );
                }
            }
        }

        let key: MaterialKey = (
            self.sync_texture(&mesh.material.texture1),
            mesh.material
                .texture2
                .as_ref()
                .and_then(|texture| self.sync_texture(texture)),
        );

        let Some(gpu) = self.meshes.get(&mesh.id()) else {
            return;
        };
        self.queue.write_buffer(
            &gpu.model_buffer,
            0,
            bytemuck::cast_slice(&[ModelUniform { model: world.into() }]),
        );
        self.queue
            .write_buffer(&gpu.border_buffer, 0, bytemuck::cast_slice(&mesh.material.border_uniform()));

        if gpu.material.as_ref().is_none_or(|(built, _)| *built != key) {
            let bind_group = material_bind_group(
                &self.device,
                &self.pipelines.material_layout,
                self.gpu_texture(key.0),
                self.gpu_texture(key.1),
                &gpu.border_buffer,
            );
            if let Some(gpu) = self.meshes.get_mut(&mesh.id()) {
                gpu.material = Some((key, bind_group));
            }
        }
    }

    /// Copies the color target back to the CPU.
    pub async fn read_frame(&self) -> WorldResult<RgbaImage> {
        self.read_target().await.map_err(WorldError::Render)
    }

    async fn read_target(&self) -> anyhow::Result<RgbaImage> {
        let (width, height) = (self.size.0.max(1), self.size.1.max(1));
        let padded_row = padded_bytes_per_row(width);
        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            size: (padded_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            label: Some("Frame Readback Buffer"),
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(iter::once(encoder.finish()));

        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        let buffer_slice = output_buffer.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(3)),
            })
            .map_err(|e| anyhow!("waiting for the frame copy failed: {e}"))?;
        rx.receive()
            .await
            .context("frame buffer mapping was dropped")?
            .context("frame buffer could not be mapped")?;

        let data = buffer_slice.get_mapped_range();
        let row = (width * 4) as usize;
        let mut pixels = Vec::with_capacity(row * height as usize);
        for chunk in data.chunks(padded_row as usize) {
            pixels.extend_from_slice(&chunk[..row]);
        }
        drop(data);
        output_buffer.unmap();

        RgbaImage::from_raw(width, height, pixels).context("frame size does not match its buffer")
    }
}

impl Renderer for Context {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.viewport = Viewport { x, y, width, height };
    }

    fn set_size(&mut self, width: u32, height: u32) {
        if (width, height) == self.size {
            return;
        }
        self.size = (width, height);
        self.target = create_target(&self.device, self.size);
        self.depth_texture = GpuTexture::create_depth_texture(&self.device, [width, height], "depth_texture");
    }

    fn render(&mut self, scene: &Scene, camera: &AnimatedCamera) -> WorldResult<()> {
        self.camera.uniform.update_view_proj(camera);
        self.queue
            .write_buffer(&self.camera.buffer, 0, bytemuck::cast_slice(&[self.camera.uniform]));

        self.meshes.retain(|id, _| scene.get(*id).is_some());
        let mut draws = Vec::new();
        for mesh in scene.iter().filter(|m| m.visible) {
            self.sync_mesh(mesh, scene.world_transform(mesh));
            let features = mesh.material.features(&self.capabilities);
            self.pipelines.prepare(&self.device, features);
            draws.push((mesh.id(), features));
        }

        let target_view = self.target.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("World Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                multiview_mask: None,
                timestamp_writes: None,
            });

            let (width, height) = (self.size.0.max(1), self.size.1.max(1));
            let x = self.viewport.x.min(width - 1);
            let y = self.viewport.y.min(height - 1);
            render_pass.set_viewport(
                x as f32,
                y as f32,
                self.viewport.width.min(width - x).max(1) as f32,
                self.viewport.height.min(height - y).max(1) as f32,
                0.0,
                1.0,
            );
            render_pass.set_bind_group(0, &self.camera.bind_group, &[]);

            for (id, features) in &draws {
                let (Some(gpu), Some(pipeline)) = (self.meshes.get(id), self.pipelines.get(*features)) else {
                    log::error!("Mesh {:?} was not prepared for drawing", id);
                    continue;
                };
                let Some((_, material)) = &gpu.material else {
                    continue;
                };
                if gpu.vertex_count == 0 {
                    continue;
                }
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(1, &gpu.model_bind_group, &[]);
                render_pass.set_bind_group(2, material, &[]);
                render_pass.set_vertex_buffer(0, gpu.vertices.slice(..));
                render_pass.draw(0..gpu.vertex_count, 0..1);
            }
        }
        self.queue.submit(iter::once(encoder.finish()));
        self.frames_rendered += 1;
        Ok(())
    }
}
