//! The multitexture pipeline family.
//!
//! All variants share one shader module and one pipeline layout. They differ
//! only in the values of the shader's override constants, so a variant is
//! built the first time a material asks for its [`ShaderFeatures`] and reused
//! afterwards.

use std::collections::HashMap;

use crate::{
    data_structures::{material::ShaderFeatures, mesh::MeshVertex, texture::GpuTexture},
    pipelines::mk_render_pipeline,
};

pub struct MultitexturePipelines {
    shader: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    pub camera_layout: wgpu::BindGroupLayout,
    pub model_layout: wgpu::BindGroupLayout,
    pub material_layout: wgpu::BindGroupLayout,
    color_format: wgpu::TextureFormat,
    cache: HashMap<ShaderFeatures, wgpu::RenderPipeline>,
}

impl std::fmt::Debug for MultitexturePipelines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultitexturePipelines")
            .field("color_format", &self.color_format)
            .field("variants", &self.cache.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Override constant values for a feature set, by name as declared in the shader.
pub fn override_constants(features: ShaderFeatures) -> [(&'static str, f64); 3] {
    let flag = |on: bool| if on { 1.0 } else { 0.0 };
    [
        ("USE_TEXTURE2", flag(features.texture2)),
        ("USE_BORDERCOLOR", flag(features.border_color)),
        ("USE_ANTIALIAS", flag(features.antialias)),
    ]
}

fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some(label),
    })
}

fn texture_entries(binding: u32) -> [wgpu::BindGroupLayoutEntry; 2] {
    [
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: binding + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ]
}

/// Two texture/sampler pairs followed by the border uniform.
pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let [t1, s1] = texture_entries(0);
    let [t2, s2] = texture_entries(2);
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            t1,
            s1,
            t2,
            s2,
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
        label: Some("multitexture_material_layout"),
    })
}

pub fn material_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    texture1: &GpuTexture,
    texture2: &GpuTexture,
    border: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&texture1.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&texture1.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&texture2.view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(&texture2.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: border.as_entire_binding(),
            },
        ],
        label: Some("multitexture_material_bind_group"),
    })
}

impl MultitexturePipelines {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let camera_layout = uniform_layout(device, "camera_bind_group_layout");
        let model_layout = uniform_layout(device, "model_bind_group_layout");
        let material_layout = material_layout(device);
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Multitexture Pipeline Layout"),
            bind_group_layouts: &[Some(&camera_layout), Some(&model_layout), Some(&material_layout)],
            immediate_size: 0,
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Multitexture Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("multitexture.wgsl").into()),
        });
        Self {
            shader,
            layout,
            camera_layout,
            model_layout,
            material_layout,
            color_format,
            cache: HashMap::new(),
        }
    }

    /// Builds the variant for `features` on first use.
    pub fn prepare(&mut self, device: &wgpu::Device, features: ShaderFeatures) {
        if self.cache.contains_key(&features) {
            return;
        }
        log::debug!("Building multitexture pipeline for {:?}", features);
        let pipeline = mk_render_pipeline(
            device,
            &self.layout,
            self.color_format,
            Some(wgpu::BlendState::ALPHA_BLENDING),
            Some(GpuTexture::DEPTH_FORMAT),
            &[MeshVertex::desc()],
            &self.shader,
            &override_constants(features),
            "Multitexture Pipeline",
        );
        self.cache.insert(features, pipeline);
    }

    pub fn get(&self, features: ShaderFeatures) -> Option<&wgpu::RenderPipeline> {
        self.cache.get(&features)
    }

    pub fn variant_count(&self) -> usize {
        self.cache.len()
    }
}
