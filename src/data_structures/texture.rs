//! Textures: the shared CPU-side handle and its GPU counterpart.
//!
//! A [`Texture`] is what loaders and materials hold on to. It owns the decoded
//! pixels and a `needs_update` flag that is raised whenever the pixel source
//! changes (first decode, a new video frame, re-rasterized text). The renderer
//! uploads flagged textures into a [`GpuTexture`] and lowers the flag again.

use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use image::RgbaImage;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

struct TextureState {
    label: String,
    image: Option<RgbaImage>,
    needs_update: bool,
}

/// Shared handle to decoded pixels. Clones refer to the same texture.
#[derive(Clone)]
pub struct Texture {
    id: TextureId,
    state: Rc<RefCell<TextureState>>,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("label", &state.label)
            .field("dimensions", &state.image.as_ref().map(|img| img.dimensions()))
            .field("needs_update", &state.needs_update)
            .finish()
    }
}

impl Texture {
    /// A texture whose pixels are still on their way.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: TextureId(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed)),
            state: Rc::new(RefCell::new(TextureState {
                label: label.into(),
                image: None,
                needs_update: false,
            })),
        }
    }

    pub fn from_image(label: impl Into<String>, image: RgbaImage) -> Self {
        let texture = Self::new(label);
        texture.set_image(image);
        texture
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn label(&self) -> String {
        self.state.borrow().label.clone()
    }

    /// Whether pixels are available.
    pub fn is_complete(&self) -> bool {
        self.state.borrow().image.is_some()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.state.borrow().image.as_ref().map(|img| img.dimensions())
    }

    /// Replace the pixels and flag the texture for upload.
    pub fn set_image(&self, image: RgbaImage) {
        let mut state = self.state.borrow_mut();
        state.image = Some(image);
        state.needs_update = true;
    }

    pub fn mark_needs_update(&self) {
        self.state.borrow_mut().needs_update = true;
    }

    pub fn needs_update(&self) -> bool {
        self.state.borrow().needs_update
    }

    pub fn with_image<R>(&self, f: impl FnOnce(&RgbaImage) -> R) -> Option<R> {
        self.state.borrow().image.as_ref().map(f)
    }

    /// Hands flagged pixels to `upload` and lowers the flag.
    pub(crate) fn consume_update<R>(&self, upload: impl FnOnce(&RgbaImage) -> R) -> Option<R> {
        let mut state = self.state.borrow_mut();
        if !state.needs_update {
            return None;
        }
        let result = state.image.as_ref().map(upload);
        if result.is_some() {
            state.needs_update = false;
        }
        result
    }
}

/// A GPU texture with its view and sampler.
#[derive(Clone, Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub size: (u32, u32),
}

impl GpuTexture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let extent = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            size: (extent.width, extent.height),
        }
    }

    /// Opaque white, bound wherever a material has no (loaded) texture so the
    /// pipeline layout never changes.
    pub fn create_default(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let white = RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        Self::from_image(device, queue, &white, Some("default white"))
    }

    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &RgbaImage,
        label: Option<&str>,
    ) -> Self {
        let dimensions = img.dimensions();
        let size = wgpu::Extent3d {
            width: dimensions.0,
            height: dimensions.1,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let gpu = Self {
            texture,
            view,
            sampler: create_default_sampler(device),
            size: dimensions,
        };
        gpu.write(queue, img);
        gpu
    }

    /// Overwrite the pixels in place. `img` must have the texture's size.
    pub fn write(&self, queue: &wgpu::Queue, img: &RgbaImage) {
        let (width, height) = img.dimensions();
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            img,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// Clamps to the edge: regions outside UV space are the material's business.
pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::MipmapFilterMode::Linear,
        ..Default::default()
    })
}
