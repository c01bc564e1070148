use futures::future::LocalBoxFuture;
use image::RgbaImage;

use crate::{
    data_structures::texture::Texture,
    error::WorldResult,
    resources::{LoadHandle, load_binary, spawn_load},
    tracker::Tracker,
};

/// The pixel source of a texture that may still be decoding.
pub enum PendingImage {
    /// Already decoded; applied right away without touching the tracker.
    Complete(RgbaImage),
    /// Still on its way.
    Loading(LocalBoxFuture<'static, anyhow::Result<RgbaImage>>),
}

impl std::fmt::Debug for PendingImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(img) => f.debug_tuple("Complete").field(&img.dimensions()).finish(),
            Self::Loading(_) => f.write_str("Loading"),
        }
    }
}

pub fn decode_image(bytes: &[u8]) -> anyhow::Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Attach `image` to `texture`, holding back readiness until it is decoded.
pub fn track_texture_image(
    texture: &Texture,
    tracker: &Tracker,
    image: PendingImage,
) -> WorldResult<LoadHandle<()>> {
    match image {
        PendingImage::Complete(img) => {
            texture.set_image(img);
            Ok(LoadHandle::ready(texture.label(), ()))
        }
        PendingImage::Loading(decode) => {
            let token = tracker.register(texture.label())?;
            let texture = texture.clone();
            Ok(spawn_load(token, tracker.load_timeout(), async move {
                let img = decode.await?;
                texture.set_image(img);
                Ok(())
            }))
        }
    }
}

/// Create a texture and start loading `url` into it.
///
/// The texture is usable immediately; until the image arrives it renders as
/// the renderer's default texture.
pub fn load_image_texture(url: &str, tracker: &Tracker) -> WorldResult<(Texture, LoadHandle<()>)> {
    let texture = Texture::new(url);
    let path = url.to_string();
    let decode = Box::pin(async move {
        let bytes = load_binary(&path).await?;
        decode_image(&bytes)
    });
    let handle = track_texture_image(&texture, tracker, PendingImage::Loading(decode))?;
    Ok((texture, handle))
}
