//! Textures fed from named video frames supplied by the host.

use std::{collections::HashMap, future::Future};

use image::RgbaImage;

use crate::{
    data_structures::texture::Texture,
    error::{WorldError, WorldResult},
    resources::{LoadHandle, texture::{PendingImage, track_texture_image}},
    tracker::Tracker,
};

/// Decoded frames by name, as provided by the hosting media pipeline.
pub trait FrameSource {
    fn frame(&self, name: &str) -> Option<&RgbaImage>;
}

impl FrameSource for HashMap<String, RgbaImage> {
    fn frame(&self, name: &str) -> Option<&RgbaImage> {
        self.get(name)
    }
}

/// Replace the texture's pixels with the current frame called `name`.
pub fn update_video_texture(texture: &Texture, source: &impl FrameSource, name: &str) -> WorldResult<()> {
    let frame = source
        .frame(name)
        .ok_or_else(|| WorldError::MissingFrame(name.to_string()))?;
    texture.set_image(frame.clone());
    Ok(())
}

/// Like [`update_video_texture`] for a frame that is still being decoded.
pub fn track_video_frame<F>(texture: &Texture, tracker: &Tracker, name: &str, decode: F) -> WorldResult<LoadHandle<()>>
where
    F: Future<Output = anyhow::Result<RgbaImage>> + 'static,
{
    log::debug!("Waiting for frame {} of {}", name, texture.label());
    track_texture_image(texture, tracker, PendingImage::Loading(Box::pin(decode)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_replace_pixels_and_flag_the_texture() {
        let mut frames = HashMap::new();
        frames.insert("video".to_string(), RgbaImage::from_pixel(2, 2, image::Rgba([9, 9, 9, 255])));
        let texture = Texture::new("video");
        update_video_texture(&texture, &frames, "video").unwrap();
        assert!(texture.needs_update());
        assert_eq!(texture.with_image(|img| img.get_pixel(1, 1).0), Some([9, 9, 9, 255]));
    }

    #[test]
    fn unknown_frames_are_reported() {
        let frames: HashMap<String, RgbaImage> = HashMap::new();
        let texture = Texture::new("video");
        let err = update_video_texture(&texture, &frames, "nope").unwrap_err();
        assert!(matches!(err, WorldError::MissingFrame(name) if name == "nope"));
        assert!(!texture.needs_update());
    }
}
