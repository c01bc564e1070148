//! The multitexture material and the shader features it asks for.

use crate::{data_structures::color::Color, data_structures::texture::Texture, render::Capabilities};

/// Pipeline specialization switches. One pipeline is built per distinct set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShaderFeatures {
    pub texture2: bool,
    pub border_color: bool,
    pub antialias: bool,
}

/// `texture1` sampled with the first UV layer, optionally multiplied by
/// `texture2` sampled with the second. Outside UV space a border color, if
/// set, replaces the texture samples.
#[derive(Clone, Debug)]
pub struct MultitextureMaterial {
    pub texture1: Texture,
    pub texture2: Option<Texture>,
    pub border_color: Option<Color>,
    pub border_opacity: f32,
}

impl MultitextureMaterial {
    pub fn new(texture1: Texture) -> Self {
        Self {
            texture1,
            texture2: None,
            border_color: None,
            border_opacity: 1.0,
        }
    }

    pub fn with_texture2(mut self, texture2: Texture) -> Self {
        self.texture2 = Some(texture2);
        self
    }

    pub fn with_border(mut self, color: Color, opacity: f32) -> Self {
        self.border_color = Some(color);
        self.border_opacity = opacity;
        self
    }

    /// Antialiased borders need screen-space derivatives; without them the
    /// border is drawn hard-edged.
    pub fn features(&self, capabilities: &Capabilities) -> ShaderFeatures {
        let border_color = self.border_color.is_some();
        ShaderFeatures {
            texture2: self.texture2.is_some(),
            border_color,
            antialias: border_color && capabilities.derivatives,
        }
    }

    /// `(border rgb, border_opacity)` as the shader expects it.
    pub fn border_uniform(&self) -> [f32; 4] {
        let c = self.border_color.unwrap_or(Color::TRANSPARENT);
        [c.r, c.g, c.b, self.border_opacity]
    }

    pub fn textures(&self) -> impl Iterator<Item = &Texture> {
        std::iter::once(&self.texture1).chain(self.texture2.as_ref())
    }
}
