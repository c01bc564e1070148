//! Text rasterized into textures.
//!
//! Styling follows the conventions of a 2D canvas: a CSS font shorthand, CSS
//! color strings, and an anchor point chosen by horizontal alignment and
//! vertical baseline. Text that does not fit the target size is scaled down
//! uniformly until it does.

use glyphon::{Attrs, Buffer, Family, Metrics, Shaping, Style, Weight};
use image::{Rgba, RgbaImage};

use crate::{
    data_structures::{color::Color, texture::Texture},
    error::{WorldError, WorldResult},
    resources::font::FontLibrary,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextAlign {
    #[default]
    Left,
    Right,
    Center,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextBaseline {
    #[default]
    Top,
    Middle,
    Bottom,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextStyle {
    /// CSS font shorthand, e.g. `"bold italic 30px Helvetica"`.
    pub font_style: String,
    pub text_color: String,
    pub background_color: Option<String>,
    pub text_align: TextAlign,
    pub text_baseline: TextBaseline,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_style: String::from("10px sans-serif"),
            text_color: String::from("black"),
            background_color: None,
            text_align: TextAlign::default(),
            text_baseline: TextBaseline::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FontFamily {
    Named(String),
    Serif,
    SansSerif,
    Monospace,
    Cursive,
    Fantasy,
}

/// A parsed CSS font shorthand.
#[derive(Clone, Debug, PartialEq)]
pub struct FontShorthand {
    pub italic: bool,
    pub weight: u16,
    pub size_px: f32,
    pub line_height_px: Option<f32>,
    pub family: FontFamily,
}

impl Default for FontShorthand {
    fn default() -> Self {
        Self {
            italic: false,
            weight: 400,
            size_px: 10.0,
            line_height_px: None,
            family: FontFamily::SansSerif,
        }
    }
}

fn parse_length(value: &str, font_size: f32) -> Option<f32> {
    let (number, unit) = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map_or((value, ""), |idx| value.split_at(idx));
    let number: f32 = number.parse().ok()?;
    match unit {
        "px" => Some(number),
        "pt" => Some(number * 4.0 / 3.0),
        "em" | "rem" => Some(number * font_size),
        "%" => Some(number / 100.0 * font_size),
        // unitless is only valid as a line-height multiplier
        "" => Some(number * font_size),
        _ => None,
    }
}

fn parse_family(families: &str) -> FontFamily {
    let first = families.split(',').next().unwrap_or("").trim();
    let name = first.trim_matches(|c| c == '"' || c == '\'');
    match name.to_ascii_lowercase().as_str() {
        "serif" => FontFamily::Serif,
        "sans-serif" | "" => FontFamily::SansSerif,
        "monospace" => FontFamily::Monospace,
        "cursive" => FontFamily::Cursive,
        "fantasy" => FontFamily::Fantasy,
        _ => FontFamily::Named(name.to_string()),
    }
}

impl FontShorthand {
    /// Parse `[style] [variant] [weight] size[/line-height] family[, family]*`.
    pub fn parse_css(font: &str) -> WorldResult<Self> {
        let mut shorthand = FontShorthand::default();
        let mut rest = font.trim();
        loop {
            let (token, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            match token.to_ascii_lowercase().as_str() {
                "italic" | "oblique" => shorthand.italic = true,
                "normal" | "small-caps" => {}
                "bold" | "bolder" => shorthand.weight = 700,
                "lighter" => shorthand.weight = 300,
                w if w.len() == 3 && w.ends_with("00") && w.parse::<u16>().is_ok() => {
                    shorthand.weight = w.parse().unwrap_or(400);
                }
                _ => break,
            }
            rest = tail.trim_start();
        }

        let (size, family) = rest
            .split_once(char::is_whitespace)
            .ok_or_else(|| WorldError::text(format!("font \"{font}\" needs a size and a family")))?;
        let (size, line_height) = match size.split_once('/') {
            Some((size, line_height)) => (size, Some(line_height)),
            None => (size, None),
        };
        shorthand.size_px = parse_length(size, 16.0)
            .filter(|s| *s > 0.0 && size.ends_with(|c: char| c.is_ascii_alphabetic() || c == '%'))
            .ok_or_else(|| WorldError::text(format!("invalid font size \"{size}\"")))?;
        shorthand.line_height_px = match line_height {
            Some(lh) => Some(
                parse_length(lh, shorthand.size_px)
                    .ok_or_else(|| WorldError::text(format!("invalid line height \"{lh}\"")))?,
            ),
            None => None,
        };
        shorthand.family = parse_family(family);
        Ok(shorthand)
    }

    fn attrs(&self) -> Attrs<'_> {
        let family = match &self.family {
            FontFamily::Named(name) => Family::Name(name),
            FontFamily::Serif => Family::Serif,
            FontFamily::SansSerif => Family::SansSerif,
            FontFamily::Monospace => Family::Monospace,
            FontFamily::Cursive => Family::Cursive,
            FontFamily::Fantasy => Family::Fantasy,
        };
        Attrs::new()
            .family(family)
            .weight(Weight(self.weight))
            .style(if self.italic { Style::Italic } else { Style::Normal })
    }

    fn metrics(&self, scale: f32) -> Metrics {
        let line_height = self.line_height_px.unwrap_or(self.size_px * 1.2);
        Metrics::new(self.size_px * scale, line_height * scale)
    }
}

/// Uniform scale that makes text of `text_size` fit into `target`, never
/// enlarging it.
pub fn fit_scale(target: (f32, f32), text_size: (f32, f32)) -> f32 {
    let scale_x = if text_size.0 > 0.0 { target.0 / text_size.0 } else { 1.0 };
    let scale_y = if text_size.1 > 0.0 { target.1 / text_size.1 } else { 1.0 };
    scale_x.min(scale_y).min(1.0)
}

/// Top-left corner of a text block of `text_size` anchored inside `target`.
pub fn layout_origin(
    align: TextAlign,
    baseline: TextBaseline,
    target: (f32, f32),
    text_size: (f32, f32),
) -> (f32, f32) {
    let x = match align {
        TextAlign::Left => 0.0,
        TextAlign::Right => target.0 - text_size.0,
        TextAlign::Center => (target.0 - text_size.0) / 2.0,
    };
    let y = match baseline {
        TextBaseline::Top => 0.0,
        TextBaseline::Middle => (target.1 - text_size.1) / 2.0,
        TextBaseline::Bottom => target.1 - text_size.1,
    };
    (x, y)
}

fn shape(
    fonts: &mut FontLibrary,
    text: &str,
    shorthand: &FontShorthand,
    scale: f32,
) -> (Buffer, (f32, f32)) {
    let font_system = &mut fonts.font_system;
    let mut buffer = Buffer::new(font_system, shorthand.metrics(scale));
    buffer.set_size(font_system, None, None);
    buffer.set_text(font_system, text, &shorthand.attrs(), Shaping::Advanced, None);
    buffer.shape_until_scroll(font_system, false);
    let (width, height) = buffer.layout_runs().fold((0.0f32, 0.0f32), |(w, h), run| {
        (w.max(run.line_w), h.max(run.line_top + run.line_height))
    });
    (buffer, (width, height))
}

/// "over" compositing of a straight-alpha color onto a pixel.
fn blend(dst: &mut Rgba<u8>, src: [u8; 4]) {
    let src_a = src[3] as f32 / 255.0;
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }
    for c in 0..3 {
        let value = (src[c] as f32 * src_a + dst[c] as f32 * dst_a * (1.0 - src_a)) / out_a;
        dst[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

/// Rasterize `text` into a new `width` x `height` texture.
pub fn create_text_texture(
    text: &str,
    width: u32,
    height: u32,
    style: &TextStyle,
    fonts: &mut FontLibrary,
) -> WorldResult<Texture> {
    let shorthand = FontShorthand::parse_css(&style.font_style)?;
    let text_color = Color::parse_css(&style.text_color)?;
    let background = style
        .background_color
        .as_deref()
        .map(Color::parse_css)
        .transpose()?;

    let mut image = RgbaImage::from_pixel(
        width,
        height,
        Rgba(background.unwrap_or(Color::TRANSPARENT).to_rgba8()),
    );

    let label = format!("text: {text}");
    if fonts.face_count() == 0 {
        log::warn!("No fonts available, \"{}\" is drawn as background only", text);
        return Ok(Texture::from_image(label, image));
    }
    // nothing fits into an empty target, and shaping at scale 0 is invalid
    if width == 0 || height == 0 {
        return Ok(Texture::from_image(label, image));
    }

    let target = (width as f32, height as f32);
    let (mut buffer, mut text_size) = shape(fonts, text, &shorthand, 1.0);
    let scale = fit_scale(target, text_size);
    if scale < 1.0 {
        log::debug!("Scaling text \"{}\" by {} to fit {}x{}", text, scale, width, height);
        (buffer, text_size) = shape(fonts, text, &shorthand, scale);
    }
    let (x0, y0) = layout_origin(style.text_align, style.text_baseline, target, text_size);
    let (x0, y0) = (x0.round() as i32, y0.round() as i32);

    let [r, g, b, a] = text_color.to_rgba8();
    let FontLibrary {
        font_system,
        swash_cache,
        ..
    } = fonts;
    buffer.draw(
        font_system,
        swash_cache,
        glyphon::Color::rgba(r, g, b, a),
        |x, y, w, h, color| {
            let [cr, cg, cb, ca] = color.as_rgba();
            if ca == 0 {
                return;
            }
            for py in (y0 + y)..(y0 + y + h as i32) {
                for px in (x0 + x)..(x0 + x + w as i32) {
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }
                    blend(image.get_pixel_mut(px as u32, py as u32), [cr, cg, cb, ca]);
                }
            }
        },
    );

    Ok(Texture::from_image(label, image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_font_shorthand() {
        let shorthand = FontShorthand::parse_css("bold italic 30px Helvetica").unwrap();
        assert!(shorthand.italic);
        assert_eq!(shorthand.weight, 700);
        assert_eq!(shorthand.size_px, 30.0);
        assert_eq!(shorthand.family, FontFamily::Named("Helvetica".into()));

        let shorthand = FontShorthand::parse_css("12pt/2 \"Times New Roman\", serif").unwrap();
        assert_eq!(shorthand.size_px, 16.0);
        assert_eq!(shorthand.line_height_px, Some(32.0));
        assert_eq!(shorthand.family, FontFamily::Named("Times New Roman".into()));

        let default_font = FontShorthand::parse_css(&TextStyle::default().font_style).unwrap();
        assert_eq!(default_font, FontShorthand::default());
        assert_eq!(FontShorthand::parse_css("300 2em monospace").unwrap().size_px, 32.0);
    }

    #[test]
    fn rejects_fonts_without_size_or_family() {
        assert!(FontShorthand::parse_css("bold").is_err());
        assert!(FontShorthand::parse_css("30 Helvetica").is_err());
        assert!(FontShorthand::parse_css("big Helvetica").is_err());
    }

    #[test]
    fn oversized_text_is_scaled_down_uniformly() {
        assert_eq!(fit_scale((100.0, 50.0), (200.0, 20.0)), 0.5);
        assert_eq!(fit_scale((100.0, 50.0), (50.0, 100.0)), 0.5);
        assert_eq!(fit_scale((100.0, 50.0), (10.0, 10.0)), 1.0);
        assert_eq!(fit_scale((100.0, 50.0), (0.0, 0.0)), 1.0);
    }

    #[test]
    fn anchors_follow_align_and_baseline() {
        let target = (100.0, 40.0);
        let text = (30.0, 10.0);
        assert_eq!(layout_origin(TextAlign::Left, TextBaseline::Top, target, text), (0.0, 0.0));
        assert_eq!(layout_origin(TextAlign::Right, TextBaseline::Bottom, target, text), (70.0, 30.0));
        assert_eq!(layout_origin(TextAlign::Center, TextBaseline::Middle, target, text), (35.0, 15.0));
    }

    #[test]
    fn blending_over_transparent_keeps_the_source() {
        let mut px = Rgba([0, 0, 0, 0]);
        blend(&mut px, [200, 100, 50, 255]);
        assert_eq!(px, Rgba([200, 100, 50, 255]));
        let mut px = Rgba([0, 0, 255, 255]);
        blend(&mut px, [255, 0, 0, 0]);
        assert_eq!(px, Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn text_textures_are_sized_filled_and_flagged() {
        let mut fonts = FontLibrary::empty();
        let style = TextStyle {
            background_color: Some("#00ff00".into()),
            text_align: TextAlign::Center,
            ..Default::default()
        };
        let texture = create_text_texture("Hello", 64, 16, &style, &mut fonts).unwrap();
        assert_eq!(texture.dimensions(), Some((64, 16)));
        assert!(texture.needs_update());
        // no fonts loaded, so nothing but background
        assert_eq!(texture.with_image(|img| img.get_pixel(0, 0).0), Some([0, 255, 0, 255]));
    }

    fn dejavu() -> FontLibrary {
        let mut fonts = FontLibrary::empty();
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/DejaVuSans.ttf");
        let data = std::fs::read(path).unwrap();
        fonts.load_font_data("DejaVuSans.ttf", data).unwrap();
        fonts
    }

    fn dejavu_style(align: TextAlign, baseline: TextBaseline) -> TextStyle {
        TextStyle {
            font_style: String::from("16px \"DejaVu Sans\""),
            text_align: align,
            text_baseline: baseline,
            ..Default::default()
        }
    }

    /// `(min_x, min_y, max_x, max_y)` of all pixels with any coverage.
    fn ink_bounds(texture: &Texture) -> Option<(u32, u32, u32, u32)> {
        texture
            .with_image(|img| {
                img.enumerate_pixels()
                    .filter(|(_, _, px)| px[3] > 0)
                    .fold(None, |bounds, (x, y, _)| match bounds {
                        None => Some((x, y, x, y)),
                        Some((x0, y0, x1, y1)) => Some((x0.min(x), y0.min(y), x1.max(x), y1.max(y))),
                    })
            })
            .flatten()
    }

    #[test]
    fn left_top_text_starts_at_the_origin() {
        let mut fonts = dejavu();
        let style = dejavu_style(TextAlign::Left, TextBaseline::Top);
        let texture = create_text_texture("Hi", 100, 40, &style, &mut fonts).unwrap();
        let (min_x, min_y, max_x, max_y) = ink_bounds(&texture).unwrap();
        assert!(min_x <= 4, "ink starts at x = {min_x}");
        assert!(min_y <= 8, "ink starts at y = {min_y}");
        assert!(max_x < 50 && max_y < 20);
        // glyph coverage is blended in the text color
        let inked = texture.with_image(|img| img.pixels().any(|px| px[3] > 128 && px.0[..3] == [0, 0, 0]));
        assert_eq!(inked, Some(true));
    }

    #[test]
    fn right_bottom_text_ends_at_the_far_corner() {
        let mut fonts = dejavu();
        let style = dejavu_style(TextAlign::Right, TextBaseline::Bottom);
        let texture = create_text_texture("Hi", 100, 40, &style, &mut fonts).unwrap();
        let (min_x, min_y, max_x, max_y) = ink_bounds(&texture).unwrap();
        assert!((92..100).contains(&max_x), "ink ends at x = {max_x}");
        assert!(min_x > 50);
        assert!(min_y > 20 && max_y < 40, "ink spans y = {min_y}..={max_y}");
    }

    #[test]
    fn centered_text_is_balanced() {
        let mut fonts = dejavu();
        let style = dejavu_style(TextAlign::Center, TextBaseline::Middle);
        let texture = create_text_texture("Hi", 100, 40, &style, &mut fonts).unwrap();
        let (min_x, _, max_x, _) = ink_bounds(&texture).unwrap();
        let left = min_x as i32;
        let right = 99 - max_x as i32;
        assert!((left - right).abs() <= 4, "margins {left} and {right}");
    }

    #[test]
    fn oversized_text_is_shrunk_into_the_texture() {
        let mut fonts = dejavu();
        let style = dejavu_style(TextAlign::Left, TextBaseline::Top);
        let text = "Hello world, once again";
        let full = create_text_texture(text, 1000, 40, &style, &mut fonts).unwrap();
        let (_, full_top, full_right, full_bottom) = ink_bounds(&full).unwrap();
        assert!(full_right > 120, "unscaled text is {full_right} wide");

        let shrunk = create_text_texture(text, 60, 40, &style, &mut fonts).unwrap();
        let (min_x, min_y, max_x, max_y) = ink_bounds(&shrunk).unwrap();
        assert!(min_x <= 2);
        // the whole line fits, so its right end is near the edge rather than cut off
        assert!((45..60).contains(&max_x), "ink ends at x = {max_x}");
        assert!(max_y - min_y < full_bottom - full_top);
    }

    #[test]
    fn empty_targets_do_not_shape() {
        let mut fonts = dejavu();
        let style = dejavu_style(TextAlign::Center, TextBaseline::Middle);
        let texture = create_text_texture("Hi", 0, 16, &style, &mut fonts).unwrap();
        assert_eq!(texture.dimensions(), Some((0, 16)));
        let texture = create_text_texture("Hi", 32, 0, &style, &mut fonts).unwrap();
        assert_eq!(texture.dimensions(), Some((32, 0)));
    }

    #[test]
    fn bad_colors_are_errors() {
        let mut fonts = FontLibrary::empty();
        let style = TextStyle {
            text_color: "not-a-color".into(),
            ..Default::default()
        };
        assert!(create_text_texture("x", 8, 8, &style, &mut fonts).is_err());
    }
}
