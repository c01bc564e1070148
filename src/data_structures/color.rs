//! Straight-alpha RGBA colors parsed from CSS-like strings.

use std::str::FromStr;

use crate::error::WorldError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Accepts `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb(..)`, `rgba(..)`
    /// and a handful of named colors.
    pub fn parse_css(s: &str) -> Result<Self, WorldError> {
        let s = s.trim().to_ascii_lowercase();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some(args) = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return parse_rgb_function(args);
        }
        named(&s).ok_or_else(|| WorldError::text(format!("unknown color \"{s}\"")))
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        fn to_u8(x: f32) -> u8 {
            (x.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        [to_u8(self.r), to_u8(self.g), to_u8(self.b), to_u8(self.a)]
    }
}

impl FromStr for Color {
    type Err = WorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_css(s)
    }
}

impl From<Color> for wgpu::Color {
    fn from(c: Color) -> Self {
        wgpu::Color {
            r: c.r as f64,
            g: c.g as f64,
            b: c.b as f64,
            a: c.a as f64,
        }
    }
}

fn parse_hex(hex: &str) -> Result<Color, WorldError> {
    let invalid = || WorldError::text(format!("invalid hex color \"#{hex}\""));
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let digits: Vec<u8> = match hex.len() {
        // #rgb and #rgba double every digit
        3 | 4 => hex
            .chars()
            .map(|c| {
                let d = c.to_digit(16).unwrap_or(0) as u8;
                d * 16 + d
            })
            .collect(),
        6 | 8 => (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    let channel = |i: usize| digits.get(i).map_or(1.0, |&d| d as f32 / 255.0);
    Ok(Color::rgba(channel(0), channel(1), channel(2), channel(3)))
}

fn parse_rgb_function(args: &str) -> Result<Color, WorldError> {
    let parts: Vec<&str> = args
        .split(|c| c == ',' || c == '/' || c == ' ')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return Err(WorldError::text(format!("rgb() takes 3 or 4 values, got \"{args}\"")));
    }
    let number = |p: &str, scale: f32| -> Result<f32, WorldError> {
        let (value, scale) = match p.strip_suffix('%') {
            Some(pct) => (pct, 100.0),
            None => (p, scale),
        };
        value
            .parse::<f32>()
            .map(|v| (v / scale).clamp(0.0, 1.0))
            .map_err(|_| WorldError::text(format!("invalid color component \"{p}\"")))
    };
    Ok(Color::rgba(
        number(parts[0], 255.0)?,
        number(parts[1], 255.0)?,
        number(parts[2], 255.0)?,
        match parts.get(3) {
            Some(alpha) => number(alpha, 1.0)?,
            None => 1.0,
        },
    ))
}

fn named(name: &str) -> Option<Color> {
    let (r, g, b) = match name {
        "transparent" => return Some(Color::TRANSPARENT),
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "lime" => (0, 255, 0),
        "green" => (0, 128, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "cyan" | "aqua" => (0, 255, 255),
        "magenta" | "fuchsia" => (255, 0, 255),
        "gray" | "grey" => (128, 128, 128),
        "silver" => (192, 192, 192),
        "orange" => (255, 165, 0),
        "purple" => (128, 0, 128),
        "navy" => (0, 0, 128),
        _ => return None,
    };
    Some(Color::rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0))
}
