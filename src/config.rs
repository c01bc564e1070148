//! Construction-time settings for a [`World`](crate::world::World).

use std::path::PathBuf;

use instant::Duration;

/// Environment variable that overrides the directory relative asset paths are
/// resolved against.
pub const ASSET_ROOT_ENV: &str = "VFX_WORLD_ASSETS";

/// How misuse of the readiness protocol is handled.
///
/// `Strict` returns the violation as an error, `Lenient` logs it and carries on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationPolicy {
    Strict,
    Lenient,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorldConfig {
    pub width: u32,
    pub height: u32,
    pub near: f32,
    pub far: f32,
    pub clear_colour: wgpu::Color,
    pub violation_policy: ViolationPolicy,
    /// Loads that take longer resolve as failures instead of stalling readiness.
    pub load_timeout: Option<Duration>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            near: 0.1,
            far: 1000.0,
            clear_colour: wgpu::Color::BLACK,
            violation_policy: ViolationPolicy::default(),
            load_timeout: None,
        }
    }
}

impl WorldConfig {
    pub fn new(width: u32, height: u32, near: f32, far: f32) -> Self {
        Self {
            width,
            height,
            near,
            far,
            ..Default::default()
        }
    }

    pub fn with_clear_colour(mut self, clear_colour: wgpu::Color) -> Self {
        self.clear_colour = clear_colour;
        self
    }

    pub fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.violation_policy = policy;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Directory relative asset paths are read from.
pub fn asset_root() -> PathBuf {
    std::env::var_os(ASSET_ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./").join("assets"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_build_profile() {
        let config = WorldConfig::default();
        assert_eq!(config.violation_policy == ViolationPolicy::Strict, cfg!(debug_assertions));
        assert!(config.load_timeout.is_none());
    }

    #[test]
    fn aspect_never_divides_by_zero() {
        let config = WorldConfig::new(640, 0, 0.1, 100.0);
        assert_eq!(config.aspect(), 640.0);
        assert_eq!(WorldConfig::new(800, 400, 0.1, 100.0).aspect(), 2.0);
    }
}
