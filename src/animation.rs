//! Keyframed camera animation.
//!
//! Camera flights are authored in a 3D tool and exported as one keyframe
//! channel per location and rotation axis plus the camera's field of view.
//! [`Animation::evaluate_time`] turns such a table into a [`CameraPose`] for
//! any point in time. It is a pure function: the same time always yields the
//! same bits.

use cgmath::{Deg, Matrix3, Rad, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{WorldError, WorldResult};

/// How the value moves from a keyframe to the next one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[serde(alias = "CONSTANT")]
    Constant,
    #[default]
    #[serde(alias = "LINEAR")]
    Linear,
    #[serde(alias = "BEZIER")]
    Bezier,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
    /// Applies to the segment starting at this key.
    pub interpolation: Interpolation,
    /// Bezier control point `[time, value]` before the key.
    pub handle_left: Option<[f32; 2]>,
    /// Bezier control point `[time, value]` after the key.
    pub handle_right: Option<[f32; 2]>,
}

impl Keyframe {
    pub fn linear(time: f32, value: f32) -> Self {
        Self {
            time,
            value,
            interpolation: Interpolation::Linear,
            handle_left: None,
            handle_right: None,
        }
    }
}

impl<'de> Deserialize<'de> for Keyframe {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Pair([f32; 2]),
            #[serde(rename_all = "camelCase")]
            Full {
                time: f32,
                value: f32,
                #[serde(default)]
                interpolation: Interpolation,
                #[serde(default)]
                handle_left: Option<[f32; 2]>,
                #[serde(default)]
                handle_right: Option<[f32; 2]>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Pair([time, value]) => Keyframe::linear(time, value),
            Repr::Full {
                time,
                value,
                interpolation,
                handle_left,
                handle_right,
            } => Keyframe {
                time,
                value,
                interpolation,
                handle_left,
                handle_right,
            },
        })
    }
}

/// Exported camera animation: channels, field of view and the optional frame range.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationData {
    /// `[start, end]` frames. When present, evaluation time is normalized clip time.
    #[serde(default)]
    pub range: Option<[f32; 2]>,
    /// Radians.
    #[serde(default, rename = "horizontalFOV", alias = "horizontalFov")]
    pub horizontal_fov: Option<f32>,
    /// Radians. Takes precedence over `horizontal_fov`.
    #[serde(default, rename = "verticalFOV", alias = "verticalFov")]
    pub vertical_fov: Option<f32>,
    #[serde(default)]
    pub location_x: Vec<Keyframe>,
    #[serde(default)]
    pub location_y: Vec<Keyframe>,
    #[serde(default)]
    pub location_z: Vec<Keyframe>,
    #[serde(default)]
    pub rotation_x: Vec<Keyframe>,
    #[serde(default)]
    pub rotation_y: Vec<Keyframe>,
    #[serde(default)]
    pub rotation_z: Vec<Keyframe>,
}

impl AnimationData {
    fn channels(&self) -> [(&'static str, &[Keyframe]); 6] {
        [
            ("locationX", &self.location_x),
            ("locationY", &self.location_y),
            ("locationZ", &self.location_z),
            ("rotationX", &self.rotation_x),
            ("rotationY", &self.rotation_y),
            ("rotationZ", &self.rotation_z),
        ]
    }

    pub fn validate(&self) -> WorldResult<()> {
        let fov = self.vertical_fov.or(self.horizontal_fov).ok_or_else(|| {
            WorldError::animation("animation data needs a horizontalFOV or verticalFOV")
        })?;
        if !fov.is_finite() || fov <= 0.0 || fov >= std::f32::consts::PI {
            return Err(WorldError::animation(format!(
                "field of view must be within (0, PI) radians, got {fov}"
            )));
        }
        if let Some([start, end]) = self.range {
            if !start.is_finite() || !end.is_finite() || start >= end {
                return Err(WorldError::animation(format!(
                    "frame range must be increasing, got [{start}, {end}]"
                )));
            }
        }
        for (name, keys) in self.channels() {
            if keys.iter().any(|k| !k.time.is_finite() || !k.value.is_finite()) {
                return Err(WorldError::animation(format!(
                    "{name} contains non-finite keyframes"
                )));
            }
            if !keys.windows(2).all(|w| w[0].time <= w[1].time) {
                return Err(WorldError::animation(format!(
                    "{name} keyframes must be sorted by time"
                )));
            }
        }
        Ok(())
    }
}

/// Where the camera is and where it looks at one point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub position: Vector3<f32>,
    /// Euler angles in radians, composed as `Rz * Ry * Rx`.
    pub rotation: Vector3<f32>,
    /// Vertical field of view.
    pub fov: Deg<f32>,
}

impl CameraPose {
    pub fn rotation_matrix(&self) -> Matrix3<f32> {
        euler_zyx(self.rotation)
    }
}

/// Rotation matrix for Euler angles applied X first, then Y, then Z.
///
/// The authoring tool calls this order "XYZ"; as a matrix product it is `Rz * Ry * Rx`.
/// Changing it silently breaks every exported camera flight.
pub fn euler_zyx(rotation: Vector3<f32>) -> Matrix3<f32> {
    Matrix3::from_angle_z(Rad(rotation.z))
        * Matrix3::from_angle_y(Rad(rotation.y))
        * Matrix3::from_angle_x(Rad(rotation.x))
}

/// Validated, immutable animation table.
#[derive(Clone, Debug)]
pub struct Animation {
    data: AnimationData,
}

impl Animation {
    pub fn new(data: AnimationData) -> WorldResult<Self> {
        data.validate()?;
        Ok(Self { data })
    }

    pub fn from_json(json: &str) -> WorldResult<Self> {
        let data: AnimationData = serde_json::from_str(json)
            .map_err(|e| WorldError::animation(format!("invalid animation data: {e}")))?;
        Self::new(data)
    }

    pub fn data(&self) -> &AnimationData {
        &self.data
    }

    /// Maps evaluation time onto keyframe time.
    pub fn frame_at(&self, time: f32) -> f64 {
        match self.data.range {
            Some([start, end]) => start as f64 + time as f64 * (end as f64 - start as f64),
            None => time as f64,
        }
    }

    pub fn vertical_fov(&self, aspect: f32) -> Rad<f32> {
        if let Some(vertical) = self.data.vertical_fov {
            return Rad(vertical);
        }
        // validate() guarantees one of the two is present
        let horizontal = self.data.horizontal_fov.unwrap_or_default();
        Rad(2.0 * ((horizontal / 2.0).tan() / aspect).atan())
    }

    pub fn evaluate_time(&self, time: f32, aspect: f32) -> CameraPose {
        let frame = self.frame_at(time);
        let d = &self.data;
        let sample = |keys: &[Keyframe]| sample_channel(keys, frame) as f32;
        CameraPose {
            position: Vector3::new(
                sample(&d.location_x),
                sample(&d.location_y),
                sample(&d.location_z),
            ),
            rotation: Vector3::new(
                sample(&d.rotation_x),
                sample(&d.rotation_y),
                sample(&d.rotation_z),
            ),
            fov: self.vertical_fov(aspect).into(),
        }
    }
}

/// Value of one channel at `frame`. Empty channels are 0, values are held
/// before the first and after the last key.
pub fn sample_channel(keys: &[Keyframe], frame: f64) -> f64 {
    let (first, last) = match (keys.first(), keys.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };
    if frame <= first.time as f64 {
        return first.value as f64;
    }
    if frame >= last.time as f64 {
        return last.value as f64;
    }
    // first key strictly after `frame`; 1 <= idx < len here
    let idx = keys.partition_point(|k| k.time as f64 <= frame);
    sample_segment(&keys[idx - 1], &keys[idx], frame)
}

fn sample_segment(a: &Keyframe, b: &Keyframe, frame: f64) -> f64 {
    let (t0, v0) = (a.time as f64, a.value as f64);
    let (t1, v1) = (b.time as f64, b.value as f64);
    let span = t1 - t0;
    match a.interpolation {
        Interpolation::Constant => v0,
        Interpolation::Linear => v0 + (v1 - v0) * ((frame - t0) / span),
        Interpolation::Bezier => {
            let [h1t, h1v] = a
                .handle_right
                .map(|[t, v]| [t as f64, v as f64])
                .unwrap_or([t0 + span / 3.0, v0 + (v1 - v0) / 3.0]);
            let [h2t, h2v] = b
                .handle_left
                .map(|[t, v]| [t as f64, v as f64])
                .unwrap_or([t1 - span / 3.0, v1 - (v1 - v0) / 3.0]);
            // Handles outside the segment would make time go backwards.
            let h1t = h1t.clamp(t0, t1);
            let h2t = h2t.clamp(t0, t1);
            let s = solve_cubic_for(t0, h1t, h2t, t1, frame);
            cubic(v0, h1v, h2v, v1, s)
        }
    }
}

fn cubic(p0: f64, p1: f64, p2: f64, p3: f64, s: f64) -> f64 {
    let r = 1.0 - s;
    r * r * r * p0 + 3.0 * r * r * s * p1 + 3.0 * r * s * s * p2 + s * s * s * p3
}

fn cubic_derivative(p0: f64, p1: f64, p2: f64, p3: f64, s: f64) -> f64 {
    let r = 1.0 - s;
    3.0 * r * r * (p1 - p0) + 6.0 * r * s * (p2 - p1) + 3.0 * s * s * (p3 - p2)
}

/// Curve parameter at which the (monotonic) time polynomial reaches `x`.
fn solve_cubic_for(x0: f64, x1: f64, x2: f64, x3: f64, x: f64) -> f64 {
    const EPSILON: f64 = 1e-9;

    let mut s = ((x - x0) / (x3 - x0)).clamp(0.0, 1.0);
    for _ in 0..8 {
        let err = cubic(x0, x1, x2, x3, s) - x;
        if err.abs() < EPSILON {
            return s;
        }
        let slope = cubic_derivative(x0, x1, x2, x3, s);
        if slope.abs() < EPSILON {
            break;
        }
        s -= err / slope;
        if !(0.0..=1.0).contains(&s) {
            break;
        }
    }

    let (mut lo, mut hi) = (0.0, 1.0);
    s = 0.5;
    for _ in 0..60 {
        let value = cubic(x0, x1, x2, x3, s);
        if (value - x).abs() < EPSILON {
            break;
        }
        if value < x {
            lo = s;
        } else {
            hi = s;
        }
        s = (lo + hi) / 2.0;
    }
    s
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Vector3};

    use super::*;

    fn fly_along_x() -> Animation {
        Animation::new(AnimationData {
            horizontal_fov: Some(std::f32::consts::FRAC_PI_2),
            location_x: vec![Keyframe::linear(0.0, 0.0), Keyframe::linear(10.0, 10.0)],
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn linear_keys_interpolate() {
        let pose = fly_along_x().evaluate_time(5.0, 1.0);
        assert_eq!(pose.position, Vector3::new(5.0, 0.0, 0.0));
        assert_eq!(pose.rotation, Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let animation = fly_along_x();
        for t in [0.0, 1.25, 3.333, 7.5, 12.0] {
            let a = animation.evaluate_time(t, 16.0 / 9.0);
            let b = animation.evaluate_time(t, 16.0 / 9.0);
            assert_eq!(a.position.x.to_bits(), b.position.x.to_bits());
            assert_eq!(a.fov.0.to_bits(), b.fov.0.to_bits());
        }
    }

    #[test]
    fn increasing_time_moves_forward_along_the_flight() {
        let animation = fly_along_x();
        let xs: Vec<f32> = [1.0, 4.0, 9.0]
            .iter()
            .map(|&t| animation.evaluate_time(t, 1.0).position.x)
            .collect();
        assert!(xs[0] < xs[1] && xs[1] < xs[2]);
    }

    #[test]
    fn values_are_held_outside_the_keys() {
        let animation = fly_along_x();
        assert_eq!(animation.evaluate_time(-3.0, 1.0).position.x, 0.0);
        assert_eq!(animation.evaluate_time(42.0, 1.0).position.x, 10.0);
    }

    #[test]
    fn range_normalizes_time() {
        let mut data = fly_along_x().data().clone();
        data.range = Some([0.0, 10.0]);
        let animation = Animation::new(data).unwrap();
        assert_eq!(animation.evaluate_time(0.5, 1.0).position.x, 5.0);
        assert_eq!(animation.evaluate_time(1.0, 1.0).position.x, 10.0);
    }

    #[test]
    fn constant_segments_step() {
        let keys = vec![
            Keyframe {
                interpolation: Interpolation::Constant,
                ..Keyframe::linear(0.0, 2.0)
            },
            Keyframe::linear(4.0, 8.0),
        ];
        assert_eq!(sample_channel(&keys, 3.99), 2.0);
        assert_eq!(sample_channel(&keys, 4.0), 8.0);
    }

    #[test]
    fn bezier_with_default_handles_matches_linear() {
        let keys = vec![
            Keyframe {
                interpolation: Interpolation::Bezier,
                ..Keyframe::linear(0.0, 0.0)
            },
            Keyframe::linear(10.0, 20.0),
        ];
        for frame in [1.0, 2.5, 5.0, 7.75] {
            assert!((sample_channel(&keys, frame) - frame * 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn bezier_ease_in_out_is_symmetric_and_slow_at_the_ends() {
        let keys = vec![
            Keyframe {
                interpolation: Interpolation::Bezier,
                handle_right: Some([4.0, 0.0]),
                ..Keyframe::linear(0.0, 0.0)
            },
            Keyframe {
                handle_left: Some([6.0, 1.0]),
                ..Keyframe::linear(10.0, 1.0)
            },
        ];
        assert!((sample_channel(&keys, 5.0) - 0.5).abs() < 1e-6);
        assert!(sample_channel(&keys, 1.0) < 0.1);
        assert!(sample_channel(&keys, 9.0) > 0.9);
    }

    #[test]
    fn empty_channels_are_zero() {
        assert_eq!(sample_channel(&[], 3.0), 0.0);
    }

    #[test]
    fn vertical_fov_follows_aspect() {
        let animation = fly_along_x();
        let square: Deg<f32> = animation.vertical_fov(1.0).into();
        assert!((square.0 - 90.0).abs() < 1e-4);
        let wide: Deg<f32> = animation.vertical_fov(2.0).into();
        assert!((wide.0 - 53.130_1).abs() < 1e-3);
    }

    #[test]
    fn rotation_is_composed_z_y_x() {
        let quarter = std::f32::consts::FRAC_PI_2;
        let rotated = euler_zyx(Vector3::new(quarter, 0.0, quarter)) * Vector3::unit_y();
        // X first takes +Y to +Z, which the Z rotation leaves alone.
        assert!((rotated - Vector3::unit_z()).magnitude() < 1e-6);

        let xyz = Matrix3::from_angle_x(Rad(quarter)) * Matrix3::from_angle_z(Rad(quarter));
        assert!(((xyz * Vector3::unit_y()) - rotated).magnitude() > 0.5);
    }

    #[test]
    fn parses_exported_json() {
        let animation = Animation::from_json(
            r#"{
                "range": [1, 101],
                "horizontalFOV": 0.8575,
                "locationX": [[1, 0.0], [101, 10.0]],
                "rotationZ": [
                    {"time": 1, "value": 0.0, "interpolation": "BEZIER", "handleRight": [31, 0.0]},
                    {"time": 101, "value": 1.5, "handleLeft": [71, 1.5]}
                ]
            }"#,
        )
        .unwrap();
        let pose = animation.evaluate_time(0.5, 16.0 / 9.0);
        assert!((pose.position.x - 5.0).abs() < 1e-5);
        assert!((pose.rotation.z - 0.75).abs() < 1e-4);
        assert_eq!(animation.data().rotation_z[0].interpolation, Interpolation::Bezier);
    }

    #[test]
    fn rejects_invalid_tables() {
        assert!(Animation::from_json(r#"{"locationX": [[0, 1]]}"#).is_err());
        assert!(
            Animation::from_json(r#"{"horizontalFOV": 0.8, "locationX": [[5, 1], [1, 2]]}"#)
                .is_err()
        );
        assert!(Animation::from_json(r#"{"horizontalFOV": 0.8, "range": [10, 10]}"#).is_err());
        assert!(Animation::from_json("not json").is_err());
    }
}
