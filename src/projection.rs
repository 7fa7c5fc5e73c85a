//! Per-pixel panorama reprojection.
//!
//! These functions mirror `shaders/panorama_equirect.wgsl` and
//! `shaders/panorama_cube.wgsl` line for line. The GPU renderer uploads
//! [`PanoramaUniforms`] as-is; the software renderer and the tests call the
//! functions directly.

use crate::error::RenderError;
use std::f64::consts::PI;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageType {
    #[default]
    Equirectangular,
    /// Six faces in the order +z, +x, -z, -x, +y, -y.
    CubeMap,
}

impl FromStr for ImageType {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equirectangular" => Ok(ImageType::Equirectangular),
            "cubemap" => Ok(ImageType::CubeMap),
            other => Err(RenderError::InvalidImageType(other.to_string())),
        }
    }
}

/// Uniform block shared by both projection shaders.
///
/// Angles in radians. `h`, `v` and `vo` are the horizontal extent, vertical
/// extent and vertical offset of the source image as fractions of a full
/// panorama (`1.0` each for a complete 360x180 image).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PanoramaUniforms {
    pub aspect_ratio: f32,
    /// Yaw.
    pub psi: f32,
    /// Pitch.
    pub theta: f32,
    /// Focal length, `1 / tan(hfov / 2)`.
    pub f: f32,
    pub h: f32,
    pub v: f32,
    pub vo: f32,
    _pad: f32,
    /// Colour outside the image extents (partial panoramas).
    pub background: [f32; 4],
}

impl PanoramaUniforms {
    /// `haov`, `vaov` and `voffset` in radians.
    pub fn new(haov: f64, vaov: f64, voffset: f64, aspect_ratio: f64) -> Self {
        Self {
            aspect_ratio: aspect_ratio as f32,
            psi: 0.0,
            theta: 0.0,
            f: 1.0,
            h: (haov / (2.0 * PI)) as f32,
            v: (vaov / PI) as f32,
            vo: (voffset / PI) as f32,
            _pad: 0.0,
            background: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Per-frame view. `hfov` must lie in `(0, π)`.
    pub fn set_view(&mut self, pitch: f64, yaw: f64, hfov: f64) {
        self.theta = pitch as f32;
        self.psi = yaw as f32;
        self.f = (1.0 / (hfov / 2.0).tan()) as f32;
    }
}

fn wrap_longitude(mut lambda: f64) -> f64 {
    if lambda > PI {
        lambda -= 2.0 * PI;
    }
    if lambda < -PI {
        lambda += 2.0 * PI;
    }
    lambda
}

/// Texture coordinate for the screen point `(x, y)` in normalized device
/// coordinates (`[-1, 1]`, y up), or `None` when the ray leaves the image
/// extents and the background colour applies.
pub fn equirect_tex_coord(u: &PanoramaUniforms, x: f64, y: f64) -> Option<(f64, f64)> {
    let x = x * u.aspect_ratio as f64;
    let f = u.f as f64;
    let (sin_theta, cos_theta) = (u.theta as f64).sin_cos();

    let a = f * cos_theta - y * sin_theta;
    let root = (x * x + a * a).sqrt();
    let lambda = wrap_longitude((x / root).atan2(a / root) + u.psi as f64);
    let phi = ((y * cos_theta + f * sin_theta) / root).atan();

    let cx = lambda / PI;
    let cy = phi / (PI / 2.0);

    let (h, v, vo) = (u.h as f64, u.v as f64, u.vo as f64);
    if cx < -h || cx > h || cy < -v + vo || cy > v + vo {
        return None;
    }
    Some(((cx + h) / (h * 2.0), (-cy + v + vo) / (v * 2.0)))
}

/// View ray for the screen point `(x, y)`, rotated by pitch then yaw.
/// Suitable for cube-map lookup without normalization.
pub fn cube_view_vector(u: &PanoramaUniforms, x: f64, y: f64) -> [f64; 3] {
    let (vx, vy, vz) = (x * u.aspect_ratio as f64, y, u.f as f64);

    let (sin_psi, cos_psi) = (-(u.psi as f64)).sin_cos();
    let (sin_theta, cos_theta) = (u.theta as f64).sin_cos();

    let tz = vz * cos_theta - vy * sin_theta;
    let ty = vz * sin_theta + vy * cos_theta;

    let px = vx * cos_psi - tz * sin_psi;
    let pz = vx * sin_psi + tz * cos_psi;
    [px, ty, pz]
}

/// Cube faces in GPU layer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

impl CubeFace {
    /// Position of this face in the `+z, +x, -z, -x, +y, -y` input order.
    pub fn source_index(self) -> usize {
        match self {
            CubeFace::PositiveX => 1,
            CubeFace::NegativeX => 3,
            CubeFace::PositiveY => 4,
            CubeFace::NegativeY => 5,
            CubeFace::PositiveZ => 0,
            CubeFace::NegativeZ => 2,
        }
    }

    pub const LAYER_ORDER: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];
}

/// Face and `(s, t)` in `[0, 1]` hit by direction `d`, following the
/// standard cube-map major-axis selection.
pub fn cube_face_coord(d: [f64; 3]) -> (CubeFace, f64, f64) {
    let [x, y, z] = d;
    let (ax, ay, az) = (x.abs(), y.abs(), z.abs());

    let (face, sc, tc, ma) = if ax >= ay && ax >= az {
        if x >= 0.0 {
            (CubeFace::PositiveX, -z, -y, ax)
        } else {
            (CubeFace::NegativeX, z, -y, ax)
        }
    } else if ay >= az {
        if y >= 0.0 {
            (CubeFace::PositiveY, x, z, ay)
        } else {
            (CubeFace::NegativeY, x, -z, ay)
        }
    } else if z >= 0.0 {
        (CubeFace::PositiveZ, x, -y, az)
    } else {
        (CubeFace::NegativeZ, -x, -y, az)
    };

    if ma == 0.0 {
        return (face, 0.5, 0.5);
    }
    (face, (sc / ma + 1.0) / 2.0, (tc / ma + 1.0) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(aspect: f64) -> PanoramaUniforms {
        PanoramaUniforms::new(2.0 * PI, PI, 0.0, aspect)
    }

    #[test]
    fn centre_maps_to_image_centre() {
        let mut u = full(16.0 / 9.0);
        u.set_view(0.0, 0.0, 1f64.to_radians());
        let (s, t) = equirect_tex_coord(&u, 0.0, 0.0).unwrap();
        assert!((s - 0.5).abs() < 1e-6 && (t - 0.5).abs() < 1e-6, "{s} {t}");
    }

    #[test]
    fn yaw_shifts_longitude() {
        let mut u = full(1.0);
        u.set_view(0.0, PI / 2.0, 100f64.to_radians());
        let (s, _) = equirect_tex_coord(&u, 0.0, 0.0).unwrap();
        assert!((s - 0.75).abs() < 1e-6);

        u.set_view(0.0, PI, 100f64.to_radians());
        let (s, _) = equirect_tex_coord(&u, 0.0, 0.0).unwrap();
        assert!(s < 1e-6 || s > 1.0 - 1e-6, "{s}");
    }

    #[test]
    fn pitch_up_samples_upper_half() {
        let mut u = full(1.0);
        u.set_view(0.5, 0.0, 90f64.to_radians());
        let (_, t) = equirect_tex_coord(&u, 0.0, 0.0).unwrap();
        let expected = 0.5 - 0.5 / PI;
        assert!((t - expected).abs() < 1e-6, "{t}");
    }

    #[test]
    fn partial_panorama_has_background() {
        // 90 degree wide strip.
        let mut u = PanoramaUniforms::new(PI / 2.0, PI / 4.0, 0.0, 1.0);
        u.set_view(0.0, 0.0, 60f64.to_radians());
        assert!(equirect_tex_coord(&u, 0.0, 0.0).is_some());
        u.set_view(0.0, PI, 60f64.to_radians());
        assert!(equirect_tex_coord(&u, 0.0, 0.0).is_none());
        u.set_view(1.2, 0.0, 60f64.to_radians());
        assert!(equirect_tex_coord(&u, 0.0, 0.0).is_none());
    }

    #[test]
    fn cube_ray_follows_yaw_and_pitch() {
        let mut u = full(1.0);
        u.set_view(0.0, 0.0, 90f64.to_radians());
        let d = cube_view_vector(&u, 0.0, 0.0);
        assert_eq!(cube_face_coord(d).0, CubeFace::PositiveZ);

        u.set_view(0.0, PI / 2.0, 90f64.to_radians());
        let d = cube_view_vector(&u, 0.0, 0.0);
        assert_eq!(cube_face_coord(d).0, CubeFace::PositiveX);

        u.set_view(1.4, 0.0, 90f64.to_radians());
        let d = cube_view_vector(&u, 0.0, 0.0);
        assert_eq!(cube_face_coord(d).0, CubeFace::PositiveY);
    }

    #[test]
    fn cube_face_centre() {
        let (face, s, t) = cube_face_coord([0.0, 0.0, -3.0]);
        assert_eq!(face, CubeFace::NegativeZ);
        assert_eq!((s, t), (0.5, 0.5));
        assert_eq!(face.source_index(), 2);
    }

    #[test]
    fn parse_image_type() {
        assert_eq!("cubemap".parse::<ImageType>().unwrap(), ImageType::CubeMap);
        assert!(matches!(
            "multires".parse::<ImageType>(),
            Err(RenderError::InvalidImageType(t)) if t == "multires"
        ));
    }
}
