//! 3x3 and 4x4 matrices.
//!
//! `Matrix4` names its fields `n{row}{col}` and multiplies column vectors,
//! so translation lives in `n14`, `n24`, `n34`. [`Matrix4::flatten_to_array`]
//! produces the column-major layout the shaders expect.

use super::quaternion::Quaternion;
use super::vector::{Vector3, Vector4};
use crate::error::MathError;

/// Nudge applied to the forward axis when `look_at` gets a forward vector
/// parallel to `up`.
pub const LOOK_AT_NUDGE: f64 = 0.0001;

/// Column-major 3x3 matrix, only produced by [`Matrix4::make_invert_3x3`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3 {
    pub m: [f64; 9],
}

impl Default for Matrix3 {
    fn default() -> Self {
        Self {
            m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl Matrix3 {
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.m[col * 3 + row]
    }

    pub fn transpose(&mut self) -> &mut Self {
        self.m.swap(1, 3);
        self.m.swap(2, 6);
        self.m.swap(5, 7);
        self
    }

    /// Transposed copy, column-major, ready for upload.
    pub fn transpose_into_array(&self) -> [f32; 9] {
        let m = &self.m;
        [
            m[0] as f32, m[3] as f32, m[6] as f32,
            m[1] as f32, m[4] as f32, m[7] as f32,
            m[2] as f32, m[5] as f32, m[8] as f32,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix4 {
    pub n11: f64, pub n12: f64, pub n13: f64, pub n14: f64,
    pub n21: f64, pub n22: f64, pub n23: f64, pub n24: f64,
    pub n31: f64, pub n32: f64, pub n33: f64, pub n34: f64,
    pub n41: f64, pub n42: f64, pub n43: f64, pub n44: f64,
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix4 {
    pub const IDENTITY: Matrix4 = Matrix4 {
        n11: 1.0, n12: 0.0, n13: 0.0, n14: 0.0,
        n21: 0.0, n22: 1.0, n23: 0.0, n24: 0.0,
        n31: 0.0, n32: 0.0, n33: 1.0, n34: 0.0,
        n41: 0.0, n42: 0.0, n43: 0.0, n44: 1.0,
    };

    /// Row-major argument order, same as the field names.
    #[allow(clippy::too_many_arguments)]
    #[rustfmt::skip]
    pub const fn new(
        n11: f64, n12: f64, n13: f64, n14: f64,
        n21: f64, n22: f64, n23: f64, n24: f64,
        n31: f64, n32: f64, n33: f64, n34: f64,
        n41: f64, n42: f64, n43: f64, n44: f64,
    ) -> Self {
        Self {
            n11, n12, n13, n14,
            n21, n22, n23, n24,
            n31, n32, n33, n34,
            n41, n42, n43, n44,
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[rustfmt::skip]
    pub fn set(
        &mut self,
        n11: f64, n12: f64, n13: f64, n14: f64,
        n21: f64, n22: f64, n23: f64, n24: f64,
        n31: f64, n32: f64, n33: f64, n34: f64,
        n41: f64, n42: f64, n43: f64, n44: f64,
    ) -> &mut Self {
        *self = Self::new(
            n11, n12, n13, n14,
            n21, n22, n23, n24,
            n31, n32, n33, n34,
            n41, n42, n43, n44,
        );
        self
    }

    pub fn identity(&mut self) -> &mut Self {
        *self = Self::IDENTITY;
        self
    }

    pub fn copy(&mut self, m: &Matrix4) -> &mut Self {
        *self = *m;
        self
    }

    /// Writes the rotation block so that local -Z points from `eye` at `center`.
    /// Translation is left untouched.
    pub fn look_at(&mut self, eye: &Vector3, center: &Vector3, up: &Vector3) -> &mut Self {
        let mut x = Vector3::ZERO;
        let mut y = Vector3::ZERO;
        let mut z = Vector3::ZERO;

        z.sub(eye, center).normalize();
        if z.length() == 0.0 {
            z.z = 1.0;
        }

        x.cross(up, &z).normalize();
        if x.length() == 0.0 {
            z.x += LOOK_AT_NUDGE;
            z.normalize();
            x.cross(up, &z).normalize();

            if x.length() == 0.0 {
                // `up` itself is degenerate; any axis orthogonal to z will do.
                log::warn!("look_at: degenerate up vector {:?}, using fallback basis", up);
                x = orthogonal_to(&z);
            }
        }

        y.cross(&z, &x).normalize();

        self.n11 = x.x; self.n12 = y.x; self.n13 = z.x;
        self.n21 = x.y; self.n22 = y.y; self.n23 = z.y;
        self.n31 = x.z; self.n32 = y.z; self.n33 = z.z;
        self
    }

    /// Transforms a point, with perspective divide.
    pub fn multiply_vector3<'a>(&self, v: &'a mut Vector3) -> &'a mut Vector3 {
        let (vx, vy, vz) = (v.x, v.y, v.z);
        let d = 1.0 / (self.n41 * vx + self.n42 * vy + self.n43 * vz + self.n44);
        v.x = (self.n11 * vx + self.n12 * vy + self.n13 * vz + self.n14) * d;
        v.y = (self.n21 * vx + self.n22 * vy + self.n23 * vz + self.n24) * d;
        v.z = (self.n31 * vx + self.n32 * vy + self.n33 * vz + self.n34) * d;
        v
    }

    pub fn multiply_vector4<'a>(&self, v: &'a mut Vector4) -> &'a mut Vector4 {
        let (vx, vy, vz, vw) = (v.x, v.y, v.z, v.w);
        v.x = self.n11 * vx + self.n12 * vy + self.n13 * vz + self.n14 * vw;
        v.y = self.n21 * vx + self.n22 * vy + self.n23 * vz + self.n24 * vw;
        v.z = self.n31 * vx + self.n32 * vy + self.n33 * vz + self.n34 * vw;
        v.w = self.n41 * vx + self.n42 * vy + self.n43 * vz + self.n44 * vw;
        v
    }

    /// Rotates a direction by the upper 3x3 block and normalizes it.
    pub fn rotate_axis<'a>(&self, v: &'a mut Vector3) -> &'a mut Vector3 {
        let (vx, vy, vz) = (v.x, v.y, v.z);
        v.x = vx * self.n11 + vy * self.n12 + vz * self.n13;
        v.y = vx * self.n21 + vy * self.n22 + vz * self.n23;
        v.z = vx * self.n31 + vy * self.n32 + vz * self.n33;
        v.normalize()
    }

    /// `self = a × b`.
    ///
    /// Both operands are read into locals before anything is written, so a
    /// copy of `self` may be passed as either side.
    pub fn multiply(&mut self, a: &Matrix4, b: &Matrix4) -> &mut Self {
        let Matrix4 {
            n11: a11, n12: a12, n13: a13, n14: a14,
            n21: a21, n22: a22, n23: a23, n24: a24,
            n31: a31, n32: a32, n33: a33, n34: a34,
            n41: a41, n42: a42, n43: a43, n44: a44,
        } = *a;
        let Matrix4 {
            n11: b11, n12: b12, n13: b13, n14: b14,
            n21: b21, n22: b22, n23: b23, n24: b24,
            n31: b31, n32: b32, n33: b33, n34: b34,
            n41: b41, n42: b42, n43: b43, n44: b44,
        } = *b;

        self.n11 = a11 * b11 + a12 * b21 + a13 * b31 + a14 * b41;
        self.n12 = a11 * b12 + a12 * b22 + a13 * b32 + a14 * b42;
        self.n13 = a11 * b13 + a12 * b23 + a13 * b33 + a14 * b43;
        self.n14 = a11 * b14 + a12 * b24 + a13 * b34 + a14 * b44;

        self.n21 = a21 * b11 + a22 * b21 + a23 * b31 + a24 * b41;
        self.n22 = a21 * b12 + a22 * b22 + a23 * b32 + a24 * b42;
        self.n23 = a21 * b13 + a22 * b23 + a23 * b33 + a24 * b43;
        self.n24 = a21 * b14 + a22 * b24 + a23 * b34 + a24 * b44;

        self.n31 = a31 * b11 + a32 * b21 + a33 * b31 + a34 * b41;
        self.n32 = a31 * b12 + a32 * b22 + a33 * b32 + a34 * b42;
        self.n33 = a31 * b13 + a32 * b23 + a33 * b33 + a34 * b43;
        self.n34 = a31 * b14 + a32 * b24 + a33 * b34 + a34 * b44;

        self.n41 = a41 * b11 + a42 * b21 + a43 * b31 + a44 * b41;
        self.n42 = a41 * b12 + a42 * b22 + a43 * b32 + a44 * b42;
        self.n43 = a41 * b13 + a42 * b23 + a43 * b33 + a44 * b43;
        self.n44 = a41 * b14 + a42 * b24 + a43 * b34 + a44 * b44;

        self
    }

    /// `self = self × m`
    pub fn multiply_self(&mut self, m: &Matrix4) -> &mut Self {
        let a = *self;
        self.multiply(&a, m)
    }

    /// `self = a × b`, also returning the flattened product.
    pub fn multiply_to_array(&mut self, a: &Matrix4, b: &Matrix4) -> [f32; 16] {
        self.multiply(a, b).flatten_to_array()
    }

    pub fn multiply_scalar(&mut self, s: f64) -> &mut Self {
        self.n11 *= s; self.n12 *= s; self.n13 *= s; self.n14 *= s;
        self.n21 *= s; self.n22 *= s; self.n23 *= s; self.n24 *= s;
        self.n31 *= s; self.n32 *= s; self.n33 *= s; self.n34 *= s;
        self.n41 *= s; self.n42 *= s; self.n43 *= s; self.n44 *= s;
        self
    }

    pub fn determinant(&self) -> f64 {
        let Matrix4 {
            n11, n12, n13, n14,
            n21, n22, n23, n24,
            n31, n32, n33, n34,
            n41, n42, n43, n44,
        } = *self;

        n14 * n23 * n32 * n41 - n13 * n24 * n32 * n41 - n14 * n22 * n33 * n41 + n12 * n24 * n33 * n41
            + n13 * n22 * n34 * n41 - n12 * n23 * n34 * n41 - n14 * n23 * n31 * n42 + n13 * n24 * n31 * n42
            + n14 * n21 * n33 * n42 - n11 * n24 * n33 * n42 - n13 * n21 * n34 * n42 + n11 * n23 * n34 * n42
            + n14 * n22 * n31 * n43 - n12 * n24 * n31 * n43 - n14 * n21 * n32 * n43 + n11 * n24 * n32 * n43
            + n12 * n21 * n34 * n43 - n11 * n22 * n34 * n43 - n13 * n22 * n31 * n44 + n12 * n23 * n31 * n44
            + n13 * n21 * n32 * n44 - n11 * n23 * n32 * n44 - n12 * n21 * n33 * n44 + n11 * n22 * n33 * n44
    }

    pub fn transpose(&mut self) -> &mut Self {
        std::mem::swap(&mut self.n21, &mut self.n12);
        std::mem::swap(&mut self.n31, &mut self.n13);
        std::mem::swap(&mut self.n32, &mut self.n23);
        std::mem::swap(&mut self.n41, &mut self.n14);
        std::mem::swap(&mut self.n42, &mut self.n24);
        std::mem::swap(&mut self.n43, &mut self.n34);
        self
    }

    /// Column-major `f32` copy for GPU upload.
    pub fn flatten_to_array(&self) -> [f32; 16] {
        [
            self.n11 as f32, self.n21 as f32, self.n31 as f32, self.n41 as f32,
            self.n12 as f32, self.n22 as f32, self.n32 as f32, self.n42 as f32,
            self.n13 as f32, self.n23 as f32, self.n33 as f32, self.n43 as f32,
            self.n14 as f32, self.n24 as f32, self.n34 as f32, self.n44 as f32,
        ]
    }

    /// Same as [`flatten_to_array`](Self::flatten_to_array) but writes into a slice.
    pub fn flatten_to_array_offset(&self, flat: &mut [f32], offset: usize) {
        flat[offset..offset + 16].copy_from_slice(&self.flatten_to_array());
    }

    #[rustfmt::skip]
    pub fn set_translation(&mut self, x: f64, y: f64, z: f64) -> &mut Self {
        self.set(
            1.0, 0.0, 0.0, x,
            0.0, 1.0, 0.0, y,
            0.0, 0.0, 1.0, z,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    #[rustfmt::skip]
    pub fn set_scale(&mut self, x: f64, y: f64, z: f64) -> &mut Self {
        self.set(
            x, 0.0, 0.0, 0.0,
            0.0, y, 0.0, 0.0,
            0.0, 0.0, z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    #[rustfmt::skip]
    pub fn set_rotation_x(&mut self, theta: f64) -> &mut Self {
        let (s, c) = theta.sin_cos();
        self.set(
            1.0, 0.0, 0.0, 0.0,
            0.0, c, -s, 0.0,
            0.0, s, c, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    #[rustfmt::skip]
    pub fn set_rotation_y(&mut self, theta: f64) -> &mut Self {
        let (s, c) = theta.sin_cos();
        self.set(
            c, 0.0, s, 0.0,
            0.0, 1.0, 0.0, 0.0,
            -s, 0.0, c, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    #[rustfmt::skip]
    pub fn set_rotation_z(&mut self, theta: f64) -> &mut Self {
        let (s, c) = theta.sin_cos();
        self.set(
            c, -s, 0.0, 0.0,
            s, c, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    pub fn set_position(&mut self, v: &Vector3) -> &mut Self {
        self.n14 = v.x;
        self.n24 = v.y;
        self.n34 = v.z;
        self
    }

    pub fn position(&self) -> Vector3 {
        Vector3::new(self.n14, self.n24, self.n34)
    }

    pub fn column_x(&self) -> Vector3 {
        Vector3::new(self.n11, self.n21, self.n31)
    }

    pub fn column_y(&self) -> Vector3 {
        Vector3::new(self.n12, self.n22, self.n32)
    }

    pub fn column_z(&self) -> Vector3 {
        Vector3::new(self.n13, self.n23, self.n33)
    }

    /// XYZ Euler angles (radians) into the rotation block.
    pub fn set_rotation_from_euler(&mut self, v: &Vector3) -> &mut Self {
        let (b, a) = v.x.sin_cos();
        let (d, c) = v.y.sin_cos();
        let (f, e) = v.z.sin_cos();
        let (ad, bd) = (a * d, b * d);

        self.n11 = c * e;
        self.n12 = -c * f;
        self.n13 = d;

        self.n21 = bd * e + a * f;
        self.n22 = -bd * f + a * e;
        self.n23 = -b * c;

        self.n31 = -ad * e + b * f;
        self.n32 = ad * f + b * e;
        self.n33 = a * c;
        self
    }

    pub fn set_rotation_from_quaternion(&mut self, q: &Quaternion) -> &mut Self {
        let (x, y, z, w) = (q.x, q.y, q.z, q.w);
        let (x2, y2, z2) = (x + x, y + y, z + z);
        let (xx, xy, xz) = (x * x2, x * y2, x * z2);
        let (yy, yz, zz) = (y * y2, y * z2, z * z2);
        let (wx, wy, wz) = (w * x2, w * y2, w * z2);

        self.n11 = 1.0 - (yy + zz);
        self.n12 = xy - wz;
        self.n13 = xz + wy;

        self.n21 = xy + wz;
        self.n22 = 1.0 - (xx + zz);
        self.n23 = yz - wx;

        self.n31 = xz - wy;
        self.n32 = yz + wx;
        self.n33 = 1.0 - (xx + yy);
        self
    }

    /// Post-multiplies by a scale, i.e. scales the columns.
    pub fn scale(&mut self, v: &Vector3) -> &mut Self {
        let (x, y, z) = (v.x, v.y, v.z);
        self.n11 *= x; self.n12 *= y; self.n13 *= z;
        self.n21 *= x; self.n22 *= y; self.n23 *= z;
        self.n31 *= x; self.n32 *= y; self.n33 *= z;
        self.n41 *= x; self.n42 *= y; self.n43 *= z;
        self
    }

    pub fn extract_position(&mut self, m: &Matrix4) -> &mut Self {
        self.n14 = m.n14;
        self.n24 = m.n24;
        self.n34 = m.n34;
        self
    }

    /// Copies the rotation block of `m` with the scale `s` divided back out.
    pub fn extract_rotation(&mut self, m: &Matrix4, s: &Vector3) -> &mut Self {
        let inv = |v: f64| if v != 0.0 { 1.0 / v } else { 0.0 };
        let (isx, isy, isz) = (inv(s.x), inv(s.y), inv(s.z));

        self.n11 = m.n11 * isx;
        self.n21 = m.n21 * isx;
        self.n31 = m.n31 * isx;

        self.n12 = m.n12 * isy;
        self.n22 = m.n22 * isy;
        self.n32 = m.n32 * isy;

        self.n13 = m.n13 * isz;
        self.n23 = m.n23 * isz;
        self.n33 = m.n33 * isz;
        self
    }

    /// Full inverse via the adjugate scaled by `1 / determinant`.
    pub fn make_invert(m: &Matrix4) -> Result<Matrix4, MathError> {
        let det = m.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(MathError::NotInvertible);
        }

        let Matrix4 {
            n11, n12, n13, n14,
            n21, n22, n23, n24,
            n31, n32, n33, n34,
            n41, n42, n43, n44,
        } = *m;

        let mut r = Matrix4::new(
            n23 * n34 * n42 - n24 * n33 * n42 + n24 * n32 * n43 - n22 * n34 * n43 - n23 * n32 * n44 + n22 * n33 * n44,
            n14 * n33 * n42 - n13 * n34 * n42 - n14 * n32 * n43 + n12 * n34 * n43 + n13 * n32 * n44 - n12 * n33 * n44,
            n13 * n24 * n42 - n14 * n23 * n42 + n14 * n22 * n43 - n12 * n24 * n43 - n13 * n22 * n44 + n12 * n23 * n44,
            n14 * n23 * n32 - n13 * n24 * n32 - n14 * n22 * n33 + n12 * n24 * n33 + n13 * n22 * n34 - n12 * n23 * n34,
            n24 * n33 * n41 - n23 * n34 * n41 - n24 * n31 * n43 + n21 * n34 * n43 + n23 * n31 * n44 - n21 * n33 * n44,
            n13 * n34 * n41 - n14 * n33 * n41 + n14 * n31 * n43 - n11 * n34 * n43 - n13 * n31 * n44 + n11 * n33 * n44,
            n14 * n23 * n41 - n13 * n24 * n41 - n14 * n21 * n43 + n11 * n24 * n43 + n13 * n21 * n44 - n11 * n23 * n44,
            n13 * n24 * n31 - n14 * n23 * n31 + n14 * n21 * n33 - n11 * n24 * n33 - n13 * n21 * n34 + n11 * n23 * n34,
            n22 * n34 * n41 - n24 * n32 * n41 + n24 * n31 * n42 - n21 * n34 * n42 - n22 * n31 * n44 + n21 * n32 * n44,
            n14 * n32 * n41 - n12 * n34 * n41 - n14 * n31 * n42 + n11 * n34 * n42 + n12 * n31 * n44 - n11 * n32 * n44,
            n13 * n24 * n41 - n14 * n22 * n41 + n14 * n21 * n42 - n11 * n24 * n42 - n12 * n21 * n44 + n11 * n22 * n44,
            n14 * n22 * n31 - n12 * n24 * n31 - n14 * n21 * n32 + n11 * n24 * n32 + n12 * n21 * n34 - n11 * n22 * n34,
            n23 * n32 * n41 - n22 * n33 * n41 - n23 * n31 * n42 + n21 * n33 * n42 + n22 * n31 * n43 - n21 * n32 * n43,
            n12 * n33 * n41 - n13 * n32 * n41 + n13 * n31 * n42 - n11 * n33 * n42 - n12 * n31 * n43 + n11 * n32 * n43,
            n13 * n22 * n41 - n12 * n23 * n41 - n13 * n21 * n42 + n11 * n23 * n42 + n12 * n21 * n43 - n11 * n22 * n43,
            n12 * n23 * n31 - n13 * n22 * n31 + n13 * n21 * n32 - n11 * n23 * n32 - n12 * n21 * n33 + n11 * n22 * n33,
        );
        r.multiply_scalar(1.0 / det);
        Ok(r)
    }

    /// `self = inverse(m)`; on failure `self` is left untouched.
    pub fn set_inverse_of(&mut self, m: &Matrix4) -> Result<&mut Self, MathError> {
        *self = Self::make_invert(m)?;
        Ok(self)
    }

    /// Inverse of the upper-left 3x3 block.
    pub fn make_invert_3x3(m: &Matrix4) -> Result<Matrix3, MathError> {
        let a11 = m.n33 * m.n22 - m.n32 * m.n23;
        let a21 = -m.n33 * m.n21 + m.n31 * m.n23;
        let a31 = m.n32 * m.n21 - m.n31 * m.n22;
        let a12 = -m.n33 * m.n12 + m.n32 * m.n13;
        let a22 = m.n33 * m.n11 - m.n31 * m.n13;
        let a32 = -m.n32 * m.n11 + m.n31 * m.n12;
        let a13 = m.n23 * m.n12 - m.n22 * m.n13;
        let a23 = -m.n23 * m.n11 + m.n21 * m.n13;
        let a33 = m.n22 * m.n11 - m.n21 * m.n12;

        let det = m.n11 * a11 + m.n21 * a12 + m.n31 * a13;
        if det == 0.0 || !det.is_finite() {
            return Err(MathError::NotInvertible);
        }
        let idet = 1.0 / det;

        Ok(Matrix3 {
            m: [
                idet * a11, idet * a21, idet * a31,
                idet * a12, idet * a22, idet * a32,
                idet * a13, idet * a23, idet * a33,
            ],
        })
    }

    /// GL-style frustum: eye space maps to clip space with z in [-1, 1].
    pub fn make_frustum(
        left: f64,
        right: f64,
        bottom: f64,
        top: f64,
        near: f64,
        far: f64,
    ) -> Result<Matrix4, MathError> {
        if right == left || top == bottom || far == near {
            return Err(MathError::DegenerateFrustum { fov: f64::NAN, near, far });
        }

        let x = 2.0 * near / (right - left);
        let y = 2.0 * near / (top - bottom);
        let a = (right + left) / (right - left);
        let b = (top + bottom) / (top - bottom);
        let c = -(far + near) / (far - near);
        let d = -2.0 * far * near / (far - near);

        Ok(Matrix4::new(
            x, 0.0, a, 0.0,
            0.0, y, b, 0.0,
            0.0, 0.0, c, d,
            0.0, 0.0, -1.0, 0.0,
        ))
    }

    /// Symmetric frustum from a vertical field of view in degrees.
    pub fn make_perspective(fov: f64, aspect: f64, near: f64, far: f64) -> Result<Matrix4, MathError> {
        let degenerate = !(fov > 0.0 && fov < 180.0)
            || !(near > 0.0)
            || !(far > near)
            || !(aspect > 0.0 && aspect.is_finite());
        if degenerate {
            return Err(MathError::DegenerateFrustum { fov, near, far });
        }

        let ymax = near * (fov * std::f64::consts::PI / 360.0).tan();
        let ymin = -ymax;
        let xmin = ymin * aspect;
        let xmax = ymax * aspect;

        Self::make_frustum(xmin, xmax, ymin, ymax, near, far)
    }
}

fn orthogonal_to(z: &Vector3) -> Vector3 {
    let helper = if z.x.abs() < 0.9 {
        Vector3::new(1.0, 0.0, 0.0)
    } else {
        Vector3::new(0.0, 1.0, 0.0)
    };
    let mut x = Vector3::ZERO;
    x.cross(&helper, z).normalize();
    x
}

impl From<&Matrix4> for glam::DMat4 {
    fn from(m: &Matrix4) -> Self {
        glam::DMat4::from_cols_array(&[
            m.n11, m.n21, m.n31, m.n41,
            m.n12, m.n22, m.n32, m.n42,
            m.n13, m.n23, m.n33, m.n43,
            m.n14, m.n24, m.n34, m.n44,
        ])
    }
}

impl From<glam::DMat4> for Matrix4 {
    fn from(m: glam::DMat4) -> Self {
        let c = m.to_cols_array();
        Matrix4::new(
            c[0], c[4], c[8], c[12],
            c[1], c[5], c[9], c[13],
            c[2], c[6], c[10], c[14],
            c[3], c[7], c[11], c[15],
        )
    }
}
