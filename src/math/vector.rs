//! Small mutable vector types.
//!
//! Every mutating method writes into `self` and hands back `&mut Self`, so
//! calls chain without allocating: `v.sub(&a, &b).normalize();`

use super::matrix::Matrix4;

/// Below this magnitude a component counts as zero in [`Vector3::is_zero`].
pub const ZERO_EPSILON: f64 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vector3 = Vector3 { x: 1.0, y: 1.0, z: 1.0 };
    pub const UP: Vector3 = Vector3 { x: 0.0, y: 1.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn set(&mut self, x: f64, y: f64, z: f64) -> &mut Self {
        self.x = x;
        self.y = y;
        self.z = z;
        self
    }

    pub fn copy(&mut self, v: &Vector3) -> &mut Self {
        *self = *v;
        self
    }

    /// `self = a + b`
    pub fn add(&mut self, a: &Vector3, b: &Vector3) -> &mut Self {
        self.set(a.x + b.x, a.y + b.y, a.z + b.z)
    }

    pub fn add_self(&mut self, v: &Vector3) -> &mut Self {
        self.x += v.x;
        self.y += v.y;
        self.z += v.z;
        self
    }

    /// `self = a - b`
    pub fn sub(&mut self, a: &Vector3, b: &Vector3) -> &mut Self {
        self.set(a.x - b.x, a.y - b.y, a.z - b.z)
    }

    pub fn sub_self(&mut self, v: &Vector3) -> &mut Self {
        self.x -= v.x;
        self.y -= v.y;
        self.z -= v.z;
        self
    }

    /// `self = a × b`
    pub fn cross(&mut self, a: &Vector3, b: &Vector3) -> &mut Self {
        self.set(
            a.y * b.z - a.z * b.y,
            a.z * b.x - a.x * b.z,
            a.x * b.y - a.y * b.x,
        )
    }

    /// `self = self × v`
    pub fn cross_self(&mut self, v: &Vector3) -> &mut Self {
        let a = *self;
        self.cross(&a, v)
    }

    /// Component-wise product.
    pub fn multiply_self(&mut self, v: &Vector3) -> &mut Self {
        self.x *= v.x;
        self.y *= v.y;
        self.z *= v.z;
        self
    }

    pub fn multiply_scalar(&mut self, s: f64) -> &mut Self {
        self.x *= s;
        self.y *= s;
        self.z *= s;
        self
    }

    /// Division by zero yields the zero vector.
    pub fn divide_scalar(&mut self, s: f64) -> &mut Self {
        if s != 0.0 {
            self.multiply_scalar(1.0 / s)
        } else {
            self.set(0.0, 0.0, 0.0)
        }
    }

    pub fn negate(&mut self) -> &mut Self {
        self.multiply_scalar(-1.0)
    }

    pub fn dot(&self, v: &Vector3) -> f64 {
        self.x * v.x + self.y * v.y + self.z * v.z
    }

    pub fn length_sq(&self) -> f64 {
        self.dot(self)
    }

    pub fn length(&self) -> f64 {
        self.length_sq().sqrt()
    }

    pub fn distance_to_squared(&self, v: &Vector3) -> f64 {
        let (dx, dy, dz) = (self.x - v.x, self.y - v.y, self.z - v.z);
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance_to(&self, v: &Vector3) -> f64 {
        self.distance_to_squared(v).sqrt()
    }

    /// Scales to unit length. A zero vector stays zero instead of turning into NaN.
    pub fn normalize(&mut self) -> &mut Self {
        let l = self.length();
        self.divide_scalar(l)
    }

    pub fn set_length(&mut self, l: f64) -> &mut Self {
        self.normalize().multiply_scalar(l)
    }

    pub fn is_zero(&self) -> bool {
        self.x.abs() < ZERO_EPSILON && self.y.abs() < ZERO_EPSILON && self.z.abs() < ZERO_EPSILON
    }

    /// Reads the translation column of `m`.
    pub fn set_position_from_matrix(&mut self, m: &Matrix4) -> &mut Self {
        self.set(m.n14, m.n24, m.n34)
    }

    pub fn to_f32_array(&self) -> [f32; 3] {
        [self.x as f32, self.y as f32, self.z as f32]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector4 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Vector4 {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

impl Vector4 {
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    pub fn set(&mut self, x: f64, y: f64, z: f64, w: f64) -> &mut Self {
        self.x = x;
        self.y = y;
        self.z = z;
        self.w = w;
        self
    }

    pub fn copy(&mut self, v: &Vector4) -> &mut Self {
        *self = *v;
        self
    }

    pub fn add_self(&mut self, v: &Vector4) -> &mut Self {
        self.x += v.x;
        self.y += v.y;
        self.z += v.z;
        self.w += v.w;
        self
    }

    pub fn sub(&mut self, a: &Vector4, b: &Vector4) -> &mut Self {
        self.set(a.x - b.x, a.y - b.y, a.z - b.z, a.w - b.w)
    }

    pub fn multiply_scalar(&mut self, s: f64) -> &mut Self {
        self.x *= s;
        self.y *= s;
        self.z *= s;
        self.w *= s;
        self
    }

    pub fn divide_scalar(&mut self, s: f64) -> &mut Self {
        if s != 0.0 {
            self.multiply_scalar(1.0 / s)
        } else {
            self.set(0.0, 0.0, 0.0, 1.0)
        }
    }

    pub fn xyz(&self) -> Vector3 {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// Texture coordinate attached to one corner of a face.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Uv {
    pub u: f64,
    pub v: f64,
}

impl Uv {
    pub const fn new(u: f64, v: f64) -> Self {
        Self { u, v }
    }

    pub fn set(&mut self, u: f64, v: f64) -> &mut Self {
        self.u = u;
        self.v = v;
        self
    }
}
