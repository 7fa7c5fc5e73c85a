pub mod matrix;
pub mod quaternion;
pub mod vector;

pub use matrix::{Matrix3, Matrix4};
pub use quaternion::Quaternion;
pub use vector::{Uv, Vector3, Vector4};
