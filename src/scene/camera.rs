//! Perspective camera.

use super::object::{Object3D, Transformable3D};
use crate::error::MathError;
use crate::math::{Matrix4, Vector3};

#[derive(Debug, Clone)]
pub struct Camera {
    object: Object3D,
    /// Vertical field of view in degrees.
    pub fov: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
    /// Point the camera looks at while `use_target` is on.
    pub target: Vector3,
    pub use_target: bool,
    projection_matrix: Matrix4,
    matrix_world_inverse: Matrix4,
}

impl Camera {
    pub fn new(fov: f64, aspect: f64, near: f64, far: f64) -> Result<Self, MathError> {
        let mut camera = Self {
            object: Object3D::new(),
            fov,
            aspect,
            near,
            far,
            target: Vector3::ZERO,
            use_target: true,
            projection_matrix: Matrix4::IDENTITY,
            matrix_world_inverse: Matrix4::IDENTITY,
        };
        camera.update_projection_matrix()?;
        Ok(camera)
    }

    /// Rebuilds the projection after `fov`, `aspect`, `near` or `far` changed.
    /// On error the previous projection stays in place.
    pub fn update_projection_matrix(&mut self) -> Result<(), MathError> {
        self.projection_matrix = Matrix4::make_perspective(self.fov, self.aspect, self.near, self.far)?;
        Ok(())
    }

    pub fn projection_matrix(&self) -> &Matrix4 {
        &self.projection_matrix
    }

    /// The view matrix.
    pub fn matrix_world_inverse(&self) -> &Matrix4 {
        &self.matrix_world_inverse
    }

    /// Updates the world matrix and the view matrix derived from it.
    ///
    /// In target mode the local matrix is rebuilt with `look_at` every call
    /// and the world matrix is always recomputed. Otherwise the camera behaves
    /// like any [`Object3D`]. Returns whether the world matrix changed.
    pub fn update(&mut self, parent_world: Option<&Matrix4>, force: bool) -> Result<bool, MathError> {
        let changed = if self.use_target {
            let position = self.object.position();
            let up = self.object.up;
            let target = self.target;
            let m = self.object.matrix_mut();
            m.look_at(&position, &target, &up);
            m.set_position(&position);
            self.object.mark_world_dirty();
            self.object.update(parent_world, true)
        } else {
            self.object.update(parent_world, force)
        };

        if changed {
            self.matrix_world_inverse = Matrix4::make_invert(self.object.matrix_world())?;
        }
        Ok(changed)
    }
}

impl Transformable3D for Camera {
    fn object3d(&self) -> &Object3D {
        &self.object
    }

    fn object3d_mut(&mut self) -> &mut Object3D {
        &mut self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DMat4, DVec3};

    #[test]
    fn defaults_match_perspective() {
        let cam = Camera::new(50.0, 1.0, 0.1, 2000.0).unwrap();
        let expected = DMat4::perspective_rh_gl(50f64.to_radians(), 1.0, 0.1, 2000.0);
        assert!(DMat4::from(cam.projection_matrix()).abs_diff_eq(expected, 1e-9));
    }

    #[test]
    fn degenerate_fov_keeps_previous_projection() {
        let mut cam = Camera::new(70.0, 1.5, 1.0, 1100.0).unwrap();
        let before = *cam.projection_matrix();
        cam.fov = 180.0;
        assert!(cam.update_projection_matrix().is_err());
        assert_eq!(*cam.projection_matrix(), before);
        assert!(Camera::new(0.0, 1.0, 1.0, 10.0).is_err());
    }

    #[test]
    fn target_mode_view_matches_look_at() {
        let mut cam = Camera::new(70.0, 1.0, 1.0, 1100.0).unwrap();
        cam.object3d_mut().set_position(1.0, 2.0, 3.0);
        cam.target = Vector3::new(-4.0, 0.5, 7.0);
        assert!(cam.update(None, false).unwrap());

        let expected = DMat4::look_at_rh(
            DVec3::new(1.0, 2.0, 3.0),
            DVec3::new(-4.0, 0.5, 7.0),
            DVec3::Y,
        );
        assert!(DMat4::from(cam.matrix_world_inverse()).abs_diff_eq(expected, 1e-9));
    }

    #[test]
    fn free_mode_inverts_object_transform() {
        let mut cam = Camera::new(60.0, 1.0, 0.5, 100.0).unwrap();
        cam.use_target = false;
        cam.object3d_mut().set_position(0.0, 0.0, 10.0).set_rotation(0.0, 0.4, 0.0);
        cam.update(None, false).unwrap();

        let mut product = Matrix4::IDENTITY;
        product.multiply(cam.matrix_world(), cam.matrix_world_inverse());
        assert!(DMat4::from(&product).abs_diff_eq(DMat4::IDENTITY, 1e-12));

        // Nothing changed: no recompute.
        assert!(!cam.update(None, false).unwrap());
    }

    #[test]
    fn zero_scale_camera_is_not_invertible() {
        let mut cam = Camera::new(60.0, 1.0, 0.5, 100.0).unwrap();
        cam.use_target = false;
        cam.object3d_mut().set_scale(0.0, 0.0, 0.0);
        assert_eq!(cam.update(None, false), Err(MathError::NotInvertible));
    }
}
