//! Transform core shared by every scene node.

use crate::math::{Matrix4, Quaternion, Vector3};

/// Handle to a node stored in a [`Scene`](super::Scene).
///
/// Slots are reused after [`Scene::remove_node`](super::Scene::remove_node);
/// the generation keeps an old handle from reaching the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index
    }
}

/// Anything carrying an [`Object3D`].
pub trait Transformable3D {
    fn object3d(&self) -> &Object3D;
    fn object3d_mut(&mut self) -> &mut Object3D;

    fn matrix_world(&self) -> &Matrix4 {
        self.object3d().matrix_world()
    }

    fn is_visible(&self) -> bool {
        self.object3d().visible
    }
}

/// Position, Euler rotation and scale plus the matrices derived from them.
///
/// Setters mark the local matrix stale; [`Object3D::update`] rebuilds it
/// (when `matrix_auto_update` is on) and recomposes the world matrix.
#[derive(Debug, Clone)]
pub struct Object3D {
    pub name: String,
    pub visible: bool,
    pub matrix_auto_update: bool,
    pub use_quaternion: bool,
    pub up: Vector3,

    position: Vector3,
    rotation: Vector3,
    scale: Vector3,
    quaternion: Quaternion,

    matrix: Matrix4,
    matrix_world: Matrix4,
    matrix_rotation_world: Matrix4,
    local_dirty: bool,
    matrix_world_needs_update: bool,

    bound_radius: f64,
    bound_radius_scale: f64,

    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl Default for Object3D {
    fn default() -> Self {
        Self::new()
    }
}

impl Object3D {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            visible: true,
            matrix_auto_update: true,
            use_quaternion: false,
            up: Vector3::UP,
            position: Vector3::ZERO,
            rotation: Vector3::ZERO,
            scale: Vector3::ONE,
            quaternion: Quaternion::default(),
            matrix: Matrix4::IDENTITY,
            matrix_world: Matrix4::IDENTITY,
            matrix_rotation_world: Matrix4::IDENTITY,
            local_dirty: true,
            matrix_world_needs_update: true,
            bound_radius: 0.0,
            bound_radius_scale: 1.0,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn position(&self) -> Vector3 {
        self.position
    }

    pub fn rotation(&self) -> Vector3 {
        self.rotation
    }

    pub fn scale(&self) -> Vector3 {
        self.scale
    }

    pub fn quaternion(&self) -> Quaternion {
        self.quaternion
    }

    pub fn position_mut(&mut self) -> &mut Vector3 {
        self.local_dirty = true;
        &mut self.position
    }

    pub fn rotation_mut(&mut self) -> &mut Vector3 {
        self.local_dirty = true;
        &mut self.rotation
    }

    pub fn scale_mut(&mut self) -> &mut Vector3 {
        self.local_dirty = true;
        &mut self.scale
    }

    pub fn quaternion_mut(&mut self) -> &mut Quaternion {
        self.local_dirty = true;
        &mut self.quaternion
    }

    pub fn set_position(&mut self, x: f64, y: f64, z: f64) -> &mut Self {
        self.position_mut().set(x, y, z);
        self
    }

    pub fn set_rotation(&mut self, x: f64, y: f64, z: f64) -> &mut Self {
        self.rotation_mut().set(x, y, z);
        self
    }

    pub fn set_scale(&mut self, x: f64, y: f64, z: f64) -> &mut Self {
        self.scale_mut().set(x, y, z);
        self
    }

    pub fn matrix(&self) -> &Matrix4 {
        &self.matrix
    }

    /// Replaces the local matrix. Only sticks when `matrix_auto_update` is off.
    pub fn set_matrix(&mut self, m: &Matrix4) {
        self.matrix = *m;
        self.matrix_world_needs_update = true;
    }

    pub(crate) fn matrix_mut(&mut self) -> &mut Matrix4 {
        &mut self.matrix
    }

    pub fn matrix_world(&self) -> &Matrix4 {
        &self.matrix_world
    }

    pub fn matrix_rotation_world(&self) -> &Matrix4 {
        &self.matrix_rotation_world
    }

    pub fn matrix_world_needs_update(&self) -> bool {
        self.matrix_world_needs_update || (self.matrix_auto_update && self.local_dirty)
    }

    pub(crate) fn mark_world_dirty(&mut self) {
        self.matrix_world_needs_update = true;
    }

    pub fn bound_radius(&self) -> f64 {
        self.bound_radius
    }

    pub fn set_bound_radius(&mut self, r: f64) {
        self.bound_radius = r;
    }

    /// Largest scale magnitude; spheres are bounded by `bound_radius` times this.
    pub fn bound_radius_scale(&self) -> f64 {
        self.bound_radius_scale
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Rebuilds the local matrix from position, rotation and scale.
    pub fn update_matrix(&mut self) {
        self.matrix.set_position(&self.position);

        if self.use_quaternion {
            self.matrix.set_rotation_from_quaternion(&self.quaternion);
        } else {
            self.matrix.set_rotation_from_euler(&self.rotation);
        }

        if self.scale != Vector3::ONE {
            self.matrix.scale(&self.scale);
            let s = &self.scale;
            self.bound_radius_scale = s.x.abs().max(s.y.abs()).max(s.z.abs());
        } else {
            self.bound_radius_scale = 1.0;
        }

        self.local_dirty = false;
        self.matrix_world_needs_update = true;
    }

    /// Recomposes `matrix_world = parent_world × matrix` when stale or forced.
    ///
    /// Returns `true` when the world matrix was recomputed; children must
    /// then be updated with `force` set.
    pub fn update(&mut self, parent_world: Option<&Matrix4>, force: bool) -> bool {
        if self.matrix_auto_update && self.local_dirty {
            self.update_matrix();
        }

        if !(force || self.matrix_world_needs_update) {
            return false;
        }

        match parent_world {
            Some(parent) => {
                self.matrix_world.multiply(parent, &self.matrix);
            }
            None => {
                self.matrix_world = self.matrix;
            }
        }
        self.matrix_rotation_world
            .extract_rotation(&self.matrix_world, &self.scale);
        self.matrix_world_needs_update = false;
        true
    }
}

impl Transformable3D for Object3D {
    fn object3d(&self) -> &Object3D {
        self
    }

    fn object3d_mut(&mut self) -> &mut Object3D {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_matrix_composes_trs() {
        let mut o = Object3D::new();
        o.set_position(1.0, 2.0, 3.0).set_scale(2.0, 3.0, 0.5);
        o.update(None, false);

        let expected = glam::DMat4::from_scale_rotation_translation(
            glam::DVec3::new(2.0, 3.0, 0.5),
            glam::DQuat::IDENTITY,
            glam::DVec3::new(1.0, 2.0, 3.0),
        );
        let got = glam::DMat4::from(o.matrix_world());
        assert!(got.abs_diff_eq(expected, 1e-12));
        assert_eq!(o.bound_radius_scale(), 3.0);
    }

    #[test]
    fn mirrored_scale_keeps_positive_bound() {
        let mut o = Object3D::new();
        o.set_scale(-1.0, -1.0, -1.0);
        o.update(None, false);
        assert_eq!(o.bound_radius_scale(), 1.0);

        o.set_scale(-3.0, 2.0, 1.0);
        o.update(None, false);
        assert_eq!(o.bound_radius_scale(), 3.0);
    }

    #[test]
    fn clean_object_skips_recompute() {
        let mut o = Object3D::new();
        assert!(o.update(None, false));
        assert!(!o.update(None, false));
        assert!(o.update(None, true));

        o.rotation_mut().y = 0.5;
        assert!(o.matrix_world_needs_update());
        assert!(o.update(None, false));
    }

    #[test]
    fn manual_matrix_is_kept_without_auto_update() {
        let mut o = Object3D::new();
        o.matrix_auto_update = false;
        let mut m = Matrix4::IDENTITY;
        m.set_translation(0.0, 5.0, 0.0);
        o.set_matrix(&m);
        o.set_position(9.0, 9.0, 9.0);
        o.update(None, false);
        assert_eq!(o.matrix_world().position(), Vector3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn rotation_world_strips_scale() {
        let mut o = Object3D::new();
        o.set_scale(4.0, 4.0, 4.0).set_rotation(0.0, 0.3, 0.0);
        o.update(None, false);
        let r = o.matrix_rotation_world();
        let col = r.column_x();
        assert!((col.length() - 1.0).abs() < 1e-12);
    }
}
