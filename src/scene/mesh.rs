use super::object::{Object3D, Transformable3D};
use crate::geometry::Geometry;
use crate::material::MeshBasicMaterial;

/// Geometry drawn with one or more materials, one pass each.
#[derive(Debug, Clone)]
pub struct Mesh {
    object: Object3D,
    geometry: Geometry,
    pub materials: Vec<MeshBasicMaterial>,
    /// Reverse the winding treated as front-facing.
    pub flip_sided: bool,
    /// Disable face culling.
    pub double_sided: bool,
}

impl Mesh {
    pub fn new(geometry: Geometry, material: MeshBasicMaterial) -> Self {
        Self::with_materials(geometry, vec![material])
    }

    pub fn with_materials(mut geometry: Geometry, materials: Vec<MeshBasicMaterial>) -> Self {
        let radius = match geometry.bounding_sphere() {
            Some(sphere) => sphere.radius,
            None => geometry.compute_bounding_sphere().radius,
        };
        let mut object = Object3D::new();
        object.set_bound_radius(radius);

        Self {
            object,
            geometry,
            materials,
            flip_sided: false,
            double_sided: false,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Mutable geometry access. After changing vertex, UV or face data, tell
    /// the renderer with `SceneRenderer::mark_dirty`; call
    /// [`Mesh::refresh_bound_radius`] if the extent changed.
    pub fn geometry_mut(&mut self) -> &mut Geometry {
        &mut self.geometry
    }

    pub fn refresh_bound_radius(&mut self) {
        let r = self.geometry.compute_bounding_sphere().radius;
        self.object.set_bound_radius(r);
    }
}

impl Transformable3D for Mesh {
    fn object3d(&self) -> &Object3D {
        &self.object
    }

    fn object3d_mut(&mut self) -> &mut Object3D {
        &mut self.object
    }
}
