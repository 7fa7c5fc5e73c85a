//! Triangle geometry: vertices, faces, per-corner UVs and derived data.

mod sphere;

pub use sphere::build_sphere;

use crate::math::{Uv, Vector3};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(0);

/// Identity used by the renderer to key GPU buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(u64);

impl GeometryId {
    fn next() -> Self {
        GeometryId(NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: Vector3,
}

impl Vertex {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { position: Vector3::new(x, y, z) }
    }
}

/// Triangle referencing three vertices by index.
#[derive(Debug, Clone, PartialEq)]
pub struct Face3 {
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub normal: Vector3,
    pub vertex_normals: Option<[Vector3; 3]>,
    pub centroid: Vector3,
}

impl Face3 {
    pub fn new(a: usize, b: usize, c: usize) -> Self {
        Self {
            a,
            b,
            c,
            normal: Vector3::ZERO,
            vertex_normals: None,
            centroid: Vector3::ZERO,
        }
    }

    pub fn with_vertex_normals(mut self, normals: [Vector3; 3]) -> Self {
        self.vertex_normals = Some(normals);
        self
    }

    pub fn indices(&self) -> [usize; 3] {
        [self.a, self.b, self.c]
    }

    fn fits(&self, vertex_count: usize) -> bool {
        self.a < vertex_count && self.b < vertex_count && self.c < vertex_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub radius: f64,
}

#[derive(Debug)]
pub struct Geometry {
    id: GeometryId,
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Face3>,
    /// One entry per face, matching `faces` by index. May be empty.
    pub face_vertex_uvs: Vec<[Uv; 3]>,
    bounding_sphere: Option<BoundingSphere>,
    normal_scratch: Vec<Vector3>,
}

impl Clone for Geometry {
    /// A clone is a distinct geometry with its own GPU buffers.
    fn clone(&self) -> Self {
        Self {
            id: GeometryId::next(),
            vertices: self.vertices.clone(),
            faces: self.faces.clone(),
            face_vertex_uvs: self.face_vertex_uvs.clone(),
            bounding_sphere: self.bounding_sphere,
            normal_scratch: Vec::new(),
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

impl Geometry {
    pub fn new() -> Self {
        Self {
            id: GeometryId::next(),
            vertices: Vec::new(),
            faces: Vec::new(),
            face_vertex_uvs: Vec::new(),
            bounding_sphere: None,
            normal_scratch: Vec::new(),
        }
    }

    pub fn id(&self) -> GeometryId {
        self.id
    }

    pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
        self.bounding_sphere
    }

    pub fn set_bounding_sphere(&mut self, sphere: BoundingSphere) {
        self.bounding_sphere = Some(sphere);
    }

    pub fn uv(&self, face: usize) -> Option<&[Uv; 3]> {
        self.face_vertex_uvs.get(face)
    }

    /// First face that points past the vertex list, as `(face, vertex index)`.
    pub fn find_bad_face(&self) -> Option<(usize, usize)> {
        let len = self.vertices.len();
        self.faces.iter().enumerate().find_map(|(n, face)| {
            face.indices().into_iter().find(|&i| i >= len).map(|i| (n, i))
        })
    }

    /// Faces with out-of-range indices keep their previous centroid.
    pub fn compute_centroids(&mut self) {
        let vertices = &self.vertices;
        for face in &mut self.faces {
            if !face.fits(vertices.len()) {
                continue;
            }
            face.centroid = Vector3::ZERO;
            for i in face.indices() {
                face.centroid.add_self(&vertices[i].position);
            }
            face.centroid.divide_scalar(3.0);
        }
    }

    /// Flat normals from winding order: `(c - b) × (a - b)`.
    ///
    /// With `use_vertex_normals`, faces that already carry vertex normals
    /// average those instead. Degenerate triangles and faces that point past
    /// the vertex list keep a zero normal.
    pub fn compute_face_normals(&mut self, use_vertex_normals: bool) {
        let vertices = &self.vertices;
        for face in &mut self.faces {
            if !face.fits(vertices.len()) {
                face.normal = Vector3::ZERO;
                continue;
            }
            let mut cb = Vector3::ZERO;

            match face.vertex_normals {
                Some(normals) if use_vertex_normals => {
                    for n in &normals {
                        cb.add_self(n);
                    }
                    cb.divide_scalar(3.0);
                }
                _ => {
                    let a = vertices[face.a].position;
                    let b = vertices[face.b].position;
                    let c = vertices[face.c].position;
                    let mut ab = Vector3::ZERO;
                    cb.sub(&c, &b);
                    ab.sub(&a, &b);
                    cb.cross_self(&ab);
                }
            }

            if !cb.is_zero() {
                cb.normalize();
            }
            face.normal = cb;
        }
    }

    /// Smooth normals: every face normal is summed into its three vertices,
    /// the sums normalized, then copied back onto each face corner.
    pub fn compute_vertex_normals(&mut self) {
        if self.normal_scratch.len() != self.vertices.len() {
            self.normal_scratch = vec![Vector3::ZERO; self.vertices.len()];
        } else {
            self.normal_scratch.fill(Vector3::ZERO);
        }

        let scratch = &mut self.normal_scratch;
        let count = scratch.len();
        for face in self.faces.iter().filter(|f| f.fits(count)) {
            for i in face.indices() {
                scratch[i].add_self(&face.normal);
            }
        }
        for n in scratch.iter_mut() {
            n.normalize();
        }
        for face in self.faces.iter_mut().filter(|f| f.fits(count)) {
            face.vertex_normals = Some([scratch[face.a], scratch[face.b], scratch[face.c]]);
        }
    }

    /// Radius of the smallest origin-centred sphere holding every vertex.
    ///
    /// Distances are measured from the origin, not from the centroid, so the
    /// result is only tight for geometry authored around the origin. An
    /// empty geometry gets radius 0.
    pub fn compute_bounding_sphere(&mut self) -> BoundingSphere {
        let radius = self
            .vertices
            .iter()
            .map(|v| v.position.length())
            .fold(0.0_f64, f64::max);

        if let Some(offset) = self.centroid_offset() {
            if radius > 0.0 && offset > radius * 1e-3 {
                log::warn!(
                    "geometry {:?} is not centred on the origin (offset {:.3}, radius {:.3}); \
                     bounding sphere will be loose",
                    self.id,
                    offset,
                    radius
                );
            }
        }

        let sphere = BoundingSphere { radius };
        self.bounding_sphere = Some(sphere);
        sphere
    }

    /// Distance from the origin to the mean vertex position.
    pub fn centroid_offset(&self) -> Option<f64> {
        if self.vertices.is_empty() {
            return None;
        }
        let mut sum = Vector3::ZERO;
        for v in &self.vertices {
            sum.add_self(&v.position);
        }
        sum.divide_scalar(self.vertices.len() as f64);
        Some(sum.length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(a: Vector3, b: Vector3, c: Vector3) -> Geometry {
        let mut g = Geometry::new();
        g.vertices = vec![
            Vertex { position: a },
            Vertex { position: b },
            Vertex { position: c },
        ];
        g.faces.push(Face3::new(0, 1, 2));
        g
    }

    #[test]
    fn face_normal_follows_winding() {
        let mut g = triangle(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        );
        g.compute_face_normals(false);
        assert!(g.faces[0].normal.distance_to(&Vector3::new(0.0, 0.0, 1.0)) < 1e-12);
    }

    #[test]
    fn degenerate_triangle_has_zero_normal() {
        let mut collinear = triangle(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(2.0, 2.0, 2.0),
        );
        collinear.compute_face_normals(false);
        assert_eq!(collinear.faces[0].normal, Vector3::ZERO);

        let p = Vector3::new(3.0, -1.0, 2.0);
        let mut coincident = triangle(p, p, p);
        coincident.compute_face_normals(false);
        coincident.compute_vertex_normals();
        let n = coincident.faces[0].vertex_normals.unwrap();
        assert!(n.iter().all(|v| *v == Vector3::ZERO));
    }

    #[test]
    fn vertex_normals_average_adjacent_faces() {
        // Two triangles folded 90 degrees along the shared x axis edge.
        let mut g = Geometry::new();
        g.vertices = vec![
            Vertex::new(0.0, 0.0, 0.0),
            Vertex::new(1.0, 0.0, 0.0),
            Vertex::new(0.0, 1.0, 0.0),
            Vertex::new(0.0, 0.0, -1.0),
        ];
        g.faces.push(Face3::new(0, 1, 2)); // normal +z
        g.faces.push(Face3::new(1, 0, 3)); // normal -y
        g.compute_face_normals(false);
        g.compute_vertex_normals();

        let shared = g.faces[0].vertex_normals.unwrap()[0];
        let mut expected = Vector3::new(0.0, -1.0, 1.0);
        expected.normalize();
        assert!(shared.distance_to(&expected) < 1e-12, "{shared:?}");
    }

    #[test]
    fn vertex_normal_scratch_tracks_vertex_count() {
        let mut g = triangle(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        );
        g.compute_face_normals(false);
        g.compute_vertex_normals();

        g.vertices.push(Vertex::new(0.0, 0.0, 1.0));
        g.faces.push(Face3::new(0, 1, 3));
        g.compute_face_normals(false);
        g.compute_vertex_normals();
        assert_eq!(g.faces[1].vertex_normals.unwrap()[2], Vector3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn bounding_sphere_single_vertex() {
        let mut g = Geometry::new();
        g.vertices.push(Vertex::new(3.0, 4.0, 0.0));
        assert_eq!(g.compute_bounding_sphere().radius, 5.0);
    }

    #[test]
    fn bounding_sphere_empty_is_zero() {
        let mut g = Geometry::new();
        assert_eq!(g.compute_bounding_sphere().radius, 0.0);
        assert_eq!(g.bounding_sphere(), Some(BoundingSphere { radius: 0.0 }));
    }

    #[test]
    fn bounding_sphere_is_max_vertex_distance() {
        let mut g = build_sphere(7.0, 12, 8);
        let r = g.compute_bounding_sphere().radius;
        assert!((r - 7.0).abs() < 1e-9);
        assert!(g.centroid_offset().unwrap() < 1e-9);
    }

    #[test]
    fn clone_gets_new_identity() {
        let g = Geometry::new();
        let h = g.clone();
        assert_ne!(g.id(), h.id());
    }

    #[test]
    fn centroids() {
        let mut g = triangle(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(3.0, 0.0, 0.0),
            Vector3::new(0.0, 3.0, 0.0),
        );
        g.compute_centroids();
        assert_eq!(g.faces[0].centroid, Vector3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn faces_past_the_vertex_list_are_skipped() {
        let mut g = Geometry::new();
        g.vertices.push(Vertex::new(1.0, 0.0, 0.0));
        g.faces.push(Face3::new(0, 1, 2));
        assert_eq!(g.find_bad_face(), Some((0, 1)));

        g.compute_centroids();
        g.compute_face_normals(false);
        g.compute_vertex_normals();
        assert_eq!(g.faces[0].normal, Vector3::ZERO);
        assert_eq!(g.faces[0].vertex_normals, None);

        g.vertices.push(Vertex::new(0.0, 1.0, 0.0));
        g.vertices.push(Vertex::new(0.0, 0.0, 0.0));
        assert_eq!(g.find_bad_face(), None);
    }
}
