// sphere.rs: UV sphere generator
// 两极各一个顶点，经线接缝处索引回绕到第 0 列

use super::{BoundingSphere, Face3, Geometry, Vertex};
use crate::math::{Uv, Vector3};
use std::f64::consts::PI;

/// Builds a sphere of `radius` with at least 3 columns and 2 rows.
///
/// Row `j` sits at polar angle `πj/rows`; the poles collapse to a single
/// vertex. Faces carry per-corner UVs with u mirrored (`1 - i/columns`) so an
/// equirectangular image reads correctly from inside the sphere.
pub fn build_sphere(radius: f64, segments_width: usize, segments_height: usize) -> Geometry {
    let columns = segments_width.max(3);
    let rows = segments_height.max(2);

    let mut geometry = Geometry::new();
    geometry.vertices.reserve(2 + (rows - 1) * columns);

    // grid[j][i] -> vertex index
    let mut grid: Vec<Vec<usize>> = Vec::with_capacity(rows + 1);
    for j in 0..=rows {
        let polar = PI * j as f64 / rows as f64;
        let z = radius * polar.cos();
        let ring = radius * polar.sin();
        let is_pole = j == 0 || j == rows;

        let mut row = Vec::with_capacity(columns);
        let mut index = 0;
        for i in 0..columns {
            let azimuth = 2.0 * PI * i as f64 / columns as f64;
            let x = ring * azimuth.sin();
            let y = ring * azimuth.cos();
            if !(is_pole && i > 0) {
                index = geometry.vertices.len();
                geometry.vertices.push(Vertex::new(y, z, x));
            }
            row.push(index);
        }
        grid.push(row);
    }

    let last_row = grid.len() - 1;
    let unit = |geometry: &Geometry, i: usize| -> Vector3 {
        let mut n = geometry.vertices[i].position;
        n.normalize();
        n
    };

    for j in 1..grid.len() {
        let width = grid[j].len();
        for i in 0..width {
            let wrap = i == width - 1;
            let next = if wrap { 0 } else { i + 1 };

            let p1 = grid[j][next];
            let p2 = grid[j][i];
            let p3 = grid[j - 1][i];
            let p4 = grid[j - 1][next];

            let v0 = j as f64 / last_row as f64;
            let v1 = (j - 1) as f64 / last_row as f64;
            let u0 = (i + 1) as f64 / width as f64;
            let u1 = i as f64 / width as f64;

            let uv1 = Uv::new(1.0 - u0, v0);
            let uv2 = Uv::new(1.0 - u1, v0);
            let uv3 = Uv::new(1.0 - u1, v1);
            let uv4 = Uv::new(1.0 - u0, v1);

            if j < last_row {
                let normals = [unit(&geometry, p1), unit(&geometry, p2), unit(&geometry, p3)];
                geometry.faces.push(Face3::new(p1, p2, p3).with_vertex_normals(normals));
                geometry.face_vertex_uvs.push([uv1, uv2, uv3]);
            }
            if j > 1 {
                let normals = [unit(&geometry, p1), unit(&geometry, p3), unit(&geometry, p4)];
                geometry.faces.push(Face3::new(p1, p3, p4).with_vertex_normals(normals));
                geometry.face_vertex_uvs.push([uv1, uv3, uv4]);
            }
        }
    }

    geometry.compute_centroids();
    geometry.compute_face_normals(false);
    geometry.compute_vertex_normals();
    geometry.set_bounding_sphere(BoundingSphere { radius });

    geometry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_sphere_counts() {
        let g = build_sphere(500.0, 60, 40);
        assert_eq!(g.faces.len(), 4680);
        assert_eq!(g.face_vertex_uvs.len(), g.faces.len());
        assert_eq!(g.vertices.len(), 2 + 39 * 60);
        assert_eq!(g.bounding_sphere().map(|s| s.radius), Some(500.0));
    }

    #[test]
    fn segment_minimums() {
        let g = build_sphere(1.0, 0, 0);
        // 3 columns, 2 rows: two poles plus one equator ring.
        assert_eq!(g.vertices.len(), 5);
        assert_eq!(g.faces.len(), 6);
    }

    #[test]
    fn poles_are_single_vertices() {
        let g = build_sphere(2.0, 8, 4);
        let north = g.vertices.iter().filter(|v| (v.position.y - 2.0).abs() < 1e-12).count();
        let south = g.vertices.iter().filter(|v| (v.position.y + 2.0).abs() < 1e-12).count();
        assert_eq!((north, south), (1, 1));
    }

    #[test]
    fn vertices_lie_on_sphere_and_uvs_in_range() {
        let g = build_sphere(3.0, 16, 9);
        for v in &g.vertices {
            assert!((v.position.length() - 3.0).abs() < 1e-9);
        }
        for uv in g.face_vertex_uvs.iter().flatten() {
            assert!((0.0..=1.0).contains(&uv.u) && (0.0..=1.0).contains(&uv.v), "{uv:?}");
        }
    }

    #[test]
    fn seam_wraps_to_first_column() {
        let g = build_sphere(1.0, 6, 3);
        let max_index = g.faces.iter().flat_map(|f| f.indices()).max().unwrap();
        assert_eq!(max_index, g.vertices.len() - 1);
        // Every equator-ring vertex is used by some face.
        for i in 1..g.vertices.len() - 1 {
            assert!(g.faces.iter().any(|f| f.indices().contains(&i)), "vertex {i} unused");
        }
    }

    #[test]
    fn face_normals_are_unit() {
        let g = build_sphere(10.0, 12, 6);
        for f in &g.faces {
            assert!((f.normal.length() - 1.0).abs() < 1e-9);
        }
    }
}
