//! Scene-graph renderer.
//!
//! Each frame: update the camera and the scene graph, derive the view
//! frustum, make sure every mesh has GPU buffers, then draw visible meshes
//! in an opaque pass followed by a transparent pass.
//!
//! GPU buffers are cached per [`GeometryId`]. A geometry's faces are split
//! into groups of at most [`MAX_GROUP_VERTICES`] vertices so each group can
//! be drawn with 16-bit indices. Each group buffer carries its own
//! [`BufferState`] and is only re-uploaded while `Dirty`.

use super::backend::{
    BufferHandle, BufferKind, CullMode, DrawCall, FrontFace, GraphicsBackend, ObjectUniforms,
    ProgramHandle, ProgramSignature, SamplerDesc, ShaderId, TextureHandle,
};
use crate::error::RenderError;
use crate::geometry::{Geometry, GeometryId};
use crate::material::{Blending, Color, MeshBasicMaterial, Texture, TextureId};
use crate::math::{Matrix3, Matrix4, Vector4};
use crate::scene::{Camera, Mesh, NodeId, Object3D, Scene, Transformable3D};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Range;

pub const MAX_GROUP_VERTICES: usize = 65535;

const BASIC_SHADER: &str = include_str!("../shaders/basic.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Dirty,
    Clean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryBuffer {
    Vertices,
    Uvs,
    Elements,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub vertices: usize,
    pub faces: usize,
    pub draw_calls: usize,
}

/// Face ranges for one geometry: a new group starts whenever the next face
/// would push the group past [`MAX_GROUP_VERTICES`].
pub fn group_ranges(face_count: usize) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut vertices = 0;
    for face in 0..face_count {
        if vertices + 3 > MAX_GROUP_VERTICES {
            ranges.push(start..face);
            start = face;
            vertices = 0;
        }
        vertices += 3;
    }
    if start < face_count {
        ranges.push(start..face_count);
    }
    ranges
}

/// Shader source for a program signature.
pub fn program_source(signature: ProgramSignature) -> String {
    match signature.shader {
        ShaderId::Basic => format!("const USE_MAP: bool = {};\n{}", signature.map, BASIC_SHADER),
    }
}

#[derive(Debug)]
struct GeometryGroup {
    faces: Range<usize>,
    positions: BufferHandle,
    uvs: BufferHandle,
    indices: BufferHandle,
    vertex_state: BufferState,
    uv_state: BufferState,
    element_state: BufferState,
}

impl GeometryGroup {
    fn state_mut(&mut self, which: GeometryBuffer) -> &mut BufferState {
        match which {
            GeometryBuffer::Vertices => &mut self.vertex_state,
            GeometryBuffer::Uvs => &mut self.uv_state,
            GeometryBuffer::Elements => &mut self.element_state,
        }
    }

    fn vertex_count(&self) -> usize {
        self.faces.len() * 3
    }
}

/// Buffers for one geometry. A geometry with a face past its vertex list
/// gets no groups until its counts change.
#[derive(Debug)]
struct GeometryEntry {
    face_count: usize,
    vertex_count: usize,
    groups: Vec<GeometryGroup>,
}

#[derive(Debug, Clone, Copy)]
enum ProgramEntry {
    Ready(ProgramHandle),
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct TextureEntry {
    handle: Option<TextureHandle>,
    version: u64,
}

/// Last fixed-function state sent to the backend; `None` until first set.
#[derive(Debug, Default)]
struct StateCache {
    double_sided: Option<bool>,
    flip_sided: Option<bool>,
    depth_test: Option<bool>,
    blending: Option<Blending>,
}

struct RenderItem {
    id: NodeId,
    uniforms: ObjectUniforms,
    z: f64,
}

pub struct SceneRenderer<B: GraphicsBackend> {
    backend: B,
    geometries: HashMap<GeometryId, GeometryEntry>,
    programs: HashMap<ProgramSignature, ProgramEntry>,
    textures: HashMap<TextureId, TextureEntry>,
    state: StateCache,
    errors: Vec<RenderError>,

    pub auto_clear: bool,
    pub sort_objects: bool,
    clear_color: Color,
    clear_alpha: f32,

    projection_screen: Matrix4,
    frustum: [Vector4; 6],
    stats: RenderStats,
}

impl<B: GraphicsBackend> SceneRenderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            geometries: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            state: StateCache::default(),
            errors: Vec::new(),
            auto_clear: true,
            sort_objects: true,
            clear_color: Color::BLACK,
            clear_alpha: 1.0,
            projection_screen: Matrix4::IDENTITY,
            frustum: [Vector4::default(); 6],
            stats: RenderStats::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.backend.set_viewport(width, height);
    }

    pub fn set_clear_color(&mut self, color: Color, alpha: f32) {
        self.clear_color = color;
        self.clear_alpha = alpha;
    }

    pub fn clear(&mut self) {
        self.backend.clear(self.clear_color.with_alpha(self.clear_alpha));
    }

    /// Counters for the last rendered frame.
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Errors collected while building programs or uploading textures.
    pub fn take_errors(&mut self) -> Vec<RenderError> {
        std::mem::take(&mut self.errors)
    }

    /// Flags one buffer kind of a geometry for re-upload on the next frame.
    pub fn mark_dirty(&mut self, geometry: GeometryId, which: GeometryBuffer) {
        if let Some(entry) = self.geometries.get_mut(&geometry) {
            for group in &mut entry.groups {
                *group.state_mut(which) = BufferState::Dirty;
            }
        }
    }

    pub fn group_count(&self, geometry: GeometryId) -> Option<usize> {
        self.geometries.get(&geometry).map(|e| e.groups.len())
    }

    pub fn buffer_state(&self, geometry: GeometryId, group: usize, which: GeometryBuffer) -> Option<BufferState> {
        let g = self.geometries.get(&geometry)?.groups.get(group)?;
        Some(match which {
            GeometryBuffer::Vertices => g.vertex_state,
            GeometryBuffer::Uvs => g.uv_state,
            GeometryBuffer::Elements => g.element_state,
        })
    }

    /// Creates buffers for meshes new to the scene, frees those of meshes that
    /// left it or were dropped, and uploads every dirty buffer.
    pub fn init_objects(&mut self, scene: &mut Scene) {
        for id in scene.take_objects_removed() {
            if let Some(mesh) = scene.mesh(id) {
                self.dispose_geometry(mesh.geometry().id());
            }
        }
        for geometry in scene.take_geometries_released() {
            self.dispose_geometry(geometry);
        }
        for id in scene.take_objects_added() {
            if let Some(mesh) = scene.mesh(id) {
                log::debug!("scene node {} added ({} faces)", id.index(), mesh.geometry().faces.len());
            }
        }
        for &id in scene.objects() {
            if let Some(mesh) = scene.mesh(id) {
                self.update_buffers(mesh.geometry());
            }
        }
    }

    /// Draws `scene` as seen from `camera`.
    ///
    /// A transform that cannot be inverted aborts the frame with
    /// [`RenderError::Math`]; the renderer stays usable for the next one.
    pub fn render(&mut self, scene: &mut Scene, camera: &mut Camera, force_clear: bool) -> Result<(), RenderError> {
        self.stats = RenderStats::default();

        if camera.object3d().matrix_auto_update {
            camera.update(None, true)?;
        }
        scene.update();

        let view = *camera.matrix_world_inverse();
        let projection = *camera.projection_matrix();
        self.projection_screen.multiply(&projection, &view);
        self.compute_frustum();

        self.init_objects(scene);

        if self.auto_clear || force_clear {
            self.clear();
        }

        let projection_array = projection.flatten_to_array();
        let mut items = Vec::new();
        for &id in scene.objects() {
            let Some(mesh) = scene.mesh(id) else {
                continue;
            };
            let object = mesh.object3d();
            if !object.visible || !self.is_in_frustum(object) {
                continue;
            }

            let mut model_view = Matrix4::IDENTITY;
            let model_view_array = model_view.multiply_to_array(&view, object.matrix_world());
            let normal = Matrix4::make_invert_3x3(&model_view)?;

            let z = if self.sort_objects {
                let mut p = object.matrix_world().position();
                self.projection_screen.multiply_vector3(&mut p);
                p.z
            } else {
                0.0
            };

            items.push(RenderItem {
                id,
                uniforms: ObjectUniforms {
                    projection: projection_array,
                    model_view: model_view_array,
                    color: [1.0; 4],
                    normal_matrix: normal_columns(&normal),
                },
                z,
            });
        }

        // Near to far.
        if self.sort_objects {
            items.sort_by(|a, b| a.z.partial_cmp(&b.z).unwrap_or(Ordering::Equal));
        }

        self.set_blending(Blending::Normal);
        for item in &items {
            self.draw_item(scene, item, false);
        }

        for item in items.iter().rev() {
            self.draw_item(scene, item, true);
        }

        Ok(())
    }

    /// Frees the GPU buffers of one geometry.
    pub fn dispose_geometry(&mut self, id: GeometryId) {
        if let Some(entry) = self.geometries.remove(&id) {
            for group in entry.groups {
                self.delete_group(group);
            }
        }
    }

    pub fn dispose_texture(&mut self, id: TextureId) {
        if let Some(TextureEntry { handle: Some(h), .. }) = self.textures.remove(&id) {
            self.backend.delete_texture(h);
        }
    }

    /// Frees every cached GPU resource.
    pub fn dispose(&mut self) {
        let ids: Vec<GeometryId> = self.geometries.keys().copied().collect();
        for id in ids {
            self.dispose_geometry(id);
        }
        for (_, entry) in self.programs.drain() {
            if let ProgramEntry::Ready(h) = entry {
                self.backend.delete_program(h);
            }
        }
        for (_, entry) in self.textures.drain() {
            if let Some(h) = entry.handle {
                self.backend.delete_texture(h);
            }
        }
    }

    /// Whether the bounding sphere of `object` touches the current frustum.
    pub fn is_in_frustum(&self, object: &Object3D) -> bool {
        let m = object.matrix_world();
        let radius = -object.bound_radius() * object.bound_radius_scale();
        self.frustum.iter().all(|plane| {
            let distance = plane.x * m.n14 + plane.y * m.n24 + plane.z * m.n34 + plane.w;
            distance > radius
        })
    }

    fn compute_frustum(&mut self) {
        let m = &self.projection_screen;
        self.frustum[0].set(m.n41 - m.n11, m.n42 - m.n12, m.n43 - m.n13, m.n44 - m.n14);
        self.frustum[1].set(m.n41 + m.n11, m.n42 + m.n12, m.n43 + m.n13, m.n44 + m.n14);
        self.frustum[2].set(m.n41 + m.n21, m.n42 + m.n22, m.n43 + m.n23, m.n44 + m.n24);
        self.frustum[3].set(m.n41 - m.n21, m.n42 - m.n22, m.n43 - m.n23, m.n44 - m.n24);
        self.frustum[4].set(m.n41 - m.n31, m.n42 - m.n32, m.n43 - m.n33, m.n44 - m.n34);
        self.frustum[5].set(m.n41 + m.n31, m.n42 + m.n32, m.n43 + m.n33, m.n44 + m.n34);

        for plane in &mut self.frustum {
            let length = plane.xyz().length();
            plane.divide_scalar(length);
        }
    }

    fn draw_item(&mut self, scene: &Scene, item: &RenderItem, transparent: bool) {
        let Some(mesh) = scene.mesh(item.id) else {
            return;
        };
        if !mesh.materials.iter().any(|m| m.transparent == transparent) {
            return;
        }

        self.set_object_faces(mesh);
        for material in mesh.materials.iter().filter(|m| m.transparent == transparent) {
            if transparent {
                self.set_blending(material.blending);
            }
            self.set_depth_test(material.depth_test);
            self.render_buffer(mesh, material, &item.uniforms);
        }
    }

    fn render_buffer(&mut self, mesh: &Mesh, material: &MeshBasicMaterial, base: &ObjectUniforms) {
        if !material.is_visible() {
            return;
        }

        let signature = ProgramSignature {
            shader: ShaderId::Basic,
            map: material.map.is_some(),
        };
        let Some(program) = self.program(signature) else {
            return;
        };
        let texture = match &material.map {
            Some(map) => match self.texture(map) {
                Some(handle) => Some(handle),
                None => return,
            },
            None => None,
        };

        let Some(entry) = self.geometries.get(&mesh.geometry().id()) else {
            return;
        };

        let mut uniforms = *base;
        uniforms.color = material.color.with_alpha(material.opacity);

        for group in &entry.groups {
            let count = group.vertex_count();
            self.backend.draw(&DrawCall {
                program,
                positions: group.positions,
                uvs: group.uvs,
                indices: group.indices,
                index_count: count as u32,
                texture,
                uniforms,
            });
            self.stats.draw_calls += 1;
            self.stats.vertices += count;
            self.stats.faces += group.faces.len();
        }
    }

    /// Compiles a program the first time its signature is seen. A failed
    /// build is remembered and never retried.
    fn program(&mut self, signature: ProgramSignature) -> Option<ProgramHandle> {
        let entry = match self.programs.get(&signature) {
            Some(entry) => *entry,
            None => {
                let entry = match self.backend.create_program(signature, &program_source(signature)) {
                    Ok(handle) => {
                        log::debug!("built program {signature:?}");
                        ProgramEntry::Ready(handle)
                    }
                    Err(err) => {
                        log::error!("program {signature:?}: {err}");
                        self.errors.push(err);
                        ProgramEntry::Failed
                    }
                };
                self.programs.insert(signature, entry);
                entry
            }
        };
        match entry {
            ProgramEntry::Ready(handle) => Some(handle),
            ProgramEntry::Failed => None,
        }
    }

    fn texture(&mut self, texture: &Texture) -> Option<TextureHandle> {
        let cached = self.textures.get(&texture.id()).copied();
        if let Some(entry) = cached {
            if entry.version == texture.version() {
                return entry.handle;
            }
        }

        let existing = cached.and_then(|e| e.handle);
        let sampler = SamplerDesc {
            wrap_s: texture.wrap_s,
            wrap_t: texture.wrap_t,
            mag_filter: texture.mag_filter,
            min_filter: texture.min_filter,
        };
        let handle = match self.backend.upload_texture(existing, texture.image(), sampler) {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("texture {:?}: {err}", texture.id());
                if let Some(old) = existing {
                    self.backend.delete_texture(old);
                }
                self.errors.push(err);
                None
            }
        };
        self.textures.insert(
            texture.id(),
            TextureEntry {
                handle,
                version: texture.version(),
            },
        );
        handle
    }

    fn update_buffers(&mut self, geometry: &Geometry) {
        let stale = self.geometries.get(&geometry.id()).map_or(true, |e| {
            e.face_count != geometry.faces.len() || e.vertex_count != geometry.vertices.len()
        });
        if stale {
            self.dispose_geometry(geometry.id());
            if let Some((face, index)) = geometry.find_bad_face() {
                let err = RenderError::FaceIndex {
                    face,
                    index,
                    vertices: geometry.vertices.len(),
                };
                log::warn!("geometry {:?} skipped: {err}", geometry.id());
                self.errors.push(err);
                self.geometries.insert(
                    geometry.id(),
                    GeometryEntry {
                        face_count: geometry.faces.len(),
                        vertex_count: geometry.vertices.len(),
                        groups: Vec::new(),
                    },
                );
                return;
            }
            let groups = group_ranges(geometry.faces.len())
                .into_iter()
                .map(|faces| GeometryGroup {
                    faces,
                    positions: self.backend.create_buffer(BufferKind::Vertex),
                    uvs: self.backend.create_buffer(BufferKind::Vertex),
                    indices: self.backend.create_buffer(BufferKind::Index),
                    vertex_state: BufferState::Dirty,
                    uv_state: BufferState::Dirty,
                    element_state: BufferState::Dirty,
                })
                .collect::<Vec<_>>();
            log::debug!("geometry {:?}: {} buffer groups", geometry.id(), groups.len());
            self.geometries.insert(
                geometry.id(),
                GeometryEntry {
                    face_count: geometry.faces.len(),
                    vertex_count: geometry.vertices.len(),
                    groups,
                },
            );
        }

        let Some(entry) = self.geometries.get_mut(&geometry.id()) else {
            return;
        };
        for group in &mut entry.groups {
            if group.vertex_state == BufferState::Dirty {
                let data = vertex_data(geometry, group.faces.clone());
                self.backend.upload_buffer(group.positions, bytemuck::cast_slice(&data));
                group.vertex_state = BufferState::Clean;
            }
            if group.uv_state == BufferState::Dirty {
                let data = uv_data(geometry, group.faces.clone());
                self.backend.upload_buffer(group.uvs, bytemuck::cast_slice(&data));
                group.uv_state = BufferState::Clean;
            }
            if group.element_state == BufferState::Dirty {
                let data: Vec<u16> = (0..group.vertex_count()).map(|i| i as u16).collect();
                self.backend.upload_buffer(group.indices, bytemuck::cast_slice(&data));
                group.element_state = BufferState::Clean;
            }
        }
    }

    fn delete_group(&mut self, group: GeometryGroup) {
        self.backend.delete_buffer(group.positions);
        self.backend.delete_buffer(group.uvs);
        self.backend.delete_buffer(group.indices);
    }

    fn set_object_faces(&mut self, mesh: &Mesh) {
        if self.state.double_sided != Some(mesh.double_sided) {
            let cull = if mesh.double_sided { CullMode::None } else { CullMode::Back };
            self.backend.set_cull_mode(cull);
            self.state.double_sided = Some(mesh.double_sided);
        }
        if self.state.flip_sided != Some(mesh.flip_sided) {
            let front = if mesh.flip_sided { FrontFace::Cw } else { FrontFace::Ccw };
            self.backend.set_front_face(front);
            self.state.flip_sided = Some(mesh.flip_sided);
        }
    }

    fn set_depth_test(&mut self, enabled: bool) {
        if self.state.depth_test != Some(enabled) {
            self.backend.set_depth_test(enabled);
            self.state.depth_test = Some(enabled);
        }
    }

    fn set_blending(&mut self, blending: Blending) {
        if self.state.blending != Some(blending) {
            self.backend.set_blending(blending);
            self.state.blending = Some(blending);
        }
    }
}

fn vertex_data(geometry: &Geometry, faces: Range<usize>) -> Vec<f32> {
    let mut data = Vec::with_capacity(faces.len() * 9);
    for face in &geometry.faces[faces] {
        for i in face.indices() {
            data.extend_from_slice(&geometry.vertices[i].position.to_f32_array());
        }
    }
    data
}

/// Faces without UVs get zeros.
fn uv_data(geometry: &Geometry, faces: Range<usize>) -> Vec<f32> {
    let mut data = Vec::with_capacity(faces.len() * 6);
    for face in faces {
        match geometry.uv(face) {
            Some(uvs) => {
                for uv in uvs {
                    data.push(uv.u as f32);
                    data.push(uv.v as f32);
                }
            }
            None => data.extend_from_slice(&[0.0; 6]),
        }
    }
    data
}

/// Column-major 3x3 padded to three `vec4` columns.
fn normal_columns(inverse: &Matrix3) -> [[f32; 4]; 3] {
    let mut n = *inverse;
    n.transpose();
    let m = n.m;
    [
        [m[0] as f32, m[1] as f32, m[2] as f32, 0.0],
        [m[3] as f32, m[4] as f32, m[5] as f32, 0.0],
        [m[6] as f32, m[7] as f32, m[8] as f32, 0.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{build_sphere, Face3, Vertex};
    use crate::math::Vector3;
    use crate::renderer::backend::recording::{RecordingBackend, StateChange};
    use image::RgbaImage;
    use std::sync::Arc;

    fn camera() -> Camera {
        let mut cam = Camera::new(70.0, 1.0, 1.0, 1100.0).unwrap();
        cam.target = Vector3::new(0.0, 0.0, -1.0);
        cam
    }

    fn renderer() -> SceneRenderer<RecordingBackend> {
        SceneRenderer::new(RecordingBackend::default())
    }

    fn triangles(count: usize) -> Geometry {
        let mut g = Geometry::new();
        g.vertices = vec![
            Vertex::new(-1.0, -1.0, 0.0),
            Vertex::new(1.0, -1.0, 0.0),
            Vertex::new(0.0, 1.0, 0.0),
        ];
        g.faces = (0..count).map(|_| Face3::new(0, 1, 2)).collect();
        g
    }

    fn mesh_at(geometry: Geometry, material: MeshBasicMaterial, z: f64) -> Mesh {
        let mut mesh = Mesh::new(geometry, material);
        mesh.object3d_mut().set_position(0.0, 0.0, z);
        mesh
    }

    fn textured() -> MeshBasicMaterial {
        MeshBasicMaterial::with_map(Texture::new(Arc::new(RgbaImage::new(4, 2))))
    }

    #[test]
    fn group_ranges_respect_cap() {
        assert!(group_ranges(0).is_empty());
        assert_eq!(group_ranges(21845), vec![0..21845]);
        assert_eq!(group_ranges(21846), vec![0..21845, 21845..21846]);
        for faces in [1, 4680, 30000, 65535, 100_000] {
            let ranges = group_ranges(faces);
            assert_eq!(ranges.len(), (3 * faces + MAX_GROUP_VERTICES - 1) / MAX_GROUP_VERTICES);
            assert!(ranges.iter().all(|r| r.len() * 3 <= MAX_GROUP_VERTICES));
            assert_eq!(ranges.iter().map(|r| r.len()).sum::<usize>(), faces);
        }
    }

    #[test]
    fn large_geometry_is_split_into_groups() {
        let mut scene = Scene::new();
        let geometry = triangles(30000);
        let gid = geometry.id();
        scene.add_object(mesh_at(geometry, MeshBasicMaterial::default(), -5.0));
        let mut r = renderer();
        r.render(&mut scene, &mut camera(), false).unwrap();

        assert_eq!(r.group_count(gid), Some(2));
        assert_eq!(r.stats().draw_calls, 2);
        assert_eq!(r.stats().faces, 30000);
        let counts: Vec<u32> = r.backend().draws.iter().map(|d| d.index_count).collect();
        assert_eq!(counts, vec![65535, 24465]);
    }

    #[test]
    fn clean_frame_uploads_nothing() {
        let mut scene = Scene::new();
        let geometry = build_sphere(1.0, 8, 6);
        let gid = geometry.id();
        let faces = geometry.faces.len();
        scene.add_object(mesh_at(geometry, textured(), -5.0));
        let mut cam = camera();
        let mut r = renderer();

        r.render(&mut scene, &mut cam, false).unwrap();
        assert_eq!(r.backend().bytes_uploaded, faces * 3 * (12 + 8 + 2));
        assert_eq!(r.backend().texture_uploads, 1);

        r.backend_mut().reset_counters();
        r.render(&mut scene, &mut cam, false).unwrap();
        assert_eq!(r.backend().bytes_uploaded, 0);
        assert_eq!(r.backend().texture_uploads, 0);

        r.mark_dirty(gid, GeometryBuffer::Uvs);
        assert_eq!(r.buffer_state(gid, 0, GeometryBuffer::Uvs), Some(BufferState::Dirty));
        assert_eq!(r.buffer_state(gid, 0, GeometryBuffer::Vertices), Some(BufferState::Clean));
        r.render(&mut scene, &mut cam, false).unwrap();
        assert_eq!(r.backend().bytes_uploaded, faces * 3 * 8);
        assert_eq!(r.buffer_state(gid, 0, GeometryBuffer::Uvs), Some(BufferState::Clean));
    }

    #[test]
    fn texture_reuploads_on_new_version() {
        let mut scene = Scene::new();
        let id = scene.add_object(mesh_at(triangles(1), textured(), -5.0));
        let mut cam = camera();
        let mut r = renderer();
        r.render(&mut scene, &mut cam, false).unwrap();
        r.backend_mut().reset_counters();

        let map = scene.mesh_mut(id).unwrap().materials[0].map.as_mut().unwrap();
        map.set_image(Arc::new(RgbaImage::new(8, 4)));
        r.render(&mut scene, &mut cam, false).unwrap();
        assert_eq!(r.backend().texture_uploads, 1);
    }

    #[test]
    fn one_program_per_signature() {
        let mut scene = Scene::new();
        scene.add_object(mesh_at(triangles(1), textured(), -5.0));
        scene.add_object(mesh_at(triangles(1), textured(), -6.0));
        let mut cam = camera();
        let mut r = renderer();
        r.render(&mut scene, &mut cam, false).unwrap();
        assert_eq!(r.backend().programs_created.len(), 1);

        scene.add_object(mesh_at(triangles(1), MeshBasicMaterial::default(), -7.0));
        r.render(&mut scene, &mut cam, false).unwrap();
        r.render(&mut scene, &mut cam, false).unwrap();
        assert_eq!(
            r.backend().programs_created,
            vec![
                ProgramSignature { shader: ShaderId::Basic, map: true },
                ProgramSignature { shader: ShaderId::Basic, map: false },
            ]
        );
    }

    #[test]
    fn program_source_defines_map() {
        let with = program_source(ProgramSignature { shader: ShaderId::Basic, map: true });
        assert!(with.starts_with("const USE_MAP: bool = true;"));
        assert!(with.contains("fn fs_main"));
    }

    #[test]
    fn failed_program_skips_draws_without_retry() {
        let mut scene = Scene::new();
        scene.add_object(mesh_at(triangles(1), MeshBasicMaterial::default(), -5.0));
        let mut cam = camera();
        let mut r = renderer();
        r.backend_mut().fail_programs = true;

        r.render(&mut scene, &mut cam, false).unwrap();
        r.render(&mut scene, &mut cam, false).unwrap();
        assert!(r.backend().draws.is_empty());
        assert_eq!(r.backend().programs_created.len(), 1);
        assert!(matches!(r.take_errors().as_slice(), [RenderError::Shader(_)]));
    }

    #[test]
    fn state_changes_are_coalesced() {
        let mut scene = Scene::new();
        for z in [-5.0, -6.0, -7.0] {
            scene.add_object(mesh_at(triangles(1), MeshBasicMaterial::default(), z));
        }
        let mut cam = camera();
        let mut r = renderer();
        r.render(&mut scene, &mut cam, false).unwrap();
        assert_eq!(
            r.backend().state_changes,
            vec![
                StateChange::Blend(Blending::Normal),
                StateChange::Cull(CullMode::Back),
                StateChange::Front(FrontFace::Ccw),
                StateChange::Depth(true),
            ]
        );

        r.backend_mut().reset_counters();
        r.render(&mut scene, &mut cam, false).unwrap();
        assert!(r.backend().state_changes.is_empty());
        assert_eq!(r.backend().draws.len(), 3);
    }

    #[test]
    fn flip_and_double_sided_toggle_state() {
        let mut scene = Scene::new();
        let mut a = mesh_at(triangles(1), MeshBasicMaterial::default(), -5.0);
        a.double_sided = true;
        let mut b = mesh_at(triangles(1), MeshBasicMaterial::default(), -6.0);
        b.flip_sided = true;
        scene.add_object(a);
        scene.add_object(b);
        let mut r = renderer();
        r.render(&mut scene, &mut camera(), false).unwrap();

        let changes = &r.backend().state_changes;
        assert!(changes.contains(&StateChange::Cull(CullMode::None)));
        assert!(changes.contains(&StateChange::Cull(CullMode::Back)));
        assert!(changes.contains(&StateChange::Front(FrontFace::Cw)));
    }

    #[test]
    fn singular_transform_fails_frame_not_renderer() {
        let mut scene = Scene::new();
        let id = scene.add_object(mesh_at(triangles(1), MeshBasicMaterial::default(), -5.0));
        scene.object_mut(id).unwrap().set_scale(0.0, 0.0, 0.0);
        let mut cam = camera();
        let mut r = renderer();

        // The zero-radius bound still sits inside the frustum.
        let err = r.render(&mut scene, &mut cam, false).unwrap_err();
        assert!(matches!(err, RenderError::Math(crate::error::MathError::NotInvertible)));

        scene.object_mut(id).unwrap().set_scale(1.0, 1.0, 1.0);
        r.render(&mut scene, &mut cam, false).unwrap();
        assert_eq!(r.stats().draw_calls, 1);
    }

    #[test]
    fn face_past_vertex_list_skips_mesh_not_frame() {
        let mut scene = Scene::new();
        let mut broken = Geometry::new();
        broken.vertices.push(Vertex::new(0.0, 0.0, 0.0));
        broken.faces.push(Face3::new(0, 1, 2));
        let id = scene.add_object(mesh_at(broken, MeshBasicMaterial::default(), -5.0));
        scene.add_object(mesh_at(triangles(1), MeshBasicMaterial::default(), -6.0));
        let mut cam = camera();
        let mut r = renderer();

        r.render(&mut scene, &mut cam, false).unwrap();
        assert_eq!(r.stats().draw_calls, 1);
        assert!(matches!(
            r.take_errors().as_slice(),
            [RenderError::FaceIndex { face: 0, index: 1, vertices: 1 }]
        ));

        // Reported once, not every frame.
        r.render(&mut scene, &mut cam, false).unwrap();
        assert_eq!(r.stats().draw_calls, 1);
        assert!(r.take_errors().is_empty());

        let geometry = scene.mesh_mut(id).unwrap().geometry_mut();
        geometry.vertices.push(Vertex::new(1.0, 0.0, 0.0));
        geometry.vertices.push(Vertex::new(0.0, 1.0, 0.0));
        r.render(&mut scene, &mut cam, false).unwrap();
        assert_eq!(r.stats().draw_calls, 2);
    }

    #[test]
    fn culls_objects_outside_frustum() {
        let mut scene = Scene::new();
        scene.add_object(mesh_at(triangles(1), MeshBasicMaterial::default(), 50.0));
        scene.add_object(mesh_at(triangles(1), MeshBasicMaterial::default(), -2000.0));
        let visible = scene.add_object(mesh_at(triangles(1), MeshBasicMaterial::default(), -10.0));
        let mut r = renderer();
        r.render(&mut scene, &mut camera(), false).unwrap();
        assert_eq!(r.stats().draw_calls, 1);

        scene.object_mut(visible).unwrap().visible = false;
        r.render(&mut scene, &mut camera(), false).unwrap();
        assert_eq!(r.stats().draw_calls, 0);
    }

    #[test]
    fn transparent_pass_runs_back_to_front_after_opaque() {
        let mut scene = Scene::new();
        let glass = || MeshBasicMaterial {
            transparent: true,
            opacity: 0.5,
            blending: Blending::Additive,
            ..Default::default()
        };
        scene.add_object(mesh_at(triangles(1), glass(), -5.0));
        scene.add_object(mesh_at(triangles(1), glass(), -50.0));
        scene.add_object(mesh_at(triangles(1), MeshBasicMaterial::default(), -20.0));
        let mut r = renderer();
        r.render(&mut scene, &mut camera(), false).unwrap();

        // Column-major translation z of each draw's model-view.
        let zs: Vec<f32> = r.backend().draws.iter().map(|d| d.uniforms.model_view[14]).collect();
        assert_eq!(zs, vec![-20.0, -50.0, -5.0]);
        assert_eq!(r.backend().draws[1].uniforms.color[3], 0.5);
        assert!(r
            .backend()
            .state_changes
            .contains(&StateChange::Blend(Blending::Additive)));
    }

    #[test]
    fn invisible_material_is_skipped() {
        let mut scene = Scene::new();
        let hidden = MeshBasicMaterial {
            opacity: 0.0,
            ..Default::default()
        };
        scene.add_object(mesh_at(triangles(1), hidden, -5.0));
        let mut r = renderer();
        r.render(&mut scene, &mut camera(), false).unwrap();
        assert!(r.backend().draws.is_empty());
    }

    #[test]
    fn sphere_stats() {
        let mut scene = Scene::new();
        let mut sphere = Mesh::new(build_sphere(500.0, 60, 40), textured());
        sphere.object3d_mut().set_scale(-1.0, 1.0, 1.0);
        scene.add_object(sphere);
        let mut r = renderer();
        r.render(&mut scene, &mut camera(), false).unwrap();
        assert_eq!(
            r.stats(),
            RenderStats {
                vertices: 4680 * 3,
                faces: 4680,
                draw_calls: 1
            }
        );
        assert_eq!(r.backend().clears, 1);
    }

    #[test]
    fn fully_mirrored_sphere_around_camera_is_drawn() {
        let mut scene = Scene::new();
        let mut sphere = Mesh::new(build_sphere(500.0, 16, 12), MeshBasicMaterial::default());
        sphere.object3d_mut().set_scale(-1.0, -1.0, -1.0);
        scene.add_object(sphere);
        let mut r = renderer();
        r.render(&mut scene, &mut camera(), false).unwrap();
        assert_eq!(r.stats().draw_calls, 1);
    }

    #[test]
    fn oversized_texture_reports_error() {
        let mut scene = Scene::new();
        scene.add_object(mesh_at(triangles(1), textured(), -5.0));
        let mut r = renderer();
        r.backend_mut().max_texture_size = Some(2);
        r.render(&mut scene, &mut camera(), false).unwrap();
        assert!(r.backend().draws.is_empty());
        assert!(matches!(
            r.take_errors().as_slice(),
            [RenderError::ImageTooBig { width: 4, max: 2 }]
        ));
    }

    #[test]
    fn removed_meshes_release_buffers() {
        let mut scene = Scene::new();
        let id = scene.add_object(mesh_at(triangles(30000), MeshBasicMaterial::default(), -5.0));
        let mut r = renderer();
        r.render(&mut scene, &mut camera(), false).unwrap();
        assert_eq!(r.backend().buffers.len(), 6);

        scene.remove_child(scene.root(), id).unwrap();
        r.render(&mut scene, &mut camera(), false).unwrap();
        assert!(r.backend().buffers.is_empty());
    }

    #[test]
    fn dropped_nodes_release_buffers() {
        let mut scene = Scene::new();
        let id = scene.add_object(mesh_at(triangles(1), MeshBasicMaterial::default(), -5.0));
        let mut r = renderer();
        r.render(&mut scene, &mut camera(), false).unwrap();
        assert_eq!(r.backend().buffers.len(), 3);

        scene.remove_node(id).unwrap();
        let next = scene.add_object(mesh_at(triangles(1), MeshBasicMaterial::default(), -5.0));
        assert_eq!(next.index(), id.index());
        r.render(&mut scene, &mut camera(), false).unwrap();
        assert_eq!(r.backend().buffers.len(), 3);
        assert_eq!(r.stats().draw_calls, 1);
    }

    #[test]
    fn face_count_change_rebuilds_groups() {
        let mut scene = Scene::new();
        let id = scene.add_object(mesh_at(triangles(10), MeshBasicMaterial::default(), -5.0));
        let mut r = renderer();
        r.render(&mut scene, &mut camera(), false).unwrap();

        let mesh = scene.mesh_mut(id).unwrap();
        let extra: Vec<Face3> = (0..30000).map(|_| Face3::new(0, 1, 2)).collect();
        mesh.geometry_mut().faces.extend(extra);
        let gid = mesh.geometry().id();
        r.render(&mut scene, &mut camera(), false).unwrap();
        assert_eq!(r.group_count(gid), Some(2));
        assert_eq!(r.stats().faces, 30010);
    }
}
