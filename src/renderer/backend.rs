//! The seam between the scene renderer and a graphics API.

use crate::error::RenderError;
use crate::material::{Blending, Filter, Wrapping};
use image::RgbaImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Interleaving-free vertex attribute data.
    Vertex,
    /// `u16` indices.
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderId {
    Basic,
}

/// Everything that changes the generated shader source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramSignature {
    pub shader: ShaderId,
    pub map: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub wrap_s: Wrapping,
    pub wrap_t: Wrapping,
    pub mag_filter: Filter,
    pub min_filter: Filter,
}

/// Per-draw uniform block, laid out for `basic.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniforms {
    pub projection: [f32; 16],
    pub model_view: [f32; 16],
    pub color: [f32; 4],
    /// Inverse-transpose of the model-view, one padded `vec4` per column.
    pub normal_matrix: [[f32; 4]; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub positions: BufferHandle,
    pub uvs: BufferHandle,
    pub indices: BufferHandle,
    pub index_count: u32,
    pub texture: Option<TextureHandle>,
    pub uniforms: ObjectUniforms,
}

/// Graphics context as seen by [`SceneRenderer`](super::SceneRenderer).
///
/// Fixed-function state (`set_*`) applies to every following `draw`.
pub trait GraphicsBackend {
    fn create_buffer(&mut self, kind: BufferKind) -> BufferHandle;
    fn upload_buffer(&mut self, buffer: BufferHandle, data: &[u8]);
    fn delete_buffer(&mut self, buffer: BufferHandle);

    fn create_program(&mut self, signature: ProgramSignature, source: &str) -> Result<ProgramHandle, RenderError>;
    fn delete_program(&mut self, program: ProgramHandle);

    /// Uploads into `existing` when given, otherwise allocates a new texture.
    fn upload_texture(
        &mut self,
        existing: Option<TextureHandle>,
        image: &RgbaImage,
        sampler: SamplerDesc,
    ) -> Result<TextureHandle, RenderError>;
    fn delete_texture(&mut self, texture: TextureHandle);

    fn set_viewport(&mut self, width: u32, height: u32);
    fn clear(&mut self, color: [f32; 4]);

    fn set_cull_mode(&mut self, cull: CullMode);
    fn set_front_face(&mut self, front: FrontFace);
    fn set_depth_test(&mut self, enabled: bool);
    fn set_blending(&mut self, blending: Blending);

    fn draw(&mut self, call: &DrawCall);
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq)]
    pub enum StateChange {
        Cull(CullMode),
        Front(FrontFace),
        Depth(bool),
        Blend(Blending),
    }

    /// Backend that records what it is asked to do.
    #[derive(Debug, Default)]
    pub struct RecordingBackend {
        next: u32,
        pub buffers: HashMap<BufferHandle, usize>,
        pub bytes_uploaded: usize,
        pub programs_created: Vec<ProgramSignature>,
        pub programs_deleted: usize,
        pub fail_programs: bool,
        pub texture_uploads: usize,
        pub max_texture_size: Option<u32>,
        pub state_changes: Vec<StateChange>,
        pub draws: Vec<DrawCall>,
        pub clears: usize,
    }

    impl RecordingBackend {
        fn next_id(&mut self) -> u32 {
            self.next += 1;
            self.next
        }

        pub fn reset_counters(&mut self) {
            self.bytes_uploaded = 0;
            self.texture_uploads = 0;
            self.state_changes.clear();
            self.draws.clear();
            self.clears = 0;
        }
    }

    impl GraphicsBackend for RecordingBackend {
        fn create_buffer(&mut self, _kind: BufferKind) -> BufferHandle {
            let h = BufferHandle(self.next_id());
            self.buffers.insert(h, 0);
            h
        }

        fn upload_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
            self.buffers.insert(buffer, data.len());
            self.bytes_uploaded += data.len();
        }

        fn delete_buffer(&mut self, buffer: BufferHandle) {
            self.buffers.remove(&buffer);
        }

        fn create_program(&mut self, signature: ProgramSignature, source: &str) -> Result<ProgramHandle, RenderError> {
            self.programs_created.push(signature);
            if self.fail_programs {
                return Err(RenderError::Shader(format!("rejected {} bytes", source.len())));
            }
            Ok(ProgramHandle(self.next_id()))
        }

        fn delete_program(&mut self, _program: ProgramHandle) {
            self.programs_deleted += 1;
        }

        fn upload_texture(
            &mut self,
            existing: Option<TextureHandle>,
            image: &RgbaImage,
            _sampler: SamplerDesc,
        ) -> Result<TextureHandle, RenderError> {
            if let Some(max) = self.max_texture_size {
                if image.width() > max {
                    return Err(RenderError::ImageTooBig { width: image.width(), max });
                }
            }
            self.texture_uploads += 1;
            Ok(existing.unwrap_or_else(|| TextureHandle(self.next_id())))
        }

        fn delete_texture(&mut self, _texture: TextureHandle) {}

        fn set_viewport(&mut self, _width: u32, _height: u32) {}

        fn clear(&mut self, _color: [f32; 4]) {
            self.clears += 1;
        }

        fn set_cull_mode(&mut self, cull: CullMode) {
            self.state_changes.push(StateChange::Cull(cull));
        }

        fn set_front_face(&mut self, front: FrontFace) {
            self.state_changes.push(StateChange::Front(front));
        }

        fn set_depth_test(&mut self, enabled: bool) {
            self.state_changes.push(StateChange::Depth(enabled));
        }

        fn set_blending(&mut self, blending: Blending) {
            self.state_changes.push(StateChange::Blend(blending));
        }

        fn draw(&mut self, call: &DrawCall) {
            self.draws.push(*call);
        }
    }
}
