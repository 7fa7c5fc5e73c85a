//! `wgpu` implementation of [`GraphicsBackend`].
//!
//! State setters and draws are recorded during [`SceneRenderer::render`] and
//! replayed into a render pass by [`WgpuBackend::encode`]. Fixed-function
//! state is baked into pipelines, so one pipeline exists per
//! (program, cull, front face, depth test, blending) combination, built on
//! first use.
//!
//! [`SceneRenderer::render`]: super::SceneRenderer::render

use super::backend::{
    BufferHandle, BufferKind, CullMode, DrawCall, FrontFace, GraphicsBackend, ObjectUniforms,
    ProgramHandle, ProgramSignature, SamplerDesc, TextureHandle,
};
use crate::error::RenderError;
use crate::material::{Blending, Filter, Wrapping};
use image::RgbaImage;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use wgpu::util::DeviceExt;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

const OBJECT_UNIFORM_SIZE: u64 = std::mem::size_of::<ObjectUniforms>() as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineState {
    cull: CullMode,
    front: FrontFace,
    depth_test: bool,
    blending: Blending,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            cull: CullMode::Back,
            front: FrontFace::Ccw,
            depth_test: true,
            blending: Blending::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    state: PipelineState,
}

struct GpuBuffer {
    kind: BufferKind,
    buffer: Option<wgpu::Buffer>,
}

struct GpuTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

struct DepthTarget {
    view: wgpu::TextureView,
    size: (u32, u32),
}

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
    next_id: u32,

    buffers: HashMap<BufferHandle, GpuBuffer>,
    programs: HashMap<ProgramHandle, wgpu::ShaderModule>,
    textures: HashMap<TextureHandle, GpuTexture>,
    // `None` marks a pipeline that failed validation.
    pipelines: HashMap<PipelineKey, Option<wgpu::RenderPipeline>>,

    object_layout: wgpu::BindGroupLayout,
    map_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    default_map: wgpu::BindGroup,

    uniform_stride: u64,
    uniform_capacity: u64,
    uniform_buffer: wgpu::Buffer,
    object_bind_group: wgpu::BindGroup,

    depth: Option<DepthTarget>,
    viewport: (u32, u32),
    state: PipelineState,
    clear: Option<[f32; 4]>,
    draws: Vec<(DrawCall, PipelineState)>,
}

impl WgpuBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, format: wgpu::TextureFormat) -> Self {
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(OBJECT_UNIFORM_SIZE),
                },
                count: None,
            }],
            label: Some("object_bind_group_layout"),
        });

        let map_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("map_bind_group_layout"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("basic_pipeline_layout"),
            bind_group_layouts: &[&object_layout, &map_layout],
            push_constant_ranges: &[],
        });

        // 无贴图时绑定 1x1 白色纹理
        let white = RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        let default_texture = create_texture(&device, &queue, &map_layout, &white, default_sampler());
        let default_map = default_texture.bind_group;

        let align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_stride = OBJECT_UNIFORM_SIZE.div_ceil(align) * align;
        let uniform_capacity = 64;
        let (uniform_buffer, object_bind_group) =
            create_uniforms(&device, &object_layout, uniform_stride * uniform_capacity);

        Self {
            device,
            queue,
            format,
            next_id: 0,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            object_layout,
            map_layout,
            pipeline_layout,
            default_map,
            uniform_stride,
            uniform_capacity,
            uniform_buffer,
            object_bind_group,
            depth: None,
            viewport: (1, 1),
            state: PipelineState::default(),
            clear: None,
            draws: Vec::new(),
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Replays everything recorded since the last call into `encoder`,
    /// targeting `view` (which must match the viewport size).
    pub fn encode(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        if self.draws.is_empty() && self.clear.is_none() {
            return;
        }

        self.ensure_depth_target();
        self.write_uniforms();
        let keys: Vec<PipelineKey> = self
            .draws
            .iter()
            .map(|(call, state)| PipelineKey {
                program: call.program,
                state: *state,
            })
            .collect();
        for key in &keys {
            self.ensure_pipeline(*key);
        }

        let load = match self.clear.take() {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };

        let draws = std::mem::take(&mut self.draws);
        let Some(depth) = self.depth.as_ref() else {
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations { load, store: true },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: true,
                }),
                stencil_ops: None,
            }),
        });

        for (i, ((call, _), key)) in draws.iter().zip(&keys).enumerate() {
            let Some(Some(pipeline)) = self.pipelines.get(key) else {
                continue;
            };
            let (Some(positions), Some(uvs), Some(indices)) = (
                self.buffer(call.positions),
                self.buffer(call.uvs),
                self.buffer(call.indices),
            ) else {
                continue;
            };
            let map = match call.texture {
                Some(h) => match self.textures.get(&h) {
                    Some(t) => &t.bind_group,
                    None => continue,
                },
                None => &self.default_map,
            };

            let offset = (i as u64 * self.uniform_stride) as u32;
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.object_bind_group, &[offset]);
            pass.set_bind_group(1, map, &[]);
            pass.set_vertex_buffer(0, positions.slice(..));
            pass.set_vertex_buffer(1, uvs.slice(..));
            pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..call.index_count, 0, 0..1);
        }
    }

    fn buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(&handle)?.buffer.as_ref()
    }

    fn ensure_depth_target(&mut self) {
        if self.depth.as_ref().map(|d| d.size) == Some(self.viewport) {
            return;
        }
        let (width, height) = self.viewport;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            label: Some("depth_texture"),
            view_formats: &[],
        });
        self.depth = Some(DepthTarget {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            size: self.viewport,
        });
    }

    fn write_uniforms(&mut self) {
        let needed = self.draws.len() as u64;
        if needed > self.uniform_capacity {
            self.uniform_capacity = needed.next_power_of_two();
            let (buffer, bind_group) = create_uniforms(
                &self.device,
                &self.object_layout,
                self.uniform_stride * self.uniform_capacity,
            );
            self.uniform_buffer = buffer;
            self.object_bind_group = bind_group;
            log::debug!("object uniform buffer grown to {} slots", self.uniform_capacity);
        }

        let stride = self.uniform_stride as usize;
        let mut data = vec![0u8; stride * self.draws.len()];
        for (i, (call, _)) in self.draws.iter().enumerate() {
            let bytes = bytemuck::bytes_of(&call.uniforms);
            data[i * stride..i * stride + bytes.len()].copy_from_slice(bytes);
        }
        if !data.is_empty() {
            self.queue.write_buffer(&self.uniform_buffer, 0, &data);
        }
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let Some(module) = self.programs.get(&key.program) else {
            return;
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("basic_pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: "vs_main",
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: 12,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x3],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: 8,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![1 => Float32x2],
                    },
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.format,
                    blend: Some(blend_state(key.state.blending)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: match key.state.front {
                    FrontFace::Ccw => wgpu::FrontFace::Ccw,
                    FrontFace::Cw => wgpu::FrontFace::Cw,
                },
                cull_mode: match key.state.cull {
                    CullMode::None => None,
                    CullMode::Back => Some(wgpu::Face::Back),
                },
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: key.state.depth_test,
                depth_compare: if key.state.depth_test {
                    wgpu::CompareFunction::LessEqual
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let entry = match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => {
                log::error!("pipeline {key:?} failed to link: {err}");
                None
            }
            None => {
                log::debug!("built pipeline {key:?}");
                Some(pipeline)
            }
        };
        self.pipelines.insert(key, entry);
    }
}

impl GraphicsBackend for WgpuBackend {
    fn create_buffer(&mut self, kind: BufferKind) -> BufferHandle {
        let handle = BufferHandle(self.next_id());
        self.buffers.insert(handle, GpuBuffer { kind, buffer: None });
        handle
    }

    fn upload_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        let Some(entry) = self.buffers.get_mut(&buffer) else {
            return;
        };
        if data.is_empty() {
            entry.buffer = None;
            return;
        }

        // write_buffer 要求长度为 4 的倍数
        let mut padded = data.to_vec();
        padded.resize(data.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);

        let fits = entry
            .buffer
            .as_ref()
            .is_some_and(|b| b.size() >= padded.len() as u64);
        if fits {
            if let Some(existing) = &entry.buffer {
                self.queue.write_buffer(existing, 0, &padded);
            }
            return;
        }

        let usage = match entry.kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };
        entry.buffer = Some(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("geometry_buffer"),
            contents: &padded,
            usage: usage | wgpu::BufferUsages::COPY_DST,
        }));
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if let Some(GpuBuffer { buffer: Some(b), .. }) = self.buffers.remove(&buffer) {
            b.destroy();
        }
    }

    fn create_program(&mut self, signature: ProgramSignature, source: &str) -> Result<ProgramHandle, RenderError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("basic_shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::Shader(format!("{signature:?}: {err}")));
        }

        let handle = ProgramHandle(self.next_id());
        self.programs.insert(handle, module);
        Ok(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
    }

    fn upload_texture(
        &mut self,
        existing: Option<TextureHandle>,
        image: &RgbaImage,
        sampler: SamplerDesc,
    ) -> Result<TextureHandle, RenderError> {
        let max = self.device.limits().max_texture_dimension_2d;
        let largest = image.width().max(image.height());
        if largest > max {
            return Err(RenderError::ImageTooBig { width: largest, max });
        }

        let texture = create_texture(&self.device, &self.queue, &self.map_layout, image, sampler);
        let handle = match existing {
            Some(h) => h,
            None => TextureHandle(self.next_id()),
        };
        if let Some(old) = self.textures.insert(handle, texture) {
            old.texture.destroy();
        }
        Ok(handle)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if let Some(t) = self.textures.remove(&texture) {
            t.texture.destroy();
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.clear = Some(color);
    }

    fn set_cull_mode(&mut self, cull: CullMode) {
        self.state.cull = cull;
    }

    fn set_front_face(&mut self, front: FrontFace) {
        self.state.front = front;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
    }

    fn set_blending(&mut self, blending: Blending) {
        self.state.blending = blending;
    }

    fn draw(&mut self, call: &DrawCall) {
        self.draws.push((*call, self.state));
    }
}

fn blend_state(blending: Blending) -> wgpu::BlendState {
    use wgpu::BlendFactor as F;

    let component = |src_factor, dst_factor| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    match blending {
        Blending::Normal => wgpu::BlendState {
            color: component(F::SrcAlpha, F::OneMinusSrcAlpha),
            alpha: component(F::One, F::OneMinusSrcAlpha),
        },
        Blending::Additive => wgpu::BlendState {
            color: component(F::SrcAlpha, F::One),
            alpha: component(F::SrcAlpha, F::One),
        },
        Blending::Subtractive => wgpu::BlendState {
            color: component(F::Zero, F::OneMinusSrc),
            alpha: component(F::Zero, F::OneMinusSrc),
        },
        Blending::Multiply => wgpu::BlendState {
            color: component(F::Zero, F::Src),
            alpha: component(F::Zero, F::Src),
        },
        Blending::AdditiveAlpha => wgpu::BlendState {
            color: component(F::SrcAlpha, F::One),
            alpha: component(F::Zero, F::One),
        },
    }
}

fn address_mode(wrap: Wrapping) -> wgpu::AddressMode {
    match wrap {
        Wrapping::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        Wrapping::Repeat => wgpu::AddressMode::Repeat,
        Wrapping::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

fn default_sampler() -> SamplerDesc {
    SamplerDesc {
        wrap_s: Wrapping::ClampToEdge,
        wrap_t: Wrapping::ClampToEdge,
        mag_filter: Filter::Linear,
        min_filter: Filter::Linear,
    }
}

fn create_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    image: &RgbaImage,
    sampler: SamplerDesc,
) -> GpuTexture {
    let (width, height) = image.dimensions();
    let texture_size = wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        size: texture_size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        label: Some("map_texture"),
        view_formats: &[],
    });

    if width > 0 && height > 0 {
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            texture_size,
        );
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: address_mode(sampler.wrap_s),
        address_mode_v: address_mode(sampler.wrap_t),
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter_mode(sampler.mag_filter),
        min_filter: filter_mode(sampler.min_filter),
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
        label: Some("map_bind_group"),
    });

    GpuTexture { texture, bind_group }
}

fn create_uniforms(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    size: u64,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("object_uniforms"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: NonZeroU64::new(OBJECT_UNIFORM_SIZE),
            }),
        }],
        label: Some("object_bind_group"),
    });
    (buffer, bind_group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_blending_keeps_destination_alpha_separate() {
        let b = blend_state(Blending::Normal);
        assert_eq!(b.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(b.alpha.src_factor, wgpu::BlendFactor::One);
        assert_eq!(b.alpha.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn blend_table() {
        assert_eq!(blend_state(Blending::Additive).color.dst_factor, wgpu::BlendFactor::One);
        assert_eq!(blend_state(Blending::Subtractive).color.dst_factor, wgpu::BlendFactor::OneMinusSrc);
        assert_eq!(blend_state(Blending::Multiply).color.dst_factor, wgpu::BlendFactor::Src);
        assert_eq!(blend_state(Blending::AdditiveAlpha).alpha.src_factor, wgpu::BlendFactor::Zero);
    }

    #[test]
    fn uniform_block_matches_shader_layout() {
        // projection + model_view + color + mat3x3 (three vec4 columns)
        assert_eq!(OBJECT_UNIFORM_SIZE, 64 + 64 + 16 + 48);
    }

    #[test]
    fn sampler_mapping() {
        assert_eq!(address_mode(Wrapping::Repeat), wgpu::AddressMode::Repeat);
        assert_eq!(address_mode(Wrapping::MirroredRepeat), wgpu::AddressMode::MirrorRepeat);
        assert_eq!(filter_mode(Filter::Nearest), wgpu::FilterMode::Nearest);
    }
}
