// panorama.rs: 全景渲染器 (Ray Casting / Fullscreen Triangle)
//
// One fullscreen triangle per frame; the fragment shader turns every pixel
// into a view ray and samples the equirectangular image or the cube map.

use crate::error::RenderError;
use crate::projection::{CubeFace, ImageType, PanoramaUniforms};
use image::RgbaImage;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Decoded source image(s).
#[derive(Debug, Clone)]
pub enum PanoramaImage {
    Equirectangular(Arc<RgbaImage>),
    /// Faces in the order +z, +x, -z, -x, +y, -y.
    CubeMap([Arc<RgbaImage>; 6]),
}

impl PanoramaImage {
    pub fn image_type(&self) -> ImageType {
        match self {
            PanoramaImage::Equirectangular(_) => ImageType::Equirectangular,
            PanoramaImage::CubeMap(_) => ImageType::CubeMap,
        }
    }

    /// Checks the image against the device's texture size limit.
    pub fn validate(&self, max: u32) -> Result<(), RenderError> {
        match self {
            PanoramaImage::Equirectangular(img) => {
                let largest = img.width().max(img.height());
                if largest > max {
                    return Err(RenderError::ImageTooBig { width: largest, max });
                }
                Ok(())
            }
            PanoramaImage::CubeMap(faces) => {
                let size = faces[0].width();
                if size == 0 || faces.iter().any(|f| f.width() != size || f.height() != size) {
                    return Err(RenderError::CubeFaceMismatch);
                }
                if size > max {
                    return Err(RenderError::CubeFaceTooBig { size, max });
                }
                Ok(())
            }
        }
    }
}

struct Bound {
    image_type: ImageType,
    pipeline: Option<wgpu::RenderPipeline>,
    bind_group: wgpu::BindGroup,
    // 保持纹理存活
    _texture: wgpu::Texture,
}

pub struct PanoramaRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
    uniforms: PanoramaUniforms,
    uniform_buffer: wgpu::Buffer,
    extents: (f64, f64, f64),
    bound: Option<Bound>,
}

impl PanoramaRenderer {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, format: wgpu::TextureFormat) -> Self {
        let uniforms = PanoramaUniforms::new(2.0 * std::f64::consts::PI, std::f64::consts::PI, 0.0, 1.0);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Panorama Uniforms"),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Self {
            device,
            queue,
            format,
            uniforms,
            uniform_buffer,
            extents: (2.0 * std::f64::consts::PI, std::f64::consts::PI, 0.0),
            bound: None,
        }
    }

    /// Uploads `image` and builds the matching pipeline. `haov`, `vaov` and
    /// `voffset` are in radians.
    pub fn init(&mut self, image: &PanoramaImage, haov: f64, vaov: f64, voffset: f64) -> Result<(), RenderError> {
        image.validate(self.device.limits().max_texture_dimension_2d)?;

        let aspect = self.uniforms.aspect_ratio as f64;
        let background = self.uniforms.background;
        self.uniforms = PanoramaUniforms::new(haov, vaov, voffset, aspect);
        self.uniforms.background = background;
        self.extents = (haov, vaov, voffset);

        let image_type = image.image_type();
        let texture = match image {
            PanoramaImage::Equirectangular(img) => self.upload_equirect(img),
            PanoramaImage::CubeMap(faces) => self.upload_cube(faces),
        };
        let layout = self.bind_group_layout(image_type);
        let bind_group = self.bind_group(&layout, &texture, image_type);
        let pipeline = self.pipeline(&layout, image_type);

        log::info!(
            "panorama ready: {:?} {}x{}",
            image_type,
            texture.width(),
            texture.height()
        );
        self.bound = Some(Bound {
            image_type,
            pipeline,
            bind_group,
            _texture: texture,
        });
        Ok(())
    }

    /// Replaces the image, keeping the current extents.
    pub fn set_image(&mut self, image: &PanoramaImage) -> Result<(), RenderError> {
        let (haov, vaov, voffset) = self.extents;
        self.init(image, haov, vaov, voffset)
    }

    pub fn set_canvas(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.uniforms.aspect_ratio = width as f32 / height as f32;
        }
    }

    pub fn set_background(&mut self, rgba: [f32; 4]) {
        self.uniforms.background = rgba;
    }

    pub fn image_type(&self) -> Option<ImageType> {
        self.bound.as_ref().map(|b| b.image_type)
    }

    pub fn uniforms(&self) -> &PanoramaUniforms {
        &self.uniforms
    }

    /// Per-frame view, radians.
    pub fn render(&mut self, pitch: f64, yaw: f64, hfov: f64) {
        self.uniforms.set_view(pitch, yaw, hfov);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[self.uniforms]));
    }

    /// Clears `view` to the background colour and draws the panorama if a
    /// working pipeline exists.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let [r, g, b, a] = self.uniforms.background;
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Panorama Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: a as f64,
                    }),
                    store: true,
                },
            })],
            depth_stencil_attachment: None,
        });

        if let Some(Bound {
            pipeline: Some(pipeline),
            bind_group,
            ..
        }) = &self.bound
        {
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
    }

    fn upload_equirect(&self, img: &RgbaImage) -> wgpu::Texture {
        let (width, height) = img.dimensions();
        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            label: Some("panorama_texture"),
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            img,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            texture_size,
        );
        texture
    }

    fn upload_cube(&self, faces: &[Arc<RgbaImage>; 6]) -> wgpu::Texture {
        let size = faces[0].width();
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            label: Some("panorama_cube_texture"),
            view_formats: &[],
        });

        for (layer, face) in CubeFace::LAYER_ORDER.iter().enumerate() {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                &faces[face.source_index()],
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * size),
                    rows_per_image: Some(size),
                },
                wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 1,
                },
            );
        }
        texture
    }

    fn bind_group_layout(&self, image_type: ImageType) -> wgpu::BindGroupLayout {
        let view_dimension = match image_type {
            ImageType::Equirectangular => wgpu::TextureViewDimension::D2,
            ImageType::CubeMap => wgpu::TextureViewDimension::Cube,
        };
        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("panorama_bind_group_layout"),
        })
    }

    fn bind_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        texture: &wgpu::Texture,
        image_type: ImageType,
    ) -> wgpu::BindGroup {
        let (dimension, address_mode_u) = match image_type {
            // 全景图水平循环
            ImageType::Equirectangular => (wgpu::TextureViewDimension::D2, wgpu::AddressMode::Repeat),
            ImageType::CubeMap => (wgpu::TextureViewDimension::Cube, wgpu::AddressMode::ClampToEdge),
        };
        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(dimension),
            ..Default::default()
        });
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
            label: Some("panorama_bind_group"),
        })
    }

    /// `None` when the shader or pipeline fails validation; frames then
    /// show only the background.
    fn pipeline(&self, layout: &wgpu::BindGroupLayout, image_type: ImageType) -> Option<wgpu::RenderPipeline> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = match image_type {
            ImageType::Equirectangular => self
                .device
                .create_shader_module(wgpu::include_wgsl!("../shaders/panorama_equirect.wgsl")),
            ImageType::CubeMap => self
                .device
                .create_shader_module(wgpu::include_wgsl!("../shaders/panorama_cube.wgsl")),
        };
        let render_pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Panorama Pipeline Layout"),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });
        let render_pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Panorama Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[], // 无顶点缓冲，Shader 自生成
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => {
                log::error!("panorama pipeline ({image_type:?}) failed: {err}");
                None
            }
            None => Some(render_pipeline),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(size: u32) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::new(size, size))
    }

    #[test]
    fn equirect_width_limit() {
        let img = PanoramaImage::Equirectangular(Arc::new(RgbaImage::new(4096, 2048)));
        assert!(img.validate(4096).is_ok());
        assert!(matches!(
            img.validate(2048),
            Err(RenderError::ImageTooBig { width: 4096, max: 2048 })
        ));
    }

    #[test]
    fn cube_faces_must_match() {
        let ok = PanoramaImage::CubeMap([face(8), face(8), face(8), face(8), face(8), face(8)]);
        assert!(ok.validate(8).is_ok());
        assert!(matches!(
            ok.validate(4),
            Err(RenderError::CubeFaceTooBig { size: 8, max: 4 })
        ));

        let odd = PanoramaImage::CubeMap([face(8), face(8), face(4), face(8), face(8), face(8)]);
        assert!(matches!(odd.validate(1024), Err(RenderError::CubeFaceMismatch)));

        let mut faces = [face(8), face(8), face(8), face(8), face(8), face(8)];
        faces[5] = Arc::new(RgbaImage::new(8, 4));
        assert!(matches!(
            PanoramaImage::CubeMap(faces).validate(1024),
            Err(RenderError::CubeFaceMismatch)
        ));
    }
}
