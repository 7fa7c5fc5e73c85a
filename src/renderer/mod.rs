//! Rendering: the scene-graph renderer over a [`GraphicsBackend`], its
//! `wgpu` implementation, and the ray-cast panorama renderers.

pub mod backend;
pub mod context;
pub mod panorama;
pub mod scene_renderer;
pub mod software;
pub mod wgpu_backend;

pub use backend::GraphicsBackend;
pub use context::GpuContext;
pub use panorama::{PanoramaImage, PanoramaRenderer};
pub use scene_renderer::{BufferState, GeometryBuffer, RenderStats, SceneRenderer, MAX_GROUP_VERTICES};
pub use software::SoftwareRenderer;
pub use wgpu_backend::WgpuBackend;
