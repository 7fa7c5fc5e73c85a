//! Panorama rendering core.
//!
//! A small retained-mode scene graph ([`scene`], [`geometry`], [`material`])
//! drawn by [`renderer::SceneRenderer`] over a pluggable
//! [`renderer::GraphicsBackend`], plus fullscreen ray-cast renderers for
//! equirectangular and cube-map panoramas. View state, configuration and
//! device orientation live alongside; the desktop viewer in `main.rs` wires
//! them to a window.

pub mod config;
pub mod error;
pub mod geometry;
pub mod i18n;
pub mod material;
pub mod math;
pub mod orientation;
pub mod panorama;
pub mod projection;
pub mod renderer;
pub mod scene;

pub use error::{ConfigError, MathError, RenderError, SceneError, UserFacing};
