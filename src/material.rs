//! Surface description for meshes: colour, texture map and fixed-function
//! state (blending, depth test).

use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0 };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// `0xRRGGBB`
    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }

    pub fn to_hex(self) -> u32 {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        (c(self.r) << 16) | (c(self.g) << 8) | c(self.b)
    }

    pub fn with_alpha(self, a: f32) -> [f32; 4] {
        [self.r, self.g, self.b, a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Blending {
    #[default]
    Normal,
    Additive,
    Subtractive,
    Multiply,
    AdditiveAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Wrapping {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

/// An image bound to a material.
///
/// Replacing the image bumps `version`; the renderer re-uploads whenever the
/// version differs from the one it last sent to the GPU.
#[derive(Debug, Clone)]
pub struct Texture {
    id: TextureId,
    image: Arc<RgbaImage>,
    version: u64,
    pub wrap_s: Wrapping,
    pub wrap_t: Wrapping,
    pub mag_filter: Filter,
    pub min_filter: Filter,
}

impl Texture {
    pub fn new(image: Arc<RgbaImage>) -> Self {
        Self {
            id: TextureId(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed)),
            image,
            version: 1,
            wrap_s: Wrapping::ClampToEdge,
            wrap_t: Wrapping::ClampToEdge,
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn image(&self) -> &Arc<RgbaImage> {
        &self.image
    }

    pub fn set_image(&mut self, image: Arc<RgbaImage>) {
        self.image = image;
        self.needs_update();
    }

    pub fn needs_update(&mut self) {
        self.version += 1;
    }
}

/// Unlit material: `color`, optionally modulated by `map`.
#[derive(Debug, Clone)]
pub struct MeshBasicMaterial {
    pub color: Color,
    pub map: Option<Texture>,
    pub opacity: f32,
    pub transparent: bool,
    pub blending: Blending,
    pub depth_test: bool,
}

impl Default for MeshBasicMaterial {
    fn default() -> Self {
        Self {
            color: Color::from_hex(0xffffff),
            map: None,
            opacity: 1.0,
            transparent: false,
            blending: Blending::Normal,
            depth_test: true,
        }
    }
}

impl MeshBasicMaterial {
    pub fn with_map(map: Texture) -> Self {
        Self {
            map: Some(map),
            ..Default::default()
        }
    }

    /// Fully transparent materials are never drawn.
    pub fn is_visible(&self) -> bool {
        self.opacity != 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let c = Color::from_hex(0x3366cc);
        assert!((c.g - 0.4).abs() < 1e-6);
        assert_eq!(c.to_hex(), 0x3366cc);
    }

    #[test]
    fn texture_version_tracks_updates() {
        let mut t = Texture::new(Arc::new(RgbaImage::new(2, 1)));
        let id = t.id();
        assert_eq!(t.version(), 1);
        t.set_image(Arc::new(RgbaImage::new(4, 2)));
        assert_eq!(t.version(), 2);
        assert_eq!(t.id(), id);
        assert_eq!(t.image().width(), 4);
    }

    #[test]
    fn basic_material_defaults() {
        let m = MeshBasicMaterial::default();
        assert_eq!(m.color, Color::WHITE);
        assert!(m.depth_test && !m.transparent && m.is_visible());
        assert_eq!(m.blending, Blending::Normal);
    }
}
