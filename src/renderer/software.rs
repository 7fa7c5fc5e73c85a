//! CPU ray-cast renderer.
//!
//! Produces the same picture as [`PanoramaRenderer`](super::PanoramaRenderer)
//! using the reference functions in [`crate::projection`], with
//! nearest-neighbour sampling. Used for headless snapshots and tests.

use super::panorama::PanoramaImage;
use crate::error::RenderError;
use crate::projection::{cube_face_coord, cube_view_vector, equirect_tex_coord, PanoramaUniforms};
use image::{Rgba, RgbaImage};
use std::f64::consts::PI;

pub struct SoftwareRenderer {
    image: Option<PanoramaImage>,
    uniforms: PanoramaUniforms,
    extents: (f64, f64, f64),
    width: u32,
    height: u32,
    max_texture_size: u32,
}

impl SoftwareRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        let mut uniforms = PanoramaUniforms::new(2.0 * PI, PI, 0.0, 1.0);
        uniforms.aspect_ratio = width as f32 / height.max(1) as f32;
        Self {
            image: None,
            uniforms,
            extents: (2.0 * PI, PI, 0.0),
            width,
            height,
            max_texture_size: u32::MAX,
        }
    }

    /// Emulates a device texture limit.
    pub fn with_max_texture_size(mut self, max: u32) -> Self {
        self.max_texture_size = max;
        self
    }

    /// Extents in radians.
    pub fn init(&mut self, image: PanoramaImage, haov: f64, vaov: f64, voffset: f64) -> Result<(), RenderError> {
        image.validate(self.max_texture_size)?;
        let background = self.uniforms.background;
        self.uniforms = PanoramaUniforms::new(haov, vaov, voffset, self.uniforms.aspect_ratio as f64);
        self.uniforms.background = background;
        self.extents = (haov, vaov, voffset);
        self.image = Some(image);
        Ok(())
    }

    pub fn set_image(&mut self, image: PanoramaImage) -> Result<(), RenderError> {
        let (haov, vaov, voffset) = self.extents;
        self.init(image, haov, vaov, voffset)
    }

    pub fn set_canvas(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
            self.uniforms.aspect_ratio = width as f32 / height as f32;
        }
    }

    pub fn set_background(&mut self, rgba: [f32; 4]) {
        self.uniforms.background = rgba;
    }

    /// Renders one frame; angles in radians.
    pub fn render(&mut self, pitch: f64, yaw: f64, hfov: f64) -> RgbaImage {
        self.uniforms.set_view(pitch, yaw, hfov);
        let (w, h) = (self.width, self.height);
        RgbaImage::from_fn(w, h, |px, py| {
            let x = 2.0 * (px as f64 + 0.5) / w as f64 - 1.0;
            let y = 1.0 - 2.0 * (py as f64 + 0.5) / h as f64;
            self.shade(x, y)
        })
    }

    fn background(&self) -> Rgba<u8> {
        Rgba(self.uniforms.background.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
    }

    fn shade(&self, x: f64, y: f64) -> Rgba<u8> {
        match &self.image {
            None => self.background(),
            Some(PanoramaImage::Equirectangular(img)) => match equirect_tex_coord(&self.uniforms, x, y) {
                Some((s, t)) => sample(img, s, t),
                None => self.background(),
            },
            Some(PanoramaImage::CubeMap(faces)) => {
                let (face, s, t) = cube_face_coord(cube_view_vector(&self.uniforms, x, y));
                sample(&faces[face.source_index()], s, t)
            }
        }
    }
}

fn sample(img: &RgbaImage, s: f64, t: f64) -> Rgba<u8> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Rgba([0, 0, 0, 255]);
    }
    let x = ((s * w as f64).floor() as i64).clamp(0, w as i64 - 1) as u32;
    let y = ((t * h as f64).floor() as i64).clamp(0, h as i64 - 1) as u32;
    *img.get_pixel(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn solid(size: u32, c: [u8; 4]) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_pixel(size, size, Rgba(c)))
    }

    #[test]
    fn no_image_renders_background() {
        let mut r = SoftwareRenderer::new(4, 4);
        r.set_background([1.0, 0.0, 0.0, 1.0]);
        let out = r.render(0.0, 0.0, 1.5);
        assert!(out.pixels().all(|p| *p == Rgba([255, 0, 0, 255])));
    }

    #[test]
    fn cube_front_face_fills_narrow_view() {
        let colors = [
            [255, 0, 0, 255],
            [0, 255, 0, 255],
            [0, 0, 255, 255],
            [255, 255, 0, 255],
            [0, 255, 255, 255],
            [255, 0, 255, 255],
        ];
        let faces = colors.map(|c| solid(8, c));
        let mut r = SoftwareRenderer::new(9, 9);
        r.init(PanoramaImage::CubeMap(faces), 2.0 * PI, PI, 0.0).unwrap();

        // +z
        let out = r.render(0.0, 0.0, 60f64.to_radians());
        assert!(out.pixels().all(|p| p.0 == colors[0]));
        // +x
        let out = r.render(0.0, PI / 2.0, 60f64.to_radians());
        assert_eq!(out.get_pixel(4, 4).0, colors[1]);
        // +y
        let out = r.render(1.5, 0.0, 60f64.to_radians());
        assert_eq!(out.get_pixel(4, 4).0, colors[4]);
    }

    #[test]
    fn rejects_oversized_image() {
        let mut r = SoftwareRenderer::new(4, 4).with_max_texture_size(16);
        let img = PanoramaImage::Equirectangular(Arc::new(RgbaImage::new(32, 16)));
        assert!(matches!(
            r.init(img, 2.0 * PI, PI, 0.0),
            Err(RenderError::ImageTooBig { width: 32, max: 16 })
        ));
    }

    #[test]
    fn set_canvas_changes_output_size() {
        let mut r = SoftwareRenderer::new(4, 4);
        r.set_canvas(6, 3);
        let out = r.render(0.0, 0.0, 1.0);
        assert_eq!(out.dimensions(), (6, 3));
        r.set_canvas(0, 3);
        assert_eq!(r.render(0.0, 0.0, 1.0).dimensions(), (6, 3));
    }
}
