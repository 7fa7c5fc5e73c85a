use image::{Rgba, RgbaImage};
use panorama_renderer::panorama::ViewState;
use panorama_renderer::renderer::{PanoramaImage, SoftwareRenderer};
use std::f64::consts::PI;
use std::sync::Arc;

/// 2:1 image whose red channel encodes the column and green the row.
fn gradient() -> Arc<RgbaImage> {
    Arc::new(RgbaImage::from_fn(64, 32, |x, y| {
        Rgba([(x * 4) as u8, (y * 8) as u8, 128, 255])
    }))
}

fn viewer(img: &Arc<RgbaImage>) -> SoftwareRenderer {
    let mut r = SoftwareRenderer::new(33, 33);
    r.set_background([1.0, 1.0, 1.0, 1.0]);
    r.init(PanoramaImage::Equirectangular(img.clone()), 2.0 * PI, PI, 0.0)
        .unwrap();
    r
}

#[test]
fn equirect_center_and_opposite_column() {
    let src = gradient();
    let mut r = viewer(&src);

    let frame = r.render(0.0, 0.0, 100f64.to_radians());
    assert!(frame.pixels().any(|p| *p != Rgba([255, 255, 255, 255])), "blank frame");
    assert_eq!(frame.get_pixel(16, 16), src.get_pixel(32, 16));

    let frame = r.render(0.0, PI, 100f64.to_radians());
    let center = *frame.get_pixel(16, 16);
    // The seam: either edge column of the source.
    assert!(
        center == *src.get_pixel(0, 16) || center == *src.get_pixel(63, 16),
        "{center:?}"
    );
}

#[test]
fn quarter_turn_lands_three_quarters_across() {
    let src = gradient();
    let mut r = viewer(&src);
    let frame = r.render(0.0, PI / 2.0, 60f64.to_radians());
    assert_eq!(frame.get_pixel(16, 16), src.get_pixel(48, 16));
}

#[test]
fn looking_up_samples_upper_rows() {
    let src = gradient();
    let mut r = viewer(&src);
    let frame = r.render(60f64.to_radians(), 0.0, 60f64.to_radians());
    let center = frame.get_pixel(16, 16);
    // 60° up sits two thirds of the way from the horizon to the top row.
    assert!(center[1] < src.get_pixel(32, 16)[1]);
    assert_eq!(center[0], src.get_pixel(32, 16)[0]);
}

#[test]
fn partial_panorama_shows_background_outside() {
    let src = gradient();
    let mut r = SoftwareRenderer::new(33, 33);
    r.set_background([0.0, 0.0, 0.0, 1.0]);
    // 90° tall strip centred on the horizon.
    r.init(PanoramaImage::Equirectangular(src), 2.0 * PI, PI / 2.0, 0.0)
        .unwrap();
    let frame = r.render(80f64.to_radians(), 0.0, 30f64.to_radians());
    assert_eq!(*frame.get_pixel(16, 16), Rgba([0, 0, 0, 255]));
}

#[test]
fn drag_then_render_follows_view_state() {
    let src = gradient();
    let mut r = viewer(&src);
    let mut view = ViewState::new(
        0.0,
        0.0,
        100.0,
        panorama_renderer::panorama::ViewBounds {
            min_yaw: -180.0,
            max_yaw: 180.0,
            min_pitch: -90.0,
            max_pitch: 90.0,
            min_hfov: 50.0,
            max_hfov: 120.0,
        },
    );
    // 900 px to the left is +90° of yaw.
    view.begin_drag(1000.0, 0.0);
    view.drag_to(100.0, 0.0);
    view.end_drag();
    assert!((view.yaw - 90.0).abs() < 1e-9);

    let (pitch, yaw, hfov) = view.radians();
    let frame = r.render(pitch, yaw, hfov);
    assert_eq!(frame.get_pixel(16, 16), src.get_pixel(48, 16));
}
