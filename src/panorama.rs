// panorama.rs: view state, input mapping and redraw scheduling

use crate::config::SceneConfig;
use crate::math::Vector3;
use std::time::{Duration, Instant};

/// Degrees of view rotation per pixel of pointer travel.
pub const DRAG_SCALE: f64 = 0.1;
/// Degrees of hfov per unit of wheel delta (120 units per notch).
pub const WHEEL_SCALE: f64 = 0.05;
/// Keyboard zoom step in degrees.
pub const KEY_ZOOM_STEP: f64 = 5.0;
/// How long the viewer keeps redrawing after start-up.
pub const LOADING_TIMEOUT: Duration = Duration::from_millis(500);

/// Radius of the textured sphere in the scene-graph path.
pub const SPHERE_RADIUS: f64 = 500.0;
/// Latitude limit of the scene-graph path.
pub const SPHERE_MAX_LAT: f64 = 85.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Fullscreen ray casting through the projection shaders.
    #[default]
    RayCast,
    /// Textured inverted sphere drawn by the scene-graph renderer.
    Sphere,
}

/// Limits in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBounds {
    pub min_yaw: f64,
    pub max_yaw: f64,
    pub min_pitch: f64,
    pub max_pitch: f64,
    pub min_hfov: f64,
    pub max_hfov: f64,
}

impl ViewBounds {
    pub const SPHERE: ViewBounds = ViewBounds {
        min_yaw: -180.0,
        max_yaw: 180.0,
        min_pitch: -SPHERE_MAX_LAT,
        max_pitch: SPHERE_MAX_LAT,
        min_hfov: 35.0,
        max_hfov: 105.0,
    };

    pub fn from_scene(scene: &SceneConfig) -> Self {
        Self {
            min_yaw: scene.min_yaw,
            max_yaw: scene.max_yaw,
            min_pitch: scene.min_pitch,
            max_pitch: scene.max_pitch,
            min_hfov: scene.min_hfov,
            max_hfov: scene.max_hfov,
        }
    }

    /// Whether yaw wraps around instead of stopping at the bounds.
    pub fn wraps_yaw(&self) -> bool {
        self.max_yaw - self.min_yaw >= 360.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragAnchor {
    x: f64,
    y: f64,
    yaw: f64,
    pitch: f64,
}

/// Where the camera looks, in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub yaw: f64,
    pub pitch: f64,
    pub hfov: f64,
    bounds: ViewBounds,
    initial: (f64, f64, f64),
    drag: Option<DragAnchor>,
}

impl ViewState {
    pub fn new(yaw: f64, pitch: f64, hfov: f64, bounds: ViewBounds) -> Self {
        let mut view = Self {
            yaw,
            pitch,
            hfov,
            bounds,
            initial: (yaw, pitch, hfov),
            drag: None,
        };
        view.constrain();
        view.initial = (view.yaw, view.pitch, view.hfov);
        view
    }

    pub fn for_scene(scene: &SceneConfig) -> Self {
        Self::new(scene.yaw, scene.pitch, scene.hfov, ViewBounds::from_scene(scene))
    }

    /// Starting view of the sphere path.
    pub fn sphere() -> Self {
        Self::new(0.0, 0.0, 70.0, ViewBounds::SPHERE)
    }

    pub fn bounds(&self) -> &ViewBounds {
        &self.bounds
    }

    pub fn reset(&mut self) {
        (self.yaw, self.pitch, self.hfov) = self.initial;
        self.drag = None;
    }

    pub fn set_view(&mut self, yaw: f64, pitch: f64, hfov: f64) {
        self.yaw = yaw;
        self.pitch = pitch;
        self.hfov = hfov;
        self.constrain();
    }

    fn constrain(&mut self) {
        let b = &self.bounds;
        if b.wraps_yaw() {
            self.yaw = (self.yaw + 180.0).rem_euclid(360.0) - 180.0;
        } else {
            self.yaw = self.yaw.clamp(b.min_yaw, b.max_yaw);
        }
        self.pitch = self.pitch.clamp(b.min_pitch, b.max_pitch);
        self.hfov = self.hfov.clamp(b.min_hfov, b.max_hfov);
    }

    pub fn begin_drag(&mut self, x: f64, y: f64) {
        self.drag = Some(DragAnchor {
            x,
            y,
            yaw: self.yaw,
            pitch: self.pitch,
        });
    }

    /// Pointer moved to `(x, y)`; returns whether the view changed.
    pub fn drag_to(&mut self, x: f64, y: f64) -> bool {
        let Some(anchor) = self.drag else {
            return false;
        };
        let before = (self.yaw, self.pitch);
        self.yaw = (anchor.x - x) * DRAG_SCALE + anchor.yaw;
        self.pitch = (y - anchor.y) * DRAG_SCALE + anchor.pitch;
        self.constrain();
        before != (self.yaw, self.pitch)
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Positive deltas zoom in.
    pub fn wheel(&mut self, delta: f64) {
        self.hfov -= delta * WHEEL_SCALE;
        self.constrain();
    }

    pub fn zoom_in(&mut self) {
        self.hfov -= KEY_ZOOM_STEP;
        self.constrain();
    }

    pub fn zoom_out(&mut self) {
        self.hfov += KEY_ZOOM_STEP;
        self.constrain();
    }

    /// `(pitch, yaw, hfov)` in radians, the order the renderers take them.
    pub fn radians(&self) -> (f64, f64, f64) {
        (self.pitch.to_radians(), self.yaw.to_radians(), self.hfov.to_radians())
    }

    /// Camera target on the sphere for the current longitude / latitude.
    pub fn sphere_target(&self) -> Vector3 {
        let lat = self.pitch.clamp(-SPHERE_MAX_LAT, SPHERE_MAX_LAT);
        let phi = (90.0 - lat).to_radians();
        let theta = self.yaw.to_radians();
        Vector3::new(
            SPHERE_RADIUS * phi.sin() * theta.cos(),
            SPHERE_RADIUS * phi.cos(),
            SPHERE_RADIUS * phi.sin() * theta.sin(),
        )
    }
}

/// Image extents `(haov, vaov, v_offset)` in degrees for an equirectangular
/// image of the given size. Images wider than 2:1 sit at the bottom of the
/// sphere; narrower ones keep the full height and lose horizontal coverage.
pub fn infer_extents(width: u32, height: u32) -> (f64, f64, f64) {
    if width == 0 || height == 0 || width == 2 * height {
        return (360.0, 180.0, 0.0);
    }
    let ratio = width as f64 / height as f64;
    if ratio > 2.0 {
        let vaov = 360.0 / ratio;
        (360.0, vaov, -(180.0 - vaov) / 2.0)
    } else {
        (180.0 * ratio, 180.0, 0.0)
    }
}

/// Keeps the loop redrawing for a short while after start-up, until the
/// first frames have settled.
#[derive(Debug, Clone, Copy)]
pub struct LoadingGate {
    until: Option<Instant>,
}

impl LoadingGate {
    pub fn open(now: Instant) -> Self {
        Self {
            until: Some(now + LOADING_TIMEOUT),
        }
    }

    pub fn closed() -> Self {
        Self { until: None }
    }

    pub fn is_open(&mut self, now: Instant) -> bool {
        match self.until {
            Some(t) if now < t => true,
            Some(_) => {
                log::debug!("loading gate closed");
                self.until = None;
                false
            }
            None => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.until
    }
}

/// Decides whether the loop needs another frame.
#[derive(Debug)]
pub struct RenderScheduler {
    interacting: bool,
    requested: bool,
    gate: LoadingGate,
}

impl RenderScheduler {
    pub fn new(now: Instant) -> Self {
        Self {
            interacting: false,
            requested: true,
            gate: LoadingGate::open(now),
        }
    }

    pub fn set_interacting(&mut self, interacting: bool) {
        self.interacting = interacting;
        self.requested |= interacting;
    }

    pub fn is_interacting(&self) -> bool {
        self.interacting
    }

    /// One-off redraw (view changed, image arrived, resize).
    pub fn request(&mut self) {
        self.requested = true;
    }

    /// Whether to draw a frame now; consumes a pending request.
    pub fn poll(&mut self, now: Instant) -> bool {
        let loading = self.gate.is_open(now);
        let draw = self.requested || self.interacting || loading;
        self.requested = false;
        draw
    }

    /// When the loop should wake up on its own next.
    pub fn wake_at(&self) -> Option<Instant> {
        self.gate.deadline()
    }
}
