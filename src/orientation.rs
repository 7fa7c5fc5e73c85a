// orientation.rs: device orientation -> view yaw / pitch
//
// Library API for hosts that have an orientation sensor. The desktop viewer
// has no such source and never feeds a tracker; callers poll
// `OrientationTracker::check` and copy `yaw()`/`pitch()` into `ViewState`.

use std::f64::consts::PI;
use std::time::Duration;

/// How often [`OrientationTracker::check`] is expected to be polled.
pub const CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// Polls after which orientation is declared unavailable.
pub const MAX_CHECKS: u32 = 10;

/// One orientation reading, angles in degrees (ZXY Tait-Bryan as reported by
/// the sensor). Missing angles count as zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceOrientation {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    /// Whether the reading is in the earth frame.
    pub absolute: bool,
}

impl DeviceOrientation {
    fn radians(&self) -> (f64, f64, f64) {
        (
            self.beta.unwrap_or(0.0).to_radians(),
            self.gamma.unwrap_or(0.0).to_radians(),
            self.alpha.unwrap_or(0.0).to_radians(),
        )
    }

    /// Compass heading in degrees, `[-180, 180)`; 180 is north.
    pub fn yaw(&self) -> f64 {
        let (x, y, z) = self.radians();
        let (sx, cx) = x.sin_cos();
        let (sy, cy) = y.sin_cos();
        let (sz, cz) = z.sin_cos();

        let vx = -cz * sy - sz * sx * cy;
        let vy = -sz * sy + cz * sx * cy;

        let heading = vx.atan2(vy).rem_euclid(2.0 * PI) - PI;
        heading.to_degrees()
    }

    /// Degrees, `[-90, 90]`; 90 is the bottom, -90 the top.
    pub fn pitch(&self) -> f64 {
        let (x, y, _) = self.radians();
        (-x.cos() * y.cos()).asin().to_degrees()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Pending,
    Available,
    Unavailable,
}

/// Keeps the latest reading and decides once whether orientation control
/// can be offered.
#[derive(Debug, Clone)]
pub struct OrientationTracker {
    latest: Option<DeviceOrientation>,
    checks: u32,
    state: Availability,
}

impl Default for OrientationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OrientationTracker {
    pub fn new() -> Self {
        Self {
            latest: None,
            checks: 0,
            state: Availability::Pending,
        }
    }

    pub fn update(&mut self, reading: DeviceOrientation) {
        self.latest = Some(reading);
    }

    pub fn latest(&self) -> Option<&DeviceOrientation> {
        self.latest.as_ref()
    }

    pub fn availability(&self) -> Availability {
        self.state
    }

    /// One availability poll. The answer is final once it leaves `Pending`.
    pub fn check(&mut self) -> Availability {
        if self.state != Availability::Pending {
            return self.state;
        }
        match self.latest {
            Some(DeviceOrientation {
                alpha: Some(_),
                absolute: true,
                ..
            }) => {
                log::info!("device orientation available");
                self.state = Availability::Available;
            }
            _ => {
                self.checks += 1;
                if self.checks >= MAX_CHECKS {
                    log::info!("device orientation unavailable after {MAX_CHECKS} checks");
                    self.state = Availability::Unavailable;
                }
            }
        }
        self.state
    }

    /// `(yaw, pitch)` in degrees once orientation is available.
    pub fn view(&self) -> Option<(f64, f64)> {
        match (self.state, self.latest) {
            (Availability::Available, Some(r)) => Some((r.yaw(), r.pitch())),
            _ => None,
        }
    }
}
