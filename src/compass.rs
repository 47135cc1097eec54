//! The on-screen compass pointing at the destination.

use crate::coordinate_systems::Scene;
use crate::coordinates::Coordinate;
use crate::engineering::Pose;
use std::fmt;
use uom::si::angle::radian;
use uom::si::f64::{Angle, Length};
use uom::si::length::meter;

/// Within this horizontal distance of the target the visitor has arrived.
pub const ARRIVAL_DISTANCE_M: f64 = 1.0;

/// A room counts as pointed at when it is within this angle of the camera's heading.
pub const POINTING_TOLERANCE_RAD: f64 = 0.35;

/// Where the destination is relative to the camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompassReading {
    /// Signed horizontal angle from the camera's heading to the target; positive is to the right.
    pub angle: Angle,
    /// Straight-line distance from the camera to the target.
    pub distance: Length,
    /// Distance from the camera to the target on the floor plane.
    pub horizontal_distance: Length,
}

impl CompassReading {
    /// Reads the compass for a camera at `camera` and a target at `target`.
    ///
    /// Returns `None` if the camera looks straight up or down, or if the target is straight above
    /// or below it; in either case there is no heading to compare.
    pub fn between(camera: &Pose<Scene>, target: Coordinate<Scene>) -> Option<Self> {
        let position = camera.position();
        let angle = camera
            .forward()
            .signed_horizontal_angle_to(&(target - position))?;
        Some(Self {
            angle,
            distance: position.distance_from(&target),
            horizontal_distance: position.horizontal_distance_from(&target),
        })
    }

    pub fn has_arrived(&self) -> bool {
        self.horizontal_distance.get::<meter>() < ARRIVAL_DISTANCE_M
    }
}

impl fmt::Display for CompassReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}m", self.distance.get::<meter>())
    }
}

/// Screen-space geometry of the compass overlay, in CSS pixels on an 80×80 canvas.
#[derive(Clone, Debug, PartialEq)]
pub struct CompassDial {
    pub center: (f64, f64),
    pub radius: f64,
    /// End of the arrow shaft.
    pub tip: (f64, f64),
    /// The two back corners of the arrow head; the third corner is `tip`.
    pub head: [(f64, f64); 2],
    pub label: String,
    /// Top-center of the label.
    pub label_at: (f64, f64),
}

impl CompassDial {
    pub const SIZE: f64 = 80.;
    pub const RADIUS: f64 = 30.;
    const ARROW_LENGTH: f64 = 22.;
    const HEAD_SIZE: f64 = 10.;

    pub fn new(reading: &CompassReading) -> Self {
        let (cx, cy) = (Self::SIZE / 2., Self::SIZE / 2.);
        let a = reading.angle.get::<radian>();
        let tip = (
            cx + a.sin() * Self::ARROW_LENGTH,
            cy - a.cos() * Self::ARROW_LENGTH,
        );
        let corner = |offset: f64| {
            (
                tip.0 - Self::HEAD_SIZE * (a + offset).sin(),
                tip.1 + Self::HEAD_SIZE * (a + offset).cos(),
            )
        };
        let sixth = std::f64::consts::FRAC_PI_6;
        Self {
            center: (cx, cy),
            radius: Self::RADIUS,
            tip,
            head: [corner(-sixth), corner(sixth)],
            label: reading.to_string(),
            label_at: (cx, cy + Self::RADIUS + 2.),
        }
    }
}

/// Tracks the compass target and recomputes the reading at most once per rendered frame.
#[derive(Clone, Debug, Default)]
pub struct Compass {
    target: Option<Coordinate<Scene>>,
    last_frame: Option<u64>,
    reading: Option<CompassReading>,
    arrived: bool,
    arrival_pending: bool,
}

impl Compass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self) -> Option<Coordinate<Scene>> {
        self.target
    }

    /// Points the compass at `target` and forgets any earlier arrival.
    pub fn set_target(&mut self, target: Coordinate<Scene>) {
        self.target = Some(target);
        self.last_frame = None;
        self.reading = None;
        self.arrived = false;
        self.arrival_pending = false;
    }

    /// Moves the target without forgetting an arrival.
    pub fn retarget(&mut self, target: Coordinate<Scene>) {
        self.target = Some(target);
        self.last_frame = None;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The last computed reading.
    pub fn reading(&self) -> Option<&CompassReading> {
        self.reading.as_ref()
    }

    /// Recomputes the reading for `frame`.
    ///
    /// Asking again for the same frame returns the reading already computed for it. Without a
    /// target or a camera there is nothing to read and `None` is returned.
    pub fn update(&mut self, frame: u64, camera: Option<&Pose<Scene>>) -> Option<&CompassReading> {
        if self.last_frame == Some(frame) {
            return self.reading.as_ref();
        }
        let (Some(camera), Some(target)) = (camera, self.target) else {
            return None;
        };
        self.last_frame = Some(frame);
        self.reading = CompassReading::between(camera, target);

        if let Some(reading) = &self.reading {
            if reading.has_arrived() && !self.arrived {
                log::info!(
                    "arrived within {:.2}m of the destination",
                    reading.horizontal_distance.get::<meter>()
                );
                self.arrived = true;
                self.arrival_pending = true;
            }
        }
        self.reading.as_ref()
    }

    /// Returns `true` once after the camera first comes within [`ARRIVAL_DISTANCE_M`] of the
    /// target.
    pub fn take_arrival(&mut self) -> bool {
        std::mem::take(&mut self.arrival_pending)
    }
}

/// Finds which candidate the camera is pointing at.
///
/// Candidates are compared by the unsigned horizontal angle between the camera's heading and the
/// direction to them; the closest one wins if it is within [`POINTING_TOLERANCE_RAD`]. On a tie
/// the earlier candidate wins.
pub fn pointed_at<T>(
    camera: &Pose<Scene>,
    candidates: impl IntoIterator<Item = (T, Coordinate<Scene>)>,
) -> Option<T> {
    let forward = camera.forward();
    let position = camera.position();
    let mut best: Option<(T, f64)> = None;
    for (candidate, at) in candidates {
        let Some(angle) = forward.signed_horizontal_angle_to(&(at - position)) else {
            continue;
        };
        let off = angle.get::<radian>().abs();
        if best.as_ref().map_or(true, |(_, best_off)| off < *best_off) {
            best = Some((candidate, off));
        }
    }
    best.filter(|(_, off)| *off < POINTING_TOLERANCE_RAD)
        .map(|(candidate, _)| candidate)
}
