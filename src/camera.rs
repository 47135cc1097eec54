//! Camera control outside of an immersive session.

use crate::coordinate_systems::Scene;
use crate::coordinates::Coordinate;
use crate::engineering::{Orientation, Pose};
use crate::render::RenderSurface;
use crate::util::BoundedAngle;
use crate::vectors::Vector;
use crate::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use std::time::Duration;
use uom::si::angle::radian;
use uom::si::f64::Angle;

/// Who moves the camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraControl {
    /// The host's orbit controls.
    #[default]
    Orbit,
    /// Keyboard and mouse, through [`FreeRoamCamera`].
    FreeRoam,
    /// The XR viewer pose.
    DeviceTracked,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FreeRoamConfig {
    /// Meters per second.
    #[serde(default = "default_move_speed")]
    pub move_speed: f64,
    /// Radians per pixel of pointer movement.
    #[serde(default = "default_look_speed")]
    pub look_speed: f64,
    /// Longest time step a single update integrates, in seconds.
    #[serde(default = "default_max_step")]
    pub max_step: f64,
}

fn default_move_speed() -> f64 {
    5.0
}

fn default_look_speed() -> f64 {
    0.002
}

fn default_max_step() -> f64 {
    0.1
}

impl Default for FreeRoamConfig {
    fn default() -> Self {
        Self {
            move_speed: default_move_speed(),
            look_speed: default_look_speed(),
            max_step: default_max_step(),
        }
    }
}

/// Held movement keys, each axis in `[-1, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MoveInput {
    /// Forward (`W`) minus back (`S`).
    pub forward: f64,
    /// Right (`D`) minus left (`A`).
    pub right: f64,
    /// Up (`Space`) minus down (`Shift`).
    pub up: f64,
}

const PITCH_LIMIT: f64 = FRAC_PI_2 - 0.001;

/// A first-person camera that flies over the model.
///
/// Movement is relative to the camera's heading and stays level; looking up or down does not
/// change the direction `forward` moves in.
#[derive(Clone, Copy, Debug)]
pub struct FreeRoamCamera {
    config: FreeRoamConfig,
    position: Coordinate<Scene>,
    yaw: f64,
    pitch: f64,
}

impl FreeRoamCamera {
    pub fn new(config: FreeRoamConfig) -> Self {
        Self {
            config,
            position: Coordinate::origin(),
            yaw: 0.,
            pitch: 0.,
        }
    }

    /// Picks up from wherever the camera currently is.
    pub fn take_over(&mut self, pose: &Pose<Scene>) {
        let forward = pose.forward();
        self.position = pose.position();
        self.yaw = pose.orientation().yaw().get::<radian>();
        self.pitch = forward.inner.y.clamp(-1., 1.).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Turns the camera by a pointer movement of `(dx, dy)` pixels.
    pub fn look(&mut self, dx: f64, dy: f64) {
        self.yaw = BoundedAngle::new(Angle::new::<radian>(self.yaw - dx * self.config.look_speed))
            .to_signed_range();
        self.pitch = (self.pitch - dy * self.config.look_speed).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Moves the camera for `elapsed` time with `input` held.
    pub fn update(&mut self, input: MoveInput, elapsed: Duration) -> Pose<Scene> {
        let dt = elapsed.as_secs_f64().min(self.config.max_step);
        let mut length = (input.forward.powi(2) + input.right.powi(2) + input.up.powi(2)).sqrt();
        if length == 0. {
            length = 1.;
        }
        let step = self.config.move_speed * dt / length;

        let (sin, cos) = self.yaw.sin_cos();
        let forward = Vector3::new(-sin, 0., -cos);
        let right = Vector3::new(cos, 0., -sin);
        let delta = forward * (input.forward * step)
            + right * (input.right * step)
            + Vector3::y() * (input.up * step);
        self.position += Vector::from_nalgebra_vector(delta);
        self.pose()
    }

    pub fn pose(&self) -> Pose<Scene> {
        Pose::new(
            self.position,
            Orientation::from_yaw_pitch(
                Angle::new::<radian>(self.yaw),
                Angle::new::<radian>(self.pitch),
            ),
        )
    }
}

/// The camera pose used to look at a room: 5m above and 8m behind it, facing it.
pub fn room_view(room: Coordinate<Scene>) -> Pose<Scene> {
    let eye = room + Vector::from_nalgebra_vector(Vector3::new(0., 5., 8.));
    // the eye is never straight above the room, so there is always a heading
    Pose::looking_at(eye, room).unwrap_or_else(|| Pose::new(eye, Orientation::default()))
}

/// Points the surface's camera at `room`.
pub fn move_camera_to_room(surface: &mut dyn RenderSurface, room: Coordinate<Scene>) {
    let view = room_view(room);
    log::debug!("moving camera to {}", view.position());
    surface.set_camera_pose(view);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSurface;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use uom::si::f64::Length;
    use uom::si::length::meter;

    fn m(meters: f64) -> Length {
        Length::new::<meter>(meters)
    }

    fn scene(x: f64, y: f64, z: f64) -> Coordinate<Scene> {
        Coordinate::from_cartesian(m(x), m(y), m(z))
    }

    const SECOND: Duration = Duration::from_secs(1);

    #[rstest]
    #[case(MoveInput { forward: 1., ..MoveInput::default() }, scene(0., 0., -0.5))]
    #[case(MoveInput { right: 1., ..MoveInput::default() }, scene(0.5, 0., 0.))]
    #[case(MoveInput { up: -1., ..MoveInput::default() }, scene(0., -0.5, 0.))]
    #[case(MoveInput::default(), scene(0., 0., 0.))]
    fn moves_relative_to_heading(#[case] input: MoveInput, #[case] expected: Coordinate<Scene>) {
        let mut camera = FreeRoamCamera::new(FreeRoamConfig::default());
        // a full second is capped to 0.1s at 5m/s
        let pose = camera.update(input, SECOND);
        assert_relative_eq!(pose.position(), expected, epsilon = m(1e-12));
    }

    #[test]
    fn diagonal_movement_is_normalized() {
        let mut camera = FreeRoamCamera::new(FreeRoamConfig::default());
        let input = MoveInput {
            forward: 1.,
            right: 1.,
            up: 0.,
        };
        let pose = camera.update(input, Duration::from_millis(100));
        assert_relative_eq!(
            pose.position().distance_from_origin().get::<meter>(),
            0.5,
            epsilon = 1e-12
        );
    }

    #[test]
    fn looking_turns_and_clamps() {
        let mut camera = FreeRoamCamera::new(FreeRoamConfig::default());
        // 785 px left at 0.002 rad/px is a quarter turn to the left
        camera.look(-std::f64::consts::FRAC_PI_2 / 0.002, 0.);
        let pose = camera.update(
            MoveInput {
                forward: 1.,
                ..MoveInput::default()
            },
            Duration::from_millis(100),
        );
        assert_relative_eq!(pose.position(), scene(-0.5, 0., 0.), epsilon = m(1e-9));

        camera.look(0., -1e6);
        assert!(camera.pitch <= PITCH_LIMIT);

        // spinning in place never lets the heading run away
        for _ in 0..100 {
            camera.look(-1000., 0.);
        }
        assert!(camera.yaw.abs() <= std::f64::consts::PI);
        assert!(camera.pose().forward().y().get::<meter>() > 0.99);
    }

    #[test]
    fn take_over_keeps_the_view() {
        let pose = Pose::looking_at(scene(1., 2., 3.), scene(4., 0., -1.)).expect("not vertical");
        let mut camera = FreeRoamCamera::new(FreeRoamConfig::default());
        camera.take_over(&pose);
        assert_eq!(camera.pose().position(), pose.position());
        assert_relative_eq!(camera.pose().forward(), pose.forward(), epsilon = 1e-9);
    }

    #[test]
    fn room_view_looks_down_at_the_room() {
        let mut surface = FakeSurface::ready();
        move_camera_to_room(&mut surface, scene(10., 0., -4.));
        let camera = surface.camera;
        assert_eq!(camera.position(), scene(10., 5., 4.));
        let towards = (scene(10., 0., -4.) - camera.position()).normalized().expect("distinct");
        assert_relative_eq!(camera.forward(), towards, epsilon = 1e-9);
    }
}
