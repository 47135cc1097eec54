//! This library is the navigation core of a campus wayfinding client: it keeps rooms stored in
//! building floor-plan coordinates, a loaded 3D campus model, and the physical world seen through
//! an AR device registered with one another, and drives the markers and compass that guide a
//! visitor from their current room to a destination.
//!
//! Positions are typed by the coordinate system they are expressed in. [`Coordinate`] and
//! [`Vector`] are generic over a [`CoordinateSystem`], so a room's stored
//! [`FloorPlan`](systems::FloorPlan) position cannot be handed to code expecting a
//! [`Scene`](systems::Scene) position without going through a transform first. The [`system!`]
//! macro declares further frames.
//!
//! The pipeline, leaf-first:
//!
//! - [`to_scene_position`] maps a [`Room`] onto the local frame of the model root under a
//!   [`TransformConfig`].
//! - [`ModelAligner`] fits a [similarity](math::Similarity) that lays the loaded model over the
//!   room positions.
//! - [`MarkerManager`] owns the two navigation markers and the compass, and re-projects them each
//!   frame through the current [`MarkerBinding`].
//! - [`SessionController`] runs the immersive session: viewer pose, hit-testing, anchors, and
//!   localization.
//! - [`Navigator`] is the state machine the UI talks to. It owns a [`NavContext`] holding every
//!   collaborator and is the only place user-visible errors come from.
//!
//! Rendering, model loading, the XR device, and the room directory are external collaborators
//! consumed through the traits in [`render`], [`model`], [`xr`], and [`room`].
//!
//! # Examples
//!
//! Place two rooms in the scene and ask the compass where the destination is:
//!
//! ```
//! use approx::assert_relative_eq;
//! use wayfinder::{to_scene_position, CompassReading, MarkerBinding, Room, RoomId};
//! use wayfinder::TransformConfig;
//! use wayfinder::engineering::Pose;
//! use uom::si::{angle::degree, length::meter};
//!
//! let config = TransformConfig { scale: 1., ..TransformConfig::default() };
//! let here = Room::at(RoomId(1), "101", 0., 0., 0.);
//! let there = Room::at(RoomId(2), "102", 10., 0., 0.);
//!
//! // outside of a session, with markers not bound to the model, local positions are used as-is
//! let binding = MarkerBinding::Unbound;
//! let there_in_scene = binding.to_scene(to_scene_position(&there, &config));
//! let camera = Pose::new(binding.to_scene(to_scene_position(&here, &config)), Default::default());
//!
//! let reading = CompassReading::between(&camera, there_in_scene).expect("target is not above us");
//! assert_relative_eq!(reading.angle.get::<degree>(), 90., epsilon = 1e-9);
//! assert_relative_eq!(reading.distance.get::<meter>(), 10.);
//! ```

#[macro_use]
mod coordinate_systems;

mod coordinates;
mod util;
mod vectors;

pub mod engineering;
pub mod math;

pub mod aligner;
pub mod camera;
pub mod compass;
pub mod config;
pub mod error;
pub mod markers;
pub mod model;
pub mod navigation;
pub mod render;
pub mod retry;
pub mod room;
pub mod session;
pub mod transform;
pub mod xr;

#[cfg(test)]
pub(crate) mod testing;

pub(crate) type Point3 = nalgebra::Point3<f64>;
pub(crate) type Vector3 = nalgebra::Vector3<f64>;
pub(crate) type Quaternion = nalgebra::Quaternion<f64>;
pub(crate) type UnitQuaternion = nalgebra::Unit<Quaternion>;
pub(crate) type Isometry3 = nalgebra::Isometry3<f64>;
pub(crate) type Similarity3 = nalgebra::Similarity3<f64>;

// re-structure our imports slightly to better match user expectation
/// Well-known coordinate systems and conventions.
pub mod systems {
    pub use super::coordinate_systems::{
        AssetLocal, EquivalentTo, FloorPlan, HasComponents, ModelLocal, PlanComponents, PlanLike,
        RightHandedYUpLike, Scene, SiteLocal, Tracking, YUpComponents,
    };
}
pub use coordinate_systems::CoordinateSystem;
pub use coordinates::Coordinate;
pub use vectors::Vector;

pub use aligner::{AlignmentTransform, AlignerConfig, ModelAligner};
pub use camera::{CameraControl, FreeRoamCamera};
pub use compass::CompassReading;
pub use config::{RetryConfig, WayfinderConfig};
pub use error::{Error, Result};
pub use markers::{MarkerBinding, MarkerConfig, MarkerManager, MarkerRole};
pub use navigation::{NavContext, NavEvent, NavigationConfig, NavigationState, Navigator};
pub use retry::{RetryPolicy, Retrier};
pub use room::{NavigationPair, Room, RoomId};
pub use session::{Localization, ModeFlags, SessionController, SessionPhase};
pub use transform::{to_scene_position, TransformConfig};
