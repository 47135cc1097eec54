//! The rendering surface the core drives.
//!
//! The host owns the scene graph and the renderer. The core only asks it to add, move, and remove
//! marker nodes, to place the camera, the hit-test reticle, and the model root, to draw the
//! compass overlay, and to render a frame. All positions handed over are in the [`Scene`] frame.

use crate::compass::CompassDial;
use crate::coordinate_systems::{ModelLocal, Scene};
use crate::coordinates::Coordinate;
use crate::engineering::Pose;
use crate::math::Similarity;
use serde::{Deserialize, Serialize};
use std::fmt;
use uom::si::f64::{Angle, Length};

/// A node the surface added to its scene graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// What a marker looks like: a sphere with a text label floating above it.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerVisual {
    pub label: String,
    /// `0xRRGGBB`
    pub color: u32,
    pub radius: Length,
    /// Height of the label above the sphere's center.
    pub label_height: Length,
}

pub trait RenderSurface {
    /// Whether the scene, camera, and renderer exist yet.
    ///
    /// The surface may be created some time after the core; nothing else is called until this
    /// returns `true`.
    fn is_ready(&self) -> bool;

    fn add_marker(&mut self, visual: &MarkerVisual, position: Coordinate<Scene>) -> NodeId;

    fn remove_node(&mut self, node: NodeId);

    fn set_node_position(&mut self, node: NodeId, position: Coordinate<Scene>);

    fn camera_pose(&self) -> Pose<Scene>;

    fn set_camera_pose(&mut self, pose: Pose<Scene>);

    /// Vertical field of view of the camera.
    fn field_of_view(&self) -> Angle;

    /// Shows the hit-test reticle at `pose`, or hides it.
    fn set_reticle(&mut self, pose: Option<Pose<Scene>>);

    /// Draws the compass overlay, or clears it.
    fn draw_compass(&mut self, dial: Option<&CompassDial>);

    /// Places the model root node.
    fn set_model_transform(&mut self, root: Similarity<Scene, ModelLocal>);

    fn render(&mut self);
}
