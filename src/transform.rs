//! Mapping stored room positions into the scene.
//!
//! The room directory stores positions on a floor plan: `x` across the drawing, `y` up the
//! drawing, and `z` as elevation. The scene is Y-up with `-z` pointing "into" the screen, so the
//! plan's `y` axis becomes the scene's negative depth:
//!
//! ```text
//! scene.x =  room.x · scale
//! scene.y =  room.z · scale
//! scene.z = -room.y · scale
//! ```
//!
//! Surveys are not always drawn with the same handedness, so [`TransformConfig`] can swap the two
//! plan axes and flip each output axis. The mapping is total: it never fails, and non-finite
//! stored values count as 0.

use crate::coordinate_systems::{FloorPlan, SiteLocal};
use crate::coordinates::Coordinate;
use crate::room::Room;
use crate::util::finite_or;
use crate::Point3;
use serde::{Deserialize, Serialize};
use uom::si::length::meter;

/// How room positions are mapped into the scene.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Uniform factor from plan units to scene meters.
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Exchange the plan's `x` and `y` before mapping.
    #[serde(default)]
    pub swap_xy: bool,
    /// Negate the scene `x` output.
    #[serde(default)]
    pub flip_x: bool,
    /// Negate the scene depth (`z`) output, which the plan's `y` feeds.
    #[serde(default)]
    pub flip_y: bool,
    /// Negate the scene vertical (`y`) output, which the plan's `z` feeds.
    #[serde(default)]
    pub flip_z: bool,
}

fn default_scale() -> f64 {
    0.9
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            swap_xy: false,
            flip_x: false,
            flip_y: false,
            flip_z: false,
        }
    }
}

impl TransformConfig {
    /// The same scale with every swap and flip cleared.
    #[must_use]
    pub fn with_scale_only(&self) -> Self {
        Self {
            scale: self.scale,
            ..Self::default()
        }
    }
}

/// Maps a stored plan position into the model root's local frame.
pub fn to_site_local(
    position: &Coordinate<FloorPlan>,
    config: &TransformConfig,
) -> Coordinate<SiteLocal> {
    let s = config.scale;
    let rx = finite_or(position.plan_x().get::<meter>(), 0.);
    let ry = finite_or(position.plan_y().get::<meter>(), 0.);
    let rz = finite_or(position.plan_elevation().get::<meter>(), 0.);

    let (mut x, mut z) = if config.swap_xy {
        (ry * s, -rx * s)
    } else {
        (rx * s, -ry * s)
    };
    let mut y = rz * s;

    if config.flip_x {
        x = -x;
    }
    if config.flip_y {
        z = -z;
    }
    if config.flip_z {
        y = -y;
    }

    Coordinate::from_nalgebra_point(Point3::new(x, y, z))
}

/// Computes where `room` sits in the model root's local frame.
///
/// This is the position of the room's marker before any binding (model, anchor, or offset) is
/// applied; see [`MarkerBinding`](crate::MarkerBinding).
pub fn to_scene_position(room: &Room, config: &TransformConfig) -> Coordinate<SiteLocal> {
    to_site_local(&room.position, config)
}
