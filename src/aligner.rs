//! Fitting the loaded campus model onto the room directory.
//!
//! The model and the room directory are authored independently, so the model is rarely at the
//! right scale, heading, or offset for the rooms. [`ModelAligner`] estimates a horizontal
//! similarity (yaw, uniform scale, and translation) that carries model vertices onto the room
//! positions:
//!
//! 1. every room is mapped with [`to_scene_position`] using the configured scale only, and both
//!    rooms and model vertices are projected onto the horizontal (XZ) plane;
//! 2. the model vertices are thinned to at most `max_samples` candidates;
//! 3. each room is matched to its nearest candidate (the first one encountered wins ties);
//! 4. the closed-form least-squares rotation and scale of the centroid-relative matches are
//!    computed, and the translation that carries the source centroid onto the target centroid;
//! 5. the model is lifted so that its lowest vertex sits on the floor.
//!
//! The fit never reflects: a non-finite or non-positive scale is replaced by 1.

use crate::coordinate_systems::{ModelLocal, Scene};
use crate::coordinates::Coordinate;
use crate::error::AlignmentError;
use crate::math::{Rotation, Similarity};
use crate::room::Room;
use crate::transform::{to_scene_position, TransformConfig};
use crate::util::BoundedAngle;
use crate::vectors::Vector;
use crate::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;
use uom::si::angle::{degree, radian};
use uom::si::f64::{Angle, Length};
use uom::si::length::meter;

type Point2 = nalgebra::Point2<f64>;
type Vector2 = nalgebra::Vector2<f64>;

/// Tunables for [`ModelAligner`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignerConfig {
    /// Upper bound on the number of model vertices considered as match candidates.
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Apply the fitted scale. When unset, `world_scale` is used instead.
    #[serde(default)]
    pub auto_scale: bool,
    #[serde(default = "default_world_scale")]
    pub world_scale: f64,
    /// User multiplier applied on top of the base scale.
    #[serde(default = "default_model_scale")]
    pub model_scale: f64,
    /// Yaw the model was authored with, added to the fitted rotation.
    #[serde(default)]
    pub initial_yaw_degrees: f64,
}

fn default_max_samples() -> usize {
    2000
}

fn default_world_scale() -> f64 {
    0.9
}

fn default_model_scale() -> f64 {
    0.9
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            auto_scale: false,
            world_scale: default_world_scale(),
            model_scale: default_model_scale(),
            initial_yaw_degrees: 0.,
        }
    }
}

/// Where the model root goes in the scene.
///
/// `rotation` is counter-clockwise in the horizontal `(x, z)` plane, ie, it turns `+x` towards
/// `+z`, and lies in `[-180°, 180°)`. Seen as a 3D rotation about `+y` that is a turn by
/// `-rotation`; see [`AlignmentTransform::to_similarity`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentTransform {
    pub rotation: Angle,
    /// The scale applied to the model root: `base_scale × user multiplier`.
    pub scale: f64,
    /// The scale the user multiplier is applied on top of.
    pub base_scale: f64,
    /// The scale the least-squares fit produced, whether or not it is applied.
    pub fit_scale: f64,
    pub translation_x: Length,
    pub translation_z: Length,
    pub floor_offset_y: Length,
}

impl AlignmentTransform {
    #[must_use]
    pub fn identity() -> Self {
        Self {
            rotation: Angle::new::<radian>(0.),
            scale: 1.,
            base_scale: 1.,
            fit_scale: 1.,
            translation_x: Length::new::<meter>(0.),
            translation_z: Length::new::<meter>(0.),
            floor_offset_y: Length::new::<meter>(0.),
        }
    }

    /// The model root transform: model vertices are scaled, turned, and then moved into place.
    #[must_use]
    pub fn to_similarity(&self) -> Similarity<Scene, ModelLocal> {
        // SAFETY: this is exactly how the model root node is placed in the scene.
        unsafe {
            Similarity::new(
                Vector::from_cartesian(self.translation_x, self.floor_offset_y, self.translation_z),
                Rotation::about_up_axis(-self.rotation),
                self.scale,
            )
        }
    }
}

impl Default for AlignmentTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for AlignmentTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "yaw {:.2}°, scale {:.4} (fit {:.4}), offset ({:.3}, {:.3}, {:.3})",
            self.rotation.get::<degree>(),
            self.scale,
            self.fit_scale,
            self.translation_x.get::<meter>(),
            self.floor_offset_y.get::<meter>(),
            self.translation_z.get::<meter>()
        )
    }
}

/// A model vertex matched to a room, for drawing alignment diagnostics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    /// The matched model vertex, projected onto the floor.
    pub model: Coordinate<ModelLocal>,
    /// Where the fit wants that vertex to land.
    pub room: Coordinate<Scene>,
}

/// Result of the planar least-squares fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PlanarFit {
    pub(crate) angle: f64,
    pub(crate) scale: f64,
    pub(crate) translation: Vector2,
}

/// Fits `dst ≈ scale · R(angle) · src + translation` in the least-squares sense.
///
/// `src` and `dst` must be the same, non-zero length.
pub(crate) fn fit_planar_similarity(src: &[Point2], dst: &[Point2]) -> PlanarFit {
    let n = src.len() as f64;
    let src_centroid = src.iter().map(|p| p.coords).sum::<Vector2>() / n;
    let dst_centroid = dst.iter().map(|p| p.coords).sum::<Vector2>() / n;

    let (mut sum_dot, mut sum_cross, mut src_sq) = (0., 0., 0.);
    for (s, d) in src.iter().zip(dst) {
        let s0 = s.coords - src_centroid;
        let d0 = d.coords - dst_centroid;
        sum_dot += s0.dot(&d0);
        sum_cross += s0.x * d0.y - s0.y * d0.x;
        src_sq += s0.norm_squared();
    }

    let angle = sum_cross.atan2(sum_dot);
    let (sin, cos) = angle.sin_cos();
    let rotate = |v: Vector2| Vector2::new(cos * v.x - sin * v.y, sin * v.x + cos * v.y);

    let scale = if src_sq > 0. {
        src.iter()
            .zip(dst)
            .map(|(s, d)| d.coords.dot(&rotate(s.coords - src_centroid)))
            .sum::<f64>()
            / src_sq
    } else {
        1.
    };

    PlanarFit {
        angle,
        scale,
        translation: dst_centroid - rotate(src_centroid) * scale,
    }
}

/// Every how-many-th vertex to keep so that at most `max_samples` remain (roughly).
pub(crate) fn sample_step(vertex_count: usize, max_samples: usize) -> usize {
    (vertex_count / max_samples.max(1)).max(1)
}

fn usable_scale(scale: f64) -> f64 {
    if scale.is_finite() && scale > 0. {
        scale
    } else {
        1.
    }
}

/// Computes and remembers the model root transform.
#[derive(Debug)]
pub struct ModelAligner {
    config: AlignerConfig,
    current: AlignmentTransform,
    multiplier: f64,
    model_min_y: f64,
    correspondences: Vec<Correspondence>,
}

impl ModelAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self {
            multiplier: usable_scale(config.model_scale),
            config,
            current: AlignmentTransform::identity(),
            model_min_y: 0.,
            correspondences: Vec::new(),
        }
    }

    /// The last successful alignment, or identity if there has been none.
    pub fn transform(&self) -> &AlignmentTransform {
        &self.current
    }

    pub fn model_scale(&self) -> f64 {
        self.multiplier
    }

    /// The matches behind the last successful alignment.
    pub fn debug_correspondences(&self) -> &[Correspondence] {
        &self.correspondences
    }

    /// Fits the model with the given vertices onto `rooms`.
    ///
    /// On failure the previous transform is kept.
    pub fn align(
        &mut self,
        vertices: &[Coordinate<ModelLocal>],
        rooms: &[Room],
        transform: &TransformConfig,
    ) -> Result<&AlignmentTransform, AlignmentError> {
        if vertices.is_empty() {
            log::warn!("cannot align: the model has no vertices");
            return Err(AlignmentError::NoModelVertices);
        }

        let scale_only = transform.with_scale_only();
        let targets: Vec<Point2> = rooms
            .iter()
            .map(|room| {
                let p = to_scene_position(room, &scale_only);
                Point2::new(p.x().get::<meter>(), p.z().get::<meter>())
            })
            .collect();

        let step = sample_step(vertices.len(), self.config.max_samples);
        let candidates: Vec<Point2> = vertices
            .iter()
            .step_by(step)
            .map(|v| Point2::new(v.x().get::<meter>(), v.z().get::<meter>()))
            .collect();

        let (src, dst): (Vec<Point2>, Vec<Point2>) = targets
            .iter()
            .filter_map(|target| nearest(&candidates, target).map(|c| (c, *target)))
            .unzip();

        if src.len() < 2 {
            log::warn!(
                "cannot align: only {} room/model correspondences",
                src.len()
            );
            return Err(AlignmentError::InsufficientCorrespondences { found: src.len() });
        }

        let fit = fit_planar_similarity(&src, &dst);
        let base_scale = if self.config.auto_scale {
            usable_scale(fit.scale)
        } else {
            usable_scale(self.config.world_scale)
        };
        self.model_min_y = vertices
            .iter()
            .map(|v| v.y().get::<meter>())
            .fold(f64::INFINITY, f64::min);

        let applied = base_scale * self.multiplier;
        self.current = AlignmentTransform {
            rotation: BoundedAngle::new(
                Angle::new::<radian>(fit.angle)
                    + Angle::new::<degree>(self.config.initial_yaw_degrees),
            )
            .to_signed_angle(),
            scale: applied,
            base_scale,
            fit_scale: fit.scale,
            translation_x: Length::new::<meter>(fit.translation.x),
            translation_z: Length::new::<meter>(fit.translation.y),
            floor_offset_y: Length::new::<meter>(-self.model_min_y * applied),
        };
        self.correspondences = src
            .iter()
            .zip(&dst)
            .map(|(s, d)| Correspondence {
                model: Coordinate::from_nalgebra_point(Point3::new(s.x, 0., s.y)),
                room: Coordinate::from_nalgebra_point(Point3::new(d.x, 0., d.y)),
            })
            .collect();

        log::info!(
            "aligned model to {} rooms using {} of {} vertices: {}",
            rooms.len(),
            candidates.len(),
            vertices.len(),
            self.current
        );
        Ok(&self.current)
    }

    /// Sets the user multiplier applied on top of the base scale.
    ///
    /// Returns `false` (and changes nothing) for a non-finite or non-positive multiplier.
    pub fn set_model_scale(&mut self, multiplier: f64) -> bool {
        if !(multiplier.is_finite() && multiplier > 0.) {
            return false;
        }
        self.multiplier = multiplier;
        let applied = self.current.base_scale * multiplier;
        self.current.scale = applied;
        self.current.floor_offset_y = Length::new::<meter>(-self.model_min_y * applied);
        true
    }

    /// Scales the user multiplier by `factor`.
    pub fn multiply_model_scale(&mut self, factor: f64) -> bool {
        self.set_model_scale(self.multiplier * factor)
    }
}

/// The first candidate with the smallest squared distance to `target`.
fn nearest(candidates: &[Point2], target: &Point2) -> Option<Point2> {
    let mut best = None;
    let mut best_d2 = f64::INFINITY;
    for candidate in candidates {
        let d2 = (candidate - target).norm_squared();
        if d2 < best_d2 {
            best_d2 = d2;
            best = Some(*candidate);
        }
    }
    best
}
