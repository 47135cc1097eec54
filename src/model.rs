//! The loaded 3D campus model.
//!
//! Loading and parsing the asset is up to the host, which hands the crate a [`ModelHandle`]
//! through an [`AssetLoader`]. What this module owns is the placement of the model's geometry
//! inside the model root node: after loading, the geometry is (optionally) scaled to the size of
//! the campus and centered on the root, so that the [`ModelAligner`](crate::ModelAligner) starts
//! from a model that is roughly where the rooms are.

use crate::coordinate_systems::{AssetLocal, ModelLocal, RightHandedYUpLike, Scene};
use crate::coordinates::Coordinate;
use crate::engineering::Pose;
use crate::error::AssetError;
use crate::math::{Rotation, Similarity};
use crate::room::Room;
use crate::vectors::Vector;
use crate::CoordinateSystem;
use serde::{Deserialize, Serialize};
use uom::si::angle::radian;
use uom::si::f64::{Angle, Length};
use uom::si::length::meter;

/// Where the campus model is fetched from when no usable path is configured.
pub const CANONICAL_MODEL_PATH: &str = "/static/UMAP_App/glb/Umak_3d.glb";

/// Geometry of a loaded model.
pub trait ModelHandle {
    /// Every vertex of every mesh, in the order the asset stores them.
    fn vertices(&self) -> Vec<Coordinate<AssetLocal>>;
}

/// Fetches and parses model assets.
pub trait AssetLoader {
    fn load_model(&mut self, path: &str) -> Result<Box<dyn ModelHandle>, AssetError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_path")]
    pub path: String,
    /// Used in place of `path` when that is empty or still contains a template placeholder.
    #[serde(default = "default_path")]
    pub canonical_path: String,
    #[serde(default = "default_load_attempts")]
    pub load_attempts: u32,
}

fn default_path() -> String {
    CANONICAL_MODEL_PATH.to_owned()
}

fn default_load_attempts() -> u32 {
    3
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            canonical_path: default_path(),
            load_attempts: default_load_attempts(),
        }
    }
}

/// Returns `path`, or `canonical` if `path` is empty or an unexpanded template (`{...}`, possibly
/// percent-encoded).
pub fn sanitize_model_path<'a>(path: &'a str, canonical: &'a str) -> &'a str {
    if path.is_empty() || path.contains('{') || path.contains("%7B") {
        canonical
    } else {
        path
    }
}

/// Loads the configured model, trying at most `config.load_attempts` times.
pub fn load_model(
    loader: &mut dyn AssetLoader,
    config: &ModelConfig,
) -> Result<LoadedModel, AssetError> {
    let path = sanitize_model_path(&config.path, &config.canonical_path);
    if path != config.path {
        log::warn!("model path {:?} is not usable; loading {path} instead", config.path);
    }

    let attempts = config.load_attempts.max(1);
    for attempt in 1..=attempts {
        match loader.load_model(path) {
            Ok(handle) => {
                log::info!("loaded model {path} (attempt {attempt}/{attempts})");
                return Ok(LoadedModel::new(handle, path));
            }
            Err(e) => log::warn!("attempt {attempt}/{attempts} failed: {e}"),
        }
    }
    Err(AssetError::Exhausted {
        path: path.to_owned(),
        attempts,
    })
}

/// An axis-aligned bounding box.
#[derive(Debug)]
pub struct Bounds<In> {
    min: Coordinate<In>,
    max: Coordinate<In>,
}

impl<In> Clone for Bounds<In> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<In> Copy for Bounds<In> {}

impl<In> PartialEq for Bounds<In> {
    fn eq(&self, other: &Self) -> bool {
        self.min == other.min && self.max == other.max
    }
}

impl<In> Bounds<In> {
    /// The smallest box holding every point, or `None` if there are no finite points.
    pub fn from_points(points: impl IntoIterator<Item = Coordinate<In>>) -> Option<Self> {
        points
            .into_iter()
            .filter(Coordinate::is_finite)
            .fold(None, |bounds: Option<Self>, p| {
                Some(match bounds {
                    None => Self { min: p, max: p },
                    Some(b) => b.including(p),
                })
            })
    }

    #[must_use]
    pub fn including(&self, point: Coordinate<In>) -> Self {
        Self {
            min: Coordinate::from_nalgebra_point(self.min.point.inf(&point.point)),
            max: Coordinate::from_nalgebra_point(self.max.point.sup(&point.point)),
        }
    }

    pub fn min(&self) -> Coordinate<In> {
        self.min
    }

    pub fn max(&self) -> Coordinate<In> {
        self.max
    }

    pub fn center(&self) -> Coordinate<In> {
        self.min.lerp(&self.max, 0.5)
    }

    pub fn size(&self) -> Vector<In> {
        self.max - self.min
    }

    /// The largest extent along any axis.
    pub fn max_dimension(&self) -> Length {
        let size = self.size().inner;
        Length::new::<meter>(size.x.max(size.y).max(size.z))
    }

    /// All eight corners.
    pub fn corners(&self) -> [Coordinate<In>; 8] {
        let (lo, hi) = (self.min.point, self.max.point);
        [0, 1, 2, 3, 4, 5, 6, 7].map(|i| {
            Coordinate::from_nalgebra_point(crate::Point3::new(
                if i & 1 == 0 { lo.x } else { hi.x },
                if i & 2 == 0 { lo.y } else { hi.y },
                if i & 4 == 0 { lo.z } else { hi.z },
            ))
        })
    }
}

/// How large the model should be to cover the rooms.
///
/// That is the larger of the rooms' plan width and depth (each at least 1) under `world_scale`,
/// and never less than 3. With no rooms the model is made 6 across.
pub fn target_model_size(rooms: &[Room], world_scale: f64) -> Length {
    if rooms.is_empty() {
        return Length::new::<meter>(6.);
    }
    let extent = |value: fn(&Room) -> f64| {
        let (lo, hi) = rooms.iter().map(value).fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), v| (lo.min(v), hi.max(v)),
        );
        (hi - lo).abs().max(1.)
    };
    let width = extent(|r| crate::util::finite_or(r.position.plan_x().get::<meter>(), 0.));
    let depth = extent(|r| crate::util::finite_or(r.position.plan_y().get::<meter>(), 0.));
    Length::new::<meter>((width.max(depth) * world_scale).max(3.))
}

/// A model handed over by the [`AssetLoader`], together with its placement under the model root.
pub struct LoadedModel {
    handle: Box<dyn ModelHandle>,
    path: String,
    placement: Similarity<ModelLocal, AssetLocal>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("path", &self.path)
            .field("placement", &self.placement)
            .finish_non_exhaustive()
    }
}

impl LoadedModel {
    /// Wraps `handle` with its geometry sitting untouched under the model root.
    pub fn new(handle: Box<dyn ModelHandle>, path: impl Into<String>) -> Self {
        Self {
            handle,
            path: path.into(),
            // SAFETY: until it is centered the asset sits on the root unmodified.
            placement: unsafe { Similarity::identity() },
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Where the asset geometry sits under the model root.
    pub fn placement(&self) -> Similarity<ModelLocal, AssetLocal> {
        self.placement
    }

    /// The model's vertices in the model root's frame.
    pub fn vertices(&self) -> Vec<Coordinate<ModelLocal>> {
        let placement = self.placement;
        self.handle
            .vertices()
            .into_iter()
            .map(|v| placement * v)
            .collect()
    }

    pub fn bounds(&self) -> Option<Bounds<ModelLocal>> {
        Bounds::from_points(self.vertices())
    }

    /// Scales the geometry (when `auto_scale` is set) to [`target_model_size`] and centers it on
    /// the model root.
    ///
    /// This is the placement a freshly loaded model gets.
    pub fn fit_to_rooms(&mut self, rooms: &[Room], auto_scale: bool, world_scale: f64) {
        let target = target_model_size(rooms, world_scale);
        self.place(auto_scale.then_some(target), false);
    }

    /// Re-derives the placement from scratch: optionally scaled to `6 × world_scale`, centered,
    /// and lifted so that the lowest vertex is on the root's floor.
    pub fn recenter(&mut self, auto_scale: bool, world_scale: f64) {
        let target = Length::new::<meter>(6. * world_scale);
        self.place(auto_scale.then_some(target), true);
    }

    fn place(&mut self, target_size: Option<Length>, on_floor: bool) {
        let Some(raw) = Bounds::from_points(self.handle.vertices()) else {
            log::warn!("model {} has no vertices to place", self.path);
            return;
        };

        let max_dim = raw.max_dimension().get::<meter>();
        let scale = match target_size {
            Some(target) if max_dim > 0. => target.get::<meter>() / max_dim,
            _ => 1.,
        };

        let center = Vector::<AssetLocal>::from(raw.center()).inner * scale;
        let mut translation = -center;
        if on_floor {
            translation.y = -raw.min().point.y * scale;
        }

        // SAFETY: the geometry is only scaled and shifted, never turned, under the root.
        self.placement = unsafe {
            Similarity::new(
                Vector::from_nalgebra_vector(translation),
                Rotation::identity(),
                scale,
            )
        };
        log::debug!("placed model {}: {}", self.path, self.placement);
    }
}

/// Computes a camera pose that has all of `bounds` in view.
///
/// The camera keeps looking along the same horizontal direction as `camera` (or down `-z` if that
/// looks straight up or down) and is raised above the center of the box.
pub fn frame_bounds<In>(bounds: &Bounds<In>, camera: &Pose<In>, field_of_view: Angle) -> Pose<In>
where
    In: CoordinateSystem<Convention = RightHandedYUpLike>,
{
    const PADDING: f64 = 1.2;

    let size = bounds.size().inner;
    let center = bounds.center();
    let max_dim = size.x.max(size.y).max(size.z).max(0.1) * PADDING;
    let half_fov = field_of_view.get::<radian>() / 2.;
    let distance = (max_dim / 2.) / half_fov.tan();

    let back = (-camera.forward())
        .horizontal_direction()
        .unwrap_or_else(|| Vector::from_nalgebra_vector(crate::Vector3::z()));
    let mut position = (center + back * (distance + 2.)).point;
    position.y = center.point.y + (size.y * 0.7).max(2.);
    let position = Coordinate::from_nalgebra_point(position);

    Pose::looking_at(position, center).unwrap_or_else(|| camera.with_position(position))
}

/// The scene-space bounding box of the model under its root transform `root`.
pub fn scene_bounds(
    model: &LoadedModel,
    root: Similarity<Scene, ModelLocal>,
) -> Option<Bounds<Scene>> {
    let local = model.bounds()?;
    Bounds::from_points(local.corners().map(|c| root * c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomId;
    use crate::testing::{FakeLoader, FakeModel};
    use approx::assert_relative_eq;
    use rstest::rstest;
    use uom::si::angle::degree;

    fn m(meters: f64) -> Length {
        Length::new::<meter>(meters)
    }

    fn box_model(lo: [f64; 3], hi: [f64; 3]) -> LoadedModel {
        LoadedModel::new(Box::new(FakeModel::new(vec![lo, hi])), "box.glb")
    }

    #[rstest]
    #[case("", "/static/UMAP_App/glb/Umak_3d.glb")]
    #[case("{% static 'x.glb' %}", "/static/UMAP_App/glb/Umak_3d.glb")]
    #[case("/static/%7B%25%20static%25%7D", "/static/UMAP_App/glb/Umak_3d.glb")]
    #[case("/models/campus.glb", "/models/campus.glb")]
    fn sanitizing(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(sanitize_model_path(path, CANONICAL_MODEL_PATH), expected);
    }

    #[test]
    fn loading_retries_then_gives_up() {
        let config = ModelConfig {
            path: "{{ model }}".to_owned(),
            load_attempts: 3,
            ..ModelConfig::default()
        };

        let mut loader = FakeLoader::failing(2, FakeModel::new(vec![[0.; 3]]));
        let model = load_model(&mut loader, &config).expect("third attempt succeeds");
        assert_eq!(model.path(), CANONICAL_MODEL_PATH);
        assert_eq!(loader.requested, vec![CANONICAL_MODEL_PATH; 3]);

        let mut loader = FakeLoader::failing(5, FakeModel::new(vec![[0.; 3]]));
        assert_eq!(
            load_model(&mut loader, &config).unwrap_err(),
            AssetError::Exhausted {
                path: CANONICAL_MODEL_PATH.to_owned(),
                attempts: 3
            }
        );
    }

    #[test]
    fn bounds() {
        let b = Bounds::<Scene>::from_points([
            Coordinate::from_cartesian(m(1.), m(-2.), m(0.)),
            Coordinate::from_cartesian(m(-1.), m(4.), m(3.)),
            Coordinate::from_cartesian(m(f64::NAN), m(100.), m(0.)),
        ])
        .expect("two finite points");
        assert_eq!(b.min(), Coordinate::from_cartesian(m(-1.), m(-2.), m(0.)));
        assert_eq!(b.center(), Coordinate::from_cartesian(m(0.), m(1.), m(1.5)));
        assert_eq!(b.max_dimension(), m(6.));
        assert!(b.corners().iter().all(|c| b.including(*c) == b));

        assert!(Bounds::<Scene>::from_points([]).is_none());
    }

    #[test]
    fn target_size_follows_rooms() {
        let rooms = [
            Room::at(RoomId(1), "1", 0., 0., 0.),
            Room::at(RoomId(2), "2", 40., 10., 0.),
        ];
        assert_eq!(target_model_size(&rooms, 0.9), m(36.));
        assert_eq!(target_model_size(&rooms[..1], 0.9), m(3.));
        assert_eq!(target_model_size(&[], 0.9), m(6.));
    }

    #[test]
    fn fitting_centers_and_scales() {
        let rooms = [
            Room::at(RoomId(1), "1", 0., 0., 0.),
            Room::at(RoomId(2), "2", 20., 0., 0.),
        ];
        let mut model = box_model([10., 0., 10.], [12., 1., 14.]);

        model.fit_to_rooms(&rooms, false, 0.5);
        let b = model.bounds().expect("has vertices");
        assert_relative_eq!(b.center(), Coordinate::origin());
        assert_relative_eq!(b.max_dimension().get::<meter>(), 4.);

        model.fit_to_rooms(&rooms, true, 0.5);
        let b = model.bounds().expect("has vertices");
        assert_relative_eq!(b.center(), Coordinate::origin(), epsilon = m(1e-12));
        assert_relative_eq!(b.max_dimension().get::<meter>(), 10., epsilon = 1e-12);
    }

    #[test]
    fn recentering_lifts_onto_the_floor() {
        let mut model = box_model([-3., -5., 1.], [1., -3., 3.]);
        model.recenter(true, 0.5);
        let b = model.bounds().expect("has vertices");
        assert_relative_eq!(b.min().y().get::<meter>(), 0., epsilon = 1e-12);
        assert_relative_eq!(b.max_dimension().get::<meter>(), 3., epsilon = 1e-12);
        assert_relative_eq!(b.center().x().get::<meter>(), 0., epsilon = 1e-12);
        assert_relative_eq!(b.center().z().get::<meter>(), 0., epsilon = 1e-12);
    }

    #[test]
    fn framing() {
        let bounds = Bounds::<Scene>::from_points([
            Coordinate::from_cartesian(m(-5.), m(0.), m(-5.)),
            Coordinate::from_cartesian(m(5.), m(2.), m(5.)),
        ])
        .expect("two points");
        let camera = Pose::<Scene>::default();

        let framed = frame_bounds(&bounds, &camera, Angle::new::<degree>(90.));
        // max_dim 12, distance 6, pushed back 2 further along +z
        assert_relative_eq!(
            framed.position(),
            Coordinate::from_cartesian(m(0.), m(3.), m(8.)),
            epsilon = m(1e-9)
        );
        let to_center = (bounds.center() - framed.position())
            .normalized()
            .expect("camera is not at the center");
        assert_relative_eq!(framed.forward(), to_center, epsilon = 1e-9);
    }

    #[test]
    fn scene_bounds_follow_the_root() {
        let model = box_model([-1., 0., -1.], [1., 2., 1.]);
        // SAFETY: test transform.
        let root = unsafe {
            Similarity::<Scene, ModelLocal>::new(
                Vector::from_cartesian(m(10.), m(0.), m(0.)),
                Rotation::identity(),
                2.,
            )
        };
        let b = scene_bounds(&model, root).expect("has vertices");
        assert_relative_eq!(b.min(), Coordinate::from_cartesian(m(8.), m(0.), m(-2.)));
        assert_relative_eq!(b.max(), Coordinate::from_cartesian(m(12.), m(4.), m(2.)));
    }
}
