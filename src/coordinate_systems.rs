use uom::si::f64::Length;

use serde::{Deserialize, Serialize};

#[cfg(doc)]
use crate::{Coordinate, Vector};

/// Defines how a coordinate system behaves.
///
/// For example, two coordinate systems that implement
/// `CoordinateSystem<Convention = RightHandedYUpLike>` both behave [`RightHandedYUpLike`], and get
/// appropriately-named accessors on types like [`Coordinate`] and [`Vector`] (ie, `x`, `y`, and
/// `z` with `y` pointing up).
///
/// While you _can_ implement this trait directly, prefer using [`system!`](crate::system).
pub trait CoordinateSystem {
    /// What standard coordinate system convention this coordinate system conforms to.
    type Convention;
}

/// Links a coordinate system convention to the type holding the constituent parts under proper
/// names.
pub trait HasComponents {
    type Components: Into<[Length; 3]>;
}

/// Indicates that the implementing coordinate system is exactly equivalent to
/// `OtherCoordinateSystem`.
///
/// More technically, `impl EquivalentTo<B> for A` should only exist if the transform from `A` to
/// `B` is the identity function.
///
/// In this crate that is the case for [`Tracking`] and [`Scene`]: while an immersive session is
/// running the virtual camera is driven directly by the viewer pose reported in the reference
/// space, so the two frames coincide.
///
/// # Safety
///
/// This trait is unsafe to implement because it allows moving between types annotated with two
/// different coordinate systems without performing any transform on them. If a transform actually
/// _is_ needed (and thus this implementation is incorrect), this would violate type safety.
pub unsafe trait EquivalentTo<OtherCoordinateSystem> {}

/// All coordinate systems are equivalent to themselves.
unsafe impl<System> EquivalentTo<System> for System {}

/// Marks a coordinate system that stores positions the way a building floor plan does.
///
/// - Positive X runs along the plan's horizontal axis.
/// - Positive Y runs along the plan's vertical axis (ie, "up" on the drawing, not up in the
///   world).
/// - Positive Z is elevation above the floor.
///
/// Rooms in the room directory are stored in a plan-like system. Values carry whatever unit the
/// plan was drawn in; a scale factor (see [`TransformConfig`](crate::TransformConfig)) turns them
/// into scene meters.
pub struct PlanLike;

/// Components for Cartesian points in a [`PlanLike`] coordinate system.
///
/// Usually provided to methods like [`Coordinate::build`] or [`Vector::build`].
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct PlanComponents {
    pub x: Length,
    pub y: Length,
    pub elevation: Length,
}

impl From<PlanComponents> for [Length; 3] {
    fn from(c: PlanComponents) -> [Length; 3] {
        [c.x, c.y, c.elevation]
    }
}

impl HasComponents for PlanLike {
    type Components = PlanComponents;
}

/// Marks a right-handed coordinate system with Y pointing up.
///
/// This is the convention used by typical 3D scene graphs and by XR reference spaces:
///
/// - Positive X is to the right.
/// - Positive Y is up (away from the floor).
/// - Positive Z points towards the viewer, which means a camera with identity orientation looks
///   along _negative_ Z.
///
/// The horizontal plane of such a system is XZ.
pub struct RightHandedYUpLike;

/// Components for Cartesian points in a [`RightHandedYUpLike`] coordinate system.
///
/// Usually provided to methods like [`Coordinate::build`] or [`Vector::build`].
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct YUpComponents {
    pub x: Length,
    pub y: Length,
    pub z: Length,
}

impl From<YUpComponents> for [Length; 3] {
    fn from(c: YUpComponents) -> [Length; 3] {
        [c.x, c.y, c.z]
    }
}

impl HasComponents for RightHandedYUpLike {
    type Components = YUpComponents;
}

/// Defines a new coordinate system and its conventions.
///
/// Note that the coordinate system is a zero-sized type used only to mark things like
/// [`Coordinate`] and [`Vector`] with what coordinate system they are in. A coordinate system does
/// not know its relation to any other coordinate system.
///
/// At present, this macro allows you to define the following kinds of coordinate systems:
///
/// [`PlanLike`]
///
/// ```rust
/// # use wayfinder::system;
/// system!(pub struct LibraryPlan using plan);
/// ```
///
/// [`RightHandedYUpLike`]
///
/// ```rust
/// # use wayfinder::system;
/// system!(pub struct KioskScene using right-handed Y-up);
/// ```
///
/// You can include doc comments and attributes directly in the invocation of `system!` to add docs
/// and derived traits to your type:
///
/// ```rust
/// wayfinder::system! {
///     #[derive(Hash)]
///     pub(crate) struct AnnexPlan using plan
/// }
/// ```
#[macro_export]
macro_rules! system {
    ($(#[$attr:meta])* $vis:vis struct $name:ident using right-handed Y-up) => {
        $crate::system!($(#[$attr])* $vis struct $name as RightHandedYUpLike);
    };
    ($(#[$attr:meta])* $vis:vis struct $name:ident using plan) => {
        $crate::system!($(#[$attr])* $vis struct $name as PlanLike);
    };
    {
        $(#[$attr:meta])*
        $vis:vis struct $name:ident
        as $convention:ident
    } => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        $vis struct $name;

        impl $crate::CoordinateSystem for $name {
            type Convention = $crate::systems::$convention;
        }
    };
}

system! {
    /// The frame rooms are stored in by the room directory.
    ///
    /// Coordinates here are building-relative and unscaled.
    #[derive(Serialize, Deserialize)]
    pub struct FloorPlan using plan
}

system! {
    /// The frame a room's scene position is computed in (see
    /// [`to_scene_position`](crate::to_scene_position)).
    ///
    /// This is the local frame of the model root node: markers bound to the model are children of
    /// that node, and so are expressed here before the model's own transform is applied.
    #[derive(Serialize, Deserialize)]
    pub struct SiteLocal using right-handed Y-up
}

system! {
    /// The frame the loaded 3D model's vertices are expressed in.
    #[derive(Serialize, Deserialize)]
    pub struct ModelLocal using right-handed Y-up
}

system! {
    /// The frame of the geometry as stored in the model asset, before the model root node's own
    /// centering and scaling.
    #[derive(Serialize, Deserialize)]
    pub struct AssetLocal using right-handed Y-up
}

system! {
    /// The world frame of the rendering surface's scene graph.
    #[derive(Serialize, Deserialize)]
    pub struct Scene using right-handed Y-up
}

system! {
    /// The reference space of an immersive session (`local-floor`).
    ///
    /// Origin is on the floor near where the session started; poses and hit-test results reported
    /// by the XR platform are in this frame.
    #[derive(Serialize, Deserialize)]
    pub struct Tracking using right-handed Y-up
}

// SAFETY: during an immersive session the camera is set directly from the viewer pose in the
// reference space and nothing else re-parents the scene root.
unsafe impl EquivalentTo<Scene> for Tracking {}
unsafe impl EquivalentTo<Tracking> for Scene {}
// SAFETY: marker positions are computed in the local frame of the model root node, which is the
// frame the model's own vertices live in.
unsafe impl EquivalentTo<ModelLocal> for SiteLocal {}
unsafe impl EquivalentTo<SiteLocal> for ModelLocal {}
