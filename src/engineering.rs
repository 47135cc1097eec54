//! Spatial operations expressed in engineering language.
//!
//! This module provides wrappers around the types in [`mod math`](crate::math) that are easier to
//! grok when thinking about cameras, anchors, and markers rather than about matrices. The main
//! type is [`Pose`], which describes an object's position and orientation in a coordinate system
//! (see [`CoordinateSystem`]). Poses can be converted between coordinate systems using
//! [`RigidBodyTransform`] (eg, [`RigidBodyTransform::transform`]).
//!
//! [`Orientation`] represents an object's orientation independent of its position. To represent
//! just an object's position, use [`Coordinate`], which is shared between the math and
//! engineering modules.
//!
//! Every object is assumed to have "body axes" that dictate what, eg, "forward" means for that
//! object. Everything in this crate that has a pose (the viewer, the virtual camera, a tracked
//! anchor) follows the scene-graph convention: positive Y is up, positive X is right, and the
//! object looks along its _negative_ Z axis. An object's orientation is then the rotation that
//! must be applied to the reference system's axes such that it aligns with the body's axes.
//!
//! One method worth calling out in particular is [`Pose::map_as_zero_in`], which starts a new
//! coordinate system with origin and rotation equal to that of the current pose. This is how a
//! tracked anchor's pose in [`Tracking`] becomes the transform that places markers registered to
//! that anchor.

use crate::coordinate_systems::RightHandedYUpLike;
use crate::coordinates::Coordinate;
use crate::math::{RigidBodyTransform, Rotation};
use crate::systems::EquivalentTo;
use crate::{CoordinateSystem, Point3, UnitQuaternion, Vector, Vector3};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::ops::Mul;
use uom::si::angle::radian;
use uom::si::f64::{Angle, Length};

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

use serde::{Deserialize, Serialize};

#[cfg(doc)]
use crate::systems::Tracking;

#[derive(Clone, Copy, Debug)]
pub(crate) struct ObjectCoordinateSystem;

/// Defines the orientation of an object in [`CoordinateSystem`] `In`.
///
/// <div class="warning">
///
/// Note that this type implements `Deserialize` despite having `unsafe` constructors -- this is
/// because doing otherwise would be extremely unergonomic. However, when deserializing, the
/// coordinate system of the deserialized value is _not_ checked, so this is a foot-gun to be
/// mindful of.
///
/// </div>
#[derive(Debug, Serialize, Deserialize)]
// don't require In: Serialize/Deserialize since we skip it anyway
#[serde(bound = "")]
// no need for the "inner": indirection
#[serde(transparent)]
pub struct Orientation<In> {
    pub(crate) inner: Rotation<In, ObjectCoordinateSystem>,
}

// manual impls of Clone and Copy to avoid requiring In: Copy + Clone
impl<In> Clone for Orientation<In> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<In> Copy for Orientation<In> {}

impl<In> PartialEq<Self> for Orientation<In> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq(&other.inner)
    }
}

impl<In> Orientation<In> {
    /// Constructs an orientation that is aligned with the axes of the [`CoordinateSystem`] `In`.
    #[must_use]
    pub fn aligned() -> Self {
        Self {
            // SAFETY: the object coordinate system is implictly defined, so an object whose axes
            // match In's has the identity orientation by definition.
            inner: unsafe { Rotation::identity() },
        }
    }

    /// Constructs an orientation from a (not necessarily normalized) quaternion `w + xi + yj + zk`
    /// as reported by XR platforms and scene graphs.
    #[must_use]
    pub fn from_quaternion(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self {
            // SAFETY: the object coordinate system is implictly defined, and so if we're told this
            // is the orientation of the object/body axes, then so be it.
            inner: unsafe { Rotation::from_quaternion(w, x, y, z) },
        }
    }

    /// Returns the orientation as a unit quaternion `(w, x, y, z)`.
    #[must_use]
    pub fn to_quaternion(&self) -> (f64, f64, f64, f64) {
        self.inner.to_quaternion()
    }

    /// Constructs a rotation into [`CoordinateSystem`] `To` such that `self` has an orientation of
    /// zero in `To` (ie, [`Orientation::aligned`]).
    ///
    /// # Safety
    ///
    /// See [`Pose::map_as_zero_in`]. Specifically in the case of `Orientation`, you are also
    /// asserting that _only_ rotation (ie, no translation) is needed to convert from `In` to `To`.
    #[must_use]
    pub unsafe fn map_as_zero_in<To>(self) -> Rotation<In, To> {
        Rotation {
            inner: self.inner.inner,
            from: self.inner.from,
            to: PhantomData::<To>,
        }
    }

    /// Casts the coordinate system type parameter of the orientation to the equivalent coordinate
    /// system `NewIn`.
    ///
    /// See [`EquivalentTo`] for details on when this is useful (and safe).
    #[must_use]
    pub fn cast<NewIn>(self) -> Orientation<NewIn>
    where
        In: EquivalentTo<NewIn>,
    {
        Orientation {
            inner: Rotation::from_nalgebra(self.inner.inner),
        }
    }
}

impl<In> Orientation<In>
where
    In: CoordinateSystem<Convention = RightHandedYUpLike>,
{
    /// Constructs the orientation of a camera-like object from its yaw and pitch.
    ///
    /// Yaw turns about the vertical axis (positive is counter-clockwise seen from above, ie, to
    /// the left), and pitch then tilts the line of sight about the object's own X axis (positive
    /// is up). An object with zero yaw and pitch looks along `-z`.
    #[must_use]
    pub fn from_yaw_pitch(yaw: impl Into<Angle>, pitch: impl Into<Angle>) -> Self {
        let yaw = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw.into().get::<radian>());
        let pitch =
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), pitch.into().get::<radian>());
        Self {
            inner: Rotation::from_nalgebra(yaw * pitch),
        }
    }

    /// Constructs the orientation of an object whose line of sight (`-z`) points along
    /// `direction`, keeping its body `+y` as close to world up as possible.
    ///
    /// Returns `None` if `direction` is zero or vertical.
    #[must_use]
    pub fn looking_towards(direction: Vector<In>) -> Option<Self> {
        let direction = direction.normalized()?;
        // a vertical line of sight has no well-defined roll with respect to up
        direction.horizontal_direction()?;
        Some(Self {
            inner: Rotation::from_nalgebra(UnitQuaternion::face_towards(
                &-direction.inner,
                &Vector3::y(),
            )),
        })
    }

    /// Returns the unit vector the object is looking along.
    #[must_use]
    pub fn forward(&self) -> Vector<In> {
        Vector::from_nalgebra_vector(self.inner.inner * -Vector3::z())
    }

    /// Returns the yaw of the line of sight: the signed angle about `+y` from `-z` to the
    /// horizontal projection of [`Orientation::forward`], counter-clockwise positive.
    ///
    /// Returns zero when looking straight up or down.
    #[must_use]
    pub fn yaw(&self) -> Angle {
        let forward = self.forward().inner;
        if forward.x.abs() < f64::EPSILON && forward.z.abs() < f64::EPSILON {
            return Angle::new::<radian>(0.);
        }
        Angle::new::<radian>((-forward.x).atan2(-forward.z))
    }
}

impl<In> Default for Orientation<In> {
    fn default() -> Self {
        Self::aligned()
    }
}

impl<In> Display for Orientation<In> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> AbsDiffEq<Self> for Orientation<In> {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        Rotation::<In, ObjectCoordinateSystem>::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.inner.abs_diff_eq(&other.inner, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> RelativeEq for Orientation<In> {
    fn default_max_relative() -> Self::Epsilon {
        Rotation::<In, ObjectCoordinateSystem>::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.inner.relative_eq(&other.inner, epsilon, max_relative)
    }
}

impl<From, To> Mul<Orientation<To>> for Rotation<From, To> {
    type Output = Orientation<From>;

    fn mul(self, rhs: Orientation<To>) -> Self::Output {
        Orientation {
            inner: self * rhs.inner,
        }
    }
}

/// Defines the pose (ie, position and orientation) of an object in the [`CoordinateSystem`] `In`.
///
/// <div class="warning">
///
/// Note that this type implements `Deserialize` despite having `unsafe` constructors -- this is
/// because doing otherwise would be extremely unergonomic. However, when deserializing, the
/// coordinate system of the deserialized value is _not_ checked, so this is a foot-gun to be
/// mindful of.
///
/// </div>
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
#[serde(transparent)]
pub struct Pose<In> {
    pub(crate) inner: RigidBodyTransform<In, ObjectCoordinateSystem>,
}

impl<In> Clone for Pose<In> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<In> Copy for Pose<In> {}

impl<In> PartialEq<Self> for Pose<In> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq(&other.inner)
    }
}

impl<In> Pose<In> {
    /// Constructs a pose from a position and orientation.
    #[must_use]
    pub fn new(position: Coordinate<In>, orientation: Orientation<In>) -> Self {
        Self {
            // SAFETY: the object coordinate system is implictly defined, and so if we're told this
            // is the position and orientation of the object/body axes, then so be it.
            inner: unsafe {
                RigidBodyTransform::new(Vector::from(position), orientation.map_as_zero_in())
            },
        }
    }

    /// Returns the position of the object with this pose.
    #[must_use]
    pub fn position(&self) -> Coordinate<In> {
        Coordinate::from_nalgebra_point(Point3::from(self.inner.translation().inner))
    }

    /// Returns the orientation of the object with this pose.
    #[must_use]
    pub fn orientation(&self) -> Orientation<In> {
        Orientation {
            inner: self.inner.rotation(),
        }
    }

    /// Returns a pose at `position` with this pose's orientation.
    #[must_use]
    pub fn with_position(&self, position: Coordinate<In>) -> Self {
        Self::new(position, self.orientation())
    }

    /// Returns the distance from the origin to the object with this pose.
    #[must_use]
    pub fn distance_from_origin(&self) -> Length {
        self.inner.translation().magnitude()
    }

    /// Constructs a transform into [`CoordinateSystem`] `To` such that `self` is "zero" in `To`.
    ///
    /// Less informally,
    ///
    /// - if this transform is applied to the [`Coordinate`] of this pose, it will yield
    ///   [`Coordinate::origin`], and
    /// - the inverse transform applied to [`Coordinate::origin`] for `Coordinate<To>` yields this
    ///   pose's [`Coordinate`].
    ///
    /// Or, if you prefer a more mathematical description: this defines the pose of the whole
    /// coordinate system `To` _in_ `In`.
    ///
    /// A tracked anchor is the canonical use: its pose in [`Tracking`] "maps as zero" in the frame
    /// markers registered to it are expressed in.
    ///
    /// # Safety
    ///
    /// <div class="warning">
    ///
    /// This method is the primary way in which you can end up with erroneous transforms in this
    /// crate. There is no inherent connection between, say, the tracking space and a model's local
    /// frame, so there must be a declaration _somewhere_ about how they map to each other. That's
    /// this method.
    ///
    /// It is marked as `unsafe` because creating a transform erroneously will allow converting
    /// between type-safe wrappers _without_ doing the correct corrections to their embedded data,
    /// thus defeating the type safety elsewhere.
    ///
    /// </div>
    ///
    /// # Examples
    ///
    /// ```rust
    /// use approx::assert_relative_eq;
    /// use wayfinder::engineering::{Orientation, Pose};
    /// use wayfinder::systems::{SiteLocal, Tracking};
    /// use wayfinder::Coordinate;
    /// use uom::si::f64::{Angle, Length};
    /// use uom::si::{angle::degree, length::meter};
    ///
    /// let m = |v| Length::new::<meter>(v);
    ///
    /// // an anchor was placed 2m ahead of where the session started, turned to face back
    /// let anchor = Pose::<Tracking>::new(
    ///     Coordinate::from_cartesian(m(0.), m(0.), m(-2.)),
    ///     Orientation::from_yaw_pitch(Angle::new::<degree>(180.), Angle::new::<degree>(0.)),
    /// );
    ///
    /// // SAFETY: markers registered to this anchor are laid out relative to its pose.
    /// let tracking_to_site = unsafe { anchor.map_as_zero_in::<SiteLocal>() };
    ///
    /// // a marker 1m "in front of" the anchor ends up back towards the session origin
    /// let marker = Coordinate::<SiteLocal>::from_cartesian(m(0.), m(0.), m(-1.));
    /// assert_relative_eq!(
    ///     tracking_to_site * marker,
    ///     Coordinate::from_cartesian(m(0.), m(0.), m(-1.)),
    /// );
    /// ```
    #[doc(alias = "as_transform_to")]
    #[must_use]
    pub unsafe fn map_as_zero_in<To>(self) -> RigidBodyTransform<In, To> {
        RigidBodyTransform {
            inner: self.inner.inner,
            from: self.inner.from,
            to: PhantomData::<To>,
        }
    }

    /// Casts the coordinate system type parameter of the pose to the equivalent coordinate
    /// system `NewIn`.
    ///
    /// See [`EquivalentTo`] for details on when this is useful (and safe).
    #[must_use]
    pub fn cast<NewIn>(self) -> Pose<NewIn>
    where
        In: EquivalentTo<NewIn>,
    {
        Pose {
            inner: self.inner.cast_type_of_from::<NewIn>(),
        }
    }
}

impl<In> Pose<In>
where
    In: CoordinateSystem<Convention = RightHandedYUpLike>,
{
    /// Returns the unit vector the object with this pose is looking along.
    #[must_use]
    pub fn forward(&self) -> Vector<In> {
        self.orientation().forward()
    }

    /// Constructs the pose of an object at `position` looking at `target`.
    ///
    /// Returns `None` if `target` is directly above or below `position` (or at it).
    #[must_use]
    pub fn looking_at(position: Coordinate<In>, target: Coordinate<In>) -> Option<Self> {
        Some(Self::new(
            position,
            Orientation::looking_towards(target - position)?,
        ))
    }
}

impl<In> Default for Pose<In> {
    fn default() -> Self {
        Self::new(Coordinate::default(), Orientation::default())
    }
}

impl<In> Display for Pose<In> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> AbsDiffEq<Self> for Pose<In> {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        RigidBodyTransform::<In, ObjectCoordinateSystem>::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.inner.abs_diff_eq(&other.inner, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> RelativeEq for Pose<In> {
    fn default_max_relative() -> Self::Epsilon {
        RigidBodyTransform::<In, ObjectCoordinateSystem>::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.inner.relative_eq(&other.inner, epsilon, max_relative)
    }
}

impl<From, To> Mul<RigidBodyTransform<From, To>> for Pose<From> {
    type Output = Pose<To>;

    fn mul(self, rhs: RigidBodyTransform<From, To>) -> Self::Output {
        // this is `rhs.inverse() * self`, which nalgebra lets us compute without the inverse
        // intermediate through inv_mul.
        Pose {
            inner: RigidBodyTransform {
                inner: rhs.inner.inv_mul(&self.inner.inner),
                from: rhs.to,
                to: self.inner.to,
            },
        }
    }
}

impl<From, To> Mul<Pose<To>> for RigidBodyTransform<From, To> {
    type Output = Pose<From>;

    fn mul(self, rhs: Pose<To>) -> Self::Output {
        Pose {
            inner: self * rhs.inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::coordinate_systems::{Scene, SiteLocal, Tracking};
    use crate::coordinates::Coordinate;
    use crate::engineering::{Orientation, Pose};
    use crate::math::{RigidBodyTransform, Rotation};
    use crate::vectors::Vector;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::f64::consts::FRAC_1_SQRT_2;
    use uom::si::f64::{Angle, Length};
    use uom::si::{angle::degree, length::meter};

    fn m(meters: f64) -> Length {
        Length::new::<meter>(meters)
    }
    fn d(degrees: f64) -> Angle {
        Angle::new::<degree>(degrees)
    }

    #[rstest]
    #[case(d(0.), d(0.), (0., 0., -1.))]
    // turning left by a quarter
    #[case(d(90.), d(0.), (-1., 0., 0.))]
    #[case(d(-90.), d(0.), (1., 0., 0.))]
    #[case(d(180.), d(0.), (0., 0., 1.))]
    // looking up
    #[case(d(0.), d(90.), (0., 1., 0.))]
    #[case(d(90.), d(45.), (-FRAC_1_SQRT_2, FRAC_1_SQRT_2, 0.))]
    fn yaw_pitch_forward(
        #[case] yaw: Angle,
        #[case] pitch: Angle,
        #[case] forward: (f64, f64, f64),
    ) {
        let orientation = Orientation::<Scene>::from_yaw_pitch(yaw, pitch);
        assert_relative_eq!(
            orientation.forward(),
            Vector::from_cartesian(m(forward.0), m(forward.1), m(forward.2))
        );
    }

    #[rstest]
    #[case(d(0.))]
    #[case(d(37.))]
    #[case(d(-120.))]
    fn yaw_roundtrips(#[case] yaw: Angle) {
        let orientation = Orientation::<Scene>::from_yaw_pitch(yaw, d(-20.));
        assert_relative_eq!(orientation.yaw().get::<degree>(), yaw.get::<degree>(), epsilon = 1e-9);
    }

    #[test]
    fn looking_at_points_forward_at_the_target() {
        let position = Coordinate::<Scene>::from_cartesian(m(0.), m(5.), m(8.));
        let target = Coordinate::<Scene>::origin();
        let pose = Pose::looking_at(position, target).expect("target is not straight below");
        assert_relative_eq!(
            pose.forward(),
            (target - position).normalized().expect("non-zero")
        );
        // and stays upright
        let right = pose.orientation().inner.inner * crate::Vector3::x();
        assert_relative_eq!(right.y, 0., epsilon = 1e-12);
    }

    #[test]
    fn looking_straight_down_is_undefined() {
        let position = Coordinate::<Scene>::from_cartesian(m(0.), m(5.), m(0.));
        assert!(Pose::looking_at(position, Coordinate::origin()).is_none());
        assert!(Pose::looking_at(position, position).is_none());
    }

    #[test]
    fn quaternion_roundtrip() {
        let orientation = Orientation::<Tracking>::from_yaw_pitch(d(30.), d(10.));
        let (w, x, y, z) = orientation.to_quaternion();
        assert_relative_eq!(Orientation::<Tracking>::from_quaternion(w, x, y, z), orientation);
        // non-normalized input is fine
        assert_relative_eq!(
            Orientation::<Tracking>::from_quaternion(2. * w, 2. * x, 2. * y, 2. * z),
            orientation
        );
    }

    #[test]
    fn anchor_pose_places_children() {
        let anchor = Pose::<Tracking>::new(
            Coordinate::from_cartesian(m(1.), m(0.), m(-2.)),
            Orientation::from_yaw_pitch(d(90.), d(0.)),
        );
        // SAFETY: SiteLocal is laid out relative to the anchor in this test.
        let tracking_to_site = unsafe { anchor.map_as_zero_in::<SiteLocal>() };
        assert_relative_eq!(
            anchor.position() * tracking_to_site,
            Coordinate::<SiteLocal>::origin()
        );
        // the anchor faces -x after a left quarter turn, so a child 1m ahead is at x - 1
        assert_relative_eq!(
            tracking_to_site * Coordinate::<SiteLocal>::from_cartesian(m(0.), m(0.), m(-1.)),
            Coordinate::from_cartesian(m(0.), m(0.), m(-2.))
        );
    }

    #[test]
    fn poses_transform_between_frames() {
        // SAFETY: test frames.
        let t = unsafe {
            RigidBodyTransform::<Tracking, SiteLocal>::new(
                Vector::from_cartesian(m(3.), m(0.), m(0.)),
                Rotation::about_up_axis(d(90.)),
            )
        };
        let pose = Pose::<Tracking>::new(
            Coordinate::from_cartesian(m(3.), m(1.), m(0.)),
            Orientation::from_yaw_pitch(d(90.), d(0.)),
        );
        let in_site = pose * t;
        assert_relative_eq!(
            in_site.position(),
            Coordinate::from_cartesian(m(0.), m(1.), m(0.))
        );
        assert_relative_eq!(in_site.orientation(), Orientation::aligned());
        assert_relative_eq!(t * in_site, pose);
    }

    #[test]
    fn cast_to_scene() {
        let pose = Pose::<Tracking>::new(
            Coordinate::from_cartesian(m(1.), m(1.6), m(0.)),
            Orientation::from_yaw_pitch(d(10.), d(0.)),
        );
        let scene = pose.cast::<Scene>();
        assert_eq!(scene.position(), pose.position().cast::<Scene>());
        assert_relative_eq!(
            scene.distance_from_origin().get::<meter>(),
            pose.distance_from_origin().get::<meter>()
        );
    }

    #[test]
    fn tolerances_are_plain_floats() {
        let pose = Pose::<Scene>::new(
            Coordinate::from_cartesian(m(2.), m(0.), m(-1.)),
            Orientation::from_yaw_pitch(d(45.), d(0.)),
        );
        let nudged = Pose::<Scene>::new(
            Coordinate::from_cartesian(m(2. + 1e-7), m(0.), m(-1.)),
            Orientation::from_yaw_pitch(d(45. + 1e-6), d(0.)),
        );
        assert_relative_eq!(pose, nudged, epsilon = 1e-5);
        assert_relative_eq!(pose.orientation(), nudged.orientation(), epsilon = 1e-5);
        approx::assert_relative_ne!(pose, nudged, epsilon = 1e-12, max_relative = 1e-12);
    }
}
