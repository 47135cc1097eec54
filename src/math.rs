//! Spatial operations expressed in mathematical language.
//!
//! This module provides type-safe wrappers around the mathematical constructs that keep a campus
//! model, its rooms, and the physical world registered with one another: rotations (unit
//! quaternions), rigid body transforms (isometries), and similarities (isometries with a uniform
//! scale). For position + orientation, see [`mod engineering`](crate::engineering).
//!
//! - [`Rotation`] turns one frame into another without moving its origin.
//! - [`RigidBodyTransform`] adds a translation. Viewer poses and tracked anchors reported by an XR
//!   platform are rigid body transforms.
//! - [`Similarity`] adds a uniform scale on top. The model root transform produced by the
//!   [`ModelAligner`](crate::ModelAligner) is a similarity, since the model is rarely authored at
//!   the same scale as the room directory.
//!
//! All three implement the mathematical operations you would expect such that you can multiply
//! them together to combine them, take one's inverse, and multiply with a [`Coordinate`] or
//! [`Vector`] to transform between coordinate systems.
//!
//! <div class="warning">
//!
//! The order of the operands to `*` matter, and do not match the mathematical convention.
//! Specifically, matrix multiply for transforms traditionally have the transform on the left and
//! the vector to transform on the right. However, doing so here would lead to a type signature of
//!
//! ```rust,ignore
//! let _: Coordinate<To> = Similarity<From, To> * Coordinate<From>;
//! ```
//!
//! Which violates the expectation that a matrix multiply eliminates the "middle" component (ie,
//! (m × n)(n × p) = (m × p)). So, we require that the transform is on the _right_ to go from
//! `From` into `To`, and that the transform is on the _left_ to go from `To` into `From`.
//!
//! </div>

use crate::coordinate_systems::EquivalentTo;
use crate::coordinates::Coordinate;
use crate::vectors::Vector;
use crate::{Isometry3, Similarity3, UnitQuaternion, Vector3};
use nalgebra::{Quaternion, Translation3};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::ops::{Mul, Neg};
use uom::si::angle::radian;
use uom::si::f64::Angle;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

use serde::{Deserialize, Serialize};

#[cfg(doc)]
use crate::{engineering, CoordinateSystem};

/// Defines a [rotation transform] between two [`CoordinateSystem`]s.
///
/// Mathematically speaking, this is a type-safe wrapper around a [unit quaternion].
///
/// <div class="warning">
///
/// Note that this type implements `Deserialize` despite having `unsafe` constructors -- this is
/// because doing otherwise would be extremely unergonomic. However, when deserializing, the
/// coordinate system of the deserialized value is _not_ checked, so this is a foot-gun to be
/// mindful of.
///
/// </div>
///
/// [rotation transform]: https://en.wikipedia.org/wiki/Rotation
/// [unit quaternion]: https://en.wikipedia.org/wiki/Versor
#[derive(Debug, Serialize, Deserialize)]
// don't require From/To: Serialize/Deserialize since we skip it anyway
#[serde(bound = "")]
// no need for the "inner": indirection
#[serde(transparent)]
pub struct Rotation<From, To> {
    /// This is _actually_ the rotation from `To` into `From`, ie, the orientation of `To`'s axes
    /// expressed in `From`. Going from `From` to `To` therefore uses the _inverse_ of `inner`, and
    /// going the other way uses `inner` directly. You'll see this across the `impl Mul`s further
    /// down.
    pub(crate) inner: UnitQuaternion,
    #[serde(skip)]
    pub(crate) from: PhantomData<From>,
    #[serde(skip)]
    pub(crate) to: PhantomData<To>,
}

// manual impls of Clone and Copy to avoid requiring From/To: Copy + Clone
impl<From, To> Clone for Rotation<From, To> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<From, To> Copy for Rotation<From, To> {}

impl<From, To> PartialEq<Self> for Rotation<From, To> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq(&other.inner)
    }
}

impl<From, To> Display for Rotation<From, To> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let q = self.inner.quaternion();
        write!(
            f,
            "Quaternion: [{:.4}, {:.4}, {:.4}, {:.4}]",
            q.w, q.i, q.j, q.k
        )
    }
}

impl<From, To> Rotation<From, To> {
    pub(crate) fn from_nalgebra(inner: UnitQuaternion) -> Self {
        Self {
            inner,
            from: PhantomData::<From>,
            to: PhantomData::<To>,
        }
    }

    /// Constructs the rotation of `To` in `From` as a turn of `angle` about the vertical (+Y)
    /// axis, following the right-hand rule (ie, counter-clockwise seen from above).
    ///
    /// # Safety
    ///
    /// Calling this method asserts that the given turn is a correct way to transform any input
    /// from `From` to `To` (and crucially, that no translation is needed). If it is not, this
    /// allows moving values between different coordinate system types without adjusting the
    /// values correctly, leading to a defeat of their type safety.
    #[must_use]
    pub unsafe fn about_up_axis(angle: impl Into<Angle>) -> Self {
        Self::from_nalgebra(UnitQuaternion::from_axis_angle(
            &Vector3::y_axis(),
            angle.into().get::<radian>(),
        ))
    }

    /// Constructs a rotation from a (not necessarily normalized) quaternion `w + xi + yj + zk`.
    ///
    /// This is how XR platforms and scene graphs usually report orientations.
    ///
    /// # Safety
    ///
    /// Like [`Rotation::about_up_axis`], this asserts that the quaternion is the orientation of
    /// `To` in `From`.
    #[must_use]
    pub unsafe fn from_quaternion(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self::from_nalgebra(UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)))
    }

    /// Asserts that the rotational transform from `From` to `To` is one that returns the original
    /// point or vector when applied.
    ///
    /// # Safety
    ///
    /// This allows you to claim that the "correct" rotational transform between the coordinate
    /// systems `From` and `To` is the identity function. If it is not, this allows moving values
    /// between different coordinate system types without adjusting them, defeating type safety.
    #[must_use]
    pub unsafe fn identity() -> Self {
        Self::from_nalgebra(UnitQuaternion::identity())
    }

    /// Casts the coordinate system type parameter `To` of the rotation to the equivalent
    /// coordinate system `AlsoTo`.
    #[must_use]
    pub fn cast_type_of_to<AlsoTo>(self) -> Rotation<From, AlsoTo>
    where
        To: EquivalentTo<AlsoTo>,
    {
        Rotation::from_nalgebra(self.inner)
    }

    /// Returns the equal-but-opposite transform to this one.
    ///
    /// That is, a rotation _from_ the [`CoordinateSystem`] `To` _into_ the coordinate system
    /// `From`.
    #[must_use]
    pub fn inverse(&self) -> Rotation<To, From> {
        Rotation::from_nalgebra(self.inner.inverse())
    }

    /// Returns the quaternion `(w, x, y, z)` of the orientation of `To` in `From`.
    #[must_use]
    pub fn to_quaternion(&self) -> (f64, f64, f64, f64) {
        let q = self.inner.quaternion();
        (q.w, q.i, q.j, q.k)
    }

    /// Transforms an element in [`CoordinateSystem`] `From` into `To`.
    pub fn transform<T>(&self, in_from: T) -> <T as Mul<Self>>::Output
    where
        T: Mul<Self>,
    {
        in_from * *self
    }

    /// Transforms an element in [`CoordinateSystem`] `To` into `From`.
    pub fn inverse_transform<T>(&self, in_to: T) -> <Self as Mul<T>>::Output
    where
        Self: Mul<T>,
    {
        *self * in_to
    }
}

#[cfg(any(test, feature = "approx"))]
impl<From, To> AbsDiffEq<Self> for Rotation<From, To> {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        UnitQuaternion::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.inner.abs_diff_eq(&other.inner, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<From, To> RelativeEq for Rotation<From, To> {
    fn default_max_relative() -> Self::Epsilon {
        UnitQuaternion::default_max_relative()
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

// Rotation<From, Over> * Rotation<Over, To> -> Rotation<From, To>
impl<From, Over, To> Mul<Rotation<Over, To>> for Rotation<From, Over> {
    type Output = Rotation<From, To>;

    fn mul(self, rhs: Rotation<Over, To>) -> Self::Output {
        Rotation::from_nalgebra(self.inner * rhs.inner)
    }
}

/// Defines a transform (ie, [isometry]) between two [`CoordinateSystem`]s.
///
/// The easiest way to construct one is with [`engineering::Pose::map_as_zero_in`], which turns,
/// say, the tracked pose of an anchor into a transform between the reference space and the
/// anchor's own frame.
///
/// [isometry]: https://en.wikipedia.org/wiki/Rigid_transformation
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
#[serde(transparent)]
pub struct RigidBodyTransform<From, To> {
    /// This is _actually_ the isometry from `To` into `From`, which means we need to take the
    /// _inverse_ transform to go from `From` into `To`. For more details about this, see the docs
    /// on `Rotation.inner`.
    pub(crate) inner: Isometry3,
    #[serde(skip)]
    pub(crate) from: PhantomData<From>,
    #[serde(skip)]
    pub(crate) to: PhantomData<To>,
}

impl<From, To> Clone for RigidBodyTransform<From, To> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<From, To> Copy for RigidBodyTransform<From, To> {}

impl<From, To> RigidBodyTransform<From, To> {
    pub(crate) fn from_nalgebra(inner: Isometry3) -> Self {
        Self {
            inner,
            from: PhantomData::<From>,
            to: PhantomData::<To>,
        }
    }

    /// Constructs a transform directly from a translation and a rotation.
    ///
    /// The translation here should be what must be applied to coordinates and vectors in `To` to
    /// transform them into coordinates and vectors in `From`. In other words, the _inverse_ of
    /// this translation and rotation will be applied in the `transform` methods to go from `From`
    /// to `To`.
    ///
    /// # Safety
    ///
    /// This method is marked as `unsafe` for the same reason [`engineering::Pose::map_as_zero_in`]
    /// is; if you construct a transform incorrectly, it allows moving between different
    /// type-enforced coordinate systems without performing the correct conversions, leading to a
    /// defeat of type safety.
    #[must_use]
    pub unsafe fn new(translation: Vector<From>, rotation: Rotation<From, To>) -> Self {
        Self::from_nalgebra(Isometry3::from_parts(
            Translation3::from(translation.inner),
            rotation.inner,
        ))
    }

    /// Asserts that the transform from `From` to `To` is one that returns the original point or
    /// vector when applied.
    ///
    /// # Safety
    ///
    /// This allows you to claim that the "correct" transform between the coordinate systems `From`
    /// and `To` is the identity function. If this is _not_ the correct transform, then this allows
    /// moving values between different coordinate system types without adjusting the values
    /// correctly, leading to a defeat of their type safety.
    #[must_use]
    pub unsafe fn identity() -> Self {
        Self::from_nalgebra(Isometry3::identity())
    }

    /// Chains two transforms to produce a new transform that can transform directly from `From` to
    /// `NewTo`.
    pub fn and_then<NewTo, Transform>(self, rhs: Transform) -> RigidBodyTransform<From, NewTo>
    where
        Self: Mul<Transform, Output = RigidBodyTransform<From, NewTo>>,
    {
        self * rhs
    }

    /// Casts the coordinate system type parameter `From` of the transform to the equivalent
    /// coordinate system `AlsoFrom`.
    ///
    /// See [`EquivalentTo`] for details on when this is useful (and safe).
    #[must_use]
    pub fn cast_type_of_from<AlsoFrom>(self) -> RigidBodyTransform<AlsoFrom, To>
    where
        From: EquivalentTo<AlsoFrom>,
    {
        RigidBodyTransform::from_nalgebra(self.inner)
    }

    /// Casts the coordinate system type parameter `To` of the transform to the equivalent
    /// coordinate system `AlsoTo`.
    #[must_use]
    pub fn cast_type_of_to<AlsoTo>(self) -> RigidBodyTransform<From, AlsoTo>
    where
        To: EquivalentTo<AlsoTo>,
    {
        RigidBodyTransform::from_nalgebra(self.inner)
    }

    /// Returns the equal-but-opposite transform to this one.
    ///
    /// That is, a transform _from_ the [`CoordinateSystem`] `To` _into_ the coordinate system
    /// `From`.
    #[must_use]
    pub fn inverse(&self) -> RigidBodyTransform<To, From> {
        RigidBodyTransform::from_nalgebra(self.inner.inverse())
    }

    /// Returns the translation of [`Coordinate::origin`] in `To` relative to the
    /// [`Coordinate::origin`] in `From`.
    #[must_use]
    pub fn translation(&self) -> Vector<From> {
        Vector::from_nalgebra_vector(self.inner.translation.vector)
    }

    /// Returns the rotation of the coordinate system `To` with respect to the coordinate system
    /// `From`.
    #[must_use]
    pub fn rotation(&self) -> Rotation<From, To> {
        Rotation::from_nalgebra(self.inner.rotation)
    }

    /// Transforms an element in [`CoordinateSystem`] `From` into `To`.
    ///
    /// <div class="warning">
    ///
    /// Note that this transformation behaves differently for vectors than it does for coordinates.
    /// A vector defines a displacement _without an explicit origin_, so it is only subjected to
    /// the rotation part of the transform.
    ///
    /// </div>
    #[doc(alias = "apply")]
    pub fn transform<T>(&self, in_from: T) -> <T as Mul<Self>>::Output
    where
        T: Mul<Self>,
    {
        in_from * *self
    }

    /// Transforms an element in [`CoordinateSystem`] `To` into `From`.
    ///
    /// This is equivalent to (but more efficient than) first inverting the transform with
    /// [`RigidBodyTransform::inverse`] and then calling [`RigidBodyTransform::transform`].
    #[doc(alias = "undo")]
    pub fn inverse_transform<T>(&self, in_to: T) -> <Self as Mul<T>>::Output
    where
        Self: Mul<T>,
    {
        *self * in_to
    }
}

impl<From, To> PartialEq<Self> for RigidBodyTransform<From, To> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq(&other.inner)
    }
}

impl<From, To> Display for RigidBodyTransform<From, To> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Position: {}, Orientation: {}",
            self.translation(),
            self.rotation()
        )
    }
}

impl<From, To> Neg for RigidBodyTransform<From, To> {
    type Output = RigidBodyTransform<To, From>;

    fn neg(self) -> Self::Output {
        self.inverse()
    }
}

#[cfg(any(test, feature = "approx"))]
impl<From, To> AbsDiffEq<Self> for RigidBodyTransform<From, To> {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        Isometry3::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.inner.abs_diff_eq(&other.inner, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<From, To> RelativeEq for RigidBodyTransform<From, To> {
    fn default_max_relative() -> Self::Epsilon {
        Isometry3::default_max_relative()
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

/// Defines a [similarity] (ie, uniform scale, rotation, and translation; no shear) between two
/// [`CoordinateSystem`]s.
///
/// Like [`RigidBodyTransform`], what is stored is the pose of `To` in `From`: a point in `To`
/// is scaled, rotated, and then translated to land in `From`. Transforming from `From` into `To`
/// applies the inverse.
///
/// ```rust
/// use approx::assert_relative_eq;
/// use wayfinder::{Coordinate, Vector, math::{Rotation, Similarity}, systems::{ModelLocal, Scene}};
/// use uom::si::{f64::Length, length::meter};
///
/// let m = |v| Length::new::<meter>(v);
/// // the model is twice as large in the scene as it was authored, and sits 1m to the right
/// // SAFETY: this is how the model root is placed in this example's scene.
/// let model_root = unsafe {
///     Similarity::<Scene, ModelLocal>::new(
///         Vector::from_cartesian(m(1.), m(0.), m(0.)),
///         Rotation::identity(),
///         2.,
///     )
/// };
/// let vertex = Coordinate::<ModelLocal>::from_cartesian(m(1.), m(1.), m(0.));
/// let in_scene: Coordinate<Scene> = model_root * vertex;
/// assert_relative_eq!(in_scene, Coordinate::from_cartesian(m(3.), m(2.), m(0.)));
/// ```
///
/// [similarity]: https://en.wikipedia.org/wiki/Similarity_(geometry)
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
#[serde(transparent)]
pub struct Similarity<From, To> {
    /// The similarity from `To` into `From`; see `Rotation.inner`.
    pub(crate) inner: Similarity3,
    #[serde(skip)]
    pub(crate) from: PhantomData<From>,
    #[serde(skip)]
    pub(crate) to: PhantomData<To>,
}

impl<From, To> Clone for Similarity<From, To> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<From, To> Copy for Similarity<From, To> {}

impl<From, To> Similarity<From, To> {
    pub(crate) fn from_nalgebra(inner: Similarity3) -> Self {
        Self {
            inner,
            from: PhantomData::<From>,
            to: PhantomData::<To>,
        }
    }

    /// Constructs a similarity from a translation, a rotation, and a uniform scale.
    ///
    /// Points in `To` are first scaled by `scale`, then rotated by `rotation`, then translated by
    /// `translation` to yield points in `From`.
    ///
    /// Returns the identity-scaled similarity if `scale` is not a finite, strictly positive
    /// number; reflections and collapses are never represented.
    ///
    /// # Safety
    ///
    /// As for [`RigidBodyTransform::new`], constructing a similarity asserts that it correctly
    /// relates `From` and `To`.
    #[must_use]
    pub unsafe fn new(translation: Vector<From>, rotation: Rotation<From, To>, scale: f64) -> Self {
        let scale = if scale.is_finite() && scale > 0. {
            scale
        } else {
            1.
        };
        Self::from_nalgebra(Similarity3::from_parts(
            Translation3::from(translation.inner),
            rotation.inner,
            scale,
        ))
    }

    /// Asserts that `From` and `To` are the same frame.
    ///
    /// # Safety
    ///
    /// See [`RigidBodyTransform::identity`].
    #[must_use]
    pub unsafe fn identity() -> Self {
        Self::from_nalgebra(Similarity3::identity())
    }

    /// Chains two transforms to produce a new similarity that transforms directly from `From` to
    /// `NewTo`.
    pub fn and_then<NewTo, Transform>(self, rhs: Transform) -> Similarity<From, NewTo>
    where
        Self: Mul<Transform, Output = Similarity<From, NewTo>>,
    {
        self * rhs
    }

    /// Casts the coordinate system type parameter `To` of the similarity to the equivalent
    /// coordinate system `AlsoTo`.
    #[must_use]
    pub fn cast_type_of_to<AlsoTo>(self) -> Similarity<From, AlsoTo>
    where
        To: EquivalentTo<AlsoTo>,
    {
        Similarity::from_nalgebra(self.inner)
    }

    /// Casts the coordinate system type parameter `From` of the similarity to the equivalent
    /// coordinate system `AlsoFrom`.
    #[must_use]
    pub fn cast_type_of_from<AlsoFrom>(self) -> Similarity<AlsoFrom, To>
    where
        From: EquivalentTo<AlsoFrom>,
    {
        Similarity::from_nalgebra(self.inner)
    }

    /// Returns the equal-but-opposite transform to this one.
    #[must_use]
    pub fn inverse(&self) -> Similarity<To, From> {
        Similarity::from_nalgebra(self.inner.inverse())
    }

    /// Returns the uniform scale applied to points in `To` to express them in `From`.
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.inner.scaling()
    }

    /// Returns the translation of `To`'s origin in `From`.
    #[must_use]
    pub fn translation(&self) -> Vector<From> {
        Vector::from_nalgebra_vector(self.inner.isometry.translation.vector)
    }

    /// Returns the rotation of the coordinate system `To` with respect to `From`.
    #[must_use]
    pub fn rotation(&self) -> Rotation<From, To> {
        Rotation::from_nalgebra(self.inner.isometry.rotation)
    }

    /// Returns the column-major 4×4 homogeneous matrix that maps points in `To` into `From`.
    ///
    /// This is the layout scene graphs expect for a node's local matrix.
    #[must_use]
    pub fn to_column_major(&self) -> [f64; 16] {
        let m = self.inner.to_homogeneous();
        let mut out = [0.; 16];
        out.copy_from_slice(m.as_slice());
        out
    }

    /// Transforms an element in [`CoordinateSystem`] `From` into `To`.
    pub fn transform<T>(&self, in_from: T) -> <T as Mul<Self>>::Output
    where
        T: Mul<Self>,
    {
        in_from * *self
    }

    /// Transforms an element in [`CoordinateSystem`] `To` into `From`.
    pub fn inverse_transform<T>(&self, in_to: T) -> <Self as Mul<T>>::Output
    where
        Self: Mul<T>,
    {
        *self * in_to
    }
}

impl<From, To> std::convert::From<RigidBodyTransform<From, To>> for Similarity<From, To> {
    fn from(value: RigidBodyTransform<From, To>) -> Self {
        Similarity::from_nalgebra(Similarity3::from_isometry(value.inner, 1.))
    }
}

impl<From, To> PartialEq<Self> for Similarity<From, To> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq(&other.inner)
    }
}

impl<From, To> Display for Similarity<From, To> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Position: {}, Orientation: {}, Scale: {:.4}",
            self.translation(),
            self.rotation(),
            self.scale()
        )
    }
}

#[cfg(any(test, feature = "approx"))]
impl<From, To> AbsDiffEq<Self> for Similarity<From, To> {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        Similarity3::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.inner.abs_diff_eq(&other.inner, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<From, To> RelativeEq for Similarity<From, To> {
    fn default_max_relative() -> Self::Epsilon {
        Similarity3::default_max_relative()
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

// recall from the docs on `Rotation.inner` that conversions of `From` -> `To` use _inverse_
// transforms, and conversions from `To` -> `From` use regular `transform`.
//
// further recall that we want to have eliminated "dimensions" be adjacent in the input to match
// matrix expectations (ie, (m × n)(n × p) = (m × p)).
macro_rules! point_and_vector_muls {
    ($transform:ident) => {
        // Coordinate<From> * T<From, To> -> Coordinate<To>
        impl<From, To> Mul<$transform<From, To>> for Coordinate<From> {
            type Output = Coordinate<To>;

            fn mul(self, rhs: $transform<From, To>) -> Self::Output {
                Coordinate::from_nalgebra_point(rhs.inner.inverse_transform_point(&self.point))
            }
        }

        // T<From, To> * Coordinate<To> -> Coordinate<From>
        impl<From, To> Mul<Coordinate<To>> for $transform<From, To> {
            type Output = Coordinate<From>;

            fn mul(self, rhs: Coordinate<To>) -> Self::Output {
                Coordinate::from_nalgebra_point(self.inner.transform_point(&rhs.point))
            }
        }

        impl<From, To> Mul<$transform<From, To>> for Vector<From> {
            type Output = Vector<To>;

            fn mul(self, rhs: $transform<From, To>) -> Self::Output {
                Vector::from_nalgebra_vector(rhs.inner.inverse_transform_vector(&self.inner))
            }
        }

        impl<From, To> Mul<Vector<To>> for $transform<From, To> {
            type Output = Vector<From>;

            fn mul(self, rhs: Vector<To>) -> Self::Output {
                Vector::from_nalgebra_vector(self.inner.transform_vector(&rhs.inner))
            }
        }
    };
}

point_and_vector_muls!(Rotation);
point_and_vector_muls!(RigidBodyTransform);
point_and_vector_muls!(Similarity);

// T<From, Over> * T<Over, To> -> T<From, To>
//
// like for Rotation, a transform chain is a matrix multiply, so the ordering of the operands
// stays the same. mixing in a similarity anywhere yields a similarity.
impl<From, Over, To> Mul<RigidBodyTransform<Over, To>> for RigidBodyTransform<From, Over> {
    type Output = RigidBodyTransform<From, To>;

    fn mul(self, rhs: RigidBodyTransform<Over, To>) -> Self::Output {
        RigidBodyTransform::from_nalgebra(self.inner * rhs.inner)
    }
}

impl<From, Over, To> Mul<Rotation<Over, To>> for RigidBodyTransform<From, Over> {
    type Output = RigidBodyTransform<From, To>;

    fn mul(self, rhs: Rotation<Over, To>) -> Self::Output {
        RigidBodyTransform::from_nalgebra(self.inner * rhs.inner)
    }
}

impl<From, Over, To> Mul<Similarity<Over, To>> for Similarity<From, Over> {
    type Output = Similarity<From, To>;

    fn mul(self, rhs: Similarity<Over, To>) -> Self::Output {
        Similarity::from_nalgebra(self.inner * rhs.inner)
    }
}

impl<From, Over, To> Mul<RigidBodyTransform<Over, To>> for Similarity<From, Over> {
    type Output = Similarity<From, To>;

    fn mul(self, rhs: RigidBodyTransform<Over, To>) -> Self::Output {
        Similarity::from_nalgebra(self.inner * rhs.inner)
    }
}

impl<From, Over, To> Mul<Similarity<Over, To>> for RigidBodyTransform<From, Over> {
    type Output = Similarity<From, To>;

    fn mul(self, rhs: Similarity<Over, To>) -> Self::Output {
        Similarity::from_nalgebra(self.inner * rhs.inner)
    }
}

#[cfg(test)]
mod tests {
    use crate::coordinate_systems::{ModelLocal, Scene, SiteLocal, Tracking};
    use crate::coordinates::Coordinate;
    use crate::math::{RigidBodyTransform, Rotation, Similarity};
    use crate::vectors::Vector;
    use crate::Point3;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use uom::si::f64::{Angle, Length};
    use uom::si::{angle::degree, length::meter};

    fn m(meters: f64) -> Length {
        Length::new::<meter>(meters)
    }
    fn d(degrees: f64) -> Angle {
        Angle::new::<degree>(degrees)
    }

    #[rstest]
    // Given as coordinates in To -> turn of To in From -> coordinates in From
    #[case(Point3::new(1., 0., 0.), d(0.), Point3::new(1., 0., 0.))]
    // a quarter turn counter-clockwise seen from above takes +x to -z
    #[case(Point3::new(1., 0., 0.), d(90.), Point3::new(0., 0., -1.))]
    #[case(Point3::new(0., 0., -1.), d(90.), Point3::new(-1., 0., 0.))]
    #[case(Point3::new(1., 0., 0.), d(180.), Point3::new(-1., 0., 0.))]
    // height is unaffected
    #[case(Point3::new(0., 2., 0.), d(73.), Point3::new(0., 2., 0.))]
    fn about_up_axis(#[case] in_to: Point3, #[case] angle: Angle, #[case] in_from: Point3) {
        // SAFETY: test frames.
        let rotation = unsafe { Rotation::<Scene, ModelLocal>::about_up_axis(angle) };
        let p = Coordinate::<ModelLocal>::from_nalgebra_point(in_to);
        assert_relative_eq!(
            rotation * p,
            Coordinate::<Scene>::from_nalgebra_point(in_from)
        );
        // and back again
        assert_relative_eq!(Coordinate::<Scene>::from_nalgebra_point(in_from) * rotation, p);
    }

    #[test]
    fn similarity_scales_rotates_then_translates() {
        // SAFETY: test frames.
        let sim = unsafe {
            Similarity::<Scene, ModelLocal>::new(
                Vector::from_cartesian(m(10.), m(1.), m(0.)),
                Rotation::about_up_axis(d(90.)),
                3.,
            )
        };
        let p = Coordinate::<ModelLocal>::from_cartesian(m(1.), m(1.), m(0.));
        assert_relative_eq!(sim * p, Coordinate::from_cartesian(m(10.), m(4.), m(-3.)));
        assert_relative_eq!(sim.transform(sim * p), p);
        assert_relative_eq!(p * sim.inverse(), sim * p);
    }

    #[test]
    fn similarity_rejects_degenerate_scale() {
        for scale in [0., -2., f64::NAN, f64::INFINITY] {
            // SAFETY: test frames.
            let sim = unsafe {
                Similarity::<Scene, ModelLocal>::new(Vector::zero(), Rotation::identity(), scale)
            };
            assert_eq!(sim.scale(), 1.);
        }
    }

    #[test]
    fn vectors_are_scaled_and_rotated_but_not_translated() {
        // SAFETY: test frames.
        let sim = unsafe {
            Similarity::<Scene, ModelLocal>::new(
                Vector::from_cartesian(m(100.), m(100.), m(100.)),
                Rotation::about_up_axis(d(180.)),
                2.,
            )
        };
        let v = Vector::<ModelLocal>::from_cartesian(m(1.), m(0.), m(0.));
        assert_relative_eq!(sim * v, Vector::from_cartesian(m(-2.), m(0.), m(0.)));
    }

    #[test]
    fn chaining_matches_sequential_application() {
        // SAFETY: test frames.
        let (root, anchor) = unsafe {
            (
                Similarity::<Scene, ModelLocal>::new(
                    Vector::from_cartesian(m(1.), m(0.), m(2.)),
                    Rotation::about_up_axis(d(30.)),
                    0.5,
                ),
                RigidBodyTransform::<ModelLocal, SiteLocal>::new(
                    Vector::from_cartesian(m(0.), m(1.), m(0.)),
                    Rotation::about_up_axis(d(-45.)),
                ),
            )
        };
        let p = Coordinate::<SiteLocal>::from_cartesian(m(3.), m(-1.), m(7.));
        let chained = root.and_then(anchor);
        assert_relative_eq!(chained * p, root * (anchor * p));
        assert_relative_eq!(p * chained.inverse(), chained * p);
    }

    #[test]
    fn rigid_body_inverse_roundtrip() {
        // SAFETY: test frames.
        let t = unsafe {
            RigidBodyTransform::<Tracking, SiteLocal>::new(
                Vector::from_cartesian(m(2.), m(0.), m(-1.)),
                Rotation::about_up_axis(d(12.)),
            )
        };
        let p = Coordinate::<Tracking>::from_cartesian(m(1.), m(2.), m(3.));
        assert_relative_eq!(t * (p * t), p);
        assert_relative_eq!((-t) * p, p * t);
    }

    #[test]
    fn column_major_layout_puts_translation_last() {
        // SAFETY: test frames.
        let sim = unsafe {
            Similarity::<Scene, ModelLocal>::new(
                Vector::from_cartesian(m(4.), m(5.), m(6.)),
                Rotation::identity(),
                2.,
            )
        };
        let matrix = sim.to_column_major();
        assert_eq!(&matrix[12..15], &[4., 5., 6.]);
        assert_eq!(matrix[0], 2.);
        assert_eq!(matrix[15], 1.);
    }

    #[test]
    fn display() {
        // SAFETY: test frames.
        let sim = unsafe {
            Similarity::<Scene, ModelLocal>::new(
                Vector::from_cartesian(m(1.), m(0.), m(0.)),
                Rotation::identity(),
                0.9,
            )
        };
        insta::assert_snapshot!(
            sim,
            @"Position: [1.000, 0.000, 0.000], Orientation: Quaternion: [1.0000, 0.0000, 0.0000, 0.0000], Scale: 0.9000"
        );
    }
}
