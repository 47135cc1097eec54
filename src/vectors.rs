use crate::coordinate_systems::{HasComponents, PlanLike, RightHandedYUpLike};
use crate::systems::EquivalentTo;
use crate::{Coordinate, CoordinateSystem, Vector3};
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::{fmt, iter::Sum};
use uom::si::f64::{Angle, Length};
use uom::si::angle::radian;
use uom::si::length::meter;

#[cfg(any(test, feature = "approx"))]
use {
    crate::Point3,
    approx::{AbsDiffEq, RelativeEq},
};

use serde::{Deserialize, Serialize};

/// Defines a vector (ie, direction with magnitude) in the coordinate system specified by `In`.
///
/// Vectors are displacements without an explicit origin: when they go through a transform only
/// the rotation (and, for [similarities](crate::math::Similarity), the scale) applies to them.
///
/// Depending on the convention of the coordinate system (eg, [`PlanLike`] or
/// [`RightHandedYUpLike`]), you'll have different appropriately-named accessors for the vector's
/// cartesian components like [`Vector::plan_x`] or [`Vector::y`].
#[derive(Debug, Serialize, Deserialize)]
// don't require In: Serialize/Deserialize since we skip it anyway
#[serde(bound = "")]
// no need for the "inner": indirection
#[serde(transparent)]
pub struct Vector<In> {
    /// X, Y, Z in meters
    pub(crate) inner: Vector3,
    #[serde(skip)]
    system: PhantomData<In>,
}

// manual impls of Clone and Copy to avoid requiring In: Copy + Clone
impl<In> Clone for Vector<In> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<In> Copy for Vector<In> {}

impl<In> Vector<In> {
    pub(crate) fn from_nalgebra_vector(value: Vector3) -> Self {
        Self {
            inner: value,
            system: PhantomData::<In>,
        }
    }

    /// Constructs a vector with the given (x, y, z) cartesian components in the
    /// [`CoordinateSystem`] `In`.
    pub fn from_cartesian(
        x: impl Into<Length>,
        y: impl Into<Length>,
        z: impl Into<Length>,
    ) -> Self {
        Self::from_nalgebra_vector(Vector3::new(
            x.into().get::<meter>(),
            y.into().get::<meter>(),
            z.into().get::<meter>(),
        ))
    }

    /// Constructs a vector from the named components of `In`'s convention.
    pub fn build(components: <In::Convention as HasComponents>::Components) -> Self
    where
        In: CoordinateSystem,
        In::Convention: HasComponents,
    {
        let [x, y, z] = components.into();
        Self::from_cartesian(x, y, z)
    }

    /// Constructs a vector in coordinate system `In` whose components are all 0.
    #[must_use]
    pub fn zero() -> Self {
        Self::from_nalgebra_vector(Vector3::zeros())
    }

    /// Casts the coordinate system type parameter of the vector to the equivalent coordinate
    /// system `NewIn`.
    ///
    /// See [`EquivalentTo`] for details on when this is useful (and safe).
    #[must_use]
    pub fn cast<NewIn>(self) -> Vector<NewIn>
    where
        In: EquivalentTo<NewIn>,
    {
        Vector {
            inner: self.inner,
            system: PhantomData::<NewIn>,
        }
    }

    /// Returns a unit vector with the same direction as this vector.
    ///
    /// Returns `None` for a zero-length vector.
    #[must_use]
    pub fn normalized(&self) -> Option<Self> {
        self.inner
            .try_normalize(f64::EPSILON)
            .map(Self::from_nalgebra_vector)
    }

    /// Computes the dot (scalar) product between this vector and another.
    ///
    /// Note that this method's return value is unitless since the unit of the dot product is not
    /// meaningful in terms of the units of the underlying components.
    #[must_use]
    pub fn dot(&self, rhs: &Self) -> f64 {
        self.inner.dot(&rhs.inner)
    }

    /// Returns the length of the vector.
    #[doc(alias = "norm")]
    #[must_use]
    pub fn magnitude(&self) -> Length {
        Length::new::<meter>(self.inner.norm())
    }

    /// Returns the cartesian components of this vector in XYZ order.
    #[must_use]
    pub fn to_cartesian(&self) -> [Length; 3] {
        [
            Length::new::<meter>(self.inner.x),
            Length::new::<meter>(self.inner.y),
            Length::new::<meter>(self.inner.z),
        ]
    }
}

impl<In> From<Coordinate<In>> for Vector<In> {
    fn from(value: Coordinate<In>) -> Self {
        Self::from_nalgebra_vector(value.point.coords)
    }
}

impl<In> Default for Vector<In> {
    fn default() -> Self {
        Self::zero()
    }
}

macro_rules! accessors {
    {
        $convention:ident
        using $x:ident, $y:ident, $z:ident
    } => {
        impl<In> Vector<In> where In: CoordinateSystem<Convention = $convention> {
            #[must_use]
            pub fn $x(&self) -> Length { Length::new::<meter>(self.inner.x) }
            #[must_use]
            pub fn $y(&self) -> Length { Length::new::<meter>(self.inner.y) }
            #[must_use]
            pub fn $z(&self) -> Length { Length::new::<meter>(self.inner.z) }
        }
    };
}

accessors!(PlanLike using plan_x, plan_y, plan_elevation);
accessors!(RightHandedYUpLike using x, y, z);

impl<In> Vector<In>
where
    In: CoordinateSystem<Convention = RightHandedYUpLike>,
{
    /// Projects the vector onto the horizontal (XZ) plane and normalizes it.
    ///
    /// Returns `None` if the vector is (near) vertical, as it then has no horizontal heading.
    #[must_use]
    pub fn horizontal_direction(&self) -> Option<Self> {
        Self::from_nalgebra_vector(Vector3::new(self.inner.x, 0., self.inner.z)).normalized()
    }

    /// Computes the signed angle on the horizontal plane from `self` to `towards`.
    ///
    /// The angle is `atan2(cross, dot)` of the two horizontal projections, with
    /// `cross = self.x·towards.z - self.z·towards.x`. Viewed from above with `-z` as "ahead",
    /// positive angles are to the right.
    ///
    /// Returns `None` if either vector has no horizontal component.
    #[must_use]
    pub fn signed_horizontal_angle_to(&self, towards: &Self) -> Option<Angle> {
        let f = self.horizontal_direction()?;
        let t = towards.horizontal_direction()?;
        let cross = f.inner.x * t.inner.z - f.inner.z * t.inner.x;
        let dot = f.inner.x * t.inner.x + f.inner.z * t.inner.z;
        Some(Angle::new::<radian>(cross.atan2(dot)))
    }
}

impl<In> Neg for Vector<In> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::from_nalgebra_vector(-self.inner)
    }
}

impl<In> Add<Self> for Vector<In> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::from_nalgebra_vector(self.inner + rhs.inner)
    }
}

impl<In> AddAssign<Self> for Vector<In> {
    fn add_assign(&mut self, rhs: Self) {
        self.inner += rhs.inner;
    }
}

impl<In> Sub<Self> for Vector<In> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::from_nalgebra_vector(self.inner - rhs.inner)
    }
}

impl<In> SubAssign<Self> for Vector<In> {
    fn sub_assign(&mut self, rhs: Self) {
        self.inner -= rhs.inner;
    }
}

impl<In> Sum for Vector<In> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, v| acc + v)
    }
}

impl<In> Mul<f64> for Vector<In> {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self::from_nalgebra_vector(self.inner * rhs)
    }
}

impl<In> PartialEq<Self> for Vector<In> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq(&other.inner)
    }
}

impl<In> Display for Vector<In> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}, {:.3}, {:.3}]",
            self.inner.x, self.inner.y, self.inner.z
        )
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> AbsDiffEq<Self> for Vector<In> {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        // meters
        0.001
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.inner.abs_diff_eq(&other.inner, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> RelativeEq for Vector<In> {
    fn default_max_relative() -> Self::Epsilon {
        Point3::default_max_relative()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate_systems::{Scene, Tracking};
    use approx::assert_relative_eq;
    use rstest::rstest;
    use uom::si::angle::degree;

    fn m(meters: f64) -> Length {
        Length::new::<meter>(meters)
    }

    fn v(x: f64, y: f64, z: f64) -> Vector<Scene> {
        Vector::from_cartesian(m(x), m(y), m(z))
    }

    #[rstest]
    // looking down -z, a target along +x is a quarter turn to the right
    #[case(v(0., 0., -1.), v(1., 0., 0.), 90.)]
    #[case(v(0., 0., -1.), v(-1., 0., 0.), -90.)]
    #[case(v(0., 0., -1.), v(0., 0., -5.), 0.)]
    #[case(v(0., 0., -1.), v(1., 0., -1.), 45.)]
    // height never matters
    #[case(v(0., 3., -1.), v(1., -7., 0.), 90.)]
    fn signed_horizontal_angle(
        #[case] forward: Vector<Scene>,
        #[case] towards: Vector<Scene>,
        #[case] expected_degrees: f64,
    ) {
        let angle = forward
            .signed_horizontal_angle_to(&towards)
            .expect("both vectors have a horizontal component");
        assert_relative_eq!(angle.get::<degree>(), expected_degrees, epsilon = 1e-9);
    }

    #[test]
    fn vertical_vectors_have_no_heading() {
        assert!(v(0., 1., 0.).horizontal_direction().is_none());
        assert!(v(0., 0., -1.)
            .signed_horizontal_angle_to(&v(0., -2., 0.))
            .is_none());
    }

    #[test]
    fn zero_vector_cannot_be_normalized() {
        assert!(Vector::<Scene>::zero().normalized().is_none());
        assert_relative_eq!(
            v(0., 0., 4.).normalized().expect("non-zero"),
            v(0., 0., 1.)
        );
    }

    #[test]
    fn arithmetic() {
        let a = v(1., 2., 3.);
        let b = v(-1., 0., 1.);
        assert_eq!(a + b, v(0., 2., 4.));
        assert_eq!(a - b, v(2., 2., 2.));
        assert_eq!(-a, v(-1., -2., -3.));
        assert_eq!(a * 2., v(2., 4., 6.));
        assert_eq!([a, b].into_iter().sum::<Vector<Scene>>(), a + b);
        assert_relative_eq!(a.dot(&b), 2.);
    }

    #[test]
    fn cast_keeps_components() {
        let t = Vector::<Tracking>::from_cartesian(m(1.), m(2.), m(3.));
        assert_eq!(t.cast::<Scene>(), v(1., 2., 3.));
    }

    #[test]
    fn display() {
        insta::assert_snapshot!(v(0.5, -1., 2.25), @"[0.500, -1.000, 2.250]");
    }
}
