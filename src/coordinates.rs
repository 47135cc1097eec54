use crate::coordinate_systems::{CoordinateSystem, HasComponents, PlanLike, RightHandedYUpLike};
use crate::systems::EquivalentTo;
use crate::vectors::Vector;
use crate::Point3;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use uom::si::f64::Length;
use uom::si::length::meter;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

use serde::{Deserialize, Serialize};

/// Defines a point (ie, position) in the coordinate system specified by `In`.
///
/// Depending on the convention of the coordinate system (eg, [`PlanLike`] or
/// [`RightHandedYUpLike`]), you'll have different appropriately-named accessors for the
/// coordinate's cartesian components like [`Coordinate::plan_x`] or [`Coordinate::y`].
///
/// <div class="warning">
///
/// Note that this type implements `Deserialize` even though the coordinate system is only a type
/// parameter. When deserializing, the coordinate system of the deserialized value is _not_
/// checked, so this is a foot-gun to be mindful of.
///
/// </div>
#[derive(Debug, Serialize, Deserialize)]
// don't require In: Serialize/Deserialize since we skip it anyway
#[serde(bound = "")]
// no need for the "point": indirection
#[serde(transparent)]
pub struct Coordinate<In> {
    /// X, Y, Z in meters
    pub(crate) point: Point3,
    #[serde(skip)]
    system: PhantomData<In>,
}

// manual impls of Clone and Copy to avoid requiring In: Copy + Clone
impl<In> Clone for Coordinate<In> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<In> Copy for Coordinate<In> {}

impl<In> Coordinate<In> {
    pub(crate) fn from_nalgebra_point(p: Point3) -> Self {
        Self {
            point: p,
            system: PhantomData,
        }
    }

    /// Constructs a coordinate at the given (x, y, z) cartesian point in the [`CoordinateSystem`]
    /// `In`.
    ///
    /// The meaning of `x`, `y`, and `z` is dictated by the [`CoordinateSystem::Convention`] of
    /// `In`. For example, in [`RightHandedYUpLike`], `y` is up, whereas in [`PlanLike`] `z` is the
    /// elevation.
    pub fn from_cartesian(
        x: impl Into<Length>,
        y: impl Into<Length>,
        z: impl Into<Length>,
    ) -> Self {
        Self::from_nalgebra_point(Point3::new(
            x.into().get::<meter>(),
            y.into().get::<meter>(),
            z.into().get::<meter>(),
        ))
    }

    /// Constructs a coordinate from the named components of `In`'s convention.
    ///
    /// ```rust
    /// use wayfinder::{Coordinate, systems::{Scene, YUpComponents}};
    /// use uom::si::{f64::Length, length::meter};
    ///
    /// let p = Coordinate::<Scene>::build(YUpComponents {
    ///     x: Length::new::<meter>(1.),
    ///     y: Length::new::<meter>(2.),
    ///     z: Length::new::<meter>(3.),
    /// });
    /// assert_eq!(p.y(), Length::new::<meter>(2.));
    /// ```
    pub fn build(components: <In::Convention as HasComponents>::Components) -> Self
    where
        In: CoordinateSystem,
        In::Convention: HasComponents,
    {
        let [x, y, z] = components.into();
        Self::from_cartesian(x, y, z)
    }

    /// Constructs a coordinate at the origin of the coordinate system `In`.
    ///
    /// ```rust
    /// use wayfinder::{Coordinate, systems::Scene};
    /// use uom::si::{f64::Length, length::meter};
    ///
    /// let zero = Length::new::<meter>(0.);
    /// assert_eq!(
    ///     Coordinate::<Scene>::origin(),
    ///     Coordinate::<Scene>::from_cartesian(zero, zero, zero),
    /// );
    /// ```
    #[must_use]
    pub fn origin() -> Self {
        Self {
            point: Point3::origin(),
            system: PhantomData,
        }
    }

    /// Casts the coordinate system type parameter of the coordinate to the equivalent coordinate
    /// system `NewIn`.
    ///
    /// See [`EquivalentTo`] for details on when this is useful (and safe).
    ///
    /// Note that this performs no transform on the coordinate's components, as that should be
    /// unnecessary when `EquivalentTo` is implemented.
    #[must_use]
    pub fn cast<NewIn>(self) -> Coordinate<NewIn>
    where
        In: EquivalentTo<NewIn>,
    {
        Coordinate {
            point: self.point,
            system: PhantomData::<NewIn>,
        }
    }

    /// Linearly interpolate between this coordinate and another coordinate.
    ///
    /// Specifically, returns `self * (1.0 - t) + rhs * t`, i.e., the linear blend of the
    /// two coordinates using the scalar value `t`.
    ///
    /// The value for `t` is not restricted to the range [0, 1].
    #[must_use]
    pub fn lerp(&self, rhs: &Self, t: f64) -> Self {
        Self {
            point: self.point.lerp(&rhs.point, t),
            system: self.system,
        }
    }
}

impl<In> Default for Coordinate<In> {
    fn default() -> Self {
        Self::origin()
    }
}

macro_rules! accessors {
    {
        $convention:ident
        using $x:ident, $y:ident, $z:ident
    } => {
        impl<In> Coordinate<In> where In: CoordinateSystem<Convention = $convention> {
            #[must_use]
            pub fn $x(&self) -> Length { Length::new::<meter>(self.point.x) }
            #[must_use]
            pub fn $y(&self) -> Length { Length::new::<meter>(self.point.y) }
            #[must_use]
            pub fn $z(&self) -> Length { Length::new::<meter>(self.point.z) }
        }
    };
}

// NOTE: plan accessors carry a prefix since inherent methods of the same name in two impl blocks
// are rejected even when the where-clauses can never overlap.
accessors!(PlanLike using plan_x, plan_y, plan_elevation);
accessors!(RightHandedYUpLike using x, y, z);

impl<In> Coordinate<In>
where
    In: CoordinateSystem<Convention = RightHandedYUpLike>,
{
    /// Returns this coordinate with its height dropped, ie, projected onto the floor plane.
    #[must_use]
    pub fn on_floor(&self) -> Self {
        Self::from_nalgebra_point(Point3::new(self.point.x, 0., self.point.z))
    }

    /// Computes the distance between this point and `other` when both are projected onto the
    /// horizontal (XZ) plane.
    #[must_use]
    pub fn horizontal_distance_from(&self, other: &Self) -> Length {
        (other.on_floor() - self.on_floor()).magnitude()
    }
}

impl<In> Coordinate<In> {
    /// Returns the cartesian components of this coordinate in XYZ order.
    #[doc(alias = "components")]
    #[must_use]
    pub fn to_cartesian(&self) -> [Length; 3] {
        [
            Length::new::<meter>(self.point.x),
            Length::new::<meter>(self.point.y),
            Length::new::<meter>(self.point.z),
        ]
    }

    /// Computes the distance of this point from the coordinate system's origin.
    #[doc(alias = "norm")]
    #[must_use]
    pub fn distance_from_origin(&self) -> Length {
        Length::new::<meter>(self.point.coords.norm())
    }

    /// Computes the straight-line distance between this point and the given point.
    ///
    /// ```rust
    /// use wayfinder::{Coordinate, systems::Scene};
    /// use uom::si::{f64::Length, length::meter};
    ///
    /// let m = |v| Length::new::<meter>(v);
    /// let p = Coordinate::<Scene>::from_cartesian(m(3.), m(0.), m(4.));
    /// assert_eq!(p.distance_from(&Coordinate::origin()), m(5.));
    /// ```
    #[must_use]
    pub fn distance_from(&self, other: &Coordinate<In>) -> Length {
        (*other - *self).magnitude()
    }

    /// Returns `true` if every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.point.coords.iter().all(|c| c.is_finite())
    }
}

impl<In> PartialEq<Self> for Coordinate<In> {
    fn eq(&self, other: &Self) -> bool {
        self.point.eq(&other.point)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> AbsDiffEq<Self> for Coordinate<In> {
    type Epsilon = Length;

    fn default_epsilon() -> Self::Epsilon {
        // markers are spheres of ~30cm, a millimeter is plenty
        Length::new::<meter>(0.001)
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        // NOTE: this measures whether the absolute difference in any _one_ coordinate is off by
        // more than epsilon, not whether the distance between the coordinates is below epsilon.
        self.point.abs_diff_eq(&other.point, epsilon.get::<meter>())
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> RelativeEq for Coordinate<In> {
    fn default_max_relative() -> Self::Epsilon {
        Length::new::<meter>(Point3::default_max_relative())
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.point.relative_eq(
            &other.point,
            epsilon.get::<meter>(),
            max_relative.get::<meter>(),
        )
    }
}

impl<In> Display for Coordinate<In> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.3}, {:.3}, {:.3})",
            self.point.x, self.point.y, self.point.z
        )
    }
}

impl<In> Sub<Self> for Coordinate<In> {
    type Output = Vector<In>;

    fn sub(self, rhs: Self) -> Self::Output {
        Vector::from_nalgebra_vector(self.point - rhs.point)
    }
}

impl<In> Add<Vector<In>> for Coordinate<In> {
    type Output = Coordinate<In>;

    fn add(self, rhs: Vector<In>) -> Self::Output {
        Coordinate {
            point: self.point + rhs.inner,
            system: self.system,
        }
    }
}

impl<In> AddAssign<Vector<In>> for Coordinate<In> {
    fn add_assign(&mut self, rhs: Vector<In>) {
        self.point += rhs.inner;
    }
}

impl<In> Sub<Vector<In>> for Coordinate<In> {
    type Output = Coordinate<In>;

    fn sub(self, rhs: Vector<In>) -> Self::Output {
        Coordinate {
            point: self.point - rhs.inner,
            system: self.system,
        }
    }
}

impl<In> SubAssign<Vector<In>> for Coordinate<In> {
    fn sub_assign(&mut self, rhs: Vector<In>) {
        self.point -= rhs.inner;
    }
}
