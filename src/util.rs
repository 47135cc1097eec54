use std::f64::consts::{PI, TAU};
use uom::si::angle::radian;
use uom::si::f64::Angle;

/// An angle reduced modulo a full turn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BoundedAngle {
    angle: Angle,
}

impl BoundedAngle {
    pub(crate) fn new(angle: impl Into<Angle>) -> Self {
        Self {
            // NOTE: uom may store the value differently-normalized, so output normalizes again.
            angle: Angle::new::<radian>(Self::into_bounds(angle.into())),
        }
    }

    /// Returns the angle in [0°, 360°) in radians.
    pub(crate) fn get_bounded(self) -> f64 {
        Self::into_bounds(self.angle)
    }

    fn into_bounds(angle: Angle) -> f64 {
        angle.get::<radian>().rem_euclid(TAU)
    }

    /// Returns the angle in [-180°, 180°) in radians.
    pub(crate) fn to_signed_range(self) -> f64 {
        let angle = self.get_bounded();
        if angle < PI {
            angle
        } else {
            angle - TAU
        }
    }

    pub(crate) fn to_signed_angle(self) -> Angle {
        Angle::new::<radian>(self.to_signed_range())
    }
}

/// Returns `value` if it is finite, and `fallback` otherwise.
pub(crate) fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use crate::util::{finite_or, BoundedAngle};
    use approx::assert_relative_eq;
    use rstest::rstest;
    use uom::si::angle::{degree, radian};
    use uom::si::f64::Angle;

    fn d(degrees: f64) -> Angle {
        Angle::new::<degree>(degrees)
    }

    #[test]
    fn quarter_turn_clockwise_wraps_to_three_quarters() {
        let yaw = BoundedAngle::new(Angle::new::<radian>(-std::f64::consts::FRAC_PI_2));
        assert_relative_eq!(yaw.get_bounded(), 1.5 * std::f64::consts::PI);
    }

    #[rstest]
    #[case(d(0.), 0.)]
    #[case(d(180.), -180.)]
    #[case(d(359.), -1.)]
    #[case(d(270.), -90.)]
    #[case(d(-390.), -30.)]
    #[case(d(360. + 340.), -20.)]
    fn heading_in_signed_range(#[case] input: Angle, #[case] degrees: f64) {
        let heading = BoundedAngle::new(input).to_signed_angle();
        assert_relative_eq!(heading.get::<degree>(), degrees, epsilon = 1e-9);
    }

    #[test]
    fn finite_or_replaces_nan_and_infinity() {
        assert_eq!(finite_or(2.5, 1.), 2.5);
        assert_eq!(finite_or(f64::NAN, 1.), 1.);
        assert_eq!(finite_or(f64::INFINITY, 1.), 1.);
    }
}
