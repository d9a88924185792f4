//! Quadrature rules on the reference triangle and the unit interval.
//!
//! The rules come from `fenris-quadrature`, whose reference domains are the triangle with
//! vertices $(-1, -1)$, $(1, -1)$, $(-1, 1)$ and the interval $[-1, 1]$. They are mapped here to
//! the unit triangle and to $[0, 1]$.
use crate::error::Error;
use crate::Real;
use fenris_quadrature::{polyquad, univariate};
use nalgebra::{convert, Point1, Point2};

/// Weights and points of a quadrature rule.
pub type QuadraturePair<T, P> = (Vec<T>, Vec<P>);
pub type QuadraturePair1d<T> = QuadraturePair<T, Point1<T>>;
pub type QuadraturePair2d<T> = QuadraturePair<T, Point2<T>>;

/// Maps a rule from the `fenris-quadrature` reference domain to the unit domain by
/// $\xi = (x + 1) / 2$, which scales each weight by $2^{-d}$.
fn convert_to_unit_domain<T: Real, const D: usize>(
    (weights, points): fenris_quadrature::Rule<D>,
) -> (Vec<T>, Vec<[T; D]>) {
    let scale = 0.5f64.powi(D as i32);
    let weights = weights.into_iter().map(|w| convert(scale * w)).collect();
    let points = points
        .into_iter()
        .map(|p| p.map(|x_i| convert(0.5 * (x_i + 1.0))))
        .collect();
    (weights, points)
}

/// Returns a quadrature rule on the reference triangle with vertices $(0, 0)$, $(1, 0)$ and
/// $(0, 1)$ that integrates polynomials of total degree `strength` exactly.
///
/// The weights sum to the area of the reference triangle, $1/2$. Strengths for which no rule is
/// available give [`Error::NoQuadratureRule`].
pub fn triangle<T: Real>(strength: usize) -> Result<QuadraturePair2d<T>, Error> {
    let rule = polyquad::triangle(strength).map_err(|_| Error::NoQuadratureRule { strength })?;
    let (weights, points) = convert_to_unit_domain::<T, 2>(rule);
    Ok((weights, points.into_iter().map(Point2::from).collect()))
}

/// Returns the `n`-point Gauss-Legendre rule on the unit interval $[0, 1]$.
///
/// The rule integrates polynomials of degree $2n - 1$ exactly.
pub fn gauss<T: Real>(n: usize) -> Result<QuadraturePair1d<T>, Error> {
    if n == 0 {
        return Err(Error::NoQuadratureRule { strength: 0 });
    }
    let (weights, points) = convert_to_unit_domain::<T, 1>(univariate::gauss(n));
    Ok((weights, points.into_iter().map(Point1::from).collect()))
}
