use crate::element::{ElementFamily, EntityDofs, MapType, ReferenceElement, Tabulation};
use crate::error::Error;
use crate::quadrature;
use crate::Real;
use nalgebra::{distance, DMatrix, Point2};

/// A scalar element whose dofs are values at a fixed set of quadrature points.
///
/// The element has no basis functions in the usual sense: it can only be evaluated at its own
/// points, where the $i$-th "basis function" takes the value $\delta_{ij}$ at point $j$.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureElement<T: Real> {
    points: Vec<Point2<T>>,
    strength: Option<usize>,
}

impl<T: Real> QuadratureElement<T> {
    pub fn new(points: Vec<Point2<T>>) -> Result<Self, Error> {
        if points.is_empty() {
            return Err(Error::UnsupportedElement(
                "a quadrature element needs at least one point".to_string(),
            ));
        }
        Ok(Self { points, strength: None })
    }

    pub fn from_strength(strength: usize) -> Result<Self, Error> {
        let (_, points) = quadrature::triangle(strength)?;
        Ok(Self {
            points,
            strength: Some(strength),
        })
    }

    pub fn points(&self) -> &[Point2<T>] {
        &self.points
    }

    fn find_point(&self, xi: &Point2<T>) -> Option<usize> {
        let tol = T::default_epsilon().sqrt();
        self.points.iter().position(|p| distance(p, xi) <= tol)
    }
}

impl<T: Real> ReferenceElement<T> for QuadratureElement<T> {
    fn family(&self) -> ElementFamily {
        ElementFamily::Quadrature
    }

    /// The strength of the underlying quadrature rule, or zero if the points were given
    /// explicitly.
    fn degree(&self) -> usize {
        self.strength.unwrap_or(0)
    }

    fn space_dimension(&self) -> usize {
        self.points.len()
    }

    fn reference_value_size(&self) -> usize {
        1
    }

    fn map_type(&self) -> MapType {
        MapType::Identity
    }

    fn entity_dofs(&self) -> EntityDofs {
        EntityDofs {
            vertex: 0,
            edge: 0,
            interior: self.points.len(),
        }
    }

    fn interpolation_points(&self) -> Vec<Point2<T>> {
        self.points.clone()
    }

    fn interpolation_matrix(&self) -> DMatrix<T> {
        DMatrix::identity(self.points.len(), self.points.len())
    }

    fn tabulate(&self, points: &[Point2<T>], gradients: bool) -> Result<Tabulation<T>, Error> {
        if gradients {
            return Err(Error::Compilation(
                "quadrature elements can not be differentiated".to_string(),
            ));
        }
        Tabulation::from_fn(
            points,
            self.points.len(),
            1,
            false,
            |xi, buffer| {
                let index = self.find_point(xi).ok_or_else(|| {
                    Error::Compilation(format!(
                        "point ({}, {}) is not a point of the quadrature element",
                        xi.x, xi.y
                    ))
                })?;
                buffer.fill(T::zero());
                buffer[index] = T::one();
                Ok(())
            },
            |_, _| Ok(()),
        )
    }
}
