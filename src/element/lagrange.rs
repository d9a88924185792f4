use crate::element::{reference_vertices, ElementFamily, EntityDofs, MapType, ReferenceElement, Tabulation};
use crate::error::Error;
use crate::Real;
use nalgebra::{DMatrix, Point2, Vector2};
use numeric_literals::replace_float_literals;

/// Lagrange element of degree 0, 1 or 2 on the reference triangle.
///
/// Basis functions are ordered by vertex, then by edge (local edge `i` is opposite local vertex
/// `i`), then interior. The degree 2 basis is therefore associated with the points
/// $(0, 0)$, $(1, 0)$, $(0, 1)$, $(\frac12, \frac12)$, $(0, \frac12)$, $(\frac12, 0)$.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LagrangeElement {
    degree: usize,
    discontinuous: bool,
}

impl LagrangeElement {
    pub fn new(degree: usize, discontinuous: bool) -> Result<Self, Error> {
        if degree > 2 {
            return Err(Error::UnsupportedElement(format!(
                "Lagrange elements are only available up to degree 2, got degree {degree}"
            )));
        }
        if degree == 0 && !discontinuous {
            return Err(Error::UnsupportedElement(
                "a continuous Lagrange element must have positive degree".to_string(),
            ));
        }
        Ok(Self { degree, discontinuous })
    }

    pub fn is_discontinuous(&self) -> bool {
        self.discontinuous
    }

    fn num_basis(&self) -> usize {
        match self.degree {
            0 => 1,
            1 => 3,
            _ => 6,
        }
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_basis<T: Real>(&self, xi: &Point2<T>, basis: &mut [T]) {
        let l = barycentric(xi);
        match self.degree {
            0 => basis[0] = 1.0,
            1 => basis.copy_from_slice(&l),
            _ => {
                for i in 0..3 {
                    basis[i] = l[i] * (2.0 * l[i] - 1.0);
                }
                basis[3] = 4.0 * l[1] * l[2];
                basis[4] = 4.0 * l[0] * l[2];
                basis[5] = 4.0 * l[0] * l[1];
            }
        }
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn populate_gradients<T: Real>(&self, xi: &Point2<T>, gradients: &mut [T]) {
        let l = barycentric(xi);
        let dl = barycentric_gradients::<T>();
        let mut set = |i: usize, g: Vector2<T>| {
            gradients[2 * i] = g.x;
            gradients[2 * i + 1] = g.y;
        };
        match self.degree {
            0 => set(0, Vector2::zeros()),
            1 => {
                for i in 0..3 {
                    set(i, dl[i]);
                }
            }
            _ => {
                for i in 0..3 {
                    set(i, dl[i] * (4.0 * l[i] - 1.0));
                }
                set(3, (dl[1] * l[2] + dl[2] * l[1]) * 4.0);
                set(4, (dl[0] * l[2] + dl[2] * l[0]) * 4.0);
                set(5, (dl[0] * l[1] + dl[1] * l[0]) * 4.0);
            }
        }
    }
}

fn barycentric<T: Real>(xi: &Point2<T>) -> [T; 3] {
    [T::one() - xi.x - xi.y, xi.x, xi.y]
}

fn barycentric_gradients<T: Real>() -> [Vector2<T>; 3] {
    let (zero, one) = (T::zero(), T::one());
    [Vector2::new(-one, -one), Vector2::new(one, zero), Vector2::new(zero, one)]
}

impl<T: Real> ReferenceElement<T> for LagrangeElement {
    fn family(&self) -> ElementFamily {
        if self.discontinuous {
            ElementFamily::DiscontinuousLagrange
        } else {
            ElementFamily::Lagrange
        }
    }

    fn degree(&self) -> usize {
        self.degree
    }

    fn space_dimension(&self) -> usize {
        self.num_basis()
    }

    fn reference_value_size(&self) -> usize {
        1
    }

    fn map_type(&self) -> MapType {
        MapType::Identity
    }

    fn entity_dofs(&self) -> EntityDofs {
        match (self.discontinuous, self.degree) {
            (true, _) => EntityDofs {
                vertex: 0,
                edge: 0,
                interior: self.num_basis(),
            },
            (false, 1) => EntityDofs {
                vertex: 1,
                edge: 0,
                interior: 0,
            },
            (false, _) => EntityDofs {
                vertex: 1,
                edge: 1,
                interior: 0,
            },
        }
    }

    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn interpolation_points(&self) -> Vec<Point2<T>> {
        match self.degree {
            0 => vec![Point2::new(1.0 / 3.0, 1.0 / 3.0)],
            1 => reference_vertices().to_vec(),
            _ => {
                let mut points = reference_vertices().to_vec();
                points.extend([Point2::new(0.5, 0.5), Point2::new(0.0, 0.5), Point2::new(0.5, 0.0)]);
                points
            }
        }
    }

    fn interpolation_matrix(&self) -> DMatrix<T> {
        DMatrix::identity(self.num_basis(), self.num_basis())
    }

    fn tabulate(&self, points: &[Point2<T>], gradients: bool) -> Result<Tabulation<T>, Error> {
        Tabulation::from_fn(
            points,
            self.num_basis(),
            1,
            gradients,
            |xi, buffer| {
                self.populate_basis(xi, buffer);
                Ok(())
            },
            |xi, buffer| {
                self.populate_gradients(xi, buffer);
                Ok(())
            },
        )
    }
}
