use crate::element::{
    reference_scaled_edge_normals, reference_vertices, ElementFamily, EntityDofs, MapType, ReferenceElement,
    Tabulation,
};
use crate::error::Error;
use crate::mesh::REFERENCE_EDGE_VERTICES;
use crate::quadrature;
use crate::Real;
use nalgebra::{DMatrix, Point2};

/// Number of Gauss points per edge used to interpolate normal fluxes.
const EDGE_QUADRATURE_POINTS: usize = 2;

/// Strength of the triangle rule used for the interior moments of the degree 2 element.
const INTERIOR_QUADRATURE_STRENGTH: usize = 2;

/// Raviart-Thomas element of degree 1 or 2 on the reference triangle.
///
/// For degree 1, the dof associated with local edge `i` is the normal flux
/// <div>$$
///   l_i(v) = \int_{e_i} v \cdot n_i \, \mathrm{d} s
/// $$</div>
/// through the edge, where $n_i$ is the outward unit normal of the reference triangle. The basis
/// functions are $\phi_i(\xi) = \xi - \hat v_i$, with $\hat v_i$ the reference vertex opposite
/// edge `i`.
///
/// For degree 2, each edge carries two dofs, the scaled normal component $v \cdot |e_i| n_i$ at
/// the two Gauss points of the edge, ordered from the lower to the higher local vertex of the
/// edge. The two interior dofs are the moments $\int_T v_c \, \mathrm{d} x$ of each component.
/// Reversing the direction of an edge swaps its two dofs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaviartThomasElement {
    degree: usize,
}

impl RaviartThomasElement {
    pub fn new(degree: usize) -> Result<Self, Error> {
        if !(1..=2).contains(&degree) {
            return Err(Error::UnsupportedElement(format!(
                "Raviart-Thomas elements are only available for degrees 1 and 2, got degree {degree}"
            )));
        }
        Ok(Self { degree })
    }

    fn edge_quadrature<T: Real>() -> (Vec<T>, Vec<T>) {
        let (weights, points) =
            quadrature::gauss::<T>(EDGE_QUADRATURE_POINTS).expect("Gauss rules exist for any positive size");
        (weights, points.into_iter().map(|p| p.x).collect())
    }

    fn interior_quadrature<T: Real>() -> (Vec<T>, Vec<Point2<T>>) {
        quadrature::triangle::<T>(INTERIOR_QUADRATURE_STRENGTH).expect("low order triangle rules always exist")
    }

    fn points<T: Real>(&self) -> Vec<Point2<T>> {
        let vertices = reference_vertices::<T>();
        let (_, params) = Self::edge_quadrature::<T>();
        let mut points: Vec<_> = REFERENCE_EDGE_VERTICES
            .iter()
            .flat_map(|[a, b]| {
                let (va, vb) = (vertices[*a], vertices[*b]);
                params
                    .iter()
                    .map(move |t| va + (vb - va) * *t)
                    .collect::<Vec<_>>()
            })
            .collect();
        if self.degree == 2 {
            points.extend(Self::interior_quadrature::<T>().1);
        }
        points
    }

    fn dual_matrix<T: Real>(&self) -> DMatrix<T> {
        let normals = reference_scaled_edge_normals::<T>();
        let (weights, _) = Self::edge_quadrature::<T>();
        let nq = weights.len();
        match self.degree {
            1 => {
                let mut matrix = DMatrix::zeros(3, 2 * 3 * nq);
                for (edge, normal) in normals.iter().enumerate() {
                    for (q, w) in weights.iter().enumerate() {
                        let point = edge * nq + q;
                        matrix[(edge, 2 * point)] = *w * normal.x;
                        matrix[(edge, 2 * point + 1)] = *w * normal.y;
                    }
                }
                matrix
            }
            _ => {
                let (interior_weights, _) = Self::interior_quadrature::<T>();
                let num_points = 3 * nq + interior_weights.len();
                let mut matrix = DMatrix::zeros(8, 2 * num_points);
                for (edge, normal) in normals.iter().enumerate() {
                    for q in 0..nq {
                        let point = edge * nq + q;
                        matrix[(point, 2 * point)] = normal.x;
                        matrix[(point, 2 * point + 1)] = normal.y;
                    }
                }
                for (q, w) in interior_weights.iter().enumerate() {
                    let point = 3 * nq + q;
                    for c in 0..2 {
                        matrix[(6 + c, 2 * point + c)] = *w;
                    }
                }
                matrix
            }
        }
    }

    /// Coefficients of the degree 2 basis in terms of [`spanning_values`], one row per basis
    /// function.
    fn degree2_coefficients<T: Real>(&self) -> Result<DMatrix<T>, Error> {
        let points = self.points::<T>();
        let mut polynomial_values = DMatrix::zeros(2 * points.len(), 8);
        for (p, xi) in points.iter().enumerate() {
            for (j, value) in spanning_values(xi).iter().enumerate() {
                polynomial_values[(2 * p, j)] = value[0];
                polynomial_values[(2 * p + 1, j)] = value[1];
            }
        }
        // Entry (i, j) is dof i applied to spanning function j
        let dual = self.dual_matrix::<T>() * polynomial_values;
        let inverse = dual.try_inverse().ok_or_else(|| {
            Error::UnsupportedElement("dofs of the Raviart-Thomas element are not unisolvent".to_string())
        })?;
        Ok(inverse.transpose())
    }
}

/// A spanning set of the degree 2 Raviart-Thomas space, $P_1^2 \oplus \xi \tilde P_1$, indexed
/// `[function][component]`.
fn spanning_values<T: Real>(xi: &Point2<T>) -> [[T; 2]; 8] {
    let (x, y) = (xi.x, xi.y);
    let (o, z) = (T::one(), T::zero());
    [[o, z], [x, z], [y, z], [z, o], [z, x], [z, y], [x * x, x * y], [x * y, y * y]]
}

/// Derivatives of [`spanning_values`], indexed `[function][component][derivative]`.
fn spanning_gradients<T: Real>(xi: &Point2<T>) -> [[[T; 2]; 2]; 8] {
    let (x, y) = (xi.x, xi.y);
    let (o, z) = (T::one(), T::zero());
    let two = o + o;
    [
        [[z, z], [z, z]],
        [[o, z], [z, z]],
        [[z, o], [z, z]],
        [[z, z], [z, z]],
        [[z, z], [o, z]],
        [[z, z], [z, o]],
        [[two * x, z], [y, x]],
        [[y, x], [z, two * y]],
    ]
}

impl<T: Real> ReferenceElement<T> for RaviartThomasElement {
    fn family(&self) -> ElementFamily {
        ElementFamily::RaviartThomas
    }

    fn degree(&self) -> usize {
        self.degree
    }

    fn space_dimension(&self) -> usize {
        match self.degree {
            1 => 3,
            _ => 8,
        }
    }

    fn reference_value_size(&self) -> usize {
        2
    }

    fn map_type(&self) -> MapType {
        MapType::ContravariantPiola
    }

    fn entity_dofs(&self) -> EntityDofs {
        match self.degree {
            1 => EntityDofs {
                vertex: 0,
                edge: 1,
                interior: 0,
            },
            _ => EntityDofs {
                vertex: 0,
                edge: 2,
                interior: 2,
            },
        }
    }

    /// Gauss points on each edge, edge by edge, followed by interior quadrature points for
    /// degree 2.
    fn interpolation_points(&self) -> Vec<Point2<T>> {
        self.points()
    }

    fn interpolation_matrix(&self) -> DMatrix<T> {
        self.dual_matrix()
    }

    fn tabulate(&self, points: &[Point2<T>], gradients: bool) -> Result<Tabulation<T>, Error> {
        if self.degree == 2 {
            let coefficients = self.degree2_coefficients::<T>()?;
            return Tabulation::from_fn(
                points,
                8,
                2,
                gradients,
                |xi, buffer| {
                    let span = spanning_values(xi);
                    for i in 0..8 {
                        for c in 0..2 {
                            buffer[2 * i + c] = (0..8).fold(T::zero(), |acc, j| acc + coefficients[(i, j)] * span[j][c]);
                        }
                    }
                    Ok(())
                },
                |xi, buffer| {
                    let span = spanning_gradients(xi);
                    for i in 0..8 {
                        for c in 0..2 {
                            for d in 0..2 {
                                buffer[4 * i + 2 * c + d] =
                                    (0..8).fold(T::zero(), |acc, j| acc + coefficients[(i, j)] * span[j][c][d]);
                            }
                        }
                    }
                    Ok(())
                },
            );
        }

        let vertices = reference_vertices::<T>();
        Tabulation::from_fn(
            points,
            3,
            2,
            gradients,
            |xi, buffer| {
                for (i, v) in vertices.iter().enumerate() {
                    let phi = xi - v;
                    buffer[2 * i] = phi.x;
                    buffer[2 * i + 1] = phi.y;
                }
                Ok(())
            },
            |_, buffer| {
                // Every basis function has the identity as its derivative
                for g in buffer.chunks_exact_mut(4) {
                    g.copy_from_slice(&[T::one(), T::zero(), T::zero(), T::one()]);
                }
                Ok(())
            },
        )
    }
}
