//! Finite elements on the reference triangle.
//!
//! The available elements form a closed set of variants ([`ElementVariant`]) which all implement
//! the [`ReferenceElement`] capability: tabulation of basis functions and their derivatives at
//! reference points, and interpolation through point evaluations. A [`FiniteElement`] combines a
//! variant with a block size, so that scalar elements can be used for vector-valued fields.
use crate::error::Error;
use crate::Real;
use nalgebra::{DMatrix, Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

mod lagrange;
mod quadrature_element;
mod raviart_thomas;

pub use lagrange::LagrangeElement;
pub use quadrature_element::QuadratureElement;
pub use raviart_thomas::RaviartThomasElement;

/// Vertices of the reference triangle.
pub fn reference_vertices<T: Real>() -> [Point2<T>; 3] {
    [
        Point2::origin(),
        Point2::new(T::one(), T::zero()),
        Point2::new(T::zero(), T::one()),
    ]
}

/// Outward normals of the edges of the reference triangle, scaled by the length of the edge.
///
/// Local edge `i` is opposite local vertex `i`.
pub fn reference_scaled_edge_normals<T: Real>() -> [Vector2<T>; 3] {
    let (zero, one) = (T::zero(), T::one());
    [Vector2::new(one, one), Vector2::new(-one, zero), Vector2::new(zero, -one)]
}

/// The family of an element, independent of its degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementFamily {
    Lagrange,
    DiscontinuousLagrange,
    RaviartThomas,
    Quadrature,
}

/// Describes how reference basis function values are mapped to physical space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapType {
    /// Values are unchanged, $u(x) = \hat u(\xi)$.
    Identity,
    /// Contravariant Piola map, $u(x) = \frac{1}{\det J} J \hat u(\xi)$, which preserves normal
    /// fluxes across edges.
    ContravariantPiola,
}

impl MapType {
    /// Maps a reference value to physical space.
    ///
    /// `reference` and `physical` have length 1 for [`MapType::Identity`] and 2 for
    /// [`MapType::ContravariantPiola`].
    pub fn push_forward<T: Real>(&self, reference: &[T], j: &Matrix2<T>, det_j: T, physical: &mut [T]) {
        match self {
            Self::Identity => physical.copy_from_slice(reference),
            Self::ContravariantPiola => {
                let u = j * Vector2::new(reference[0], reference[1]) / det_j;
                physical[0] = u.x;
                physical[1] = u.y;
            }
        }
    }

    /// Maps a physical value back to the reference cell. Inverse of [`MapType::push_forward`].
    pub fn pull_back<T: Real>(&self, physical: &[T], j_inv: &Matrix2<T>, det_j: T, reference: &mut [T]) {
        match self {
            Self::Identity => reference.copy_from_slice(physical),
            Self::ContravariantPiola => {
                let u = j_inv * Vector2::new(physical[0], physical[1]) * det_j;
                reference[0] = u.x;
                reference[1] = u.y;
            }
        }
    }

    /// Maps the reference derivatives of a value to physical derivatives.
    ///
    /// The derivatives are stored row-major, with entry `[c, d]` holding the derivative of
    /// component `c` with respect to coordinate `d`. For an affine map,
    /// $\nabla u = M \hat \nabla \hat u \, J^{-1}$, where $M$ is the value map.
    pub fn push_forward_gradient<T: Real>(
        &self,
        reference: &[T],
        j: &Matrix2<T>,
        j_inv: &Matrix2<T>,
        det_j: T,
        physical: &mut [T],
    ) {
        match self {
            Self::Identity => {
                for (g_ref, g) in reference.chunks_exact(2).zip(physical.chunks_exact_mut(2)) {
                    let g_phys = j_inv.transpose() * Vector2::new(g_ref[0], g_ref[1]);
                    g[0] = g_phys.x;
                    g[1] = g_phys.y;
                }
            }
            Self::ContravariantPiola => {
                let g_ref = Matrix2::new(reference[0], reference[1], reference[2], reference[3]);
                let g_phys = j * g_ref * j_inv / det_j;
                physical[0] = g_phys[(0, 0)];
                physical[1] = g_phys[(0, 1)];
                physical[2] = g_phys[(1, 0)];
                physical[3] = g_phys[(1, 1)];
            }
        }
    }
}

/// The number of dofs associated with each vertex, each edge and the interior of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDofs {
    pub vertex: usize,
    pub edge: usize,
    pub interior: usize,
}

impl EntityDofs {
    pub fn num_cell_dofs(&self) -> usize {
        3 * self.vertex + 3 * self.edge + self.interior
    }
}

/// Basis function values, and optionally first derivatives, tabulated at a set of reference
/// points.
#[derive(Debug, Clone, PartialEq)]
pub struct Tabulation<T> {
    num_points: usize,
    num_basis: usize,
    value_size: usize,
    // Indexed [point][basis][component]
    values: Vec<T>,
    // Indexed [point][basis][component][derivative]
    gradients: Option<Vec<T>>,
}

impl<T: Real> Tabulation<T> {
    /// Tabulates an element by calling the provided closures once per point.
    ///
    /// `values` receives a buffer of length `num_basis * value_size`. If `with_gradients` is
    /// set, `gradients` receives a buffer of length `2 * num_basis * value_size`.
    pub fn from_fn(
        points: &[Point2<T>],
        num_basis: usize,
        value_size: usize,
        with_gradients: bool,
        mut values: impl FnMut(&Point2<T>, &mut [T]) -> Result<(), Error>,
        mut gradients: impl FnMut(&Point2<T>, &mut [T]) -> Result<(), Error>,
    ) -> Result<Self, Error> {
        let stride = num_basis * value_size;
        let mut value_buffer = vec![T::zero(); points.len() * stride];
        if stride > 0 {
            for (xi, buffer) in points.iter().zip(value_buffer.chunks_exact_mut(stride)) {
                values(xi, buffer)?;
            }
        }

        let gradient_buffer = if with_gradients {
            let mut buffer = vec![T::zero(); 2 * points.len() * stride];
            if stride > 0 {
                for (xi, chunk) in points.iter().zip(buffer.chunks_exact_mut(2 * stride)) {
                    gradients(xi, chunk)?;
                }
            }
            Some(buffer)
        } else {
            None
        };

        Ok(Self {
            num_points: points.len(),
            num_basis,
            value_size,
            values: value_buffer,
            gradients: gradient_buffer,
        })
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn num_basis(&self) -> usize {
        self.num_basis
    }

    pub fn value_size(&self) -> usize {
        self.value_size
    }

    pub fn has_gradients(&self) -> bool {
        self.gradients.is_some()
    }

    /// Values of all basis functions at the given point, indexed `[basis][component]`.
    pub fn point_values(&self, point: usize) -> &[T] {
        let stride = self.num_basis * self.value_size;
        &self.values[point * stride..(point + 1) * stride]
    }

    /// Reference derivatives of all basis functions at the given point, indexed
    /// `[basis][component][derivative]`.
    ///
    /// # Panics
    ///
    /// Panics if the tabulation was created without gradients.
    pub fn point_gradients(&self, point: usize) -> &[T] {
        let stride = 2 * self.num_basis * self.value_size;
        let gradients = self
            .gradients
            .as_ref()
            .expect("tabulation does not contain gradients");
        &gradients[point * stride..(point + 1) * stride]
    }

    pub fn value(&self, point: usize, basis: usize, component: usize) -> T {
        self.point_values(point)[basis * self.value_size + component]
    }

    pub fn gradient(&self, point: usize, basis: usize, component: usize, derivative: usize) -> T {
        self.point_gradients(point)[2 * (basis * self.value_size + component) + derivative]
    }
}

/// Evaluation of an element on the reference triangle.
pub trait ReferenceElement<T: Real> {
    fn family(&self) -> ElementFamily;

    fn degree(&self) -> usize;

    /// The number of basis functions.
    fn space_dimension(&self) -> usize;

    /// The number of components of each reference basis function.
    fn reference_value_size(&self) -> usize;

    fn map_type(&self) -> MapType;

    fn entity_dofs(&self) -> EntityDofs;

    /// Points at which a function is evaluated in order to interpolate it into the element.
    fn interpolation_points(&self) -> Vec<Point2<T>>;

    /// Matrix mapping reference values at the interpolation points to dof values.
    ///
    /// The matrix has one row per dof and one column per (point, component) pair, with columns
    /// ordered point-major.
    fn interpolation_matrix(&self) -> DMatrix<T>;

    /// Tabulates basis values, and optionally reference derivatives, at the given points.
    fn tabulate(&self, points: &[Point2<T>], gradients: bool) -> Result<Tabulation<T>, Error>;
}

/// The closed set of element variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementVariant<T: Real> {
    Lagrange(LagrangeElement),
    RaviartThomas(RaviartThomasElement),
    Quadrature(QuadratureElement<T>),
}

impl<T: Real> ReferenceElement<T> for ElementVariant<T> {
    fn family(&self) -> ElementFamily {
        match self {
            Self::Lagrange(e) => ReferenceElement::<T>::family(e),
            Self::RaviartThomas(e) => ReferenceElement::<T>::family(e),
            Self::Quadrature(e) => e.family(),
        }
    }

    fn degree(&self) -> usize {
        match self {
            Self::Lagrange(e) => ReferenceElement::<T>::degree(e),
            Self::RaviartThomas(e) => ReferenceElement::<T>::degree(e),
            Self::Quadrature(e) => e.degree(),
        }
    }

    fn space_dimension(&self) -> usize {
        match self {
            Self::Lagrange(e) => ReferenceElement::<T>::space_dimension(e),
            Self::RaviartThomas(e) => ReferenceElement::<T>::space_dimension(e),
            Self::Quadrature(e) => e.space_dimension(),
        }
    }

    fn reference_value_size(&self) -> usize {
        match self {
            Self::Lagrange(e) => ReferenceElement::<T>::reference_value_size(e),
            Self::RaviartThomas(e) => ReferenceElement::<T>::reference_value_size(e),
            Self::Quadrature(e) => e.reference_value_size(),
        }
    }

    fn map_type(&self) -> MapType {
        match self {
            Self::Lagrange(e) => ReferenceElement::<T>::map_type(e),
            Self::RaviartThomas(e) => ReferenceElement::<T>::map_type(e),
            Self::Quadrature(e) => e.map_type(),
        }
    }

    fn entity_dofs(&self) -> EntityDofs {
        match self {
            Self::Lagrange(e) => ReferenceElement::<T>::entity_dofs(e),
            Self::RaviartThomas(e) => ReferenceElement::<T>::entity_dofs(e),
            Self::Quadrature(e) => e.entity_dofs(),
        }
    }

    fn interpolation_points(&self) -> Vec<Point2<T>> {
        match self {
            Self::Lagrange(e) => e.interpolation_points(),
            Self::RaviartThomas(e) => e.interpolation_points(),
            Self::Quadrature(e) => e.interpolation_points(),
        }
    }

    fn interpolation_matrix(&self) -> DMatrix<T> {
        match self {
            Self::Lagrange(e) => e.interpolation_matrix(),
            Self::RaviartThomas(e) => e.interpolation_matrix(),
            Self::Quadrature(e) => e.interpolation_matrix(),
        }
    }

    fn tabulate(&self, points: &[Point2<T>], gradients: bool) -> Result<Tabulation<T>, Error> {
        match self {
            Self::Lagrange(e) => e.tabulate(points, gradients),
            Self::RaviartThomas(e) => e.tabulate(points, gradients),
            Self::Quadrature(e) => e.tabulate(points, gradients),
        }
    }
}

/// A finite element: an element variant, optionally blocked into a vector-valued element.
///
/// For a blocked element with block size $b$ and scalar basis functions $\phi_i$, the local
/// dof $i b + k$ corresponds to the basis function $\phi_i e_k$.
#[derive(Debug, Clone, PartialEq)]
pub struct FiniteElement<T: Real> {
    variant: ElementVariant<T>,
    block_size: usize,
}

impl<T: Real> FiniteElement<T> {
    pub fn from_variant(variant: ElementVariant<T>) -> Self {
        Self {
            variant,
            block_size: 1,
        }
    }

    /// Continuous Lagrange element of the given degree. Degree 0 gives a piecewise constant
    /// element.
    pub fn lagrange(degree: usize) -> Result<Self, Error> {
        Ok(Self::from_variant(ElementVariant::Lagrange(LagrangeElement::new(
            degree,
            degree == 0,
        )?)))
    }

    pub fn discontinuous_lagrange(degree: usize) -> Result<Self, Error> {
        Ok(Self::from_variant(ElementVariant::Lagrange(LagrangeElement::new(degree, true)?)))
    }

    pub fn raviart_thomas(degree: usize) -> Result<Self, Error> {
        Ok(Self::from_variant(ElementVariant::RaviartThomas(RaviartThomasElement::new(
            degree,
        )?)))
    }

    /// A quadrature element whose dofs are values at the given reference points.
    pub fn quadrature(points: Vec<Point2<T>>) -> Result<Self, Error> {
        Ok(Self::from_variant(ElementVariant::Quadrature(QuadratureElement::new(points)?)))
    }

    /// A quadrature element on the points of [`crate::quadrature::triangle`] of the given
    /// strength.
    pub fn quadrature_with_strength(strength: usize) -> Result<Self, Error> {
        Ok(Self::from_variant(ElementVariant::Quadrature(
            QuadratureElement::from_strength(strength)?,
        )))
    }

    /// Creates an element of the given family and degree.
    ///
    /// For [`ElementFamily::Quadrature`] the degree is the strength of the quadrature rule.
    pub fn from_family(family: ElementFamily, degree: usize) -> Result<Self, Error> {
        match family {
            ElementFamily::Lagrange => Self::lagrange(degree),
            ElementFamily::DiscontinuousLagrange => Self::discontinuous_lagrange(degree),
            ElementFamily::RaviartThomas => Self::raviart_thomas(degree),
            ElementFamily::Quadrature => Self::quadrature_with_strength(degree),
        }
    }

    /// Turns a scalar element into a vector-valued element with `block_size` components.
    pub fn blocked(self, block_size: usize) -> Result<Self, Error> {
        if block_size == 0 {
            return Err(Error::UnsupportedElement("block size must be positive".to_string()));
        }
        if self.block_size != 1 || self.variant.reference_value_size() != 1 {
            return Err(Error::UnsupportedElement(format!(
                "only scalar elements can be blocked, but {:?} element is not scalar",
                self.variant.family()
            )));
        }
        Ok(Self {
            variant: self.variant,
            block_size,
        })
    }

    pub fn variant(&self) -> &ElementVariant<T> {
        &self.variant
    }

    pub fn family(&self) -> ElementFamily {
        self.variant.family()
    }

    pub fn degree(&self) -> usize {
        self.variant.degree()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn map_type(&self) -> MapType {
        self.variant.map_type()
    }

    /// The number of basis functions of the unblocked element.
    pub fn space_dimension(&self) -> usize {
        self.variant.space_dimension()
    }

    /// The number of local dofs, including block components.
    pub fn num_local_dofs(&self) -> usize {
        self.block_size * self.space_dimension()
    }

    pub fn value_shape(&self) -> Vec<usize> {
        if self.block_size > 1 {
            vec![self.block_size]
        } else if self.variant.reference_value_size() > 1 {
            vec![self.variant.reference_value_size()]
        } else {
            Vec::new()
        }
    }

    pub fn value_size(&self) -> usize {
        self.block_size * self.variant.reference_value_size()
    }

    /// The number of components of each unblocked reference basis function.
    pub fn reference_value_size(&self) -> usize {
        self.variant.reference_value_size()
    }

    pub fn interpolation_points(&self) -> Vec<Point2<T>> {
        self.variant.interpolation_points()
    }

    pub fn interpolation_matrix(&self) -> DMatrix<T> {
        self.variant.interpolation_matrix()
    }

    pub fn entity_dofs(&self) -> EntityDofs {
        self.variant.entity_dofs()
    }

    pub fn tabulate(&self, points: &[Point2<T>], gradients: bool) -> Result<Tabulation<T>, Error> {
        self.variant.tabulate(points, gradients)
    }
}
