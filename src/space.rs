//! Function spaces: an element on a mesh together with its dof numbering.
use crate::dofmap::DofMap;
use crate::element::{reference_scaled_edge_normals, EntityDofs, FiniteElement, MapType};
use crate::error::Error;
use crate::mesh::{Mesh, REFERENCE_EDGE_VERTICES};
use crate::Real;
use nalgebra::{DMatrix, Matrix2, Point2, Vector2};
use std::iter;
use std::sync::Arc;

/// A finite element space on a triangle mesh.
///
/// For elements with the contravariant Piola map, each local dof carries a sign so that basis
/// functions of neighboring cells agree on the direction of the normal across shared edges.
/// Elements with several dofs per edge additionally see the dofs of an edge in reverse order in
/// cells where the edge runs against its global direction.
#[derive(Debug, Clone)]
pub struct FunctionSpace<T: Real> {
    mesh: Arc<Mesh<T>>,
    element: FiniteElement<T>,
    dofmap: DofMap,
    interpolation_points: Vec<Point2<T>>,
    interpolation_matrix: DMatrix<T>,
    // One entry per (cell, local dof of the unblocked element), or empty if all signs are positive
    dof_signs: Vec<T>,
}

impl<T: Real> FunctionSpace<T> {
    pub fn new(mesh: Arc<Mesh<T>>, element: FiniteElement<T>) -> Self {
        let layout = element.entity_dofs();
        let mut dofmap = DofMap::from_topology(mesh.topology(), layout, element.block_size());
        dofmap.reflect_edge_dofs(layout, &compute_edge_reflections(&mesh));
        let dof_signs = match element.map_type() {
            MapType::Identity => Vec::new(),
            MapType::ContravariantPiola => compute_edge_normal_signs(&mesh, layout),
        };
        Self {
            interpolation_points: element.interpolation_points(),
            interpolation_matrix: element.interpolation_matrix(),
            mesh,
            element,
            dofmap,
            dof_signs,
        }
    }

    pub fn mesh(&self) -> &Arc<Mesh<T>> {
        &self.mesh
    }

    pub fn element(&self) -> &FiniteElement<T> {
        &self.element
    }

    pub fn dofmap(&self) -> &DofMap {
        &self.dofmap
    }

    pub fn value_shape(&self) -> Vec<usize> {
        self.element.value_shape()
    }

    pub fn value_size(&self) -> usize {
        self.element.value_size()
    }

    /// The number of entries of a coefficient vector on this space.
    pub fn num_coefficients(&self) -> usize {
        self.dofmap.num_coefficients()
    }

    /// Reference points at which functions are evaluated for interpolation into this space.
    pub fn interpolation_points(&self) -> &[Point2<T>] {
        &self.interpolation_points
    }

    /// Sign of each local dof of the given cell, or `None` if all signs are positive.
    ///
    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn cell_dof_signs(&self, cell: usize) -> Option<&[T]> {
        if self.dof_signs.is_empty() {
            None
        } else {
            let n = self.element.space_dimension();
            Some(&self.dof_signs[cell * n..(cell + 1) * n])
        }
    }

    /// Physical coordinates of every dof block, indexed by dof block.
    ///
    /// Only available for elements whose dofs are point values, i.e. whose interpolation matrix
    /// is the identity.
    pub fn tabulate_dof_coordinates(&self) -> Result<Vec<Point2<T>>, Error> {
        if !self.has_point_dofs() {
            return Err(Error::UnsupportedElement(format!(
                "{:?} elements have no dof coordinates",
                self.element.family()
            )));
        }
        let mut coordinates = vec![Point2::origin(); self.dofmap.index_map().len()];
        for cell in 0..self.mesh.num_cells() {
            let geometry = self.mesh.cell_geometry(cell);
            for (dof, xi) in self.dofmap.cell_dofs(cell).iter().zip(&self.interpolation_points) {
                coordinates[*dof] = geometry.map_reference_coords(xi);
            }
        }
        Ok(coordinates)
    }

    /// Whether each dof is the value at a single interpolation point.
    pub fn has_point_dofs(&self) -> bool {
        let n = self.element.space_dimension();
        self.element.reference_value_size() == 1
            && self.interpolation_points.len() == n
            && self.interpolation_matrix == DMatrix::identity(n, n)
    }

    /// Computes the coefficients of the given cell from physical values at the interpolation
    /// points, and writes them into the global coefficient vector `x`.
    ///
    /// `values` holds `value_size` components per interpolation point, point-major.
    pub fn interpolate_cell_values(&self, cell: usize, values: &[T], x: &mut [T]) -> Result<(), Error> {
        let num_points = self.interpolation_points.len();
        let value_size = self.value_size();
        if values.len() != num_points * value_size {
            return Err(Error::ShapeMismatch {
                what: "interpolation values",
                expected: num_points * value_size,
                actual: values.len(),
            });
        }
        if x.len() != self.num_coefficients() {
            return Err(Error::ShapeMismatch {
                what: "coefficient vector",
                expected: self.num_coefficients(),
                actual: x.len(),
            });
        }
        self.mesh.check_cell_indices(&[cell])?;

        let bs = self.element.block_size();
        let reference_value_size = self.element.reference_value_size();
        let map_type = self.element.map_type();
        let geometry = self.mesh.cell_geometry(cell);
        let signs = self.cell_dof_signs(cell);
        let dofs = self.dofmap.cell_dofs(cell);

        let mut reference_values = vec![T::zero(); num_points * reference_value_size];
        for k in 0..bs {
            for (p, reference) in reference_values
                .chunks_exact_mut(reference_value_size)
                .enumerate()
            {
                let begin = p * value_size + k * reference_value_size;
                let physical = &values[begin..begin + reference_value_size];
                map_type.pull_back(physical, &geometry.inverse_jacobian, geometry.det_jacobian, reference);
            }
            for (i, dof) in dofs.iter().enumerate() {
                let row = self.interpolation_matrix.row(i);
                let mut coefficient = row
                    .iter()
                    .zip(&reference_values)
                    .fold(T::zero(), |acc, (m, v)| acc + *m * *v);
                if let Some(signs) = signs {
                    coefficient *= signs[i];
                }
                x[bs * dof + k] = coefficient;
            }
        }
        Ok(())
    }
}

/// Computes the sign of each local dof of each cell.
///
/// Every edge has a global normal, obtained by rotating the tangent from its lower to its higher
/// vertex index clockwise. The sign of an edge dof is positive if the Piola image of the reference
/// outward normal of the corresponding local edge points in the same direction. Interior dofs are
/// always positive.
fn compute_edge_normal_signs<T: Real>(mesh: &Mesh<T>, layout: EntityDofs) -> Vec<T> {
    let topology = mesh.topology();
    let x = mesh.geometry().x();
    let reference_normals = reference_scaled_edge_normals::<T>();
    let mut signs = Vec::with_capacity(layout.num_cell_dofs() * topology.num_cells());
    for cell in 0..topology.num_cells() {
        let j = mesh.cell_geometry(cell).jacobian;
        // det(J) J^{-T}
        let cofactor = Matrix2::new(j[(1, 1)], -j[(1, 0)], -j[(0, 1)], j[(0, 0)]);
        signs.extend(iter::repeat(T::one()).take(3 * layout.vertex));
        for (local_edge, edge) in topology.cell_edges(cell).iter().enumerate() {
            let [lo, hi] = *topology.edge_vertices(*edge);
            let t = x[hi] - x[lo];
            let global_normal = Vector2::new(t.y, -t.x);
            let local_normal = cofactor * reference_normals[local_edge];
            let sign = if local_normal.dot(&global_normal) >= T::zero() {
                T::one()
            } else {
                -T::one()
            };
            signs.extend(iter::repeat(sign).take(layout.edge));
        }
        signs.extend(iter::repeat(T::one()).take(layout.interior));
    }
    signs
}

/// Whether each local edge of each cell runs against its global direction, from the lower to
/// the higher vertex index.
fn compute_edge_reflections<T: Real>(mesh: &Mesh<T>) -> Vec<bool> {
    mesh.geometry_dofmap()
        .iter()
        .flat_map(|cell| REFERENCE_EDGE_VERTICES.iter().map(move |[a, b]| cell[*a] > cell[*b]))
        .collect()
}
