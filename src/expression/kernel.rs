//! Per-cell evaluation of a compiled expression.
use crate::element::{MapType, Tabulation};
use crate::error::Error;
use crate::expression::program::{Program, Source};
use crate::mesh::{CellGeometry, Mesh};
use crate::space::FunctionSpace;
use crate::Real;
use itertools::izip;
use nalgebra::Point2;

/// Tabulated reference basis of a function space at the expression points.
#[derive(Debug, Clone)]
pub(crate) struct TabulatedSpace<T: Real> {
    pub tabulation: Tabulation<T>,
    pub map_type: MapType,
    pub block_size: usize,
    pub reference_value_size: usize,
}

impl<T: Real> TabulatedSpace<T> {
    pub fn new(space: &FunctionSpace<T>, points: &[Point2<T>], gradients: bool) -> Result<Self, Error> {
        let element = space.element();
        Ok(Self {
            tabulation: element.tabulate(points, gradients)?,
            map_type: element.map_type(),
            block_size: element.block_size(),
            reference_value_size: element.reference_value_size(),
        })
    }

    fn value_size(&self) -> usize {
        self.block_size * self.reference_value_size
    }

    fn num_local_dofs(&self) -> usize {
        self.block_size * self.tabulation.num_basis()
    }

    /// Physical values of the function with the given local coefficients, indexed
    /// `[point][component]`.
    fn interpolate_values(&self, geometry: &CellGeometry<T>, local: &[T], mapped: &mut Vec<T>, out: &mut Vec<T>) {
        let (bs, rvs, vs) = (self.block_size, self.reference_value_size, self.value_size());
        out.clear();
        out.resize(self.tabulation.num_points() * vs, T::zero());
        mapped.resize(rvs, T::zero());
        for (p, values) in out.chunks_exact_mut(vs).enumerate() {
            let reference = self.tabulation.point_values(p);
            for (i, phi) in reference.chunks_exact(rvs).enumerate() {
                self.map_type
                    .push_forward(phi, &geometry.jacobian, geometry.det_jacobian, mapped);
                for k in 0..bs {
                    let w = local[i * bs + k];
                    for r in 0..rvs {
                        values[k * rvs + r] += w * mapped[r];
                    }
                }
            }
        }
    }

    /// Physical gradients of the function with the given local coefficients, indexed
    /// `[point][component][derivative]`.
    fn interpolate_gradients(&self, geometry: &CellGeometry<T>, local: &[T], mapped: &mut Vec<T>, out: &mut Vec<T>) {
        let (bs, rvs, vs) = (self.block_size, self.reference_value_size, self.value_size());
        out.clear();
        out.resize(2 * self.tabulation.num_points() * vs, T::zero());
        mapped.resize(2 * rvs, T::zero());
        for (p, gradients) in out.chunks_exact_mut(2 * vs).enumerate() {
            let reference = self.tabulation.point_gradients(p);
            for (i, dphi) in reference.chunks_exact(2 * rvs).enumerate() {
                self.map_type.push_forward_gradient(
                    dphi,
                    &geometry.jacobian,
                    &geometry.inverse_jacobian,
                    geometry.det_jacobian,
                    mapped,
                );
                for k in 0..bs {
                    let w = local[i * bs + k];
                    for (g, m) in gradients[2 * k * rvs..2 * (k + 1) * rvs].iter_mut().zip(mapped.iter()) {
                        *g += w * *m;
                    }
                }
            }
        }
    }

    /// Physical values of every local basis function, indexed `[point][component][local dof]`.
    fn basis_values(&self, geometry: &CellGeometry<T>, signs: Option<&[T]>, mapped: &mut Vec<T>, out: &mut Vec<T>) {
        let (bs, rvs, vs) = (self.block_size, self.reference_value_size, self.value_size());
        let n = self.num_local_dofs();
        out.clear();
        out.resize(self.tabulation.num_points() * vs * n, T::zero());
        mapped.resize(rvs, T::zero());
        for (p, values) in out.chunks_exact_mut(vs * n).enumerate() {
            let reference = self.tabulation.point_values(p);
            for (i, phi) in reference.chunks_exact(rvs).enumerate() {
                self.map_type
                    .push_forward(phi, &geometry.jacobian, geometry.det_jacobian, mapped);
                let sign = signs.map(|s| s[i]).unwrap_or_else(T::one);
                for k in 0..bs {
                    for r in 0..rvs {
                        values[(k * rvs + r) * n + i * bs + k] = sign * mapped[r];
                    }
                }
            }
        }
    }

    /// Physical gradients of every local basis function, indexed
    /// `[point][component][derivative][local dof]`.
    fn basis_gradients(&self, geometry: &CellGeometry<T>, signs: Option<&[T]>, mapped: &mut Vec<T>, out: &mut Vec<T>) {
        let (bs, rvs, vs) = (self.block_size, self.reference_value_size, self.value_size());
        let n = self.num_local_dofs();
        out.clear();
        out.resize(2 * self.tabulation.num_points() * vs * n, T::zero());
        mapped.resize(2 * rvs, T::zero());
        for (p, gradients) in out.chunks_exact_mut(2 * vs * n).enumerate() {
            let reference = self.tabulation.point_gradients(p);
            for (i, dphi) in reference.chunks_exact(2 * rvs).enumerate() {
                self.map_type.push_forward_gradient(
                    dphi,
                    &geometry.jacobian,
                    &geometry.inverse_jacobian,
                    geometry.det_jacobian,
                    mapped,
                );
                let sign = signs.map(|s| s[i]).unwrap_or_else(T::one);
                for k in 0..bs {
                    for (j, m) in mapped.iter().enumerate() {
                        gradients[(2 * k * rvs + j) * n + i * bs + k] = sign * *m;
                    }
                }
            }
        }
    }
}

/// Scratch data for evaluating an expression on a single cell.
#[derive(Debug)]
pub(crate) struct EvaluationWorkspace<T: Real> {
    scratch: Vec<T>,
    local_coefficients: Vec<T>,
    mapped: Vec<T>,
    physical_points: Vec<Point2<T>>,
    coefficient_values: Vec<Vec<T>>,
    coefficient_gradients: Vec<Vec<T>>,
    argument_values: Vec<T>,
    argument_gradients: Vec<T>,
}

impl<T: Real> Default for EvaluationWorkspace<T> {
    fn default() -> Self {
        Self {
            scratch: Vec::new(),
            local_coefficients: Vec::new(),
            mapped: Vec::new(),
            physical_points: Vec::new(),
            coefficient_values: Vec::new(),
            coefficient_gradients: Vec::new(),
            argument_values: Vec::new(),
            argument_gradients: Vec::new(),
        }
    }
}

/// A compiled program together with the tabulated bases of the spaces it references.
#[derive(Debug, Clone)]
pub(crate) struct Kernel<T: Real> {
    pub program: Program<T>,
    pub points: Vec<Point2<T>>,
    pub coefficient_bases: Vec<TabulatedSpace<T>>,
    pub argument_basis: Option<TabulatedSpace<T>>,
}

impl<T: Real> Kernel<T> {
    pub fn new(program: Program<T>, points: Vec<Point2<T>>) -> Result<Self, Error> {
        let coefficient_bases = program
            .coefficients
            .iter()
            .map(|c| TabulatedSpace::new(c.function.space(), &points, c.gradients))
            .collect::<Result<Vec<_>, _>>()?;
        let argument_basis = program
            .argument
            .as_ref()
            .map(|argument| TabulatedSpace::new(&argument.space, &points, argument.gradients))
            .transpose()?;
        Ok(Self {
            program,
            points,
            coefficient_bases,
            argument_basis,
        })
    }

    pub fn mesh(&self) -> Option<&Mesh<T>> {
        self.program.mesh.as_deref()
    }

    /// The number of values per point, including the argument dimension.
    pub fn point_stride(&self) -> usize {
        let size: usize = self.program.value_shape.iter().product();
        size * self.program.argument_width()
    }

    /// Evaluates the expression on a single cell.
    ///
    /// `out` holds `point_stride()` values for each point. The cell index must be valid for the
    /// mesh of the expression.
    pub fn evaluate_cell(&self, cell: usize, ws: &mut EvaluationWorkspace<T>, out: &mut [T]) {
        let stride = self.point_stride();
        debug_assert_eq!(out.len(), stride * self.points.len());

        let geometry = self.mesh().map(|mesh| mesh.cell_geometry(cell));
        if let Some(geometry) = &geometry {
            self.prepare_cell(cell, geometry, ws);
        }

        let EvaluationWorkspace {
            scratch,
            physical_points,
            coefficient_values,
            coefficient_gradients,
            argument_values,
            argument_gradients,
            ..
        } = ws;
        scratch.resize(self.program.scratch_len, T::zero());

        for (p, point_out) in out.chunks_exact_mut(stride.max(1)).enumerate() {
            self.program.execute(scratch, |source, buffer| {
                let n = buffer.len();
                match source {
                    Source::Coefficient(c) => buffer.copy_from_slice(&coefficient_values[c][p * n..(p + 1) * n]),
                    Source::CoefficientGradient(c) => {
                        buffer.copy_from_slice(&coefficient_gradients[c][p * n..(p + 1) * n])
                    }
                    Source::Argument => buffer.copy_from_slice(&argument_values[p * n..(p + 1) * n]),
                    Source::ArgumentGradient => buffer.copy_from_slice(&argument_gradients[p * n..(p + 1) * n]),
                    Source::SpatialCoordinate => {
                        buffer[0] = physical_points[p].x;
                        buffer[1] = physical_points[p].y;
                    }
                    Source::Constant(_) => {}
                }
            });
            point_out.copy_from_slice(self.program.result(scratch));
        }
    }

    fn prepare_cell(&self, cell: usize, geometry: &CellGeometry<T>, ws: &mut EvaluationWorkspace<T>) {
        ws.physical_points.clear();
        ws.physical_points
            .extend(self.points.iter().map(|xi| geometry.map_reference_coords(xi)));

        let num_coefficients = self.coefficient_bases.len();
        ws.coefficient_values.resize_with(num_coefficients, Vec::new);
        ws.coefficient_gradients.resize_with(num_coefficients, Vec::new);
        for (c, usage, basis) in izip!(0.., &self.program.coefficients, &self.coefficient_bases) {
            let function = &usage.function;
            gather_local_coefficients(function.space(), function.x().as_slice(), cell, &mut ws.local_coefficients);
            basis.interpolate_values(
                geometry,
                &ws.local_coefficients,
                &mut ws.mapped,
                &mut ws.coefficient_values[c],
            );
            if usage.gradients {
                basis.interpolate_gradients(
                    geometry,
                    &ws.local_coefficients,
                    &mut ws.mapped,
                    &mut ws.coefficient_gradients[c],
                );
            }
        }

        if let (Some(argument), Some(basis)) = (&self.program.argument, &self.argument_basis) {
            let signs = argument.space.cell_dof_signs(cell);
            basis.basis_values(geometry, signs, &mut ws.mapped, &mut ws.argument_values);
            if argument.gradients {
                basis.basis_gradients(geometry, signs, &mut ws.mapped, &mut ws.argument_gradients);
            }
        }
    }
}

/// Collects the coefficients of a cell in local dof order `i * bs + k`, with dof signs applied.
fn gather_local_coefficients<T: Real>(space: &FunctionSpace<T>, x: &[T], cell: usize, local: &mut Vec<T>) {
    let dofmap = space.dofmap();
    let bs = dofmap.bs();
    local.clear();
    local.extend(dofmap.cell_dofs_unrolled(cell).map(|dof| x[dof]));
    if let Some(signs) = space.cell_dof_signs(cell) {
        for (block, sign) in local.chunks_exact_mut(bs).zip(signs) {
            for value in block {
                *value *= *sign;
            }
        }
    }
}
