//! Compiled expressions, evaluated cell by cell.
//!
//! An [`Expression`] pairs a symbolic [`Expr`] with a fixed, ordered set of points on the
//! reference triangle. Evaluating it on a list of cells gives a matrix with one row per cell, in
//! the order of the input. Cells may be repeated and need not be sorted.
//!
//! # Layout
//!
//! Rows are laid out point-major. For point `p`, flattened value component `c` (row-major over
//! the value shape) and argument dof `d`, the value is stored in column
//! `(p * value_size + c) * argument_dofs + d`, where `argument_dofs` is one if the expression has
//! no argument. For a rank one expression, each row can therefore be reshaped row-major into a
//! local matrix with `num_points * value_size` rows and `argument_dofs` columns.
use crate::error::Error;
use crate::expr::Expr;
use crate::mesh::Mesh;
use crate::space::FunctionSpace;
use crate::Real;
use davenport::{define_thread_local_workspace, with_thread_local_workspace};
use kernel::{EvaluationWorkspace, Kernel};
use log::debug;
use nalgebra::{DMatrix, Point2};
use program::Program;
use rayon::prelude::*;
use std::sync::Arc;

mod kernel;
mod program;

define_thread_local_workspace!(WORKSPACE);

/// An expression compiled for evaluation at a fixed set of reference points.
#[derive(Debug, Clone)]
pub struct Expression<T: Real> {
    kernel: Kernel<T>,
}

impl<T: Real> Expression<T> {
    /// Compiles an expression for the given reference points, one point per row.
    ///
    /// Returns [`Error::Dimension`] if the points do not have two coordinates.
    pub fn new(expr: &Expr<T>, points: &DMatrix<T>) -> Result<Self, Error> {
        if points.ncols() != 2 {
            return Err(Error::Dimension {
                expected: 2,
                actual: points.ncols(),
            });
        }
        let points: Vec<_> = points
            .row_iter()
            .map(|row| Point2::new(row[0], row[1]))
            .collect();
        Self::from_points(expr, &points)
    }

    /// Compiles an expression for the given reference points.
    pub fn from_points(expr: &Expr<T>, points: &[Point2<T>]) -> Result<Self, Error> {
        let expr = expr.apply_derivatives()?;
        let program = Program::compile(&expr)?;
        let kernel = Kernel::new(program, points.to_vec())?;
        debug!(
            "Compiled expression {:?} with {} instructions, {} coefficients and rank {} at {} points",
            expr,
            kernel.program.instructions.len(),
            kernel.program.coefficients.len(),
            usize::from(kernel.program.argument.is_some()),
            points.len()
        );
        Ok(Self { kernel })
    }

    /// The reference points, one per row.
    pub fn points(&self) -> DMatrix<T> {
        let points = &self.kernel.points;
        DMatrix::from_fn(points.len(), 2, |i, j| points[i][j])
    }

    /// The number of reference points.
    pub fn num_points(&self) -> usize {
        self.kernel.points.len()
    }

    /// Shape of the expression value at a single point.
    pub fn value_shape(&self) -> &[usize] {
        &self.kernel.program.value_shape
    }

    /// The number of value components per point, excluding the argument dimension.
    pub fn value_size(&self) -> usize {
        self.value_shape().iter().product()
    }

    /// The number of arguments, 0 or 1.
    pub fn rank(&self) -> usize {
        usize::from(self.kernel.program.argument.is_some())
    }

    /// The function space of the argument, if the expression has one.
    pub fn argument_space(&self) -> Option<&Arc<FunctionSpace<T>>> {
        self.kernel
            .program
            .argument
            .as_ref()
            .map(|argument| &argument.space)
    }

    /// The mesh of the functions in the expression, if it references any.
    pub fn mesh(&self) -> Option<&Arc<Mesh<T>>> {
        self.kernel.program.mesh.as_ref()
    }

    /// The number of columns of the evaluation result.
    pub fn num_columns(&self) -> usize {
        self.num_points() * self.kernel.point_stride()
    }

    /// Evaluates the expression on the given cells.
    ///
    /// Returns [`Error::CellIndexOutOfBounds`] without evaluating anything if any cell is not a
    /// local or ghost cell of the mesh.
    pub fn eval(&self, cells: &[usize]) -> Result<DMatrix<T>, Error> {
        let values = self.eval_row_major(cells)?;
        Ok(DMatrix::from_row_slice(cells.len(), self.num_columns(), &values))
    }

    /// Evaluates the expression into a preallocated matrix of shape
    /// `(cells.len(), num_columns())`.
    pub fn eval_into(&self, cells: &[usize], result: &mut DMatrix<T>) -> Result<(), Error> {
        if result.nrows() != cells.len() {
            return Err(Error::ShapeMismatch {
                what: "result rows",
                expected: cells.len(),
                actual: result.nrows(),
            });
        }
        if result.ncols() != self.num_columns() {
            return Err(Error::ShapeMismatch {
                what: "result columns",
                expected: self.num_columns(),
                actual: result.ncols(),
            });
        }
        let values = self.eval_row_major(cells)?;
        let ncols = self.num_columns();
        if ncols > 0 {
            for (mut row, values) in result.row_iter_mut().zip(values.chunks_exact(ncols)) {
                row.iter_mut()
                    .zip(values)
                    .for_each(|(r, v)| *r = *v);
            }
        }
        Ok(())
    }

    /// Evaluates the expression on the given cells in parallel.
    ///
    /// The result is identical to the result of [`Expression::eval`].
    pub fn eval_par(&self, cells: &[usize]) -> Result<DMatrix<T>, Error> {
        self.check_cells(cells)?;
        let ncols = self.num_columns();
        let mut values = vec![T::zero(); cells.len() * ncols];
        if ncols > 0 {
            values
                .par_chunks_mut(ncols)
                .zip(cells.par_iter())
                .for_each(|(row, cell)| {
                    with_thread_local_workspace(&WORKSPACE, |ws: &mut EvaluationWorkspace<T>| {
                        self.kernel.evaluate_cell(*cell, ws, row)
                    })
                });
        }
        Ok(DMatrix::from_row_slice(cells.len(), ncols, &values))
    }

    /// Evaluates the expression and returns the rows concatenated.
    pub fn eval_row_major(&self, cells: &[usize]) -> Result<Vec<T>, Error> {
        self.check_cells(cells)?;
        let ncols = self.num_columns();
        let mut values = vec![T::zero(); cells.len() * ncols];
        if ncols > 0 {
            with_thread_local_workspace(&WORKSPACE, |ws: &mut EvaluationWorkspace<T>| {
                for (cell, row) in cells.iter().zip(values.chunks_exact_mut(ncols)) {
                    self.kernel.evaluate_cell(*cell, ws, row);
                }
            });
        }
        debug!("Evaluated expression on {} cells", cells.len());
        Ok(values)
    }

    fn check_cells(&self, cells: &[usize]) -> Result<(), Error> {
        match self.kernel.mesh() {
            Some(mesh) => mesh.check_cell_indices(cells),
            None => Ok(()),
        }
    }
}
