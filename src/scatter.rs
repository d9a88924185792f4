//! Scattering of evaluated expressions into functions and sparse matrices.
use crate::error::Error;
use crate::expression::Expression;
use crate::function::Function;
use crate::space::FunctionSpace;
use crate::sparsity::SparsityPattern;
use crate::Real;
use eyre::{eyre, WrapErr};
use log::debug;
use nalgebra::{distance, DMatrix, Point2};
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;

/// Writes evaluated values into the coefficient vector of a function.
///
/// Row `i` of `values` belongs to `cells[i]`. Column `bs * j + k` is written to the coefficient
/// of local dof `j` and block component `k`, i.e. to `bs * dofmap[cell][j] + k`. No dof
/// transformations are applied, so this is only meaningful for spaces whose dofs are point
/// values at the expression points.
pub fn scatter_into_function<T: Real>(
    function: &mut Function<T>,
    cells: &[usize],
    values: &DMatrix<T>,
) -> Result<(), Error> {
    let space = Arc::clone(function.space());
    let dofmap = space.dofmap();
    let local_size = dofmap.bs() * dofmap.dofs_per_cell();
    if values.nrows() != cells.len() {
        return Err(Error::ShapeMismatch {
            what: "scattered rows",
            expected: cells.len(),
            actual: values.nrows(),
        });
    }
    if values.ncols() != local_size {
        return Err(Error::ShapeMismatch {
            what: "scattered columns",
            expected: local_size,
            actual: values.ncols(),
        });
    }
    space.mesh().check_cell_indices(cells)?;

    let x = function.x_mut();
    for (i, cell) in cells.iter().enumerate() {
        for (j, dof) in dofmap.cell_dofs_unrolled(*cell).enumerate() {
            x[dof] = values[(i, j)];
        }
    }
    Ok(())
}

/// Assembles the matrix of a rank one expression interpolated into a target space.
///
/// The expression must be evaluated at the interpolation points of the target space, whose dofs
/// must be point values. The rows of the matrix are the coefficients of the target space and the
/// columns the coefficients of the argument space. Entries shared between cells are overwritten,
/// not added.
pub fn assemble_interpolation_matrix<T: Real>(
    expression: &Expression<T>,
    target: &FunctionSpace<T>,
) -> eyre::Result<CsrMatrix<T>> {
    let argument = expression
        .argument_space()
        .ok_or_else(|| eyre!("interpolation matrix requires an expression with an argument"))?;
    if !Arc::ptr_eq(argument.mesh(), target.mesh()) {
        return Err(eyre!("argument and target spaces are defined on different meshes"));
    }
    if !target.has_point_dofs() {
        return Err(eyre!(
            "target space with {:?} element does not have point dofs",
            target.element().family()
        ));
    }
    if expression.value_size() != target.value_size() {
        return Err(eyre!(
            "expression has value size {}, but target space has value size {}",
            expression.value_size(),
            target.value_size()
        ));
    }
    let tol = T::default_epsilon().sqrt();
    let points = expression.points();
    let target_points = target.interpolation_points();
    let same_points = points.nrows() == target_points.len()
        && target_points
            .iter()
            .enumerate()
            .all(|(i, p)| distance(p, &Point2::new(points[(i, 0)], points[(i, 1)])) <= tol);
    if !same_points {
        return Err(eyre!(
            "expression points do not match the interpolation points of the target space"
        ));
    }

    let target_dofmap = target.dofmap();
    let argument_dofmap = argument.dofmap();
    let num_cells = target.mesh().num_cells();
    let cells: Vec<usize> = (0..num_cells).collect();
    let values = expression
        .eval_par(&cells)
        .wrap_err("failed to evaluate interpolation expression")?;

    let mut pattern = SparsityPattern::new(target.num_coefficients(), argument.num_coefficients());
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    for &cell in &cells {
        rows.clear();
        cols.clear();
        rows.extend(target_dofmap.cell_dofs_unrolled(cell));
        cols.extend(argument_dofmap.cell_dofs_unrolled(cell));
        pattern.insert(&rows, &cols);
    }
    let pattern = pattern
        .build()
        .wrap_err("failed to build sparsity pattern")?;
    let nnz = pattern.nnz();
    let mut matrix = CsrMatrix::try_from_pattern_and_values(pattern, vec![T::zero(); nnz])
        .map_err(|err| eyre!("failed to create CSR matrix: {err}"))?;

    for &cell in &cells {
        cols.clear();
        cols.extend(argument_dofmap.cell_dofs_unrolled(cell));
        for (local_row, row) in target_dofmap.cell_dofs_unrolled(cell).enumerate() {
            let mut csr_row = matrix.row_mut(row);
            let (row_cols, row_values) = csr_row.cols_and_values_mut();
            for (local_col, col) in cols.iter().enumerate() {
                let index = row_cols
                    .binary_search(col)
                    .map_err(|_| eyre!("entry ({row}, {col}) is missing from the sparsity pattern"))?;
                row_values[index] = values[(cell, local_row * cols.len() + local_col)];
            }
        }
    }

    debug!(
        "Assembled {}x{} interpolation matrix with {} non-zeros",
        matrix.nrows(),
        matrix.ncols(),
        matrix.nnz()
    );
    Ok(matrix)
}
