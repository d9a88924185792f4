//! Finite element functions and constants.
use crate::error::Error;
use crate::expr::Expr;
use crate::expression::Expression;
use crate::space::FunctionSpace;
use crate::Real;
use log::debug;
use nalgebra::{DVector, Point2};
use std::sync::Arc;

/// A function in a finite element space, represented by its coefficient vector.
///
/// The coefficient of local dof `i` and block component `k` on a cell is stored at
/// `bs * space.dofmap().cell_dofs(cell)[i] + k`.
#[derive(Debug, Clone)]
pub struct Function<T: Real> {
    space: Arc<FunctionSpace<T>>,
    x: DVector<T>,
    name: String,
}

impl<T: Real> Function<T> {
    /// A function with all coefficients set to zero.
    pub fn new(space: Arc<FunctionSpace<T>>) -> Self {
        let x = DVector::zeros(space.num_coefficients());
        Self {
            space,
            x,
            name: String::from("f"),
        }
    }

    pub fn from_vector(space: Arc<FunctionSpace<T>>, x: DVector<T>) -> Result<Self, Error> {
        if x.len() != space.num_coefficients() {
            return Err(Error::ShapeMismatch {
                what: "coefficient vector",
                expected: space.num_coefficients(),
                actual: x.len(),
            });
        }
        Ok(Self {
            space,
            x,
            name: String::from("f"),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space(&self) -> &Arc<FunctionSpace<T>> {
        &self.space
    }

    pub fn x(&self) -> &DVector<T> {
        &self.x
    }

    pub fn x_mut(&mut self) -> &mut DVector<T> {
        &mut self.x
    }

    /// Interpolates a closure, called with physical coordinates and returning `value_size`
    /// components.
    pub fn interpolate(&mut self, f: impl Fn(&Point2<T>) -> DVector<T>) -> Result<(), Error> {
        let space = Arc::clone(&self.space);
        let mesh = space.mesh();
        let cmap = mesh.geometry().cmap();
        let value_size = space.value_size();
        let mut values = Vec::with_capacity(space.interpolation_points().len() * value_size);

        for cell in 0..mesh.num_cells() {
            values.clear();
            let points = cmap.push_forward(space.interpolation_points(), &mesh.cell_coordinates(cell));
            for point in &points {
                let value = f(point);
                if value.len() != value_size {
                    return Err(Error::ShapeMismatch {
                        what: "interpolated function value",
                        expected: value_size,
                        actual: value.len(),
                    });
                }
                values.extend(value.iter().copied());
            }
            space.interpolate_cell_values(cell, &values, self.x.as_mut_slice())?;
        }
        Ok(())
    }

    /// Interpolates a scalar closure into a space with a single component.
    pub fn interpolate_scalar(&mut self, f: impl Fn(&Point2<T>) -> T) -> Result<(), Error> {
        self.interpolate(|x| DVector::from_element(1, f(x)))
    }

    /// Interpolates another function on the same mesh into this function.
    ///
    /// The source is evaluated at the interpolation points of this function's element on every
    /// cell.
    pub fn interpolate_from(&mut self, source: &Arc<Function<T>>) -> Result<(), Error> {
        self.interpolate_expr(&Expr::coefficient(Arc::clone(source)))
    }

    /// Interpolates a rank 0 expression whose value shape matches this function's space.
    pub fn interpolate_expr(&mut self, expr: &Expr<T>) -> Result<(), Error> {
        let space = Arc::clone(&self.space);
        let expression = Expression::from_points(expr, space.interpolation_points())?;
        if let Some(mesh) = expression.mesh() {
            if !Arc::ptr_eq(mesh, space.mesh()) {
                return Err(Error::Compilation(
                    "can not interpolate between functions on different meshes".to_string(),
                ));
            }
        }
        if expression.rank() != 0 {
            return Err(Error::Compilation(
                "only expressions without arguments can be interpolated".to_string(),
            ));
        }
        if expression.value_size() != space.value_size() {
            return Err(Error::ShapeMismatch {
                what: "interpolated expression value size",
                expected: space.value_size(),
                actual: expression.value_size(),
            });
        }

        let cells: Vec<usize> = (0..space.mesh().num_cells()).collect();
        let values = expression.eval_row_major(&cells)?;
        let stride = expression.num_columns();
        debug!("Interpolating expression into {} on {} cells", self.name, cells.len());
        if stride > 0 {
            for (cell, row) in cells.iter().zip(values.chunks_exact(stride)) {
                space.interpolate_cell_values(*cell, row, self.x.as_mut_slice())?;
            }
        }
        Ok(())
    }
}

/// A spatially constant scalar or tensor value.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant<T> {
    // Row-major
    value: Vec<T>,
    shape: Vec<usize>,
}

impl<T: Real> Constant<T> {
    pub fn scalar(value: T) -> Self {
        Self {
            value: vec![value],
            shape: Vec::new(),
        }
    }

    pub fn vector(values: &[T]) -> Self {
        Self {
            value: values.to_vec(),
            shape: vec![values.len()],
        }
    }

    /// A tensor with the given shape and row-major values.
    pub fn tensor(shape: Vec<usize>, value: Vec<T>) -> Result<Self, Error> {
        let size: usize = shape.iter().product();
        if value.len() != size {
            return Err(Error::ShapeMismatch {
                what: "constant value",
                expected: size,
                actual: value.len(),
            });
        }
        Ok(Self { value, shape })
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let size = shape.iter().product();
        Self {
            value: vec![T::zero(); size],
            shape,
        }
    }

    /// The `n x n` identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut value = vec![T::zero(); n * n];
        for i in 0..n {
            value[i * n + i] = T::one();
        }
        Self {
            value,
            shape: vec![n, n],
        }
    }

    pub fn value(&self) -> &[T] {
        &self.value
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
}
