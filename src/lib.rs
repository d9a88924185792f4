//! Compiled evaluation of finite element expressions on triangle meshes.
//!
//! An [`Expression`](crate::expression::Expression) is built from a symbolic
//! [`Expr`](crate::expr::Expr) and a fixed set of points on the reference triangle. It can then be
//! evaluated on arbitrary lists of cells, producing one row of values per cell. The values can be
//! scattered into [`Function`](crate::function::Function)s or assembled into sparse matrices with
//! the routines in [`scatter`].
//!
//! The reference triangle has the vertices $(0, 0)$, $(1, 0)$ and $(0, 1)$.
use nalgebra::RealField;

pub mod dofmap;
pub mod element;
pub mod error;
pub mod expr;
pub mod expression;
pub mod function;
pub mod mesh;
pub mod quadrature;
pub mod scatter;
pub mod space;
pub mod sparsity;

#[cfg(feature = "proptest")]
pub mod proptest;

pub use error::Error;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// Real scalar types supported by the library.
///
/// Used as a trait alias for the traits needed by generic routines.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
