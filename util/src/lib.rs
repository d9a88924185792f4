use nalgebra::{DMatrix, RealField};

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

/// Asserts that two slices agree entry-wise up to a combined absolute and relative tolerance,
/// in the sense of `|a - b| <= atol + rtol * |b|`.
#[macro_export]
macro_rules! assert_allclose {
    ($x:expr, $y:expr, rtol = $rtol:expr, atol = $atol:expr) => {{
        let x: &[f64] = $x;
        let y: &[f64] = $y;
        assert_eq!(x.len(), y.len(), "slices must have the same length");
        for (i, (a, b)) in x.iter().zip(y.iter()).enumerate() {
            let tol = $atol + $rtol * b.abs();
            if (a - b).abs() > tol {
                panic!("entry {i} differs: left = {a:e}, right = {b:e}, tolerance = {tol:e}");
            }
        }
    }};
}

/// Collects the given rows of a matrix, in the given order, into a new matrix.
pub fn select_rows<T: RealField>(matrix: &DMatrix<T>, rows: &[usize]) -> DMatrix<T> {
    matrix.select_rows(rows)
}

/// Returns a copy of the matrix with its rows in reverse order.
pub fn reverse_rows<T: RealField>(matrix: &DMatrix<T>) -> DMatrix<T> {
    let rows: Vec<_> = (0..matrix.nrows()).rev().collect();
    matrix.select_rows(&rows)
}
