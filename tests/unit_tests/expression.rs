use fenris_expr::element::FiniteElement;
use fenris_expr::expr::Expr;
use fenris_expr::expression::Expression;
use fenris_expr::function::{Constant, Function};
use fenris_expr::mesh::procedural::create_unit_square;
use fenris_expr::mesh::Mesh;
use fenris_expr::proptest::permute_cell_vertices;
use fenris_expr::space::FunctionSpace;
use fenris_expr::Error;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, Point2};
use std::sync::Arc;

fn vertices() -> DMatrix<f64> {
    DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0])
}

fn p1_space(mesh: &Arc<Mesh<f64>>) -> Arc<FunctionSpace<f64>> {
    Arc::new(FunctionSpace::new(Arc::clone(mesh), FiniteElement::lagrange(1).unwrap()))
}

#[test]
fn points_must_be_two_dimensional() {
    let points = DMatrix::zeros(2, 3);
    assert_eq!(
        Expression::new(&Expr::literal(1.0), &points).map(|_| ()),
        Err(Error::Dimension {
            expected: 2,
            actual: 3
        })
    );
}

#[test]
fn constant_expression_without_mesh() {
    let a = Expr::constant(Constant::tensor(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap());
    let expression = Expression::new(&(a * 2.0), &vertices()).unwrap();
    assert_eq!(expression.points(), vertices());
    assert_eq!(expression.num_points(), 3);
    assert_eq!(expression.value_shape(), &[2, 2]);
    assert_eq!(expression.value_size(), 4);
    assert_eq!(expression.rank(), 0);
    assert!(expression.mesh().is_none());
    assert!(expression.argument_space().is_none());
    assert_eq!(expression.num_columns(), 12);

    // Without a mesh, cell indices are not validated
    let values = expression.eval(&[7, 100]).unwrap();
    let row = [2.0, 4.0, 6.0, 8.0];
    let expected_row: Vec<f64> = row.iter().cycle().take(12).copied().collect();
    assert_eq!(values.nrows(), 2);
    for i in 0..2 {
        assert_eq!(values.row(i).iter().copied().collect::<Vec<_>>(), expected_row);
    }
}

#[test]
fn argument_values_at_vertices_are_identity() {
    let mesh = Arc::new(create_unit_square(2, 2));
    let u = Expr::argument(p1_space(&mesh));
    let expression = Expression::new(&u, &vertices()).unwrap();
    assert_eq!(expression.rank(), 1);
    assert_eq!(expression.num_columns(), 9);

    let values = expression.eval(&[0, 5]).unwrap();
    let identity = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
    let expected = DMatrix::from_row_slice(2, 9, &[identity, identity].concat());
    assert_matrix_eq!(values, expected, comp = abs, tol = 1e-14);
}

#[test]
fn argument_gradient_layout() {
    let mesh = Arc::new(create_unit_square(1, 1));
    let u = Expr::argument(p1_space(&mesh));
    let points = DMatrix::from_row_slice(1, 2, &[0.25, 0.25]);
    let expression = Expression::new(&u.grad(), &points).unwrap();
    assert_eq!(expression.value_shape(), &[2]);

    // Cell 0 is (0, 0), (1, 0), (1, 1) with basis 1 - x, x - y and y
    let values = expression.eval(&[0]).unwrap();
    let expected = DMatrix::from_row_slice(1, 6, &[-1.0, 1.0, 0.0, 0.0, -1.0, 1.0]);
    assert_matrix_eq!(values, expected, comp = abs, tol = 1e-14);
}

#[test]
fn argument_broadcasts_against_coefficients() {
    let mesh = Arc::new(create_unit_square(1, 1));
    let space = p1_space(&mesh);
    let mut f = Function::new(Arc::clone(&space));
    f.interpolate_scalar(|x| 1.0 + x.x).unwrap();
    let f = Expr::coefficient(Arc::new(f));
    let u = Expr::argument(space);
    let a = Expr::constant(Constant::vector(&[1.0, -1.0]));

    // f * grad(u) outer (1, -1), then the first row
    let e = (f * u.grad()).outer(a).index(0);
    let points = DMatrix::from_row_slice(1, 2, &[0.5, 0.0]);
    let expression = Expression::new(&e, &points).unwrap();
    assert_eq!(expression.value_shape(), &[2]);

    // At (0.5, 0) on cell 0, f = 1.5 and du/dx = (-1, 1, 0)
    let values = expression.eval(&[0]).unwrap();
    let expected = DMatrix::from_row_slice(1, 6, &[-1.5, 1.5, 0.0, 1.5, -1.5, 0.0]);
    assert_matrix_eq!(values, expected, comp = abs, tol = 1e-14);
}

#[test]
fn spatial_coordinate_and_elementary_functions() {
    let mesh = Arc::new(create_unit_square(2, 2));
    let x = Expr::spatial_coordinate(Arc::clone(&mesh));
    let e = x.clone().index(0).sin() * x.clone().index(1).exp() + x.clone().index(0).powf(2.0).sqrt()
        - (x.index(1) + 1.0).ln() / 2.0;
    let expression = Expression::new(&e, &vertices()).unwrap();

    let cells: Vec<_> = (0..mesh.num_cells()).collect();
    let values = expression.eval(&cells).unwrap();
    for &cell in &cells {
        for (p, v) in mesh.cell_coordinates(cell).iter().enumerate() {
            let expected = v.x.sin() * v.y.exp() + v.x - (v.y + 1.0).ln() / 2.0;
            assert!((values[(cell, p)] - expected).abs() < 1e-13);
        }
    }
}

#[test]
fn chain_rule_matches_closed_form_gradient() {
    let mesh = Arc::new(create_unit_square(2, 2));
    let x = Expr::spatial_coordinate(Arc::clone(&mesh));
    // grad(sin(x0) * x1^2 / (1 + x0)) in closed form
    let e = (x.clone().index(0).sin() * x.clone().index(1).powf(2.0) / (x.index(0) + 1.0)).grad();
    let points = DMatrix::from_row_slice(2, 2, &[0.2, 0.3, 0.6, 0.1]);
    let expression = Expression::new(&e, &points).unwrap();
    let values = expression.eval(&[3]).unwrap();

    let cmap = mesh.geometry().cmap();
    let reference: [Point2<f64>; 2] = [Point2::new(0.2, 0.3), Point2::new(0.6, 0.1)];
    let physical = cmap.push_forward(&reference, &mesh.cell_coordinates(3));
    for (p, v) in physical.iter().enumerate() {
        let (s, t) = (v.x, v.y);
        let dx = (s.cos() * (1.0 + s) - s.sin()) * t * t / ((1.0 + s) * (1.0 + s));
        let dy = s.sin() * 2.0 * t / (1.0 + s);
        assert!((values[(0, 2 * p)] - dx).abs() < 1e-13);
        assert!((values[(0, 2 * p + 1)] - dy).abs() < 1e-13);
    }
}

#[test]
fn eval_into_checks_shape() {
    let mesh = Arc::new(create_unit_square(1, 1));
    let x = Expr::spatial_coordinate(mesh);
    let expression = Expression::new(&x, &vertices()).unwrap();

    let mut wrong_rows = DMatrix::zeros(1, 6);
    assert_eq!(
        expression.eval_into(&[0, 1], &mut wrong_rows),
        Err(Error::ShapeMismatch {
            what: "result rows",
            expected: 2,
            actual: 1
        })
    );
    let mut wrong_cols = DMatrix::zeros(2, 5);
    assert_eq!(
        expression.eval_into(&[0, 1], &mut wrong_cols),
        Err(Error::ShapeMismatch {
            what: "result columns",
            expected: 6,
            actual: 5
        })
    );

    let mut result = DMatrix::zeros(2, 6);
    expression.eval_into(&[1, 0], &mut result).unwrap();
    let expected = DMatrix::from_row_slice(2, 6, &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
    assert_matrix_eq!(result, expected, comp = abs, tol = 1e-14);
}

#[test]
fn invalid_cells_are_rejected() {
    let mesh = Arc::new(create_unit_square(1, 1));
    let x = Expr::spatial_coordinate(mesh);
    let expression = Expression::new(&x, &vertices()).unwrap();
    let expected = Err(Error::CellIndexOutOfBounds { index: 2, num_cells: 2 });
    assert_eq!(expression.eval(&[0, 2]).map(|_| ()), expected);
    assert_eq!(expression.eval_par(&[2]).map(|_| ()), expected);
    assert_eq!(expression.eval_row_major(&[1, 2, 0]).map(|_| ()), expected);
}

#[test]
fn empty_inputs() {
    let mesh = Arc::new(create_unit_square(1, 1));
    let x = Expr::spatial_coordinate(mesh);

    let expression = Expression::new(&x, &vertices()).unwrap();
    let values = expression.eval(&[]).unwrap();
    assert_eq!((values.nrows(), values.ncols()), (0, 6));

    let expression = Expression::new(&x, &DMatrix::zeros(0, 2)).unwrap();
    assert_eq!(expression.num_columns(), 0);
    let values = expression.eval_par(&[0, 1, 1]).unwrap();
    assert_eq!((values.nrows(), values.ncols()), (3, 0));
}

#[test]
fn compilation_errors() {
    let mesh = Arc::new(create_unit_square(1, 1));
    let other_mesh = Arc::new(create_unit_square(1, 1));
    let space = p1_space(&mesh);
    let other_space = Arc::new(FunctionSpace::new(Arc::clone(&mesh), FiniteElement::lagrange(2).unwrap()));
    let points = vertices();

    let f = Expr::coefficient(Arc::new(Function::new(Arc::clone(&space))));
    let g = Expr::coefficient(Arc::new(Function::new(p1_space(&other_mesh))));
    let compile = |e: Expr<f64>| Expression::new(&e, &points).map(|_| ());

    assert!(matches!(compile(f.clone() * g), Err(Error::Compilation(_))));
    assert!(matches!(
        compile(Expr::argument(Arc::clone(&space)) + Expr::argument(other_space)),
        Err(Error::Compilation(_))
    ));
    assert!(matches!(
        compile(Expr::argument(Arc::clone(&space)) * Expr::argument(space)),
        Err(Error::Compilation(_))
    ));
    assert!(matches!(compile(f.clone().grad().grad()), Err(Error::Compilation(_))));
    assert!(matches!(compile(f.clone() + f.grad()), Err(Error::Compilation(_))));

    // Quadrature functions can only be evaluated at their own points
    let quadrature = Arc::new(FunctionSpace::new(
        Arc::clone(&mesh),
        FiniteElement::quadrature_with_strength(2).unwrap(),
    ));
    let q = Expr::coefficient(Arc::new(Function::new(quadrature)));
    assert!(matches!(compile(q), Err(Error::Compilation(_))));
}

#[test]
fn gradient_of_vector_lagrange_coefficient() {
    let mesh = Arc::new(create_unit_square(2, 3));
    let element = FiniteElement::lagrange(2).unwrap().blocked(2).unwrap();
    let space = Arc::new(FunctionSpace::new(Arc::clone(&mesh), element));
    let mut f = Function::new(space);
    f.interpolate(|x| DVector::from_column_slice(&[x.x * x.x, x.x * x.y]))
        .unwrap();

    let e = Expr::coefficient(Arc::new(f)).grad();
    let reference = [Point2::new(0.2, 0.3), Point2::new(0.6, 0.1)];
    let expression = Expression::from_points(&e, &reference).unwrap();
    assert_eq!(expression.value_shape(), &[2, 2]);

    let cells: Vec<_> = (0..mesh.num_cells()).collect();
    let values = expression.eval(&cells).unwrap();
    let cmap = mesh.geometry().cmap();
    for &cell in &cells {
        let physical = cmap.push_forward(&reference, &mesh.cell_coordinates(cell));
        for (p, v) in physical.iter().enumerate() {
            // Row-major [component][derivative]
            let expected = [2.0 * v.x, 0.0, v.y, v.x];
            for (k, expected) in expected.iter().enumerate() {
                assert_scalar_eq!(values[(cell, 4 * p + k)], *expected, comp = abs, tol = 1e-12);
            }
        }
    }
}

#[test]
fn gradient_of_raviart_thomas_coefficient() {
    // Both fields lie in the respective Raviart-Thomas space, so interpolation is exact
    let linear = |x: &Point2<f64>| DVector::from_column_slice(&[x.x + 0.5, x.y - 0.2]);
    let linear_gradient = |_: &Point2<f64>| [1.0, 0.0, 0.0, 1.0];
    let quadratic = |x: &Point2<f64>| DVector::from_column_slice(&[x.x * x.x + 1.0, x.x * x.y - x.y]);
    let quadratic_gradient = |x: &Point2<f64>| [2.0 * x.x, 0.0, x.y, x.x - 1.0];

    // Reordered cell vertices give reflected edges and cells of both orientations
    let mesh = create_unit_square(3, 2);
    let permutations: Vec<_> = (0..mesh.num_cells()).collect();
    let mesh = Arc::new(permute_cell_vertices(&mesh, &permutations));

    let cases: [(usize, &dyn Fn(&Point2<f64>) -> DVector<f64>, &dyn Fn(&Point2<f64>) -> [f64; 4]); 2] =
        [(1, &linear, &linear_gradient), (2, &quadratic, &quadratic_gradient)];
    for (degree, field, gradient) in cases {
        let rt = Arc::new(FunctionSpace::new(
            Arc::clone(&mesh),
            FiniteElement::raviart_thomas(degree).unwrap(),
        ));
        let mut f = Function::new(rt);
        f.interpolate(field).unwrap();

        let reference = [Point2::new(0.1, 0.2), Point2::new(0.5, 0.4), Point2::new(0.0, 0.7)];
        let u = Expr::coefficient(Arc::new(f));
        let expression = Expression::from_points(&u.grad(), &reference).unwrap();
        let cells: Vec<_> = (0..mesh.num_cells()).collect();
        let values = expression.eval(&cells).unwrap();

        let cmap = mesh.geometry().cmap();
        for &cell in &cells {
            let physical = cmap.push_forward(&reference, &mesh.cell_coordinates(cell));
            for (p, v) in physical.iter().enumerate() {
                for (k, expected) in gradient(v).iter().enumerate() {
                    assert_scalar_eq!(values[(cell, 4 * p + k)], *expected, comp = abs, tol = 1e-12);
                }
            }
        }
    }
}

#[test]
fn raviart_thomas_argument_gradient_contracts_to_coefficient_gradient() {
    let mesh = create_unit_square(2, 2);
    let permutations = [3, 1, 4, 0, 5, 2];
    let mesh = Arc::new(permute_cell_vertices(&mesh, &permutations));
    let rt = Arc::new(FunctionSpace::new(Arc::clone(&mesh), FiniteElement::raviart_thomas(2).unwrap()));
    let mut w = Function::new(Arc::clone(&rt));
    w.interpolate(|x| DVector::from_column_slice(&[(2.0 * x.y).sin(), x.x * x.x - x.y]))
        .unwrap();
    let w = Arc::new(w);

    let points = DMatrix::from_row_slice(2, 2, &[0.3, 0.3, 0.1, 0.8]);
    let bilinear = Expression::new(&Expr::argument(Arc::clone(&rt)).grad(), &points).unwrap();
    let linear = Expression::new(&Expr::coefficient(Arc::clone(&w)).grad(), &points).unwrap();
    assert_eq!(bilinear.num_columns(), 8 * linear.num_columns());

    let cells: Vec<_> = (0..mesh.num_cells()).collect();
    let a = bilinear.eval(&cells).unwrap();
    let expected = linear.eval(&cells).unwrap();
    for &cell in &cells {
        let local: Vec<f64> = rt.dofmap().cell_dofs(cell).iter().map(|dof| w.x()[*dof]).collect();
        for j in 0..linear.num_columns() {
            let contracted: f64 = (0..8).map(|d| a[(cell, 8 * j + d)] * local[d]).sum();
            assert_scalar_eq!(contracted, expected[(cell, j)], comp = abs, tol = 1e-12);
        }
    }
}
