use fenris_expr::element::FiniteElement;
use fenris_expr::expr::Expr;
use fenris_expr::expression::Expression;
use fenris_expr::function::{Constant, Function};
use fenris_expr::mesh::procedural::{create_rectangle, create_unit_square, Diagonal};
use fenris_expr::mesh::Mesh;
use fenris_expr::proptest::mesh_and_cells;
use fenris_expr::scatter::scatter_into_function;
use fenris_expr::space::FunctionSpace;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, Point2};
use proptest::prelude::*;
use std::sync::Arc;
use util::{assert_allclose, assert_approx_matrix_eq, reverse_rows, select_rows};

fn space(mesh: &Arc<Mesh<f64>>, element: FiniteElement<f64>) -> Arc<FunctionSpace<f64>> {
    Arc::new(FunctionSpace::new(Arc::clone(mesh), element))
}

fn all_cells(mesh: &Mesh<f64>) -> Vec<usize> {
    (0..mesh.num_cells()).collect()
}

#[test]
fn gradient_of_p2_function_scattered_into_vector_dg1() {
    let mesh = Arc::new(create_unit_square(5, 5));
    let p2 = space(&mesh, FiniteElement::lagrange(2).unwrap());
    let dg1 = space(&mesh, FiniteElement::discontinuous_lagrange(1).unwrap().blocked(2).unwrap());

    let mut f = Function::new(p2).with_name("f");
    f.interpolate_scalar(|x| x.x * x.x + 2.0 * x.y * x.y).unwrap();
    let grad_f = Expr::coefficient(Arc::new(f)).grad();

    let expression = Expression::from_points(&grad_f, dg1.interpolation_points()).unwrap();
    assert_eq!(expression.value_shape(), &[2]);
    let cells = all_cells(&mesh);
    let values = expression.eval(&cells).unwrap();
    let mut scattered = Function::new(Arc::clone(&dg1));
    scatter_into_function(&mut scattered, &cells, &values).unwrap();

    let mut expected = Function::new(dg1);
    expected
        .interpolate(|x| DVector::from_column_slice(&[2.0 * x.x, 4.0 * x.y]))
        .unwrap();
    assert_allclose!(
        scattered.x().as_slice(),
        expected.x().as_slice(),
        rtol = 0.0,
        atol = 1e-10
    );
}

#[test]
fn scaled_gradient_matches_exact_gradient_at_vertices() {
    let mesh = Arc::new(create_unit_square(3, 3));
    let p2 = space(&mesh, FiniteElement::lagrange(2).unwrap());
    let mut f = Function::new(p2).with_name("f");
    f.interpolate_scalar(|x| x.x * x.x + 2.0 * x.y * x.y).unwrap();

    let e = Expr::constant(Constant::scalar(3.0)) * Expr::coefficient(Arc::new(f)).grad();
    let points = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
    let expression = Expression::new(&e, &points).unwrap();
    let coordinates = Expression::new(&Expr::spatial_coordinate(Arc::clone(&mesh)), &points).unwrap();

    let cells = all_cells(&mesh);
    let values = expression.eval(&cells).unwrap();
    let x = coordinates.eval(&cells).unwrap();
    assert_eq!(values.shape(), (cells.len(), 6));
    for &cell in &cells {
        for p in 0..3 {
            let (x0, x1) = (x[(cell, 2 * p)], x[(cell, 2 * p + 1)]);
            assert_scalar_eq!(values[(cell, 2 * p)], 3.0 * 2.0 * x0, comp = abs, tol = 1e-12);
            assert_scalar_eq!(values[(cell, 2 * p + 1)], 3.0 * 4.0 * x1, comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn spatial_coordinate_at_vertices_gives_cell_coordinates() {
    let unit_square = create_unit_square(3, 3);
    let rectangle = create_rectangle(&Point2::new(-1.0, 0.5), &Point2::new(2.0, 1.5), 4, 2, Diagonal::Left);
    for mesh in [unit_square, rectangle] {
        let mesh = Arc::new(mesh);
        let x = Expr::spatial_coordinate(Arc::clone(&mesh));
        let points = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        let expression = Expression::new(&x, &points).unwrap();
        let cells = all_cells(&mesh);
        let values = expression.eval(&cells).unwrap();

        for &cell in &cells {
            let expected: Vec<f64> = mesh
                .cell_coordinates(cell)
                .iter()
                .flat_map(|v| [v.x, v.y])
                .collect();
            let row: Vec<f64> = values.row(cell).iter().copied().collect();
            assert_allclose!(&row, &expected, rtol = 0.0, atol = 1e-14);
        }
    }
}

#[test]
fn nonlinear_flux_evaluated_into_quadrature_function() {
    // e = B K^2 grad(T) with K = 1 / (A + B T)
    let (a, b) = (1.0, 2.0);
    let mesh = Arc::new(create_unit_square(3, 6));
    let p2 = space(&mesh, FiniteElement::lagrange(2).unwrap());
    let quadrature = space(
        &mesh,
        FiniteElement::quadrature_with_strength(2)
            .unwrap()
            .blocked(2)
            .unwrap(),
    );

    let mut temperature = Function::new(p2).with_name("T");
    temperature
        .interpolate_scalar(|x| x.x + 2.0 * x.y)
        .unwrap();
    let t = Expr::coefficient(Arc::new(temperature));
    let k = Expr::literal(1.0) / (t.clone() * b + a);
    let e = k.clone() * k * b * t.grad();

    let expression = Expression::from_points(&e, quadrature.interpolation_points()).unwrap();
    let cells = all_cells(&mesh);
    let values = expression.eval(&cells).unwrap();
    let mut flux = Function::new(Arc::clone(&quadrature)).with_name("e");
    scatter_into_function(&mut flux, &cells, &values).unwrap();

    let expected: Vec<f64> = quadrature
        .tabulate_dof_coordinates()
        .unwrap()
        .iter()
        .flat_map(|x| {
            let t = x.x + 2.0 * x.y;
            let k = 1.0 / (a + b * t);
            [b * k * k, 2.0 * b * k * k]
        })
        .collect();
    assert_allclose!(flux.x().as_slice(), &expected, rtol = 0.0, atol = 1e-12);
}

#[test]
fn evaluation_on_subsets_of_cells() {
    let mesh = Arc::new(create_unit_square(4, 3));
    let dg0 = space(&mesh, FiniteElement::lagrange(0).unwrap());
    let x = Expr::spatial_coordinate(Arc::clone(&mesh));
    let e = x.clone().index(0) + x.index(1) * 2.0;
    let expression = Expression::from_points(&e, dg0.interpolation_points()).unwrap();

    let cells = all_cells(&mesh);
    let all = expression.eval(&cells).unwrap();

    let single = expression.eval(&[5]).unwrap();
    assert_matrix_eq!(single, select_rows(&all, &[5]), comp = abs, tol = 0.0);

    let reversed: Vec<_> = cells.iter().rev().copied().collect();
    let values = expression.eval(&reversed).unwrap();
    assert_matrix_eq!(values, reverse_rows(&all), comp = abs, tol = 0.0);

    let strided: Vec<_> = cells.iter().rev().step_by(2).copied().collect();
    let values = expression.eval(&strided).unwrap();
    assert_matrix_eq!(values, select_rows(&all, &strided), comp = abs, tol = 0.0);
}

#[test]
fn rank_one_expression_applied_to_coefficients() {
    // Contracting the rows of u * grad(f) with the coefficients of a function w gives
    // w * grad(f)
    let mesh = Arc::new(create_unit_square(3, 2));
    let p1 = space(&mesh, FiniteElement::lagrange(1).unwrap());
    let p2 = space(&mesh, FiniteElement::lagrange(2).unwrap());

    let mut f = Function::new(p2);
    f.interpolate_scalar(|x| x.x * x.y).unwrap();
    let f = Expr::coefficient(Arc::new(f));
    let mut w = Function::new(Arc::clone(&p1));
    w.interpolate_scalar(|x| 1.0 + x.x - x.y).unwrap();
    let w = Arc::new(w);

    let points = FiniteElement::<f64>::quadrature_with_strength(3)
        .unwrap()
        .interpolation_points();
    let bilinear = Expression::from_points(&(Expr::argument(Arc::clone(&p1)) * f.clone().grad()), &points).unwrap();
    let linear = Expression::from_points(&(Expr::coefficient(Arc::clone(&w)) * f.grad()), &points).unwrap();
    assert_eq!(bilinear.rank(), 1);
    assert_eq!(bilinear.num_columns(), linear.num_columns() * 3);

    let cells = all_cells(&mesh);
    let a = bilinear.eval(&cells).unwrap();
    let expected = linear.eval(&cells).unwrap();
    let dofmap = p1.dofmap();
    let mut contracted = DMatrix::<f64>::zeros(cells.len(), linear.num_columns());
    for &cell in &cells {
        let local: Vec<f64> = dofmap.cell_dofs(cell).iter().map(|dof| w.x()[*dof]).collect();
        for j in 0..linear.num_columns() {
            contracted[(cell, j)] = (0..3).map(|d| a[(cell, 3 * j + d)] * local[d]).sum();
        }
    }
    assert_approx_matrix_eq!(&contracted, &expected, abstol = 1e-13);
}

proptest! {
    #[test]
    fn evaluation_is_independent_of_cell_order((mesh, cells) in mesh_and_cells(4, 12)) {
        let mesh = Arc::new(mesh);
        let p1 = space(&mesh, FiniteElement::lagrange(1).unwrap());
        let mut f = Function::new(Arc::clone(&p1));
        f.interpolate_scalar(|x| (x.x * 3.0).sin() + x.y).unwrap();
        let x = Expr::spatial_coordinate(Arc::clone(&mesh));
        let e = Expr::coefficient(Arc::new(f)).grad() * x.index(1).exp();
        let expression = Expression::from_points(&e, p1.interpolation_points()).unwrap();

        let all = expression.eval(&all_cells(&mesh)).unwrap();
        let subset = expression.eval(&cells).unwrap();
        prop_assert_eq!(&subset, &select_rows(&all, &cells));

        // Evaluating twice gives the same result, sequentially and in parallel
        prop_assert_eq!(&expression.eval(&cells).unwrap(), &subset);
        prop_assert_eq!(&expression.eval_par(&cells).unwrap(), &subset);
        prop_assert_eq!(expression.eval_row_major(&cells).unwrap(), subset.transpose().as_slice().to_vec());
    }

    #[test]
    fn argument_evaluation_matches_in_parallel((mesh, cells) in mesh_and_cells(3, 8)) {
        let mesh = Arc::new(mesh);
        let rt = space(&mesh, FiniteElement::raviart_thomas(1).unwrap());
        let points = FiniteElement::<f64>::lagrange(2).unwrap().interpolation_points();
        let expression = Expression::from_points(&Expr::argument(rt), &points).unwrap();
        let sequential = expression.eval(&cells).unwrap();
        let parallel = expression.eval_par(&cells).unwrap();
        prop_assert_eq!(sequential.ncols(), 6 * 2 * 3);
        prop_assert_eq!(parallel, sequential);
    }
}
