use fenris_expr::element::FiniteElement;
use fenris_expr::mesh::procedural::create_unit_square;
use fenris_expr::mesh::{Mesh, REFERENCE_EDGE_VERTICES};
use fenris_expr::proptest::{permuted_rectangle_mesh, rectangle_mesh};
use fenris_expr::space::FunctionSpace;
use fenris_expr::Error;
use matrixcompare::assert_scalar_eq;
use nalgebra::Point2;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

#[test]
fn p1_dof_coordinates_are_vertices() {
    let mesh = Arc::new(create_unit_square::<f64>(2, 2));
    let space = FunctionSpace::new(Arc::clone(&mesh), FiniteElement::lagrange(1).unwrap());
    let coordinates = space.tabulate_dof_coordinates().unwrap();
    assert_eq!(coordinates.len(), 9);
    for (x, vertex) in coordinates.iter().zip(mesh.geometry().x()) {
        assert_scalar_eq!(x.x, vertex.x, comp = abs, tol = 1e-14);
        assert_scalar_eq!(x.y, vertex.y, comp = abs, tol = 1e-14);
    }
    assert!(space.cell_dof_signs(0).is_none());
}

#[test]
fn p2_dof_coordinates_include_edge_midpoints() {
    let mesh = Arc::new(create_unit_square::<f64>(1, 1));
    let space = FunctionSpace::new(mesh, FiniteElement::lagrange(2).unwrap());
    let coordinates = space.tabulate_dof_coordinates().unwrap();
    // 4 vertices and 5 edges
    assert_eq!(coordinates.len(), 9);
    let dofs = space.dofmap().cell_dofs(0);
    // Cell 0 has vertices (0, 0), (1, 0), (1, 1), so local edge 0 runs from (1, 0) to (1, 1)
    let midpoint = coordinates[dofs[3]];
    assert_scalar_eq!(midpoint.x, 1.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(midpoint.y, 0.5, comp = abs, tol = 1e-14);
}

#[test]
fn dof_coordinates_require_point_dofs() {
    let mesh = Arc::new(create_unit_square::<f64>(1, 1));
    let space = FunctionSpace::new(mesh, FiniteElement::raviart_thomas(1).unwrap());
    assert!(!space.has_point_dofs());
    assert!(matches!(space.tabulate_dof_coordinates(), Err(Error::UnsupportedElement(_))));
}

#[test]
fn blocked_space_shapes() {
    let mesh = Arc::new(create_unit_square::<f64>(3, 2));
    let element = FiniteElement::quadrature_with_strength(2)
        .unwrap()
        .blocked(2)
        .unwrap();
    let space = FunctionSpace::new(mesh, element);
    assert!(space.has_point_dofs());
    assert_eq!(space.value_shape(), vec![2]);
    assert_eq!(space.value_size(), 2);
    assert_eq!(space.num_coefficients(), 2 * 3 * 12);
    assert_eq!(space.interpolation_points().len(), 3);
}

#[test]
fn interpolate_cell_values_checks_shapes() {
    let mesh = Arc::new(create_unit_square::<f64>(1, 1));
    let space = FunctionSpace::new(mesh, FiniteElement::lagrange(1).unwrap());
    let mut x = vec![0.0; space.num_coefficients()];
    assert_eq!(
        space.interpolate_cell_values(0, &[1.0, 2.0], &mut x),
        Err(Error::ShapeMismatch {
            what: "interpolation values",
            expected: 3,
            actual: 2
        })
    );
    assert_eq!(
        space.interpolate_cell_values(0, &[1.0, 2.0, 3.0], &mut x[..2]),
        Err(Error::ShapeMismatch {
            what: "coefficient vector",
            expected: 4,
            actual: 2
        })
    );
    assert_eq!(
        space.interpolate_cell_values(2, &[1.0, 2.0, 3.0], &mut x),
        Err(Error::CellIndexOutOfBounds { index: 2, num_cells: 2 })
    );

    space
        .interpolate_cell_values(1, &[1.0, 2.0, 3.0], &mut x)
        .unwrap();
    // Cell 1 has vertices 0, 2 and 3
    assert_eq!(x, vec![1.0, 0.0, 2.0, 3.0]);
}

#[test]
fn raviart_thomas_interpolation_gives_edge_fluxes() {
    let mesh = Arc::new(create_unit_square::<f64>(1, 1));
    let space = FunctionSpace::new(Arc::clone(&mesh), FiniteElement::raviart_thomas(1).unwrap());
    let num_points = space.interpolation_points().len();
    // The constant field (1, 0) at every interpolation point
    let values: Vec<f64> = (0..num_points).flat_map(|_| [1.0, 0.0]).collect();
    let mut x = vec![0.0; space.num_coefficients()];
    space.interpolate_cell_values(0, &values, &mut x).unwrap();

    // Cell 0 is (0, 0), (1, 0), (1, 1). The flux of (1, 0) through the edge from (1, 0) to
    // (1, 1) is 1 in the direction of the global normal, which points in +x. The horizontal
    // edge carries no flux.
    let topology = mesh.topology();
    let edges = topology.cell_edges(0);
    assert_eq!(topology.edge_vertices(edges[0]), &[1, 3]);
    assert_scalar_eq!(x[edges[0]], 1.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(x[edges[2]], 0.0, comp = abs, tol = 1e-14);
    // The diagonal from (0, 0) to (1, 1) has global normal (1, -1)
    assert_scalar_eq!(x[edges[1]], 1.0, comp = abs, tol = 1e-14);
}

#[test]
fn second_order_raviart_thomas_reverses_reflected_edge_dofs() {
    let vertices = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(1.0, 1.0),
    ];
    // Local edge 0 of both cells is the diagonal, traversed from 1 to 2 in cell 0 and from 2 to 1
    // in cell 1
    let mesh = Arc::new(Mesh::from_vertices_and_cells(vertices, vec![[0, 1, 2], [3, 2, 1]]));
    let space = FunctionSpace::new(Arc::clone(&mesh), FiniteElement::raviart_thomas(2).unwrap());
    let dofmap = space.dofmap();
    assert_eq!(dofmap.dofs_per_cell(), 8);
    assert_eq!(space.num_coefficients(), 2 * 5 + 2 * 2);

    let (first, second) = (dofmap.cell_dofs(0), dofmap.cell_dofs(1));
    assert_eq!(&first[0..2], &[second[1], second[0]]);
    assert_ne!(first[0], first[1]);
    // Interior dofs are never shared
    assert!(first[6..].iter().all(|dof| !second.contains(dof)));

    for cell in 0..2 {
        let signs = space.cell_dof_signs(cell).unwrap();
        assert_eq!(signs.len(), 8);
        // Both dofs of an edge share its sign, interior dofs are unsigned
        for edge in 0..3 {
            assert_eq!(signs[2 * edge], signs[2 * edge + 1]);
        }
        assert_eq!(&signs[6..], &[1.0, 1.0]);
    }
}

proptest! {
    #[test]
    fn second_order_raviart_thomas_edge_dofs_follow_global_orientation(mesh in permuted_rectangle_mesh(4)) {
        let mesh = Arc::new(mesh);
        let space = FunctionSpace::new(Arc::clone(&mesh), FiniteElement::raviart_thomas(2).unwrap());
        let topology = mesh.topology();

        // Edge dofs listed from the lower to the higher global vertex must agree between cells
        let mut edge_dofs: HashMap<usize, [usize; 2]> = HashMap::new();
        for cell in 0..mesh.num_cells() {
            let vertices = topology.cell_vertices(cell);
            let dofs = space.dofmap().cell_dofs(cell);
            for (local_edge, edge) in topology.cell_edges(cell).iter().enumerate() {
                let [a, b] = REFERENCE_EDGE_VERTICES[local_edge];
                let mut global = [dofs[2 * local_edge], dofs[2 * local_edge + 1]];
                if vertices[a] > vertices[b] {
                    global.reverse();
                }
                let existing = *edge_dofs.entry(*edge).or_insert(global);
                prop_assert_eq!(existing, global);
            }
        }
    }

    #[test]
    fn shared_edges_have_consistent_signs(mesh in rectangle_mesh(4)) {
        let mesh = Arc::new(mesh);
        let space = FunctionSpace::new(Arc::clone(&mesh), FiniteElement::raviart_thomas(1).unwrap());
        let topology = mesh.topology();

        // For each edge, the sign of the Piola-mapped outward normal relative to the global
        // normal, seen from each adjacent cell
        let mut orientations: HashMap<usize, Vec<f64>> = HashMap::new();
        for cell in 0..mesh.num_cells() {
            let signs = space.cell_dof_signs(cell).unwrap();
            let det = mesh.cell_geometry(cell).det_jacobian;
            for (local_edge, edge) in topology.cell_edges(cell).iter().enumerate() {
                prop_assert!(signs[local_edge] == 1.0 || signs[local_edge] == -1.0);
                orientations.entry(*edge).or_default().push(signs[local_edge] * det.signum());
            }
        }
        for (_, orientation) in orientations {
            prop_assert!(orientation.len() <= 2);
            if let [a, b] = &orientation[..] {
                prop_assert_eq!(a * b, -1.0);
            }
        }
    }
}

#[test]
fn dof_coordinates_of_dg0_are_centroids() {
    let mesh = Arc::new(create_unit_square::<f64>(1, 1));
    let space = FunctionSpace::new(mesh, FiniteElement::lagrange(0).unwrap());
    let coordinates = space.tabulate_dof_coordinates().unwrap();
    let expected = [Point2::new(2.0 / 3.0, 1.0 / 3.0), Point2::new(1.0 / 3.0, 2.0 / 3.0)];
    for (x, expected) in coordinates.iter().zip(&expected) {
        assert_scalar_eq!(x.x, expected.x, comp = abs, tol = 1e-14);
        assert_scalar_eq!(x.y, expected.y, comp = abs, tol = 1e-14);
    }
}
