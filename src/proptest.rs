//! Proptest strategies for meshes, reference points and cell lists.
use crate::mesh::procedural::{create_rectangle, Diagonal};
use crate::mesh::Mesh;
use ::proptest::prelude::*;
use nalgebra::Point2;

pub fn point2() -> impl Strategy<Value = Point2<f64>> {
    // Large coordinates break the tolerances of most tests
    let range = -10.0..10.0;
    [range.clone(), range].prop_map(|[x, y]| Point2::new(x, y))
}

/// Points in the closed reference triangle.
pub fn reference_point() -> impl Strategy<Value = Point2<f64>> {
    (0.0..=1.0, 0.0..=1.0).prop_map(|(s, t): (f64, f64)| {
        if s + t > 1.0 {
            Point2::new(1.0 - s, 1.0 - t)
        } else {
            Point2::new(s, t)
        }
    })
}

pub fn diagonal() -> impl Strategy<Value = Diagonal> {
    prop_oneof![Just(Diagonal::Right), Just(Diagonal::Left)]
}

/// Non-empty rectangular meshes with at most `max_cells_per_axis` rectangles along each axis.
pub fn rectangle_mesh(max_cells_per_axis: usize) -> impl Strategy<Value = Mesh<f64>> {
    let range = 1..=max_cells_per_axis.max(1);
    (range.clone(), range, diagonal(), 0.5..2.0, 0.5..2.0).prop_map(|(nx, ny, diagonal, width, height)| {
        create_rectangle(&Point2::origin(), &Point2::new(width, height), nx, ny, diagonal)
    })
}

/// All orderings of the three vertices of a triangle.
const VERTEX_PERMUTATIONS: [[usize; 3]; 6] = [[0, 1, 2], [1, 2, 0], [2, 0, 1], [1, 0, 2], [0, 2, 1], [2, 1, 0]];

/// Reorders the vertices of each cell by the permutation with the given index (modulo 6).
///
/// The resulting cells disagree on the direction of shared edges, and half of the
/// permutations reverse the orientation of a cell.
pub fn permute_cell_vertices(mesh: &Mesh<f64>, permutations: &[usize]) -> Mesh<f64> {
    let cells = mesh
        .geometry_dofmap()
        .iter()
        .zip(permutations.iter().cycle())
        .map(|(cell, p)| VERTEX_PERMUTATIONS[p % 6].map(|i| cell[i]))
        .collect();
    Mesh::from_vertices_and_cells(mesh.geometry().x().to_vec(), cells)
}

/// Rectangular meshes whose cells list their vertices in arbitrary order.
pub fn permuted_rectangle_mesh(max_cells_per_axis: usize) -> impl Strategy<Value = Mesh<f64>> {
    rectangle_mesh(max_cells_per_axis)
        .prop_flat_map(|mesh| {
            let num_cells = mesh.num_cells();
            (Just(mesh), ::proptest::collection::vec(0..6usize, num_cells))
        })
        .prop_map(|(mesh, permutations)| permute_cell_vertices(&mesh, &permutations))
}

/// A mesh together with a list of valid cell indices, possibly unsorted and with repetitions.
pub fn mesh_and_cells(max_cells_per_axis: usize, max_len: usize) -> impl Strategy<Value = (Mesh<f64>, Vec<usize>)> {
    rectangle_mesh(max_cells_per_axis).prop_flat_map(move |mesh| {
        let num_cells = mesh.num_cells();
        (Just(mesh), ::proptest::collection::vec(0..num_cells, 0..=max_len))
    })
}
