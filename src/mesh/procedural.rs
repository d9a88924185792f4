//! Basic procedural mesh generation routines.
use crate::mesh::Mesh;
use crate::Real;
use nalgebra::{Point2, Vector2};

/// Determines how each rectangular cell is split into two triangles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Diagonal {
    /// Split along the diagonal from the lower left to the upper right corner.
    #[default]
    Right,
    /// Split along the diagonal from the lower right to the upper left corner.
    Left,
}

/// Creates a triangle mesh of the unit square with `nx * ny` rectangles, each split into two
/// triangles along the [`Diagonal::Right`] diagonal.
pub fn create_unit_square<T: Real>(nx: usize, ny: usize) -> Mesh<T> {
    create_rectangle(&Point2::origin(), &Point2::new(T::one(), T::one()), nx, ny, Diagonal::Right)
}

/// Creates a triangle mesh of the axis-aligned rectangle with corners `p0` and `p1`.
///
/// Vertices are numbered row by row starting from `p0`. The two triangles of the rectangle
/// `(i, j)` are numbered `2 * (j * nx + i)` and `2 * (j * nx + i) + 1`. An empty mesh is returned
/// if `nx` or `ny` is zero.
pub fn create_rectangle<T: Real>(p0: &Point2<T>, p1: &Point2<T>, nx: usize, ny: usize, diagonal: Diagonal) -> Mesh<T> {
    if nx == 0 || ny == 0 {
        return Mesh::from_vertices_and_cells(Vec::new(), Vec::new());
    }

    let extents = p1 - p0;
    let hx = extents.x / T::from_usize(nx).expect("Must be able to fit usize in T");
    let hy = extents.y / T::from_usize(ny).expect("Must be able to fit usize in T");

    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            let i_as_t = T::from_usize(i).expect("Must be able to fit usize in T");
            let j_as_t = T::from_usize(j).expect("Must be able to fit usize in T");
            vertices.push(p0 + Vector2::new(i_as_t * hx, j_as_t * hy));
        }
    }

    let to_global_vertex_index = |i, j| (nx + 1) * j + i;
    let mut cells = Vec::with_capacity(2 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let v0 = to_global_vertex_index(i, j);
            let v1 = to_global_vertex_index(i + 1, j);
            let v2 = to_global_vertex_index(i, j + 1);
            let v3 = to_global_vertex_index(i + 1, j + 1);
            match diagonal {
                Diagonal::Right => {
                    cells.push([v0, v1, v3]);
                    cells.push([v0, v2, v3]);
                }
                Diagonal::Left => {
                    cells.push([v0, v1, v2]);
                    cells.push([v1, v2, v3]);
                }
            }
        }
    }

    Mesh::from_vertices_and_cells(vertices, cells)
}
