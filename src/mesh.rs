//! Triangle meshes with local and ghost cells.
use crate::error::Error;
use crate::Real;
use nalgebra::{Matrix2, Point2, Scalar};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;

pub mod procedural;

/// Local vertex indices of each local edge of the reference triangle.
///
/// Local edge `i` is opposite local vertex `i`.
pub const REFERENCE_EDGE_VERTICES: [[usize; 2]; 3] = [[1, 2], [0, 2], [0, 1]];

/// Describes how many entities of a given dimension are owned by this process and how many
/// are ghosts, i.e. owned elsewhere but stored locally.
///
/// Ghost entities are always numbered after the owned ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMap {
    size_local: usize,
    num_ghosts: usize,
}

impl IndexMap {
    pub fn new(size_local: usize, num_ghosts: usize) -> Self {
        Self { size_local, num_ghosts }
    }

    pub fn size_local(&self) -> usize {
        self.size_local
    }

    pub fn num_ghosts(&self) -> usize {
        self.num_ghosts
    }

    /// The total number of locally stored entities, owned and ghosts.
    pub fn len(&self) -> usize {
        self.size_local + self.num_ghosts
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Topology of a triangle mesh: cells, edges and their connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    num_vertices: usize,
    cells: Vec<[usize; 3]>,
    num_ghost_cells: usize,
    edges: Vec<[usize; 2]>,
    cell_edges: Vec<[usize; 3]>,
}

impl Topology {
    fn from_cells(num_vertices: usize, cells: Vec<[usize; 3]>, num_ghost_cells: usize) -> Self {
        let mut edges = Vec::new();
        let mut cell_edges = Vec::with_capacity(cells.len());
        let mut edge_lookup = FxHashMap::default();

        // Edges are numbered in order of first appearance, so numbering is deterministic
        for cell in &cells {
            let mut local_edges = [usize::MAX; 3];
            for (local_edge, [a, b]) in REFERENCE_EDGE_VERTICES.iter().enumerate() {
                let (v0, v1) = (cell[*a], cell[*b]);
                let key = if v0 < v1 { [v0, v1] } else { [v1, v0] };
                let edge_index = match edge_lookup.entry(key) {
                    Entry::Occupied(entry) => *entry.get(),
                    Entry::Vacant(entry) => {
                        edges.push(key);
                        *entry.insert(edges.len() - 1)
                    }
                };
                local_edges[local_edge] = edge_index;
            }
            cell_edges.push(local_edges);
        }

        Self {
            num_vertices,
            cells,
            num_ghost_cells,
            edges,
            cell_edges,
        }
    }

    /// The topological dimension of the cells, which is always 2.
    pub fn dim(&self) -> usize {
        2
    }

    /// Index map for the entities of the given dimension (0: vertices, 1: edges, 2: cells).
    pub fn index_map(&self, dim: usize) -> Result<IndexMap, Error> {
        match dim {
            0 => Ok(IndexMap::new(self.num_vertices, 0)),
            1 => Ok(IndexMap::new(self.edges.len(), 0)),
            2 => Ok(IndexMap::new(self.cells.len() - self.num_ghost_cells, self.num_ghost_cells)),
            _ => Err(Error::Dimension {
                expected: self.dim(),
                actual: dim,
            }),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// The number of local and ghost cells.
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[[usize; 3]] {
        &self.cells
    }

    /// Vertices of the given cell.
    ///
    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn cell_vertices(&self, cell: usize) -> &[usize; 3] {
        &self.cells[cell]
    }

    /// Edges of the given cell, where local edge `i` is opposite local vertex `i`.
    ///
    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn cell_edges(&self, cell: usize) -> &[usize; 3] {
        &self.cell_edges[cell]
    }

    /// The two vertices of the given edge, sorted by index.
    ///
    /// # Panics
    ///
    /// Panics if the edge index is out of bounds.
    pub fn edge_vertices(&self, edge: usize) -> &[usize; 2] {
        &self.edges[edge]
    }
}

/// The affine coordinate element of a linear triangle.
///
/// Maps a reference point $\xi$ to $x = x_0 + J \xi$ with $J = [x_1 - x_0, x_2 - x_0]$.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateElement;

impl CoordinateElement {
    pub fn jacobian<T: Real>(&self, cell_coords: &[Point2<T>; 3]) -> Matrix2<T> {
        let [x0, x1, x2] = cell_coords;
        Matrix2::from_columns(&[x1 - x0, x2 - x0])
    }

    pub fn map_reference_coords<T: Real>(&self, xi: &Point2<T>, cell_coords: &[Point2<T>; 3]) -> Point2<T> {
        cell_coords[0] + self.jacobian(cell_coords) * xi.coords
    }

    /// Maps each reference point to physical coordinates on the cell with the given vertex
    /// coordinates.
    pub fn push_forward<T: Real>(&self, reference_points: &[Point2<T>], cell_coords: &[Point2<T>; 3]) -> Vec<Point2<T>> {
        let x0 = cell_coords[0];
        let j = self.jacobian(cell_coords);
        reference_points
            .iter()
            .map(|xi| x0 + j * xi.coords)
            .collect()
    }
}

/// The affine map of a single cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGeometry<T: Real> {
    pub coordinates: [Point2<T>; 3],
    pub jacobian: Matrix2<T>,
    pub inverse_jacobian: Matrix2<T>,
    pub det_jacobian: T,
}

impl<T: Real> CellGeometry<T> {
    /// # Panics
    ///
    /// Panics if the triangle is degenerate.
    pub fn from_coordinates(coordinates: [Point2<T>; 3]) -> Self {
        let jacobian = CoordinateElement.jacobian(&coordinates);
        let inverse_jacobian = jacobian
            .try_inverse()
            .expect("Jacobian of a non-degenerate cell must be invertible");
        Self {
            coordinates,
            jacobian,
            det_jacobian: jacobian.determinant(),
            inverse_jacobian,
        }
    }

    pub fn map_reference_coords(&self, xi: &Point2<T>) -> Point2<T> {
        self.coordinates[0] + self.jacobian * xi.coords
    }
}

/// Vertex coordinates and coordinate element of a mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Geometry<T: Scalar> {
    x: Vec<Point2<T>>,
    cmap: CoordinateElement,
}

impl<T: Scalar> Geometry<T> {
    pub fn x(&self) -> &[Point2<T>] {
        &self.x
    }

    pub fn cmap(&self) -> &CoordinateElement {
        &self.cmap
    }
}

/// A conforming triangle mesh in two dimensions.
///
/// The last `num_ghost_cells` cells are ghost cells. Cell indices used for evaluation are
/// local indices in `0 .. num_local + num_ghost`.
///
/// A mesh is serialized as its vertices, cells and number of ghost cells. Deserialization
/// validates the data like [`Mesh::try_from_vertices_and_cells`] and rebuilds the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    bound(serialize = "T: Real + Serialize", deserialize = "T: Real + Deserialize<'de>"),
    into = "MeshData<T>",
    try_from = "MeshData<T>"
)]
pub struct Mesh<T: Scalar> {
    geometry: Geometry<T>,
    topology: Topology,
}

#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
struct MeshData<T: Scalar> {
    vertices: Vec<Point2<T>>,
    cells: Vec<[usize; 3]>,
    num_ghost_cells: usize,
}

impl<T: Real> From<Mesh<T>> for MeshData<T> {
    fn from(mesh: Mesh<T>) -> Self {
        Self {
            vertices: mesh.geometry.x,
            num_ghost_cells: mesh.topology.num_ghost_cells,
            cells: mesh.topology.cells,
        }
    }
}

impl<T: Real> TryFrom<MeshData<T>> for Mesh<T> {
    type Error = Error;

    fn try_from(data: MeshData<T>) -> Result<Self, Error> {
        Self::try_from_vertices_and_cells(data.vertices, data.cells, data.num_ghost_cells)
    }
}

impl<T: Real> Mesh<T> {
    /// Construct a mesh without ghost cells.
    ///
    /// # Panics
    ///
    /// Panics if a cell references a vertex that does not exist or has zero area.
    /// Use [`Mesh::try_from_vertices_and_cells`] to handle this gracefully.
    pub fn from_vertices_and_cells(vertices: Vec<Point2<T>>, cells: Vec<[usize; 3]>) -> Self {
        Self::try_from_vertices_and_cells(vertices, cells, 0).expect("mesh data must be valid")
    }

    /// Construct a mesh where the last `num_ghost_cells` cells are ghosts.
    ///
    /// Returns an error if a cell references a vertex out of bounds, has zero area or if
    /// there are more ghost cells than cells.
    pub fn try_from_vertices_and_cells(
        vertices: Vec<Point2<T>>,
        cells: Vec<[usize; 3]>,
        num_ghost_cells: usize,
    ) -> Result<Self, Error> {
        if num_ghost_cells > cells.len() {
            return Err(Error::InvalidMesh(format!(
                "{num_ghost_cells} ghost cells requested, but mesh only has {} cells",
                cells.len()
            )));
        }
        for (cell_index, cell) in cells.iter().enumerate() {
            if let Some(v) = cell.iter().find(|v| **v >= vertices.len()) {
                return Err(Error::InvalidMesh(format!(
                    "cell {cell_index} references vertex {v}, but there are only {} vertices",
                    vertices.len()
                )));
            }
            let coords = cell.map(|v| vertices[v]);
            if CoordinateElement.jacobian(&coords).determinant() == T::zero() {
                return Err(Error::InvalidMesh(format!("cell {cell_index} is degenerate")));
            }
        }

        let topology = Topology::from_cells(vertices.len(), cells, num_ghost_cells);
        Ok(Self {
            geometry: Geometry {
                x: vertices,
                cmap: CoordinateElement,
            },
            topology,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn geometry(&self) -> &Geometry<T> {
        &self.geometry
    }

    /// The number of local and ghost cells.
    pub fn num_cells(&self) -> usize {
        self.topology.num_cells()
    }

    /// Indices into `geometry().x()` of the nodes of each cell. Linear triangles have their
    /// vertices as nodes.
    pub fn geometry_dofmap(&self) -> &[[usize; 3]] {
        self.topology.cells()
    }

    /// Vertex coordinates of the given cell.
    ///
    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn cell_coordinates(&self, cell: usize) -> [Point2<T>; 3] {
        self.topology
            .cell_vertices(cell)
            .map(|v| self.geometry.x[v])
    }

    /// Jacobian and vertex coordinates of the given cell.
    ///
    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn cell_geometry(&self, cell: usize) -> CellGeometry<T> {
        CellGeometry::from_coordinates(self.cell_coordinates(cell))
    }

    /// Returns an error if any of the given cells is not a local or ghost cell of this mesh.
    pub fn check_cell_indices(&self, cells: &[usize]) -> Result<(), Error> {
        let num_cells = self.num_cells();
        match cells.iter().find(|c| **c >= num_cells) {
            Some(&index) => Err(Error::CellIndexOutOfBounds { index, num_cells }),
            None => Ok(()),
        }
    }
}
