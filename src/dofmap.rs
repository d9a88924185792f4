//! Degree-of-freedom maps.
use crate::element::EntityDofs;
use crate::mesh::{IndexMap, Topology};
use serde::{Deserialize, Serialize};

/// Maps (cell, local dof) to a global dof block.
///
/// Each global block holds `bs` consecutive entries of a coefficient vector, so the coefficient
/// of local dof `i` and component `k` is stored at `bs * cell_dofs(cell)[i] + k`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofMap {
    // Row-major, num_cells x dofs_per_cell
    list: Vec<usize>,
    dofs_per_cell: usize,
    bs: usize,
    index_map: IndexMap,
}

impl DofMap {
    /// Numbers the dofs of an element layout on the given topology.
    ///
    /// Vertex dofs are numbered first, then edge dofs and finally cell-interior dofs. Within each
    /// cell, the local dofs are ordered by local vertex, local edge and then interior.
    pub fn from_topology(topology: &Topology, layout: EntityDofs, bs: usize) -> Self {
        let dofs_per_cell = layout.num_cell_dofs();
        let edge_offset = layout.vertex * topology.num_vertices();
        let interior_offset = edge_offset + layout.edge * topology.num_edges();
        let num_dofs = interior_offset + layout.interior * topology.num_cells();

        let mut list = Vec::with_capacity(dofs_per_cell * topology.num_cells());
        for cell in 0..topology.num_cells() {
            for v in topology.cell_vertices(cell) {
                list.extend((0..layout.vertex).map(|k| layout.vertex * v + k));
            }
            for e in topology.cell_edges(cell) {
                list.extend((0..layout.edge).map(|k| edge_offset + layout.edge * e + k));
            }
            list.extend((0..layout.interior).map(|k| interior_offset + layout.interior * cell + k));
        }

        Self {
            list,
            dofs_per_cell,
            bs,
            index_map: IndexMap::new(num_dofs, 0),
        }
    }

    /// Reverses the order of the edge dofs of every reflected local edge.
    ///
    /// `reflections` holds one entry per (cell, local edge). Edge dofs are laid out along the
    /// edge from its lower to its higher local vertex, so an edge whose local direction
    /// disagrees with its global direction sees its dofs in reverse order.
    pub(crate) fn reflect_edge_dofs(&mut self, layout: EntityDofs, reflections: &[bool]) {
        if layout.edge < 2 {
            return;
        }
        let edge_begin = 3 * layout.vertex;
        for (cell_dofs, cell_reflections) in self
            .list
            .chunks_exact_mut(self.dofs_per_cell)
            .zip(reflections.chunks_exact(3))
        {
            for (local_edge, reflected) in cell_reflections.iter().enumerate() {
                if *reflected {
                    let begin = edge_begin + local_edge * layout.edge;
                    cell_dofs[begin..begin + layout.edge].reverse();
                }
            }
        }
    }

    /// The flattened list of dof blocks, with `dofs_per_cell` entries per cell.
    pub fn list(&self) -> &[usize] {
        &self.list
    }

    /// # Panics
    ///
    /// Panics if the cell index is out of bounds.
    pub fn cell_dofs(&self, cell: usize) -> &[usize] {
        let begin = cell * self.dofs_per_cell;
        &self.list[begin..begin + self.dofs_per_cell]
    }

    /// Global coefficient indices of the given cell, in local dof order `i * bs + k`.
    pub fn cell_dofs_unrolled(&self, cell: usize) -> impl '_ + Iterator<Item = usize> {
        let bs = self.bs;
        self.cell_dofs(cell)
            .iter()
            .flat_map(move |dof| (0..bs).map(move |k| bs * dof + k))
    }

    pub fn bs(&self) -> usize {
        self.bs
    }

    pub fn dofs_per_cell(&self) -> usize {
        self.dofs_per_cell
    }

    pub fn num_cells(&self) -> usize {
        if self.dofs_per_cell == 0 {
            0
        } else {
            self.list.len() / self.dofs_per_cell
        }
    }

    /// Index map over dof blocks.
    pub fn index_map(&self) -> &IndexMap {
        &self.index_map
    }

    /// The length of a coefficient vector, `bs` times the number of blocks.
    pub fn num_coefficients(&self) -> usize {
        self.bs * self.index_map.len()
    }
}
