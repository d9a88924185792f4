//! Construction of sparsity patterns from local dof blocks.
use nalgebra_sparse::pattern::{SparsityPattern as CsrPattern, SparsityPatternFormatError};
use std::collections::BTreeSet;

/// A sparsity pattern under construction.
///
/// Entries can be inserted in any order and any number of times. Each entry is stored once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparsityPattern {
    nrows: usize,
    ncols: usize,
    entries: BTreeSet<(usize, usize)>,
}

impl SparsityPattern {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            entries: BTreeSet::new(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Inserts every pair `(row, col)` of the given rows and columns.
    ///
    /// # Panics
    ///
    /// Panics if a row or column is out of bounds.
    pub fn insert(&mut self, rows: &[usize], cols: &[usize]) {
        for &row in rows {
            assert!(row < self.nrows, "row index {row} out of bounds");
            for &col in cols {
                assert!(col < self.ncols, "column index {col} out of bounds");
                self.entries.insert((row, col));
            }
        }
    }

    pub fn num_nonzeros(&self) -> usize {
        self.entries.len()
    }

    pub fn num_nonzeros_per_row(&self) -> Vec<usize> {
        let mut counts = vec![0; self.nrows];
        for (row, _) in &self.entries {
            counts[*row] += 1;
        }
        counts
    }

    /// Compresses the pattern into CSR form.
    pub fn build(&self) -> Result<CsrPattern, SparsityPatternFormatError> {
        let mut offsets = Vec::with_capacity(self.nrows + 1);
        let mut column_indices = Vec::with_capacity(self.entries.len());

        offsets.push(0);
        for &(i, j) in &self.entries {
            // Consecutive empty rows need one offset each
            while i + 1 > offsets.len() {
                offsets.push(column_indices.len());
            }
            column_indices.push(j);
        }
        while offsets.len() < self.nrows + 1 {
            offsets.push(column_indices.len());
        }

        CsrPattern::try_from_offsets_and_indices(self.nrows, self.ncols, offsets, column_indices)
    }
}
