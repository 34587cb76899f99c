//! Sparse matrix sinks.
//!
//! Blocks paste their local mass operator into a [`SparseSink`] using
//! absolute global indices. The sink decides what a repeated `(row, col)`
//! means; every implementation here accumulates.

use crate::error::{BlockError, Result};
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Destination for `(row, col, value)` contributions to a global matrix.
pub trait SparseSink {
    /// Matrix shape as `(nrows, ncols)`.
    fn shape(&self) -> (usize, usize);

    /// Insert `value` at `(row, col)`, or add it to an existing entry.
    ///
    /// Callers check indices against [`SparseSink::shape`] first.
    fn set_or_accumulate(&mut self, row: usize, col: usize, value: f64);
}

/// Sparse matrix in COO (coordinate/triplet) format.
///
/// Backend-agnostic interchange format between the variable layer and any
/// factorization backend. Duplicate entries are summed on conversion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseTriplets {
    pub nrows: usize,
    pub ncols: usize,
    pub row_indices: Vec<usize>,
    pub col_indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseTriplets {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            ..Self::default()
        }
    }

    pub fn with_capacity(nrows: usize, ncols: usize, capacity: usize) -> Self {
        Self {
            nrows,
            ncols,
            row_indices: Vec::with_capacity(capacity),
            col_indices: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Number of stored triplets (duplicates counted separately).
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.row_indices
            .iter()
            .zip(&self.col_indices)
            .zip(&self.values)
            .map(|((&r, &c), &v)| (r, c, v))
    }

    pub fn to_coo(&self) -> Result<CooMatrix<f64>> {
        CooMatrix::try_from_triplets(
            self.nrows,
            self.ncols,
            self.row_indices.clone(),
            self.col_indices.clone(),
            self.values.clone(),
        )
        .map_err(|e| BlockError::Sparse(format!("Failed to create COO matrix: {e:?}")))
    }

    /// Convert to CSR, summing duplicates and dropping entries whose
    /// magnitude is at or below `drop_tolerance`.
    pub fn to_csr(&self, drop_tolerance: f64) -> Result<CsrMatrix<f64>> {
        let csr = CsrMatrix::from(&self.to_coo()?);
        if drop_tolerance <= 0.0 {
            return Ok(csr);
        }

        let mut rows = Vec::with_capacity(csr.nnz());
        let mut cols = Vec::with_capacity(csr.nnz());
        let mut values = Vec::with_capacity(csr.nnz());
        for (i, j, &v) in csr.triplet_iter() {
            if v.abs() > drop_tolerance {
                rows.push(i);
                cols.push(j);
                values.push(v);
            }
        }
        let filtered = CooMatrix::try_from_triplets(self.nrows, self.ncols, rows, cols, values)
            .map_err(|e| BlockError::Sparse(format!("Failed to filter COO matrix: {e:?}")))?;
        Ok(CsrMatrix::from(&filtered))
    }

    /// Dense copy with duplicates summed.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.nrows, self.ncols);
        for (r, c, v) in self.iter() {
            dense[(r, c)] += v;
        }
        dense
    }
}

impl SparseSink for SparseTriplets {
    fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    fn set_or_accumulate(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.nrows && col < self.ncols);
        self.row_indices.push(row);
        self.col_indices.push(col);
        self.values.push(value);
    }
}

impl SparseSink for CooMatrix<f64> {
    fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    fn set_or_accumulate(&mut self, row: usize, col: usize, value: f64) {
        self.push(row, col, value);
    }
}

impl SparseSink for DMatrix<f64> {
    fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    fn set_or_accumulate(&mut self, row: usize, col: usize, value: f64) {
        self[(row, col)] += value;
    }
}

/// Check that a `dof`-sized diagonal block placed at `offset` plus the
/// caller's row/column shifts fits inside the sink.
///
/// Returns the absolute `(row, col)` of the block's first entry.
pub(crate) fn check_block_fits(
    sink: &dyn SparseSink,
    offset: usize,
    row_offset: usize,
    col_offset: usize,
    dof: usize,
) -> Result<(usize, usize)> {
    let (nrows, ncols) = sink.shape();
    let row = block_start(offset, row_offset, dof, nrows)?;
    let col = block_start(offset, col_offset, dof, ncols)?;
    Ok((row, col))
}

fn block_start(offset: usize, shift: usize, dof: usize, bound: usize) -> Result<usize> {
    let start = offset.checked_add(shift);
    match start.and_then(|s| s.checked_add(dof)) {
        Some(end) if end <= bound => Ok(end - dof),
        Some(end) => Err(BlockError::DimensionMismatch {
            expected: end,
            found: bound,
        }),
        None => Err(BlockError::DimensionMismatch {
            expected: usize::MAX,
            found: bound,
        }),
    }
}
