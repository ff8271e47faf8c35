//! Row-major float datasets exchanged with the index.

use crate::error::{IvfError, Result};

/// A batch of `rows` vectors of dimension `dim`, stored contiguously,
/// with an optional parallel id buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    rows: usize,
    dim: usize,
    data: Vec<f32>,
    ids: Option<Vec<i64>>,
}

impl Dataset {
    /// Create a dataset from a contiguous row-major buffer.
    pub fn new(dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            return Err(IvfError::invalid_input("Dataset dimension must be positive"));
        }
        if data.len() % dim != 0 {
            return Err(IvfError::invalid_input(format!(
                "Dataset buffer of length {} is not a multiple of dimension {}",
                data.len(),
                dim
            )));
        }
        Ok(Self {
            rows: data.len() / dim,
            dim,
            data,
            ids: None,
        })
    }

    /// Create a dataset with one id per row.
    pub fn with_ids(dim: usize, data: Vec<f32>, ids: Vec<i64>) -> Result<Self> {
        let mut dataset = Self::new(dim, data)?;
        if ids.len() != dataset.rows {
            return Err(IvfError::invalid_input(format!(
                "Dataset has {} rows but {} ids",
                dataset.rows,
                ids.len()
            )));
        }
        dataset.ids = Some(ids);
        Ok(dataset)
    }

    /// Build a dataset from individual rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(IvfError::invalid_input(format!(
                    "Row {i} has dimension {}, expected {dim}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(dim, data)
    }

    /// Number of vectors.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Dimensionality of each vector.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// The contiguous vector buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The parallel id buffer, if any.
    pub fn ids(&self) -> Option<&[i64]> {
        self.ids.as_deref()
    }

    /// Get the `i`-th vector.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Iterate over vectors in order.
    pub fn iter_rows(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dim)
    }

    /// A borrowed view over rows `start..end`.
    pub(crate) fn slice_rows(&self, start: usize, end: usize) -> &[f32] {
        &self.data[start * self.dim..end * self.dim]
    }

    /// Fail unless the dimension matches and every value is finite.
    pub fn validate(&self, expected_dim: usize) -> Result<()> {
        if self.dim != expected_dim {
            return Err(IvfError::invalid_input(format!(
                "Vector dimension mismatch: expected {expected_dim}, got {}",
                self.dim
            )));
        }
        if let Some(pos) = self.data.iter().position(|x| !x.is_finite()) {
            return Err(IvfError::invalid_input(format!(
                "Vector {} contains invalid values (NaN or infinity)",
                pos / self.dim
            )));
        }
        Ok(())
    }
}
