//! Multivariate signal container for segmentation.

use crate::error::{Result, SegmentError};

/// Layout of nested input vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueLayout {
    /// Each inner vector is a dimension (column-major).
    Column,
    /// Each inner vector is one sample across all dimensions (row-major).
    #[default]
    Row,
}

/// An immutable `n x d` matrix of finite samples.
///
/// Samples are stored row-major, so `row(i)` is a contiguous slice of the
/// `d` features observed at index `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    data: Vec<f64>,
    n_samples: usize,
    n_dims: usize,
}

impl Signal {
    /// Create a signal from nested vectors in the given layout.
    ///
    /// Fails if there are no samples, no dimensions, ragged inner vectors,
    /// or any NaN/infinite value.
    pub fn new(values: Vec<Vec<f64>>, layout: ValueLayout) -> Result<Self> {
        match layout {
            ValueLayout::Row => Self::from_rows(values),
            ValueLayout::Column => Self::from_columns(values),
        }
    }

    /// Create a signal where each inner vector is one sample.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_samples = rows.len();
        let n_dims = rows.first().map_or(0, Vec::len);

        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_dims {
                return Err(SegmentError::invalid(format!(
                    "row {i} has {} dimensions, expected {n_dims}",
                    row.len()
                )));
            }
        }

        let data: Vec<f64> = rows.into_iter().flatten().collect();
        Self::from_flat(data, n_samples, n_dims)
    }

    /// Create a signal where each inner vector is one dimension.
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self> {
        let n_dims = columns.len();
        let n_samples = columns.first().map_or(0, Vec::len);

        for (dim, column) in columns.iter().enumerate() {
            if column.len() != n_samples {
                return Err(SegmentError::invalid(format!(
                    "dimension {dim} has {} samples, expected {n_samples}",
                    column.len()
                )));
            }
        }

        // Transpose to row-major
        let data = (0..n_samples)
            .flat_map(|i| columns.iter().map(move |col| col[i]))
            .collect();
        Self::from_flat(data, n_samples, n_dims)
    }

    /// Create a single-dimension signal.
    pub fn univariate(values: &[f64]) -> Result<Self> {
        Self::from_flat(values.to_vec(), values.len(), 1)
    }

    /// Create a signal from a row-major buffer of `n_samples * n_dims` values.
    pub fn from_flat(data: Vec<f64>, n_samples: usize, n_dims: usize) -> Result<Self> {
        if n_samples == 0 {
            return Err(SegmentError::invalid("signal has no samples"));
        }
        if n_dims == 0 {
            return Err(SegmentError::invalid("signal has no dimensions"));
        }
        if data.len() != n_samples * n_dims {
            return Err(SegmentError::invalid(format!(
                "buffer holds {} values, expected {n_samples} x {n_dims}",
                data.len()
            )));
        }
        if let Some(pos) = data.iter().position(|x| !x.is_finite()) {
            return Err(SegmentError::invalid(format!(
                "non-finite value at sample {}, dimension {}",
                pos / n_dims,
                pos % n_dims
            )));
        }

        Ok(Self {
            data,
            n_samples,
            n_dims,
        })
    }

    /// Number of samples (n).
    pub fn len(&self) -> usize {
        self.n_samples
    }

    /// Always false; a signal holds at least one sample.
    pub fn is_empty(&self) -> bool {
        self.n_samples == 0
    }

    /// Number of features per sample (d).
    pub fn dimensions(&self) -> usize {
        self.n_dims
    }

    /// Features of sample `index`.
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if index >= self.n_samples {
            return None;
        }
        let start = index * self.n_dims;
        Some(&self.data[start..start + self.n_dims])
    }

    /// Iterate over samples in time order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.n_dims)
    }

    /// Copy out a single dimension as a series.
    pub fn column(&self, dim: usize) -> Option<Vec<f64>> {
        if dim >= self.n_dims {
            return None;
        }
        Some(self.rows().map(|row| row[dim]).collect())
    }

    /// Row-major backing buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}
