//! Segmentation result type.

use super::cost::validate_boundaries;
use crate::core::Signal;
use crate::error::{Result, SegmentError};

/// A partition of `0..n` into contiguous segments.
///
/// `boundaries` holds the end index of every segment, so it is strictly
/// increasing, starts above 0 and its last element is always `n`. Values
/// are immutable once built.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawSegmentation"))]
pub struct Segmentation {
    boundaries: Vec<usize>,
    cost: f64,
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawSegmentation {
    boundaries: Vec<usize>,
    cost: f64,
}

#[cfg(feature = "serde")]
impl TryFrom<RawSegmentation> for Segmentation {
    type Error = SegmentError;

    fn try_from(raw: RawSegmentation) -> Result<Self> {
        Segmentation::new(raw.boundaries, raw.cost)
    }
}

impl Segmentation {
    /// Build a segmentation from segment end indices and its total cost.
    ///
    /// Fails unless `boundaries` is non-empty, strictly increasing and starts
    /// above 0, and `cost` is finite and non-negative.
    pub fn new(boundaries: Vec<usize>, cost: f64) -> Result<Self> {
        let n = boundaries.last().copied().unwrap_or(0);
        validate_boundaries(&boundaries, n)?;
        if !cost.is_finite() || cost < 0.0 {
            return Err(SegmentError::invalid(format!(
                "segmentation cost must be finite and non-negative, got {cost}"
            )));
        }
        Ok(Self { boundaries, cost })
    }

    /// Backtracked result whose boundaries are valid by construction.
    pub(crate) fn from_parts(boundaries: Vec<usize>, cost: f64) -> Self {
        Self { boundaries, cost }
    }

    /// Segment end indices, last one equal to the signal length.
    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    /// Total L2 cost of all segments.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Signal length covered by this segmentation.
    pub fn len(&self) -> usize {
        self.boundaries.last().copied().unwrap_or(0)
    }

    /// True if the segmentation covers nothing.
    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Changepoint indices, i.e. the boundaries without the final `n`.
    pub fn change_points(&self) -> &[usize] {
        let k = self.boundaries.len().saturating_sub(1);
        &self.boundaries[..k]
    }

    /// Number of changepoints.
    pub fn n_changepoints(&self) -> usize {
        self.change_points().len()
    }

    /// Segment boundaries as `(start, end)` pairs.
    pub fn segments(&self) -> Vec<(usize, usize)> {
        let mut start = 0;
        self.boundaries
            .iter()
            .map(|&end| {
                let seg = (start, end);
                start = end;
                seg
            })
            .collect()
    }

    /// Get the segment containing a specific index.
    pub fn segment_for_index(&self, index: usize) -> Option<(usize, usize)> {
        self.segments()
            .into_iter()
            .find(|&(start, end)| index >= start && index < end)
    }

    /// Segment id for every sample.
    pub fn labels(&self) -> Vec<usize> {
        self.segments()
            .into_iter()
            .enumerate()
            .flat_map(|(id, (start, end))| std::iter::repeat(id).take(end - start))
            .collect()
    }

    /// Per-segment mean of every dimension of `signal`.
    ///
    /// Segments reaching past the end of `signal` only average the samples
    /// that exist; a segment with no samples yields NaN means.
    pub fn segment_means(&self, signal: &Signal) -> Vec<Vec<f64>> {
        let d = signal.dimensions();
        self.segments()
            .into_iter()
            .map(|(start, end)| {
                let end = end.min(signal.len());
                if start >= end {
                    return vec![f64::NAN; d];
                }
                let mut means = vec![0.0; d];
                for i in start..end {
                    if let Some(row) = signal.row(i) {
                        for (m, &x) in means.iter_mut().zip(row) {
                            *m += x;
                        }
                    }
                }
                let len = (end - start) as f64;
                means.iter_mut().for_each(|m| *m /= len);
                means
            })
            .collect()
    }
}
