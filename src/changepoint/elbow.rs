//! Elbow selection over the optimal cost curve.
//!
//! The curve lists the best achievable cost for each changepoint count. A
//! strategy turns it into a single suggested count; it never changes the
//! segmentations themselves.

use super::dynp::SegmentationSearch;
use crate::error::{Result, SegmentError};

/// Optimal total cost as a function of the number of changepoints.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CostCurve {
    /// Cost with no changepoints (whole signal as one segment)
    pub initial_cost: f64,
    /// `(k, cost)` pairs for `k = 1..=max_changes`
    pub points: Vec<(usize, f64)>,
}

impl CostCurve {
    /// Build a curve from the cost at `k = 0` followed by costs at `k = 1, 2, ...`.
    pub fn from_costs(initial_cost: f64, costs: &[f64]) -> Self {
        Self {
            initial_cost,
            points: costs.iter().enumerate().map(|(i, &c)| (i + 1, c)).collect(),
        }
    }

    /// Largest changepoint count on the curve.
    pub fn max_k(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Cost at `k` changepoints, including `k = 0`.
    pub fn cost_at(&self, k: usize) -> Option<f64> {
        if k == 0 {
            Some(self.initial_cost)
        } else {
            self.points.get(k - 1).map(|&(_, c)| c)
        }
    }

    /// Check that cost never rises by more than `tolerance` as `k` grows.
    pub fn is_non_increasing(&self, tolerance: f64) -> bool {
        let mut prev = self.initial_cost;
        for &(_, c) in &self.points {
            if c > prev + tolerance {
                return false;
            }
            prev = c;
        }
        true
    }
}

/// How to pick a changepoint count from a [`CostCurve`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElbowStrategy {
    /// Caller-chosen count, only checked against the curve range
    Manual(usize),
    /// Count with the largest discrete second difference of cost
    #[default]
    MaxCurvature,
    /// Smallest `k` with `c(k) - c(k + 1) <= fraction * c(0)`, or the
    /// largest count if no gain is that small. A gain exactly equal to the
    /// limit qualifies.
    Threshold(f64),
}

/// Cost curve for `k = 1..=max_changes` from a completed search.
pub fn curve(search: &SegmentationSearch) -> Result<CostCurve> {
    let max_changes = search.max_changes().ok_or(SegmentError::NotComputed {
        requested: 0,
        available: None,
    })?;

    let initial_cost = search.optimal_cost(0)?;
    let points = (1..=max_changes)
        .map(|k| Ok((k, search.optimal_cost(k)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(CostCurve {
        initial_cost,
        points,
    })
}

/// Choose a changepoint count from `curve` using `strategy`.
///
/// Ties always resolve to the smaller count.
pub fn pick_elbow(curve: &CostCurve, strategy: ElbowStrategy) -> Result<usize> {
    if curve.is_empty() {
        return Err(SegmentError::invalid("cost curve has no points"));
    }
    let max_k = curve.max_k();

    match strategy {
        ElbowStrategy::Manual(k) => {
            if k > max_k {
                return Err(SegmentError::invalid(format!(
                    "manual choice {k} exceeds curve maximum {max_k}"
                )));
            }
            Ok(k)
        }
        ElbowStrategy::MaxCurvature => Ok(max_curvature(curve)),
        ElbowStrategy::Threshold(fraction) => {
            if !fraction.is_finite() || fraction <= 0.0 || fraction >= 1.0 {
                return Err(SegmentError::invalid(format!(
                    "threshold fraction must be in (0, 1), got {fraction}"
                )));
            }
            Ok(threshold(curve, fraction))
        }
    }
}

fn max_curvature(curve: &CostCurve) -> usize {
    let costs: Vec<f64> = std::iter::once(curve.initial_cost)
        .chain(curve.points.iter().map(|&(_, c)| c))
        .collect();

    let mut best_k = 1;
    let mut best = f64::NEG_INFINITY;
    // Window i is centred on k = i + 1
    for (i, w) in costs.windows(3).enumerate() {
        let curvature = w[0] - 2.0 * w[1] + w[2];
        if curvature > best {
            best = curvature;
            best_k = i + 1;
        }
    }
    best_k
}

fn threshold(curve: &CostCurve, fraction: f64) -> usize {
    let limit = fraction * curve.initial_cost;
    let max_k = curve.max_k();

    (1..max_k)
        .find(|&k| match (curve.cost_at(k), curve.cost_at(k + 1)) {
            (Some(at), Some(next)) => at - next <= limit,
            _ => false,
        })
        .unwrap_or(max_k)
}
