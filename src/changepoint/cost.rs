//! Quadratic (L2) segment cost.
//!
//! The cost of a segment is the sum over dimensions of squared deviations
//! from the segment mean. A fitted [`CostModel`] answers any range query in
//! O(d) using prefix sums of the signal and of its square.

use crate::core::Signal;
use crate::error::{Result, SegmentError};
use tracing::debug;

/// L2 cost of a univariate slice, computed directly.
///
/// Also known as residual sum of squares (RSS).
pub fn l2_cost(segment: &[f64]) -> f64 {
    if segment.is_empty() {
        return 0.0;
    }

    let mean = segment.iter().sum::<f64>() / segment.len() as f64;
    segment.iter().map(|x| (x - mean).powi(2)).sum()
}

/// Fitted L2 cost over a multivariate signal.
///
/// Holds `(n + 1) x d` prefix sums and prefix sums of squares, row-major by
/// index. Each dimension is centred on its global mean first, and both sums
/// are kept in compensated form so that `sumsq - sum^2 / len` stays exact
/// for segments far from the global mean.
#[derive(Debug, Clone)]
pub struct CostModel {
    cum_sum: Vec<Compensated>,
    cum_sum_sq: Vec<Compensated>,
    n_samples: usize,
    n_dims: usize,
}

impl CostModel {
    /// Precompute prefix sums for `signal`.
    ///
    /// Fails if the signal has fewer than 2 samples, or if its magnitude is
    /// large enough that a squared segment sum would overflow.
    pub fn fit(signal: &Signal) -> Result<Self> {
        let n = signal.len();
        let d = signal.dimensions();

        if n < 2 {
            return Err(SegmentError::invalid(format!(
                "signal must have at least 2 samples, got {n}"
            )));
        }
        if d < 1 {
            return Err(SegmentError::invalid("signal must have at least 1 dimension"));
        }
        if signal.as_slice().iter().any(|x| !x.is_finite()) {
            return Err(SegmentError::invalid("signal contains non-finite values"));
        }

        let mut totals = vec![Compensated::default(); d];
        for row in signal.rows() {
            for (t, &x) in totals.iter_mut().zip(row) {
                *t = t.add(Compensated::from(x));
            }
        }
        let means: Vec<f64> = totals.iter().map(|t| t.value() / n as f64).collect();

        let mut cum_sum = vec![Compensated::default(); (n + 1) * d];
        let mut cum_sum_sq = vec![Compensated::default(); (n + 1) * d];
        let mut max_dev = 0.0_f64;

        for (i, row) in signal.rows().enumerate() {
            let (prev, next) = (i * d, (i + 1) * d);
            for dim in 0..d {
                let x = Compensated::diff(row[dim], means[dim]);
                if !x.hi.is_finite() {
                    return Err(overflow(dim));
                }
                max_dev = max_dev.max(x.hi.abs());
                cum_sum[next + dim] = cum_sum[prev + dim].add(x);
                cum_sum_sq[next + dim] = cum_sum_sq[prev + dim].add(x.square());
            }
        }

        // |sum| <= n * max_dev bounds every segment sum and its square
        let bound = n as f64 * max_dev;
        if !(bound * bound).is_finite() {
            return Err(overflow(0));
        }
        if let Some(i) = cum_sum_sq.iter().position(|c| !c.hi.is_finite()) {
            return Err(overflow(i % d));
        }

        debug!(n_samples = n, n_dims = d, max_dev, "fitted L2 cost model");

        Ok(Self {
            cum_sum,
            cum_sum_sq,
            n_samples: n,
            n_dims: d,
        })
    }

    /// Number of samples the model was fitted on.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Number of dimensions the model was fitted on.
    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    /// Cost of the half-open range `[start, end)`.
    ///
    /// Ranges of length 0 or 1 cost exactly 0. Any other range must satisfy
    /// `start < end <= n`.
    pub fn segment_cost(&self, start: usize, end: usize) -> Result<f64> {
        let n = self.n_samples;
        if end <= n && end <= start + 1 && start <= end {
            return Ok(0.0);
        }
        if start >= end || end > n {
            return Err(SegmentError::Range { start, end, n });
        }
        Ok(self.cost_unchecked(start, end))
    }

    /// Cost of `[start, end)` for indices already known to be valid.
    #[inline]
    pub(crate) fn cost_unchecked(&self, start: usize, end: usize) -> f64 {
        let len = end - start;
        if len <= 1 {
            return 0.0;
        }

        let d = self.n_dims;
        let (lo, hi) = (start * d, end * d);
        let len = len as f64;
        let mut cost = 0.0;
        for dim in 0..d {
            let sum = self.cum_sum[hi + dim].sub(self.cum_sum[lo + dim]);
            let sum_sq = self.cum_sum_sq[hi + dim].sub(self.cum_sum_sq[lo + dim]);
            cost += sum_sq.sub(sum.square().div(len)).value();
        }
        // Rounding can leave a tiny negative residue; NaN passes through
        if cost < 0.0 {
            0.0
        } else {
            cost
        }
    }

    /// Total cost of the segmentation described by `boundaries`.
    ///
    /// `boundaries` must be strictly increasing, lie in `(0, n]` and end at
    /// `n`; segments are `[0, b0), [b0, b1), ...`.
    pub fn sum_of_costs(&self, boundaries: &[usize]) -> Result<f64> {
        validate_boundaries(boundaries, self.n_samples)?;

        let mut start = 0;
        let mut total = 0.0;
        for &end in boundaries {
            total += self.cost_unchecked(start, end);
            start = end;
        }
        Ok(total)
    }
}

fn overflow(dim: usize) -> SegmentError {
    SegmentError::invalid(format!(
        "signal magnitude in dimension {dim} overflows the squared segment sums"
    ))
}

/// Unevaluated sum `hi + lo` with roughly twice the precision of `f64`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Compensated {
    hi: f64,
    lo: f64,
}

impl From<f64> for Compensated {
    fn from(hi: f64) -> Self {
        Self { hi, lo: 0.0 }
    }
}

impl Compensated {
    /// Exact `a - b`.
    fn diff(a: f64, b: f64) -> Self {
        let (hi, lo) = two_sum(a, -b);
        Self { hi, lo }
    }

    fn add(self, other: Self) -> Self {
        let (s, e) = two_sum(self.hi, other.hi);
        let (t, f) = two_sum(self.lo, other.lo);
        let (s, e) = quick_two_sum(s, e + t);
        let (hi, lo) = quick_two_sum(s, e + f);
        Self { hi, lo }
    }

    fn sub(self, other: Self) -> Self {
        self.add(Self {
            hi: -other.hi,
            lo: -other.lo,
        })
    }

    fn square(self) -> Self {
        let (p, e) = two_prod(self.hi, self.hi);
        let (hi, lo) = quick_two_sum(p, e + 2.0 * self.hi * self.lo);
        Self { hi, lo }
    }

    fn div(self, divisor: f64) -> Self {
        let q = self.hi / divisor;
        let rem = (-q).mul_add(divisor, self.hi) + self.lo;
        let (hi, lo) = quick_two_sum(q, rem / divisor);
        Self { hi, lo }
    }

    fn value(self) -> f64 {
        self.hi + self.lo
    }
}

/// Knuth's error-free sum: `a + b == s + e` exactly.
#[inline]
fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let bb = s - a;
    (s, (a - (s - bb)) + (b - bb))
}

/// Error-free sum for `|a| >= |b|`.
#[inline]
fn quick_two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    (s, b - (s - a))
}

#[inline]
fn two_prod(a: f64, b: f64) -> (f64, f64) {
    let p = a * b;
    (p, a.mul_add(b, -p))
}

/// Check that `boundaries` is a well-formed segmentation of `0..n`.
pub(crate) fn validate_boundaries(boundaries: &[usize], n: usize) -> Result<()> {
    let Some(&last) = boundaries.last() else {
        return Err(SegmentError::invalid("boundary list is empty"));
    };
    if last != n {
        return Err(SegmentError::invalid(format!(
            "last boundary must equal signal length {n}, got {last}"
        )));
    }
    if boundaries[0] == 0 {
        return Err(SegmentError::invalid("boundaries must be in (0, n]"));
    }
    if let Some(w) = boundaries.windows(2).find(|w| w[0] >= w[1]) {
        return Err(SegmentError::invalid(format!(
            "boundaries must be strictly increasing, found {} then {}",
            w[0], w[1]
        )));
    }
    Ok(())
}
