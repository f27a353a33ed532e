//! Exact segmentation by dynamic programming over the number of segments.
//!
//! For every segment count `k` and prefix end `e` the search stores the
//! minimal cost of covering `[0, e)` with exactly `k` segments, together with
//! the start of the last segment. One pass up to `max_changes + 1` segments
//! answers every smaller changepoint count without recomputation.
//!
//! Complexity is O(max_changes * n^2 * d). Cells of one layer depend only on
//! the previous layer, so a layer can be filled in parallel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, field, instrument, trace, warn, Span};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::cost::CostModel;
use super::segmentation::Segmentation;
use crate::core::Signal;
use crate::error::{Result, SegmentError};

/// Shared flag used to abort a running search between layers.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Configuration for the dynamic-programming search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Minimum number of samples per segment
    pub min_segment_length: usize,
    /// Fill each layer with rayon (only effective with the `parallel` feature)
    pub parallel: bool,
    /// Optional cancellation flag, checked between layers
    pub cancel: Option<CancellationToken>,
    /// Optional deadline, checked between layers
    pub deadline: Option<Instant>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_segment_length: 1,
            parallel: cfg!(feature = "parallel"),
            cancel: None,
            deadline: None,
        }
    }
}

impl SearchConfig {
    /// Set minimum segment length.
    pub fn min_segment_length(mut self, min_len: usize) -> Self {
        self.min_segment_length = min_len.max(1);
        self
    }

    /// Enable or disable parallel layer evaluation.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Attach a cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Abort the search once `deadline` has passed.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Abort the search once `timeout` has elapsed from now.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    fn should_stop(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Flat `(max_changes + 2) x (n + 1)` arena of optimal prefix costs.
///
/// Row `k` covers partitions into exactly `k` segments. Unreachable cells
/// hold `+inf`.
#[derive(Debug, Clone)]
struct PartitionTable {
    n: usize,
    max_changes: usize,
    cost: Vec<f64>,
    prev: Vec<usize>,
}

impl PartitionTable {
    fn new(n: usize, max_changes: usize) -> Self {
        let cells = (max_changes + 2) * (n + 1);
        let mut cost = vec![f64::INFINITY; cells];
        cost[0] = 0.0;
        Self {
            n,
            max_changes,
            cost,
            prev: vec![0; cells],
        }
    }

    #[inline]
    fn index(&self, segments: usize, end: usize) -> usize {
        segments * (self.n + 1) + end
    }

    fn optimal_cost(&self, n_changes: usize) -> f64 {
        self.cost[self.index(n_changes + 1, self.n)]
    }

    fn backtrack(&self, n_changes: usize) -> Vec<usize> {
        let mut boundaries = Vec::with_capacity(n_changes + 1);
        let mut end = self.n;
        boundaries.push(end);
        for segments in (2..=n_changes + 1).rev() {
            end = self.prev[self.index(segments, end)];
            boundaries.push(end);
        }
        boundaries.reverse();
        boundaries
    }
}

#[derive(Debug, Clone)]
struct Fitted {
    model: Arc<CostModel>,
    table: PartitionTable,
}

/// Dynamic-programming changepoint search.
///
/// Starts unfitted; a successful [`search`](Self::search) binds a cost model
/// and a table for every changepoint count up to `max_changes`. A later
/// `search` replaces both.
///
/// Among equal-cost predecessors the smallest split index wins, so results
/// are deterministic.
#[derive(Debug, Clone, Default)]
pub struct SegmentationSearch {
    config: SearchConfig,
    fitted: Option<Fitted>,
}

impl SegmentationSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SearchConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// True once a search has completed.
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Largest changepoint count covered by the last search.
    pub fn max_changes(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.table.max_changes)
    }

    /// Cost model bound by the last search.
    pub fn cost_model(&self) -> Option<&CostModel> {
        self.fitted.as_ref().map(|f| f.model.as_ref())
    }

    /// Compute optimal segmentations with `0..=max_changes` changepoints.
    ///
    /// Requires `max_changes < n - 1` and enough samples for
    /// `max_changes + 1` segments of the configured minimum length. On
    /// failure the previous result, if any, is kept.
    #[instrument(level = "debug", name = "dynp_search", skip_all, fields(n = field::Empty, max_changes))]
    pub fn search(&mut self, model: impl Into<Arc<CostModel>>, max_changes: usize) -> Result<()> {
        let model = model.into();
        let n = model.n_samples();
        Span::current().record("n", n);
        let min_len = self.config.min_segment_length.max(1);

        if max_changes >= n - 1 {
            return Err(SegmentError::invalid(format!(
                "max_changes must be below n - 1 = {}, got {max_changes}",
                n - 1
            )));
        }
        if (max_changes + 1) * min_len > n {
            return Err(SegmentError::invalid(format!(
                "{} segments of at least {min_len} samples do not fit in {n} samples",
                max_changes + 1
            )));
        }

        debug!(
            min_segment_length = min_len,
            parallel = self.config.parallel,
            "starting search"
        );

        let mut table = PartitionTable::new(n, max_changes);
        let width = n + 1;

        for segments in 1..=max_changes + 1 {
            if self.config.should_stop() {
                warn!(completed_layers = segments - 1, "search cancelled");
                return Err(SegmentError::Cancelled {
                    completed_layers: segments - 1,
                });
            }

            let (done, rest) = table.cost.split_at_mut(segments * width);
            let prev_row = &done[(segments - 1) * width..];
            let row = &mut rest[..width];
            let prev_idx = &mut table.prev[segments * width..(segments + 1) * width];

            fill_layer(
                &model,
                prev_row,
                row,
                prev_idx,
                segments,
                min_len,
                self.config.parallel,
            );

            trace!(segments, cost = row[n], "layer complete");
        }

        debug!(best_cost = table.optimal_cost(max_changes), "search complete");
        self.fitted = Some(Fitted { model, table });
        Ok(())
    }

    /// Optimal segmentation with exactly `n_changes` changepoints.
    pub fn extract(&self, n_changes: usize) -> Result<Segmentation> {
        let table = self.table_for(n_changes)?;
        Ok(Segmentation::from_parts(
            table.backtrack(n_changes),
            table.optimal_cost(n_changes),
        ))
    }

    /// Minimal total cost with exactly `n_changes` changepoints, as stored in
    /// the table.
    pub fn optimal_cost(&self, n_changes: usize) -> Result<f64> {
        Ok(self.table_for(n_changes)?.optimal_cost(n_changes))
    }

    /// Total cost of an arbitrary segmentation under the bound cost model.
    pub fn sum_of_costs(&self, boundaries: &[usize]) -> Result<f64> {
        let fitted = self.fitted.as_ref().ok_or(SegmentError::NotComputed {
            requested: boundaries.len().saturating_sub(1),
            available: None,
        })?;
        fitted.model.sum_of_costs(boundaries)
    }

    fn table_for(&self, n_changes: usize) -> Result<&PartitionTable> {
        let fitted = self.fitted.as_ref().ok_or(SegmentError::NotComputed {
            requested: n_changes,
            available: None,
        })?;
        if n_changes > fitted.table.max_changes {
            return Err(SegmentError::NotComputed {
                requested: n_changes,
                available: Some(fitted.table.max_changes),
            });
        }
        Ok(&fitted.table)
    }
}

/// Fill row `segments` from row `segments - 1`.
///
/// A prefix `[0, e)` split into `segments` pieces needs
/// `e >= segments * min_len`; the last piece `[j, e)` needs
/// `(segments - 1) * min_len <= j <= e - min_len`.
fn fill_layer(
    model: &CostModel,
    prev_row: &[f64],
    row: &mut [f64],
    prev_idx: &mut [usize],
    segments: usize,
    min_len: usize,
    parallel: bool,
) {
    let first_end = segments * min_len;

    let solve = |offset: usize, (cost, arg): (&mut f64, &mut usize)| {
        let end = first_end + offset;
        let (best, best_j) = best_split(model, prev_row, segments, end, min_len);
        *cost = best;
        *arg = best_j;
    };

    #[cfg(feature = "parallel")]
    {
        if parallel {
            row[first_end..]
                .par_iter_mut()
                .zip(prev_idx[first_end..].par_iter_mut())
                .enumerate()
                .for_each(|(offset, cell)| solve(offset, cell));
            return;
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    row[first_end..]
        .iter_mut()
        .zip(prev_idx[first_end..].iter_mut())
        .enumerate()
        .for_each(|(offset, cell)| solve(offset, cell));
}

/// Best start for the last segment ending at `end`. Ties keep the smallest `j`.
#[inline]
fn best_split(
    model: &CostModel,
    prev_row: &[f64],
    segments: usize,
    end: usize,
    min_len: usize,
) -> (f64, usize) {
    let mut best = f64::INFINITY;
    let mut best_j = 0;

    for j in (segments - 1) * min_len..=end - min_len {
        let head = prev_row[j];
        if !head.is_finite() {
            continue;
        }
        let total = head + model.cost_unchecked(j, end);
        if total < best {
            best = total;
            best_j = j;
        }
    }

    (best, best_j)
}

/// Fit an L2 cost on `signal` and return its optimal segmentation with
/// exactly `n_changes` changepoints.
pub fn dynp_detect(signal: &Signal, n_changes: usize, config: &SearchConfig) -> Result<Segmentation> {
    let model = CostModel::fit(signal)?;
    let mut search = SegmentationSearch::with_config(config.clone());
    search.search(model, n_changes)?;
    search.extract(n_changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn step_model() -> CostModel {
        let signal = Signal::from_rows(vec![
            vec![0.0],
            vec![0.0],
            vec![0.0],
            vec![10.0],
            vec![10.0],
            vec![10.0],
        ])
        .unwrap();
        CostModel::fit(&signal).unwrap()
    }

    fn three_levels() -> Signal {
        let mut series = vec![0.0; 10];
        series.extend(vec![10.0; 10]);
        series.extend(vec![0.0; 10]);
        Signal::univariate(&series).unwrap()
    }

    #[test]
    fn step_signal_one_change() {
        let mut search = SegmentationSearch::new();
        search.search(step_model(), 1).unwrap();

        let one = search.extract(1).unwrap();
        assert_eq!(one.boundaries(), vec![3, 6]);
        assert_relative_eq!(one.cost(), 0.0, epsilon = 1e-10);

        let zero = search.extract(0).unwrap();
        assert_eq!(zero.boundaries(), vec![6]);
        assert_relative_eq!(zero.cost(), 150.0, epsilon = 1e-10);
    }

    #[test]
    fn three_levels_two_changes() {
        let mut search = SegmentationSearch::new();
        search.search(CostModel::fit(&three_levels()).unwrap(), 3).unwrap();

        let seg = search.extract(2).unwrap();
        assert_eq!(seg.boundaries(), vec![10, 20, 30]);
        assert_relative_eq!(seg.cost(), 0.0, epsilon = 1e-9);
        assert_eq!(seg.change_points(), &[10, 20]);
    }

    #[test]
    fn zero_changes_is_whole_signal_cost() {
        let model = CostModel::fit(&three_levels()).unwrap();
        let whole = model.segment_cost(0, 30).unwrap();

        let mut search = SegmentationSearch::new();
        search.search(model, 2).unwrap();

        let seg = search.extract(0).unwrap();
        assert_eq!(seg.boundaries(), vec![30]);
        assert_relative_eq!(seg.cost(), whole, epsilon = 1e-9);
    }

    #[test]
    fn extract_is_idempotent() {
        let mut search = SegmentationSearch::new();
        search.search(CostModel::fit(&three_levels()).unwrap(), 4).unwrap();

        for k in 0..=4 {
            assert_eq!(search.extract(k).unwrap(), search.extract(k).unwrap());
        }
    }

    #[test]
    fn sum_of_costs_matches_search_cost() {
        let values: Vec<f64> = (0..25).map(|i| ((i * 13) % 7) as f64 + (i / 8) as f64 * 4.0).collect();
        let mut search = SegmentationSearch::new();
        search.search(CostModel::fit(&Signal::univariate(&values).unwrap()).unwrap(), 5).unwrap();

        for k in 0..=5 {
            let seg = search.extract(k).unwrap();
            assert_eq!(search.sum_of_costs(&seg.boundaries()).unwrap(), seg.cost());
            assert_eq!(search.optimal_cost(k).unwrap(), seg.cost());
        }
    }

    #[test]
    fn costs_non_increasing_in_changes() {
        let values: Vec<f64> = (0..30).map(|i| (i as f64 * 0.7).sin() * 3.0 + (i % 4) as f64).collect();
        let mut search = SegmentationSearch::new();
        search.search(CostModel::fit(&Signal::univariate(&values).unwrap()).unwrap(), 8).unwrap();

        for k in 1..=8 {
            assert!(search.optimal_cost(k).unwrap() <= search.optimal_cost(k - 1).unwrap() + 1e-9);
        }
    }

    #[test]
    fn constant_signal_ties_pick_smallest_split() {
        let signal = Signal::univariate(&[2.5; 8]).unwrap();
        let mut search = SegmentationSearch::new();
        search.search(CostModel::fit(&signal).unwrap(), 3).unwrap();

        for k in 0..=3 {
            let seg = search.extract(k).unwrap();
            assert_eq!(seg.cost(), 0.0);
            let mut expected: Vec<usize> = (1..=k).collect();
            expected.push(8);
            assert_eq!(seg.boundaries(), expected);
        }
    }

    #[test]
    fn max_changes_bounds() {
        let mut search = SegmentationSearch::new();
        // n = 6, so max_changes must be < 5
        assert!(matches!(
            search.search(step_model(), 5),
            Err(SegmentError::InvalidInput(_))
        ));
        assert!(matches!(
            search.search(step_model(), 10),
            Err(SegmentError::InvalidInput(_))
        ));
        assert!(!search.is_fitted());

        search.search(step_model(), 4).unwrap();
        assert_eq!(search.max_changes(), Some(4));
        assert_eq!(search.extract(4).unwrap().boundaries().len(), 5);
    }

    #[test]
    fn queries_before_search_fail() {
        let search = SegmentationSearch::new();
        assert_eq!(
            search.extract(0),
            Err(SegmentError::NotComputed {
                requested: 0,
                available: None
            })
        );
        assert!(matches!(
            search.sum_of_costs(&[6]),
            Err(SegmentError::NotComputed { available: None, .. })
        ));
        assert!(search.cost_model().is_none());
    }

    #[test]
    fn extract_beyond_max_changes_fails() {
        let mut search = SegmentationSearch::new();
        search.search(step_model(), 2).unwrap();
        assert_eq!(
            search.extract(3),
            Err(SegmentError::NotComputed {
                requested: 3,
                available: Some(2)
            })
        );
        assert!(search.optimal_cost(3).is_err());
    }

    #[test]
    fn new_search_replaces_table() {
        let mut search = SegmentationSearch::new();
        search.search(step_model(), 3).unwrap();
        search.search(CostModel::fit(&three_levels()).unwrap(), 1).unwrap();

        assert_eq!(search.max_changes(), Some(1));
        assert_eq!(search.cost_model().map(CostModel::n_samples), Some(30));
        assert!(search.extract(2).is_err());
    }

    #[test]
    fn failed_search_keeps_previous_result() {
        let mut search = SegmentationSearch::new();
        search.search(step_model(), 1).unwrap();
        assert!(search.search(step_model(), 5).is_err());

        assert_eq!(search.extract(1).unwrap().boundaries(), vec![3, 6]);
    }

    #[test]
    fn min_segment_length_is_respected() {
        // Jump after the 2nd sample, but segments must hold 4 samples
        let mut series = vec![0.0; 2];
        series.extend(vec![100.0; 10]);
        let model = CostModel::fit(&Signal::univariate(&series).unwrap()).unwrap();

        let mut search = SegmentationSearch::with_config(SearchConfig::default().min_segment_length(4));
        search.search(model, 2).unwrap();

        for k in 0..=2 {
            for (start, end) in search.extract(k).unwrap().segments() {
                assert!(end - start >= 4);
            }
        }
        assert_eq!(search.extract(1).unwrap().boundaries(), vec![4, 12]);
    }

    #[test]
    fn min_segment_length_must_fit() {
        let model = CostModel::fit(&Signal::univariate(&[1.0; 10]).unwrap()).unwrap();
        let mut search = SegmentationSearch::with_config(SearchConfig::default().min_segment_length(4));
        assert!(matches!(search.search(model, 2), Err(SegmentError::InvalidInput(_))));
    }

    #[test]
    fn config_builder() {
        let token = CancellationToken::new();
        let config = SearchConfig::default()
            .min_segment_length(0)
            .parallel(false)
            .cancellation(token.clone())
            .timeout(Duration::from_secs(60));

        assert_eq!(config.min_segment_length, 1);
        assert!(!config.parallel);
        assert!(config.deadline.is_some());
        assert!(!config.should_stop());
        token.cancel();
        assert!(config.should_stop());
    }

    #[test]
    fn cancelled_search_fails_and_keeps_state() {
        let token = CancellationToken::new();
        let mut search = SegmentationSearch::with_config(SearchConfig::default().cancellation(token.clone()));
        search.search(step_model(), 1).unwrap();

        token.cancel();
        assert_eq!(
            search.search(step_model(), 3),
            Err(SegmentError::Cancelled { completed_layers: 0 })
        );
        assert_eq!(search.max_changes(), Some(1));
    }

    #[test]
    fn expired_deadline_cancels() {
        let config = SearchConfig::default().deadline(Instant::now());
        let mut search = SegmentationSearch::with_config(config);
        assert!(matches!(
            search.search(step_model(), 2),
            Err(SegmentError::Cancelled { .. })
        ));
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let values: Vec<f64> = (0..60).map(|i| ((i * 31) % 17) as f64 + (i / 15) as f64 * 6.0).collect();
        let signal = Signal::univariate(&values).unwrap();
        let model = Arc::new(CostModel::fit(&signal).unwrap());

        let mut seq = SegmentationSearch::with_config(SearchConfig::default().parallel(false));
        let mut par = SegmentationSearch::with_config(SearchConfig::default().parallel(true));
        seq.search(Arc::clone(&model), 6).unwrap();
        par.search(model, 6).unwrap();

        for k in 0..=6 {
            assert_eq!(seq.extract(k).unwrap(), par.extract(k).unwrap());
        }
    }

    #[test]
    fn dynp_detect_one_shot() {
        let seg = dynp_detect(&three_levels(), 2, &SearchConfig::default()).unwrap();
        assert_eq!(seg.boundaries(), vec![10, 20, 30]);
        assert_eq!(seg.n_changepoints(), 2);

        assert!(dynp_detect(&Signal::univariate(&[1.0]).unwrap(), 0, &SearchConfig::default()).is_err());
    }
}
