//! Changepoint detection by exact dynamic programming.
//!
//! Splits a multivariate signal into the segments that minimise the total
//! quadratic error around each segment mean.
//!
//! # Components
//!
//! - **CostModel**: L2 cost of any range in O(d) after prefix-sum fitting
//! - **SegmentationSearch**: optimal partitions for every changepoint count
//!   up to a maximum, computed in one pass
//! - **Elbow selection**: cost curve and strategies for picking a count
//!
//! # Example
//!
//! ```
//! use anofox_segment::changepoint::{curve, pick_elbow, CostModel, ElbowStrategy, SegmentationSearch};
//! use anofox_segment::core::Signal;
//!
//! // Three plateaus
//! let mut series = vec![0.0; 20];
//! series.extend(vec![8.0; 20]);
//! series.extend(vec![2.0; 20]);
//! let signal = Signal::univariate(&series).unwrap();
//!
//! let model = CostModel::fit(&signal).unwrap();
//! let mut search = SegmentationSearch::new();
//! search.search(model, 6).unwrap();
//!
//! let seg = search.extract(2).unwrap();
//! assert_eq!(seg.change_points(), &[20, 40]);
//!
//! let k = pick_elbow(&curve(&search).unwrap(), ElbowStrategy::MaxCurvature).unwrap();
//! assert_eq!(k, 2);
//! ```

pub mod cost;
pub mod dynp;
pub mod elbow;
pub mod segmentation;

pub use cost::{l2_cost, CostModel};
pub use dynp::{dynp_detect, CancellationToken, SearchConfig, SegmentationSearch};
pub use elbow::{curve, pick_elbow, CostCurve, ElbowStrategy};
pub use segmentation::Segmentation;
