//! # anofox-segment
//!
//! Exact changepoint segmentation of multivariate time series.
//!
//! A [`CostModel`](changepoint::CostModel) scores segments by their squared
//! deviation from the segment mean. [`SegmentationSearch`](changepoint::SegmentationSearch)
//! finds, by dynamic programming, the optimal partition for every number of
//! changepoints up to a maximum, and the elbow helpers suggest which count
//! to keep. Typical inputs are audio features such as tempograms, but any
//! `n x d` numeric signal works.

#![allow(clippy::needless_range_loop)]

pub mod changepoint;
pub mod core;
pub mod error;

pub use error::{Result, SegmentError};

pub mod prelude {
    pub use crate::changepoint::{
        curve, dynp_detect, pick_elbow, CostCurve, CostModel, ElbowStrategy, SearchConfig,
        Segmentation, SegmentationSearch,
    };
    pub use crate::core::{Signal, ValueLayout};
    pub use crate::error::{Result, SegmentError};
}
