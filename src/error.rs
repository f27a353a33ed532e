//! Error types for the anofox-segment library.

use thiserror::Error;

/// Result type alias for segmentation operations.
pub type Result<T> = std::result::Result<T, SegmentError>;

/// Errors that can occur while fitting costs or searching for changepoints.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentError {
    /// Malformed signal, search parameter, candidate segmentation or strategy.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Cost range outside `0 <= start < end <= n`.
    #[error("invalid range [{start}, {end}) for signal of length {n}")]
    Range { start: usize, end: usize, n: usize },

    /// Query for a segmentation that has not been computed.
    #[error("{}", not_computed_message(.requested, .available))]
    NotComputed {
        requested: usize,
        available: Option<usize>,
    },

    /// Search aborted by a cancellation token or deadline.
    #[error("search cancelled after {completed_layers} completed layers")]
    Cancelled { completed_layers: usize },
}

fn not_computed_message(requested: &usize, available: &Option<usize>) -> String {
    match available {
        None => format!("no search has been run (requested {requested} changepoints)"),
        Some(max) => format!(
            "requested {requested} changepoints but search only covers up to {max}"
        ),
    }
}

impl SegmentError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SegmentError::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = SegmentError::InvalidInput("signal must have at least 2 samples".to_string());
        assert_eq!(
            err.to_string(),
            "invalid input: signal must have at least 2 samples"
        );

        let err = SegmentError::Range {
            start: 4,
            end: 2,
            n: 10,
        };
        assert_eq!(err.to_string(), "invalid range [4, 2) for signal of length 10");

        let err = SegmentError::NotComputed {
            requested: 3,
            available: None,
        };
        assert_eq!(
            err.to_string(),
            "no search has been run (requested 3 changepoints)"
        );

        let err = SegmentError::NotComputed {
            requested: 5,
            available: Some(2),
        };
        assert_eq!(
            err.to_string(),
            "requested 5 changepoints but search only covers up to 2"
        );

        let err = SegmentError::Cancelled { completed_layers: 3 };
        assert_eq!(err.to_string(), "search cancelled after 3 completed layers");
    }

    #[test]
    fn errors_are_clonable_and_comparable() {
        let err1 = SegmentError::invalid("bad");
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
