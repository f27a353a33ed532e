//! Core data structures.

mod signal;

pub use signal::{Signal, ValueLayout};
