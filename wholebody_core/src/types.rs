// wholebody_core/src/types.rs

use nalgebra::{DMatrix, DVector};

// --- Core Type Aliases ---
pub type Vector = DVector<f64>;
pub type Matrix = DMatrix<f64>;

/// Integer timestamp of one control cycle; the cache key for signal values.
/// Supplied by the host at every read, monotonically non-decreasing.
pub type Tick = u64;

/// Invalidation epoch shared by every signal of one entity. Bumped whenever
/// an input is re-plugged or the model is replaced, so caches from earlier
/// epochs are treated as stale regardless of their tick.
pub type Generation = u64;
