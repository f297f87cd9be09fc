// src/processing/mod.rs
pub mod algebra;
pub mod change;
pub mod compositor;
pub mod evaluator;
pub mod expression;
pub mod indices;
pub mod reducer;
pub mod timeseries;

// Re-export main components
pub use algebra::{BandAlgebra, PixelSample};
pub use change::{detect_changes, ChangeDetection, ChangeReport};
pub use compositor::{Composition, IndexCompositor, IndexOutcome};
pub use evaluator::{evaluate, evaluate_band};
pub use reducer::{reduce, RegionStats, StatisticsResult, REDUCTION_SCALE};
pub use timeseries::{temporal_series, TemporalRequest, TimePoint};
