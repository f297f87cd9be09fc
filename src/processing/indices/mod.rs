// src/processing/indices/mod.rs
//! Fixed spectral index formulas, written against [`BandAlgebra`] so each
//! one runs unchanged over deferred images or single pixels.
//!
//! Inputs are integer-scaled reflectance (Sentinel-2 L2A, x10000).

pub mod bsi;
pub mod evi;
pub mod ibi;
pub mod ndi;
pub mod savi;

use super::algebra::BandAlgebra;

pub use bsi::bsi;
pub use evi::evi;
pub use ibi::ibi;
pub use ndi::{difference, normalized_difference, ratio};
pub use savi::{savi, SOIL_FACTOR};

/// Sensor convention for integer reflectance encoding.
pub const REFLECTANCE_SCALE: f64 = 10000.0;

/// Rescale raw reflectance to [0, 1].
pub fn descale<A: BandAlgebra>(alg: &A, band: &A::Band) -> A::Band {
    alg.divide(band, &alg.constant(REFLECTANCE_SCALE))
}
