// src/processing/indices/savi.rs
use super::descale;
use crate::processing::algebra::BandAlgebra;

/// Soil brightness correction factor (L).
pub const SOIL_FACTOR: f64 = 0.5;

/// Soil Adjusted Vegetation Index on descaled reflectance
///
/// SAVI = (1 + L) * (NIR' - RED') / (NIR' + RED' + L)
pub fn savi<A: BandAlgebra>(alg: &A, nir: &A::Band, red: &A::Band) -> A::Band {
    let nir = descale(alg, nir);
    let red = descale(alg, red);
    savi_descaled(alg, &nir, &red)
}

/// SAVI over bands that are already in [0, 1].
pub(crate) fn savi_descaled<A: BandAlgebra>(alg: &A, nir: &A::Band, red: &A::Band) -> A::Band {
    let ratio = alg.divide(
        &alg.subtract(nir, red),
        &alg.add(&alg.add(nir, red), &alg.constant(SOIL_FACTOR)),
    );
    alg.multiply(&ratio, &alg.constant(1.0 + SOIL_FACTOR))
}
