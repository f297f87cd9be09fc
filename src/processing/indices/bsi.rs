// src/processing/indices/bsi.rs
use crate::processing::algebra::BandAlgebra;

/// Bare Soil Index on raw reflectance
///
/// BSI = ((SWIR + RED) - (NIR + BLUE)) / ((SWIR + RED) + (NIR + BLUE))
pub fn bsi<A: BandAlgebra>(
    alg: &A,
    swir: &A::Band,
    red: &A::Band,
    nir: &A::Band,
    blue: &A::Band,
) -> A::Band {
    let soil = alg.add(swir, red);
    let vegetation = alg.add(nir, blue);
    alg.divide(
        &alg.subtract(&soil, &vegetation),
        &alg.add(&soil, &vegetation),
    )
}
