// src/processing/indices/ibi.rs
use super::ndi::normalized_difference;
use super::savi::savi;
use crate::processing::algebra::BandAlgebra;

/// Index-based Built-up Index
///
/// IBI = (NDBI - (SAVI + MNDWI) / 2) / (NDBI + (SAVI + MNDWI) / 2)
///
/// NDBI = ND(SWIR1, NIR) and MNDWI = ND(GREEN, SWIR1) are taken on raw
/// reflectance while the SAVI term is taken on descaled reflectance. Normalized
/// differences are scale invariant, so both halves land in [-1, 1].
pub fn ibi<A: BandAlgebra>(
    alg: &A,
    swir1: &A::Band,
    nir: &A::Band,
    green: &A::Band,
    red: &A::Band,
) -> A::Band {
    let ndbi = normalized_difference(alg, swir1, nir);
    let mndwi = normalized_difference(alg, green, swir1);
    let savi = savi(alg, nir, red);
    let mean = alg.divide(&alg.add(&savi, &mndwi), &alg.constant(2.0));
    alg.divide(&alg.subtract(&ndbi, &mean), &alg.add(&ndbi, &mean))
}
