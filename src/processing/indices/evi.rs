// src/processing/indices/evi.rs
use super::descale;
use crate::processing::algebra::BandAlgebra;

// EVI coefficients from MODIS documentation
const G: f64 = 2.5; // Gain factor
const C1: f64 = 6.0; // Aerosol resistance (red)
const C2: f64 = 7.5; // Aerosol resistance (blue)
const L: f64 = 1.0; // Canopy background adjustment

/// Enhanced Vegetation Index
///
/// EVI = 2.5 * (NIR' - RED') / (NIR' + 6 RED' - 7.5 BLUE' + 1), where X' is
/// reflectance descaled to [0, 1]. The constants only make sense on descaled
/// values.
pub fn evi<A: BandAlgebra>(alg: &A, nir: &A::Band, red: &A::Band, blue: &A::Band) -> A::Band {
    let nir = descale(alg, nir);
    let red = descale(alg, red);
    let blue = descale(alg, blue);

    let numerator = alg.multiply(&alg.constant(G), &alg.subtract(&nir, &red));
    let denominator = alg.add(
        &alg.subtract(
            &alg.add(&nir, &alg.multiply(&alg.constant(C1), &red)),
            &alg.multiply(&alg.constant(C2), &blue),
        ),
        &alg.constant(L),
    );
    alg.divide(&numerator, &denominator)
}
