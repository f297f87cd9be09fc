// src/processing/indices/ndi.rs
use crate::processing::algebra::BandAlgebra;

/// Normalized Difference Index: (A - B) / (A + B)
///
/// Undefined where A + B = 0.
pub fn normalized_difference<A: BandAlgebra>(alg: &A, a: &A::Band, b: &A::Band) -> A::Band {
    alg.divide(&alg.subtract(a, b), &alg.add(a, b))
}

/// Simple ratio: A / B
pub fn ratio<A: BandAlgebra>(alg: &A, a: &A::Band, b: &A::Band) -> A::Band {
    alg.divide(a, b)
}

/// Simple difference: A - B
pub fn difference<A: BandAlgebra>(alg: &A, a: &A::Band, b: &A::Band) -> A::Band {
    alg.subtract(a, b)
}
