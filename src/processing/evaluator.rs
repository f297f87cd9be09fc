// src/processing/evaluator.rs
//! Band algebra evaluator
//!
//! Derives exactly one band from one [`IndexDefinition`]. Evaluation is
//! generic over [`BandAlgebra`]: over an [`Image`] it yields a deferred
//! [`BandExpr`](crate::raster::BandExpr), over a [`PixelSample`](super::algebra::PixelSample) a number.
//! The source is never mutated.

use super::algebra::BandAlgebra;
use super::expression::Expr;
use super::indices;
use crate::catalog::{FormulaKind, IndexDefinition};
use crate::error::IndexError;
use crate::raster::{Band, Image};

/// Evaluate `def` over `source`.
pub fn evaluate<A: BandAlgebra>(source: &A, def: &IndexDefinition) -> Result<A::Band, IndexError> {
    // Free expressions consume no positional references, so this is empty for them.
    let bands = select_bands(source, def)?;
    let b = |i: usize| &bands[i];
    let band = match def.formula {
        FormulaKind::NormalizedDifference => indices::normalized_difference(source, b(0), b(1)),
        FormulaKind::Ratio => indices::ratio(source, b(0), b(1)),
        FormulaKind::Difference => indices::difference(source, b(0), b(1)),
        FormulaKind::Evi => indices::evi(source, b(0), b(1), b(2)),
        FormulaKind::Savi => indices::savi(source, b(0), b(1)),
        FormulaKind::Bsi => indices::bsi(source, b(0), b(1), b(2), b(3)),
        FormulaKind::Ibi => indices::ibi(source, b(0), b(1), b(2), b(3)),
        FormulaKind::Expression => evaluate_expression(source, def)?,
    };
    Ok(band)
}

/// Evaluate `def` over an image into a named, still deferred, band.
pub fn evaluate_band(image: &Image, def: &IndexDefinition) -> Result<Band, IndexError> {
    evaluate(image, def).map(|expr| Band::from_expr(def.name.clone(), expr))
}

/// Resolve the ordered band references a fixed formula consumes.
fn select_bands<A: BandAlgebra>(
    source: &A,
    def: &IndexDefinition,
) -> Result<Vec<A::Band>, IndexError> {
    let expected = def.formula.required_bands();
    if def.bands.len() < expected {
        return Err(IndexError::IncompleteDefinition {
            index: def.name.clone(),
            formula: def.formula.as_str(),
            expected,
            found: def.bands.len(),
        });
    }

    def.bands[..expected]
        .iter()
        .map(|code| {
            source.select(code).ok_or_else(|| IndexError::UnavailableBand {
                index: def.name.clone(),
                band: code.clone(),
            })
        })
        .collect()
}

fn evaluate_expression<A: BandAlgebra>(
    source: &A,
    def: &IndexDefinition,
) -> Result<A::Band, IndexError> {
    let malformed = |reason: String| IndexError::MalformedExpression {
        index: def.name.clone(),
        reason,
    };

    let text = def
        .expression
        .as_deref()
        .ok_or_else(|| malformed("no expression text".into()))?;
    let expr = Expr::parse(text).map_err(malformed)?;

    // Every variable must be mapped before any band is looked up, so an
    // incomplete mapping is reported as such even on a truncated image.
    if let Some(var) = expr
        .variables()
        .into_iter()
        .find(|v| !def.variables.contains_key(*v))
    {
        return Err(malformed(format!("variable {var} is not mapped to a band")));
    }
    if let Some(code) = def
        .variables
        .values()
        .find(|code| source.select(code).is_none())
    {
        return Err(IndexError::UnavailableBand {
            index: def.name.clone(),
            band: code.clone(),
        });
    }

    expr.build(source, &|var: &str| {
        def.variables.get(var).and_then(|code| source.select(code))
    })
    .map_err(|var| malformed(format!("variable {var} is not bound")))
}
