// src/raster/expr.rs
//! Deferred band expressions
//!
//! A `BandExpr` describes how to compute a band pixel by pixel without
//! computing it. Sources are captured by reference-counted raster, so an
//! expression stays valid when the image it was built from later gains or
//! overwrites bands. Evaluation happens only when a backend materializes the
//! band or samples it during a region reduction.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;

use super::grid::{Grid, Raster};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => divide(a, b),
        }
    }

    fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Subtract => '-',
            BinaryOp::Multiply => '*',
            BinaryOp::Divide => '/',
        }
    }
}

/// Division with a zero denominator yields NaN rather than an infinity, so
/// the pixel drops out of every downstream aggregate.
#[inline]
pub fn divide(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        f64::NAN
    } else {
        a / b
    }
}

/// Which values survive a mask; everything else becomes NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskRule {
    /// Keep `v > threshold`.
    Above(f64),
    /// Keep `v < threshold`.
    Below(f64),
    /// Keep `|v| > threshold`.
    Outside(f64),
}

impl MaskRule {
    #[inline]
    fn keeps(self, v: f64) -> bool {
        match self {
            MaskRule::Above(t) => v > t,
            MaskRule::Below(t) => v < t,
            MaskRule::Outside(t) => v.abs() > t,
        }
    }
}

#[derive(Debug, Clone)]
pub enum BandExpr {
    Source { name: String, raster: Arc<Raster> },
    Constant(f64),
    Binary {
        op: BinaryOp,
        lhs: Box<BandExpr>,
        rhs: Box<BandExpr>,
    },
    Neg(Box<BandExpr>),
    Masked { expr: Box<BandExpr>, rule: MaskRule },
}

impl BandExpr {
    pub fn source(name: impl Into<String>, raster: Arc<Raster>) -> Self {
        BandExpr::Source {
            name: name.into(),
            raster,
        }
    }

    pub fn binary(op: BinaryOp, lhs: BandExpr, rhs: BandExpr) -> Self {
        BandExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn masked(self, rule: MaskRule) -> Self {
        BandExpr::Masked {
            expr: Box::new(self),
            rule,
        }
    }

    /// Value of the expression at one linear pixel index.
    pub fn eval_at(&self, idx: usize) -> f64 {
        match self {
            BandExpr::Source { raster, .. } => raster.value(idx),
            BandExpr::Constant(v) => *v,
            BandExpr::Binary { op, lhs, rhs } => op.apply(lhs.eval_at(idx), rhs.eval_at(idx)),
            BandExpr::Neg(inner) => -inner.eval_at(idx),
            BandExpr::Masked { expr, rule } => {
                let v = expr.eval_at(idx);
                if rule.keeps(v) {
                    v
                } else {
                    f64::NAN
                }
            }
        }
    }

    /// Grids of every source raster, in traversal order.
    pub fn source_grids(&self) -> Vec<Grid> {
        let mut grids = Vec::new();
        self.collect_grids(&mut grids);
        grids
    }

    fn collect_grids(&self, out: &mut Vec<Grid>) {
        match self {
            BandExpr::Source { raster, .. } => out.push(*raster.grid()),
            BandExpr::Constant(_) => {}
            BandExpr::Binary { lhs, rhs, .. } => {
                lhs.collect_grids(out);
                rhs.collect_grids(out);
            }
            BandExpr::Neg(inner) | BandExpr::Masked { expr: inner, .. } => {
                inner.collect_grids(out)
            }
        }
    }

    /// Check that every source shares `grid`'s shape and georeferencing.
    pub fn check_grid(&self, grid: &Grid) -> Result<()> {
        for g in self.source_grids() {
            grid.ensure_same(&g)?;
        }
        Ok(())
    }

    /// Compute every pixel of the expression over `grid`.
    pub fn evaluate(&self, grid: &Grid) -> Result<Raster> {
        self.check_grid(grid)?;
        let data: Vec<f64> = (0..grid.len())
            .into_par_iter()
            .map(|idx| self.eval_at(idx))
            .collect();
        Raster::new(*grid, data)
    }

    /// Raster of a plain source expression, without copying.
    pub fn as_source(&self) -> Option<&Arc<Raster>> {
        match self {
            BandExpr::Source { raster, .. } => Some(raster),
            _ => None,
        }
    }
}

impl fmt::Display for BandExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BandExpr::Source { name, .. } => write!(f, "{name}"),
            BandExpr::Constant(v) => write!(f, "{v}"),
            BandExpr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            BandExpr::Neg(inner) => write!(f, "-{inner}"),
            BandExpr::Masked { expr, rule } => write!(f, "mask({expr}, {rule:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::raster::grid::GeoTransform;

    fn grid() -> Grid {
        Grid::new(2, 2, GeoTransform::new(0.0, 20.0, 10.0, -10.0))
    }

    fn src(name: &str, values: Vec<f64>) -> BandExpr {
        BandExpr::source(name, Arc::new(Raster::new(grid(), values).unwrap()))
    }

    #[test]
    fn test_divide_by_zero_is_nan() {
        let e = BandExpr::binary(
            BinaryOp::Divide,
            src("a", vec![1.0, 0.0, 2.0, 4.0]),
            src("b", vec![0.0, 0.0, 1.0, 2.0]),
        );
        let out = e.evaluate(&grid()).unwrap();
        assert!(out.data()[0].is_nan());
        assert!(out.data()[1].is_nan());
        assert_eq!(out.data()[2], 2.0);
        assert_eq!(out.data()[3], 2.0);
    }

    #[test]
    fn test_mask_rules() {
        let diff = src("d", vec![-0.5, -0.1, 0.1, 0.5]);
        let changed = diff.clone().masked(MaskRule::Outside(0.2)).evaluate(&grid()).unwrap();
        assert_eq!(changed.data()[0], -0.5);
        assert!(changed.data()[1].is_nan());
        assert!(changed.data()[2].is_nan());
        assert_eq!(changed.data()[3], 0.5);

        let loss = diff.masked(MaskRule::Below(-0.2)).evaluate(&grid()).unwrap();
        assert_eq!(loss.data()[0], -0.5);
        assert!(loss.data()[3].is_nan());
    }

    #[test]
    fn test_grid_mismatch_detected() {
        let other = Grid::new(3, 1, GeoTransform::new(0.0, 0.0, 10.0, -10.0));
        let e = BandExpr::binary(
            BinaryOp::Add,
            src("a", vec![1.0; 4]),
            BandExpr::source("b", Arc::new(Raster::filled(other, 1.0))),
        );
        assert!(matches!(
            e.evaluate(&grid()),
            Err(EngineError::GridMismatch { .. })
        ));
    }

    #[test]
    fn test_display() {
        let e = BandExpr::binary(BinaryOp::Subtract, src("B8", vec![0.0; 4]), BandExpr::Constant(1.0));
        assert_eq!(e.to_string(), "(B8 - 1)");
    }
}
