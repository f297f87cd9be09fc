// src/processing/algebra.rs
//! Band algebra capability set
//!
//! Index formulas are written once against [`BandAlgebra`] and run over any
//! band representation: deferred whole-image expressions or plain per-pixel
//! numbers.

use std::collections::BTreeMap;

use crate::raster::expr::{divide, BandExpr, BinaryOp};
use crate::raster::Image;

pub trait BandAlgebra {
    type Band: Clone;

    /// The band called `name`, if the source has one.
    fn select(&self, name: &str) -> Option<Self::Band>;

    fn constant(&self, value: f64) -> Self::Band;

    fn add(&self, a: &Self::Band, b: &Self::Band) -> Self::Band;

    fn subtract(&self, a: &Self::Band, b: &Self::Band) -> Self::Band;

    fn multiply(&self, a: &Self::Band, b: &Self::Band) -> Self::Band;

    /// Zero denominators give an undefined (NaN) value, never a panic.
    fn divide(&self, a: &Self::Band, b: &Self::Band) -> Self::Band;

    fn negate(&self, a: &Self::Band) -> Self::Band {
        let zero = self.constant(0.0);
        self.subtract(&zero, a)
    }
}

impl BandAlgebra for Image {
    type Band = BandExpr;

    fn select(&self, name: &str) -> Option<BandExpr> {
        self.band(name).map(|b| b.expr().clone())
    }

    fn constant(&self, value: f64) -> BandExpr {
        BandExpr::Constant(value)
    }

    fn add(&self, a: &BandExpr, b: &BandExpr) -> BandExpr {
        BandExpr::binary(BinaryOp::Add, a.clone(), b.clone())
    }

    fn subtract(&self, a: &BandExpr, b: &BandExpr) -> BandExpr {
        BandExpr::binary(BinaryOp::Subtract, a.clone(), b.clone())
    }

    fn multiply(&self, a: &BandExpr, b: &BandExpr) -> BandExpr {
        BandExpr::binary(BinaryOp::Multiply, a.clone(), b.clone())
    }

    fn divide(&self, a: &BandExpr, b: &BandExpr) -> BandExpr {
        BandExpr::binary(BinaryOp::Divide, a.clone(), b.clone())
    }

    fn negate(&self, a: &BandExpr) -> BandExpr {
        BandExpr::Neg(Box::new(a.clone()))
    }
}

/// Band values of a single pixel, evaluated eagerly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelSample {
    values: BTreeMap<String, f64>,
}

impl PixelSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, band: impl Into<String>, value: f64) -> Self {
        self.values.insert(band.into(), value);
        self
    }

    pub fn insert(&mut self, band: impl Into<String>, value: f64) {
        self.values.insert(band.into(), value);
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for PixelSample {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl BandAlgebra for PixelSample {
    type Band = f64;

    fn select(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    fn constant(&self, value: f64) -> f64 {
        value
    }

    fn add(&self, a: &f64, b: &f64) -> f64 {
        a + b
    }

    fn subtract(&self, a: &f64, b: &f64) -> f64 {
        a - b
    }

    fn multiply(&self, a: &f64, b: &f64) -> f64 {
        a * b
    }

    fn divide(&self, a: &f64, b: &f64) -> f64 {
        divide(*a, *b)
    }
}
