// src/processing/change.rs
//! Change detection between two composed scenes

use chrono::NaiveDate;
use serde::Serialize;

use super::reducer::{reduce, StatisticsResult, REDUCTION_SCALE};
use crate::backend::ImageryBackend;
use crate::error::{EngineError, Result};
use crate::geometry::Geometry;
use crate::raster::{Band, BandExpr, BinaryOp, Image, MaskRule};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeReport {
    pub index: String,
    pub threshold: f64,
    pub before_date: Option<NaiveDate>,
    pub after_date: Option<NaiveDate>,
    pub before: StatisticsResult,
    pub after: StatisticsResult,
    /// Statistics of the `after - before` band.
    pub difference: StatisticsResult,
    /// Change of the regional mean; absent if either mean is.
    pub mean_delta: Option<f64>,
    pub decrease_pixels: usize,
    pub increase_pixels: usize,
    pub stable_pixels: usize,
}

#[derive(Debug, Clone)]
pub struct ChangeDetection {
    /// `after` plus `{index}_diff`, `{index}_changed`, `{index}_decrease`
    /// and `{index}_increase`.
    pub image: Image,
    pub report: ChangeReport,
}

/// Band names produced for `index`.
pub fn change_band_names(index: &str) -> [String; 4] {
    [
        format!("{index}_diff"),
        format!("{index}_changed"),
        format!("{index}_decrease"),
        format!("{index}_increase"),
    ]
}

/// Difference `after - before` of one index band, with masks keeping only
/// pixels whose change exceeds `threshold` (any direction, decrease, increase).
pub fn change_bands(before: &Image, after: &Image, index: &str, threshold: f64) -> Result<[Band; 4]> {
    after.grid().ensure_same(before.grid())?;
    let diff = BandExpr::binary(
        BinaryOp::Subtract,
        after.require_band(index)?.expr().clone(),
        before.require_band(index)?.expr().clone(),
    );

    let [diff_name, changed, decrease, increase] = change_band_names(index);
    Ok([
        Band::from_expr(changed, diff.clone().masked(MaskRule::Outside(threshold))),
        Band::from_expr(decrease, diff.clone().masked(MaskRule::Below(-threshold))),
        Band::from_expr(increase, diff.clone().masked(MaskRule::Above(threshold))),
        Band::from_expr(diff_name, diff),
    ])
}

/// Compare one index between two composed scenes over `geometry`.
pub fn detect_changes<B: ImageryBackend + ?Sized>(
    backend: &B,
    before: &Image,
    after: &Image,
    index: &str,
    geometry: &Geometry,
    threshold: f64,
) -> Result<ChangeDetection> {
    if !(threshold.is_finite() && threshold >= 0.0) {
        return Err(EngineError::InvalidConfig {
            field: "threshold".into(),
            reason: format!("must be a non-negative number, got {threshold}"),
        });
    }

    let image = after.add_bands(change_bands(before, after, index, threshold)?)?;
    let [diff_name, _, decrease, increase] = change_band_names(index);

    let before_stats = reduce(backend, before, index, geometry)?;
    let after_stats = reduce(backend, after, index, geometry)?;
    let diff_stats = backend.reduce_region(&image, &diff_name, geometry, REDUCTION_SCALE)?;
    let decrease_pixels = backend
        .reduce_region(&image, &decrease, geometry, REDUCTION_SCALE)?
        .count;
    let increase_pixels = backend
        .reduce_region(&image, &increase, geometry, REDUCTION_SCALE)?
        .count;

    let mean_delta = after_stats
        .metric(index, "mean")
        .zip(before_stats.metric(index, "mean"))
        .map(|(a, b)| a - b);

    let report = ChangeReport {
        index: index.to_string(),
        threshold,
        before_date: before.acquired_date(),
        after_date: after.acquired_date(),
        before: before_stats,
        after: after_stats,
        difference: StatisticsResult::from_stats(&diff_name, &diff_stats),
        mean_delta,
        decrease_pixels,
        increase_pixels,
        stable_pixels: diff_stats.count - decrease_pixels - increase_pixels,
    };
    Ok(ChangeDetection { image, report })
}
