// src/processing/reducer.rs
//! Region statistics
//!
//! A region is sampled on a square lattice of [`REDUCTION_SCALE`] map units
//! anchored at the image origin. Each lattice point inside the geometry reads
//! the pixel that contains it. Undefined (NaN or infinite) values are left out
//! of every aggregate; a region with no valid samples reports every aggregate
//! as absent.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backend::ImageryBackend;
use crate::error::Result;
use crate::geometry::Geometry;
use crate::raster::{BandExpr, Grid, Image};

/// Linear size of a reduction sample, in map units (metres).
pub const REDUCTION_SCALE: f64 = 10.0;

/// Samples folded per parallel chunk. Fixed so the merge order, and with it
/// the floating point result, does not depend on the thread count.
const CHUNK: usize = 4096;

/// Aggregate statistics of one band over one region.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionStats {
    /// Number of valid samples.
    pub count: usize,
    pub mean: Option<f64>,
    /// Population standard deviation.
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RegionStats {
    pub fn is_degenerate(&self) -> bool {
        self.count == 0
    }
}

/// Single pass mean/variance accumulator (Welford), mergeable across chunks.
#[derive(Debug, Clone, Copy)]
pub struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl RunningStats {
    pub fn push(&mut self, v: f64) {
        if !v.is_finite() {
            return;
        }
        self.count += 1;
        let delta = v - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (v - self.mean);
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    pub fn merge(mut self, other: RunningStats) -> RunningStats {
        if other.count == 0 {
            return self;
        }
        if self.count == 0 {
            return other;
        }
        let n = (self.count + other.count) as f64;
        let delta = other.mean - self.mean;
        self.mean += delta * other.count as f64 / n;
        self.m2 += other.m2 + delta * delta * (self.count as f64 * other.count as f64) / n;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self
    }

    pub fn finish(&self) -> RegionStats {
        if self.count == 0 {
            return RegionStats::default();
        }
        RegionStats {
            count: self.count,
            mean: Some(self.mean),
            std_dev: Some((self.m2 / self.count as f64).max(0.0).sqrt()),
            min: Some(self.min),
            max: Some(self.max),
        }
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        let mut stats = RunningStats::default();
        for v in iter {
            stats.push(v);
        }
        stats
    }
}

/// Linear pixel indices read by the sample lattice inside `geometry`.
///
/// Pixels larger than `scale` are read once per lattice point they contain.
pub fn sample_indices(grid: &Grid, geometry: &Geometry, scale: f64) -> Vec<usize> {
    let footprint = grid.bounds();
    let Some(bbox) = geometry.bounding_rect() else {
        return Vec::new();
    };
    if !geometry.intersects_rect(&footprint) || grid.is_empty() {
        return Vec::new();
    }

    let t = &grid.transform;
    let step_x = scale * t.pixel_width.signum();
    let step_y = scale * t.pixel_height.signum();

    // lattice point (i, j) sits at origin + (i + 0.5, j + 0.5) * step
    let range = |lo: f64, hi: f64, origin: f64, step: f64, extent: f64| {
        let a = (lo - origin) / step;
        let b = (hi - origin) / step;
        let first = (a.min(b) - 0.5).ceil().max(0.0);
        let last = (a.max(b) - 0.5).floor().min((extent / scale).ceil() - 1.0);
        (first as i64, last as i64)
    };
    let width_units = grid.width as f64 * t.pixel_width.abs();
    let height_units = grid.height as f64 * t.pixel_height.abs();
    let (i0, i1) = range(bbox.min().x, bbox.max().x, t.origin_x, step_x, width_units);
    let (j0, j1) = range(bbox.min().y, bbox.max().y, t.origin_y, step_y, height_units);

    let mut out = Vec::new();
    for j in j0..=j1 {
        let y = t.origin_y + (j as f64 + 0.5) * step_y;
        for i in i0..=i1 {
            let x = t.origin_x + (i as f64 + 0.5) * step_x;
            if geometry.contains(x, y) {
                if let Some(idx) = grid.index_at(x, y) {
                    out.push(idx);
                }
            }
        }
    }
    out
}

/// Evaluate `expr` at each sampled index and aggregate.
pub fn reduce_samples(expr: &BandExpr, indices: &[usize]) -> RegionStats {
    indices
        .par_chunks(CHUNK)
        .map(|chunk| chunk.iter().map(|&idx| expr.eval_at(idx)).collect::<RunningStats>())
        .collect::<Vec<_>>()
        .into_iter()
        .fold(RunningStats::default(), RunningStats::merge)
        .finish()
}

/// Flat `"{band}_{metric}"` table. Absent aggregates serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatisticsResult(BTreeMap<String, Option<f64>>);

impl StatisticsResult {
    pub const METRICS: [&'static str; 4] = ["mean", "stdDev", "min", "max"];

    pub fn from_stats(band: &str, stats: &RegionStats) -> Self {
        let values = [stats.mean, stats.std_dev, stats.min, stats.max];
        Self(
            Self::METRICS
                .iter()
                .zip(values)
                .map(|(metric, v)| (format!("{band}_{metric}"), v))
                .collect(),
        )
    }

    /// Value of `key`; `None` both for unknown keys and absent aggregates.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied().flatten()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn metric(&self, band: &str, metric: &str) -> Option<f64> {
        self.get(&format!("{band}_{metric}"))
    }

    pub fn extend(&mut self, other: StatisticsResult) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reduce one band of `image` over `geometry` at [`REDUCTION_SCALE`].
///
/// Blocks until the backend has a result.
pub fn reduce<B: ImageryBackend + ?Sized>(
    backend: &B,
    image: &Image,
    band: &str,
    geometry: &Geometry,
) -> Result<StatisticsResult> {
    let stats = backend.reduce_region(image, band, geometry, REDUCTION_SCALE)?;
    Ok(StatisticsResult::from_stats(band, &stats))
}
