// src/processing/timeseries.rs
//! Regional mean of one index through time

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::compositor::IndexCompositor;
use super::reducer::reduce;
use crate::backend::ImageryBackend;
use crate::catalog::IndexDefinition;
use crate::collection::{even_positions, ImageCollection};
use crate::error::Result;
use crate::geometry::Geometry;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub date: NaiveDate,
    /// Absent when the scene has no valid pixel in the region or the index
    /// could not be computed for it.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct TemporalRequest<'a> {
    pub index: &'a str,
    pub geometry: &'a Geometry,
    pub sample_size: usize,
    pub user_definitions: &'a [IndexDefinition],
    /// Dates that already have a value and are skipped.
    pub known: Option<&'a BTreeSet<NaiveDate>>,
}

/// One point per sampled scene, in ascending date order.
///
/// Scenes on a known date are dropped and scenes sharing an acquisition date
/// collapse to the first; at most `sample_size` of the remaining scenes are
/// then spread evenly over them. A refresh with the dates computed so far
/// therefore reaches scenes the previous run did not sample.
pub fn temporal_series<B: ImageryBackend + ?Sized>(
    backend: &B,
    compositor: &IndexCompositor<'_>,
    collection: &ImageCollection,
    request: &TemporalRequest<'_>,
) -> Result<Vec<TimePoint>> {
    let mut seen = BTreeSet::new();
    let candidates: Vec<_> = collection
        .iter()
        .filter_map(|scene| scene.acquired_date().map(|date| (date, scene)))
        .filter(|(date, _)| !request.known.is_some_and(|k| k.contains(date)))
        .filter(|(date, _)| seen.insert(*date))
        .collect();

    let mut points = Vec::new();
    for pos in even_positions(candidates.len(), request.sample_size) {
        let (date, scene) = candidates[pos];
        let composed = compositor.compose(scene, request.user_definitions);
        let value = if composed.has_band(request.index) {
            reduce(backend, &composed, request.index, request.geometry)?.metric(request.index, "mean")
        } else {
            None
        };
        points.push(TimePoint { date, value });
    }

    debug!(
        index = request.index,
        candidates = candidates.len(),
        points = points.len(),
        "temporal series"
    );
    Ok(points)
}
