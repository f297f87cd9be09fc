// src/analysis.rs
//! End-to-end analyses over a scene archive
//!
//! Every input is an explicit argument: the config, the archive, the
//! backend and the catalog. Nothing here holds session state.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::ImageryBackend;
use crate::catalog::IndexCatalog;
use crate::collection::{ImageCollection, SceneArchive};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::geometry::Geometry;
use crate::processing::change::{detect_changes, ChangeDetection};
use crate::processing::compositor::IndexCompositor;
use crate::processing::reducer::{reduce, StatisticsResult};
use crate::processing::timeseries::{temporal_series, TemporalRequest, TimePoint};

pub const NO_IMAGES_MESSAGE: &str = "No images were found for the selected time period.";

/// Either a result or an explicit "not enough data" answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome<T> {
    NoImages,
    /// Fewer scenes than the analysis needs.
    InsufficientImages { found: usize, required: usize },
    Completed(T),
}

impl<T> AnalysisOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            AnalysisOutcome::Completed(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AnalysisOutcome<U> {
        match self {
            AnalysisOutcome::NoImages => AnalysisOutcome::NoImages,
            AnalysisOutcome::InsufficientImages { found, required } => {
                AnalysisOutcome::InsufficientImages { found, required }
            }
            AnalysisOutcome::Completed(v) => AnalysisOutcome::Completed(f(v)),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed(_))
    }

    /// Readable explanation for the outcomes without a result.
    pub fn message(&self) -> Option<String> {
        match self {
            AnalysisOutcome::NoImages => Some(NO_IMAGES_MESSAGE.to_string()),
            AnalysisOutcome::InsufficientImages { found, required } => Some(format!(
                "At least {required} images are required, found {found}."
            )),
            AnalysisOutcome::Completed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedIndex {
    pub name: String,
    pub kind: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotReport {
    pub site_name: String,
    pub cache_key: String,
    pub scene_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub statistics: StatisticsResult,
    pub skipped: Vec<SkippedIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalReport {
    pub index: String,
    pub scene_count: usize,
    pub points: Vec<TimePoint>,
}

pub struct Analyzer<'a, B: ImageryBackend + ?Sized> {
    backend: &'a B,
    archive: &'a SceneArchive,
    compositor: IndexCompositor<'a>,
}

impl<'a, B: ImageryBackend + ?Sized> Analyzer<'a, B> {
    pub fn new(backend: &'a B, archive: &'a SceneArchive) -> Self {
        Self::with_catalog(backend, archive, IndexCatalog::builtin())
    }

    pub fn with_catalog(backend: &'a B, archive: &'a SceneArchive, catalog: &'a IndexCatalog) -> Self {
        Self {
            backend,
            archive,
            compositor: IndexCompositor::new(catalog),
        }
    }

    /// Validated geometry and the scenes matching `config`.
    pub fn query(&self, config: &AnalysisConfig) -> Result<(Geometry, ImageCollection)> {
        config.validate()?;
        let geometry = config.geometry()?;
        let collection = self.archive.query(
            &geometry,
            config.start_date,
            config.end_date,
            config.cloud_cover,
        );
        Ok((geometry, collection))
    }

    /// Statistics of every reported index over the median composite.
    pub fn snapshot(&self, config: &AnalysisConfig) -> Result<AnalysisOutcome<SnapshotReport>> {
        let (geometry, collection) = self.query(config)?;
        if collection.is_empty() {
            info!(site = %config.site_name, "{NO_IMAGES_MESSAGE}");
            return Ok(AnalysisOutcome::NoImages);
        }

        let median = collection.compose_median(self.backend)?;
        let composition = self
            .compositor
            .compose_with_report(&median, &config.custom_indices);

        let mut skipped: Vec<SkippedIndex> = composition
            .failures()
            .map(|err| SkippedIndex {
                name: err.index().to_string(),
                kind: err.kind().to_string(),
                reason: err.to_string(),
            })
            .collect();

        let mut statistics = StatisticsResult::default();
        for name in config.reported_indices() {
            if composition.image.has_band(name) {
                statistics.extend(reduce(self.backend, &composition.image, name, &geometry)?);
            } else if !skipped.iter().any(|s| s.name == name) {
                skipped.push(SkippedIndex {
                    name: name.to_string(),
                    kind: "unknown_index".into(),
                    reason: format!("index {name} is not defined"),
                });
            }
        }

        info!(
            site = %config.site_name,
            scenes = collection.len(),
            values = statistics.len(),
            skipped = skipped.len(),
            "snapshot analysis complete"
        );
        Ok(AnalysisOutcome::Completed(SnapshotReport {
            site_name: config.site_name.clone(),
            cache_key: config.cache_key(),
            scene_count: collection.len(),
            first_date: collection.first().and_then(|s| s.acquired_date()),
            last_date: collection.last().and_then(|s| s.acquired_date()),
            statistics,
            skipped,
        }))
    }

    /// Change of `index` between the first and the last matching scene.
    pub fn change(&self, config: &AnalysisConfig, index: &str) -> Result<AnalysisOutcome<ChangeDetection>> {
        let (geometry, collection) = self.query(config)?;
        let (Some(first), Some(last)) = (collection.first(), collection.last()) else {
            return Ok(AnalysisOutcome::NoImages);
        };
        if collection.len() < 2 {
            return Ok(AnalysisOutcome::InsufficientImages {
                found: collection.len(),
                required: 2,
            });
        }

        let before = self.compositor.compose(first, &config.custom_indices);
        let after = self.compositor.compose(last, &config.custom_indices);
        let detection = detect_changes(
            self.backend,
            &before,
            &after,
            index,
            &geometry,
            config.change_threshold,
        )?;
        Ok(AnalysisOutcome::Completed(detection))
    }

    /// Regional mean of `index` for up to `config.sample_size` scenes,
    /// skipping dates in `known`.
    pub fn temporal(
        &self,
        config: &AnalysisConfig,
        index: &str,
        known: Option<&BTreeSet<NaiveDate>>,
    ) -> Result<AnalysisOutcome<TemporalReport>> {
        let (geometry, collection) = self.query(config)?;
        if collection.is_empty() {
            return Ok(AnalysisOutcome::NoImages);
        }

        let request = TemporalRequest {
            index,
            geometry: &geometry,
            sample_size: config.sample_size,
            user_definitions: &config.custom_indices,
            known,
        };
        let points = temporal_series(self.backend, &self.compositor, &collection, &request)?;
        Ok(AnalysisOutcome::Completed(TemporalReport {
            index: index.to_string(),
            scene_count: collection.len(),
            points,
        }))
    }
}
