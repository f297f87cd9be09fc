// src/batch.rs
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::analysis::{AnalysisOutcome, Analyzer};
use crate::backend::ImageryBackend;
use crate::catalog::IndexDefinition;
use crate::config::{site_preset, AnalysisConfig, Region};

#[derive(Deserialize, Serialize, Debug)]
pub struct BatchConfig {
    #[serde(default)]
    pub global: GlobalParams,
    pub analyses: Vec<BatchAnalysis>,
}

/// Defaults applied to every analysis that does not set the field itself.
#[derive(Deserialize, Serialize, Debug, Default)]
pub struct GlobalParams {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub cloud_cover: Option<f64>,
    pub indices: Option<Vec<String>>,
    #[serde(default)]
    pub custom_indices: Vec<IndexDefinition>,
    pub change_threshold: Option<f64>,
    pub sample_size: Option<usize>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    #[default]
    Snapshot,
    Change,
    Timeseries,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct BatchAnalysis {
    #[serde(rename = "type", default)]
    pub kind: AnalysisKind,
    /// Index for change and timeseries analyses.
    pub index: Option<String>,
    /// Site preset name; supplies the region and site name.
    pub preset: Option<String>,
    pub site_name: Option<String>,
    pub region: Option<Region>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub cloud_cover: Option<f64>,
    pub indices: Option<Vec<String>>,
    pub custom_indices: Option<Vec<IndexDefinition>>,
    pub change_threshold: Option<f64>,
    pub sample_size: Option<usize>,
}

impl BatchAnalysis {
    /// Merge with `global` into a validated config.
    pub fn resolve(&self, global: &GlobalParams) -> Result<AnalysisConfig> {
        let start_date = self
            .start_date
            .or(global.start_date)
            .ok_or_else(|| anyhow!("start_date is required"))?;
        let end_date = self
            .end_date
            .or(global.end_date)
            .ok_or_else(|| anyhow!("end_date is required"))?;

        let mut config = match (&self.region, &self.preset) {
            (Some(region), _) => {
                AnalysisConfig::new("Custom Region", region.clone(), start_date, end_date)
            }
            (None, Some(name)) => {
                let preset = site_preset(name).ok_or_else(|| anyhow!("unknown site preset {name}"))?;
                AnalysisConfig::for_preset(preset, start_date, end_date)
            }
            (None, None) => bail!("either region or preset is required"),
        };

        if let Some(site_name) = &self.site_name {
            config.site_name = site_name.clone();
        }
        if let Some(cloud) = self.cloud_cover.or(global.cloud_cover) {
            config.cloud_cover = cloud;
        }
        if let Some(indices) = self.indices.as_ref().or(global.indices.as_ref()) {
            config.indices = indices.clone();
        }
        config.custom_indices = self
            .custom_indices
            .clone()
            .unwrap_or_else(|| global.custom_indices.clone());
        if let Some(threshold) = self.change_threshold.or(global.change_threshold) {
            config.change_threshold = threshold;
        }
        if let Some(sample_size) = self.sample_size.or(global.sample_size) {
            config.sample_size = sample_size;
        }

        config.validate()?;
        Ok(config)
    }

    fn index(&self) -> Result<&str> {
        self.index
            .as_deref()
            .ok_or_else(|| anyhow!("{:?} analysis needs an index", self.kind))
    }
}

#[derive(Serialize, Debug)]
pub struct BatchResult {
    pub site_name: String,
    pub kind: AnalysisKind,
    pub cache_key: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

fn into_result<T: Serialize>(
    config: &AnalysisConfig,
    kind: AnalysisKind,
    outcome: AnalysisOutcome<T>,
) -> Result<BatchResult> {
    let message = outcome.message();
    let result = outcome.completed().map(serde_json::to_value).transpose()?;
    Ok(BatchResult {
        site_name: config.site_name.clone(),
        kind,
        cache_key: config.cache_key(),
        completed: result.is_some(),
        message,
        result,
    })
}

pub fn load_batch(config_path: &Path) -> Result<BatchConfig> {
    let config_content = fs::read_to_string(config_path)
        .with_context(|| format!("reading batch file {}", config_path.display()))?;
    serde_json::from_str(&config_content)
        .with_context(|| format!("parsing batch file {}", config_path.display()))
}

/// Run every analysis in order; the first failing one stops the batch.
pub fn run_batch<B: ImageryBackend + ?Sized>(
    batch: &BatchConfig,
    analyzer: &Analyzer<'_, B>,
) -> Result<Vec<BatchResult>> {
    info!("Starting batch processing with {} analyses", batch.analyses.len());

    let total = batch.analyses.len();
    let mut results = Vec::with_capacity(total);
    for (i, analysis) in batch.analyses.iter().enumerate() {
        let config = analysis
            .resolve(&batch.global)
            .with_context(|| format!("analysis {} of {total}", i + 1))?;
        info!("[{}/{}] {:?} analysis of {}", i + 1, total, analysis.kind, config.site_name);

        let result = match analysis.kind {
            AnalysisKind::Snapshot => into_result(&config, analysis.kind, analyzer.snapshot(&config)?)?,
            AnalysisKind::Change => {
                let outcome = analyzer
                    .change(&config, analysis.index()?)?
                    .map(|detection| detection.report);
                into_result(&config, analysis.kind, outcome)?
            }
            AnalysisKind::Timeseries => {
                into_result(&config, analysis.kind, analyzer.temporal(&config, analysis.index()?, None)?)?
            }
        };
        results.push(result);
    }

    info!("Batch processing complete");
    Ok(results)
}
