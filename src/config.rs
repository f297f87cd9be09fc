// src/config.rs
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::IndexDefinition;
use crate::error::{EngineError, Result};
use crate::geometry::Geometry;

/// A named heritage site with a default buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SitePreset {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub buffer_km: f64,
}

pub const SITE_PRESETS: &[SitePreset] = &[
    SitePreset { name: "Alba Iulia Fortress (Romania)", latitude: 46.0686, longitude: 23.5714, buffer_km: 2.0 },
    SitePreset { name: "Sagrada Familia (Spain)", latitude: 41.4036, longitude: 2.1744, buffer_km: 1.0 },
    SitePreset { name: "Pyramids of Giza (Egypt)", latitude: 29.9792, longitude: 31.1342, buffer_km: 2.5 },
    SitePreset { name: "Machu Picchu (Peru)", latitude: -13.1631, longitude: -72.5450, buffer_km: 1.5 },
    SitePreset { name: "Colosseum Rome (Italy)", latitude: 41.8902, longitude: 12.4922, buffer_km: 0.8 },
    SitePreset { name: "Taj Mahal (India)", latitude: 27.1751, longitude: 78.0421, buffer_km: 1.2 },
    SitePreset { name: "Acropolis of Athens (Greece)", latitude: 37.9715, longitude: 23.7257, buffer_km: 1.0 },
];

/// Case-insensitive preset lookup by full name, falling back to a substring.
pub fn site_preset(name: &str) -> Option<&'static SitePreset> {
    let name = name.to_lowercase();
    SITE_PRESETS
        .iter()
        .find(|p| p.name.to_lowercase() == name)
        .or_else(|| SITE_PRESETS.iter().find(|p| p.name.to_lowercase().contains(&name)))
}

fn default_site_name() -> String {
    "Custom Region".to_string()
}

fn default_buffer_km() -> f64 {
    2.0
}

fn default_cloud_cover() -> f64 {
    20.0
}

fn default_indices() -> Vec<String> {
    vec!["NDVI".to_string(), "NDBI".to_string()]
}

fn default_change_threshold() -> f64 {
    0.2
}

fn default_sample_size() -> usize {
    20
}

/// Area of interest in geographic coordinates (WGS84 degrees).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Region {
    Point {
        latitude: f64,
        longitude: f64,
        #[serde(default = "default_buffer_km")]
        buffer_km: f64,
    },
    /// Exterior ring of `[longitude, latitude]` pairs.
    Polygon { coordinates: Vec<[f64; 2]> },
}

impl Region {
    /// `(latitude, longitude)` of the point, or of the ring's bounding box centre.
    pub fn center(&self) -> (f64, f64) {
        match self {
            Region::Point {
                latitude,
                longitude,
                ..
            } => (*latitude, *longitude),
            Region::Polygon { coordinates } => {
                let fold = |f: fn(f64, f64) -> f64, init: f64, i: usize| {
                    coordinates.iter().map(|c| c[i]).fold(init, f)
                };
                let (lon0, lon1) = (fold(f64::min, f64::INFINITY, 0), fold(f64::max, f64::NEG_INFINITY, 0));
                let (lat0, lat1) = (fold(f64::min, f64::INFINITY, 1), fold(f64::max, f64::NEG_INFINITY, 1));
                ((lat0 + lat1) / 2.0, (lon0 + lon1) / 2.0)
            }
        }
    }

    pub fn buffer_km(&self) -> f64 {
        match self {
            Region::Point { buffer_km, .. } => *buffer_km,
            Region::Polygon { .. } => 0.0,
        }
    }

    /// Planar geometry in Web Mercator metres.
    pub fn to_geometry(&self) -> Result<Geometry> {
        match self {
            Region::Point {
                latitude,
                longitude,
                buffer_km,
            } => Geometry::buffered_site(*longitude, *latitude, buffer_km * 1000.0),
            Region::Polygon { coordinates } => {
                let ring: Vec<(f64, f64)> = coordinates.iter().map(|c| (c[0], c[1])).collect();
                Geometry::geographic_polygon(&ring)
            }
        }
    }
}

/// Everything one analysis request is made of. Two configs with equal
/// fields describe the same request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_site_name")]
    pub site_name: String,
    pub region: Region,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Scenes must have strictly less cloud cover than this, in percent.
    #[serde(default = "default_cloud_cover")]
    pub cloud_cover: f64,
    /// Catalog indices to report statistics for.
    #[serde(default = "default_indices")]
    pub indices: Vec<String>,
    #[serde(default)]
    pub custom_indices: Vec<IndexDefinition>,
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,
    /// Maximum number of scenes in a temporal series.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl AnalysisConfig {
    /// Config with every optional field at its default.
    pub fn new(
        site_name: impl Into<String>,
        region: Region,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            site_name: site_name.into(),
            region,
            start_date,
            end_date,
            cloud_cover: default_cloud_cover(),
            indices: default_indices(),
            custom_indices: Vec::new(),
            change_threshold: default_change_threshold(),
            sample_size: default_sample_size(),
        }
    }

    pub fn for_preset(preset: &SitePreset, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        let region = Region::Point {
            latitude: preset.latitude,
            longitude: preset.longitude,
            buffer_km: preset.buffer_km,
        };
        Self::new(preset.name, region, start_date, end_date)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: String| {
            Err(EngineError::InvalidConfig {
                field: field.to_string(),
                reason,
            })
        };

        if self.start_date > self.end_date {
            return invalid(
                "start_date",
                format!("{} is after end_date {}", self.start_date, self.end_date),
            );
        }
        if !(0.0..=100.0).contains(&self.cloud_cover) {
            return invalid("cloud_cover", format!("must be within 0..=100, got {}", self.cloud_cover));
        }
        if !(self.change_threshold.is_finite() && self.change_threshold >= 0.0) {
            return invalid(
                "change_threshold",
                format!("must be a non-negative number, got {}", self.change_threshold),
            );
        }
        if self.sample_size == 0 {
            return invalid("sample_size", "must be at least 1".into());
        }

        match &self.region {
            Region::Point {
                latitude,
                longitude,
                buffer_km,
            } => {
                if !(-90.0..=90.0).contains(latitude) {
                    return invalid("region.latitude", format!("out of range: {latitude}"));
                }
                if !(-180.0..=180.0).contains(longitude) {
                    return invalid("region.longitude", format!("out of range: {longitude}"));
                }
                if !(buffer_km.is_finite() && *buffer_km > 0.0) {
                    return invalid("region.buffer_km", format!("must be positive, got {buffer_km}"));
                }
            }
            Region::Polygon { coordinates } => {
                if coordinates.len() < 3 {
                    return invalid(
                        "region.coordinates",
                        format!("needs at least 3 vertices, got {}", coordinates.len()),
                    );
                }
            }
        }

        for def in &self.custom_indices {
            if def.name.trim().is_empty() {
                return invalid("custom_indices", "index name must not be empty".into());
            }
        }
        Ok(())
    }

    pub fn geometry(&self) -> Result<Geometry> {
        self.region.to_geometry()
    }

    /// Lowercase hex SHA-256 of site, centre, buffer, dates and cloud ceiling.
    pub fn cache_key(&self) -> String {
        let (lat, lon) = self.region.center();
        let input = format!(
            "{}_{}_{}_{}_{}_{}_{}",
            self.site_name,
            lat,
            lon,
            self.region.buffer_km(),
            self.start_date,
            self.end_date,
            self.cloud_cover
        );
        hex::encode(Sha256::digest(input.as_bytes()))
    }

    /// Names of every index to report: the selected catalog indices, then
    /// custom indices not already listed.
    pub fn reported_indices(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.indices.iter().map(String::as_str).collect();
        for def in &self.custom_indices {
            if !names.contains(&def.name.as_str()) {
                names.push(&def.name);
            }
        }
        names
    }
}
