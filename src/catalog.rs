// src/catalog.rs
//! Index definitions and the built-in catalog
//!
//! The catalog is a read-only table built once per process. User-authored
//! definitions use the same `IndexDefinition` type and are passed explicitly
//! to the compositor alongside it.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// How an index band is derived from its band references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKind {
    /// (A - B) / (A + B)
    #[serde(alias = "normalized_diff")]
    NormalizedDifference,
    /// A / B
    Ratio,
    /// A - B
    Difference,
    /// Enhanced Vegetation Index over [NIR, RED, BLUE]
    Evi,
    /// Soil-Adjusted Vegetation Index over [NIR, RED]
    Savi,
    /// Bare Soil Index over [SWIR1, RED, NIR, BLUE]
    Bsi,
    /// Index-based Built-up Index over [SWIR1, NIR, GREEN, RED]
    Ibi,
    /// Arithmetic over named variables bound to bands
    Expression,
}

impl FormulaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormulaKind::NormalizedDifference => "normalized_difference",
            FormulaKind::Ratio => "ratio",
            FormulaKind::Difference => "difference",
            FormulaKind::Evi => "evi",
            FormulaKind::Savi => "savi",
            FormulaKind::Bsi => "bsi",
            FormulaKind::Ibi => "ibi",
            FormulaKind::Expression => "expression",
        }
    }

    /// Number of ordered band references a fixed formula consumes.
    pub fn required_bands(&self) -> usize {
        match self {
            FormulaKind::NormalizedDifference
            | FormulaKind::Ratio
            | FormulaKind::Difference
            | FormulaKind::Savi => 2,
            FormulaKind::Evi => 3,
            FormulaKind::Bsi | FormulaKind::Ibi => 4,
            FormulaKind::Expression => 0,
        }
    }
}

impl fmt::Display for FormulaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Vegetation,
    Urban,
    Moisture,
    Soil,
    Fire,
    #[default]
    Custom,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Vegetation,
        Category::Urban,
        Category::Moisture,
        Category::Soil,
        Category::Fire,
        Category::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Vegetation => "Vegetation",
            Category::Urban => "Urban",
            Category::Moisture => "Moisture",
            Category::Soil => "Soil",
            Category::Fire => "Fire",
            Category::Custom => "Custom",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::InvalidConfig {
                field: "category".into(),
                reason: format!(
                    "unknown category {s}, expected one of {}",
                    Category::ALL.iter().join(", ")
                ),
            })
    }
}

fn default_min() -> f64 {
    -1.0
}

fn default_max() -> f64 {
    1.0
}

fn default_palette() -> Vec<String> {
    vec!["FF0000".into(), "FFFFFF".into(), "00AA00".into()]
}

/// Describes how to derive one named band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub formula: FormulaKind,
    /// Ordered band references for the fixed formulas.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bands: Vec<String>,
    /// Expression text for [`FormulaKind::Expression`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Variable name to band code, for [`FormulaKind::Expression`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    #[serde(default = "default_min")]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
    #[serde(default = "default_palette")]
    pub palette: Vec<String>,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub heritage_use: String,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, formula: FormulaKind, bands: &[&str]) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            formula,
            bands: bands.iter().map(|b| b.to_string()).collect(),
            expression: None,
            variables: BTreeMap::new(),
            min: default_min(),
            max: default_max(),
            palette: default_palette(),
            category: Category::Custom,
            description: String::new(),
            heritage_use: String::new(),
        }
    }

    pub fn normalized_difference(name: impl Into<String>, a: &str, b: &str) -> Self {
        Self::new(name, FormulaKind::NormalizedDifference, &[a, b])
    }

    pub fn ratio(name: impl Into<String>, a: &str, b: &str) -> Self {
        Self::new(name, FormulaKind::Ratio, &[a, b])
    }

    pub fn difference(name: impl Into<String>, a: &str, b: &str) -> Self {
        Self::new(name, FormulaKind::Difference, &[a, b])
    }

    pub fn expression<I, K, V>(name: impl Into<String>, expression: &str, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut def = Self::new(name, FormulaKind::Expression, &[]);
        def.expression = Some(expression.to_string());
        def.variables = variables
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        def
    }

    pub fn with_display(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_palette(mut self, palette: &[&str]) -> Self {
        self.palette = palette.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_text(mut self, label: &str, description: &str, heritage_use: &str) -> Self {
        self.label = label.to_string();
        self.description = description.to_string();
        self.heritage_use = heritage_use.to_string();
        self
    }

    /// Every band code the definition reads, in reference order.
    pub fn referenced_bands(&self) -> Vec<&str> {
        match self.formula {
            FormulaKind::Expression => self.variables.values().map(String::as_str).collect(),
            _ => self.bands.iter().map(String::as_str).collect(),
        }
    }
}

/// One Sentinel-2 MSI band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectralBand {
    pub code: &'static str,
    pub label: &'static str,
    pub wavelength_nm: u32,
    pub resolution_m: u32,
}

pub const SENTINEL2_BANDS: &[SpectralBand] = &[
    SpectralBand { code: "B1", label: "Coastal Aerosol", wavelength_nm: 443, resolution_m: 60 },
    SpectralBand { code: "B2", label: "Blue", wavelength_nm: 490, resolution_m: 10 },
    SpectralBand { code: "B3", label: "Green", wavelength_nm: 560, resolution_m: 10 },
    SpectralBand { code: "B4", label: "Red", wavelength_nm: 665, resolution_m: 10 },
    SpectralBand { code: "B5", label: "Red Edge 1", wavelength_nm: 705, resolution_m: 20 },
    SpectralBand { code: "B6", label: "Red Edge 2", wavelength_nm: 740, resolution_m: 20 },
    SpectralBand { code: "B7", label: "Red Edge 3", wavelength_nm: 783, resolution_m: 20 },
    SpectralBand { code: "B8", label: "NIR", wavelength_nm: 842, resolution_m: 10 },
    SpectralBand { code: "B8A", label: "Narrow NIR", wavelength_nm: 865, resolution_m: 20 },
    SpectralBand { code: "B9", label: "Water Vapour", wavelength_nm: 945, resolution_m: 60 },
    SpectralBand { code: "B11", label: "SWIR 1", wavelength_nm: 1610, resolution_m: 20 },
    SpectralBand { code: "B12", label: "SWIR 2", wavelength_nm: 2190, resolution_m: 20 },
];

pub fn sentinel2_band(code: &str) -> Option<&'static SpectralBand> {
    SENTINEL2_BANDS.iter().find(|b| b.code == code)
}

/// Named colour ramps offered for custom indices.
pub const NAMED_PALETTES: &[(&str, &[&str])] = &[
    ("red-yellow-green", &["FF0000", "FFFF00", "00AA00"]),
    ("green-yellow-red", &["00AA00", "FFFF00", "FF0000"]),
    ("brown-white-blue", &["8B4513", "FFFFFF", "0000FF"]),
    ("blue-white-red", &["0000FF", "FFFFFF", "FF0000"]),
    ("white-blue", &["FFFFFF", "0000FF"]),
    ("green-white-red", &["00AA00", "FFFFFF", "FF0000"]),
    ("black-white", &["000000", "FFFFFF"]),
    ("green-white-brown", &["00AA00", "FFFFFF", "8B4513"]),
    ("purple-white-orange", &["800080", "FFFFFF", "FFA500"]),
];

pub fn named_palette(name: &str) -> Option<&'static [&'static str]> {
    NAMED_PALETTES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, p)| *p)
}

const RYG: &[&str] = &["FF0000", "FFFF00", "00AA00"];
const GWR: &[&str] = &["00AA00", "FFFFFF", "FF0000"];

fn builtin_definitions() -> Vec<IndexDefinition> {
    use Category::*;
    use FormulaKind::*;

    vec![
        IndexDefinition::new("NDVI", NormalizedDifference, &["B8", "B4"])
            .with_display(-0.2, 0.8)
            .with_palette(RYG)
            .with_category(Vegetation)
            .with_text(
                "Vegetation Index",
                "Vegetation health. High = dense healthy vegetation.",
                "Monitor vegetation encroachment and landscape change around structures.",
            ),
        IndexDefinition::new("EVI", Evi, &["B8", "B4", "B2"])
            .with_display(-0.2, 0.8)
            .with_palette(RYG)
            .with_category(Vegetation)
            .with_text(
                "Enhanced Vegetation Index",
                "Improved vegetation index reducing atmospheric and soil background noise.",
                "More accurate vegetation monitoring in areas with dense canopy or high aerosols.",
            ),
        IndexDefinition::new("SAVI", Savi, &["B8", "B4"])
            .with_display(-0.5, 1.0)
            .with_palette(RYG)
            .with_category(Vegetation)
            .with_text(
                "Soil-Adjusted Vegetation Index",
                "Vegetation index corrected for soil brightness effect.",
                "Better vegetation detection in arid or semi-arid sites with exposed soil.",
            ),
        IndexDefinition::new("NDRE", NormalizedDifference, &["B8", "B5"])
            .with_display(-0.2, 0.8)
            .with_palette(RYG)
            .with_category(Vegetation)
            .with_text(
                "Red Edge Vegetation Index",
                "Sensitive to chlorophyll content using Red Edge band.",
                "Detect early vegetation stress before it becomes visible in NDVI.",
            ),
        IndexDefinition::new("NDBI", NormalizedDifference, &["B11", "B8"])
            .with_display(-0.5, 0.5)
            .with_palette(GWR)
            .with_category(Urban)
            .with_text(
                "Built-up Index",
                "Highlights built-up and urban areas. High = urban.",
                "Monitor urban expansion and new construction in the buffer zone.",
            ),
        IndexDefinition::new("UI", NormalizedDifference, &["B12", "B8A"])
            .with_display(-0.5, 0.5)
            .with_palette(GWR)
            .with_category(Urban)
            .with_text(
                "Urban Index",
                "Alternative urban index using SWIR2 and Narrow NIR.",
                "Cross-validate NDBI for urban encroachment detection.",
            ),
        IndexDefinition::new("IBI", Ibi, &["B11", "B8", "B3", "B4"])
            .with_display(-1.0, 1.0)
            .with_palette(GWR)
            .with_category(Urban)
            .with_text(
                "Index-Based Built-up Index",
                "Combined built-up index using NDBI, MNDWI and SAVI.",
                "High accuracy urban detection combining multiple spectral signals.",
            ),
        IndexDefinition::new("NDMI", NormalizedDifference, &["B8", "B11"])
            .with_display(-0.5, 0.5)
            .with_palette(&["8B4513", "FFFFFF", "0000FF"])
            .with_category(Moisture)
            .with_text(
                "Moisture Index",
                "Soil and vegetation moisture. High = wet.",
                "Assess waterlogging risk and moisture-related structural damage.",
            ),
        IndexDefinition::new("NDWI", NormalizedDifference, &["B3", "B8"])
            .with_display(-0.5, 0.5)
            .with_palette(&["FFFFFF", "0000FF"])
            .with_category(Moisture)
            .with_text(
                "Water Index",
                "Surface water detection. Positive values = open water.",
                "Monitor flooding risk and proximity to water bodies.",
            ),
        IndexDefinition::new("MNDWI", NormalizedDifference, &["B3", "B11"])
            .with_display(-0.5, 0.5)
            .with_palette(&["FFFFFF", "0000FF"])
            .with_category(Moisture)
            .with_text(
                "Modified Water Index",
                "Improved water index suppressing built-up noise.",
                "More accurate water detection in urban heritage contexts.",
            ),
        IndexDefinition::new("BSI", Bsi, &["B11", "B4", "B8", "B2"])
            .with_display(-1.0, 1.0)
            .with_palette(&["00AA00", "FFFFFF", "8B4513"])
            .with_category(Soil)
            .with_text(
                "Bare Soil Index",
                "Bare soil exposure. High = exposed bare soil.",
                "Identify erosion-prone areas and soil disturbance near structures.",
            ),
        IndexDefinition::new("RI", NormalizedDifference, &["B4", "B3"])
            .with_display(-0.5, 0.5)
            .with_palette(&["00AA00", "FFFFFF", "FF4500"])
            .with_category(Soil)
            .with_text(
                "Redness Index",
                "Iron oxide content in exposed soils.",
                "Detect soil type changes and archaeological features in bare soil areas.",
            ),
        IndexDefinition::new("NBR", NormalizedDifference, &["B8", "B12"])
            .with_display(-1.0, 1.0)
            .with_palette(GWR)
            .with_category(Fire)
            .with_text(
                "Normalized Burn Ratio",
                "Fire damage assessment. Low = burned area.",
                "Assess wildfire impact on landscape surrounding heritage sites.",
            ),
        IndexDefinition::new("BAI", NormalizedDifference, &["B12", "B8A"])
            .with_display(-0.5, 0.5)
            .with_palette(GWR)
            .with_category(Fire)
            .with_text(
                "Burned Area Index",
                "Highlights recently burned areas.",
                "Post-fire damage mapping around heritage sites.",
            ),
    ]
}

/// Read-only registry of index definitions.
#[derive(Debug, Clone)]
pub struct IndexCatalog {
    definitions: Vec<IndexDefinition>,
}

impl IndexCatalog {
    /// The built-in catalog, constructed on first use.
    pub fn builtin() -> &'static IndexCatalog {
        static CATALOG: OnceLock<IndexCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| IndexCatalog {
            definitions: builtin_definitions(),
        })
    }

    /// A catalog over caller-supplied definitions; names must be unique.
    pub fn from_definitions(definitions: Vec<IndexDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        if let Some(dup) = definitions.iter().find(|d| !seen.insert(d.name.as_str())) {
            return Err(EngineError::InvalidConfig {
                field: "catalog".into(),
                reason: format!("duplicate index name {}", dup.name),
            });
        }
        Ok(Self { definitions })
    }

    pub fn empty() -> Self {
        Self {
            definitions: Vec::new(),
        }
    }

    /// Unknown names are simply absent.
    pub fn lookup(&self, name: &str) -> Option<&IndexDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn all(&self) -> &[IndexDefinition] {
        &self.definitions
    }

    pub fn by_category(&self, category: Category) -> Vec<&IndexDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.category == category)
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
