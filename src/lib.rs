// src/lib.rs
pub mod analysis;
pub mod backend;
pub mod batch;
pub mod catalog;
pub mod cli;
pub mod collection;
pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod processing;
pub mod raster;
pub mod utils;

pub use analysis::{AnalysisOutcome, Analyzer, SnapshotReport, TemporalReport};
pub use backend::{DeferredBackend, ImageryBackend, InMemoryBackend};
pub use catalog::{Category, FormulaKind, IndexCatalog, IndexDefinition};
pub use collection::{ImageCollection, SceneArchive};
pub use config::{AnalysisConfig, Region};
pub use error::{EngineError, IndexError, Result};
pub use geometry::Geometry;
pub use processing::{IndexCompositor, RegionStats, StatisticsResult};
pub use raster::{Band, Grid, Image, Raster};

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
