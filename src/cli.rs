use clap::{Parser, Subcommand};
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::catalog::FormulaKind;

#[derive(Parser)]
#[command(name = "heritage-calc")]
#[command(about = "Spectral index engine and region statistics for heritage-site monitoring")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Backend worker threads (default: one per CPU)
    #[arg(long, global = true)]
    pub threads: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the built-in index catalog
    Catalog {
        /// Only indices of this category (Vegetation, Urban, Moisture, Soil, Fire)
        #[arg(short, long)]
        category: Option<String>,
    },

    /// List Sentinel-2 bands, named palettes and site presets
    Bands,

    /// Evaluate one index on a single pixel
    Probe {
        /// Catalog index name, e.g. NDVI
        #[arg(short, long, conflicts_with_all = ["formula", "expression"])]
        index: Option<String>,

        /// Fixed formula kind, e.g. normalized_difference or evi
        #[arg(short, long, value_parser = parse_formula, requires = "bands")]
        formula: Option<FormulaKind>,

        /// Ordered band references for --formula, e.g. B8,B4
        #[arg(short, long, value_delimiter = ',')]
        bands: Vec<String>,

        /// Free expression, e.g. "(NIR-RED)/(NIR+RED)"
        #[arg(short, long, conflicts_with = "formula")]
        expression: Option<String>,

        /// Expression variable binding VAR=BAND (repeatable)
        #[arg(long = "var", value_parser = parse_pair::<String>)]
        variables: Vec<(String, String)>,

        /// Pixel value BAND=VALUE (repeatable)
        #[arg(short, long = "pixel", value_parser = parse_pair::<f64>, required = true)]
        pixels: Vec<(String, f64)>,
    },

    /// Snapshot statistics over the median composite
    Analyze {
        /// Analysis config (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Scene archive manifest (JSON)
        #[arg(short, long)]
        archive: PathBuf,

        /// Directory of cached results, keyed by request hash
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Change of one index between the first and last scene
    Change {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        archive: PathBuf,

        /// Index to compare
        #[arg(short, long, default_value = "NDVI")]
        index: String,

        /// Override the config's change threshold
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Regional mean of one index through time
    Timeseries {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        archive: PathBuf,

        #[arg(short, long, default_value = "NDVI")]
        index: String,

        /// Dates already known, skipped (YYYY-MM-DD, repeatable)
        #[arg(long)]
        known: Vec<NaiveDate>,
    },

    /// Run a batch file of analyses
    Batch {
        /// Batch file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        archive: PathBuf,
    },

    /// Write one index band of a scene as GeoTIFF (needs the gdal feature)
    Export {
        #[arg(short, long)]
        archive: PathBuf,

        /// Scene id in the archive
        #[arg(short, long)]
        scene: String,

        #[arg(short, long)]
        index: String,

        /// Output file path
        #[arg(short, long, default_value = "output.tif")]
        output: PathBuf,

        /// Use float32 instead of int16
        #[arg(long)]
        float: bool,

        /// Scaling factor for fixed-point
        #[arg(long, default_value = "10000")]
        scale_factor: i32,

        /// Compression (NONE, DEFLATE, ZSTD, LZW)
        #[arg(long, default_value = "DEFLATE")]
        compress: String,

        #[arg(long, default_value = "6")]
        compress_level: u8,

        /// Write striped instead of tiled
        #[arg(long)]
        no_tiled: bool,
    },
}

fn parse_formula(s: &str) -> Result<FormulaKind, String> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .map_err(|_| format!("unknown formula {s}"))
}

fn parse_pair<T: std::str::FromStr>(s: &str) -> Result<(String, T), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s}"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid value in {s}"))?;
    Ok((key.trim().to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_formula("EVI"), Ok(FormulaKind::Evi));
        assert_eq!(parse_formula("normalized_diff"), Ok(FormulaKind::NormalizedDifference));
        assert!(parse_formula("magic").is_err());
        assert_eq!(parse_pair::<f64>("B8=5000"), Ok(("B8".to_string(), 5000.0)));
        assert!(parse_pair::<f64>("B8").is_err());
    }

    #[test]
    fn test_probe_arguments() {
        let cli = Cli::try_parse_from([
            "heritage-calc", "probe", "--formula", "ratio", "--bands", "B8,B4", "-p", "B8=4", "-p", "B4=2",
        ])
        .unwrap();
        match cli.command {
            Commands::Probe { formula, bands, pixels, .. } => {
                assert_eq!(formula, Some(FormulaKind::Ratio));
                assert_eq!(bands, vec!["B8", "B4"]);
                assert_eq!(pixels.len(), 2);
            }
            _ => panic!("expected probe"),
        }
    }
}
