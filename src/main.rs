// src/main.rs
use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use heritage_calc::analysis::{AnalysisOutcome, Analyzer, SnapshotReport};
use heritage_calc::backend::DeferredBackend;
use heritage_calc::batch::{load_batch, run_batch};
use heritage_calc::catalog::{Category, IndexCatalog, IndexDefinition, NAMED_PALETTES, SENTINEL2_BANDS};
use heritage_calc::cli::{Cli, Commands};
use heritage_calc::collection::SceneArchive;
use heritage_calc::config::{AnalysisConfig, SITE_PRESETS};
use heritage_calc::io::SceneManifest;
use heritage_calc::processing::{evaluate, PixelSample};
use heritage_calc::utils::ResultCache;
use heritage_calc::VERSION;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

/// Result JSON, or `{"message": ...}` when there was nothing to analyze.
fn outcome_json<T: Serialize>(outcome: AnalysisOutcome<T>) -> Result<serde_json::Value> {
    match outcome.message() {
        Some(message) => Ok(json!({ "message": message })),
        None => Ok(serde_json::to_value(outcome.completed())?),
    }
}

fn load_inputs(config: &Path, archive: &Path) -> Result<(AnalysisConfig, SceneArchive)> {
    let config = AnalysisConfig::load(config)
        .with_context(|| format!("loading analysis config {}", config.display()))?;
    let archive = SceneManifest::load(archive)
        .with_context(|| format!("loading scene archive {}", archive.display()))?;
    Ok((config, archive))
}

fn load_archive(archive: &Path) -> Result<SceneArchive> {
    SceneManifest::load(archive).with_context(|| format!("loading scene archive {}", archive.display()))
}

fn probe_definition(
    index: Option<String>,
    formula: Option<heritage_calc::catalog::FormulaKind>,
    bands: Vec<String>,
    expression: Option<String>,
    variables: Vec<(String, String)>,
) -> Result<IndexDefinition> {
    if let Some(name) = index {
        return IndexCatalog::builtin()
            .lookup(&name)
            .cloned()
            .ok_or_else(|| anyhow!("index {name} is not in the catalog"));
    }
    if let Some(formula) = formula {
        let bands: Vec<&str> = bands.iter().map(String::as_str).collect();
        return Ok(IndexDefinition::new("probe", formula, &bands));
    }
    if let Some(expression) = expression {
        return Ok(IndexDefinition::expression("probe", &expression, variables));
    }
    Err(anyhow!("one of --index, --formula or --expression is required"))
}

#[cfg(feature = "gdal")]
struct ExportRequest {
    scene: String,
    index: String,
    output: std::path::PathBuf,
    fixed_point: bool,
    scale_factor: i32,
    compress: String,
    compress_level: u8,
    tiled: bool,
}

#[cfg(feature = "gdal")]
fn export(archive: &SceneArchive, request: &ExportRequest, threads: Option<usize>) -> Result<()> {
    use heritage_calc::backend::ImageryBackend;
    use heritage_calc::geometry::MAP_CRS;
    use heritage_calc::io::{projection_wkt, write_raster, WriteOptions};
    use heritage_calc::processing::IndexCompositor;

    let image = archive
        .scene(&request.scene)
        .ok_or_else(|| anyhow!("scene {} is not in the archive", request.scene))?;
    let composed = IndexCompositor::default().compose(image, &[]);
    let backend = DeferredBackend::new(threads);
    let raster = backend.materialize(&composed, &request.index)?;
    backend.shutdown();

    let options = WriteOptions {
        fixed_point: request.fixed_point,
        scale_factor: request.scale_factor,
        compress: request.compress.clone(),
        compress_level: request.compress_level,
        tiled: request.tiled,
    };
    let wkt = projection_wkt(MAP_CRS)?;
    write_raster(&raster, &request.index, Some(&wkt), &request.output, &options)?;
    info!("Processing complete: {}", request.output.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let pretty = cli.pretty;

    match cli.command {
        Commands::Catalog { category } => {
            let catalog = IndexCatalog::builtin();
            let definitions: Vec<&IndexDefinition> = match category {
                Some(name) => catalog.by_category(name.parse::<Category>()?),
                None => catalog.all().iter().collect(),
            };
            print_json(&definitions, pretty)?;
        }
        Commands::Bands => {
            let palettes: serde_json::Map<String, serde_json::Value> = NAMED_PALETTES
                .iter()
                .map(|(name, colours)| (name.to_string(), json!(colours)))
                .collect();
            print_json(
                &json!({
                    "version": VERSION,
                    "bands": SENTINEL2_BANDS,
                    "palettes": palettes,
                    "sites": SITE_PRESETS,
                }),
                pretty,
            )?;
        }
        Commands::Probe {
            index,
            formula,
            bands,
            expression,
            variables,
            pixels,
        } => {
            let definition = probe_definition(index, formula, bands, expression, variables)?;
            let pixel: PixelSample = pixels.into_iter().collect();
            let value = evaluate(&pixel, &definition)?;
            // NaN serializes as null
            print_json(&json!({ "index": definition.name, "value": value }), pretty)?;
        }
        Commands::Analyze {
            config,
            archive,
            cache_dir,
        } => {
            let (config, archive) = load_inputs(&config, &archive)?;
            let backend = DeferredBackend::new(cli.threads);
            let analyzer = Analyzer::new(&backend, &archive);
            let cache: ResultCache<SnapshotReport> = match cache_dir {
                Some(dir) => ResultCache::with_dir(dir)?,
                None => ResultCache::new(),
            };

            let key = config.cache_key();
            let output = match cache.get(&key) {
                Some(report) => {
                    info!(key = %key, "using cached snapshot");
                    serde_json::to_value(report)?
                }
                None => match analyzer.snapshot(&config)? {
                    AnalysisOutcome::Completed(report) => {
                        cache.insert(&key, report.clone())?;
                        serde_json::to_value(report)?
                    }
                    other => outcome_json(other)?,
                },
            };
            backend.shutdown();
            print_json(&output, pretty)?;
        }
        Commands::Change {
            config,
            archive,
            index,
            threshold,
        } => {
            let (mut config, archive) = load_inputs(&config, &archive)?;
            if let Some(threshold) = threshold {
                config.change_threshold = threshold;
            }
            let backend = DeferredBackend::new(cli.threads);
            let outcome = Analyzer::new(&backend, &archive)
                .change(&config, &index)?
                .map(|detection| detection.report);
            backend.shutdown();
            print_json(&outcome_json(outcome)?, pretty)?;
        }
        Commands::Timeseries {
            config,
            archive,
            index,
            known,
        } => {
            let (config, archive) = load_inputs(&config, &archive)?;
            let known: BTreeSet<_> = known.into_iter().collect();
            let backend = DeferredBackend::new(cli.threads);
            let outcome = Analyzer::new(&backend, &archive).temporal(
                &config,
                &index,
                (!known.is_empty()).then_some(&known),
            )?;
            backend.shutdown();
            print_json(&outcome_json(outcome)?, pretty)?;
        }
        Commands::Batch { config, archive } => {
            let batch = load_batch(&config)?;
            let archive = load_archive(&archive)?;
            let backend = DeferredBackend::new(cli.threads);
            let results = run_batch(&batch, &Analyzer::new(&backend, &archive))?;
            backend.shutdown();
            print_json(&results, pretty)?;
        }
        Commands::Export {
            archive,
            scene,
            index,
            output,
            float,
            scale_factor,
            compress,
            compress_level,
            no_tiled,
        } => {
            #[cfg(feature = "gdal")]
            {
                let request = ExportRequest {
                    scene,
                    index,
                    output,
                    fixed_point: !float,
                    scale_factor,
                    compress,
                    compress_level,
                    tiled: !no_tiled,
                };
                export(&load_archive(&archive)?, &request, cli.threads)?;
            }
            #[cfg(not(feature = "gdal"))]
            {
                let _ = (archive, scene, index, float, scale_factor, compress, compress_level, no_tiled);
                anyhow::bail!(
                    "cannot write {}: built without the gdal feature",
                    output.display()
                );
            }
        }
    }

    Ok(())
}
