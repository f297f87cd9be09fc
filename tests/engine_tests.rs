// tests/engine_tests.rs
use std::collections::BTreeSet;

use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use heritage_calc::analysis::{AnalysisOutcome, Analyzer, NO_IMAGES_MESSAGE};
use heritage_calc::backend::{DeferredBackend, ImageryBackend, InMemoryBackend};
use heritage_calc::catalog::IndexDefinition;
use heritage_calc::collection::{compose_median, SceneArchive};
use heritage_calc::config::{AnalysisConfig, Region};
use heritage_calc::error::EngineError;
use heritage_calc::geometry::Geometry;
use heritage_calc::processing::change::change_bands;
use heritage_calc::processing::expression::MAX_DEPTH;
use heritage_calc::processing::{detect_changes, reduce, IndexCompositor};
use heritage_calc::raster::{Band, GeoTransform, Grid, Image, Raster};

/// 2 x 2 pixels of 10 m with the upper left corner at (0, 20)
fn small_grid() -> Grid {
    Grid::new(2, 2, GeoTransform::new(0.0, 20.0, 10.0, -10.0))
}

fn small_region() -> Geometry {
    Geometry::polygon(vec![(0.0, 0.0), (20.0, 0.0), (20.0, 20.0), (0.0, 20.0)]).unwrap()
}

fn uniform_image() -> Image {
    let grid = small_grid();
    Image::new("uniform", grid)
        .with_raster("B8", Raster::new(grid, vec![5000.0; 4]).unwrap())
        .unwrap()
        .with_raster("B4", Raster::new(grid, vec![1000.0; 4]).unwrap())
        .unwrap()
}

/// 4 x 4 pixels of 10 m centred on the Mercator origin
fn site_grid() -> Grid {
    Grid::new(4, 4, GeoTransform::new(-20.0, 20.0, 10.0, -10.0))
}

fn scene(id: &str, date: (i32, u32, u32), cloud: f64, nir: f64, red: f64) -> Image {
    let grid = site_grid();
    Image::new(id, grid)
        .with_acquired(Utc.with_ymd_and_hms(date.0, date.1, date.2, 10, 0, 0).unwrap())
        .with_cloud_percent(cloud)
        .with_raster("B8", Raster::filled(grid, nir))
        .unwrap()
        .with_raster("B4", Raster::filled(grid, red))
        .unwrap()
}

/// `scene` over a 4 x 4 grid whose upper left corner is at (`x`, `y`)
fn scene_at(id: &str, date: (i32, u32, u32), x: f64, y: f64, nir: f64) -> Image {
    let grid = Grid::new(4, 4, GeoTransform::new(x, y, 10.0, -10.0));
    Image::new(id, grid)
        .with_acquired(Utc.with_ymd_and_hms(date.0, date.1, date.2, 10, 0, 0).unwrap())
        .with_cloud_percent(0.0)
        .with_raster("B8", Raster::filled(grid, nir))
        .unwrap()
        .with_raster("B4", Raster::filled(grid, 1000.0))
        .unwrap()
}

fn archive() -> SceneArchive {
    SceneArchive::new(vec![
        scene("late", (2024, 5, 1), 10.0, 4000.0, 2000.0),
        scene("cloudy", (2024, 4, 1), 50.0, 100.0, 100.0),
        scene("early", (2024, 3, 1), 5.0, 5000.0, 1000.0),
    ])
}

fn site_config() -> AnalysisConfig {
    // 10 m buffer around (0, 0)
    let region = Region::Point {
        latitude: 0.0,
        longitude: 0.0,
        buffer_km: 0.01,
    };
    AnalysisConfig::new(
        "Test Site",
        region,
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
    )
}

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value should be present");
    assert!((actual - expected).abs() < 1e-4, "Expected {}, got {}", expected, actual);
}

#[test]
fn test_ndvi_end_to_end() {
    let composed = IndexCompositor::default().compose(&uniform_image(), &[]);
    let stats = reduce(&InMemoryBackend, &composed, "NDVI", &small_region()).unwrap();

    assert_close(stats.get("NDVI_mean"), 0.6667);
    assert_close(stats.get("NDVI_stdDev"), 0.0);
    assert_close(stats.get("NDVI_min"), 0.6667);
    assert_close(stats.get("NDVI_max"), 0.6667);

    let raster = InMemoryBackend.materialize(&composed, "NDVI").unwrap();
    assert!(raster.data().iter().all(|v| (v - 4000.0 / 6000.0).abs() < 1e-12));
}

#[test]
fn test_expression_end_to_end() {
    let custom = IndexDefinition::expression(
        "CUSTOM",
        "(NIR-RED)/(NIR+RED+0.5)*1.5",
        [("NIR", "B8"), ("RED", "B4")],
    );
    let composed = IndexCompositor::default().compose(&uniform_image(), &[custom]);
    let stats = reduce(&InMemoryBackend, &composed, "CUSTOM", &small_region()).unwrap();
    assert_close(stats.get("CUSTOM_mean"), 4000.0 / 6000.5 * 1.5);
    assert_close(stats.get("CUSTOM_stdDev"), 0.0);
}

#[test]
fn test_truncated_image_skips_only_affected_indices() {
    // no B11, so NDBI, NDMI, MNDWI, BSI and IBI cannot be computed
    let composition = IndexCompositor::default().compose_with_report(&uniform_image(), &[]);
    let image = &composition.image;

    assert!(image.has_band("NDVI"));
    assert!(image.has_band("SAVI"));
    assert!(!image.has_band("NDBI"));
    assert!(image.has_band("B8") && image.has_band("B4"));

    let failed: Vec<&str> = composition.failures().map(|e| e.index()).collect();
    assert!(failed.contains(&"NDBI"));
    assert!(!failed.contains(&"NDVI"));
    assert!(composition.failures().all(|e| e.kind() == "unavailable_band"));
    assert_eq!(
        composition.outcomes.len(),
        heritage_calc::catalog::IndexCatalog::builtin().len()
    );
}

#[test]
fn test_unbound_variable_fails_single_index() {
    let broken = IndexDefinition::expression("BROKEN", "NIR / SWIR", [("NIR", "B8")]);
    let good = IndexDefinition::normalized_difference("GOOD", "B4", "B8");
    let composition =
        IndexCompositor::default().compose_with_report(&uniform_image(), &[broken, good]);

    assert!(!composition.image.has_band("BROKEN"));
    assert!(composition.image.has_band("GOOD"));
    assert!(composition.image.has_band("NDVI"));
    let broken = composition
        .failures()
        .find(|e| e.index() == "BROKEN")
        .unwrap();
    assert_eq!(broken.kind(), "malformed_expression");
}

#[test]
fn test_compose_is_idempotent() {
    let compositor = IndexCompositor::default();
    let image = uniform_image();
    let first = compositor.compose(&image, &[]);
    let second = compositor.compose(&image, &[]);

    assert_eq!(first.band_names(), second.band_names());
    for name in first.band_names() {
        let a = InMemoryBackend.materialize(&first, name).unwrap();
        let b = InMemoryBackend.materialize(&second, name).unwrap();
        let bits = |r: &Raster| r.data().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b), "band {name} differs");
    }
}

#[test]
fn test_undefined_pixels_give_absent_statistics() {
    let grid = small_grid();
    let dark = Image::new("dark", grid)
        .with_raster("B8", Raster::filled(grid, 0.0))
        .unwrap()
        .with_raster("B4", Raster::filled(grid, 0.0))
        .unwrap();
    let composed = IndexCompositor::default().compose(&dark, &[]);
    let stats = reduce(&InMemoryBackend, &composed, "NDVI", &small_region()).unwrap();

    for metric in ["mean", "stdDev", "min", "max"] {
        let key = format!("NDVI_{metric}");
        assert!(stats.contains_key(&key));
        assert_eq!(stats.get(&key), None, "{key} should be absent, not zero");
    }
}

#[test]
fn test_region_outside_footprint_is_degenerate() {
    let far = Geometry::circle(10_000.0, 10_000.0, 50.0).unwrap();
    let composed = IndexCompositor::default().compose(&uniform_image(), &[]);
    let stats = reduce(&InMemoryBackend, &composed, "NDVI", &far).unwrap();
    assert_eq!(stats.len(), 4);
    assert!(stats.iter().all(|(_, v)| v.is_none()));
}

#[test]
fn test_deferred_backend_matches_in_memory() {
    let composed = IndexCompositor::default().compose(&scene("s", (2024, 1, 1), 0.0, 4200.0, 900.0), &[]);
    let geometry = site_config().geometry().unwrap();
    let backend = DeferredBackend::new(Some(2));

    for index in ["NDVI", "EVI", "SAVI"] {
        let local = reduce(&InMemoryBackend, &composed, index, &geometry).unwrap();
        let remote = reduce(&backend, &composed, index, &geometry).unwrap();
        assert_eq!(local, remote, "{index}");
    }

    backend.shutdown();
    let err = reduce(&backend, &composed, "NDVI", &geometry).unwrap_err();
    assert!(matches!(err, EngineError::BackendUnavailable { .. }));
}

#[test]
fn test_snapshot_analysis() {
    let archive = archive();
    let analyzer = Analyzer::new(&InMemoryBackend, &archive);
    let config = site_config();

    let report = analyzer.snapshot(&config).unwrap().completed().unwrap();
    // the cloudy scene is filtered out; median of (5000, 4000) / (1000, 2000)
    assert_eq!(report.scene_count, 2);
    assert_eq!(report.first_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    assert_eq!(report.last_date, NaiveDate::from_ymd_opt(2024, 5, 1));
    assert_close(report.statistics.get("NDVI_mean"), 3000.0 / 6000.0);
    assert_close(report.statistics.get("NDVI_stdDev"), 0.0);
    assert_eq!(report.cache_key, config.cache_key());

    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.name.as_str()).collect();
    assert!(skipped.contains(&"NDBI"));
    assert!(!report.statistics.contains_key("NDBI_mean"));
}

#[test]
fn test_unknown_selected_index_is_reported() {
    let archive = archive();
    let mut config = site_config();
    config.indices = vec!["NDVI".into(), "NOPE".into()];

    let report = Analyzer::new(&InMemoryBackend, &archive)
        .snapshot(&config)
        .unwrap()
        .completed()
        .unwrap();
    let nope = report.skipped.iter().find(|s| s.name == "NOPE").unwrap();
    assert_eq!(nope.kind, "unknown_index");
}

#[test]
fn test_empty_collection_reports_no_images() {
    let archive = archive();
    let mut config = site_config();
    config.cloud_cover = 0.0;

    let analyzer = Analyzer::new(&InMemoryBackend, &archive);
    let (_, collection) = analyzer.query(&config).unwrap();
    assert!(collection.is_empty());

    let outcome = analyzer.snapshot(&config).unwrap();
    assert_eq!(outcome, AnalysisOutcome::NoImages);
    assert_eq!(outcome.message().as_deref(), Some(NO_IMAGES_MESSAGE));
    assert!(collection.compose_median(&InMemoryBackend).is_err());
}

#[test]
fn test_change_analysis() {
    let archive = archive();
    let analyzer = Analyzer::new(&InMemoryBackend, &archive);
    let detection = analyzer
        .change(&site_config(), "NDVI")
        .unwrap()
        .completed()
        .unwrap();

    let report = &detection.report;
    assert_close(report.mean_delta, 2000.0 / 6000.0 - 4000.0 / 6000.0);
    assert!(report.decrease_pixels > 0);
    assert_eq!(report.increase_pixels, 0);
    assert_eq!(report.before_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    assert!(detection.image.has_band("NDVI_diff"));
    assert!(detection.image.has_band("NDVI_decrease"));
}

#[test]
fn test_change_needs_two_scenes() {
    let archive = archive();
    let mut config = site_config();
    config.end_date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();

    let outcome = Analyzer::new(&InMemoryBackend, &archive)
        .change(&config, "NDVI")
        .unwrap();
    assert!(matches!(
        outcome,
        AnalysisOutcome::InsufficientImages { found: 1, required: 2 }
    ));
}

#[test]
fn test_temporal_series() {
    let archive = archive();
    let analyzer = Analyzer::new(&InMemoryBackend, &archive);
    let config = site_config();

    let report = analyzer.temporal(&config, "NDVI", None).unwrap().completed().unwrap();
    let dates: Vec<NaiveDate> = report.points.iter().map(|p| p.date).collect();
    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        ]
    );
    assert_close(report.points[0].value, 4000.0 / 6000.0);
    assert_close(report.points[1].value, 2000.0 / 6000.0);

    let known: BTreeSet<NaiveDate> = dates[..1].iter().copied().collect();
    let report = analyzer
        .temporal(&config, "NDVI", Some(&known))
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(report.points.len(), 1);
    assert_eq!(report.points[0].date, dates[1]);
}

#[test]
fn test_temporal_series_of_missing_index() {
    let archive = archive();
    let report = Analyzer::new(&InMemoryBackend, &archive)
        .temporal(&site_config(), "NDBI", None)
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(report.points.len(), 2);
    assert!(report.points.iter().all(|p| p.value.is_none()));
}

#[test]
fn test_median_rejects_scenes_at_different_locations() {
    let here = scene_at("here", (2024, 3, 1), -20.0, 20.0, 1000.0);
    let there = scene_at("there", (2024, 4, 1), 980.0, 20.0, 3000.0);
    assert_eq!(here.grid().shape(), there.grid().shape());

    let err = compose_median(&InMemoryBackend, &[here.clone(), there]).unwrap_err();
    assert!(matches!(err, EngineError::GridMismatch { .. }));

    let again = scene_at("again", (2024, 4, 1), -20.0, 20.0, 3000.0);
    let median = compose_median(&InMemoryBackend, &[here, again]).unwrap();
    let b8 = InMemoryBackend.materialize(&median, "B8").unwrap();
    assert!(b8.data().iter().all(|v| *v == 2000.0));
}

#[test]
fn test_change_rejects_scenes_at_different_locations() {
    let compositor = IndexCompositor::default();
    let before = compositor.compose(&scene_at("before", (2024, 3, 1), -20.0, 20.0, 5000.0), &[]);
    let after = compositor.compose(&scene_at("after", (2024, 5, 1), 980.0, 20.0, 2000.0), &[]);

    assert!(matches!(
        change_bands(&before, &after, "NDVI", 0.1),
        Err(EngineError::GridMismatch { .. })
    ));
    let geometry = site_config().geometry().unwrap();
    let err = detect_changes(&InMemoryBackend, &before, &after, "NDVI", &geometry, 0.1).unwrap_err();
    assert!(matches!(err, EngineError::GridMismatch { .. }));
}

#[test]
fn test_add_band_rejects_other_georeferencing() {
    let mut image = uniform_image();
    let elsewhere = Grid::new(2, 2, GeoTransform::new(5000.0, 9000.0, 10.0, -10.0));
    let err = image
        .add_band(Band::from_raster("B3", Raster::filled(elsewhere, 1.0)))
        .unwrap_err();
    assert!(matches!(err, EngineError::GridMismatch { .. }));
    assert!(!image.has_band("B3"));

    image
        .add_band(Band::from_raster("B3", Raster::filled(small_grid(), 1.0)))
        .unwrap();
    assert!(image.has_band("B3"));
}

#[test]
fn test_deeply_nested_formula_fails_single_index() {
    let deep = format!("{}B8{}", "(".repeat(1000), ")".repeat(1000));
    let long = vec!["B8"; 20_000].join(" - ");
    let negated = format!("{}B8", "-".repeat(5000));
    let custom = [
        IndexDefinition::expression("DEEP", &deep, [("B8", "B8")]),
        IndexDefinition::expression("LONG", &long, [("B8", "B8")]),
        IndexDefinition::expression("NEGATED", &negated, [("B8", "B8")]),
        IndexDefinition::expression(
            "NESTED_OK",
            &format!("{}B8{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH)),
            [("B8", "B8")],
        ),
    ];
    let composition = IndexCompositor::default().compose_with_report(&uniform_image(), &custom);

    for name in ["DEEP", "LONG", "NEGATED"] {
        assert!(!composition.image.has_band(name));
        let failure = composition.failures().find(|e| e.index() == name).unwrap();
        assert_eq!(failure.kind(), "malformed_expression");
    }
    assert!(composition.image.has_band("NDVI"));
    let stats = reduce(&InMemoryBackend, &composition.image, "NESTED_OK", &small_region()).unwrap();
    assert_close(stats.get("NESTED_OK_mean"), 5000.0);
}

#[test]
fn test_query_date_and_cloud_boundaries() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
    let at = |id: &str, (y, m, d): (i32, u32, u32), hour: u32, cloud: f64| {
        Image::new(id, site_grid())
            .with_acquired(Utc.with_ymd_and_hms(y, m, d, hour, 0, 0).unwrap())
            .with_cloud_percent(cloud)
    };
    let archive = SceneArchive::new(vec![
        at("on_end", (2024, 6, 30), 23, 5.0),
        at("on_start", (2024, 1, 1), 0, 5.0),
        at("before_start", (2023, 12, 31), 23, 5.0),
        at("after_end", (2024, 7, 1), 0, 5.0),
        at("at_ceiling", (2024, 3, 1), 10, 20.0),
        at("below_ceiling", (2024, 3, 2), 10, 19.99),
    ]);
    let geometry = Geometry::circle(0.0, 0.0, 5.0).unwrap();

    let collection = archive.query(&geometry, start, end, 20.0);
    let ids: Vec<&str> = collection.iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec!["on_start", "below_ceiling", "on_end"]);
}

#[test]
fn test_query_excludes_scenes_outside_region() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
    let archive = SceneArchive::new(vec![
        scene_at("inside", (2024, 3, 1), -20.0, 20.0, 1.0),
        scene_at("far", (2024, 3, 2), 100_000.0, 20.0, 1.0),
        // footprint starts 10 m east of the origin, inside the 15 m circle
        scene_at("edge", (2024, 3, 3), 10.0, 20.0, 1.0),
        scene_at("near_miss", (2024, 3, 4), 16.0, 20.0, 1.0),
    ]);
    let geometry = Geometry::circle(0.0, 0.0, 15.0).unwrap();

    let collection = archive.query(&geometry, start, end, 100.0);
    let ids: Vec<&str> = collection.iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec!["inside", "edge"]);
}

#[test]
fn test_temporal_refresh_reaches_unsampled_scenes() {
    let archive = archive();
    let analyzer = Analyzer::new(&InMemoryBackend, &archive);
    let mut config = site_config();
    config.sample_size = 1;

    let first = analyzer.temporal(&config, "NDVI", None).unwrap().completed().unwrap();
    assert_eq!(first.points.len(), 1);
    assert_eq!(first.points[0].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

    let known: BTreeSet<NaiveDate> = first.points.iter().map(|p| p.date).collect();
    let second = analyzer
        .temporal(&config, "NDVI", Some(&known))
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(second.points.len(), 1);
    assert_eq!(second.points[0].date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    assert_close(second.points[0].value, 2000.0 / 6000.0);

    let known: BTreeSet<NaiveDate> = known.into_iter().chain([second.points[0].date]).collect();
    let third = analyzer
        .temporal(&config, "NDVI", Some(&known))
        .unwrap()
        .completed()
        .unwrap();
    assert!(third.points.is_empty());
}

proptest! {
    #[test]
    fn prop_reduce_is_deterministic(
        values in prop::collection::vec(prop_oneof![-1.0e4..1.0e4f64, Just(f64::NAN)], 16),
        radius in 1.0..40.0f64,
    ) {
        let grid = site_grid();
        let image = Image::new("p", grid)
            .with_raster("X", Raster::new(grid, values).unwrap())
            .unwrap();
        let geometry = Geometry::circle(0.0, 0.0, radius).unwrap();

        let a = reduce(&InMemoryBackend, &image, "X", &geometry).unwrap();
        let b = reduce(&InMemoryBackend, &image, "X", &geometry).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_query_is_ordered_and_filtered(
        scenes in prop::collection::vec((0i64..365, 0.0..100.0f64, any::<bool>()), 0..20),
        max_cloud in 0.0..100.0f64,
    ) {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let far_grid = Grid::new(4, 4, GeoTransform::new(100_000.0, 20.0, 10.0, -10.0));
        let archive = SceneArchive::new(
            scenes
                .iter()
                .enumerate()
                .map(|(i, (day, cloud, far))| {
                    let date = start + chrono::Duration::days(*day);
                    let grid = if *far { far_grid } else { site_grid() };
                    Image::new(format!("s{i}"), grid)
                        .with_acquired(date.and_hms_opt(10, 0, 0).unwrap().and_utc())
                        .with_cloud_percent(*cloud)
                })
                .collect(),
        );
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let geometry = Geometry::circle(0.0, 0.0, 5.0).unwrap();
        let collection = archive.query(&geometry, start, end, max_cloud);

        for pair in collection.images().windows(2) {
            prop_assert!(pair[0].acquired() <= pair[1].acquired());
        }
        for image in &collection {
            prop_assert!(image.cloud_percent().unwrap() < max_cloud);
            let date = image.acquired_date().unwrap();
            prop_assert!(start <= date && date <= end);
            prop_assert!(geometry.intersects_rect(&image.footprint()));
        }

        let mut expected: Vec<String> = scenes
            .iter()
            .enumerate()
            .filter(|(_, (day, cloud, far))| {
                let date = start + chrono::Duration::days(*day);
                !*far && date <= end && *cloud < max_cloud
            })
            .map(|(i, _)| format!("s{i}"))
            .collect();
        let mut found: Vec<String> = collection.iter().map(|s| s.id().to_string()).collect();
        expected.sort();
        found.sort();
        prop_assert_eq!(found, expected);
    }
}
