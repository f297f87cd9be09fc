use criterion::{black_box, criterion_group, criterion_main, Criterion};
use heritage_calc::backend::{DeferredBackend, ImageryBackend, InMemoryBackend};
use heritage_calc::geometry::Geometry;
use heritage_calc::processing::{reduce, IndexCompositor};
use heritage_calc::raster::{GeoTransform, Grid, Image, Raster};

const SIZE: usize = 1024;

/// Synthetic NIR/RED/BLUE/SWIR scene of SIZE x SIZE 10 m pixels
fn synthetic_scene() -> Image {
    let grid = Grid::new(SIZE, SIZE, GeoTransform::new(0.0, SIZE as f64 * 10.0, 10.0, -10.0));
    let band = |base: f64, period: usize| {
        let data = (0..grid.len()).map(|i| base + (i % period) as f64).collect();
        Raster::new(grid, data).unwrap()
    };

    Image::new("bench", grid)
        .with_raster("B8", band(5000.0, 100))
        .unwrap()
        .with_raster("B4", band(2500.0, 50))
        .unwrap()
        .with_raster("B2", band(1500.0, 30))
        .unwrap()
        .with_raster("B11", band(3000.0, 70))
        .unwrap()
}

/// Benchmark building every catalog band (deferred, no pixels touched)
fn benchmark_compose(c: &mut Criterion) {
    let image = synthetic_scene();
    let compositor = IndexCompositor::default();

    c.bench_function("compose_catalog", |b| {
        b.iter(|| compositor.compose(black_box(&image), &[]))
    });
}

/// Benchmark computing every pixel of NDVI and EVI
fn benchmark_materialize(c: &mut Criterion) {
    let composed = IndexCompositor::default().compose(&synthetic_scene(), &[]);
    let backend = InMemoryBackend;

    c.bench_function("materialize_ndvi", |b| {
        b.iter(|| backend.materialize(black_box(&composed), "NDVI").unwrap())
    });
    c.bench_function("materialize_evi", |b| {
        b.iter(|| backend.materialize(black_box(&composed), "EVI").unwrap())
    });
}

/// Benchmark region statistics in-process and through the worker pool
fn benchmark_reduce(c: &mut Criterion) {
    let composed = IndexCompositor::default().compose(&synthetic_scene(), &[]);
    let centre = SIZE as f64 * 5.0;
    let geometry = Geometry::circle(centre, centre, centre * 0.8).unwrap();

    c.bench_function("reduce_ndvi_in_memory", |b| {
        b.iter(|| reduce(&InMemoryBackend, black_box(&composed), "NDVI", &geometry).unwrap())
    });

    let deferred = DeferredBackend::new(None);
    c.bench_function("reduce_ndvi_deferred", |b| {
        b.iter(|| reduce(&deferred, black_box(&composed), "NDVI", &geometry).unwrap())
    });
    deferred.shutdown();
}

criterion_group!(benches, benchmark_compose, benchmark_materialize, benchmark_reduce);
criterion_main!(benches);
