use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tempfile::TempDir;

use taxitrace::rtree::{RTreeBuilder, RTreeIndex};
use taxitrace_types::{BoundingBox2D, TemporalBoundingBox};

/// A synthetic day of positions on a city-sized grid.
fn build_fixture(points: usize, fanout: usize) -> (TempDir, RTreeIndex) {
    let dir = TempDir::new().unwrap();
    let basename = dir.path().join("bench_rtree");
    let mut builder = RTreeBuilder::create(&basename, fanout).unwrap();
    for i in 0..points {
        let lon = 116.0 + (i % 1000) as f64 * 0.0008;
        let lat = 39.6 + ((i / 1000) % 1000) as f64 * 0.0006;
        let t = (i % 86_400) as f64;
        builder.insert_point(lon, lat, t, (i % 512) as u64).unwrap();
    }
    builder.finish().unwrap();
    let index = RTreeIndex::open(&basename).unwrap();
    (dir, index)
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("rtree_build");
    group.sample_size(10);

    group.bench_function("bulk_build_50k", |b| {
        b.iter(|| {
            let (_dir, index) = build_fixture(black_box(50_000), 10);
            index.entry_count()
        })
    });

    group.finish();
}

fn benchmark_intersect(c: &mut Criterion) {
    let mut group = c.benchmark_group("rtree_intersect");
    let (_dir, index) = build_fixture(200_000, 10);

    let narrow = TemporalBoundingBox::new(
        BoundingBox2D::new(116.30, 39.70, 116.35, 39.75),
        1000.0,
        5000.0,
    );
    group.bench_function("narrow_box", |b| {
        b.iter(|| {
            index
                .intersect(black_box(&narrow))
                .unwrap()
                .map(|hit| hit.unwrap().payload)
                .count()
        })
    });

    let wide = TemporalBoundingBox::new(
        BoundingBox2D::new(116.0, 39.6, 116.8, 40.2),
        0.0,
        86_400.0,
    );
    group.bench_function("full_extent", |b| {
        b.iter(|| {
            index
                .intersect(black_box(&wide))
                .unwrap()
                .map(|hit| hit.unwrap().payload)
                .count()
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_build, benchmark_intersect);
criterion_main!(benches);
