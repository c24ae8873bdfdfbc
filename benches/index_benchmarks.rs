use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use mapscout::index::{AreaAreaIndex, AreaAreaIndexGenerator, AreaIndex, AreaIndexGenerator};
use mapscout::progress::SilentProgress;
use mapscout::water::{Coast, CoastPoint, merge_coastlines};
use mapscout::{AreaIndexConfig, CoastState, GeoBox, GeoCoord, TypeInfoSet};
use tempfile::TempDir;

fn object_box(i: u64) -> GeoBox {
    let lat = 45.0 + (i % 100) as f64 * 0.05;
    let lon = 5.0 + (i / 100) as f64 * 0.05;
    GeoBox::from_bounds(lat, lon, lat + 0.01 + (i % 7) as f64 * 0.01, lon + 0.02)
}

fn benchmark_area_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("area_index");
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("areaway.idx");

    let mut generator = AreaIndexGenerator::new(AreaIndexConfig::default());
    for i in 0..10_000u64 {
        generator.add((i % 4) as u16 + 1, object_box(i), i * 64).unwrap();
    }
    generator.write(&mut SilentProgress, &path).unwrap();
    let index = AreaIndex::open(&path, true).unwrap();
    let types: TypeInfoSet = [1, 2, 3, 4].into_iter().collect();

    for size in [0.1, 0.5, 2.0] {
        let query = GeoBox::from_bounds(47.0, 7.0, 47.0 + size, 7.0 + size);
        group.bench_with_input(BenchmarkId::new("get_offsets", size), &query, |b, query| {
            b.iter(|| index.get_offsets(black_box(query), &types).unwrap())
        });
    }

    group.finish();
}

fn benchmark_area_area_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("area_area_index");
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("areaarea.idx");

    let mut generator = AreaAreaIndexGenerator::new(14).unwrap();
    for i in 0..10_000u64 {
        generator.add((i % 4) as u16 + 1, object_box(i), i * 64).unwrap();
    }
    generator.write(&mut SilentProgress, &path).unwrap();
    let index = AreaAreaIndex::load(&path, true).unwrap();
    let types: TypeInfoSet = [1, 2].into_iter().collect();

    for level in [6, 10, 14] {
        let query = GeoBox::from_bounds(47.0, 7.0, 48.0, 8.0);
        group.bench_with_input(BenchmarkId::new("get_offsets", level), &level, |b, &level| {
            b.iter(|| {
                index
                    .get_offsets(black_box(&query), level, &types, usize::MAX)
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn benchmark_merge_coastlines(c: &mut Criterion) {
    // One long coastline cut into two-point segments, shuffled by stride.
    let count = 5_000u64;
    let segments: Vec<Coast> = (0..count)
        .map(|n| (n * 7919) % count)
        .map(|n| {
            let from = CoastPoint::new(n + 1, GeoCoord::new(0.0, n as f64 * 0.001));
            let to = CoastPoint::new(n + 2, GeoCoord::new(0.0, (n + 1) as f64 * 0.001));
            Coast::from_points(n, vec![from, to], CoastState::Land, CoastState::Water)
        })
        .collect();

    c.bench_function("merge_coastlines", |b| {
        b.iter(|| merge_coastlines(&mut SilentProgress, black_box(segments.clone())))
    });
}

criterion_group!(
    benches,
    benchmark_area_index,
    benchmark_area_area_index,
    benchmark_merge_coastlines
);
criterion_main!(benches);
