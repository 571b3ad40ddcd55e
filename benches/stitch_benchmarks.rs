//! Benchmarks for the heavy stitching stages
//!
//! Feature extraction, pairwise matching, multi-band blending and hole
//! filling on synthetic inputs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cv_core::{Rect, SignedImage};
use cv_features::{find_features, BestOf2NearestMatcher, FeatureConfig, MatcherConfig};
use cv_photo::{fill_holes, CanvasConfig, MultiBandBlender};
use image::{GrayImage, Luma, Rgb, RgbImage};
use std::time::Duration;

/// Blocky texture with plenty of corners, shifted by `dx` pixels.
fn create_textured(width: u32, height: u32, dx: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let (cx, cy) = ((x + dx) / 8, y / 8);
        let h = (cx.wrapping_mul(73_856_093) ^ cy.wrapping_mul(19_349_663)) % 251;
        Rgb([h as u8, (h * 3 % 251) as u8, (h * 7 % 251) as u8])
    })
}

fn benchmark_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_features");
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(10);

    for size in [320u32, 640, 1024] {
        let images = vec![create_textured(size, size * 3 / 4, 0)];
        group.bench_with_input(BenchmarkId::new("orb", size), &images, |b, imgs| {
            b.iter(|| find_features(black_box(imgs), &FeatureConfig::default()));
        });
    }
    group.finish();
}

fn benchmark_matching(c: &mut Criterion) {
    let images: Vec<RgbImage> = (0..4).map(|i| create_textured(640, 480, i * 120)).collect();
    let features = match find_features(&images, &FeatureConfig::default()) {
        Ok(f) => f.features,
        Err(_) => return,
    };
    c.bench_function("match_all_4_images", |b| {
        b.iter(|| {
            let mut matcher = BestOf2NearestMatcher::new(MatcherConfig::default());
            let table = matcher.match_all(black_box(&features));
            matcher.collect_garbage();
            table
        });
    });
}

fn benchmark_blend(c: &mut Criterion) {
    let mut group = c.benchmark_group("multiband_blend");
    group.sample_size(10);

    for bands in [1usize, 3, 5] {
        let tile = SignedImage::from_rgb(&create_textured(512, 384, 0));
        let mask = GrayImage::from_pixel(512, 384, Luma([255]));
        group.bench_with_input(BenchmarkId::new("two_tiles", bands), &bands, |b, &bands| {
            b.iter(|| {
                let mut blender = MultiBandBlender::new(bands);
                blender.prepare(Rect::new(0, 0, 768, 384)).ok()?;
                blender.feed(&tile, &mask, (0, 0)).ok()?;
                blender.feed(&tile, &mask, (256, 0)).ok()?;
                blender.blend().ok()
            });
        });
    }
    group.finish();
}

fn benchmark_hole_fill(c: &mut Criterion) {
    let mut img = create_textured(1600, 800, 0);
    for y in (0..150).chain(650..800) {
        for x in 0..1600 {
            img.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
    c.bench_function("fill_holes_1600x800", |b| {
        b.iter(|| fill_holes(black_box(&img), &CanvasConfig::default()));
    });
}

criterion_group!(
    benches,
    benchmark_features,
    benchmark_matching,
    benchmark_blend,
    benchmark_hole_fill
);
criterion_main!(benches);
