use cv_core::{orthonormality_error, rotation_from_vector, CameraParams, Error, StitchStatus};
use cv_photo::advanced::{adjust_bundle, estimate_cameras, find_features, match_pairs, wave_correct};
use cv_photo::{AdvancedConfig, AdvancedStitcher, BundledStitcher, CanvasConfig, StitchBackend};
use image::{Rgb, RgbImage};
use nalgebra::Vector3;

const CELL: f64 = 0.025;

fn cell_color(i: i64, j: i64) -> Rgb<u8> {
    let mut h = (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (j as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    h ^= h >> 29;
    h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^= h >> 32;
    Rgb([40 + (h & 0xBF) as u8, 40 + ((h >> 8) & 0xBF) as u8, 40 + ((h >> 16) & 0xBF) as u8])
}

/// Renders a world of constant-colour longitude/latitude cells through a
/// pinhole camera.
fn render(cam: &CameraParams, w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        let d = cam.ray(x as f64 + 0.5, y as f64 + 0.5);
        let lon = d.x.atan2(d.z);
        let lat = d.y.clamp(-1.0, 1.0).asin();
        cell_color((lon / CELL).floor() as i64, (lat / CELL).floor() as i64)
    })
}

fn camera(yaw_deg: f64, w: u32, h: u32, f: f64) -> CameraParams {
    CameraParams::new(f, w as f64 / 2.0, h as f64 / 2.0)
        .with_rotation(rotation_from_vector(&Vector3::new(0.0, yaw_deg.to_radians(), 0.0)))
}

fn pan(yaws: &[f64]) -> Vec<RgbImage> {
    yaws.iter().map(|&y| render(&camera(y, 480, 360, 300.0), 480, 360)).collect()
}

#[test]
fn stages_recover_relative_yaw() {
    let images = pan(&[0.0, 30.0]);
    let config = AdvancedConfig::default();
    let features = find_features(&images, &config).unwrap();
    let matches = match_pairs(&features.features, &config);
    assert!(matches.get(0, 1).confidence >= config.conf_thresh);

    let mut estimate = estimate_cameras(&features.features, &matches, &config).unwrap();
    adjust_bundle(&features.features, &matches, &mut estimate, &config).unwrap();
    wave_correct(&mut estimate.cameras, &config);

    for cam in &estimate.cameras {
        assert!(orthonormality_error(&cam.rotation) < 1e-9);
        assert!((cam.focal - 300.0).abs() < 30.0, "focal {}", cam.focal);
    }
    let rel = estimate.cameras[0].rotation.transpose() * estimate.cameras[1].rotation;
    let angle = cv_core::rotation_to_vector(&rel).norm().to_degrees();
    assert!((angle - 30.0).abs() < 1.5, "relative angle {angle}");
}

#[test]
fn advanced_stitch_produces_level_panorama() {
    let images = pan(&[-30.0, 0.0, 30.0]);
    let out = AdvancedStitcher::new(AdvancedConfig::default()).stitch(&images).unwrap();
    assert!(out.panorama.width() > 480);
    assert!(out.horizon_row > 0 && (out.horizon_row as u32) < out.panorama.height());

    let canvas = cv_photo::normalize(&out.panorama, Some(out.horizon_row), &CanvasConfig::default()).unwrap();
    assert_eq!(canvas.image.width(), 2 * canvas.image.height());
    let mid = canvas.image.height() as i32 / 2;
    assert!((canvas.horizon_row.unwrap() - mid).abs() <= 1);
}

#[test]
fn fallback_stitches_overlapping_pair() {
    let images = pan(&[0.0, 25.0]);
    let pano = BundledStitcher::default().stitch(&images).unwrap();
    assert!(pano.width() > 480);
}

#[test]
fn unrelated_views_fail_estimation() {
    let images = pan(&[0.0, 180.0]);
    let config = AdvancedConfig::default();
    let err = AdvancedStitcher::new(config).stitch(&images).unwrap_err();
    assert!(matches!(err, Error::Estimation(_)), "{err}");

    let err = BundledStitcher::default().stitch(&images).unwrap_err();
    assert!(matches!(err, Error::StitchFailure(StitchStatus::NeedMoreImages)));
}
