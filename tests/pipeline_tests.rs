//! End-to-end job tests on procedurally rendered scenes.

use cv_core::{luma, rotation_from_vector, CameraParams, Error};
use image::{Rgb, RgbImage};
use nalgebra::Vector3;
use panorama360::{run_job, JobConfig};
use std::fs;
use std::path::{Path, PathBuf};

const CELL: f64 = 0.02;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
}

fn cell_color(i: i64, j: i64) -> Rgb<u8> {
    let mut h = (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (j as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    h ^= h >> 29;
    h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^= h >> 32;
    Rgb([40 + (h & 0xBF) as u8, 40 + ((h >> 8) & 0xBF) as u8, 40 + ((h >> 16) & 0xBF) as u8])
}

/// A sphere of random-colour longitude/latitude cells seen through a level
/// pinhole camera turned by `yaw_deg`.
fn render_view(yaw_deg: f64, w: u32, h: u32, focal: f64) -> RgbImage {
    let cam = CameraParams::new(focal, w as f64 / 2.0, h as f64 / 2.0)
        .with_rotation(rotation_from_vector(&Vector3::new(0.0, yaw_deg.to_radians(), 0.0)));
    RgbImage::from_fn(w, h, |x, y| {
        let d = cam.ray(x as f64 + 0.5, y as f64 + 0.5);
        let lon = d.x.atan2(d.z);
        let lat = d.y.clamp(-1.0, 1.0).asin();
        cell_color((lon / CELL).floor() as i64, (lat / CELL).floor() as i64)
    })
}

fn write_views(dir: &Path, yaws: &[f64]) -> Vec<PathBuf> {
    yaws.iter()
        .enumerate()
        .map(|(i, &yaw)| {
            let path = dir.join(format!("view_{i}.png"));
            render_view(yaw, 1000, 750, 500.0).save(&path).unwrap();
            path
        })
        .collect()
}

#[test]
fn three_overlapping_views_make_a_tagged_equirect() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_views(dir.path(), &[-50.0, 0.0, 50.0]);
    let output = dir.path().join("result_360.jpg");

    let report = run_job(&inputs, &output, &JobConfig::default()).unwrap();
    assert!(!report.used_fallback);
    assert_eq!(report.width, 2 * report.height);
    assert!(report.width >= 1000);

    let bytes = fs::read(&output).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    let offset = report.metadata_offset.unwrap();
    assert_eq!(&bytes[offset..offset + 2], &[0xFF, 0xE1]);
    let text = String::from_utf8_lossy(&bytes[offset..(offset + 2048).min(bytes.len())]);
    assert!(text.contains("<GPano:ProjectionType>equirectangular</GPano:ProjectionType>"));

    let pano = image::open(&output).unwrap().into_rgb8();
    assert_eq!(pano.dimensions(), (report.width, report.height));
    let black = pano.pixels().filter(|p| luma(&p.0) <= 1).count();
    assert_eq!(black, 0);

    let mid = report.height as i32 / 2;
    assert!((report.horizon_row.unwrap() - mid).abs() <= 1);

    // inputs are cleaned up after success
    assert!(inputs.iter().all(|p| !p.exists()));
}

#[test]
fn views_without_overlap_fail_without_artifact() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_views(dir.path(), &[0.0, 180.0]);
    let output = dir.path().join("result_360.jpg");

    let err = run_job(&inputs, &output, &JobConfig::default()).unwrap_err();
    assert!(matches!(err, Error::StitchFailure(_)), "{err}");
    assert!(!output.exists());
    assert!(inputs.iter().all(|p| p.exists()));
}

#[test]
fn one_readable_image_is_insufficient() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.png");
    render_view(0.0, 200, 150, 100.0).save(&good).unwrap();
    let corrupt = dir.path().join("corrupt.jpg");
    fs::write(&corrupt, b"\xFF\xD8 truncated").unwrap();
    let output = dir.path().join("out.jpg");

    let err = run_job(&[good, corrupt], &output, &JobConfig::default()).unwrap_err();
    assert!(matches!(err, Error::InsufficientInput { loaded: 1, required: 2 }));
    assert!(!output.exists());
}

#[test]
fn keep_inputs_and_skip_metadata() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<PathBuf> = [0.0, 35.0]
        .iter()
        .enumerate()
        .map(|(i, &yaw)| {
            let p = dir.path().join(format!("v{i}.png"));
            render_view(yaw, 480, 360, 300.0).save(&p).unwrap();
            p
        })
        .collect();
    let output = dir.path().join("pano.jpg");
    let config = JobConfig::default().with_remove_inputs(false).with_inject_metadata(false);

    let report = run_job(&inputs, &output, &config).unwrap();
    assert_eq!(report.metadata_offset, None);
    assert!(inputs.iter().all(|p| p.exists()));
    let bytes = fs::read(&output).unwrap();
    assert!(!bytes.windows(5).any(|w| w == b"GPano"));
}

#[test]
fn upload_filter_accepts_only_photos() {
    for (name, ok) in [("a.JPG", true), ("b.jpeg", true), ("c.png", true), ("d.gif", false), ("e", false)] {
        assert_eq!(cv_io::is_supported_image(Path::new(name)), ok, "{name}");
    }
}

#[test]
fn failed_job_keeps_an_existing_panorama() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("result_360.jpg");
    fs::write(&output, b"previous good panorama").unwrap();
    let missing = [dir.path().join("gone_0.jpg"), dir.path().join("gone_1.jpg")];

    let err = run_job(&missing, &output, &JobConfig::default()).unwrap_err();
    assert!(matches!(err, Error::InsufficientInput { loaded: 0, .. }), "{err}");
    assert_eq!(fs::read(&output).unwrap(), b"previous good panorama");
}
