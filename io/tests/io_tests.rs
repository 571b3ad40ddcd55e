use cv_io::{inject_gpano_metadata, load_images, save_jpeg, Error, XMP_HEADER};
use image::{Rgb, RgbImage};
use std::fs;

fn textured(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 90]))
}

#[test]
fn loader_skips_corrupt_files_and_keeps_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.jpg");
    let bad = dir.path().join("broken.jpg");
    textured(20, 10).save(&a).unwrap();
    save_jpeg(&textured(30, 15), &b, 100).unwrap();
    fs::write(&bad, b"definitely not an image").unwrap();

    let images = load_images(&[&a, &bad, &b]).unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].dimensions(), (20, 10));
    assert_eq!(images[1].dimensions(), (30, 15));
}

#[test]
fn one_good_image_plus_corrupt_is_insufficient() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let bad = dir.path().join("bad.png");
    textured(8, 8).save(&a).unwrap();
    fs::write(&bad, [0u8; 16]).unwrap();
    let err = load_images(&[a, bad]).unwrap_err();
    assert!(matches!(err, Error::InsufficientInput { loaded: 1, required: 2 }));
}

#[test]
fn injected_jpeg_still_decodes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pano.jpg");
    save_jpeg(&textured(64, 32), &path, 100).unwrap();
    let before = fs::read(&path).unwrap();

    let offset = inject_gpano_metadata(&path, 64, 32).unwrap().unwrap();
    let after = fs::read(&path).unwrap();
    assert_eq!(&after[..2], &[0xFF, 0xD8]);
    assert_eq!(&after[offset..offset + 2], &[0xFF, 0xE1]);
    assert_eq!(&after[offset + 4..offset + 4 + XMP_HEADER.len()], XMP_HEADER);
    // APP0 (if any) precedes the segment untouched.
    assert_eq!(&after[..offset], &before[..offset]);

    let decoded = image::open(&path).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 32));
}

#[test]
fn injecting_into_png_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pano.png");
    textured(16, 8).save(&path).unwrap();
    let before = fs::read(&path).unwrap();
    assert_eq!(inject_gpano_metadata(&path, 16, 8).unwrap(), None);
    assert_eq!(fs::read(&path).unwrap(), before);
}
