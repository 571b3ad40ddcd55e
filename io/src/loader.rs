//! Loading inputs and writing the panorama.

use crate::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// Fewest decodable inputs a stitch can start from.
pub const MIN_IMAGES: usize = 2;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// True for paths with a png/jpg/jpeg extension, in any case.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
        .unwrap_or(false)
}

/// Decodes every path in order, skipping (and logging) the ones that fail.
pub fn load_images<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<RgbImage>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        match image::open(path) {
            Ok(img) => images.push(img.into_rgb8()),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable image"),
        }
    }
    info!(loaded = images.len(), requested = paths.len(), "images loaded");

    if images.len() < MIN_IMAGES {
        return Err(Error::InsufficientInput {
            loaded: images.len(),
            required: MIN_IMAGES,
        });
    }
    Ok(images)
}

/// Writes `img` as a baseline JPEG.
pub fn save_jpeg(img: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
    encoder.encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_filter_ignores_case() {
        assert!(is_supported_image(Path::new("a/b/IMG_001.JPG")));
        assert!(is_supported_image(Path::new("shot.jpeg")));
        assert!(is_supported_image(Path::new("shot.Png")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("jpg")));
    }

    #[test]
    fn empty_path_list_is_insufficient() {
        let paths: Vec<&Path> = Vec::new();
        assert!(matches!(
            load_images(paths.as_slice()),
            Err(Error::InsufficientInput { loaded: 0, required: 2 })
        ));
    }
}
