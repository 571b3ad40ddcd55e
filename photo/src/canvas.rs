//! Canvas normalization of a stitched panorama: crop to content, embed in
//! an exact 2:1 equirectangular canvas, and fill the remaining background.

use crate::Result;
use cv_core::Rect;
use cv_imgproc::{
    background_mask, content_bounds, count_nonzero, create_morph_kernel, dilate, gaussian_blur_rgb, inpaint_telea,
    resize, resize_rgb, Interpolation, MorphShape,
};
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Pixels whose luma does not exceed this are background.
    pub background_max_luma: u8,
    pub inpaint_radius: u32,
    /// Linear downscale applied before inpainting.
    pub downscale: u32,
    pub min_work_size: u32,
    pub blur_ksize: usize,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            background_max_luma: 1,
            inpaint_radius: 3,
            downscale: 10,
            min_work_size: 32,
            blur_ksize: 21,
        }
    }
}

/// Crops to the bounding box of every non-background pixel. Returns the
/// crop and the number of rows removed from the top.
pub fn crop_content(img: &RgbImage, config: &CanvasConfig) -> (RgbImage, i32) {
    match content_bounds(img, config.background_max_luma) {
        Some(Rect { x, y, width, height }) => {
            debug!(x, y, width, height, "crop box");
            let cropped = imageops::crop_imm(img, x as u32, y as u32, width, height).to_image();
            (cropped, y)
        }
        None => (img.clone(), 0),
    }
}

/// Size of the 2:1 canvas holding a `width × height` image.
pub fn equirect_size(width: u32, height: u32) -> (u32, u32) {
    let target_w = width + width % 2;
    let target_h = target_w / 2;
    if height > target_h {
        (2 * height, height)
    } else {
        (target_w, target_h)
    }
}

/// Places `img` on a black 2:1 canvas. With a horizon row the horizon lands
/// on the canvas middle row as far as the content allows; otherwise the
/// content is centered.
pub fn embed_equirect(img: &RgbImage, horizon: Option<i32>) -> RgbImage {
    let (w, h) = img.dimensions();
    let (target_w, target_h) = equirect_size(w, h);
    let y_off = embed_row_offset(target_h, h, horizon);
    let x_off = (target_w - w) / 2;
    info!(target_w, target_h, x_off, y_off, "equirect canvas");

    let mut canvas = RgbImage::new(target_w, target_h);
    imageops::replace(&mut canvas, img, x_off as i64, y_off);
    canvas
}

/// Row at which content of height `h` starts on a canvas of `target_h` rows.
fn embed_row_offset(target_h: u32, h: u32, horizon: Option<i32>) -> i64 {
    let free = target_h.saturating_sub(h) as i64;
    match horizon {
        Some(hy) => (target_h as i64 / 2 - hy as i64).clamp(0, free),
        None => free / 2,
    }
}

/// Fills background pixels from their surroundings at a reduced size, then
/// pastes the blurred fill back under the untouched content.
pub fn fill_holes(img: &RgbImage, config: &CanvasConfig) -> RgbImage {
    let mask = background_mask(img, config.background_max_luma);
    let holes = count_nonzero(&mask);
    if holes == 0 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let sw = (w / config.downscale.max(1)).max(config.min_work_size);
    let sh = (h / config.downscale.max(1)).max(config.min_work_size);
    debug!(holes, work_w = sw, work_h = sh, "filling holes");

    let small = resize_rgb(img, sw, sh, Interpolation::Linear);
    // Linear downscaling darkens content next to the background, so those
    // pixels are refilled too.
    let small_mask = dilate(
        &resize(&mask, sw, sh, Interpolation::Nearest),
        &create_morph_kernel(MorphShape::Rectangle, 3, 3),
        1,
    );
    let inpainted = match inpaint_telea(&small, &small_mask, config.inpaint_radius) {
        Ok(out) => out,
        Err(err) => {
            warn!(error = %err, "inpainting skipped");
            return img.clone();
        }
    };
    let blurred = gaussian_blur_rgb(&inpainted, config.blur_ksize, 0.0);
    let fill = resize_rgb(&blurred, w, h, Interpolation::Cubic);

    let mut out = img.clone();
    for ((dst, m), src) in out.pixels_mut().zip(mask.pixels()).zip(fill.pixels()) {
        if m[0] != 0 {
            *dst = *src;
        }
    }
    out
}

/// Final canvas plus where its horizon ended up, when known.
#[derive(Debug, Clone)]
pub struct NormalizedCanvas {
    pub image: RgbImage,
    pub horizon_row: Option<i32>,
}

/// crop → embed → hole fill.
pub fn normalize(img: &RgbImage, horizon: Option<i32>, config: &CanvasConfig) -> Result<NormalizedCanvas> {
    if img.width() == 0 || img.height() == 0 {
        return Err(crate::Error::post_process("cannot normalize an empty panorama"));
    }
    let (cropped, shift) = crop_content(img, config);
    let horizon = horizon.map(|hy| hy - shift);
    let canvas = embed_equirect(&cropped, horizon);
    let horizon_row = horizon
        .map(|hy| (embed_row_offset(canvas.height(), cropped.height(), horizon) + hy as i64) as i32);
    Ok(NormalizedCanvas {
        image: fill_holes(&canvas, config),
        horizon_row,
    })
}
