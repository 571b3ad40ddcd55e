//! Multi-band (Laplacian pyramid) blending.
//!
//! Every tile is decomposed into `num_bands + 1` levels and accumulated into
//! a destination pyramid weighted by the Gaussian pyramid of its seam mask;
//! normalizing by the summed weights and collapsing gives the composite.

use crate::{Error, Result};
use cv_core::{FloatImage, Rect, SignedImage};
use cv_imgproc::{
    collapse_laplacian, copy_make_border, gaussian_pyramid, laplacian_pyramid, BorderMode,
};
use image::{GrayImage, Luma};
use tracing::debug;

const WEIGHT_EPS: f32 = 1e-5;
const MAX_BANDS: usize = 7;

/// Band count for a composite covering `area` pixels.
pub fn bands_for_area(area: u64, blend_strength: f64) -> usize {
    let blend_width = (area as f64).sqrt() * blend_strength / 100.0;
    if blend_width < 1.0 {
        return 1;
    }
    let bands = blend_width.log2().ceil() as i64 - 1;
    bands.clamp(1, MAX_BANDS as i64) as usize
}

#[derive(Debug)]
pub struct MultiBandBlender {
    requested_bands: usize,
    num_bands: usize,
    dst_roi: Rect,
    dst_roi_final: Rect,
    pyr_laplace: Vec<FloatImage>,
    band_weights: Vec<FloatImage>,
}

impl MultiBandBlender {
    pub fn new(num_bands: usize) -> Self {
        Self {
            requested_bands: num_bands,
            num_bands: 0,
            dst_roi: Rect::new(0, 0, 0, 0),
            dst_roi_final: Rect::new(0, 0, 0, 0),
            pyr_laplace: Vec::new(),
            band_weights: Vec::new(),
        }
    }

    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    /// Allocates the destination pyramids for `dst_roi`, padded so its size
    /// divides by `2^num_bands`.
    pub fn prepare(&mut self, dst_roi: Rect) -> Result<()> {
        if dst_roi.is_empty() {
            return Err(Error::post_process("blend target is empty"));
        }
        self.dst_roi_final = dst_roi;
        let max_len = dst_roi.width.max(dst_roi.height) as f64;
        self.num_bands = self
            .requested_bands
            .min(max_len.log2().ceil().max(0.0) as usize);

        let step = 1u32 << self.num_bands;
        let mut roi = dst_roi;
        roi.width += (step - roi.width % step) % step;
        roi.height += (step - roi.height % step) % step;
        self.dst_roi = roi;

        self.pyr_laplace.clear();
        self.band_weights.clear();
        let (mut w, mut h) = (roi.width, roi.height);
        for level in 0..=self.num_bands {
            if level > 0 {
                w = (w + 1) / 2;
                h = (h + 1) / 2;
            }
            self.pyr_laplace.push(FloatImage::zeros(w, h, 3));
            self.band_weights.push(FloatImage::zeros(w, h, 1));
        }
        Ok(())
    }

    /// Adds one tile placed at `tl` in destination coordinates.
    pub fn feed(&mut self, img: &SignedImage, mask: &GrayImage, tl: (i32, i32)) -> Result<()> {
        if img.width != mask.width() || img.height != mask.height() {
            return Err(Error::post_process(format!(
                "tile {}x{} does not match its mask {}x{}",
                img.width,
                img.height,
                mask.width(),
                mask.height()
            )));
        }
        if self.pyr_laplace.is_empty() {
            return Err(Error::post_process("blender fed before prepare"));
        }
        let tile = Rect::new(tl.0, tl.1, img.width, img.height);
        if !self.dst_roi.contains_rect(&tile) {
            return Err(Error::post_process(format!(
                "tile {tile:?} outside blend target {:?}",
                self.dst_roi
            )));
        }

        let bands = self.num_bands as i32;
        let step = 1i32 << bands;
        let gap = 3 * step;
        let (dst_br_x, dst_br_y) = self.dst_roi.br();

        let mut tl_new = (
            self.dst_roi.x.max(tl.0 - gap),
            self.dst_roi.y.max(tl.1 - gap),
        );
        let br_new = (
            dst_br_x.min(tl.0 + img.width as i32 + gap),
            dst_br_y.min(tl.1 + img.height as i32 + gap),
        );
        tl_new.0 = self.dst_roi.x + (((tl_new.0 - self.dst_roi.x) >> bands) << bands);
        tl_new.1 = self.dst_roi.y + (((tl_new.1 - self.dst_roi.y) >> bands) << bands);
        let mut width = br_new.0 - tl_new.0;
        let mut height = br_new.1 - tl_new.1;
        width += (step - width % step) % step;
        height += (step - height % step) % step;
        let mut br_new = (tl_new.0 + width, tl_new.1 + height);
        let dx = (br_new.0 - dst_br_x).max(0);
        let dy = (br_new.1 - dst_br_y).max(0);
        tl_new.0 -= dx;
        br_new.0 -= dx;
        tl_new.1 -= dy;
        br_new.1 -= dy;

        let top = (tl.1 - tl_new.1) as usize;
        let left = (tl.0 - tl_new.0) as usize;
        let bottom = (br_new.1 - tl.1 - img.height as i32) as usize;
        let right = (br_new.0 - tl.0 - img.width as i32) as usize;

        let src = copy_make_border(&FloatImage::from_signed(img), top, bottom, left, right, BorderMode::Reflect);
        let src_pyr = laplacian_pyramid(&src, self.num_bands);
        let weight = copy_make_border(
            &FloatImage::from_mask(mask),
            top,
            bottom,
            left,
            right,
            BorderMode::Constant(0),
        );
        let weight_pyr = gaussian_pyramid(&weight, self.num_bands);

        let mut x_tl = (tl_new.0 - self.dst_roi.x) as usize;
        let mut y_tl = (tl_new.1 - self.dst_roi.y) as usize;
        let mut x_br = (br_new.0 - self.dst_roi.x) as usize;
        let mut y_br = (br_new.1 - self.dst_roi.y) as usize;

        for level in 0..=self.num_bands {
            let (s, w) = (&src_pyr[level], &weight_pyr[level]);
            let dst = &mut self.pyr_laplace[level];
            let dst_w = &mut self.band_weights[level];
            let (dw, sw) = (dst.width as usize, s.width as usize);
            let rows = (y_br - y_tl).min(s.height as usize);
            let cols = (x_br - x_tl).min(sw);
            for y in 0..rows {
                let drow = (y_tl + y) * dw;
                let srow = y * sw;
                for x in 0..cols {
                    let wt = w.data[srow + x];
                    let di = drow + x_tl + x;
                    let si = srow + x;
                    for c in 0..3 {
                        dst.data[di * 3 + c] += s.data[si * 3 + c] * wt;
                    }
                    dst_w.data[di] += wt;
                }
            }
            x_tl /= 2;
            y_tl /= 2;
            x_br /= 2;
            y_br /= 2;
        }
        Ok(())
    }

    /// Normalizes, collapses and crops the accumulated pyramid. Pixels no
    /// tile contributed to are zero in both outputs.
    pub fn blend(mut self) -> Result<(SignedImage, GrayImage)> {
        if self.pyr_laplace.is_empty() {
            return Err(Error::post_process("blender was never prepared"));
        }
        for (lap, weight) in self.pyr_laplace.iter_mut().zip(&self.band_weights) {
            for (i, &wt) in weight.data.iter().enumerate() {
                let inv = 1.0 / (wt + WEIGHT_EPS);
                for c in 0..3 {
                    lap.data[i * 3 + c] *= inv;
                }
            }
        }
        let full = collapse_laplacian(std::mem::take(&mut self.pyr_laplace));

        let (fw, fh) = (self.dst_roi_final.width, self.dst_roi_final.height);
        let stride = full.width as usize;
        let weights0 = &self.band_weights[0];
        let mut out = SignedImage::new(fw, fh);
        let mut mask = GrayImage::new(fw, fh);
        for y in 0..fh as usize {
            for x in 0..fw as usize {
                let si = y * stride + x;
                if weights0.data[si] <= WEIGHT_EPS {
                    continue;
                }
                mask.put_pixel(x as u32, y as u32, Luma([255]));
                let oi = (y * fw as usize + x) * 3;
                for c in 0..3 {
                    out.data[oi + c] = full.data[si * 3 + c]
                        .round()
                        .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                }
            }
        }
        debug!(bands = self.num_bands, width = fw, height = fh, "blend collapsed");
        Ok((out, mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 128]))
    }

    #[test]
    fn band_count_follows_union_size() {
        assert_eq!(bands_for_area(0, 5.0), 1);
        // sqrt = 2000, width 100, ceil(log2 100) - 1 = 6
        assert_eq!(bands_for_area(2000 * 2000, 5.0), 6);
        assert_eq!(bands_for_area(100_000 * 100_000, 5.0), 7);
        assert_eq!(bands_for_area(30 * 30, 5.0), 1);
    }

    #[test]
    fn single_tile_passes_through() {
        let img = gradient(50, 37);
        let mask = GrayImage::from_pixel(50, 37, Luma([255]));
        let mut blender = MultiBandBlender::new(3);
        blender.prepare(Rect::new(-10, 4, 50, 37)).unwrap();
        blender.feed(&SignedImage::from_rgb(&img), &mask, (-10, 4)).unwrap();
        let (out, out_mask) = blender.blend().unwrap();
        assert_eq!(out_mask, mask);
        let rgb = out.to_rgb();
        for (a, b) in rgb.pixels().zip(img.pixels()) {
            for c in 0..3 {
                assert!((a[c] as i32 - b[c] as i32).abs() <= 1);
            }
        }
    }

    #[test]
    fn uncovered_pixels_are_zero() {
        let img = RgbImage::from_pixel(20, 20, Rgb([90, 90, 90]));
        let mask = GrayImage::from_pixel(20, 20, Luma([255]));
        let mut blender = MultiBandBlender::new(2);
        blender.prepare(Rect::new(0, 0, 60, 20)).unwrap();
        blender.feed(&SignedImage::from_rgb(&img), &mask, (0, 0)).unwrap();
        let (out, out_mask) = blender.blend().unwrap();
        assert_eq!(out_mask.get_pixel(50, 10)[0], 0);
        assert_eq!(out.pixel(50, 10), [0, 0, 0]);
        assert_eq!(out_mask.get_pixel(5, 10)[0], 255);
    }

    #[test]
    fn tile_outside_target_is_rejected() {
        let img = SignedImage::new(10, 10);
        let mask = GrayImage::from_pixel(10, 10, Luma([255]));
        let mut blender = MultiBandBlender::new(1);
        blender.prepare(Rect::new(0, 0, 16, 16)).unwrap();
        assert!(blender.feed(&img, &mask, (12, 0)).is_err());
    }
}
