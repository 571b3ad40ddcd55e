use image::{GrayImage, RgbImage};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderMode {
    Constant(u8),
    Replicate,
    /// `fedcba|abcdefgh|hgfedcb` style mirroring that repeats the edge pixel.
    Reflect,
    /// Mirroring without repeating the edge pixel.
    Reflect101,
    Wrap,
}

/// Maps an out-of-range coordinate back into `[0, len)`; `None` means the
/// constant border value applies.
pub(crate) fn map_coord(coord: isize, len: usize, mode: BorderMode) -> Option<usize> {
    let n = len as isize;
    if n <= 0 {
        return None;
    }
    if coord >= 0 && coord < n {
        return Some(coord as usize);
    }

    match mode {
        BorderMode::Constant(_) => None,
        BorderMode::Replicate => Some(coord.clamp(0, n - 1) as usize),
        BorderMode::Wrap => Some(coord.rem_euclid(n) as usize),
        BorderMode::Reflect => {
            if n == 1 {
                return Some(0);
            }
            let period = 2 * n;
            let mut c = coord.rem_euclid(period);
            if c >= n {
                c = period - c - 1;
            }
            Some(c as usize)
        }
        BorderMode::Reflect101 => {
            if n == 1 {
                return Some(0);
            }
            let period = 2 * n - 2;
            let mut c = coord.rem_euclid(period);
            if c >= n {
                c = period - c;
            }
            Some(c as usize)
        }
    }
}

/// Normalized 1-D Gaussian taps. A non-positive `sigma` derives it from the
/// size the same way common imaging libraries do.
pub fn gaussian_kernel_1d(size: usize, sigma: f32) -> Vec<f32> {
    let size = size.max(1) | 1;
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (size / 2) as f32;
    let mut taps: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = taps.iter().sum();
    taps.iter_mut().for_each(|v| *v /= sum);
    taps
}

/// Separable convolution over an interleaved `u8` buffer.
pub fn separable_filter_u8(
    src: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[f32],
    border: BorderMode,
) -> Vec<u8> {
    let tmp = separable_pass(
        &src.iter().map(|&v| v as f32).collect::<Vec<_>>(),
        width,
        height,
        channels,
        kernel,
        border,
    );
    tmp.into_iter()
        .map(|v| v.round().clamp(0.0, 255.0) as u8)
        .collect()
}

/// Horizontal then vertical pass of `kernel` over interleaved `f32` data.
pub fn separable_pass(
    src: &[f32],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[f32],
    border: BorderMode,
) -> Vec<f32> {
    let row_len = width * channels;
    let radius = (kernel.len() / 2) as isize;
    let constant = match border {
        BorderMode::Constant(v) => v as f32,
        _ => 0.0,
    };
    if row_len == 0 || height == 0 {
        return src.to_vec();
    }

    let mut horiz = vec![0.0f32; src.len()];
    horiz
        .par_chunks_mut(row_len)
        .zip(src.par_chunks(row_len))
        .for_each(|(out, row)| {
            for x in 0..width {
                for c in 0..channels {
                    let mut acc = 0.0;
                    for (k, &w) in kernel.iter().enumerate() {
                        let sx = x as isize + k as isize - radius;
                        acc += w * match map_coord(sx, width, border) {
                            Some(ix) => row[ix * channels + c],
                            None => constant,
                        };
                    }
                    out[x * channels + c] = acc;
                }
            }
        });

    let mut dst = vec![0.0f32; src.len()];
    dst.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, out)| {
            for (k, &w) in kernel.iter().enumerate() {
                let sy = y as isize + k as isize - radius;
                match map_coord(sy, height, border) {
                    Some(iy) => {
                        let row = &horiz[iy * row_len..(iy + 1) * row_len];
                        for (o, &v) in out.iter_mut().zip(row) {
                            *o += w * v;
                        }
                    }
                    None => out.iter_mut().for_each(|o| *o += w * constant),
                }
            }
        });
    dst
}

pub fn gaussian_blur(src: &GrayImage, ksize: usize, sigma: f32) -> GrayImage {
    let kernel = gaussian_kernel_1d(ksize, sigma);
    let (w, h) = src.dimensions();
    let data = separable_filter_u8(
        src.as_raw(),
        w as usize,
        h as usize,
        1,
        &kernel,
        BorderMode::Reflect101,
    );
    GrayImage::from_raw(w, h, data).unwrap_or_else(|| GrayImage::new(w, h))
}

pub fn gaussian_blur_rgb(src: &RgbImage, ksize: usize, sigma: f32) -> RgbImage {
    let kernel = gaussian_kernel_1d(ksize, sigma);
    let (w, h) = src.dimensions();
    let data = separable_filter_u8(
        src.as_raw(),
        w as usize,
        h as usize,
        3,
        &kernel,
        BorderMode::Reflect101,
    );
    RgbImage::from_raw(w, h, data).unwrap_or_else(|| RgbImage::new(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_modes_map_like_opencv() {
        assert_eq!(map_coord(-1, 5, BorderMode::Reflect), Some(0));
        assert_eq!(map_coord(-1, 5, BorderMode::Reflect101), Some(1));
        assert_eq!(map_coord(5, 5, BorderMode::Reflect), Some(4));
        assert_eq!(map_coord(5, 5, BorderMode::Reflect101), Some(3));
        assert_eq!(map_coord(-2, 5, BorderMode::Wrap), Some(3));
        assert_eq!(map_coord(9, 5, BorderMode::Replicate), Some(4));
        assert_eq!(map_coord(-1, 5, BorderMode::Constant(7)), None);
    }

    #[test]
    fn gaussian_taps_sum_to_one() {
        let k = gaussian_kernel_1d(21, 3.5);
        assert_eq!(k.len(), 21);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(k[10] > k[9] && (k[9] - k[11]).abs() < 1e-7);
    }

    #[test]
    fn blur_keeps_flat_image_flat() {
        let img = RgbImage::from_pixel(13, 9, image::Rgb([40, 90, 200]));
        let out = gaussian_blur_rgb(&img, 21, 3.5);
        assert!(out.pixels().all(|p| p.0 == [40, 90, 200]));
    }
}
