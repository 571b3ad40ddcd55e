//! Gaussian and Laplacian pyramids over [`FloatImage`] buffers.
//!
//! Both directions use the 5-tap binomial kernel `[1 4 6 4 1] / 16` with
//! `Reflect101` borders.

use crate::convolve::{map_coord, separable_pass};
use crate::BorderMode;
use cv_core::FloatImage;
use rayon::prelude::*;

const BINOMIAL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Blur then drop every other row and column. Output is `ceil(w/2) × ceil(h/2)`.
pub fn pyr_down(src: &FloatImage) -> FloatImage {
    let (w, h, c) = (src.width as usize, src.height as usize, src.channels);
    let blurred = separable_pass(&src.data, w, h, c, &BINOMIAL, BorderMode::Reflect101);
    let dw = (w + 1) / 2;
    let dh = (h + 1) / 2;
    let mut dst = FloatImage::zeros(dw as u32, dh as u32, c);
    if dw == 0 || dh == 0 {
        return dst;
    }
    dst.data
        .par_chunks_mut(dw * c)
        .enumerate()
        .for_each(|(y, row)| {
            let sy = 2 * y;
            for x in 0..dw {
                let sx = 2 * x;
                for ch in 0..c {
                    row[x * c + ch] = blurred[(sy * w + sx) * c + ch];
                }
            }
        });
    dst
}

/// Upsample to `width × height` by zero insertion and a 4× binomial blur.
pub fn pyr_up(src: &FloatImage, width: u32, height: u32) -> FloatImage {
    let (sw, sh, c) = (src.width as usize, src.height as usize, src.channels);
    let (dw, dh) = (width as usize, height as usize);
    let mut dst = FloatImage::zeros(width, height, c);
    if dw == 0 || dh == 0 || sw == 0 || sh == 0 {
        return dst;
    }

    // Each output pixel gathers the source taps that land on it; odd output
    // positions sit between two source pixels.
    let taps_for = |d: usize, src_len: usize, dst_len: usize| -> Vec<(usize, f32)> {
        let mut taps = Vec::with_capacity(3);
        for k in -2isize..=2 {
            let p = d as isize + k;
            let Some(p) = map_coord(p, dst_len, BorderMode::Reflect101) else {
                continue;
            };
            if p % 2 == 0 && p / 2 < src_len {
                taps.push((p / 2, BINOMIAL[(k + 2) as usize] * 2.0));
            }
        }
        taps
    };
    let x_taps: Vec<_> = (0..dw).map(|x| taps_for(x, sw, dw)).collect();
    let y_taps: Vec<_> = (0..dh).map(|y| taps_for(y, sh, dh)).collect();

    dst.data
        .par_chunks_mut(dw * c)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, xt) in x_taps.iter().enumerate() {
                for ch in 0..c {
                    let mut acc = 0.0;
                    for &(sy, wy) in &y_taps[y] {
                        for &(sx, wx) in xt {
                            acc += wy * wx * src.data[(sy * sw + sx) * c + ch];
                        }
                    }
                    row[x * c + ch] = acc;
                }
            }
        });
    dst
}

/// `levels + 1` Gaussian levels, the first being `src` itself.
pub fn gaussian_pyramid(src: &FloatImage, levels: usize) -> Vec<FloatImage> {
    let mut pyr = Vec::with_capacity(levels + 1);
    pyr.push(src.clone());
    for i in 0..levels {
        let next = pyr_down(&pyr[i]);
        pyr.push(next);
    }
    pyr
}

/// Band-pass levels followed by the coarsest Gaussian level.
pub fn laplacian_pyramid(src: &FloatImage, levels: usize) -> Vec<FloatImage> {
    let mut pyr = gaussian_pyramid(src, levels);
    for i in 0..levels {
        let up = pyr_up(&pyr[i + 1], pyr[i].width, pyr[i].height);
        pyr[i]
            .data
            .par_iter_mut()
            .zip(up.data.par_iter())
            .for_each(|(a, b)| *a -= b);
    }
    pyr
}

/// Inverse of [`laplacian_pyramid`]: returns the reconstructed finest level.
pub fn collapse_laplacian(mut pyr: Vec<FloatImage>) -> FloatImage {
    while pyr.len() > 1 {
        let Some(coarse) = pyr.pop() else { break };
        let Some(fine) = pyr.last_mut() else { break };
        let up = pyr_up(&coarse, fine.width, fine.height);
        fine.data
            .par_iter_mut()
            .zip(up.data.par_iter())
            .for_each(|(a, b)| *a += b);
    }
    pyr.pop().unwrap_or_else(|| FloatImage::zeros(0, 0, 1))
}

/// Pads `src` on each side; `Constant(v)` fills with `v`.
pub fn copy_make_border(
    src: &FloatImage,
    top: usize,
    bottom: usize,
    left: usize,
    right: usize,
    border: BorderMode,
) -> FloatImage {
    let (sw, sh, c) = (src.width as usize, src.height as usize, src.channels);
    let dw = sw + left + right;
    let dh = sh + top + bottom;
    let mut dst = FloatImage::zeros(dw as u32, dh as u32, c);
    let constant = match border {
        BorderMode::Constant(v) => v as f32,
        _ => 0.0,
    };
    if dw == 0 || dh == 0 {
        return dst;
    }
    dst.data
        .par_chunks_mut(dw * c)
        .enumerate()
        .for_each(|(y, row)| {
            let sy = map_coord(y as isize - top as isize, sh, border);
            for x in 0..dw {
                let sx = map_coord(x as isize - left as isize, sw, border);
                for ch in 0..c {
                    row[x * c + ch] = match (sx, sy) {
                        (Some(sx), Some(sy)) => src.data[(sy * sw + sx) * c + ch],
                        _ => constant,
                    };
                }
            }
        });
    dst
}
