use image::{GrayImage, RgbImage};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
}

/// Keys cubic convolution coefficient.
const CUBIC_A: f32 = -0.75;

fn cubic_weights(t: f32) -> [f32; 4] {
    let a = CUBIC_A;
    let w0 = ((a * (t + 1.0) - 5.0 * a) * (t + 1.0) + 8.0 * a) * (t + 1.0) - 4.0 * a;
    let w1 = ((a + 2.0) * t - (a + 3.0)) * t * t + 1.0;
    let w2 = ((a + 2.0) * (1.0 - t) - (a + 3.0)) * (1.0 - t) * (1.0 - t) + 1.0;
    [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

/// Resamples an interleaved 8-bit buffer with pixel-center alignment.
pub fn resize_interleaved(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    channels: usize,
    width: u32,
    height: u32,
    interpolation: Interpolation,
) -> Vec<u8> {
    let mut dst = vec![0u8; width as usize * height as usize * channels];
    if width == 0 || height == 0 || src_w == 0 || src_h == 0 {
        return dst;
    }

    let sx_scale = src_w as f32 / width as f32;
    let sy_scale = src_h as f32 / height as f32;
    let (sw, sh) = (src_w as isize, src_h as isize);
    let at = |x: isize, y: isize, c: usize| -> f32 {
        let xi = x.clamp(0, sw - 1) as usize;
        let yi = y.clamp(0, sh - 1) as usize;
        src[(yi * src_w as usize + xi) * channels + c] as f32
    };

    dst.par_chunks_mut(width as usize * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                for c in 0..channels {
                    let v = match interpolation {
                        Interpolation::Nearest => {
                            let sx = (x as f32 * sx_scale).floor() as isize;
                            let sy = (y as f32 * sy_scale).floor() as isize;
                            at(sx, sy, c)
                        }
                        Interpolation::Linear => {
                            let fx = ((x as f32 + 0.5) * sx_scale - 0.5).max(0.0);
                            let fy = ((y as f32 + 0.5) * sy_scale - 0.5).max(0.0);
                            let x0 = fx.floor() as isize;
                            let y0 = fy.floor() as isize;
                            let dx = fx - x0 as f32;
                            let dy = fy - y0 as f32;
                            let top = at(x0, y0, c) * (1.0 - dx) + at(x0 + 1, y0, c) * dx;
                            let bottom =
                                at(x0, y0 + 1, c) * (1.0 - dx) + at(x0 + 1, y0 + 1, c) * dx;
                            top * (1.0 - dy) + bottom * dy
                        }
                        Interpolation::Cubic => {
                            let fx = (x as f32 + 0.5) * sx_scale - 0.5;
                            let fy = (y as f32 + 0.5) * sy_scale - 0.5;
                            let x0 = fx.floor() as isize;
                            let y0 = fy.floor() as isize;
                            let wx = cubic_weights(fx - x0 as f32);
                            let wy = cubic_weights(fy - y0 as f32);
                            let mut acc = 0.0;
                            for (j, wyj) in wy.iter().enumerate() {
                                let mut racc = 0.0;
                                for (i, wxi) in wx.iter().enumerate() {
                                    racc += wxi * at(x0 + i as isize - 1, y0 + j as isize - 1, c);
                                }
                                acc += wyj * racc;
                            }
                            acc
                        }
                    };
                    row[x * channels + c] = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        });

    dst
}

pub fn resize(src: &GrayImage, width: u32, height: u32, interpolation: Interpolation) -> GrayImage {
    let data = resize_interleaved(
        src.as_raw(),
        src.width(),
        src.height(),
        1,
        width,
        height,
        interpolation,
    );
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

pub fn resize_rgb(src: &RgbImage, width: u32, height: u32, interpolation: Interpolation) -> RgbImage {
    let data = resize_interleaved(
        src.as_raw(),
        src.width(),
        src.height(),
        3,
        width,
        height,
        interpolation,
    );
    RgbImage::from_raw(width, height, data).unwrap_or_else(|| RgbImage::new(width, height))
}

/// Scales both dimensions by `scale`, never below one pixel.
pub fn resize_rgb_by(src: &RgbImage, scale: f64, interpolation: Interpolation) -> RgbImage {
    let w = ((src.width() as f64 * scale).round() as u32).max(1);
    let h = ((src.height() as f64 * scale).round() as u32).max(1);
    resize_rgb(src, w, h, interpolation)
}
