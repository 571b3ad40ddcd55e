use crate::convolve::map_coord;
use crate::{BorderMode, ImgprocError, Interpolation, Result};
use image::{GrayImage, RgbImage};
use rayon::prelude::*;

fn sample_pixel(
    raw: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    x: isize,
    y: isize,
    c: usize,
    border: BorderMode,
) -> f32 {
    match (map_coord(x, width, border), map_coord(y, height, border)) {
        (Some(ix), Some(iy)) => raw[(iy * width + ix) * channels + c] as f32,
        _ => match border {
            BorderMode::Constant(v) => v as f32,
            _ => 0.0,
        },
    }
}

fn interpolate_sample(
    raw: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    x: f32,
    y: f32,
    c: usize,
    interpolation: Interpolation,
    border: BorderMode,
) -> f32 {
    match interpolation {
        Interpolation::Nearest => sample_pixel(
            raw,
            width,
            height,
            channels,
            x.round() as isize,
            y.round() as isize,
            c,
            border,
        ),
        Interpolation::Linear | Interpolation::Cubic => {
            let x0 = x.floor() as isize;
            let y0 = y.floor() as isize;
            let fx = x - x0 as f32;
            let fy = y - y0 as f32;
            let s = |dx: isize, dy: isize| {
                sample_pixel(raw, width, height, channels, x0 + dx, y0 + dy, c, border)
            };
            let v0 = s(0, 0) * (1.0 - fx) + s(1, 0) * fx;
            let v1 = s(0, 1) * (1.0 - fx) + s(1, 1) * fx;
            v0 * (1.0 - fy) + v1 * fy
        }
    }
}

fn remap_interleaved(
    raw: &[u8],
    src_w: u32,
    src_h: u32,
    channels: usize,
    map_x: &[f32],
    map_y: &[f32],
    width: u32,
    height: u32,
    interpolation: Interpolation,
    border: BorderMode,
) -> Result<Vec<u8>> {
    let expected = width as usize * height as usize;
    if map_x.len() != expected || map_y.len() != expected {
        return Err(ImgprocError::DimensionMismatch(format!(
            "remap maps hold {}/{} entries, expected {expected}",
            map_x.len(),
            map_y.len()
        )));
    }

    let mut dst = vec![0u8; expected * channels];
    if expected == 0 {
        return Ok(dst);
    }
    let (sw, sh) = (src_w as usize, src_h as usize);
    let constant = match border {
        BorderMode::Constant(v) => v,
        _ => 0,
    };

    dst.par_chunks_mut(width as usize * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let idx = y * width as usize + x;
                let (sx, sy) = (map_x[idx], map_y[idx]);
                for c in 0..channels {
                    row[x * channels + c] = if sx.is_finite() && sy.is_finite() {
                        interpolate_sample(raw, sw, sh, channels, sx, sy, c, interpolation, border)
                            .round()
                            .clamp(0.0, 255.0) as u8
                    } else {
                        constant
                    };
                }
            }
        });
    Ok(dst)
}

/// Samples `src` at `(map_x[i], map_y[i])` for every destination pixel `i`.
/// Non-finite map entries produce the constant border value (0 otherwise).
pub fn remap(
    src: &GrayImage,
    map_x: &[f32],
    map_y: &[f32],
    width: u32,
    height: u32,
    interpolation: Interpolation,
    border: BorderMode,
) -> Result<GrayImage> {
    let data = remap_interleaved(
        src.as_raw(),
        src.width(),
        src.height(),
        1,
        map_x,
        map_y,
        width,
        height,
        interpolation,
        border,
    )?;
    GrayImage::from_raw(width, height, data)
        .ok_or_else(|| ImgprocError::ImageError("remap output buffer".into()))
}

pub fn remap_rgb(
    src: &RgbImage,
    map_x: &[f32],
    map_y: &[f32],
    width: u32,
    height: u32,
    interpolation: Interpolation,
    border: BorderMode,
) -> Result<RgbImage> {
    let data = remap_interleaved(
        src.as_raw(),
        src.width(),
        src.height(),
        3,
        map_x,
        map_y,
        width,
        height,
        interpolation,
        border,
    )?;
    RgbImage::from_raw(width, height, data)
        .ok_or_else(|| ImgprocError::ImageError("remap output buffer".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn identity_maps(w: u32, h: u32) -> (Vec<f32>, Vec<f32>) {
        let mut mx = Vec::new();
        let mut my = Vec::new();
        for y in 0..h {
            for x in 0..w {
                mx.push(x as f32);
                my.push(y as f32);
            }
        }
        (mx, my)
    }

    #[test]
    fn remap_identity_keeps_pixels() {
        let mut img = GrayImage::new(6, 4);
        img.put_pixel(2, 1, Luma([200]));
        img.put_pixel(4, 3, Luma([123]));
        let (mx, my) = identity_maps(6, 4);

        let out = remap(&img, &mx, &my, 6, 4, Interpolation::Nearest, BorderMode::Replicate).unwrap();
        assert_eq!(out.get_pixel(2, 1)[0], 200);
        assert_eq!(out.get_pixel(4, 3)[0], 123);
    }

    #[test]
    fn constant_border_outside_source() {
        let img = GrayImage::from_pixel(3, 3, Luma([255]));
        let out = remap(
            &img,
            &[-5.0, 1.0],
            &[0.0, f32::NAN],
            2,
            1,
            Interpolation::Nearest,
            BorderMode::Constant(0),
        )
        .unwrap();
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn reflect_border_never_goes_black() {
        let img = RgbImage::from_pixel(4, 4, Rgb([50, 60, 70]));
        let out = remap_rgb(
            &img,
            &[-0.5, 3.7],
            &[3.5, -1.2],
            2,
            1,
            Interpolation::Linear,
            BorderMode::Reflect,
        )
        .unwrap();
        assert!(out.pixels().all(|p| p.0 == [50, 60, 70]));
    }

    #[test]
    fn mismatched_maps_are_rejected() {
        let img = GrayImage::new(2, 2);
        let res = remap(&img, &[0.0], &[0.0], 2, 2, Interpolation::Linear, BorderMode::Replicate);
        assert!(matches!(res, Err(ImgprocError::DimensionMismatch(_))));
    }
}
