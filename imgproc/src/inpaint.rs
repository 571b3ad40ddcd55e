//! Fast-marching inpainting (Telea 2004).
//!
//! Unknown pixels are visited in order of their distance `T` to the known
//! region; each is filled from the known pixels within `radius`, weighted by
//! direction, distance and level-set proximity, with a first-order gradient
//! correction.

use crate::{create_morph_kernel, dilate, ImgprocError, MorphShape, Result};
use image::{GrayImage, RgbImage};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Known,
    Band,
    Inside,
}

const FAR: f32 = 1.0e6;

#[derive(Debug, Clone, Copy)]
struct Narrow {
    t: f32,
    idx: usize,
}

impl PartialEq for Narrow {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Narrow {}

impl PartialOrd for Narrow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Narrow {
    // Min-heap on arrival time, ties broken by scan order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

struct Field {
    w: usize,
    h: usize,
    flags: Vec<Flag>,
    t: Vec<f32>,
}

impl Field {
    fn flag(&self, x: isize, y: isize) -> Option<Flag> {
        if x < 0 || y < 0 || x >= self.w as isize || y >= self.h as isize {
            None
        } else {
            Some(self.flags[y as usize * self.w + x as usize])
        }
    }

    fn time(&self, x: isize, y: isize) -> f32 {
        self.t[y as usize * self.w + x as usize]
    }

    fn is_known(&self, x: isize, y: isize) -> bool {
        self.flag(x, y) == Some(Flag::Known)
    }

    /// First-order upwind solve of `|∇T| = 1` from two axis neighbours.
    fn solve(&self, x1: isize, y1: isize, x2: isize, y2: isize) -> f32 {
        match (self.is_known(x1, y1), self.is_known(x2, y2)) {
            (true, true) => {
                let t1 = self.time(x1, y1);
                let t2 = self.time(x2, y2);
                let d = 2.0 - (t1 - t2) * (t1 - t2);
                if d < 0.0 {
                    return t1.min(t2) + 1.0;
                }
                let r = d.sqrt();
                let s = (t1 + t2 - r) / 2.0;
                if s >= t1 && s >= t2 {
                    s
                } else if s + r >= t1 && s + r >= t2 {
                    s + r
                } else {
                    t1.min(t2) + 1.0
                }
            }
            (true, false) => 1.0 + self.time(x1, y1),
            (false, true) => 1.0 + self.time(x2, y2),
            (false, false) => FAR,
        }
    }

    fn arrival(&self, x: isize, y: isize) -> f32 {
        self.solve(x - 1, y, x, y - 1)
            .min(self.solve(x + 1, y, x, y - 1))
            .min(self.solve(x - 1, y, x, y + 1))
            .min(self.solve(x + 1, y, x, y + 1))
    }

    /// Central difference of `T`, one-sided where a neighbour is unknown.
    fn grad_t(&self, x: isize, y: isize) -> (f32, f32) {
        let t = self.time(x, y);
        let axis = |ax: isize, ay: isize| -> f32 {
            let fwd = self
                .flag(x + ax, y + ay)
                .filter(|f| *f != Flag::Inside)
                .map(|_| self.time(x + ax, y + ay));
            let bwd = self
                .flag(x - ax, y - ay)
                .filter(|f| *f != Flag::Inside)
                .map(|_| self.time(x - ax, y - ay));
            match (fwd, bwd) {
                (Some(f), Some(b)) => (f - b) * 0.5,
                (Some(f), None) => f - t,
                (None, Some(b)) => t - b,
                (None, None) => 0.0,
            }
        };
        (axis(1, 0), axis(0, 1))
    }
}

fn image_gradient(img: &[f32], field: &Field, x: isize, y: isize, c: usize) -> (f32, f32) {
    let px = |xx: isize, yy: isize| img[(yy as usize * field.w + xx as usize) * 3 + c];
    let usable = |xx: isize, yy: isize| field.flag(xx, yy).is_some_and(|f| f != Flag::Inside);
    let axis = |ax: isize, ay: isize| -> f32 {
        let fwd = usable(x + ax, y + ay);
        let bwd = usable(x - ax, y - ay);
        match (fwd, bwd) {
            (true, true) => (px(x + ax, y + ay) - px(x - ax, y - ay)) * 0.5,
            (true, false) => px(x + ax, y + ay) - px(x, y),
            (false, true) => px(x, y) - px(x - ax, y - ay),
            (false, false) => 0.0,
        }
    };
    (axis(1, 0), axis(0, 1))
}

/// Fills the non-zero pixels of `mask` in `src` from their surroundings.
///
/// Pixels with no known neighbour within reach of the marching front keep
/// their original value.
pub fn inpaint_telea(src: &RgbImage, mask: &GrayImage, radius: u32) -> Result<RgbImage> {
    if src.dimensions() != mask.dimensions() {
        return Err(ImgprocError::DimensionMismatch(format!(
            "inpaint mask {:?} does not match image {:?}",
            mask.dimensions(),
            src.dimensions()
        )));
    }
    let (w, h) = (src.width() as usize, src.height() as usize);
    let mut out: Vec<f32> = src.as_raw().iter().map(|&v| v as f32).collect();

    // The initial narrow band is the one-pixel cross dilation of the hole.
    let grown = dilate(mask, &create_morph_kernel(MorphShape::Cross, 3, 3), 1);
    let mut field = Field {
        w,
        h,
        flags: vec![Flag::Known; w * h],
        t: vec![0.0; w * h],
    };
    let mut heap = BinaryHeap::new();
    for i in 0..w * h {
        if mask.as_raw()[i] != 0 {
            field.flags[i] = Flag::Inside;
            field.t[i] = FAR;
        } else if grown.as_raw()[i] != 0 {
            field.flags[i] = Flag::Band;
            heap.push(Narrow { t: 0.0, idx: i });
        }
    }

    let r = radius.max(1) as isize;
    while let Some(Narrow { idx, .. }) = heap.pop() {
        if field.flags[idx] == Flag::Known {
            continue;
        }
        field.flags[idx] = Flag::Known;
        let (cx, cy) = ((idx % w) as isize, (idx / w) as isize);

        for (nx, ny) in [(cx - 1, cy), (cx, cy - 1), (cx + 1, cy), (cx, cy + 1)] {
            if field.flag(nx, ny) != Some(Flag::Inside) {
                continue;
            }
            let nidx = ny as usize * w + nx as usize;
            let t = field.arrival(nx, ny);
            field.t[nidx] = t;
            fill_pixel(&mut out, &field, nx, ny, r);
            field.flags[nidx] = Flag::Band;
            heap.push(Narrow { t, idx: nidx });
        }
    }

    let data = out
        .into_iter()
        .map(|v| v.round().clamp(0.0, 255.0) as u8)
        .collect();
    RgbImage::from_raw(src.width(), src.height(), data)
        .ok_or_else(|| ImgprocError::AlgorithmError("inpaint output buffer".into()))
}

fn fill_pixel(out: &mut [f32], field: &Field, x: isize, y: isize, r: isize) {
    let (gtx, gty) = field.grad_t(x, y);
    let t_here = field.time(x, y);
    let mut acc = [0.0f32; 3];
    let mut lo = [f32::MAX; 3];
    let mut hi = [f32::MIN; 3];
    let mut wsum = 0.0f32;

    for ky in (y - r)..=(y + r) {
        for kx in (x - r)..=(x + r) {
            match field.flag(kx, ky) {
                Some(Flag::Inside) | None => continue,
                _ => {}
            }
            let (rx, ry) = ((x - kx) as f32, (y - ky) as f32);
            let len2 = rx * rx + ry * ry;
            if len2 == 0.0 || len2 > (r * r) as f32 {
                continue;
            }
            let dst = 1.0 / (len2 * len2.sqrt());
            let lev = 1.0 / (1.0 + (field.time(kx, ky) - t_here).abs());
            let mut dir = rx * gtx + ry * gty;
            if dir.abs() <= 0.01 {
                dir = 1.0e-6;
            }
            let weight = (dir * dst * lev).abs();

            for (c, a) in acc.iter_mut().enumerate() {
                let (gx, gy) = image_gradient(out, field, kx, ky, c);
                let base = out[(ky as usize * field.w + kx as usize) * 3 + c];
                *a += weight * (base + gx * rx + gy * ry);
                lo[c] = lo[c].min(base);
                hi[c] = hi[c].max(base);
            }
            wsum += weight;
        }
    }

    if wsum > 0.0 {
        let i = (y as usize * field.w + x as usize) * 3;
        // The gradient term may not push the fill outside its sources.
        for c in 0..3 {
            out[i + c] = (acc[c] / wsum).clamp(lo[c], hi[c]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn fills_hole_in_flat_image() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([80, 140, 30]));
        let mut mask = GrayImage::new(20, 20);
        for y in 6..14 {
            for x in 5..15 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let out = inpaint_telea(&img, &mask, 3).unwrap();
        for p in out.pixels() {
            for (a, b) in p.0.iter().zip([80u8, 140, 30]) {
                assert!((*a as i32 - b as i32).abs() <= 1, "{:?}", p.0);
            }
        }
    }

    #[test]
    fn known_pixels_untouched() {
        let mut img = RgbImage::new(8, 8);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgb([(x * 30) as u8, (y * 30) as u8, 7]);
        }
        let mut mask = GrayImage::new(8, 8);
        mask.put_pixel(3, 3, Luma([255]));
        let out = inpaint_telea(&img, &mask, 3).unwrap();
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(0, 0));
        assert_eq!(out.get_pixel(7, 5), img.get_pixel(7, 5));
        let filled = out.get_pixel(3, 3).0;
        assert!((filled[0] as i32 - 90).abs() <= 10);
        assert!((filled[1] as i32 - 90).abs() <= 10);
    }

    #[test]
    fn fill_stays_within_source_range_beside_dark_ramp() {
        // Known values fall steeply towards the hole; extrapolating that
        // slope would run into black.
        let mut img = RgbImage::new(30, 30);
        let mut mask = GrayImage::new(30, 30);
        for (x, y, p) in img.enumerate_pixels_mut() {
            if x >= 15 && y >= 15 {
                mask.put_pixel(x, y, Luma([255]));
            } else {
                let v = (40 + 6 * (29 - x.max(y))) as u8;
                *p = Rgb([v, v, v]);
            }
        }
        let out = inpaint_telea(&img, &mask, 3).unwrap();
        for (x, y, p) in out.enumerate_pixels() {
            if mask.get_pixel(x, y)[0] != 0 {
                assert!(p.0[0] >= 40, "({x}, {y}) = {:?}", p.0);
            }
        }
    }

    #[test]
    fn rejects_mismatched_mask() {
        let img = RgbImage::new(4, 4);
        let mask = GrayImage::new(3, 4);
        assert!(inpaint_telea(&img, &mask, 3).is_err());
    }
}
