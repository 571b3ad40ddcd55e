use cv_core::KeyPoint;
use image::GrayImage;
use rayon::prelude::*;

/// Bresenham circle of radius 3, clockwise from 12 o'clock.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Contiguous arc length required for a corner (FAST-9).
const ARC: usize = 9;

fn has_arc(flags: &[bool; 16]) -> bool {
    let mut run = 0;
    for i in 0..16 + ARC {
        if flags[i % 16] {
            run += 1;
            if run >= ARC {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// FAST score at `(x, y)`: the larger of the summed excesses of the bright
/// and dark ring pixels, or 0 when the pixel is not a FAST-9 corner.
/// The caller guarantees a 3-pixel margin.
pub fn fast_score(image: &GrayImage, x: i32, y: i32, threshold: u8) -> u32 {
    let w = image.width() as i32;
    let raw = image.as_raw();
    let p = raw[(y * w + x) as usize] as i32;
    let t = threshold as i32;

    let mut bright = [false; 16];
    let mut dark = [false; 16];
    let mut bright_sum = 0u32;
    let mut dark_sum = 0u32;
    for (i, &(dx, dy)) in CIRCLE.iter().enumerate() {
        let v = raw[((y + dy) * w + x + dx) as usize] as i32;
        if v > p + t {
            bright[i] = true;
            bright_sum += (v - p - t) as u32;
        } else if v < p - t {
            dark[i] = true;
            dark_sum += (p - t - v) as u32;
        }
    }

    let mut score = 0;
    if has_arc(&bright) {
        score = bright_sum;
    }
    if has_arc(&dark) {
        score = score.max(dark_sum);
    }
    score
}

/// FAST-9 corners at least `border` pixels from every edge, with optional
/// 3×3 non-maximum suppression. `response` holds the FAST score.
pub fn fast_detect(image: &GrayImage, threshold: u8, border: u32, nonmax: bool) -> Vec<KeyPoint> {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let margin = border.max(3) as i32;
    if w <= 2 * margin || h <= 2 * margin {
        return Vec::new();
    }

    let mut scores = vec![0u32; (w * h) as usize];
    scores
        .par_chunks_mut(w as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            if y < margin || y >= h - margin {
                return;
            }
            for x in margin..w - margin {
                row[x as usize] = fast_score(image, x, y, threshold);
            }
        });

    let mut keypoints = Vec::new();
    for y in margin..h - margin {
        for x in margin..w - margin {
            let idx = (y * w + x) as usize;
            let s = scores[idx];
            if s == 0 {
                continue;
            }
            if nonmax {
                let mut is_max = true;
                'nbr: for dy in -1..=1 {
                    for dx in -1..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nidx = ((y + dy) * w + x + dx) as usize;
                        let ns = scores[nidx];
                        // Ties go to the earlier pixel in scan order.
                        if ns > s || (ns == s && nidx < idx) {
                            is_max = false;
                            break 'nbr;
                        }
                    }
                }
                if !is_max {
                    continue;
                }
            }
            keypoints.push(KeyPoint::new(x as f64, y as f64).with_response(s as f64));
        }
    }
    keypoints
}
