//! ORB (Oriented FAST and Rotated BRIEF) implementation
//!
//! FAST corners ranked by Harris response over a scale pyramid, oriented by
//! intensity centroid, described by a steered BRIEF test pattern. The
//! pattern is generated from a fixed seed so descriptors from different
//! images (and different runs) are comparable.

use crate::fast::fast_detect;
use crate::harris::harris_response;
use crate::FeatureConfig;
use cv_core::{Descriptor, Descriptors, KeyPoint, DESCRIPTOR_BYTES};
use cv_imgproc::{gaussian_blur, resize, Interpolation};
use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::OnceLock;

const PATCH_SIZE: i32 = 31;
const HALF_PATCH: i32 = PATCH_SIZE / 2;
const HARRIS_BLOCK: i32 = 7;
const HARRIS_K: f64 = 0.04;
const PATTERN_SEED: u64 = 0x0b5e_55ed;
/// Test points stay inside this radius so a rotated test never leaves the patch.
const PATTERN_EXTENT: i32 = 13;

static PATTERN: OnceLock<Vec<[i32; 4]>> = OnceLock::new();

fn brief_pattern() -> &'static [[i32; 4]] {
    PATTERN.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        (0..DESCRIPTOR_BYTES * 8)
            .map(|_| {
                [
                    rng.gen_range(-PATTERN_EXTENT..=PATTERN_EXTENT),
                    rng.gen_range(-PATTERN_EXTENT..=PATTERN_EXTENT),
                    rng.gen_range(-PATTERN_EXTENT..=PATTERN_EXTENT),
                    rng.gen_range(-PATTERN_EXTENT..=PATTERN_EXTENT),
                ]
            })
            .collect()
    })
}

/// Half-widths of the circular orientation patch per row offset.
fn circle_extents() -> Vec<i32> {
    (0..=HALF_PATCH)
        .map(|dy| (((HALF_PATCH * HALF_PATCH - dy * dy) as f64).sqrt().round()) as i32)
        .collect()
}

/// ORB feature detector and descriptor
#[derive(Debug, Clone)]
pub struct Orb {
    n_features: usize,
    scale_factor: f32,
    n_levels: usize,
    edge_threshold: i32,
    fast_threshold: u8,
}

impl Default for Orb {
    fn default() -> Self {
        Self::from_config(&FeatureConfig::default())
    }
}

impl Orb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &FeatureConfig) -> Self {
        Self {
            n_features: config.n_features,
            scale_factor: config.scale_factor,
            n_levels: config.n_levels.max(1),
            edge_threshold: config.edge_threshold.max(PATCH_SIZE as u32) as i32,
            fast_threshold: config.fast_threshold,
        }
    }

    pub fn with_n_features(mut self, n: usize) -> Self {
        self.n_features = n;
        self
    }

    pub fn with_n_levels(mut self, n: usize) -> Self {
        self.n_levels = n.max(1);
        self
    }

    pub fn with_fast_threshold(mut self, threshold: u8) -> Self {
        self.fast_threshold = threshold;
        self
    }

    /// Feature budget per pyramid level, geometric in the scale factor.
    fn features_per_level(&self) -> Vec<usize> {
        let factor = 1.0 / self.scale_factor as f64;
        let mut desired = self.n_features as f64 * (1.0 - factor)
            / (1.0 - factor.powi(self.n_levels as i32));
        if !desired.is_finite() {
            desired = self.n_features as f64 / self.n_levels as f64;
        }
        let mut out = Vec::with_capacity(self.n_levels);
        let mut sum = 0usize;
        for _ in 0..self.n_levels.saturating_sub(1) {
            let n = desired.round() as usize;
            out.push(n);
            sum += n;
            desired *= factor;
        }
        out.push(self.n_features.saturating_sub(sum));
        out
    }

    /// Detects keypoints and computes their descriptors. Coordinates are in
    /// the input image's frame; `keypoints[i]` is described by
    /// `descriptors.descriptors[i]`.
    pub fn detect_and_compute(&self, image: &GrayImage) -> (Vec<KeyPoint>, Descriptors) {
        let budgets = self.features_per_level();
        let extents = circle_extents();
        let mut keypoints = Vec::new();
        let mut descriptors = Descriptors::with_capacity(self.n_features);
        let mut scale = 1.0f64;

        for (level, &budget) in budgets.iter().enumerate() {
            let level_img = if level == 0 {
                image.clone()
            } else {
                let w = (image.width() as f64 / scale).round() as u32;
                let h = (image.height() as f64 / scale).round() as u32;
                resize(image, w, h, Interpolation::Linear)
            };
            let min_side = 2 * self.edge_threshold as u32 + 1;
            if budget == 0 || level_img.width() < min_side || level_img.height() < min_side {
                scale *= self.scale_factor as f64;
                continue;
            }

            let mut candidates = fast_detect(
                &level_img,
                self.fast_threshold,
                self.edge_threshold as u32,
                true,
            );
            // Keep the strongest FAST responses, then rank those by Harris.
            candidates.sort_by(|a, b| b.response.total_cmp(&a.response));
            candidates.truncate(budget * 2);
            for kp in &mut candidates {
                kp.response =
                    harris_response(&level_img, kp.x as i32, kp.y as i32, HARRIS_BLOCK, HARRIS_K);
            }
            candidates.sort_by(|a, b| b.response.total_cmp(&a.response));
            candidates.truncate(budget);

            let blurred = gaussian_blur(&level_img, 7, 2.0);
            for kp in candidates {
                let angle = ic_angle(&level_img, kp.x as i32, kp.y as i32, &extents);
                let desc = steered_brief(&blurred, kp.x as i32, kp.y as i32, angle);
                keypoints.push(
                    KeyPoint::new(kp.x * scale, kp.y * scale)
                        .with_size(PATCH_SIZE as f64 * scale)
                        .with_angle(angle.to_degrees().rem_euclid(360.0))
                        .with_response(kp.response)
                        .with_octave(level as i32),
                );
                descriptors.push(desc);
            }

            scale *= self.scale_factor as f64;
        }

        (keypoints, descriptors)
    }
}

/// Orientation of the intensity centroid of the circular patch, in radians.
fn ic_angle(image: &GrayImage, x: i32, y: i32, extents: &[i32]) -> f64 {
    let w = image.width() as i32;
    let raw = image.as_raw();
    let px = |xx: i32, yy: i32| raw[(yy * w + xx) as usize] as f64;

    let mut m01 = 0.0f64;
    let mut m10 = 0.0f64;
    for dx in -HALF_PATCH..=HALF_PATCH {
        m10 += dx as f64 * px(x + dx, y);
    }
    for dy in 1..=HALF_PATCH {
        let ext = extents[dy as usize];
        for dx in -ext..=ext {
            let below = px(x + dx, y + dy);
            let above = px(x + dx, y - dy);
            m10 += dx as f64 * (below + above);
            m01 += dy as f64 * (below - above);
        }
    }
    m01.atan2(m10)
}

fn steered_brief(blurred: &GrayImage, x: i32, y: i32, angle: f64) -> Descriptor {
    let w = blurred.width() as i32;
    let raw = blurred.as_raw();
    let (sin_a, cos_a) = angle.sin_cos();
    let sample = |px: i32, py: i32| -> u8 {
        let col = (px as f64 * cos_a - py as f64 * sin_a).round() as i32;
        let row = (px as f64 * sin_a + py as f64 * cos_a).round() as i32;
        raw[((y + row) * w + x + col) as usize]
    };

    let mut data = vec![0u8; DESCRIPTOR_BYTES];
    for (bit, &[x1, y1, x2, y2]) in brief_pattern().iter().enumerate() {
        if sample(x1, y1) < sample(x2, y2) {
            data[bit / 8] |= 1 << (bit % 8);
        }
    }
    Descriptor::new(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn create_test_image() -> GrayImage {
        let size = 160u32;
        let mut img = GrayImage::new(size, size);
        let mut rng = StdRng::seed_from_u64(7);
        let cells: Vec<u8> = (0..40 * 40).map(|_| rng.gen()).collect();
        for y in 0..size {
            for x in 0..size {
                img.put_pixel(x, y, Luma([cells[((y / 4) * 40 + x / 4) as usize]]));
            }
        }
        img
    }

    #[test]
    fn pattern_is_stable_and_bounded() {
        let a = brief_pattern();
        assert_eq!(a.len(), 256);
        assert!(a.iter().flatten().all(|v| v.abs() <= PATTERN_EXTENT));
        assert_eq!(a.as_ptr(), brief_pattern().as_ptr());
    }

    #[test]
    fn level_budget_sums_to_total() {
        let orb = Orb::new().with_n_features(1500).with_n_levels(5);
        let budgets = orb.features_per_level();
        assert_eq!(budgets.len(), 5);
        assert_eq!(budgets.iter().sum::<usize>(), 1500);
        assert!(budgets[0] > budgets[4]);
    }

    #[test]
    fn detection_is_deterministic() {
        let img = create_test_image();
        let orb = Orb::new().with_n_features(200);
        let (k1, d1) = orb.detect_and_compute(&img);
        let (k2, d2) = orb.detect_and_compute(&img);
        assert!(!k1.is_empty());
        assert_eq!(k1.len(), d1.len());
        assert_eq!(k1, k2);
        assert_eq!(d1.descriptors, d2.descriptors);
        assert!(k1.len() <= 200);
    }
}
