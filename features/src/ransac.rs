//! RANSAC (Random Sample Consensus) for geometric verification
//!
//! Homography estimation from point correspondences with a normalized DLT,
//! driven by the generic engine in `cv_core::robust`.

use cv_core::{Ransac, RobustConfig, RobustModel, RobustResult};
use nalgebra::{DMatrix, Matrix3, Vector3};

pub type RansacConfig = RobustConfig;
pub type RansacResult<M> = RobustResult<M>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchPair {
    pub src: (f64, f64),
    pub dst: (f64, f64),
}

impl MatchPair {
    pub fn new(src: (f64, f64), dst: (f64, f64)) -> Self {
        Self { src, dst }
    }
}

pub struct HomographyEstimator;

impl RobustModel<MatchPair> for HomographyEstimator {
    type Model = Matrix3<f64>;

    fn min_sample_size(&self) -> usize {
        4
    }

    fn estimate(&self, data: &[&MatchPair]) -> Option<Self::Model> {
        homography_dlt(data)
    }

    fn compute_error(&self, model: &Self::Model, data: &MatchPair) -> f64 {
        let p2_pred = model * Vector3::new(data.src.0, data.src.1, 1.0);
        if p2_pred[2].abs() > 1e-10 {
            let x2_pred = p2_pred[0] / p2_pred[2];
            let y2_pred = p2_pred[1] / p2_pred[2];
            ((x2_pred - data.dst.0).powi(2) + (y2_pred - data.dst.1).powi(2)).sqrt()
        } else {
            f64::INFINITY
        }
    }

    fn refine(&self, data: &[&MatchPair], _model: &Self::Model) -> Option<Self::Model> {
        homography_dlt(data)
    }
}

/// Similarity transform moving the centroid to the origin with mean
/// distance `sqrt(2)`.
fn normalizer(points: impl Iterator<Item = (f64, f64)> + Clone) -> Option<Matrix3<f64>> {
    let n = points.clone().count() as f64;
    if n == 0.0 {
        return None;
    }
    let (sx, sy) = points.clone().fold((0.0, 0.0), |(a, b), (x, y)| (a + x, b + y));
    let (cx, cy) = (sx / n, sy / n);
    let mean_dist = points
        .map(|(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

/// Least-squares homography (`dst ~ H·src`) from at least four pairs.
pub fn homography_dlt(data: &[&MatchPair]) -> Option<Matrix3<f64>> {
    if data.len() < 4 {
        return None;
    }
    let t_src = normalizer(data.iter().map(|m| m.src))?;
    let t_dst = normalizer(data.iter().map(|m| m.dst))?;

    let rows = data.len() * 2;
    let mut a = DMatrix::<f64>::zeros(rows.max(9), 9);
    for (i, m) in data.iter().enumerate() {
        let p1 = t_src * Vector3::new(m.src.0, m.src.1, 1.0);
        let p2 = t_dst * Vector3::new(m.dst.0, m.dst.1, 1.0);
        let (x1, y1, x2, y2) = (p1.x, p1.y, p2.x, p2.y);
        let r1 = i * 2;
        let r2 = r1 + 1;
        a[(r1, 0)] = -x1;
        a[(r1, 1)] = -y1;
        a[(r1, 2)] = -1.0;
        a[(r1, 6)] = x2 * x1;
        a[(r1, 7)] = x2 * y1;
        a[(r1, 8)] = x2;
        a[(r2, 3)] = -x1;
        a[(r2, 4)] = -y1;
        a[(r2, 5)] = -1.0;
        a[(r2, 6)] = y2 * x1;
        a[(r2, 7)] = y2 * y1;
        a[(r2, 8)] = y2;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let min_idx = svd.singular_values.argmin().0;
    let h = v_t.row(min_idx);
    let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let h = t_dst.try_inverse()? * hn * t_src;
    if !h.iter().all(|v| v.is_finite()) || h.determinant().abs() < 1e-12 {
        return None;
    }
    let scale = if h[(2, 2)].abs() > 1e-12 { h[(2, 2)] } else { h.norm() };
    Some(h / scale)
}

/// Estimate homography using RANSAC
pub fn estimate_homography(pairs: &[MatchPair], config: &RansacConfig) -> RansacResult<Matrix3<f64>> {
    Ransac::new(config.clone()).run(&HomographyEstimator, pairs)
}
