//! Ray-space bundle adjustment of focal lengths and rotations.
//!
//! Each inlier correspondence contributes `sqrt(f_i f_j) · (ray_i − ray_j)`.
//! Camera 0 keeps its rotation as the gauge; the result is re-expressed
//! relative to the reference camera afterwards.

use crate::{Error, Result};
use cv_core::{rotation_from_vector, rotation_to_vector, CameraParams, PairwiseMatches};
use cv_features::ImageFeatures;
use nalgebra::{DMatrix, DVector, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleAdjustConfig {
    /// Pairs below this confidence are left out of the cost.
    pub conf_thresh: f64,
    pub max_iterations: usize,
    pub convergence_threshold: f64,
    pub lambda: f64,
}

impl Default for BundleAdjustConfig {
    fn default() -> Self {
        Self {
            conf_thresh: 0.15,
            max_iterations: 100,
            convergence_threshold: 1e-6,
            lambda: 0.001,
        }
    }
}

impl BundleAdjustConfig {
    pub fn with_conf_thresh(mut self, conf_thresh: f64) -> Self {
        self.conf_thresh = conf_thresh;
        self
    }
}

struct PairObservations {
    i: usize,
    j: usize,
    points: Vec<([f64; 2], [f64; 2])>,
}

/// Parameter vector layout: `n` focals, then a rotation vector for every
/// camera except the first.
struct Layout {
    n: usize,
}

impl Layout {
    fn len(&self) -> usize {
        self.n + 3 * (self.n - 1)
    }

    fn rotation_index(&self, cam: usize) -> Option<usize> {
        (cam > 0).then(|| self.n + 3 * (cam - 1))
    }

    fn pack(&self, cameras: &[CameraParams]) -> DVector<f64> {
        let mut p = DVector::zeros(self.len());
        for (c, cam) in cameras.iter().enumerate() {
            p[c] = cam.focal;
            if let Some(r) = self.rotation_index(c) {
                let v = rotation_to_vector(&cam.rotation);
                p[r] = v.x;
                p[r + 1] = v.y;
                p[r + 2] = v.z;
            }
        }
        p
    }

    fn unpack(&self, p: &DVector<f64>, base: &[CameraParams]) -> Vec<CameraParams> {
        base.iter()
            .enumerate()
            .map(|(c, cam)| {
                let mut out = *cam;
                out.focal = p[c];
                if let Some(r) = self.rotation_index(c) {
                    out.rotation = rotation_from_vector(&Vector3::new(p[r], p[r + 1], p[r + 2]));
                }
                out
            })
            .collect()
    }

    /// Global indices of the eight local parameters of a pair:
    /// `[f_i, f_j, r_i(3), r_j(3)]`.
    fn pair_indices(&self, i: usize, j: usize) -> [Option<usize>; 8] {
        let ri = self.rotation_index(i);
        let rj = self.rotation_index(j);
        [
            Some(i),
            Some(j),
            ri,
            ri.map(|r| r + 1),
            ri.map(|r| r + 2),
            rj,
            rj.map(|r| r + 1),
            rj.map(|r| r + 2),
        ]
    }
}

fn pair_residuals(obs: &PairObservations, ci: &CameraParams, cj: &CameraParams, out: &mut Vec<f64>) {
    out.clear();
    let scale = (ci.focal * cj.focal).sqrt();
    for (a, b) in &obs.points {
        let d = (ci.ray(a[0], a[1]) - cj.ray(b[0], b[1])) * scale;
        out.extend_from_slice(&[d.x, d.y, d.z]);
    }
}

fn local_cameras(
    obs: &PairObservations,
    local: &[f64; 8],
    cameras: &[CameraParams],
    layout: &Layout,
) -> (CameraParams, CameraParams) {
    let mut ci = cameras[obs.i];
    let mut cj = cameras[obs.j];
    ci.focal = local[0];
    cj.focal = local[1];
    if layout.rotation_index(obs.i).is_some() {
        ci.rotation = rotation_from_vector(&Vector3::new(local[2], local[3], local[4]));
    }
    if layout.rotation_index(obs.j).is_some() {
        cj.rotation = rotation_from_vector(&Vector3::new(local[5], local[6], local[7]));
    }
    (ci, cj)
}

/// `JᵀJ`, `Jᵀr` and `|r|²` for one pair, with a central-difference
/// Jacobian over the pair's own parameters only.
fn pair_normal_equations(
    obs: &PairObservations,
    params: &DVector<f64>,
    cameras: &[CameraParams],
    layout: &Layout,
) -> (DMatrix<f64>, DVector<f64>, f64) {
    let np = layout.len();
    let idx = layout.pair_indices(obs.i, obs.j);
    let mut local = [0.0; 8];
    for (k, g) in idx.iter().enumerate() {
        if let Some(g) = g {
            local[k] = params[*g];
        }
    }

    let mut r0 = Vec::with_capacity(obs.points.len() * 3);
    let (ci, cj) = local_cameras(obs, &local, cameras, layout);
    pair_residuals(obs, &ci, &cj, &mut r0);

    let mut columns: Vec<(usize, Vec<f64>)> = Vec::with_capacity(8);
    let mut plus = Vec::with_capacity(r0.len());
    let mut minus = Vec::with_capacity(r0.len());
    for (k, g) in idx.iter().enumerate() {
        let Some(g) = *g else { continue };
        let eps = 1e-6 * local[k].abs().max(1.0);
        let mut lp = local;
        lp[k] += eps;
        let (a, b) = local_cameras(obs, &lp, cameras, layout);
        pair_residuals(obs, &a, &b, &mut plus);
        let mut lm = local;
        lm[k] -= eps;
        let (a, b) = local_cameras(obs, &lm, cameras, layout);
        pair_residuals(obs, &a, &b, &mut minus);
        let col = plus
            .iter()
            .zip(&minus)
            .map(|(p, m)| (p - m) / (2.0 * eps))
            .collect();
        columns.push((g, col));
    }

    let mut jtj = DMatrix::zeros(np, np);
    let mut jtr = DVector::zeros(np);
    for (ga, ca) in &columns {
        jtr[*ga] += dot(ca, &r0);
        for (gb, cb) in &columns {
            jtj[(*ga, *gb)] += dot(ca, cb);
        }
    }
    (jtj, jtr, dot(&r0, &r0))
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn total_error(pairs: &[PairObservations], cameras: &[CameraParams]) -> f64 {
    pairs
        .par_iter()
        .map(|obs| {
            let mut r = Vec::with_capacity(obs.points.len() * 3);
            pair_residuals(obs, &cameras[obs.i], &cameras[obs.j], &mut r);
            dot(&r, &r)
        })
        .sum()
}

fn collect_observations(
    features: &[ImageFeatures],
    matches: &PairwiseMatches,
    conf_thresh: f64,
) -> Vec<PairObservations> {
    matches
        .upper_pairs()
        .filter(|m| m.confidence >= conf_thresh && m.confidence > 0.0 && m.num_inliers > 0)
        .map(|m| {
            let (fi, fj) = (&features[m.src_img], &features[m.dst_img]);
            let points = m
                .inlier_matches()
                .filter_map(|fm| {
                    let a = fi.keypoints.get(fm.query_idx)?;
                    let b = fj.keypoints.get(fm.train_idx)?;
                    Some(([a.x, a.y], [b.x, b.y]))
                })
                .collect();
            PairObservations {
                i: m.src_img,
                j: m.dst_img,
                points,
            }
        })
        .collect()
}

/// Refines `cameras` in place and returns the final RMS residual.
///
/// Afterwards every rotation is expressed relative to `reference`.
pub fn adjust_bundle(
    features: &[ImageFeatures],
    matches: &PairwiseMatches,
    cameras: &mut [CameraParams],
    reference: usize,
    config: &BundleAdjustConfig,
) -> Result<f64> {
    let n = cameras.len();
    if n < 2 || features.len() != n || matches.num_images() != n || reference >= n {
        return Err(Error::Adjustment(format!(
            "{n} cameras, {} feature sets, {} images in match table",
            features.len(),
            matches.num_images()
        )));
    }

    let layout = Layout { n };
    let pairs = collect_observations(features, matches, config.conf_thresh);
    let n_residuals: usize = pairs.iter().map(|p| p.points.len() * 3).sum();
    if n_residuals < layout.len() {
        return Err(Error::MatchGraph(format!(
            "{n_residuals} residuals cannot constrain {} camera parameters",
            layout.len()
        )));
    }

    let base: Vec<CameraParams> = cameras.to_vec();
    let mut current_params = layout.pack(&base);
    let mut current_cams = base.clone();
    let mut current_err = total_error(&pairs, &current_cams);
    if !current_err.is_finite() {
        return Err(Error::Adjustment("initial cost is not finite".into()));
    }
    let initial_err = current_err;
    let mut lambda = config.lambda;

    for iteration in 0..config.max_iterations {
        let np = layout.len();
        let (jtj, jtr, _) = pairs
            .par_iter()
            .map(|obs| pair_normal_equations(obs, &current_params, &current_cams, &layout))
            .reduce(
                || (DMatrix::zeros(np, np), DVector::zeros(np), 0.0),
                |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2),
            );

        let mut lhs = jtj;
        for i in 0..np {
            lhs[(i, i)] *= 1.0 + lambda;
        }
        let Some(delta) = solve_damped(lhs, &-&jtr) else {
            debug!(iteration, lambda, "damped system is singular");
            lambda *= 10.0;
            if lambda > 1e12 {
                debug!(iteration, "damping exhausted");
                break;
            }
            continue;
        };

        let next_params = &current_params + &delta;
        let next_cams = layout.unpack(&next_params, &base);
        let next_err = total_error(&pairs, &next_cams);

        if next_err.is_finite() && next_err < current_err {
            current_params = next_params;
            current_cams = next_cams;
            current_err = next_err;
            lambda /= 10.0;
            if delta.norm() < config.convergence_threshold {
                debug!(iteration, "bundle adjustment converged");
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                debug!(iteration, "damping exhausted");
                break;
            }
        }
    }

    if current_cams.iter().any(|c| !c.is_finite() || c.focal <= 0.0) {
        return Err(Error::Adjustment("refined camera is not finite".into()));
    }
    if current_err > initial_err {
        return Err(Error::Adjustment(format!(
            "cost diverged from {initial_err:.3} to {current_err:.3}"
        )));
    }

    let r_ref_inv = current_cams[reference].rotation.transpose();
    for (dst, cam) in cameras.iter_mut().zip(&current_cams) {
        *dst = *cam;
        dst.rotation = r_ref_inv * cam.rotation;
    }

    let rms = (current_err / n_residuals as f64).sqrt();
    info!(
        rms,
        initial_rms = (initial_err / n_residuals as f64).sqrt(),
        pairs = pairs.len(),
        "bundle adjustment done"
    );
    Ok(rms)
}

/// Cholesky solve of the damped normal equations, LU when that fails.
fn solve_damped(lhs: DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    match lhs.clone().cholesky() {
        Some(ch) => Some(ch.solve(rhs)),
        None => lhs.lu().solve(rhs),
    }
}
