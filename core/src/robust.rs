//! Robust Estimation Module
//!
//! Generic RANSAC with a seeded sampler so that repeated runs over the same
//! data produce the same model.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use std::marker::PhantomData;

/// Configuration for robust estimation
#[derive(Debug, Clone)]
pub struct RobustConfig {
    pub threshold: f64,
    pub max_iterations: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0x5eed_cafe,
        }
    }
}

/// Result of robust estimation
#[derive(Debug, Clone)]
pub struct RobustResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    pub residual: f64,
}

impl<M> RobustResult<M> {
    fn failed(n: usize) -> Self {
        Self {
            model: None,
            inliers: vec![false; n],
            num_inliers: 0,
            residual: f64::INFINITY,
        }
    }
}

/// Trait for models that can be estimated robustly
pub trait RobustModel<D> {
    type Model: Clone;

    /// Minimum number of data points required to estimate the model
    fn min_sample_size(&self) -> usize;

    /// Estimate model from a minimal sample
    fn estimate(&self, data: &[&D]) -> Option<Self::Model>;

    /// Compute error for a single data point against the model
    fn compute_error(&self, model: &Self::Model, data: &D) -> f64;

    /// Re-fit on the full inlier set. Defaults to keeping the sample model.
    fn refine(&self, _data: &[&D], model: &Self::Model) -> Option<Self::Model> {
        Some(model.clone())
    }
}

/// Number of iterations needed to hit `confidence` given an inlier ratio.
pub fn adaptive_iterations(confidence: f64, inlier_ratio: f64, sample_size: usize, cap: usize) -> usize {
    if inlier_ratio <= 0.0 {
        return cap;
    }
    let p_good = inlier_ratio.powi(sample_size as i32);
    if p_good >= 1.0 {
        return 1;
    }
    let num = (1.0 - confidence).max(f64::MIN_POSITIVE).ln();
    let den = (1.0 - p_good).ln();
    if den >= 0.0 {
        return cap;
    }
    ((num / den).ceil() as usize).clamp(1, cap)
}

/// Generic RANSAC engine
pub struct Ransac<D, M: RobustModel<D>> {
    config: RobustConfig,
    _phantom: PhantomData<(D, M)>,
}

impl<D, M: RobustModel<D>> Ransac<D, M> {
    pub fn new(config: RobustConfig) -> Self {
        Self {
            config,
            _phantom: PhantomData,
        }
    }

    pub fn run(&self, estimator: &M, data: &[D]) -> RobustResult<M::Model> {
        let n = data.len();
        let k = estimator.min_sample_size();

        if n < k || k == 0 {
            return RobustResult::failed(n);
        }

        let mut best: RobustResult<M::Model> = RobustResult::failed(n);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut budget = self.config.max_iterations;
        let mut iter = 0;

        while iter < budget {
            iter += 1;
            let idx = sample(&mut rng, n, k);
            let subset: Vec<&D> = idx.iter().map(|i| &data[i]).collect();

            let Some(model) = estimator.estimate(&subset) else {
                continue;
            };
            let (inliers, num_inliers, residual) = self.score(estimator, &model, data);

            if num_inliers > best.num_inliers
                || (num_inliers == best.num_inliers && num_inliers > 0 && residual < best.residual)
            {
                best = RobustResult {
                    model: Some(model),
                    inliers,
                    num_inliers,
                    residual,
                };
                budget = adaptive_iterations(
                    self.config.confidence,
                    num_inliers as f64 / n as f64,
                    k,
                    self.config.max_iterations,
                );
            }
        }

        // Final least-squares pass over the consensus set.
        if let Some(model) = best.model.clone() {
            if best.num_inliers >= k {
                let inlier_data: Vec<&D> = data
                    .iter()
                    .zip(&best.inliers)
                    .filter(|(_, &ok)| ok)
                    .map(|(d, _)| d)
                    .collect();
                if let Some(refined) = estimator.refine(&inlier_data, &model) {
                    let (inliers, num_inliers, residual) = self.score(estimator, &refined, data);
                    if num_inliers >= best.num_inliers {
                        best = RobustResult {
                            model: Some(refined),
                            inliers,
                            num_inliers,
                            residual,
                        };
                    }
                }
            }
        }

        best
    }

    fn score(&self, estimator: &M, model: &M::Model, data: &[D]) -> (Vec<bool>, usize, f64) {
        let mut inliers = vec![false; data.len()];
        let mut num_inliers = 0;
        let mut total_error = 0.0;
        for (j, d) in data.iter().enumerate() {
            let err = estimator.compute_error(model, d);
            if err.is_finite() && err < self.config.threshold {
                inliers[j] = true;
                num_inliers += 1;
                total_error += err;
            }
        }
        let residual = if num_inliers > 0 {
            total_error / num_inliers as f64
        } else {
            f64::INFINITY
        };
        (inliers, num_inliers, residual)
    }
}
