//! Pairwise best-of-2-nearest matching with homography verification.

use crate::ransac::{estimate_homography, MatchPair, RansacConfig};
use crate::ImageFeatures;
use cv_core::{packed_hamming, FeatureMatch, MatchesInfo, PackedDescriptor, PairwiseMatches};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Raw matches (and RANSAC inliers) needed before a pair gets a confidence.
const MIN_MATCHES: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Ratio-test confidence: a match survives when `d1 < (1 - match_conf) * d2`.
    pub match_conf: f32,
    pub ransac_threshold_px: f64,
    pub min_inliers: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_conf: 0.15,
            ransac_threshold_px: 3.0,
            min_inliers: MIN_MATCHES,
        }
    }
}

impl MatcherConfig {
    pub fn with_match_conf(mut self, match_conf: f32) -> Self {
        self.match_conf = match_conf;
        self
    }

    pub fn with_ransac_threshold(mut self, px: f64) -> Self {
        self.ransac_threshold_px = px;
        self
    }
}

/// Matches every image pair; keeps packed descriptors between calls until
/// [`collect_garbage`](Self::collect_garbage).
pub struct BestOf2NearestMatcher {
    config: MatcherConfig,
    packed: Vec<Vec<PackedDescriptor>>,
}

impl BestOf2NearestMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            packed: Vec::new(),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Full pairwise table over `features`, pairs evaluated in parallel.
    pub fn match_all(&mut self, features: &[ImageFeatures]) -> PairwiseMatches {
        self.packed = features.iter().map(|f| f.descriptors.packed()).collect();

        let n = features.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();

        let packed = &self.packed;
        let config = &self.config;
        let infos: Vec<MatchesInfo> = pairs
            .par_iter()
            .map(|&(i, j)| match_pair(config, &features[i], &features[j], &packed[i], &packed[j], i, j))
            .collect();

        let mut table = PairwiseMatches::new(n);
        for info in infos {
            debug!(
                src = info.src_img,
                dst = info.dst_img,
                matches = info.matches.len(),
                inliers = info.num_inliers,
                confidence = info.confidence,
                "pair matched"
            );
            table.insert(info);
        }
        table
    }

    /// Drops the packed-descriptor cache.
    pub fn collect_garbage(&mut self) {
        self.packed = Vec::new();
    }

    pub fn has_cached_descriptors(&self) -> bool {
        !self.packed.is_empty()
    }
}

/// Best and second-best train index for each query descriptor, filtered by
/// the ratio test.
fn ratio_matches(
    query: &[PackedDescriptor],
    train: &[PackedDescriptor],
    match_conf: f32,
) -> Vec<FeatureMatch> {
    let mut out = Vec::new();
    if train.len() < 2 {
        return out;
    }
    for (qi, q) in query.iter().enumerate() {
        let mut best = (usize::MAX, u32::MAX);
        let mut second = u32::MAX;
        for (ti, t) in train.iter().enumerate() {
            let d = packed_hamming(q, t);
            if d < best.1 {
                second = best.1;
                best = (ti, d);
            } else if d < second {
                second = d;
            }
        }
        if (best.1 as f32) < (1.0 - match_conf) * second as f32 {
            out.push(FeatureMatch::new(qi, best.0, best.1 as f32));
        }
    }
    out
}

pub(crate) fn match_pair(
    config: &MatcherConfig,
    f1: &ImageFeatures,
    f2: &ImageFeatures,
    d1: &[PackedDescriptor],
    d2: &[PackedDescriptor],
    src: usize,
    dst: usize,
) -> MatchesInfo {
    let mut info = MatchesInfo::empty(src, dst);

    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    for m in ratio_matches(d1, d2, config.match_conf) {
        if seen.insert((m.query_idx, m.train_idx)) {
            matches.push(m);
        }
    }
    for m in ratio_matches(d2, d1, config.match_conf) {
        let m = m.swapped();
        if seen.insert((m.query_idx, m.train_idx)) {
            matches.push(m);
        }
    }

    if matches.len() < MIN_MATCHES {
        return info;
    }

    let (c1x, c1y) = (f1.width as f64 * 0.5, f1.height as f64 * 0.5);
    let (c2x, c2y) = (f2.width as f64 * 0.5, f2.height as f64 * 0.5);
    let data: Vec<MatchPair> = matches
        .iter()
        .map(|m| {
            let p = &f1.keypoints[m.query_idx];
            let q = &f2.keypoints[m.train_idx];
            MatchPair::new((p.x - c1x, p.y - c1y), (q.x - c2x, q.y - c2y))
        })
        .collect();

    let ransac = estimate_homography(
        &data,
        &RansacConfig {
            threshold: config.ransac_threshold_px,
            ..RansacConfig::default()
        },
    );

    info.matches = matches;
    let Some(h) = ransac.model else {
        info.inliers = vec![false; info.matches.len()];
        return info;
    };

    info.h = Some(h);
    info.inliers = ransac.inliers;
    info.num_inliers = ransac.num_inliers;

    let mut confidence = info.num_inliers as f64 / (8.0 + 0.3 * info.matches.len() as f64);
    // Near-identical images produce implausibly high confidence.
    if confidence > 3.0 {
        confidence = 0.0;
    }
    if info.num_inliers < config.min_inliers.max(MIN_MATCHES) {
        confidence = 0.0;
    }
    info.confidence = confidence;
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(bits: u64) -> PackedDescriptor {
        [bits, 0, 0, 0]
    }

    #[test]
    fn ratio_test_rejects_ambiguous() {
        let query = vec![desc(0b1111), desc(0)];
        // First query: distances 0 and 8, kept. Second query: equal distances, rejected.
        let train = vec![desc(0b1111), desc(0b1111_0000_0000)];
        let out = ratio_matches(&query, &train, 0.3);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].query_idx, 0);
        assert_eq!(out[0].train_idx, 0);
    }

    #[test]
    fn single_train_descriptor_gives_nothing() {
        assert!(ratio_matches(&[desc(1)], &[desc(1)], 0.3).is_empty());
    }

    #[test]
    fn garbage_collection_clears_cache() {
        let mut m = BestOf2NearestMatcher::new(MatcherConfig::default());
        let f = ImageFeatures::empty(0, 10, 10);
        let _ = m.match_all(&[f.clone(), f]);
        m.collect_garbage();
        assert!(!m.has_cached_descriptors());
    }
}
