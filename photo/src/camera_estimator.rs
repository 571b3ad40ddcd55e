//! Initial camera parameters from pairwise homographies.
//!
//! Focal lengths come from the rotation-only homography constraints, and
//! rotations are chained outward from the center of the maximum spanning
//! tree (by inlier count) of the match graph.

use crate::{Error, Result};
use cv_core::{orthonormalize, CameraParams, PairwiseMatches};
use cv_features::ImageFeatures;
use nalgebra::Matrix3;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Focal estimates `(f0, f1)` implied by a homography between two views of
/// a purely rotating camera, in the centered-pixel convention.
pub fn focals_from_homography(h: &Matrix3<f64>) -> (Option<f64>, Option<f64>) {
    let h = [
        h[(0, 0)],
        h[(0, 1)],
        h[(0, 2)],
        h[(1, 0)],
        h[(1, 1)],
        h[(1, 2)],
        h[(2, 0)],
        h[(2, 1)],
        h[(2, 2)],
    ];

    let pick = |d1: f64, d2: f64, v1: f64, v2: f64| -> Option<f64> {
        let (v1, v2) = if v1 < v2 { (v2, v1) } else { (v1, v2) };
        if v1 > 0.0 && v2 > 0.0 {
            Some(if d1.abs() > d2.abs() { v1 } else { v2 }.sqrt())
        } else if v1 > 0.0 {
            Some(v1.sqrt())
        } else {
            None
        }
    };

    let d1 = h[6] * h[7];
    let d2 = (h[7] - h[6]) * (h[7] + h[6]);
    let v1 = -(h[0] * h[1] + h[3] * h[4]) / d1;
    let v2 = (h[0] * h[0] + h[3] * h[3] - h[1] * h[1] - h[4] * h[4]) / d2;
    let f1 = pick(d1, d2, v1, v2).filter(|f| f.is_finite());

    let d1 = h[0] * h[3] + h[1] * h[4];
    let d2 = h[0] * h[0] + h[1] * h[1] - h[3] * h[3] - h[4] * h[4];
    let v1 = -h[2] * h[5] / d1;
    let v2 = (h[5] * h[5] - h[2] * h[2]) / d2;
    let f0 = pick(d1, d2, v1, v2).filter(|f| f.is_finite());

    (f0, f1)
}

/// Common focal for every camera: median of the pairwise estimates when
/// there are enough of them, else the mean of `width + height`.
pub fn estimate_focal(features: &[ImageFeatures], matches: &PairwiseMatches) -> f64 {
    let n = features.len();
    let mut focals = Vec::new();
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let info = matches.get(i, j);
            if info.confidence <= 0.0 {
                continue;
            }
            if let Some(h) = &info.h {
                if let (Some(f0), Some(f1)) = focals_from_homography(h) {
                    focals.push((f0 * f1).sqrt());
                }
            }
        }
    }

    if n > 0 && focals.len() + 1 >= n && !focals.is_empty() {
        focals.sort_by(|a, b| a.total_cmp(b));
        let mid = focals.len() / 2;
        if focals.len() % 2 == 0 {
            (focals[mid - 1] + focals[mid]) * 0.5
        } else {
            focals[mid]
        }
    } else {
        let sum: f64 = features
            .iter()
            .map(|f| f.width as f64 + f.height as f64)
            .sum();
        sum / n.max(1) as f64
    }
}

struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] { (ra, rb) } else { (rb, ra) };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        true
    }
}

/// Connected components of the graph whose edges are pairs with
/// `confidence >= conf_thresh`, each sorted, ordered by smallest member.
pub fn connected_components(matches: &PairwiseMatches, conf_thresh: f64) -> Vec<Vec<usize>> {
    let n = matches.num_images();
    let mut sets = DisjointSets::new(n);
    for info in matches.upper_pairs() {
        if info.confidence >= conf_thresh && info.confidence > 0.0 {
            sets.union(info.src_img, info.dst_img);
        }
    }
    let mut comps: Vec<Vec<usize>> = Vec::new();
    let mut root_slot = vec![usize::MAX; n];
    for i in 0..n {
        let r = sets.find(i);
        if root_slot[r] == usize::MAX {
            root_slot[r] = comps.len();
            comps.push(Vec::new());
        }
        comps[root_slot[r]].push(i);
    }
    comps
}

/// Maximum spanning tree by inlier count plus its center (the vertex whose
/// farthest tree vertex is closest).
#[derive(Debug, Clone)]
pub struct SpanningTree {
    pub adjacency: Vec<Vec<usize>>,
    pub center: usize,
}

impl SpanningTree {
    pub fn build(matches: &PairwiseMatches, conf_thresh: f64) -> Result<Self> {
        let n = matches.num_images();
        if n == 0 {
            return Err(Error::Estimation("empty match graph".into()));
        }
        let mut edges: Vec<(usize, usize, usize)> = matches
            .upper_pairs()
            .filter(|m| m.h.is_some() && m.confidence >= conf_thresh && m.confidence > 0.0)
            .map(|m| (m.src_img, m.dst_img, m.num_inliers))
            .collect();
        // Stable so equal weights keep pair order.
        edges.sort_by(|a, b| b.2.cmp(&a.2));

        let mut sets = DisjointSets::new(n);
        let mut adjacency = vec![Vec::new(); n];
        let mut joined = 0;
        for (i, j, _) in edges {
            if sets.union(i, j) {
                adjacency[i].push(j);
                adjacency[j].push(i);
                joined += 1;
            }
        }
        if joined + 1 != n {
            return Err(Error::Estimation(format!(
                "match graph is disconnected: {} of {n} images linked",
                joined + 1
            )));
        }

        let center = (0..n)
            .min_by_key(|&s| {
                let d = bfs_distances(&adjacency, s);
                (d.into_iter().max().unwrap_or(0), s)
            })
            .unwrap_or(0);
        Ok(Self { adjacency, center })
    }

    /// Tree edges `(from, to)` in breadth-first order from the center.
    pub fn bfs_edges(&self) -> Vec<(usize, usize)> {
        let mut visited = vec![false; self.adjacency.len()];
        let mut queue = VecDeque::from([self.center]);
        visited[self.center] = true;
        let mut out = Vec::new();
        while let Some(v) = queue.pop_front() {
            for &w in &self.adjacency[v] {
                if !visited[w] {
                    visited[w] = true;
                    out.push((v, w));
                    queue.push_back(w);
                }
            }
        }
        out
    }
}

fn bfs_distances(adjacency: &[Vec<usize>], start: usize) -> Vec<usize> {
    let mut dist = vec![usize::MAX; adjacency.len()];
    dist[start] = 0;
    let mut queue = VecDeque::from([start]);
    while let Some(v) = queue.pop_front() {
        for &w in &adjacency[v] {
            if dist[w] == usize::MAX {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
        }
    }
    dist
}

/// Cameras from the match graph plus the spanning-tree center used as the
/// rotation reference.
#[derive(Debug, Clone)]
pub struct CameraEstimate {
    pub cameras: Vec<CameraParams>,
    pub center: usize,
}

/// Homography-based estimate of every camera's focal and rotation.
pub fn estimate_cameras(
    features: &[ImageFeatures],
    matches: &PairwiseMatches,
    conf_thresh: f64,
) -> Result<CameraEstimate> {
    let n = features.len();
    if n != matches.num_images() {
        return Err(Error::Estimation(format!(
            "{n} feature sets but {} images in the match table",
            matches.num_images()
        )));
    }

    let focal = estimate_focal(features, matches);
    let tree = SpanningTree::build(matches, conf_thresh)?;
    let mut cameras: Vec<CameraParams> = (0..n).map(|_| CameraParams::new(focal, 0.0, 0.0)).collect();

    for (from, to) in tree.bfs_edges() {
        let h = matches
            .get(from, to)
            .h
            .ok_or_else(|| Error::Estimation(format!("pair {from}-{to} has no homography")))?;
        let h_inv = h
            .try_inverse()
            .ok_or_else(|| Error::Estimation(format!("pair {from}-{to} homography is singular")))?;
        let k_from_inv = cameras[from].k_inv();
        let k_to = cameras[to].k();
        let relative = k_from_inv * h_inv * k_to;
        cameras[to].rotation = orthonormalize(&(cameras[from].rotation * relative));
    }

    for (cam, feat) in cameras.iter_mut().zip(features) {
        cam.ppx = feat.width as f64 * 0.5;
        cam.ppy = feat.height as f64 * 0.5;
        if !cam.is_finite() || cam.focal <= 0.0 {
            return Err(Error::Estimation(format!(
                "camera of image {} is not finite",
                feat.img_idx
            )));
        }
    }

    info!(focal, center = tree.center, cameras = n, "cameras estimated");
    debug!(edges = ?tree.bfs_edges(), "spanning tree");
    Ok(CameraEstimate {
        cameras,
        center: tree.center,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::{rotation_from_vector, MatchesInfo};
    use nalgebra::Vector3;

    fn rotation_homography(f: f64, r: &Matrix3<f64>) -> Matrix3<f64> {
        let k = Matrix3::new(f, 0.0, 0.0, 0.0, f, 0.0, 0.0, 0.0, 1.0);
        k * r * k.try_inverse().unwrap()
    }

    #[test]
    fn focal_recovered_from_rotation_homography() {
        let r = rotation_from_vector(&Vector3::new(0.05, 0.4, 0.02));
        let h = rotation_homography(640.0, &r);
        let (f0, f1) = focals_from_homography(&h);
        assert!((f0.unwrap() - 640.0).abs() < 1e-6);
        assert!((f1.unwrap() - 640.0).abs() < 1e-6);
    }

    fn linked(n: usize, edges: &[(usize, usize, usize, f64)]) -> PairwiseMatches {
        let mut table = PairwiseMatches::new(n);
        for &(i, j, inliers, conf) in edges {
            let mut info = MatchesInfo::empty(i, j);
            info.num_inliers = inliers;
            info.confidence = conf;
            info.h = Some(Matrix3::identity());
            table.insert(info);
        }
        table
    }

    #[test]
    fn spanning_tree_picks_center_of_chain() {
        let table = linked(5, &[(0, 1, 50, 2.0), (1, 2, 40, 2.0), (2, 3, 60, 2.0), (3, 4, 30, 2.0), (0, 4, 5, 0.5)]);
        let tree = SpanningTree::build(&table, 1.0).unwrap();
        assert_eq!(tree.center, 2);
        assert_eq!(tree.bfs_edges().len(), 4);
    }

    #[test]
    fn disconnected_graph_is_an_estimation_error() {
        let table = linked(4, &[(0, 1, 50, 2.0), (2, 3, 40, 2.0)]);
        assert!(matches!(SpanningTree::build(&table, 1.0), Err(Error::Estimation(_))));
        let comps = connected_components(&table, 1.0);
        assert_eq!(comps, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn low_confidence_edges_do_not_connect() {
        let table = linked(3, &[(0, 1, 50, 2.0), (1, 2, 40, 0.1)]);
        assert_eq!(connected_components(&table, 0.15).len(), 2);
        assert_eq!(connected_components(&table, 0.05).len(), 1);
    }
}
