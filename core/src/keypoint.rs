use nalgebra::{Matrix3, Point2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub angle: f64,
    pub response: f64,
    pub octave: i32,
}

impl KeyPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            size: 1.0,
            angle: -1.0,
            response: 0.0,
            octave: 0,
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_response(mut self, response: f64) -> Self {
        self.response = response;
        self
    }

    pub fn with_octave(mut self, octave: i32) -> Self {
        self.octave = octave;
        self
    }

    pub fn pt(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

impl Default for KeyPoint {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

impl FeatureMatch {
    pub fn new(query_idx: usize, train_idx: usize, distance: f32) -> Self {
        Self {
            query_idx,
            train_idx,
            distance,
        }
    }

    /// Same correspondence seen from the other image.
    pub fn swapped(&self) -> Self {
        Self::new(self.train_idx, self.query_idx, self.distance)
    }
}

/// Verified correspondences between two images of the input set.
///
/// `h` maps points of `src_img` (centered on the image middle) to points of
/// `dst_img`; `inliers` flags the entries of `matches` that agree with it.
#[derive(Debug, Clone)]
pub struct MatchesInfo {
    pub src_img: usize,
    pub dst_img: usize,
    pub matches: Vec<FeatureMatch>,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    pub h: Option<Matrix3<f64>>,
    pub confidence: f64,
}

impl MatchesInfo {
    pub fn empty(src_img: usize, dst_img: usize) -> Self {
        Self {
            src_img,
            dst_img,
            matches: Vec::new(),
            inliers: Vec::new(),
            num_inliers: 0,
            h: None,
            confidence: 0.0,
        }
    }

    /// The same pair seen from `dst_img`: inverted homography, swapped indices.
    pub fn reversed(&self) -> Self {
        Self {
            src_img: self.dst_img,
            dst_img: self.src_img,
            matches: self.matches.iter().map(FeatureMatch::swapped).collect(),
            inliers: self.inliers.clone(),
            num_inliers: self.num_inliers,
            h: self.h.and_then(|h| h.try_inverse()),
            confidence: self.confidence,
        }
    }

    pub fn inlier_matches(&self) -> impl Iterator<Item = &FeatureMatch> {
        self.matches
            .iter()
            .zip(self.inliers.iter())
            .filter(|(_, &keep)| keep)
            .map(|(m, _)| m)
    }
}

/// Dense `n × n` table of pairwise match results, indexed by image identity.
#[derive(Debug, Clone)]
pub struct PairwiseMatches {
    num_images: usize,
    table: Vec<MatchesInfo>,
}

impl PairwiseMatches {
    pub fn new(num_images: usize) -> Self {
        let mut table = Vec::with_capacity(num_images * num_images);
        for i in 0..num_images {
            for j in 0..num_images {
                table.push(MatchesInfo::empty(i, j));
            }
        }
        Self { num_images, table }
    }

    pub fn num_images(&self) -> usize {
        self.num_images
    }

    pub fn get(&self, src: usize, dst: usize) -> &MatchesInfo {
        &self.table[src * self.num_images + dst]
    }

    /// Stores `info` for its pair and the reversed view for the opposite pair.
    pub fn insert(&mut self, info: MatchesInfo) {
        let (i, j) = (info.src_img, info.dst_img);
        self.table[j * self.num_images + i] = info.reversed();
        self.table[i * self.num_images + j] = info;
    }

    /// Pairs `(i, j)` with `i < j`.
    pub fn upper_pairs(&self) -> impl Iterator<Item = &MatchesInfo> {
        self.table.iter().filter(|m| m.src_img < m.dst_img)
    }

    /// Keeps only the rows/columns of `keep`, renumbering images in order.
    pub fn subset(&self, keep: &[usize]) -> Self {
        let mut out = Self::new(keep.len());
        for (ni, &oi) in keep.iter().enumerate() {
            for (nj, &oj) in keep.iter().enumerate() {
                let mut info = self.get(oi, oj).clone();
                info.src_img = ni;
                info.dst_img = nj;
                out.table[ni * keep.len() + nj] = info;
            }
        }
        out
    }
}
