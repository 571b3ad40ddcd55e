use nalgebra::{Matrix3, Rotation3, Vector3};

/// Rotational pinhole camera: `world_ray = R · K⁻¹ · [x y 1]ᵀ`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    pub focal: f64,
    pub aspect: f64,
    pub ppx: f64,
    pub ppy: f64,
    pub rotation: Matrix3<f64>,
}

impl CameraParams {
    pub fn new(focal: f64, ppx: f64, ppy: f64) -> Self {
        Self {
            focal,
            aspect: 1.0,
            ppx,
            ppy,
            rotation: Matrix3::identity(),
        }
    }

    pub fn with_rotation(mut self, rotation: Matrix3<f64>) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal,
            0.0,
            self.ppx,
            0.0,
            self.focal * self.aspect,
            self.ppy,
            0.0,
            0.0,
            1.0,
        )
    }

    pub fn k_inv(&self) -> Matrix3<f64> {
        let fy = self.focal * self.aspect;
        Matrix3::new(
            1.0 / self.focal,
            0.0,
            -self.ppx / self.focal,
            0.0,
            1.0 / fy,
            -self.ppy / fy,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Unit world direction of pixel `(x, y)`.
    pub fn ray(&self, x: f64, y: f64) -> Vector3<f64> {
        (self.rotation * self.k_inv() * Vector3::new(x, y, 1.0)).normalize()
    }

    /// Rescales intrinsics for an image resized by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            focal: self.focal * factor,
            ppx: self.ppx * factor,
            ppy: self.ppy * factor,
            ..*self
        }
    }

    pub fn is_finite(&self) -> bool {
        self.focal.is_finite()
            && self.ppx.is_finite()
            && self.ppy.is_finite()
            && self.rotation.iter().all(|v| v.is_finite())
    }
}

/// Nearest rotation matrix (Frobenius norm) via SVD, with `det = +1`.
pub fn orthonormalize(m: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = m.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Matrix3::identity();
    };
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.column_mut(2).neg_mut();
        r = u_fixed * v_t;
    }
    r
}

/// Largest absolute entry of `RᵀR − I`.
pub fn orthonormality_error(r: &Matrix3<f64>) -> f64 {
    (r.transpose() * r - Matrix3::identity()).amax()
}

pub fn rotation_to_vector(r: &Matrix3<f64>) -> Vector3<f64> {
    Rotation3::from_matrix(r).scaled_axis()
}

pub fn rotation_from_vector(v: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::new(*v).into_inner()
}

/// Integer rectangle in destination (panorama) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_corners(tl: (i32, i32), br: (i32, i32)) -> Self {
        Self {
            x: tl.0,
            y: tl.1,
            width: (br.0 - tl.0).max(0) as u32,
            height: (br.1 - tl.1).max(0) as u32,
        }
    }

    /// Exclusive bottom-right corner.
    pub fn br(&self) -> (i32, i32) {
        (self.x + self.width as i32, self.y + self.height as i32)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        let (br_x, br_y) = self.br();
        let (o_br_x, o_br_y) = other.br();
        other.x >= self.x && other.y >= self.y && o_br_x <= br_x && o_br_y <= br_y
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let (br_x, br_y) = self.br();
        let (o_br_x, o_br_y) = other.br();
        Rect::from_corners(
            (self.x.min(other.x), self.y.min(other.y)),
            (br_x.max(o_br_x), br_y.max(o_br_y)),
        )
    }

    /// Overlap of two rectangles, `None` when they do not intersect.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let (br_x, br_y) = self.br();
        let (o_br_x, o_br_y) = other.br();
        let tl = (self.x.max(other.x), self.y.max(other.y));
        let br = (br_x.min(o_br_x), br_y.min(o_br_y));
        (br.0 > tl.0 && br.1 > tl.1).then(|| Rect::from_corners(tl, br))
    }

    /// Bounding rectangle of all `rects`; `None` when empty.
    pub fn union_all<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
        rects.into_iter().fold(None, |acc: Option<Rect>, r| match acc {
            Some(u) => Some(u.union(r)),
            None => Some(*r),
        })
    }
}
