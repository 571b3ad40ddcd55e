//! Spherical (equirectangular) warping.
//!
//! A world direction at longitude `θ` and latitude `φ` lands at
//! `(u, v) = (s·θ, s·φ)`, so the horizon is the row `v = 0`.

use crate::Result;
use cv_core::{CameraParams, Rect};
use cv_imgproc::{remap, remap_rgb, validate_image_size, BorderMode, Interpolation};
use image::{GrayImage, Luma, RgbImage};
use nalgebra::Vector3;
use rayon::prelude::*;
use std::f64::consts::{FRAC_PI_2, PI};

/// Upper bound on warped tile area; larger tiles indicate broken cameras.
const MAX_TILE_PIXELS: u64 = 1 << 28;

/// An image warped onto the sphere: pixels, validity mask and placement.
#[derive(Debug, Clone)]
pub struct WarpedTile {
    pub image: RgbImage,
    pub mask: GrayImage,
    pub roi: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalWarper {
    scale: f64,
}

impl SphericalWarper {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    /// Median focal of the rig; even counts average the two middle values.
    pub fn from_cameras(cameras: &[CameraParams]) -> Self {
        Self::new(median_focal(cameras))
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Image pixel `(x, y)` to sphere coordinates.
    pub fn map_forward(&self, cam: &CameraParams, x: f64, y: f64) -> (f64, f64) {
        let d = cam.rotation * cam.k_inv() * Vector3::new(x, y, 1.0);
        let r = d.norm();
        let u = self.scale * d.x.atan2(d.z);
        let v = self.scale * (d.y / r).clamp(-1.0, 1.0).asin();
        (u, v)
    }

    /// Sphere coordinates back to an image pixel; `None` behind the camera.
    pub fn map_backward(&self, cam: &CameraParams, u: f64, v: f64) -> Option<(f64, f64)> {
        let (theta, phi) = (u / self.scale, v / self.scale);
        let d = Vector3::new(phi.cos() * theta.sin(), phi.sin(), phi.cos() * theta.cos());
        project(cam, &d)
    }

    /// Bounding box of the warped image, from its border pixels. A pole
    /// that falls inside the image widens the box to every longitude. An
    /// empty image has an empty box.
    pub fn warp_roi(&self, cam: &CameraParams, width: u32, height: u32) -> Rect {
        if width == 0 || height == 0 {
            return Rect::new(0, 0, 0, 0);
        }
        let (mut u0, mut v0) = (f64::INFINITY, f64::INFINITY);
        let (mut u1, mut v1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        let mut visit = |x: f64, y: f64| {
            let (u, v) = self.map_forward(cam, x, y);
            u0 = u0.min(u);
            v0 = v0.min(v);
            u1 = u1.max(u);
            v1 = v1.max(v);
        };
        for x in 0..width {
            visit(x as f64, 0.0);
            visit(x as f64, (height - 1) as f64);
        }
        for y in 0..height {
            visit(0.0, y as f64);
            visit((width - 1) as f64, y as f64);
        }

        for sign in [-1.0, 1.0] {
            let pole = Vector3::new(0.0, sign, 0.0);
            if let Some((x, y)) = project(cam, &pole) {
                if x >= 0.0 && y >= 0.0 && x < width as f64 && y < height as f64 {
                    u0 = u0.min(-PI * self.scale);
                    u1 = u1.max(PI * self.scale);
                    v0 = v0.min(sign * FRAC_PI_2 * self.scale);
                    v1 = v1.max(sign * FRAC_PI_2 * self.scale);
                }
            }
        }

        Rect::from_corners(
            (u0.floor() as i32, v0.floor() as i32),
            (u1.floor() as i32 + 1, v1.floor() as i32 + 1),
        )
    }

    /// Source-pixel lookup tables for every pixel of `roi`.
    pub fn build_maps(&self, cam: &CameraParams, roi: &Rect) -> (Vec<f32>, Vec<f32>) {
        let (w, h) = (roi.width as usize, roi.height as usize);
        let mut map_x = vec![f32::NAN; w * h];
        let mut map_y = vec![f32::NAN; w * h];
        if w == 0 {
            return (map_x, map_y);
        }
        map_x
            .par_chunks_mut(w)
            .zip(map_y.par_chunks_mut(w))
            .enumerate()
            .for_each(|(row, (mx, my))| {
                let v = (roi.y + row as i32) as f64;
                for col in 0..w {
                    let u = (roi.x + col as i32) as f64;
                    if let Some((x, y)) = self.map_backward(cam, u, v) {
                        mx[col] = x as f32;
                        my[col] = y as f32;
                    }
                }
            });
        (map_x, map_y)
    }

    /// Warps `image` (bilinear, reflected borders) together with a validity
    /// mask (nearest, zero outside the source).
    pub fn warp(&self, image: &RgbImage, cam: &CameraParams) -> Result<WarpedTile> {
        validate_image_size(image.width(), image.height())?;
        let roi = self.warp_roi(cam, image.width(), image.height());
        validate_image_size(roi.width, roi.height)?;
        if roi.area() > MAX_TILE_PIXELS {
            return Err(crate::Error::Estimation(format!(
                "warped tile of {}x{} is implausibly large",
                roi.width, roi.height
            )));
        }

        let (map_x, map_y) = self.build_maps(cam, &roi);
        let warped = remap_rgb(
            image,
            &map_x,
            &map_y,
            roi.width,
            roi.height,
            Interpolation::Linear,
            BorderMode::Reflect,
        )?;
        let full = GrayImage::from_pixel(image.width(), image.height(), Luma([255]));
        let mask = remap(
            &full,
            &map_x,
            &map_y,
            roi.width,
            roi.height,
            Interpolation::Nearest,
            BorderMode::Constant(0),
        )?;
        Ok(WarpedTile {
            image: warped,
            mask,
            roi,
        })
    }
}

fn project(cam: &CameraParams, dir: &Vector3<f64>) -> Option<(f64, f64)> {
    let c = cam.rotation.transpose() * dir;
    if c.z <= 0.0 {
        return None;
    }
    let x = cam.focal * c.x / c.z + cam.ppx;
    let y = cam.focal * cam.aspect * c.y / c.z + cam.ppy;
    Some((x, y))
}

pub fn median_focal(cameras: &[CameraParams]) -> f64 {
    let mut focals: Vec<f64> = cameras.iter().map(|c| c.focal).collect();
    if focals.is_empty() {
        return 1.0;
    }
    focals.sort_by(|a, b| a.total_cmp(b));
    let mid = focals.len() / 2;
    if focals.len() % 2 == 0 {
        (focals[mid - 1] + focals[mid]) * 0.5
    } else {
        focals[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::rotation_from_vector;

    fn camera(yaw: f64, pitch: f64) -> CameraParams {
        let r = rotation_from_vector(&Vector3::new(0.0, yaw, 0.0))
            * rotation_from_vector(&Vector3::new(pitch, 0.0, 0.0));
        CameraParams::new(400.0, 320.0, 240.0).with_rotation(r)
    }

    #[test]
    fn forward_backward_agree() {
        let cam = camera(0.7, 0.1);
        let w = SphericalWarper::new(400.0);
        for &(x, y) in &[(0.0, 0.0), (320.0, 240.0), (639.0, 10.0), (100.0, 470.0)] {
            let (u, v) = w.map_forward(&cam, x, y);
            let (bx, by) = w.map_backward(&cam, u, v).unwrap();
            assert!((bx - x).abs() < 1e-6 && (by - y).abs() < 1e-6);
        }
    }

    #[test]
    fn principal_point_lands_on_camera_longitude() {
        let cam = camera(0.5, 0.0);
        let w = SphericalWarper::new(400.0);
        let (u, v) = w.map_forward(&cam, 320.0, 240.0);
        assert!((u - 200.0).abs() < 1e-9);
        assert!(v.abs() < 1e-9);
    }

    #[test]
    fn backward_behind_camera_is_none() {
        let w = SphericalWarper::new(400.0);
        assert!(w.map_backward(&camera(0.0, 0.0), PI * 400.0, 0.0).is_none());
    }

    #[test]
    fn roi_of_level_camera_straddles_horizon() {
        let cam = camera(0.0, 0.0);
        let w = SphericalWarper::new(400.0);
        let roi = w.warp_roi(&cam, 640, 480);
        assert!(roi.y < 0 && roi.br().1 > 0);
        assert!(roi.x < 0 && roi.br().0 > 0);
        // atan(320/400) * 400 on each side
        assert!((roi.width as f64 - 2.0 * 400.0 * (320.0f64 / 400.0).atan()).abs() < 3.0);
    }

    #[test]
    fn roi_of_empty_image_is_empty() {
        let w = SphericalWarper::new(400.0);
        assert!(w.warp_roi(&camera(0.0, 0.0), 0, 480).is_empty());
        assert!(w.warp_roi(&camera(0.0, 0.0), 640, 0).is_empty());
    }

    #[test]
    fn pole_in_view_spans_all_longitudes() {
        let cam = camera(0.0, -FRAC_PI_2 + 0.05);
        let w = SphericalWarper::new(100.0);
        let roi = w.warp_roi(&cam, 640, 480);
        assert!(roi.width as f64 >= 2.0 * PI * 100.0 - 1.0);
    }

    #[test]
    fn warp_mask_covers_center() {
        let img = RgbImage::from_pixel(64, 48, image::Rgb([200, 10, 10]));
        let cam = CameraParams::new(60.0, 32.0, 24.0);
        let tile = SphericalWarper::new(60.0).warp(&img, &cam).unwrap();
        let (cx, cy) = ((-tile.roi.x) as u32, (-tile.roi.y) as u32);
        assert_eq!(tile.mask.get_pixel(cx, cy)[0], 255);
        assert_eq!(tile.image.get_pixel(cx, cy).0, [200, 10, 10]);
        assert_eq!(tile.mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn median_focal_even_count_averages() {
        let cams: Vec<_> = [300.0, 500.0, 400.0, 900.0]
            .iter()
            .map(|&f| CameraParams::new(f, 0.0, 0.0))
            .collect();
        assert_eq!(median_focal(&cams), 450.0);
    }
}
