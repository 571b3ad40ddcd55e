use image::GrayImage;

const AXIAL: f32 = 1.0;
const DIAGONAL: f32 = std::f32::consts::SQRT_2;

/// Two-pass 3×3 chamfer distance from every non-zero pixel to the nearest
/// zero pixel. Pixels beyond the image border count as zero.
pub fn distance_transform(mask: &GrayImage) -> Vec<f32> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    let raw = mask.as_raw();
    let mut dist: Vec<f32> = raw
        .iter()
        .map(|&v| if v == 0 { 0.0 } else { f32::INFINITY })
        .collect();

    let at = |d: &[f32], x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            d[y as usize * w + x as usize]
        }
    };

    for y in 0..h as isize {
        for x in 0..w as isize {
            let i = y as usize * w + x as usize;
            if dist[i] == 0.0 {
                continue;
            }
            let best = (at(&dist, x - 1, y) + AXIAL)
                .min(at(&dist, x, y - 1) + AXIAL)
                .min(at(&dist, x - 1, y - 1) + DIAGONAL)
                .min(at(&dist, x + 1, y - 1) + DIAGONAL);
            dist[i] = dist[i].min(best);
        }
    }
    for y in (0..h as isize).rev() {
        for x in (0..w as isize).rev() {
            let i = y as usize * w + x as usize;
            if dist[i] == 0.0 {
                continue;
            }
            let best = (at(&dist, x + 1, y) + AXIAL)
                .min(at(&dist, x, y + 1) + AXIAL)
                .min(at(&dist, x + 1, y + 1) + DIAGONAL)
                .min(at(&dist, x - 1, y + 1) + DIAGONAL);
            dist[i] = dist[i].min(best);
        }
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn distance_grows_towards_center() {
        let mask = GrayImage::from_pixel(9, 9, Luma([255]));
        let d = distance_transform(&mask);
        assert_eq!(d[0], 1.0);
        assert_eq!(d[4 * 9 + 4], 5.0);
        assert!(d[4 * 9 + 4] > d[4 * 9 + 2]);
    }

    #[test]
    fn zero_pixels_stay_zero() {
        let mut mask = GrayImage::from_pixel(5, 1, Luma([255]));
        mask.put_pixel(2, 0, Luma([0]));
        let d = distance_transform(&mask);
        assert_eq!(d, vec![1.0, 1.0, 0.0, 1.0, 1.0]);
    }
}
