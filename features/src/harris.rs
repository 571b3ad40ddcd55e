use image::GrayImage;

/// Harris corner measure around `(x, y)` over a `block_size` window of 3×3
/// Sobel gradients. The caller guarantees a `block_size / 2 + 1` margin.
pub fn harris_response(image: &GrayImage, x: i32, y: i32, block_size: i32, k: f64) -> f64 {
    let w = image.width() as i32;
    let raw = image.as_raw();
    let px = |xx: i32, yy: i32| raw[(yy * w + xx) as usize] as f64;
    let r = block_size / 2;

    let (mut a, mut b, mut c) = (0.0f64, 0.0f64, 0.0f64);
    for yy in y - r..y - r + block_size {
        for xx in x - r..x - r + block_size {
            let gx = (px(xx + 1, yy - 1) + 2.0 * px(xx + 1, yy) + px(xx + 1, yy + 1))
                - (px(xx - 1, yy - 1) + 2.0 * px(xx - 1, yy) + px(xx - 1, yy + 1));
            let gy = (px(xx - 1, yy + 1) + 2.0 * px(xx, yy + 1) + px(xx + 1, yy + 1))
                - (px(xx - 1, yy - 1) + 2.0 * px(xx, yy - 1) + px(xx + 1, yy - 1));
            a += gx * gx;
            b += gy * gy;
            c += gx * gy;
        }
    }

    let scale = 1.0 / (4.0 * block_size as f64 * 255.0);
    let s4 = scale.powi(4);
    (a * b - c * c - k * (a + b) * (a + b)) * s4
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn corner_beats_edge_and_flat() {
        let mut img = GrayImage::new(40, 40);
        for y in 20..40 {
            for x in 20..40 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let corner = harris_response(&img, 20, 20, 7, 0.04);
        let edge = harris_response(&img, 30, 20, 7, 0.04);
        let flat = harris_response(&img, 8, 8, 7, 0.04);
        assert!(corner > 0.0);
        assert!(edge < corner);
        assert_eq!(flat, 0.0);
    }
}
