use cv_core::luma;
use image::{GrayImage, RgbImage};
use rayon::prelude::*;

/// BT.601 grayscale conversion.
pub fn convert_rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = rgb.dimensions();
    let mut gray_data = vec![0u8; (w * h) as usize];

    gray_data
        .par_chunks_mut(w.max(1) as usize)
        .zip(rgb.as_raw().par_chunks(w.max(1) as usize * 3))
        .for_each(|(g_row, rgb_row)| {
            for (g, px) in g_row.iter_mut().zip(rgb_row.chunks_exact(3)) {
                *g = luma(px);
            }
        });

    GrayImage::from_raw(w, h, gray_data).unwrap_or_else(|| GrayImage::new(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn gray_matches_luma_weights() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        let g = convert_rgb_to_gray(&img);
        assert_eq!(g.get_pixel(0, 0)[0], 76);
        assert_eq!(g.get_pixel(1, 0)[0], 150);
    }
}
