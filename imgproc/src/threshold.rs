use cv_core::{luma, Rect};
use image::{GrayImage, Luma, RgbImage};

/// 255 where the pixel's luma is at most `max_luma`, 0 elsewhere.
pub fn background_mask(img: &RgbImage, max_luma: u8) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut mask = GrayImage::new(w, h);
    for (m, px) in mask.pixels_mut().zip(img.pixels()) {
        if luma(&px.0) <= max_luma {
            *m = Luma([255]);
        }
    }
    mask
}

pub fn count_nonzero(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&v| v != 0).count()
}

/// Tight bounding rectangle of the non-zero pixels, `None` if there are none.
pub fn bounding_rect_nonzero(mask: &GrayImage) -> Option<Rect> {
    let (w, h) = mask.dimensions();
    let raw = mask.as_raw();
    let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0u32, 0u32);
    let mut any = false;
    for y in 0..h {
        let row = &raw[(y * w) as usize..((y + 1) * w) as usize];
        let Some(first) = row.iter().position(|&v| v != 0) else {
            continue;
        };
        let last = row.iter().rposition(|&v| v != 0).unwrap_or(first);
        any = true;
        x0 = x0.min(first as u32);
        x1 = x1.max(last as u32);
        y0 = y0.min(y);
        y1 = y1.max(y);
    }
    any.then(|| Rect::new(x0 as i32, y0 as i32, x1 - x0 + 1, y1 - y0 + 1))
}

/// Bounding rectangle of the pixels brighter than `max_luma`.
pub fn content_bounds(img: &RgbImage, max_luma: u8) -> Option<Rect> {
    let (w, h) = img.dimensions();
    let mut content = GrayImage::new(w, h);
    for (m, px) in content.pixels_mut().zip(img.pixels()) {
        if luma(&px.0) > max_luma {
            *m = Luma([255]);
        }
    }
    bounding_rect_nonzero(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn bounding_rect_of_two_points() {
        let mut m = GrayImage::new(10, 8);
        m.put_pixel(2, 5, Luma([1]));
        m.put_pixel(7, 1, Luma([255]));
        assert_eq!(bounding_rect_nonzero(&m), Some(Rect::new(2, 1, 6, 5)));
        assert_eq!(bounding_rect_nonzero(&GrayImage::new(3, 3)), None);
    }

    #[test]
    fn near_black_counts_as_background() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(1, 0, Rgb([1, 1, 1]));
        img.put_pixel(2, 0, Rgb([3, 3, 3]));
        let mask = background_mask(&img, 1);
        assert_eq!(mask.as_raw(), &vec![255, 255, 0]);
        assert_eq!(count_nonzero(&mask), 2);
        assert_eq!(content_bounds(&img, 1), Some(Rect::new(2, 0, 1, 1)));
    }
}
