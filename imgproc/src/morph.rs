use image::GrayImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphShape {
    Rectangle,
    Cross,
}

pub fn create_morph_kernel(shape: MorphShape, width: u32, height: u32) -> Vec<(i32, i32)> {
    let mut kernel = Vec::new();
    let cx = width as i32 / 2;
    let cy = height as i32 / 2;

    match shape {
        MorphShape::Rectangle => {
            for y in 0..height as i32 {
                for x in 0..width as i32 {
                    kernel.push((x - cx, y - cy));
                }
            }
        }
        MorphShape::Cross => {
            for i in -cx..=cx {
                kernel.push((i, 0));
            }
            for i in -cy..=cy {
                if i != 0 {
                    kernel.push((0, i));
                }
            }
        }
    }

    kernel
}

/// Maximum filter over `kernel` offsets; out-of-image taps are ignored.
pub fn dilate(src: &GrayImage, kernel: &[(i32, i32)], iterations: u32) -> GrayImage {
    let mut output = src.clone();
    for _ in 0..iterations {
        output = dilate_once(&output, kernel);
    }
    output
}

fn dilate_once(src: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    let (w, h) = (src.width() as i32, src.height() as i32);
    let raw = src.as_raw();
    let mut out = GrayImage::new(src.width(), src.height());
    for y in 0..h {
        for x in 0..w {
            let mut v = 0u8;
            for &(dx, dy) in kernel {
                let (sx, sy) = (x + dx, y + dy);
                if sx >= 0 && sy >= 0 && sx < w && sy < h {
                    v = v.max(raw[(sy * w + sx) as usize]);
                }
            }
            out.as_mut()[(y * w + x) as usize] = v;
        }
    }
    out
}
