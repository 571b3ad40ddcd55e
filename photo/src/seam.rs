//! Seam estimation by distance to the tile border.
//!
//! Where tiles overlap, each destination pixel is kept by the tile whose
//! own border is farthest away; ties go to the lower tile index.

use crate::warper::WarpedTile;
use cv_imgproc::distance_transform;
use image::GrayImage;
use rayon::prelude::*;
use tracing::debug;

/// Seam-restricted copies of every tile's mask, in tile order.
pub fn find_seams(tiles: &[WarpedTile]) -> Vec<GrayImage> {
    let distances: Vec<Vec<f32>> = tiles
        .par_iter()
        .map(|t| distance_transform(&t.mask))
        .collect();

    let seams: Vec<GrayImage> = (0..tiles.len())
        .into_par_iter()
        .map(|i| {
            let ti = &tiles[i];
            let mut mask = ti.mask.clone();
            let wi = ti.roi.width as usize;
            for (j, tj) in tiles.iter().enumerate() {
                if i == j {
                    continue;
                }
                let Some(overlap) = ti.roi.intersection(&tj.roi) else {
                    continue;
                };
                let wj = tj.roi.width as usize;
                for y in overlap.y..overlap.y + overlap.height as i32 {
                    for x in overlap.x..overlap.x + overlap.width as i32 {
                        let (xi, yi) = ((x - ti.roi.x) as usize, (y - ti.roi.y) as usize);
                        let (xj, yj) = ((x - tj.roi.x) as usize, (y - tj.roi.y) as usize);
                        let idx_i = yi * wi + xi;
                        let idx_j = yj * wj + xj;
                        if ti.mask.as_raw()[idx_i] == 0 || tj.mask.as_raw()[idx_j] == 0 {
                            continue;
                        }
                        let (di, dj) = (distances[i][idx_i], distances[j][idx_j]);
                        if dj > di || (dj == di && j < i) {
                            mask.put_pixel(xi as u32, yi as u32, image::Luma([0]));
                        }
                    }
                }
            }
            mask
        })
        .collect();

    debug!(tiles = tiles.len(), "seams estimated");
    seams
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::Rect;
    use image::{Luma, RgbImage};

    fn tile(x: i32, w: u32) -> WarpedTile {
        WarpedTile {
            image: RgbImage::new(w, 20),
            mask: GrayImage::from_pixel(w, 20, Luma([255])),
            roi: Rect::new(x, 0, w, 20),
        }
    }

    #[test]
    fn overlap_is_split_between_tiles() {
        let tiles = vec![tile(0, 40), tile(20, 40)];
        let seams = find_seams(&tiles);
        // Every covered pixel belongs to exactly one tile.
        for y in 0..20u32 {
            for x in 0..60i32 {
                let a = x < 40 && seams[0].get_pixel(x as u32, y)[0] > 0;
                let b = x >= 20 && seams[1].get_pixel((x - 20) as u32, y)[0] > 0;
                assert!(a ^ b, "pixel {x},{y}");
            }
        }
        // Far from the overlap each tile keeps its own pixels.
        assert_eq!(seams[0].get_pixel(5, 10)[0], 255);
        assert_eq!(seams[1].get_pixel(35, 10)[0], 255);
    }

    #[test]
    fn disjoint_tiles_keep_full_masks() {
        let tiles = vec![tile(0, 10), tile(50, 10)];
        let seams = find_seams(&tiles);
        assert!(seams.iter().all(|m| m.pixels().all(|p| p[0] == 255)));
    }
}
