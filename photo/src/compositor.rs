//! Spherical compositing: warp every image, split overlaps along seams and
//! blend the tiles into one panorama.

use crate::blender::{bands_for_area, MultiBandBlender};
use crate::seam::find_seams;
use crate::warper::{SphericalWarper, WarpedTile};
use crate::{Error, Result};
use cv_core::{CameraParams, Rect, SignedImage};
use image::{GrayImage, RgbImage};
use rayon::prelude::*;
use tracing::{debug, info};

/// Blended panorama in destination coordinates.
#[derive(Debug, Clone)]
pub struct Composite {
    pub image: RgbImage,
    pub mask: GrayImage,
    /// Destination-space bounding box of every tile.
    pub union: Rect,
    pub tiles: Vec<Rect>,
    pub num_bands: usize,
    /// Row of zero elevation, relative to the composite's top edge.
    pub horizon_row: i32,
}

/// Warps every image with its full-resolution camera and blends the tiles.
pub fn compose(images: &[RgbImage], cameras: &[CameraParams], blend_strength: f64) -> Result<Composite> {
    if images.is_empty() || images.len() != cameras.len() {
        return Err(Error::invalid_input(format!(
            "{} images but {} cameras",
            images.len(),
            cameras.len()
        )));
    }

    let warper = SphericalWarper::from_cameras(cameras);
    debug!(scale = warper.scale(), "warp scale");
    let tiles: Vec<WarpedTile> = images
        .par_iter()
        .zip(cameras.par_iter())
        .map(|(img, cam)| warper.warp(img, cam))
        .collect::<Result<_>>()?;

    blend_tiles(&tiles, blend_strength)
}

/// Seam-split and multi-band blend of already warped tiles.
pub fn blend_tiles(tiles: &[WarpedTile], blend_strength: f64) -> Result<Composite> {
    let rois: Vec<Rect> = tiles.iter().map(|t| t.roi).collect();
    let union = Rect::union_all(&rois)
        .ok_or_else(|| Error::post_process("no tiles to compose"))?;
    let num_bands = bands_for_area(union.area(), blend_strength);
    info!(
        x = union.x,
        y = union.y,
        width = union.width,
        height = union.height,
        bands = num_bands,
        "composite union"
    );

    let seams = find_seams(tiles);
    let mut blender = MultiBandBlender::new(num_bands);
    blender.prepare(union)?;
    for (tile, seam) in tiles.iter().zip(&seams) {
        blender.feed(&SignedImage::from_rgb(&tile.image), seam, (tile.roi.x, tile.roi.y))?;
    }
    let num_bands = blender.num_bands();
    let (blended, mask) = blender.blend()?;

    Ok(Composite {
        image: blended.to_rgb(),
        mask,
        union,
        tiles: rois,
        num_bands,
        horizon_row: -union.y,
    })
}
