//! GPano (Photo Sphere) XMP metadata in a JPEG APP1 segment.
//!
//! The segment goes right after SOI, or after an APP0 (JFIF) segment that
//! directly follows SOI.

use crate::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: [u8; 2] = [0xFF, 0xE0];
const APP1: [u8; 2] = [0xFF, 0xE1];
/// Largest payload an APP1 length field can describe.
const MAX_SEGMENT_PAYLOAD: usize = 65533;

/// Full-sphere and cropped-area dimensions of a saved panorama.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanoDimensions {
    pub full_width: u32,
    pub full_height: u32,
    pub cropped_width: u32,
    pub cropped_height: u32,
    pub cropped_left: u32,
    pub cropped_top: u32,
}

impl PanoDimensions {
    /// The image spans the full width; its height may fall short of `w/2`.
    pub fn from_image(width: u32, height: u32) -> Self {
        let full_height = width / 2;
        Self {
            full_width: width,
            full_height,
            cropped_width: width,
            cropped_height: height,
            cropped_left: 0,
            cropped_top: full_height.saturating_sub(height) / 2,
        }
    }
}

pub fn gpano_xmp(dims: &PanoDimensions) -> String {
    format!(
        r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
    <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
        <rdf:Description rdf:about="" xmlns:GPano="http://ns.google.com/photos/1.0/panorama/">
            <GPano:UsePanoramaViewer>True</GPano:UsePanoramaViewer>
            <GPano:ProjectionType>equirectangular</GPano:ProjectionType>
            <GPano:FullPanoWidthPixels>{}</GPano:FullPanoWidthPixels>
            <GPano:FullPanoHeightPixels>{}</GPano:FullPanoHeightPixels>
            <GPano:CroppedAreaImageWidthPixels>{}</GPano:CroppedAreaImageWidthPixels>
            <GPano:CroppedAreaImageHeightPixels>{}</GPano:CroppedAreaImageHeightPixels>
            <GPano:CroppedAreaLeftPixels>{}</GPano:CroppedAreaLeftPixels>
            <GPano:CroppedAreaTopPixels>{}</GPano:CroppedAreaTopPixels>
        </rdf:Description>
    </rdf:RDF>
</x:xmpmeta>"#,
        dims.full_width,
        dims.full_height,
        dims.cropped_width,
        dims.cropped_height,
        dims.cropped_left,
        dims.cropped_top
    )
}

/// Returns the rewritten file and the offset of the new APP1 segment, or
/// `None` when `jpeg` does not start with SOI.
pub fn insert_xmp_segment(jpeg: &[u8], xmp: &str) -> Result<Option<(Vec<u8>, usize)>> {
    if jpeg.len() < 2 || jpeg[..2] != SOI {
        return Ok(None);
    }

    let payload_len = XMP_HEADER.len() + xmp.len();
    if payload_len > MAX_SEGMENT_PAYLOAD {
        return Err(Error::post_process(format!(
            "XMP payload of {payload_len} bytes exceeds one APP1 segment"
        )));
    }

    let mut pos = 2;
    if jpeg.len() >= 6 && jpeg[2..4] == APP0 {
        let app0_len = u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
        pos += 2 + app0_len;
        if pos > jpeg.len() {
            return Err(Error::post_process("APP0 segment runs past end of file"));
        }
    }

    let mut out = Vec::with_capacity(jpeg.len() + payload_len + 4);
    out.extend_from_slice(&jpeg[..pos]);
    out.extend_from_slice(&APP1);
    out.extend_from_slice(&((payload_len + 2) as u16).to_be_bytes());
    out.extend_from_slice(XMP_HEADER);
    out.extend_from_slice(xmp.as_bytes());
    out.extend_from_slice(&jpeg[pos..]);
    Ok(Some((out, pos)))
}

/// Rewrites the JPEG at `path` in place with GPano metadata for a
/// `width × height` panorama. Returns the segment offset, or `None` (file
/// untouched) when the file is not a JPEG.
pub fn inject_gpano_metadata(path: &Path, width: u32, height: u32) -> Result<Option<usize>> {
    let data = fs::read(path)?;
    let xmp = gpano_xmp(&PanoDimensions::from_image(width, height));
    match insert_xmp_segment(&data, &xmp)? {
        Some((out, offset)) => {
            fs::write(path, out)?;
            info!(path = %path.display(), offset, "panorama metadata injected");
            Ok(Some(offset))
        }
        None => {
            error!(path = %path.display(), "not a JPEG file (missing SOI), metadata not injected");
            Ok(None)
        }
    }
}
