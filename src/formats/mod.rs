//! Image decoding for environment and material textures.
//!
//! High-dynamic-range detection is content-based: the loader sniffs the
//! Radiance magic bytes and never consults the file extension. LDR files go
//! through the `image` crate.

pub mod hdr;

use std::path::Path;

use log::info;

use crate::error::{RenderError, RenderResult};

pub use hdr::{load_hdr, HdrImage};

/// Decoded pixel payload: f32 for HDR content, u8 otherwise.
#[derive(Debug, Clone)]
pub enum PixelData {
    F32(Vec<f32>),
    U8(Vec<u8>),
}

/// A decoded image with the channel count the caller requested.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub is_hdr: bool,
    pub pixels: PixelData,
}

/// Load an image with the requested channel count (1, 3, or 4).
pub fn load_image<P: AsRef<Path>>(path: P, channels: u32) -> RenderResult<ImageData> {
    let path = path.as_ref();
    if !matches!(channels, 1 | 3 | 4) {
        return Err(RenderError::precondition(format!(
            "unsupported channel count {channels} requested for '{}'",
            path.display()
        )));
    }

    info!("Loading image: {}", path.display());
    let bytes = std::fs::read(path)?;

    if hdr::sniff_hdr(&bytes) {
        let image = hdr::decode_hdr(std::io::Cursor::new(bytes))
            .map_err(|e| RenderError::decode(format!("'{}': {e}", path.display())))?;
        let pixels = match channels {
            1 => luminance(&image.data),
            3 => image.data.clone(),
            _ => image.to_rgba(),
        };
        return Ok(ImageData {
            width: image.width,
            height: image.height,
            channels,
            is_hdr: true,
            pixels: PixelData::F32(pixels),
        });
    }

    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| RenderError::decode(format!("'{}': {e}", path.display())))?;
    let (width, height) = (decoded.width(), decoded.height());
    let pixels = match channels {
        1 => decoded.to_luma8().into_raw(),
        3 => decoded.to_rgb8().into_raw(),
        _ => decoded.to_rgba8().into_raw(),
    };

    Ok(ImageData {
        width,
        height,
        channels,
        is_hdr: false,
        pixels: PixelData::U8(pixels),
    })
}

/// Collapse linear RGB to single-channel luminance (Rec. 601 weights).
fn luminance(rgb: &[f32]) -> Vec<f32> {
    rgb.chunks_exact(3)
        .map(|px| 0.299 * px[0] + 0.587 * px[1] + 0.114 * px[2])
        .collect()
}
