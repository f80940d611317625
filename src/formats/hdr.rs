//! Radiance HDR (.hdr) decoder
//!
//! Parses the Radiance header, decompresses RLE scanlines, and converts the
//! shared-exponent RGBE encoding to linear RGB32F.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{RenderError, RenderResult};

/// Magic prefixes a Radiance file may start with.
const MAGICS: [&[u8]; 2] = [b"#?RADIANCE", b"#?RGBE"];

/// Decoded HDR environment image: linear RGB32F, 3 components per pixel,
/// row-major.
#[derive(Debug, Clone)]
pub struct HdrImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl HdrImage {
    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Expand to RGBA by appending an opaque alpha channel.
    pub fn to_rgba(&self) -> Vec<f32> {
        let mut rgba = Vec::with_capacity(self.pixel_count() * 4);
        for px in self.data.chunks_exact(3) {
            rgba.extend_from_slice(px);
            rgba.push(1.0);
        }
        rgba
    }
}

/// Whether the byte prefix identifies Radiance content.
///
/// Detection is content-based; the file extension plays no part.
pub fn sniff_hdr(prefix: &[u8]) -> bool {
    MAGICS.iter().any(|m| prefix.starts_with(m))
}

/// Load a Radiance HDR file from disk.
pub fn load_hdr<P: AsRef<Path>>(path: P) -> RenderResult<HdrImage> {
    let file = File::open(path.as_ref())?;
    decode_hdr(BufReader::new(file))
}

/// Decode a Radiance HDR stream.
pub fn decode_hdr<R: BufRead>(mut reader: R) -> RenderResult<HdrImage> {
    let (width, height) = parse_header(&mut reader)?;

    let mut data = Vec::with_capacity((width * height) as usize * 3);
    for y in 0..height {
        let scanline = read_scanline(&mut reader, width, y)?;
        for [r, g, b, e] in scanline {
            let (rf, gf, bf) = rgbe_to_rgb(r, g, b, e);
            data.push(rf);
            data.push(gf);
            data.push(bf);
        }
    }

    Ok(HdrImage {
        width,
        height,
        data,
    })
}

fn parse_header<R: BufRead>(reader: &mut R) -> RenderResult<(u32, u32)> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if !sniff_hdr(line.as_bytes()) {
        return Err(RenderError::decode("missing Radiance magic header"));
    }

    // Header lines up to the first empty line; FORMAT is mandatory.
    let mut format_found = false;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(RenderError::decode("truncated Radiance header"));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some(format) = trimmed.strip_prefix("FORMAT=") {
            if format != "32-bit_rle_rgbe" && format != "32-bit_rle_xyze" {
                return Err(RenderError::decode(format!(
                    "unsupported Radiance format: {format}"
                )));
            }
            format_found = true;
        }
    }
    if !format_found {
        return Err(RenderError::decode("Radiance header missing FORMAT"));
    }

    // Resolution line: "-Y <height> +X <width>"
    line.clear();
    reader.read_line(&mut line)?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 4 {
        return Err(RenderError::decode(format!(
            "invalid Radiance resolution line: {}",
            line.trim()
        )));
    }
    let height: u32 = parts[1]
        .parse()
        .map_err(|_| RenderError::decode(format!("invalid Radiance height: {}", parts[1])))?;
    let width: u32 = parts[3]
        .parse()
        .map_err(|_| RenderError::decode(format!("invalid Radiance width: {}", parts[3])))?;
    if width == 0 || height == 0 {
        return Err(RenderError::decode("Radiance image has zero dimension"));
    }

    Ok((width, height))
}

fn read_scanline<R: Read>(reader: &mut R, width: u32, y: u32) -> RenderResult<Vec<[u8; 4]>> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).map_err(|e| {
        RenderError::decode(format!("failed to read scanline header at row {y}: {e}"))
    })?;

    let new_rle = header[0] == 2
        && header[1] == 2
        && header[2] == ((width >> 8) & 0xff) as u8
        && header[3] == (width & 0xff) as u8;

    if new_rle {
        read_rle_scanline(reader, width)
    } else {
        // Flat scanline; the four bytes just read are its first pixel.
        let mut scanline = vec![[0u8; 4]; width as usize];
        scanline[0] = header;
        for pixel in scanline.iter_mut().skip(1) {
            reader.read_exact(pixel).map_err(|e| {
                RenderError::decode(format!("failed to read pixel data at row {y}: {e}"))
            })?;
        }
        Ok(scanline)
    }
}

fn read_rle_scanline<R: Read>(reader: &mut R, width: u32) -> RenderResult<Vec<[u8; 4]>> {
    let mut scanline = vec![[0u8; 4]; width as usize];

    // New-style RLE stores each of the four RGBE planes separately.
    for component in 0..4 {
        let mut pos = 0usize;
        while pos < width as usize {
            let mut run_info = [0u8; 1];
            reader.read_exact(&mut run_info)?;
            let run = run_info[0];

            if run > 128 {
                let count = (run - 128) as usize;
                if pos + count > width as usize {
                    return Err(RenderError::decode("RLE run exceeds scanline width"));
                }
                let mut value = [0u8; 1];
                reader.read_exact(&mut value)?;
                for texel in &mut scanline[pos..pos + count] {
                    texel[component] = value[0];
                }
                pos += count;
            } else {
                let count = run as usize;
                if pos + count > width as usize {
                    return Err(RenderError::decode("RLE literal exceeds scanline width"));
                }
                for i in 0..count {
                    let mut value = [0u8; 1];
                    reader.read_exact(&mut value)?;
                    scanline[pos + i][component] = value[0];
                }
                pos += count;
            }
        }
    }

    Ok(scanline)
}

/// Convert one RGBE texel to linear RGB using the shared exponent.
#[inline]
fn rgbe_to_rgb(r: u8, g: u8, b: u8, e: u8) -> (f32, f32, f32) {
    if e == 0 {
        (0.0, 0.0, 0.0)
    } else {
        let scale = 2.0f32.powi(e as i32 - 128 - 8);
        (r as f32 * scale, g as f32 * scale, b as f32 * scale)
    }
}
