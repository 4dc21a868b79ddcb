//! Data carried between pipeline stages and returned to callers.

use serde::{Deserialize, Serialize};

/// Bytes per pixel of a [`RasterFrame`]: 8-bit R, G, B.
pub const RGB_CHANNELS: usize = 3;

/// One rendered page: packed RGB8, row-major, top row first, no padding.
///
/// A plain value; the rasteriser produces it and the assembler consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Length `pixels` must have for the declared size.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * RGB_CHANNELS
    }
}

/// Size of one page before and after scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// 1-indexed page number.
    pub page_num: usize,
    pub width_pt: f64,
    pub height_pt: f64,
    pub width_px: u32,
    pub height_px: u32,
}

/// Document-level information gathered without rasterising.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    /// Geometry per page with pixel sizes at the configured scale.
    pub pages: Vec<PageGeometry>,
}

/// Timings and sizes of one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub page_count: usize,
    pub frames_written: usize,
    /// Sum of uncompressed RGB bytes over all frames.
    pub raw_bytes: u64,
    pub tiff_bytes: u64,
    pub render_duration_ms: u64,
    pub encode_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ConversionStats {
    /// `raw_bytes / tiff_bytes`; 0 when nothing was written.
    pub fn compression_ratio(&self) -> f64 {
        if self.tiff_bytes == 0 {
            0.0
        } else {
            self.raw_bytes as f64 / self.tiff_bytes as f64
        }
    }
}

/// Full result of [`crate::convert::convert_with`].
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// The multi-page TIFF.
    pub tiff: Vec<u8>,
    /// Frame `i` was rendered from `frames[i]`.
    pub frames: Vec<PageGeometry>,
    pub stats: ConversionStats,
}
