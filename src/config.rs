//! Configuration types for PDF-to-TIFF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The defaults reproduce the classic
//! behaviour: 300 DPI on both axes, Deflate compression, every page in order.

use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// PDF user space unit: 1 point = 1/72 inch.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Default rendering resolution.
pub const DEFAULT_DPI: u32 = 300;

/// Products closer than this to an integer are treated as that integer
/// before rounding up, so `612 × 300/72` stays 2550 instead of 2551.
const PIXEL_EPSILON: f64 = 1e-6;

/// Linear point-to-pixel factors, applied independently per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Scale {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Factors for a target resolution against the 72-DPI point baseline.
    pub fn from_dpi(dpi_x: f64, dpi_y: f64) -> Self {
        Self {
            x: dpi_x / POINTS_PER_INCH,
            y: dpi_y / POINTS_PER_INCH,
        }
    }

    /// Effective resolution in dots per inch on each axis.
    pub fn dpi(&self) -> (f64, f64) {
        (self.x * POINTS_PER_INCH, self.y * POINTS_PER_INCH)
    }

    /// Pixel size of a page measured in points: `ceil(w·sx) × ceil(h·sy)`.
    pub fn pixel_size(&self, width_pt: f64, height_pt: f64) -> (u32, u32) {
        (
            scaled_extent(width_pt, self.x),
            scaled_extent(height_pt, self.y),
        )
    }

    fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x > 0.0 && self.y > 0.0
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::from_dpi(DEFAULT_DPI as f64, DEFAULT_DPI as f64)
    }
}

fn scaled_extent(points: f64, factor: f64) -> u32 {
    let exact = points * factor;
    let nearest = exact.round();
    let px = if (exact - nearest).abs() < PIXEL_EPSILON {
        nearest
    } else {
        exact.ceil()
    };
    // A page always yields at least one pixel row/column.
    px.clamp(1.0, u32::MAX as f64) as u32
}

/// Configuration for a PDF-to-TIFF conversion.
///
/// # Example
/// ```rust
/// use pdf2tiff::{ConversionConfig, TiffCompression};
///
/// let config = ConversionConfig::builder()
///     .dpi(200)
///     .compression(TiffCompression::Lzw)
///     .build()
///     .unwrap();
/// assert_eq!(config.scale.dpi().0.round(), 200.0);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Point-to-pixel factors. Default: 300/72 on both axes.
    pub scale: Scale,

    /// Per-frame compression. Default: [`TiffCompression::Deflate`].
    pub compression: TiffCompression,

    /// Effort level used when `compression` is Deflate. Default: Balanced.
    pub deflate_level: DeflateLevel,

    /// Record the DPI in XResolution / YResolution with ResolutionUnit=Inch.
    /// Default: true.
    ///
    /// When false the frames still carry the TIFF-mandated resolution tags,
    /// but as a unitless 1/1 with ResolutionUnit=None. Most viewers then
    /// assume 72 DPI and show a 300-DPI page at four times its physical size.
    pub embed_resolution: bool,

    /// Largest accepted frame width or height in pixels. Default: 20 000.
    ///
    /// An A0 poster at 300 DPI is roughly 9 900 × 14 000 px; anything beyond
    /// the cap fails with [`ConvertError::PageRender`] before a bitmap is
    /// allocated.
    pub max_frame_dimension: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            scale: Scale::default(),
            compression: TiffCompression::default(),
            deflate_level: DeflateLevel::default(),
            embed_resolution: true,
            max_frame_dimension: 20_000,
            password: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("scale", &self.scale)
            .field("compression", &self.compression)
            .field("deflate_level", &self.deflate_level)
            .field("embed_resolution", &self.embed_resolution)
            .field("max_frame_dimension", &self.max_frame_dimension)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    /// Same resolution on both axes.
    pub fn dpi(self, dpi: u32) -> Self {
        self.dpi_xy(dpi, dpi)
    }

    pub fn dpi_xy(mut self, dpi_x: u32, dpi_y: u32) -> Self {
        self.config.scale = Scale::from_dpi(dpi_x as f64, dpi_y as f64);
        self
    }

    /// Raw point-to-pixel factors, e.g. `(300.0 / 72.0, 300.0 / 72.0)`.
    pub fn scale(mut self, x: f64, y: f64) -> Self {
        self.config.scale = Scale::new(x, y);
        self
    }

    pub fn compression(mut self, compression: TiffCompression) -> Self {
        self.config.compression = compression;
        self
    }

    pub fn deflate_level(mut self, level: DeflateLevel) -> Self {
        self.config.deflate_level = level;
        self
    }

    pub fn embed_resolution(mut self, v: bool) -> Self {
        self.config.embed_resolution = v;
        self
    }

    pub fn max_frame_dimension(mut self, px: u32) -> Self {
        self.config.max_frame_dimension = px;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if !c.scale.is_valid() {
            return Err(ConvertError::InvalidConfig(format!(
                "scale factors must be finite and > 0, got ({}, {})",
                c.scale.x, c.scale.y
            )));
        }
        if c.max_frame_dimension == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_frame_dimension must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Lossless per-frame TIFF compression.
///
/// There is no "none" variant: every frame written by this crate is
/// compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TiffCompression {
    /// Adobe Deflate (TIFF compression tag 8). (default)
    #[default]
    Deflate,
    /// LZW (tag 5).
    Lzw,
    /// PackBits run-length (tag 32773). Fast, weak on anti-aliased text.
    PackBits,
}

impl TiffCompression {
    /// Value of the TIFF `Compression` tag written for this scheme.
    pub fn tag_value(&self) -> u16 {
        match self {
            TiffCompression::Deflate => 8,
            TiffCompression::Lzw => 5,
            TiffCompression::PackBits => 32773,
        }
    }
}

impl std::str::FromStr for TiffCompression {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deflate" | "zip" | "tiff_deflate" => Ok(TiffCompression::Deflate),
            "lzw" | "tiff_lzw" => Ok(TiffCompression::Lzw),
            "packbits" => Ok(TiffCompression::PackBits),
            other => Err(ConvertError::InvalidConfig(format!(
                "unknown compression '{other}' (expected deflate, lzw or packbits)"
            ))),
        }
    }
}

/// Deflate effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeflateLevel {
    Fast,
    #[default]
    Balanced,
    Best,
}
