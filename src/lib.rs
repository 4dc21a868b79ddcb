//! # pdf2tiff
//!
//! Rasterise every page of a PDF into a single multi-page TIFF.
//!
//! Each page becomes one RGB frame, in document order, at a fixed
//! point-to-pixel scale (300 DPI by default), and every frame is compressed
//! losslessly (Deflate by default). Either all pages convert or the call
//! fails: there is no partial output.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Input     reject empty / non-PDF input
//!  ├─ 2. Render    open with pdfium, rasterise each page to RGB8
//!  ├─ 3. Assemble  one TIFF IFD per page, Deflate/LZW/PackBits
//!  └─ 4. Output    TIFF bytes + per-frame geometry and timings
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2tiff::{convert, ConversionConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pdf = std::fs::read("document.pdf")?;
//!     let tiff = convert(&pdf, &ConversionConfig::default())?;
//!     std::fs::write("output.tiff", tiff)?;
//!     Ok(())
//! }
//! ```
//!
//! pdfium is located through `PDFIUM_LIB_PATH`, a per-version cache, or a
//! one-time download (see the `pdfium-auto` crate).
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `pdf2tiff` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | off     | `POST /api/convertpdf2tiff` over axum and the `--serve` CLI flag |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, DeflateLevel, Scale, TiffCompression};
pub use convert::{convert, convert_async, convert_file, convert_file_with, convert_with, inspect};
pub use error::ConvertError;
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata, PageGeometry, RasterFrame};
pub use pipeline::assemble::read_frames;
pub use pipeline::render::{PdfEngine, PdfiumEngine};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
