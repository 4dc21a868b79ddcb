//! Pipeline stages for PDF-to-TIFF conversion.
//!
//! ```text
//! input ──▶ render ──▶ assemble
//! (bytes)   (pdfium)   (tiff)
//! ```
//!
//! 1. [`input`]: reject empty or non-PDF input before the engine is touched
//! 2. [`render`]: open the document and rasterise every page in order
//! 3. [`assemble`]: write the frames as one multi-page, compressed TIFF

pub mod assemble;
pub mod input;
pub mod render;
