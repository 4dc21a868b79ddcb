//! Error types for the pdf2tiff library.
//!
//! A single fatal error type, [`ConvertError`], covers every way a conversion
//! can fail. There is no "partial success" type: a TIFF is only produced
//! when every page rasterised, so the frame count in the output always equals
//! the page count of the source.
//!
//! Variants fall into two classes, exposed through
//! [`ConvertError::is_client_error`]:
//!
//! * **Caller input**: nothing was supplied, the bytes are not a PDF, the PDF
//!   has no pages or needs a password. Retrying with the same input will fail
//!   the same way (HTTP 4xx).
//! * **Internal**: pdfium could not be loaded, a page failed to render, the
//!   TIFF encoder or the filesystem failed (HTTP 5xx).

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdf2tiff library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No input bytes were supplied.
    #[error("No PDF input supplied (0 bytes)")]
    InputMissing,

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The bytes could not be parsed as a PDF document.
    #[error("Input is not a readable PDF: {detail}")]
    Decode { detail: String },

    /// The PDF is encrypted and no (or a wrong) password was supplied.
    #[error("PDF is encrypted and requires a valid password")]
    PasswordRequired,

    /// The PDF parsed but declares no pages.
    #[error("PDF contains no pages; refusing to write an empty TIFF")]
    EmptyDocument,

    // ── Processing errors ─────────────────────────────────────────────────
    /// A specific page could not be rasterised. The whole conversion aborts.
    #[error("Rasterisation failed for page {page}: {detail}")]
    PageRender { page: usize, detail: String },

    /// Frames could not be written as a TIFF.
    #[error("TIFF encoding failed: {detail}")]
    Encode { detail: String },

    /// The pdfium library could not be bound.
    #[error(
        "Failed to load the pdfium engine: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    EngineUnavailable(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read the input file.
    #[error("Failed to read '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output TIFF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// `true` when the failure is caused by what the caller supplied rather
    /// than by this process.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConvertError::InputMissing
                | ConvertError::FileNotFound { .. }
                | ConvertError::Decode { .. }
                | ConvertError::PasswordRequired
                | ConvertError::EmptyDocument
                | ConvertError::InvalidConfig(_)
        )
    }

    /// Process exit status for the CLI.
    ///
    /// `2` nothing usable was supplied, `3` the document itself was rejected,
    /// `1` anything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            ConvertError::InputMissing
            | ConvertError::FileNotFound { .. }
            | ConvertError::InvalidConfig(_) => 2,
            ConvertError::Decode { .. }
            | ConvertError::PasswordRequired
            | ConvertError::EmptyDocument => 3,
            _ => 1,
        }
    }

    /// Stable machine-readable identifier, used in logs and HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::InputMissing => "INPUT_MISSING",
            ConvertError::FileNotFound { .. } => "FILE_NOT_FOUND",
            ConvertError::Decode { .. } => "DECODE_ERROR",
            ConvertError::PasswordRequired => "PASSWORD_REQUIRED",
            ConvertError::EmptyDocument => "EMPTY_DOCUMENT",
            ConvertError::PageRender { .. } => "PAGE_RENDER_ERROR",
            ConvertError::Encode { .. } => "ENCODE_ERROR",
            ConvertError::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
            ConvertError::InputReadFailed { .. } => "INPUT_READ_FAILED",
            ConvertError::OutputWriteFailed { .. } => "OUTPUT_WRITE_FAILED",
            ConvertError::InvalidConfig(_) => "INVALID_CONFIG",
            ConvertError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<tiff::TiffError> for ConvertError {
    fn from(e: tiff::TiffError) -> Self {
        ConvertError::Encode {
            detail: e.to_string(),
        }
    }
}

impl From<pdfium_auto::PdfiumAutoError> for ConvertError {
    fn from(e: pdfium_auto::PdfiumAutoError) -> Self {
        ConvertError::EngineUnavailable(e.to_string())
    }
}
