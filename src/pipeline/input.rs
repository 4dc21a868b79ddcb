//! Input validation: reject empty or obviously non-PDF input before the
//! engine is loaded.
//!
//! pdfium would eventually reject such input too, but checking here means an
//! empty upload is reported as [`ConvertError::InputMissing`] rather than a
//! parser failure, and garbage never reaches the native library.

use crate::error::ConvertError;
use std::path::Path;
use tracing::debug;

/// The PDF header may be preceded by junk; readers scan this many bytes for it.
const HEADER_SEARCH_WINDOW: usize = 1024;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Check that `bytes` is non-empty and carries a `%PDF-` header.
pub fn validate_pdf_bytes(bytes: &[u8]) -> Result<(), ConvertError> {
    if bytes.is_empty() {
        return Err(ConvertError::InputMissing);
    }

    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    if find_header(window).is_none() {
        let shown = &bytes[..bytes.len().min(8)];
        return Err(ConvertError::Decode {
            detail: format!("no %PDF- header (first bytes: {shown:?})"),
        });
    }
    Ok(())
}

fn find_header(window: &[u8]) -> Option<usize> {
    window
        .windows(PDF_MAGIC.len())
        .position(|w| w == PDF_MAGIC)
}

/// Read a PDF from disk and validate it.
pub fn read_pdf_file(path: &Path) -> Result<Vec<u8>, ConvertError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConvertError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => ConvertError::InputReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    validate_pdf_bytes(&bytes)?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_input_is_missing() {
        assert!(matches!(
            validate_pdf_bytes(&[]),
            Err(ConvertError::InputMissing)
        ));
    }

    #[test]
    fn non_pdf_is_decode_error() {
        let err = validate_pdf_bytes(b"GIF89a not a pdf").unwrap_err();
        assert!(matches!(err, ConvertError::Decode { .. }), "got {err:?}");
    }

    #[test]
    fn header_after_leading_junk_is_accepted() {
        let mut bytes = vec![b' '; 100];
        bytes.extend_from_slice(b"%PDF-1.4\n%%EOF\n");
        assert!(validate_pdf_bytes(&bytes).is_ok());
    }

    #[test]
    fn header_beyond_window_is_rejected() {
        let mut bytes = vec![0u8; HEADER_SEARCH_WINDOW + 10];
        bytes.extend_from_slice(b"%PDF-1.4");
        assert!(validate_pdf_bytes(&bytes).is_err());
    }

    #[test]
    fn missing_file_maps_to_file_not_found() {
        let err = read_pdf_file(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, ConvertError::FileNotFound { .. }));
    }

    #[test]
    fn read_pdf_file_returns_bytes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.7\n...").unwrap();
        let bytes = read_pdf_file(tmp.path()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
    }

    #[test]
    fn empty_file_is_missing_input() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            read_pdf_file(tmp.path()),
            Err(ConvertError::InputMissing)
        ));
    }
}
