//! Conversion entry points.
//!
//! All variants run the same blocking pipeline:
//!
//! ```text
//! validate ──▶ rasterize (every page, in order) ──▶ assemble ──▶ TIFF bytes
//! ```
//!
//! Any failure aborts the whole conversion; no partial TIFF is ever returned.
//! pdfium is CPU-bound and not async-aware, so async hosts should call
//! [`convert_async`], which moves the work onto tokio's blocking pool.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata};
use crate::pipeline::render::{self, PdfEngine, PdfiumEngine};
use crate::pipeline::{assemble, input};
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};

/// Convert PDF bytes to a multi-page TIFF with the shared pdfium engine.
///
/// The TIFF has one RGB frame per page, in document order, each sized
/// `ceil(width_pt · scale.x) × ceil(height_pt · scale.y)`.
///
/// # Errors
/// - [`ConvertError::InputMissing`] for empty input
/// - [`ConvertError::Decode`] / [`ConvertError::PasswordRequired`] if the
///   document cannot be opened
/// - [`ConvertError::EmptyDocument`] if it has no pages
/// - [`ConvertError::PageRender`] naming the first page that failed
/// - [`ConvertError::Encode`] if the TIFF cannot be written
pub fn convert(pdf: &[u8], config: &ConversionConfig) -> Result<Vec<u8>, ConvertError> {
    input::validate_pdf_bytes(pdf)?;
    let engine = PdfiumEngine::shared()?;
    Ok(convert_with(engine, pdf, config)?.tiff)
}

/// Run the pipeline over an injected engine and return the TIFF together
/// with per-frame geometry and timings.
pub fn convert_with<E: PdfEngine>(
    engine: &E,
    pdf: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let total_start = Instant::now();
    input::validate_pdf_bytes(pdf)?;
    info!("Starting conversion: {} input bytes", pdf.len());

    // ── Rasterise ────────────────────────────────────────────────────────
    let render_start = Instant::now();
    let pages = render::rasterize(engine, pdf, config).inspect_err(|e| {
        error!("Rasterisation failed ({}): {}", e.kind(), e);
    })?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    if pages.is_empty() {
        return Err(ConvertError::EmptyDocument);
    }
    info!("Rendered {} pages in {}ms", pages.len(), render_duration_ms);

    // ── Assemble ─────────────────────────────────────────────────────────
    let (geometry, frames): (Vec<_>, Vec<_>) =
        pages.into_iter().map(|p| (p.geometry, p.frame)).unzip();
    let raw_bytes: u64 = frames.iter().map(|f| f.pixels.len() as u64).sum();

    let encode_start = Instant::now();
    let tiff = assemble::assemble(&frames, config)?;
    let encode_duration_ms = encode_start.elapsed().as_millis() as u64;
    drop(frames);

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(geometry.len(), tiff.len());
    }

    let stats = ConversionStats {
        page_count: geometry.len(),
        frames_written: geometry.len(),
        raw_bytes,
        tiff_bytes: tiff.len() as u64,
        render_duration_ms,
        encode_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Conversion complete: {} frames, {} bytes, ratio {:.1}x, {}ms",
        stats.frames_written,
        stats.tiff_bytes,
        stats.compression_ratio(),
        stats.total_duration_ms
    );

    Ok(ConversionOutput {
        tiff,
        frames: geometry,
        stats,
    })
}

/// Convert a PDF file and write the TIFF to `output_path`.
///
/// The TIFF is written to a temporary file next to the destination and renamed
/// into place, so the destination either keeps its previous content or holds
/// the complete new TIFF.
pub fn convert_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, ConvertError> {
    let engine = PdfiumEngine::shared()?;
    convert_file_with(engine, input_path.as_ref(), output_path.as_ref(), config)
}

/// [`convert_file`] over an injected engine.
pub fn convert_file_with<E: PdfEngine>(
    engine: &E,
    input_path: &Path,
    output_path: &Path,
    config: &ConversionConfig,
) -> Result<ConversionStats, ConvertError> {
    let pdf = input::read_pdf_file(input_path)?;
    let output = convert_with(engine, &pdf, config)?;
    write_atomic(output_path, &output.tiff)?;
    debug!("Wrote {}", output_path.display());
    Ok(output.stats)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let write_failed = |source: std::io::Error| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_failed)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_failed)?;
    tmp.write_all(bytes).map_err(write_failed)?;
    tmp.as_file().sync_all().map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}

/// Async wrapper around [`convert`] for tokio hosts.
pub async fn convert_async(pdf: Vec<u8>, config: ConversionConfig) -> Result<Vec<u8>, ConvertError> {
    tokio::task::spawn_blocking(move || convert(&pdf, &config))
        .await
        .map_err(|e| ConvertError::Internal(format!("Conversion task panicked: {}", e)))?
}

/// Read page count, geometry and document info without rendering.
///
/// Predicted pixel sizes use the default 300 DPI scale.
pub fn inspect(pdf: &[u8], password: Option<&str>) -> Result<DocumentMetadata, ConvertError> {
    input::validate_pdf_bytes(pdf)?;
    let mut builder = ConversionConfig::builder();
    if let Some(pwd) = password {
        builder = builder.password(pwd);
    }
    let config = builder.build()?;
    render::inspect(PdfiumEngine::shared()?, pdf, &config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::assemble::read_frames;
    use crate::pipeline::render::testing::{fake_pdf, FakeEngine};
    use crate::progress::ConversionProgressCallback;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config_at(dpi: u32) -> ConversionConfig {
        ConversionConfig::builder().dpi(dpi).build().unwrap()
    }

    #[test]
    fn three_pages_become_three_frames_in_order() {
        let engine = FakeEngine::default();
        let pdf = fake_pdf(&["612x792", "792x612", "612x792"]);
        let out = convert_with(&engine, &pdf, &config_at(30)).unwrap();

        let frames = read_frames(&out.tiff).unwrap();
        assert_eq!(frames.len(), 3);
        let sizes: Vec<_> = frames.iter().map(|f| (f.width, f.height)).collect();
        assert_eq!(sizes, vec![(255, 330), (330, 255), (255, 330)]);
        // FakeEngine paints page i with shade 40·i.
        let shades: Vec<_> = frames.iter().map(|f| f.pixels[0]).collect();
        assert_eq!(shades, vec![0, 40, 80]);
        assert_eq!(out.frames.len(), 3);
        assert_eq!(out.stats.frames_written, 3);
    }

    #[test]
    fn default_scale_gives_letter_at_300_dpi() {
        let engine = FakeEngine::default();
        let out = convert_with(&engine, &fake_pdf(&["612x792"]), &ConversionConfig::default())
            .unwrap();
        assert_eq!((out.frames[0].width_px, out.frames[0].height_px), (2550, 3300));
    }

    #[test]
    fn zero_pages_is_empty_document() {
        let engine = FakeEngine::default();
        let err = convert_with(&engine, &fake_pdf(&[]), &config_at(72)).unwrap_err();
        assert!(matches!(err, ConvertError::EmptyDocument));
    }

    #[test]
    fn empty_input_never_reaches_the_engine() {
        let engine = FakeEngine::default();
        let err = convert_with(&engine, &[], &config_at(72)).unwrap_err();
        assert!(matches!(err, ConvertError::InputMissing));
        assert_eq!(engine.open_documents.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn page_failure_aborts_without_output() {
        let engine = FakeEngine::default();
        let pdf = fake_pdf(&["72x72", "72x72", "fail", "72x72"]);
        match convert_with(&engine, &pdf, &config_at(72)) {
            Err(ConvertError::PageRender { page, .. }) => assert_eq!(page, 3),
            other => panic!("expected PageRender, got {other:?}"),
        }
    }

    #[test]
    fn repeated_conversion_is_byte_identical() {
        let engine = FakeEngine::default();
        let pdf = fake_pdf(&["100x50", "50x100"]);
        let a = convert_with(&engine, &pdf, &config_at(72)).unwrap().tiff;
        let b = convert_with(&engine, &pdf, &config_at(72)).unwrap().tiff;
        assert_eq!(a, b);
    }

    #[test]
    fn completion_event_reports_frames_and_size() {
        #[derive(Default)]
        struct Done {
            frames: AtomicUsize,
            bytes: AtomicUsize,
        }
        impl ConversionProgressCallback for Done {
            fn on_conversion_complete(&self, frames: usize, tiff_bytes: usize) {
                self.frames.store(frames, Ordering::SeqCst);
                self.bytes.store(tiff_bytes, Ordering::SeqCst);
            }
        }

        let done = Arc::new(Done::default());
        let config = ConversionConfig::builder()
            .dpi(72)
            .progress_callback(done.clone())
            .build()
            .unwrap();
        let engine = FakeEngine::default();
        let out = convert_with(&engine, &fake_pdf(&["10x10", "10x10"]), &config).unwrap();

        assert_eq!(done.frames.load(Ordering::SeqCst), 2);
        assert_eq!(done.bytes.load(Ordering::SeqCst), out.tiff.len());
    }

    #[test]
    fn convert_file_writes_atomically_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, fake_pdf(&["20x20", "20x20"])).unwrap();
        let output = dir.path().join("nested").join("out.tiff");

        let engine = FakeEngine::default();
        let stats = convert_file_with(&engine, &input, &output, &config_at(72)).unwrap();

        assert_eq!(stats.frames_written, 2);
        let written = std::fs::read(&output).unwrap();
        assert_eq!(written.len() as u64, stats.tiff_bytes);
        assert_eq!(read_frames(&written).unwrap().len(), 2);
        // Only the final file remains; the temporary was renamed away.
        let entries = std::fs::read_dir(output.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn failed_conversion_leaves_existing_output_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, fake_pdf(&["fail"])).unwrap();
        let output = dir.path().join("out.tiff");
        std::fs::write(&output, b"previous").unwrap();

        let engine = FakeEngine::default();
        assert!(convert_file_with(&engine, &input, &output, &config_at(72)).is_err());
        assert_eq!(std::fs::read(&output).unwrap(), b"previous");
    }

    #[test]
    fn missing_input_file_is_reported() {
        let engine = FakeEngine::default();
        let err = convert_file_with(
            &engine,
            Path::new("/no/such/input.pdf"),
            Path::new("/tmp/never-written.tiff"),
            &config_at(72),
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::FileNotFound { .. }));
    }
}
