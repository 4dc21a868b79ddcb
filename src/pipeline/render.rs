//! PDF rasterisation: render every page to a [`RasterFrame`] via pdfium.
//!
//! The stage is split in two:
//!
//! * [`PdfEngine`] / [`EngineDocument`]: the minimum a PDF library must offer:
//!   open a byte buffer, report page count and sizes, render one page at an
//!   exact pixel size. [`PdfiumEngine`] is the production implementation.
//! * [`rasterize_document`]: engine-independent policy: document order,
//!   per-axis scaling with `ceil`, the frame size cap, progress events, and
//!   aborting the whole conversion on the first page that fails.
//!
//! ## Document lifetime
//!
//! An opened document is a value borrowing the input bytes and the engine.
//! It is released when it goes out of scope, which happens on every exit path
//! of [`rasterize`], including early returns through `?`. For pdfium that
//! drop is what calls `FPDF_CloseDocument`.

use crate::config::{ConversionConfig, Scale};
use crate::error::ConvertError;
use crate::output::{DocumentMetadata, PageGeometry, RasterFrame};
use pdfium_render::prelude::*;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// A PDF library able to open documents from memory.
pub trait PdfEngine {
    type Document<'a>: EngineDocument
    where
        Self: 'a;

    /// Parse `bytes`. Fails with [`ConvertError::Decode`] or
    /// [`ConvertError::PasswordRequired`].
    fn open<'a>(
        &'a self,
        bytes: &'a [u8],
        password: Option<&str>,
    ) -> Result<Self::Document<'a>, ConvertError>;
}

/// An open document. Pages are addressed by 0-based index in document order.
pub trait EngineDocument {
    fn page_count(&self) -> usize;

    /// Page width and height in points, after the page's own rotation.
    fn page_size(&self, index: usize) -> Result<(f64, f64), String>;

    /// Render page `index` to exactly `width × height` RGB pixels on white.
    fn render_page(&self, index: usize, width: u32, height: u32) -> Result<RasterFrame, String>;

    /// Info dictionary and version. `pages` is left empty.
    fn metadata(&self) -> DocumentMetadata;
}

/// A rasterised page together with the geometry it was rendered from.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub geometry: PageGeometry,
    pub frame: RasterFrame,
}

/// Open `bytes` with `engine` and render every page in document order.
///
/// The returned vector has exactly one entry per page. A document with no
/// pages yields an empty vector; rejecting it is the caller's decision.
pub fn rasterize<E: PdfEngine>(
    engine: &E,
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<Vec<RenderedPage>, ConvertError> {
    let document = engine.open(bytes, config.password.as_deref())?;
    rasterize_document(&document, config)
}

/// Render every page of an already open document.
pub fn rasterize_document<D: EngineDocument>(
    document: &D,
    config: &ConversionConfig,
) -> Result<Vec<RenderedPage>, ConvertError> {
    let total = document.page_count();
    info!("PDF loaded: {} pages", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total);
    }

    let mut pages = Vec::with_capacity(total);
    for index in 0..total {
        let page_num = index + 1;
        let rendered = render_one(document, index, config).inspect_err(|e| {
            warn!("Page {} failed: {}", page_num, e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_error(page_num, total, &e.to_string());
            }
        })?;

        if let Some(ref cb) = config.progress_callback {
            cb.on_page_rendered(
                page_num,
                total,
                rendered.frame.width,
                rendered.frame.height,
            );
        }
        pages.push(rendered);
    }

    Ok(pages)
}

fn render_one<D: EngineDocument>(
    document: &D,
    index: usize,
    config: &ConversionConfig,
) -> Result<RenderedPage, ConvertError> {
    let page_num = index + 1;
    let fail = |detail: String| ConvertError::PageRender {
        page: page_num,
        detail,
    };

    let (width_pt, height_pt) = document.page_size(index).map_err(fail)?;
    let geometry = page_geometry(page_num, width_pt, height_pt, &config.scale);

    let cap = config.max_frame_dimension;
    if geometry.width_px > cap || geometry.height_px > cap {
        return Err(fail(format!(
            "{}x{} px exceeds the {} px limit",
            geometry.width_px, geometry.height_px, cap
        )));
    }

    let started = Instant::now();
    let frame = document
        .render_page(index, geometry.width_px, geometry.height_px)
        .map_err(fail)?;

    if (frame.width, frame.height) != (geometry.width_px, geometry.height_px)
        || frame.pixels.len() != RasterFrame::expected_len(frame.width, frame.height)
    {
        return Err(fail(format!(
            "engine returned {}x{} ({} bytes), expected {}x{}",
            frame.width,
            frame.height,
            frame.pixels.len(),
            geometry.width_px,
            geometry.height_px
        )));
    }

    debug!(
        "Rendered page {} ({:.1}x{:.1} pt) → {}x{} px in {}ms",
        page_num,
        width_pt,
        height_pt,
        frame.width,
        frame.height,
        started.elapsed().as_millis()
    );
    Ok(RenderedPage { geometry, frame })
}

fn page_geometry(page_num: usize, width_pt: f64, height_pt: f64, scale: &Scale) -> PageGeometry {
    let (width_px, height_px) = scale.pixel_size(width_pt, height_pt);
    PageGeometry {
        page_num,
        width_pt,
        height_pt,
        width_px,
        height_px,
    }
}

/// Read metadata and per-page geometry without rendering.
pub fn inspect<E: PdfEngine>(
    engine: &E,
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<DocumentMetadata, ConvertError> {
    let document = engine.open(bytes, config.password.as_deref())?;
    let mut meta = document.metadata();
    meta.page_count = document.page_count();
    meta.pages = (0..meta.page_count)
        .map(|index| {
            let (w, h) = document
                .page_size(index)
                .map_err(|detail| ConvertError::PageRender {
                    page: index + 1,
                    detail,
                })?;
            Ok(page_geometry(index + 1, w, h, &config.scale))
        })
        .collect::<Result<_, ConvertError>>()?;
    Ok(meta)
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// [`PdfEngine`] backed by a bound pdfium library.
///
/// Built with pdfium-render's `thread_safe` and `sync` features, so one engine
/// can live in a static and be shared across threads. Every conversion still
/// opens its own document.
/// pdfium can only be bound once per process, so most callers want
/// [`PdfiumEngine::shared`].
pub struct PdfiumEngine {
    pdfium: Pdfium,
}

static SHARED_ENGINE: OnceLock<PdfiumEngine> = OnceLock::new();
static SHARED_INIT: Mutex<()> = Mutex::new(());

impl PdfiumEngine {
    pub fn new(pdfium: Pdfium) -> Self {
        Self { pdfium }
    }

    /// The process-wide engine, bound on first use. pdfium is looked up via
    /// `PDFIUM_LIB_PATH`, then the cache, and downloaded if neither has it.
    pub fn shared() -> Result<&'static PdfiumEngine, ConvertError> {
        Self::shared_with(pdfium_auto::bind_pdfium_silent)
    }

    /// Like [`PdfiumEngine::shared`] but never touches the network.
    pub fn shared_offline() -> Result<&'static PdfiumEngine, ConvertError> {
        Self::shared_with(pdfium_auto::bind_pdfium_offline)
    }

    fn shared_with(
        bind: fn() -> Result<Pdfium, pdfium_auto::PdfiumAutoError>,
    ) -> Result<&'static PdfiumEngine, ConvertError> {
        if let Some(engine) = SHARED_ENGINE.get() {
            return Ok(engine);
        }
        let _guard = SHARED_INIT
            .lock()
            .map_err(|_| ConvertError::Internal("pdfium init lock poisoned".into()))?;
        if let Some(engine) = SHARED_ENGINE.get() {
            return Ok(engine);
        }
        let engine = Self::new(bind()?);
        debug!("pdfium bound");
        Ok(SHARED_ENGINE.get_or_init(|| engine))
    }
}

impl PdfEngine for PdfiumEngine {
    type Document<'a> = PdfiumDocument<'a>;

    fn open<'a>(
        &'a self,
        bytes: &'a [u8],
        password: Option<&str>,
    ) -> Result<PdfiumDocument<'a>, ConvertError> {
        check_trailer(bytes)?;
        let started = Instant::now();
        let doc = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(classify_load_error)?;
        trace!("Document opened in {}ms", started.elapsed().as_millis());
        Ok(PdfiumDocument { doc })
    }
}

/// How far from the end an `%%EOF` marker may sit (trailing junk allowance).
const EOF_SEARCH_WINDOW: usize = 1024;

/// pdfium rebuilds a missing xref by scanning objects, so a file cut short
/// still opens with whatever pages survived. Refuse it up front instead.
fn check_trailer(bytes: &[u8]) -> Result<(), ConvertError> {
    let tail = &bytes[bytes.len().saturating_sub(EOF_SEARCH_WINDOW)..];
    if tail.windows(5).any(|w| w == b"%%EOF") {
        Ok(())
    } else {
        Err(ConvertError::Decode {
            detail: format!(
                "truncated PDF: no %%EOF marker in the last {EOF_SEARCH_WINDOW} bytes"
            ),
        })
    }
}

fn classify_load_error(e: PdfiumError) -> ConvertError {
    let detail = format!("{:?}", e);
    if detail.contains("Password") || detail.contains("password") {
        ConvertError::PasswordRequired
    } else {
        ConvertError::Decode { detail }
    }
}

/// An open pdfium document; closed on drop.
pub struct PdfiumDocument<'a> {
    doc: PdfDocument<'a>,
}

impl Drop for PdfiumDocument<'_> {
    fn drop(&mut self) {
        trace!("Releasing document handle");
    }
}

impl<'a> PdfiumDocument<'a> {
    fn page(&self, index: usize) -> Result<PdfPage<'a>, String> {
        let idx: PdfPageIndex = index
            .try_into()
            .map_err(|_| format!("page index {index} out of range"))?;
        self.doc.pages().get(idx).map_err(|e| format!("{:?}", e))
    }
}

impl EngineDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.doc.pages().len() as usize
    }

    fn page_size(&self, index: usize) -> Result<(f64, f64), String> {
        let page = self.page(index)?;
        Ok((page.width().value as f64, page.height().value as f64))
    }

    fn render_page(&self, index: usize, width: u32, height: u32) -> Result<RasterFrame, String> {
        let page = self.page(index)?;
        let to_px = |v: u32| i32::try_from(v).map_err(|_| format!("{v} px exceeds i32"));

        let render_config = PdfRenderConfig::new()
            .set_target_size(to_px(width)?, to_px(height)?)
            .set_clear_color(PdfColor::WHITE)
            .render_form_data(true);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("{:?}", e))?;

        // The bitmap is painted over an opaque white fill; dropping alpha is
        // the flattening step.
        let rgb: image::RgbImage = bitmap.as_image().into_rgb8();
        let (w, h) = rgb.dimensions();
        Ok(RasterFrame::new(w, h, rgb.into_raw()))
    }

    fn metadata(&self) -> DocumentMetadata {
        let metadata = self.doc.metadata();
        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata
                .get(tag)
                .map(|t| t.value().to_string())
                .filter(|v| !v.is_empty())
        };

        DocumentMetadata {
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
            subject: get_meta(PdfDocumentMetadataTagType::Subject),
            creator: get_meta(PdfDocumentMetadataTagType::Creator),
            producer: get_meta(PdfDocumentMetadataTagType::Producer),
            creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
            modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
            page_count: 0,
            pdf_version: format!("{:?}", self.doc.version()),
            pages: Vec::new(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory engine for exercising the pipeline without pdfium.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Documents are encoded as `%PDF-fake <w>x<h> <w>x<h> …`; a page written
    /// as `fail` cannot be rendered, `bad` renders at the wrong size.
    #[derive(Default)]
    pub struct FakeEngine {
        pub open_documents: Arc<AtomicUsize>,
    }

    pub struct FakeDocument {
        pages: Vec<Option<(f64, f64)>>,
        wrong_size: Vec<bool>,
        open_documents: Arc<AtomicUsize>,
    }

    impl Drop for FakeDocument {
        fn drop(&mut self) {
            self.open_documents.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn fake_pdf(pages: &[&str]) -> Vec<u8> {
        format!("%PDF-fake {}", pages.join(" ")).into_bytes()
    }

    impl PdfEngine for FakeEngine {
        type Document<'a> = FakeDocument;

        fn open<'a>(
            &'a self,
            bytes: &'a [u8],
            password: Option<&str>,
        ) -> Result<FakeDocument, ConvertError> {
            let text = std::str::from_utf8(bytes).map_err(|e| ConvertError::Decode {
                detail: e.to_string(),
            })?;
            let body = text.strip_prefix("%PDF-fake").ok_or_else(|| ConvertError::Decode {
                detail: "FormatError".into(),
            })?;
            if body.contains("locked") && password != Some("secret") {
                return Err(ConvertError::PasswordRequired);
            }

            let mut pages = Vec::new();
            let mut wrong_size = Vec::new();
            for token in body.split_whitespace().filter(|t| *t != "locked") {
                let size = token.split_once('x').and_then(|(w, h)| {
                    Some((w.parse::<f64>().ok()?, h.parse::<f64>().ok()?))
                });
                wrong_size.push(token == "bad");
                pages.push(if token == "bad" { Some((10.0, 10.0)) } else { size });
            }
            self.open_documents.fetch_add(1, Ordering::SeqCst);
            Ok(FakeDocument {
                pages,
                wrong_size,
                open_documents: Arc::clone(&self.open_documents),
            })
        }
    }

    impl EngineDocument for FakeDocument {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_size(&self, index: usize) -> Result<(f64, f64), String> {
            Ok(self.pages[index].unwrap_or((10.0, 10.0)))
        }

        fn render_page(&self, index: usize, width: u32, height: u32) -> Result<RasterFrame, String> {
            if self.pages[index].is_none() {
                return Err("content stream is corrupt".into());
            }
            let (w, h) = if self.wrong_size[index] {
                (width + 1, height)
            } else {
                (width, height)
            };
            // Every pixel encodes its page number so order can be checked.
            let shade = (index as u8).wrapping_mul(40);
            Ok(RasterFrame::new(
                w,
                h,
                vec![shade; RasterFrame::expected_len(w, h)],
            ))
        }

        fn metadata(&self) -> DocumentMetadata {
            DocumentMetadata {
                title: Some("Fake".into()),
                pdf_version: "Pdf1_7".into(),
                ..Default::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{fake_pdf, FakeEngine};
    use super::*;
    use crate::progress::ConversionProgressCallback;
    use std::sync::{Arc, Mutex};

    fn config_at(dpi: u32) -> ConversionConfig {
        ConversionConfig::builder().dpi(dpi).build().unwrap()
    }

    #[test]
    fn pages_come_back_in_document_order_with_scaled_sizes() {
        let engine = FakeEngine::default();
        let pdf = fake_pdf(&["72x144", "144x72", "36x36"]);
        let pages = rasterize(&engine, &pdf, &config_at(144)).unwrap();

        let sizes: Vec<_> = pages.iter().map(|p| (p.frame.width, p.frame.height)).collect();
        assert_eq!(sizes, vec![(144, 288), (288, 144), (72, 72)]);
        let nums: Vec<_> = pages.iter().map(|p| p.geometry.page_num).collect();
        assert_eq!(nums, vec![1, 2, 3]);
        assert_eq!(pages[1].frame.pixels[0], 40);
    }

    #[test]
    fn zero_page_document_yields_no_frames() {
        let engine = FakeEngine::default();
        let pages = rasterize(&engine, &fake_pdf(&[]), &config_at(72)).unwrap();
        assert!(pages.is_empty());
    }

    #[test]
    fn failing_page_aborts_with_its_number() {
        let engine = FakeEngine::default();
        let pdf = fake_pdf(&["10x10", "fail", "10x10"]);
        let err = rasterize(&engine, &pdf, &config_at(72)).unwrap_err();
        assert!(
            matches!(err, ConvertError::PageRender { page: 2, .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn wrong_sized_bitmap_is_rejected() {
        let engine = FakeEngine::default();
        let err = rasterize(&engine, &fake_pdf(&["bad"]), &config_at(72)).unwrap_err();
        assert!(matches!(err, ConvertError::PageRender { page: 1, .. }));
    }

    #[test]
    fn oversize_page_fails_before_rendering() {
        let engine = FakeEngine::default();
        let config = ConversionConfig::builder()
            .dpi(300)
            .max_frame_dimension(1000)
            .build()
            .unwrap();
        let err = rasterize(&engine, &fake_pdf(&["612x792"]), &config).unwrap_err();
        assert!(err.to_string().contains("exceeds"), "got {err}");
    }

    #[test]
    fn document_is_released_on_success_and_failure() {
        let engine = FakeEngine::default();
        rasterize(&engine, &fake_pdf(&["10x10"]), &config_at(72)).unwrap();
        assert_eq!(engine.open_documents.load(std::sync::atomic::Ordering::SeqCst), 0);

        rasterize(&engine, &fake_pdf(&["fail"]), &config_at(72)).unwrap_err();
        assert_eq!(engine.open_documents.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn decode_failure_surfaces_parser_message() {
        let engine = FakeEngine::default();
        let err = rasterize(&engine, b"%PDX-garbage", &config_at(72)).unwrap_err();
        match err {
            ConvertError::Decode { detail } => assert!(detail.contains("FormatError")),
            other => panic!("expected Decode, got {other:?}"),
        }
    }

    #[test]
    fn password_is_forwarded_to_engine() {
        let engine = FakeEngine::default();
        let pdf = fake_pdf(&["locked", "10x10"]);
        assert!(matches!(
            rasterize(&engine, &pdf, &config_at(72)),
            Err(ConvertError::PasswordRequired)
        ));
        let config = ConversionConfig::builder()
            .dpi(72)
            .password("secret")
            .build()
            .unwrap();
        assert_eq!(rasterize(&engine, &pdf, &config).unwrap().len(), 1);
    }

    #[test]
    fn inspect_reports_geometry_without_rendering() {
        let engine = FakeEngine::default();
        let meta = inspect(&engine, &fake_pdf(&["612x792", "792x612"]), &config_at(300)).unwrap();
        assert_eq!(meta.page_count, 2);
        assert_eq!(meta.title.as_deref(), Some("Fake"));
        assert_eq!((meta.pages[0].width_px, meta.pages[0].height_px), (2550, 3300));
        assert_eq!((meta.pages[1].width_px, meta.pages[1].height_px), (3300, 2550));
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl ConversionProgressCallback for Events {
        fn on_conversion_start(&self, total_pages: usize) {
            self.0.lock().unwrap().push(format!("start {total_pages}"));
        }
        fn on_page_rendered(&self, page_num: usize, _total: usize, w: u32, h: u32) {
            self.0.lock().unwrap().push(format!("page {page_num} {w}x{h}"));
        }
        fn on_page_error(&self, page_num: usize, _total: usize, _error: &str) {
            self.0.lock().unwrap().push(format!("error {page_num}"));
        }
    }

    #[test]
    fn progress_events_follow_page_order() {
        let engine = FakeEngine::default();
        let events = Arc::new(Events::default());
        let config = ConversionConfig::builder()
            .dpi(72)
            .progress_callback(events.clone())
            .build()
            .unwrap();

        rasterize(&engine, &fake_pdf(&["10x20", "fail"]), &config).unwrap_err();
        assert_eq!(
            *events.0.lock().unwrap(),
            vec!["start 2", "page 1 10x20", "error 2"]
        );
    }

    #[test]
    fn pdfium_engine_can_be_shared_across_threads() {
        fn shareable<T: Send + Sync + 'static>() {}
        shareable::<PdfiumEngine>();
        shareable::<&'static PdfiumEngine>();
    }

    #[test]
    fn trailer_check_rejects_a_cut_document() {
        let mut pdf = b"%PDF-1.4\n1 0 obj\n<< >>\nendobj\n".to_vec();
        let err = check_trailer(&pdf).unwrap_err();
        assert!(matches!(err, ConvertError::Decode { .. }), "got {err:?}");

        pdf.extend_from_slice(b"trailer\n<< >>\nstartxref\n9\n%%EOF\n");
        check_trailer(&pdf).unwrap();

        // Trailing junk after the marker is tolerated up to the window.
        pdf.extend_from_slice(&[b' '; EOF_SEARCH_WINDOW - 16]);
        check_trailer(&pdf).unwrap();
        pdf.extend_from_slice(&[b' '; 32]);
        assert!(check_trailer(&pdf).is_err());
    }
}
