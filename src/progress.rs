//! Progress-callback trait for per-page conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events while pages are rasterised and the TIFF is written. The CLI uses it
//! to drive its progress bar; a server might forward the events to a log.
//!
//! # Example
//!
//! ```rust
//! use pdf2tiff::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rendered: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_page_rendered(&self, page_num: usize, total_pages: usize, width: u32, height: u32) {
//!         self.rendered.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num}/{total_pages}: {width}x{height}");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { rendered: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it processes each page.
///
/// Pages are rendered strictly in document order on the calling thread, so
/// events arrive in order. Implementations are still `Send + Sync` because a
/// config may be shared with conversions running on other threads. All
/// methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the document is open and its page count is known.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after page `page_num` (1-indexed) has been rasterised.
    fn on_page_rendered(&self, page_num: usize, total_pages: usize, width: u32, height: u32) {
        let _ = (page_num, total_pages, width, height);
    }

    /// Called when page `page_num` fails; the conversion aborts right after.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once the TIFF has been assembled.
    ///
    /// * `frames`: frames written (equals the page count)
    /// * `tiff_bytes`: size of the produced artifact
    fn on_conversion_complete(&self, frames: usize, tiff_bytes: usize) {
        let _ = (frames, tiff_bytes);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        started_total: AtomicUsize,
        rendered: Mutex<Vec<(usize, u32, u32)>>,
        errors: AtomicUsize,
        frames_done: AtomicUsize,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_conversion_start(&self, total_pages: usize) {
            self.started_total.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_rendered(&self, page_num: usize, _total: usize, width: u32, height: u32) {
            self.rendered.lock().unwrap().push((page_num, width, height));
        }

        fn on_page_error(&self, _page_num: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_conversion_complete(&self, frames: usize, _tiff_bytes: usize) {
            self.frames_done.store(frames, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(5);
        cb.on_page_rendered(1, 5, 10, 10);
        cb.on_page_error(2, 5, "some error");
        cb.on_conversion_complete(5, 1024);
    }

    #[test]
    fn recorder_sees_events_in_order() {
        let rec = Recorder::default();
        rec.on_conversion_start(2);
        rec.on_page_rendered(1, 2, 2550, 3300);
        rec.on_page_rendered(2, 2, 3300, 2550);
        rec.on_conversion_complete(2, 4096);

        assert_eq!(rec.started_total.load(Ordering::SeqCst), 2);
        assert_eq!(
            *rec.rendered.lock().unwrap(),
            vec![(1, 2550, 3300), (2, 3300, 2550)]
        );
        assert_eq!(rec.errors.load(Ordering::SeqCst), 0);
        assert_eq!(rec.frames_done.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_conversion_start(10);
        cb.on_page_rendered(1, 10, 1, 1);
    }
}
