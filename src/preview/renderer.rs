//! Page renderer adapter
//!
//! Wraps the document engine behind [`PageRenderer`]. A render opens the
//! document, loads the page and rasterizes it twice; either both bitmaps come
//! back or an error does.

use super::request::RenderError;
use super::types::RenderedPreview;
use super::{LARGE_SCALE, SMALL_SCALE};

/// Scale factors for the two bitmaps of a preview
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderScales {
    pub small: f32,
    pub large: f32,
}

impl Default for RenderScales {
    fn default() -> Self {
        Self {
            small: SMALL_SCALE,
            large: LARGE_SCALE,
        }
    }
}

/// Produces both preview bitmaps of one page.
///
/// Called from render worker threads, one call per render request.
pub trait PageRenderer: Send + Sync {
    fn render(&self, locator: &str, page: u32) -> Result<RenderedPreview, RenderError>;
}

#[cfg(feature = "pdf")]
pub use mupdf_backend::MupdfRenderer;

#[cfg(feature = "pdf")]
mod mupdf_backend {
    use std::io::Read;
    use std::time::Duration;

    use log::debug;
    use mupdf::{Colorspace, Document, Matrix, Page};

    use super::{PageRenderer, RenderScales};
    use crate::preview::key::canonical_locator;
    use crate::preview::request::RenderError;
    use crate::preview::types::{Bitmap, RenderedPreview};

    /// Upper bound for a fetched document
    const MAX_DOCUMENT_BYTES: u64 = 256 * 1024 * 1024;

    /// MuPDF-backed renderer; fetches remote documents over HTTP
    #[derive(Clone, Debug)]
    pub struct MupdfRenderer {
        scales: RenderScales,
        fetch_timeout: Duration,
    }

    impl MupdfRenderer {
        #[must_use]
        pub fn new(scales: RenderScales, fetch_timeout: Duration) -> Self {
            Self {
                scales,
                fetch_timeout,
            }
        }

        fn open_document(&self, locator: &str) -> Result<Document, RenderError> {
            if locator.starts_with("http://") || locator.starts_with("https://") {
                let bytes = self.fetch(locator)?;
                return Document::from_bytes(&bytes, "application/pdf")
                    .map_err(|e| RenderError::open(locator, e));
            }

            if let Some(path) = locator.strip_prefix("file://") {
                return Document::open(canonical_locator(path))
                    .map_err(|e| RenderError::open(locator, e));
            }

            // A local path may legitimately contain `#` or `?`
            match Document::open(locator) {
                Ok(doc) => Ok(doc),
                Err(e) => {
                    let stripped = canonical_locator(locator);
                    if stripped == locator {
                        return Err(RenderError::open(locator, e));
                    }
                    Document::open(stripped).map_err(|e| RenderError::open(locator, e))
                }
            }
        }

        fn fetch(&self, url: &str) -> Result<Vec<u8>, RenderError> {
            debug!("Fetching {url}");
            let response = ureq::get(url)
                .timeout(self.fetch_timeout)
                .call()
                .map_err(|e| RenderError::open(url, e))?;

            let mut bytes = Vec::new();
            response
                .into_reader()
                .take(MAX_DOCUMENT_BYTES)
                .read_to_end(&mut bytes)
                .map_err(|e| RenderError::open(url, e))?;
            Ok(bytes)
        }

        fn load_page(doc: &Document, page: u32) -> Result<Page, RenderError> {
            let page_count = doc
                .page_count()
                .map_err(|e| RenderError::page(page, e))?;
            let page_count = u32::try_from(page_count).unwrap_or(0);
            if page == 0 || page > page_count {
                return Err(RenderError::page(
                    page,
                    format!("out of range, document has {page_count} pages"),
                ));
            }

            // mupdf pages are 0-indexed
            doc.load_page((page - 1) as i32)
                .map_err(|e| RenderError::page(page, e))
        }

        fn rasterize(page: &Page, scale: f32) -> Result<Bitmap, RenderError> {
            let rgb = Colorspace::device_rgb();
            let pixmap = page
                .to_pixmap(&Matrix::new_scale(scale, scale), &rgb, false, false)
                .map_err(|e| RenderError::render(scale, e))?;
            let stride = usize::try_from(pixmap.stride())
                .map_err(|_| RenderError::render(scale, "negative pixmap stride"))?;
            Bitmap::from_samples(
                pixmap.width(),
                pixmap.height(),
                scale,
                usize::from(pixmap.n()),
                stride,
                pixmap.samples(),
            )
        }
    }

    impl PageRenderer for MupdfRenderer {
        fn render(&self, locator: &str, page: u32) -> Result<RenderedPreview, RenderError> {
            let doc = self.open_document(locator)?;
            let page_handle = Self::load_page(&doc, page)?;
            let small = Self::rasterize(&page_handle, self.scales.small)?;
            let large = Self::rasterize(&page_handle, self.scales.large)?;
            Ok(RenderedPreview { small, large })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scales() {
        let scales = RenderScales::default();
        assert_eq!(scales.small, 0.5);
        assert_eq!(scales.large, 1.5);
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn missing_file_is_open_failure() {
        let renderer = MupdfRenderer::new(
            RenderScales::default(),
            std::time::Duration::from_secs(1),
        );
        let err = renderer
            .render("/definitely/not/here/citeview-missing.pdf", 1)
            .unwrap_err();
        assert!(matches!(err, RenderError::Open { .. }));
        assert!(!err.message().is_empty());
    }

    #[cfg(feature = "pdf")]
    mod mupdf_documents {
        use std::path::Path;
        use std::time::Duration;

        use mupdf::Size;
        use mupdf::pdf::PdfDocument;

        use super::*;

        fn write_pdf(path: &Path, pages: usize) {
            let mut doc = PdfDocument::new();
            for _ in 0..pages {
                doc.new_page(Size::new(200.0, 300.0)).unwrap();
            }
            doc.save(path.to_str().unwrap()).unwrap();
        }

        fn renderer() -> MupdfRenderer {
            MupdfRenderer::new(RenderScales::default(), Duration::from_secs(1))
        }

        fn assert_close(actual: u32, expected: f32) {
            assert!(
                (actual as f32 - expected).abs() <= 1.0,
                "{actual} is not about {expected}"
            );
        }

        #[test]
        fn renders_both_scales_as_png() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("five.pdf");
            write_pdf(&path, 5);

            let preview = renderer().render(path.to_str().unwrap(), 1).unwrap();
            assert_close(preview.small.width_px, 100.0);
            assert_close(preview.small.height_px, 150.0);
            assert_close(preview.large.width_px, 300.0);
            assert_close(preview.large.height_px, 450.0);
            assert_eq!(&preview.small.png[1..4], b"PNG");
            assert_eq!(&preview.large.png[1..4], b"PNG");
        }

        #[test]
        fn out_of_range_pages_are_page_errors() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("five.pdf");
            write_pdf(&path, 5);
            let locator = path.to_str().unwrap();

            for page in [0, 6, 9999] {
                let err = renderer().render(locator, page).unwrap_err();
                assert!(matches!(err, RenderError::Page { .. }), "page {page}: {err}");
            }
            assert!(renderer().render(locator, 5).is_ok());
        }

        #[test]
        fn local_paths_keep_hash_and_question_marks() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("report#1.pdf");
            write_pdf(&path, 1);

            assert!(renderer().render(path.to_str().unwrap(), 1).is_ok());
        }

        #[test]
        fn decorated_local_paths_fall_back_to_the_plain_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("plain.pdf");
            write_pdf(&path, 2);
            let plain = path.to_str().unwrap();

            assert!(renderer().render(&format!("{plain}?v=2#page=2"), 2).is_ok());
            assert!(renderer().render(&format!("file://{plain}#toolbar=0"), 1).is_ok());
        }
    }
}
