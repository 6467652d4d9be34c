//! Test doubles for the preview pipeline

use std::sync::{Condvar, Mutex, PoisonError};

use crate::preview::key::canonical_locator;
use crate::preview::renderer::{PageRenderer, RenderScales};
use crate::preview::request::RenderError;
use crate::preview::types::{Bitmap, RenderedPreview};

/// Page size in pixels at scale 1.0
const FAKE_PAGE_WIDTH: f32 = 8.0;
const FAKE_PAGE_HEIGHT: f32 = 10.0;

/// Renderer that draws flat-colored pages and records every call.
///
/// Every document has `page_count` pages. Locators whose canonical form ends
/// in `missing.pdf` fail to open. A gated renderer blocks each render until
/// [`FakeRenderer::release_all`] is called.
pub struct FakeRenderer {
    page_count: u32,
    scales: RenderScales,
    calls: Mutex<Vec<(String, u32)>>,
    gate: Option<(Mutex<bool>, Condvar)>,
}

impl FakeRenderer {
    #[must_use]
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            scales: RenderScales::default(),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Hold every render until released
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gate = Some((Mutex::new(false), Condvar::new()));
        self
    }

    /// Let held and future renders through
    pub fn release_all(&self) {
        if let Some((open, cvar)) = &self.gate {
            *open.lock().unwrap_or_else(PoisonError::into_inner) = true;
            cvar.notify_all();
        }
    }

    /// Total render invocations
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Render invocations for an exact locator and page
    #[must_use]
    pub fn calls_for(&self, locator: &str, page: u32) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(l, p)| l == locator && *p == page)
            .count()
    }

    fn wait_for_gate(&self) {
        if let Some((open, cvar)) = &self.gate {
            let mut guard = open.lock().unwrap_or_else(PoisonError::into_inner);
            while !*guard {
                guard = cvar.wait(guard).unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    fn draw(page: u32, scale: f32) -> Result<Bitmap, RenderError> {
        let width = (FAKE_PAGE_WIDTH * scale).ceil() as u32;
        let height = (FAKE_PAGE_HEIGHT * scale).ceil() as u32;
        let shade = (page % 256) as u8;
        let pixels = [shade, 255 - shade, 128].repeat((width * height) as usize);
        Bitmap::from_rgb(width, height, scale, pixels)
    }
}

impl PageRenderer for FakeRenderer {
    fn render(&self, locator: &str, page: u32) -> Result<RenderedPreview, RenderError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((locator.to_string(), page));

        self.wait_for_gate();

        if canonical_locator(locator).ends_with("missing.pdf") {
            return Err(RenderError::open(locator, "no such document"));
        }
        if page == 0 || page > self.page_count {
            return Err(RenderError::page(
                page,
                format!("out of range, document has {} pages", self.page_count),
            ));
        }

        Ok(RenderedPreview {
            small: Self::draw(page, self.scales.small)?,
            large: Self::draw(page, self.scales.large)?,
        })
    }
}
