//! Render request and response types

use super::key::PreviewKey;
use super::types::RenderedPreview;

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderRequest {
    /// Render both resolutions of a page
    Preview {
        id: RequestId,
        key: PreviewKey,
        /// Locator as first cited, decorations intact
        locator: String,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Errors from the page renderer
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// Document unreachable or malformed
    #[error("cannot open {locator}: {detail}")]
    Open { locator: String, detail: String },

    /// Page index out of range or page unloadable
    #[error("page {page}: {detail}")]
    Page { page: u32, detail: String },

    /// Rasterization surface unavailable
    #[error("rendering at scale {scale} failed: {detail}")]
    Render { scale: f32, detail: String },
}

impl RenderError {
    pub fn open(locator: impl Into<String>, detail: impl ToString) -> Self {
        Self::Open {
            locator: locator.into(),
            detail: detail.to_string(),
        }
    }

    pub fn page(page: u32, detail: impl ToString) -> Self {
        Self::Page {
            page,
            detail: detail.to_string(),
        }
    }

    pub fn render(scale: f32, detail: impl ToString) -> Self {
        Self::Render {
            scale,
            detail: detail.to_string(),
        }
    }

    /// Message stored in the failed state
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Response from render workers
#[derive(Debug)]
pub enum RenderResponse {
    /// Both bitmaps rendered
    Preview {
        id: RequestId,
        key: PreviewKey,
        preview: Box<RenderedPreview>,
    },

    /// Error during rendering
    Error {
        id: RequestId,
        key: PreviewKey,
        error: RenderError,
    },
}

impl RenderResponse {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Preview { id, .. } | Self::Error { id, .. } => *id,
        }
    }
}
