//! Citation preview pipeline: cache, dedup scheduler and render workers

pub mod answer;
mod cache;
pub mod citation;
mod controller;
pub mod key;
pub mod renderer;
pub mod request;
mod service;
pub mod types;
mod worker;

pub use answer::{AssistantReply, citations_from_documents, parse_answer_text};
pub use cache::{EvictionPolicy, LruBound, PreviewStore, Unbounded};
pub use citation::{Citation, CitationError, Message, Role};
pub use controller::{CitationSurface, Thumbnail};
pub use key::{PreviewKey, derive_key};
#[cfg(feature = "pdf")]
pub use renderer::MupdfRenderer;
pub use renderer::{PageRenderer, RenderScales};
pub use request::{RenderError, RenderRequest, RenderResponse, RequestId};
pub use service::{EnsureOutcome, PreviewScheduler};
pub use types::{Bitmap, PreviewState, RenderedPreview};

/// Scale factor for inline thumbnails
pub const SMALL_SCALE: f32 = 0.5;
/// Scale factor for the full-size modal
pub const LARGE_SCALE: f32 = 1.5;
/// Render worker threads
pub const DEFAULT_WORKERS: usize = 2;
