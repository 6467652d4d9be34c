// Export modules for use in tests
pub mod preview;
pub mod settings;
pub mod transcript;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the pipeline entry points
pub use preview::{Citation, CitationSurface, Message, PreviewKey, PreviewScheduler, PreviewState};
