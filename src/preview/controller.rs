//! Citation surface - binds the message list to the preview scheduler

use std::sync::Arc;

use super::citation::{Citation, Message};
use super::key::{PreviewKey, derive_key};
use super::service::{EnsureOutcome, PreviewScheduler};
use super::types::{Bitmap, PreviewState};

/// What a thumbnail slot should show
#[derive(Clone, Debug)]
pub enum Thumbnail {
    /// Not requested yet
    Idle,
    /// Spinner
    Loading,
    /// Small bitmap, clickable to open the modal
    Image(Arc<Bitmap>),
    /// Render failed: offer to open the document externally
    External {
        locator: String,
        title: String,
        reason: String,
    },
}

/// Reactive layer between the chat view and the preview cache
pub struct CitationSurface {
    scheduler: PreviewScheduler,
}

impl CitationSurface {
    #[must_use]
    pub fn new(scheduler: PreviewScheduler) -> Self {
        Self { scheduler }
    }

    /// Submit every citation of every message.
    ///
    /// Called on each message-list change; citations already seen are
    /// submitted again and deduplicated by the scheduler. Returns how many new
    /// renders were started.
    pub fn on_messages_changed(&mut self, messages: &[Message]) -> usize {
        messages
            .iter()
            .flat_map(|m| m.citations.iter())
            .filter(|c| matches!(self.scheduler.ensure_preview(c), EnsureOutcome::Scheduled(_)))
            .count()
    }

    /// Apply finished renders; returns keys whose thumbnails need repainting
    pub fn sync(&mut self) -> Vec<PreviewKey> {
        self.scheduler.poll_responses()
    }

    #[must_use]
    pub fn is_loading(&self, key: &PreviewKey) -> bool {
        self.scheduler.store().is_pending(key)
    }

    #[must_use]
    pub fn error_message(&self, key: &PreviewKey) -> Option<&str> {
        self.scheduler.store().error(key)
    }

    #[must_use]
    pub fn small_bitmap(&self, key: &PreviewKey) -> Option<Arc<Bitmap>> {
        self.scheduler.store().small_bitmap(key)
    }

    /// Large bitmap for the modal, only once the preview is ready.
    ///
    /// `None` means "not available yet, do not open the modal".
    #[must_use]
    pub fn select_for_modal(&self, citation: &Citation) -> Option<Arc<Bitmap>> {
        match self.scheduler.state(citation) {
            PreviewState::Ready { large, .. } => Some(large),
            _ => None,
        }
    }

    /// Combined view of one citation's preview
    #[must_use]
    pub fn thumbnail(&self, citation: &Citation) -> Thumbnail {
        match self.scheduler.store().get(&derive_key(citation)) {
            PreviewState::Idle => Thumbnail::Idle,
            PreviewState::Pending => Thumbnail::Loading,
            PreviewState::Ready { small, .. } => Thumbnail::Image(small),
            PreviewState::Failed { message } => Thumbnail::External {
                locator: citation.document_locator.clone(),
                title: citation.title.clone(),
                reason: message,
            },
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &PreviewScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut PreviewScheduler {
        &mut self.scheduler
    }
}
