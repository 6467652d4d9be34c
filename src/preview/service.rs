//! Preview scheduler - deduplicates render requests and owns the cache
//!
//! The scheduler lives on the control thread. The check of a key's state and
//! the `Pending` mark happen inside one `&mut self` call before anything is
//! handed to a worker, so two citations of the same page can never both
//! start a render.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};

use super::cache::PreviewStore;
use super::citation::Citation;
use super::key::{PreviewKey, derive_key};
use super::renderer::PageRenderer;
use super::request::{RenderRequest, RenderResponse, RequestId};
use super::types::PreviewState;
use super::worker::render_worker;
use super::DEFAULT_WORKERS;

const WORKERS_UNAVAILABLE: &str = "render workers unavailable";

/// What `ensure_preview` did for a citation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// Already cached
    Ready,
    /// A render for the key is already in flight
    InFlight,
    /// An earlier render failed; no retry
    Failed,
    /// A new render was started
    Scheduled(RequestId),
}

/// Dedup scheduler over a pool of render workers
pub struct PreviewScheduler {
    store: PreviewStore,
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    next_request_id: u64,
    pending_requests: HashMap<RequestId, PreviewKey>,
    num_workers: usize,
}

impl PreviewScheduler {
    /// Create a scheduler with an unbounded cache and default worker count
    #[must_use]
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self::with_config(renderer, DEFAULT_WORKERS, PreviewStore::unbounded())
    }

    /// Create a scheduler with custom configuration
    #[must_use]
    pub fn with_config(
        renderer: Arc<dyn PageRenderer>,
        num_workers: usize,
        store: PreviewStore,
    ) -> Self {
        // flume gives MPMC channels: every worker pulls from the same queue
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let num_workers = num_workers.max(1);
        for _ in 0..num_workers {
            let renderer = Arc::clone(&renderer);
            let rx = request_rx.clone();
            let tx = response_tx.clone();

            std::thread::spawn(move || {
                render_worker(renderer, rx, tx);
            });
        }

        Self {
            store,
            request_tx,
            response_rx,
            next_request_id: 1,
            pending_requests: HashMap::new(),
            num_workers,
        }
    }

    /// Make sure a preview for `citation` exists or is being produced.
    ///
    /// Idempotent: at most one render per key is ever outstanding, and ready
    /// or failed keys are left alone.
    pub fn ensure_preview(&mut self, citation: &Citation) -> EnsureOutcome {
        let key = derive_key(citation);

        match self.store.get(&key) {
            PreviewState::Ready { .. } => {
                self.store.touch(&key);
                EnsureOutcome::Ready
            }
            PreviewState::Pending => EnsureOutcome::InFlight,
            PreviewState::Failed { .. } => EnsureOutcome::Failed,
            PreviewState::Idle => {
                self.store.mark_pending(&key);
                let id = self.next_id();
                debug!("Scheduling render {} for {key}", id.0);

                let request = RenderRequest::Preview {
                    id,
                    key: key.clone(),
                    locator: citation.document_locator.clone(),
                };
                if self.request_tx.send(request).is_err() {
                    // Workers only stop on shutdown
                    warn!("Render workers are gone, failing {key}");
                    self.store.set_failed(&key, WORKERS_UNAVAILABLE);
                    return EnsureOutcome::Failed;
                }

                self.pending_requests.insert(id, key);
                EnsureOutcome::Scheduled(id)
            }
        }
    }

    /// Apply all completed renders without blocking.
    ///
    /// Returns the keys whose state changed.
    pub fn poll_responses(&mut self) -> Vec<PreviewKey> {
        let mut changed = Vec::new();
        while let Ok(response) = self.response_rx.try_recv() {
            changed.push(self.apply_response(response));
        }
        changed
    }

    /// Block until at least one render completes or `timeout` passes, then
    /// apply everything available.
    pub fn wait_for_responses(&mut self, timeout: Duration) -> Vec<PreviewKey> {
        if self.pending_requests.is_empty() {
            return self.poll_responses();
        }

        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => {
                let mut changed = vec![self.apply_response(response)];
                changed.extend(self.poll_responses());
                changed
            }
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => self.fail_orphaned(),
        }
    }

    /// Every worker is gone; nothing in flight will ever complete
    fn fail_orphaned(&mut self) -> Vec<PreviewKey> {
        warn!(
            "Render workers are gone, failing {} in-flight previews",
            self.pending_requests.len()
        );
        let mut changed = Vec::with_capacity(self.pending_requests.len());
        for (_, key) in self.pending_requests.drain() {
            self.store.set_failed(&key, WORKERS_UNAVAILABLE);
            changed.push(key);
        }
        changed
    }

    /// Apply renders until nothing is in flight or `timeout` passes.
    ///
    /// Returns `true` when every key has settled. A render that never returns
    /// leaves its key pending and this returns `false`.
    pub fn wait_until_settled(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll_responses();
            if self.pending_requests.is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.wait_for_responses(deadline - now);
        }
    }

    fn apply_response(&mut self, response: RenderResponse) -> PreviewKey {
        self.pending_requests.remove(&response.id());
        match response {
            RenderResponse::Preview { key, preview, .. } => {
                let preview = *preview;
                self.store.set_ready(&key, preview.small, preview.large);
                key
            }
            RenderResponse::Error { key, error, .. } => {
                self.store.set_failed(&key, error.message());
                key
            }
        }
    }

    /// Current state of the preview for `citation`
    #[must_use]
    pub fn state(&self, citation: &Citation) -> PreviewState {
        self.store.get(&derive_key(citation))
    }

    /// Read-only access to the cache
    #[must_use]
    pub fn store(&self) -> &PreviewStore {
        &self.store
    }

    /// Number of renders in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending_requests.len()
    }

    /// Shutdown all workers
    pub fn shutdown(&self) {
        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(RenderRequest::Shutdown);
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for PreviewScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeRenderer;

    const WAIT: Duration = Duration::from_secs(5);

    fn scheduler(renderer: &Arc<FakeRenderer>) -> PreviewScheduler {
        let renderer: Arc<dyn PageRenderer> = renderer.clone();
        PreviewScheduler::with_config(renderer, 2, PreviewStore::unbounded())
    }

    #[test]
    fn repeated_calls_render_once() {
        let renderer = Arc::new(FakeRenderer::new(5));
        let mut scheduler = scheduler(&renderer);
        let citation = Citation::new("A", "a.pdf", 1);

        let first = scheduler.ensure_preview(&citation);
        assert!(matches!(first, EnsureOutcome::Scheduled(_)));
        for _ in 0..10 {
            let outcome = scheduler.ensure_preview(&citation);
            assert!(matches!(
                outcome,
                EnsureOutcome::InFlight | EnsureOutcome::Ready
            ));
        }

        assert!(scheduler.wait_until_settled(WAIT));
        assert_eq!(scheduler.ensure_preview(&citation), EnsureOutcome::Ready);
        assert_eq!(renderer.calls(), 1);
    }

    #[test]
    fn failure_is_terminal() {
        let renderer = Arc::new(FakeRenderer::new(5));
        let mut scheduler = scheduler(&renderer);
        let citation = Citation::new("A", "a.pdf", 9999);

        scheduler.ensure_preview(&citation);
        assert!(scheduler.wait_until_settled(WAIT));

        match scheduler.state(&citation) {
            PreviewState::Failed { message } => assert!(!message.is_empty()),
            other => panic!("expected failed, got {other:?}"),
        }
        assert_eq!(scheduler.ensure_preview(&citation), EnsureOutcome::Failed);
        assert_eq!(renderer.calls(), 1);
    }

    #[test]
    fn poll_reports_changed_keys() {
        let renderer = Arc::new(FakeRenderer::new(5));
        let mut scheduler = scheduler(&renderer);

        scheduler.ensure_preview(&Citation::new("A", "a.pdf", 1));
        scheduler.ensure_preview(&Citation::new("A", "a.pdf", 2));

        let mut changed = Vec::new();
        let deadline = Instant::now() + WAIT;
        while changed.len() < 2 && Instant::now() < deadline {
            changed.extend(scheduler.wait_for_responses(Duration::from_millis(100)));
        }
        changed.sort();
        assert_eq!(
            changed,
            vec![PreviewKey::new("a.pdf", 1), PreviewKey::new("a.pdf", 2)]
        );
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn hung_render_stays_pending() {
        let renderer = Arc::new(FakeRenderer::new(5).gated());
        let mut scheduler = scheduler(&renderer);
        let citation = Citation::new("A", "a.pdf", 1);

        scheduler.ensure_preview(&citation);
        assert!(!scheduler.wait_until_settled(Duration::from_millis(50)));
        assert!(scheduler.state(&citation).is_pending());

        renderer.release_all();
        assert!(scheduler.wait_until_settled(WAIT));
        assert!(scheduler.state(&citation).is_ready());
    }

    struct PanickingRenderer;

    impl PageRenderer for PanickingRenderer {
        fn render(
            &self,
            _locator: &str,
            _page: u32,
        ) -> Result<crate::preview::types::RenderedPreview, crate::preview::request::RenderError>
        {
            panic!("renderer crashed");
        }
    }

    #[test]
    fn dead_workers_fail_pending_previews() {
        let mut scheduler =
            PreviewScheduler::with_config(Arc::new(PanickingRenderer), 1, PreviewStore::unbounded());
        let citation = Citation::new("A", "a.pdf", 1);

        assert!(matches!(
            scheduler.ensure_preview(&citation),
            EnsureOutcome::Scheduled(_)
        ));
        let started = Instant::now();
        assert!(scheduler.wait_until_settled(WAIT));
        assert!(started.elapsed() < WAIT);

        match scheduler.state(&citation) {
            PreviewState::Failed { message } => assert_eq!(message, WORKERS_UNAVAILABLE),
            other => panic!("expected failed, got {other:?}"),
        }
        assert_eq!(scheduler.in_flight(), 0);
    }
}
