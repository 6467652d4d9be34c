//! Preview render worker - runs in separate thread(s)

use std::sync::Arc;
use std::time::Instant;

use flume::{Receiver, Sender};
use log::{debug, info, warn};

use super::renderer::PageRenderer;
use super::request::{RenderRequest, RenderResponse};

/// Pull render requests until shutdown or until every sender is gone.
///
/// A request always runs to completion; if the scheduler went away meanwhile
/// the response is dropped.
pub fn render_worker(
    renderer: Arc<dyn PageRenderer>,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
) {
    for request in requests {
        match request {
            RenderRequest::Preview { id, key, locator } => {
                let started = Instant::now();
                let response = match renderer.render(&locator, key.page) {
                    Ok(preview) => {
                        info!(
                            "Rendered {key} ({}x{} / {}x{}) in {:?}",
                            preview.small.width_px,
                            preview.small.height_px,
                            preview.large.width_px,
                            preview.large.height_px,
                            started.elapsed()
                        );
                        RenderResponse::Preview {
                            id,
                            key,
                            preview: Box::new(preview),
                        }
                    }
                    Err(error) => {
                        warn!("Render of {key} failed: {error}");
                        RenderResponse::Error { id, key, error }
                    }
                };

                if responses.send(response).is_err() {
                    debug!("Scheduler gone, dropping response for request {}", id.0);
                }
            }

            RenderRequest::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::key::PreviewKey;
    use crate::preview::request::RequestId;
    use crate::test_utils::FakeRenderer;

    #[test]
    fn renders_until_shutdown() {
        let renderer = Arc::new(FakeRenderer::new(5));
        let (req_tx, req_rx) = flume::unbounded();
        let (resp_tx, resp_rx) = flume::unbounded();

        req_tx
            .send(RenderRequest::Preview {
                id: RequestId::new(1),
                key: PreviewKey::new("a.pdf", 2),
                locator: "a.pdf#page=2".to_string(),
            })
            .unwrap();
        req_tx
            .send(RenderRequest::Preview {
                id: RequestId::new(2),
                key: PreviewKey::new("a.pdf", 9999),
                locator: "a.pdf".to_string(),
            })
            .unwrap();
        req_tx.send(RenderRequest::Shutdown).unwrap();

        render_worker(renderer.clone(), req_rx, resp_tx);

        let responses: Vec<_> = resp_rx.drain().collect();
        assert_eq!(responses.len(), 2);
        assert!(matches!(responses[0], RenderResponse::Preview { .. }));
        assert!(matches!(responses[1], RenderResponse::Error { .. }));
        assert_eq!(renderer.calls(), 2);
        assert_eq!(renderer.calls_for("a.pdf#page=2", 2), 1);
    }

    #[test]
    fn exits_when_scheduler_dropped() {
        let renderer = Arc::new(FakeRenderer::new(1));
        let (req_tx, req_rx) = flume::unbounded::<RenderRequest>();
        let (resp_tx, _) = flume::unbounded();
        drop(req_tx);
        render_worker(renderer, req_rx, resp_tx);
    }
}
