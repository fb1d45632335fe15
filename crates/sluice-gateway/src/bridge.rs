//! Relays one backend fragment stream to the session that asked for it.

use std::sync::Arc;

use futures_util::StreamExt;
use sluice_core::{ChatPayload, Envelope};
use sluice_llm::ChatBackend;
use sluice_observability::RelayMetrics;
use tokio::task::JoinHandle;

use crate::session::SessionHandle;

pub const STREAM_INTERRUPTED: &str = "Stream interrupted";

/// How one relay ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The backend finished the sequence
    Completed,
    /// The session went away or the scope was cancelled
    Cancelled,
    /// A fragment carried an error
    Failed,
    /// The backend call could not be opened, e.g. unknown provider
    Rejected,
}

#[derive(Clone)]
pub struct StreamBridge {
    backend: Arc<dyn ChatBackend>,
    default_provider: String,
}

impl std::fmt::Debug for StreamBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBridge")
            .field("default_provider", &self.default_provider)
            .finish_non_exhaustive()
    }
}

impl StreamBridge {
    pub fn new(backend: Arc<dyn ChatBackend>, default_provider: impl Into<String>) -> Self {
        Self {
            backend,
            default_provider: default_provider.into(),
        }
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Start a relay for one chat request. Relays on the same session run
    /// independently and interleave on its outbound queue.
    pub fn start(&self, session: SessionHandle, payload: ChatPayload) -> JoinHandle<RelayOutcome> {
        let bridge = self.clone();
        tokio::spawn(async move { bridge.relay(session, payload).await })
    }

    async fn relay(&self, session: SessionHandle, payload: ChatPayload) -> RelayOutcome {
        let scope = session.child_scope();
        let provider = payload
            .requested_model()
            .unwrap_or(self.default_provider.as_str())
            .to_string();

        let mut stream = match self
            .backend
            .open_stream(scope.clone(), &provider, &payload.content)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(session_id = %session.id(), %provider, error = %e, "failed to open backend stream");
                let _ = session.send_error(500, e.to_string()).await;
                scope.cancel();
                return RelayOutcome::Rejected;
            }
        };

        RelayMetrics::record_started(&provider);
        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = scope.cancelled() => break RelayOutcome::Cancelled,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(fragment)) => {
                    let envelope = Envelope::chat(fragment.into_chat_payload(payload.model.clone()));
                    if session.send(&envelope).await.is_err() {
                        break RelayOutcome::Cancelled;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(session_id = %session.id(), %provider, error = %e, "backend stream error");
                    let _ = session.send_error(500, STREAM_INTERRUPTED).await;
                    break RelayOutcome::Failed;
                }
                None => break RelayOutcome::Completed,
            }
        };
        // Stops the backend whichever way the loop ended
        scope.cancel();
        drop(stream);

        match outcome {
            RelayOutcome::Completed => RelayMetrics::record_completed(&provider),
            RelayOutcome::Failed => RelayMetrics::record_failed(&provider),
            _ => RelayMetrics::record_cancelled(&provider),
        }
        tracing::debug!(session_id = %session.id(), %provider, ?outcome, "relay finished");
        outcome
    }
}
