use async_trait::async_trait;
use futures::Stream;
use sluice_core::ContentFragment;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::error::{LlmError, Result};

/// Fragments of one backend response, in order. An `Err` item ends the
/// response; nothing follows it.
pub type FragmentStream = Pin<Box<dyn Stream<Item = std::result::Result<ContentFragment, LlmError>> + Send>>;

/// One named backend
#[async_trait]
pub trait StreamProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Start producing fragments for `input`. The returned stream ends
    /// promptly once `scope` is cancelled.
    async fn stream(&self, scope: CancellationToken, input: &str) -> Result<FragmentStream>;
}

/// What the stream bridge talks to: a provider lookup plus the call itself.
///
/// An unknown `provider` must fail before any backend work starts.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn open_stream(
        &self,
        scope: CancellationToken,
        provider: &str,
        input: &str,
    ) -> Result<FragmentStream>;
}
