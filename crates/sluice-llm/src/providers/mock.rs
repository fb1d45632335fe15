//! Offline provider that "thinks" out loud, then answers.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sluice_core::ContentFragment;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{LlmError, Result};
use crate::provider::{FragmentStream, StreamProvider};

pub const ANSWER: &str = "\nOkay, here is the answer: [Mock Output]";

/// Pacing of the mock stream, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSettings {
    pub start_delay_ms: u64,
    /// Inclusive `[min, max]` pause before each reasoning fragment
    pub reasoning_delay_ms: [u64; 2],
    /// Inclusive `[min, max]` pause before each text fragment
    pub text_delay_ms: [u64; 2],
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            start_delay_ms: 500,
            reasoning_delay_ms: [10, 40],
            text_delay_ms: [30, 80],
        }
    }
}

impl MockSettings {
    /// No pauses at all
    pub fn instant() -> Self {
        Self {
            start_delay_ms: 0,
            reasoning_delay_ms: [0, 0],
            text_delay_ms: [0, 0],
        }
    }
}

fn jitter([min, max]: [u64; 2]) -> Duration {
    if max <= min {
        return Duration::from_millis(min);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min..=max))
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn pause(scope: &CancellationToken, delay: Duration) -> bool {
    if delay.is_zero() {
        return !scope.is_cancelled();
    }
    tokio::select! {
        _ = scope.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    settings: MockSettings,
}

impl MockProvider {
    pub fn new(settings: MockSettings) -> Self {
        Self { settings }
    }

    pub fn reasoning_for(input: &str) -> String {
        format!("Hmm... let me think about {}...", input)
    }
}

#[async_trait]
impl StreamProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream(&self, scope: CancellationToken, input: &str) -> Result<FragmentStream> {
        let settings = self.settings.clone();
        let reasoning = Self::reasoning_for(input);

        let stream = async_stream::stream! {
            if !pause(&scope, Duration::from_millis(settings.start_delay_ms)).await {
                return;
            }
            for ch in reasoning.chars() {
                if !pause(&scope, jitter(settings.reasoning_delay_ms)).await {
                    return;
                }
                yield Ok::<_, LlmError>(ContentFragment::reasoning(ch.to_string()));
            }
            for ch in ANSWER.chars() {
                if !pause(&scope, jitter(settings.text_delay_ms)).await {
                    return;
                }
                yield Ok::<_, LlmError>(ContentFragment::text(ch.to_string()));
            }
        };

        Ok(Box::pin(stream))
    }
}
