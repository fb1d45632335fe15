//! OpenAI-compatible chat completions over server-sent events.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sluice_core::ContentFragment;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{LlmError, Result};
use crate::provider::{FragmentStream, StreamProvider};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_token: String,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    /// Bound on connecting and receiving response headers
    pub timeout_secs: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            system_prompt: "You are a helpful assistant.".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

/// Fragments carried by one SSE `data:` payload, reasoning first.
/// Lines that are not valid chunks yield nothing.
fn parse_data(data: &str) -> Vec<ContentFragment> {
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!(error = %e, "skipping undecodable stream line");
            return Vec::new();
        }
    };

    let mut fragments = Vec::new();
    for choice in chunk.choices {
        if let Some(reasoning) = choice.delta.reasoning_content.filter(|s| !s.is_empty()) {
            fragments.push(ContentFragment::reasoning(reasoning));
        }
        if let Some(content) = choice.delta.content.filter(|s| !s.is_empty()) {
            fragments.push(ContentFragment::text(content));
        }
    }
    fragments
}

pub struct OpenAiProvider {
    settings: OpenAiSettings,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(settings: OpenAiSettings) -> Result<Self> {
        if settings.api_token.is_empty() {
            return Err(LlmError::Config("openai api_token is empty".to_string()));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;
        Ok(Self { settings, client })
    }

    fn request_body(&self, input: &str) -> serde_json::Value {
        let mut messages = Vec::new();
        if !self.settings.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": self.settings.system_prompt}));
        }
        messages.push(json!({"role": "user", "content": input}));
        json!({
            "model": self.settings.model,
            "messages": messages,
            "stream": true,
        })
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StreamProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream(&self, scope: CancellationToken, input: &str) -> Result<FragmentStream> {
        let url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_token)
            .json(&self.request_body(input))
            .send();

        let timeout = Duration::from_secs(self.settings.timeout_secs.max(1));
        let response = tokio::select! {
            _ = scope.cancelled() => {
                return Err(LlmError::Stream("cancelled before response".to_string()));
            }
            sent = tokio::time::timeout(timeout, request) => match sent {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(LlmError::Network(e.to_string())),
                Err(_) => return Err(LlmError::Network(format!("no response within {:?}", timeout))),
            },
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut events = Box::pin(response.bytes_stream().eventsource());
        let stream = async_stream::stream! {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = scope.cancelled() => break,
                    next = events.next() => next,
                };
                match next {
                    Some(Ok(event)) => {
                        let data = event.data.trim();
                        if data == "[DONE]" {
                            break;
                        }
                        for fragment in parse_data(data) {
                            yield Ok(fragment);
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(LlmError::Stream(e.to_string()));
                        break;
                    }
                    None => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
