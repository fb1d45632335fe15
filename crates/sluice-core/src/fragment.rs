//! Backend stream unit

use crate::protocol::{ChatPayload, ContentKind};

/// One incremental piece of a streamed backend response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFragment {
    pub content: String,
    pub kind: ContentKind,
}

impl ContentFragment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: ContentKind::Text,
        }
    }

    pub fn reasoning(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: ContentKind::Reasoning,
        }
    }

    /// Wrap as the body of an outbound `chat` envelope
    pub fn into_chat_payload(self, model: Option<String>) -> ChatPayload {
        ChatPayload {
            content: self.content,
            kind: Some(self.kind),
            model,
        }
    }
}
