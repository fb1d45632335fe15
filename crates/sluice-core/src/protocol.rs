//! Session wire protocol
//!
//! Every frame exchanged with a client is one JSON [`Envelope`]:
//! `{"type": ..., "payload": ..., "metadata": {...}}`. The shape of
//! `payload` is decided by `type` alone.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Envelope discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Chat,
    Ping,
    Pong,
    Error,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Error => "error",
            Self::System => "system",
        }
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "ping" => Ok(Self::Ping),
            "pong" => Ok(Self::Pong),
            "error" => Ok(Self::Error),
            "system" => Ok(Self::System),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of streamed content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Reasoning,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Reasoning => "reasoning",
        }
    }
}

/// Body of a `chat` envelope, in both directions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Input text (client -> server) or one fragment (server -> client)
    pub content: String,
    /// "text" or "reasoning"; an empty string is read as absent
    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_kind",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<ContentKind>,
    /// Backend provider to route the request to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ChatPayload {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: None,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_kind(mut self, kind: ContentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Requested provider, treating an empty string as "use the default"
    pub fn requested_model(&self) -> Option<&str> {
        self.model.as_deref().filter(|m| !m.is_empty())
    }
}

fn deserialize_kind<'de, D>(deserializer: D) -> Result<Option<ContentKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some("text") => Ok(Some(ContentKind::Text)),
        Some("reasoning") => Ok(Some(ContentKind::Reasoning)),
        Some(other) => Err(serde::de::Error::unknown_variant(
            other,
            &["text", "reasoning"],
        )),
    }
}

/// Body of an `error` envelope (server -> client only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: u16,
    pub message: String,
}

/// Typed payload; the variant is the envelope's `type`
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Chat(ChatPayload),
    Ping,
    Pong,
    Error(ErrorPayload),
    System(Value),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Chat(_) => MessageType::Chat,
            Self::Ping => MessageType::Ping,
            Self::Pong => MessageType::Pong,
            Self::Error(_) => MessageType::Error,
            Self::System(_) => MessageType::System,
        }
    }
}

/// The outer wrapper of every session-protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEnvelope", try_from = "WireEnvelope")]
pub struct Envelope {
    pub payload: Payload,
    pub metadata: Option<Map<String, Value>>,
}

impl Envelope {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            metadata: None,
        }
    }

    pub fn chat(payload: ChatPayload) -> Self {
        Self::new(Payload::Chat(payload))
    }

    pub fn ping() -> Self {
        Self::new(Payload::Ping)
    }

    pub fn pong() -> Self {
        Self::new(Payload::Pong)
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::new(Payload::Error(ErrorPayload {
            code,
            message: message.into(),
        }))
    }

    pub fn system(body: Value) -> Self {
        Self::new(Payload::System(body))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    /// Serialize to one JSON frame
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(&WireEnvelope::from(self.clone())).map_err(ProtocolError::Encode)
    }

    /// Parse one JSON frame.
    ///
    /// Errors are classified so the caller can answer with the right code:
    /// bad JSON and bad payloads are 400, an unknown `type` is 404.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let wire: WireEnvelope = serde_json::from_slice(frame).map_err(ProtocolError::Malformed)?;
        Self::try_from(wire)
    }
}

/// Loosely typed frame as it appears on the wire
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Map<String, Value>>,
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        let kind = envelope.message_type().as_str().to_string();
        // Structs here never fail to convert to a Value
        let payload = match envelope.payload {
            Payload::Chat(chat) => serde_json::to_value(chat).ok(),
            Payload::Error(err) => serde_json::to_value(err).ok(),
            Payload::System(Value::Null) | Payload::Ping | Payload::Pong => None,
            Payload::System(body) => Some(body),
        };
        Self {
            kind,
            payload,
            metadata: envelope.metadata,
        }
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = ProtocolError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let kind: MessageType = wire.kind.parse()?;
        let payload = match kind {
            MessageType::Chat => Payload::Chat(typed_payload(kind, wire.payload)?),
            // Any payload shape is answered the same way: clients may not send these
            MessageType::Error => match typed_payload(kind, wire.payload) {
                Ok(err) => Payload::Error(err),
                Err(_) => return Err(ProtocolError::ServerOnly(kind)),
            },
            MessageType::Ping => Payload::Ping,
            MessageType::Pong => Payload::Pong,
            MessageType::System => Payload::System(wire.payload.unwrap_or(Value::Null)),
        };
        Ok(Self {
            payload,
            metadata: wire.metadata,
        })
    }
}

fn typed_payload<T>(kind: MessageType, payload: Option<Value>) -> Result<T, ProtocolError>
where
    T: for<'de> Deserialize<'de>,
{
    let value = payload.ok_or_else(|| ProtocolError::InvalidPayload {
        kind,
        reason: "missing payload".to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

/// Protocol-level failures, recovered locally by answering with an error envelope
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("{0} frames are only sent by the server")]
    ServerOnly(MessageType),

    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: MessageType, reason: String },

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Code carried by the error envelope sent back to the client
    pub fn code(&self) -> u16 {
        match self {
            Self::Malformed(_) | Self::InvalidPayload { .. } => 400,
            Self::UnknownType(_) | Self::ServerOnly(_) => 404,
            Self::Encode(_) => 500,
        }
    }

    /// Client-facing message
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "Invalid JSON format",
            Self::InvalidPayload {
                kind: MessageType::Chat,
                ..
            } => "Invalid chat payload",
            Self::InvalidPayload { .. } => "Invalid payload",
            Self::UnknownType(_) | Self::ServerOnly(_) => "Unknown message type",
            Self::Encode(_) => "Internal error",
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope::error(self.code(), self.client_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(envelope: Envelope) {
        let bytes = envelope.encode().unwrap();
        let decoded = Envelope::decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn every_variant_survives_encode_decode() {
        roundtrip(Envelope::chat(
            ChatPayload::new("hello")
                .with_kind(ContentKind::Reasoning)
                .with_model("mock"),
        ));
        roundtrip(Envelope::chat(ChatPayload::new("")));
        roundtrip(Envelope::ping());
        roundtrip(Envelope::pong().with_metadata("seq", 3));
        roundtrip(Envelope::error(500, "Stream interrupted"));
        roundtrip(Envelope::system(json!({"notice": "maintenance"})));
        roundtrip(Envelope::system(Value::Null));
    }

    #[test]
    fn pong_is_encoded_without_payload() {
        let bytes = Envelope::pong().encode().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"type": "pong"}));
    }

    #[test]
    fn chat_payload_uses_type_field_for_kind() {
        let payload = ChatPayload::new("x").with_kind(ContentKind::Text);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value, json!({"content": "x", "type": "text"}));
    }

    #[test]
    fn empty_kind_and_null_payload_fields_are_tolerated() {
        let env = Envelope::decode(br#"{"type":"chat","payload":{"content":"hi","type":"","model":""}}"#)
            .unwrap();
        match env.payload {
            Payload::Chat(chat) => {
                assert_eq!(chat.kind, None);
                assert_eq!(chat.requested_model(), None);
            }
            other => panic!("unexpected payload {:?}", other),
        }

        let env = Envelope::decode(br#"{"type":"ping","payload":null}"#).unwrap();
        assert_eq!(env, Envelope::ping());
    }

    #[test]
    fn malformed_json_is_a_400() {
        let err = Envelope::decode(b"{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
        assert_eq!(err.code(), 400);
        assert_eq!(err.client_message(), "Invalid JSON format");
    }

    #[test]
    fn unknown_type_is_rejected_with_404() {
        let err = Envelope::decode(br#"{"type":"subscribe","payload":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(ref t) if t == "subscribe"));
        assert_eq!(err.code(), 404);
    }

    #[test]
    fn client_error_frames_are_a_404_whatever_the_payload() {
        for frame in [
            &br#"{"type":"error"}"#[..],
            br#"{"type":"error","payload":"boom"}"#,
            br#"{"type":"error","payload":{"code":"x"}}"#,
        ] {
            let err = Envelope::decode(frame).unwrap_err();
            assert!(matches!(err, ProtocolError::ServerOnly(MessageType::Error)));
            assert_eq!(err.code(), 404);
            assert_eq!(err.client_message(), "Unknown message type");
        }

        // Well-formed error frames still decode for clients reading server output
        let env = Envelope::decode(br#"{"type":"error","payload":{"code":429,"message":"slow down"}}"#)
            .unwrap();
        assert_eq!(env.message_type(), MessageType::Error);
    }

    #[test]
    fn malformed_chat_payload_is_a_400() {
        let err = Envelope::decode(br#"{"type":"chat","payload":{"content":42}}"#).unwrap_err();
        assert_eq!(err.code(), 400);
        assert_eq!(err.client_message(), "Invalid chat payload");

        let err = Envelope::decode(br#"{"type":"chat"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn metadata_is_preserved() {
        let env = Envelope::decode(br#"{"type":"ping","metadata":{"trace":"abc"}}"#).unwrap();
        let metadata = env.metadata.unwrap();
        assert_eq!(metadata.get("trace"), Some(&json!("abc")));
    }

    #[test]
    fn serde_impls_go_through_the_wire_shape() {
        let env = Envelope::error(404, "Unknown message type");
        let text = serde_json::to_string(&env).unwrap();
        assert_eq!(
            text,
            r#"{"type":"error","payload":{"code":404,"message":"Unknown message type"}}"#
        );
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back, env);
    }
}
