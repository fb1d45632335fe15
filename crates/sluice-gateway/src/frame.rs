/// Transport-level frame, independent of the WebSocket library in use.
///
/// The server maps its socket messages into and out of this type so the
/// pumps can be driven by any stream/sink pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl WireFrame {
    /// Size of the application data carried by a data frame
    pub fn data_len(&self) -> usize {
        match self {
            WireFrame::Text(text) => text.len(),
            WireFrame::Binary(bytes) => bytes.len(),
            _ => 0,
        }
    }

    /// Build the outbound frame for an encoded envelope
    pub fn from_encoded(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => WireFrame::Text(text),
            Err(e) => WireFrame::Binary(e.into_bytes()),
        }
    }
}
