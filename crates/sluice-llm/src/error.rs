use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;
