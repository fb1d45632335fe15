#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ObservabilityError {
    #[error("logging error: {message}")]
    Logging { message: String },

    #[error("metrics error: {message}")]
    Metrics { message: String },
}

impl ObservabilityError {
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    pub fn metrics(message: impl Into<String>) -> Self {
        Self::Metrics {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservabilityError>;
