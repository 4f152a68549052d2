use thiserror::Error;

/// Top-level error type shared by the scoregraph crates.
#[derive(Error, Debug)]
pub enum ScoregraphError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source tree or a stored vertex does not have the shape we expect.
    #[error("Data error: {0}")]
    Data(String),

    /// The caller used an API in a way it does not support.
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScoregraphError {
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ScoregraphError>;
