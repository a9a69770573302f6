use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheBurnError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Could not connect to endpoint: {0}")]
    Connection(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Response stream ended without any content")]
    EmptyResponse,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, CacheBurnError>;
