use thiserror::Error;

#[derive(Error, Debug)]
pub enum TcLensError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Authentication rejected for {url}")]
    Unauthorized { url: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Request dispatcher is closed")]
    DispatcherClosed,
}

pub type Result<T> = std::result::Result<T, TcLensError>;
