use thiserror::Error;

/// Failure to obtain a parsed remote feed. A run that hits one of these has
/// not touched the log.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("feed parse error: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid feed name: {0}")]
    InvalidName(String),

    #[error("unknown feed: {0}")]
    UnknownFeed(String),

    #[error("feed already exists: {0}")]
    FeedExists(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True for failures that happened before anything was written.
    pub fn is_fetch(&self) -> bool {
        matches!(self, AppError::Fetch(_))
    }
}

impl FetchError {
    pub(crate) fn from_request(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
