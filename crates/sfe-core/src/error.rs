#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("cancelled")]
    Cancelled,
    #[error("serp unavailable: {0}")]
    SerpUnavailable(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("poll timeout")]
    PollTimeout,
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
