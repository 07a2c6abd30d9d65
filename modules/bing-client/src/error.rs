use thiserror::Error;

pub type Result<T> = std::result::Result<T, BingError>;

#[derive(Debug, Error)]
pub enum BingError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Search blocked (status {status})")]
    Blocked { status: u16 },
}

impl From<reqwest::Error> for BingError {
    fn from(err: reqwest::Error) -> Self {
        BingError::Network(err.to_string())
    }
}
