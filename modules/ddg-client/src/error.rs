use thiserror::Error;

pub type Result<T> = std::result::Result<T, DdgError>;

#[derive(Debug, Error)]
pub enum DdgError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Search blocked (status {status})")]
    Blocked { status: u16 },
}

impl From<reqwest::Error> for DdgError {
    fn from(err: reqwest::Error) -> Self {
        DdgError::Network(err.to_string())
    }
}
