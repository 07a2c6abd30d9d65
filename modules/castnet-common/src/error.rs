use thiserror::Error;

#[derive(Error, Debug)]
pub enum CastnetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Browser error: {0}")]
    Browser(String),

    /// Durable-store failures threaten the resumability contract and must
    /// surface loudly; prior appended records stay intact either way.
    #[error("Checkpoint store error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<std::io::Error> for CastnetError {
    fn from(err: std::io::Error) -> Self {
        CastnetError::Checkpoint(err.to_string())
    }
}
