use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A credential needed by the invoked component is not configured.
    #[error("{0} is not set; add it to the environment or .env")]
    MissingCredential(&'static str),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] apify_client::ApifyError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV store error: {0}")]
    Store(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid timestamp {0:?}")]
    Timestamp(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
