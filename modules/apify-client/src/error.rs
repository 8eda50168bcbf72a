use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApifyError>;

/// How many bytes of an unexpected response body are kept for diagnosis.
pub const RAW_SNIPPET_BYTES: usize = 500;

#[derive(Debug, Error)]
pub enum ApifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response from Apify: {reason}\nRaw: {raw}")]
    UnexpectedShape { reason: String, raw: String },
}

impl ApifyError {
    /// Build an `UnexpectedShape` error keeping only the head of the body.
    pub(crate) fn unexpected_shape(reason: impl Into<String>, body: &str) -> Self {
        ApifyError::UnexpectedShape {
            reason: reason.into(),
            raw: snippet(body, RAW_SNIPPET_BYTES).to_string(),
        }
    }
}

impl From<reqwest::Error> for ApifyError {
    fn from(err: reqwest::Error) -> Self {
        ApifyError::Network(err.to_string())
    }
}

fn snippet(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}
