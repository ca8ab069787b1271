#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Server returned {status} for {request}")]
    Status {
        status: reqwest::StatusCode,
        request: &'static str,
    },
    #[error("Failed to parse capabilities XML: {0}")]
    Capabilities(String),
    #[error("No time dimension declared for layer {0}")]
    MissingTimeDimension(String),
}
