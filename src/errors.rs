//! Error taxonomy shared across the fetch/cache/download pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CninfoError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No match found for '{0}'")]
    NotFound(String),

    #[error("Downloaded file size mismatch: expected {expected}KB, got {actual}KB")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Category catalog error: {0}")]
    ConfigMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
