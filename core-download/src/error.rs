//! # Download Error Types

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur while downloading.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Invalid download configuration: {0}")]
    InvalidConfig(String),

    /// Network failure or unexpected end of a transfer.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// The file does not exist on the server.
    #[error("Remote file not found: {0}")]
    NotFound(String),

    /// Writing the file or its record failed.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Download timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The download was cancelled by the caller.
    #[error("Download cancelled")]
    Cancelled,

    #[error("Bridge error: {0}")]
    Bridge(BridgeError),
}

impl DownloadError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Transfer(_) | DownloadError::Timeout(_) => true,
            DownloadError::Bridge(e) => !e.is_permanent(),
            DownloadError::InvalidConfig(_)
            | DownloadError::NotFound(_)
            | DownloadError::Storage(_)
            | DownloadError::Cancelled => false,
        }
    }
}

impl From<BridgeError> for DownloadError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotFound(what) => DownloadError::NotFound(what),
            BridgeError::Io(e) => DownloadError::Storage(e.to_string()),
            other => DownloadError::Bridge(other),
        }
    }
}

/// Result type for download operations.
pub type Result<T> = std::result::Result<T, DownloadError>;
