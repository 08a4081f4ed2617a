use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Download error: {0}")]
    Download(#[from] core_download::DownloadError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl From<core_runtime::Error> for CoreError {
    fn from(err: core_runtime::Error) -> Self {
        match err {
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
            other => CoreError::InitializationFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
