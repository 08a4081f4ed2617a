//! Resumable Transfer Abstraction
//!
//! A transfer streams a remote file into a local destination and reports
//! incremental progress. Resuming is expressed through `resume_from`: the
//! number of bytes already present in the destination file.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::Result;

/// Request for a single file transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Bytes already written to `destination` by a previous attempt
    pub resume_from: u64,
}

impl TransferRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            resume_from: 0,
        }
    }

    pub fn resume_from(mut self, offset: u64) -> Self {
        self.resume_from = offset;
        self
    }
}

/// Event produced by a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// Bytes written so far (including any resumed prefix)
    Progress {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    /// The destination file is complete
    Completed { total_bytes: u64 },
}

/// Transfer client trait
///
/// Platform primitive for resumable downloads:
/// - **Desktop**: reqwest with `Range` requests
/// - **iOS**: URLSession download tasks with resume data
/// - **Android**: DownloadManager / OkHttp
///
/// # Example
///
/// ```ignore
/// use bridge_traits::transfer::{TransferClient, TransferEvent, TransferRequest};
///
/// async fn fetch(client: &dyn TransferClient, url: &str, dest: PathBuf) -> Result<u64> {
///     let mut handle = client.start(TransferRequest::new(url, dest)).await?;
///     while let Some(event) = handle.next_event().await {
///         if let TransferEvent::Completed { total_bytes } = event? {
///             return Ok(total_bytes);
///         }
///     }
///     Err(BridgeError::OperationFailed("transfer ended early".into()))
/// }
/// ```
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Start a transfer and return a handle to drive it
    async fn start(&self, request: TransferRequest) -> Result<Box<dyn TransferHandle>>;
}

/// Handle to a running transfer
#[async_trait]
pub trait TransferHandle: Send {
    /// Next event of the transfer
    ///
    /// Returns `None` after `Completed` has been yielded or the transfer was
    /// paused. An `Err` item ends the transfer.
    async fn next_event(&mut self) -> Option<Result<TransferEvent>>;

    /// Stop the transfer, leaving any partial file in place
    async fn pause(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_request_builder() {
        let request = TransferRequest::new("https://cdn/audio/a/001.mp3", "/tmp/001.mp3")
            .resume_from(4096);

        assert_eq!(request.url, "https://cdn/audio/a/001.mp3");
        assert_eq!(request.destination, PathBuf::from("/tmp/001.mp3"));
        assert_eq!(request.resume_from, 4096);
    }
}
