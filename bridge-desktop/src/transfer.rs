//! Resumable Transfer Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    transfer::{TransferClient, TransferEvent, TransferHandle, TransferRequest},
};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Reqwest-based transfer client
///
/// Streams the response body straight into the destination file. A request
/// with `resume_from > 0` sends a `Range` header and appends to the existing
/// file when the server answers `206 Partial Content`; a plain `200` restarts
/// the file from scratch.
pub struct ReqwestTransferClient {
    client: Client,
}

impl ReqwestTransferClient {
    /// Create a new transfer client with default configuration
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("qariee-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Create a new transfer client from a preconfigured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn map_request_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::OperationFailed("Request timed out".to_string())
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }
}

#[async_trait]
impl TransferClient for ReqwestTransferClient {
    async fn start(&self, request: TransferRequest) -> Result<Box<dyn TransferHandle>> {
        let TransferRequest {
            url,
            destination,
            resume_from,
        } = request;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await.map_err(BridgeError::Io)?;
        }

        let mut builder = self.client.get(&url);
        if resume_from > 0 {
            builder = builder.header(header::RANGE, format!("bytes={}-", resume_from));
        }

        debug!(url = %url, resume_from, "Starting transfer");
        let response = builder.send().await.map_err(Self::map_request_error)?;
        let status = response.status();

        let (file, downloaded) = match status {
            StatusCode::PARTIAL_CONTENT => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&destination)
                    .await
                    .map_err(BridgeError::Io)?;
                (file, resume_from)
            }
            s if s.is_success() => {
                if resume_from > 0 {
                    debug!(url = %url, "Server ignored range request, restarting");
                }
                let file = File::create(&destination).await.map_err(BridgeError::Io)?;
                (file, 0)
            }
            StatusCode::NOT_FOUND => return Err(BridgeError::NotFound(url)),
            StatusCode::RANGE_NOT_SATISFIABLE => {
                // The partial file no longer matches the remote one.
                warn!(url = %url, resume_from, "Range not satisfiable, discarding partial file");
                File::create(&destination).await.map_err(BridgeError::Io)?;
                return Err(BridgeError::OperationFailed(
                    "HTTP 416 range not satisfiable".to_string(),
                ));
            }
            s => {
                return Err(BridgeError::OperationFailed(format!("HTTP {} error", s.as_u16())));
            }
        };

        let total = response.content_length().map(|len| len + downloaded);

        Ok(Box::new(ReqwestTransferHandle {
            stream: Some(response.bytes_stream().boxed()),
            file: Some(file),
            downloaded,
            total,
        }))
    }
}

/// Handle over a streaming response body.
struct ReqwestTransferHandle {
    stream: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    file: Option<File>,
    downloaded: u64,
    total: Option<u64>,
}

impl ReqwestTransferHandle {
    async fn close_file(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(BridgeError::Io)?;
        }
        Ok(())
    }
}

#[async_trait]
impl TransferHandle for ReqwestTransferHandle {
    async fn next_event(&mut self) -> Option<Result<TransferEvent>> {
        let stream = self.stream.as_mut()?;

        match stream.next().await {
            Some(Ok(chunk)) => {
                let Some(file) = self.file.as_mut() else {
                    return None;
                };
                if let Err(e) = file.write_all(&chunk).await {
                    self.stream = None;
                    return Some(Err(BridgeError::Io(e)));
                }
                self.downloaded += chunk.len() as u64;
                Some(Ok(TransferEvent::Progress {
                    downloaded_bytes: self.downloaded,
                    total_bytes: self.total,
                }))
            }
            Some(Err(e)) => {
                self.stream = None;
                if let Err(close) = self.close_file().await {
                    warn!(error = %close, "Failed to flush partial file");
                }
                Some(Err(ReqwestTransferClient::map_request_error(e)))
            }
            None => {
                self.stream = None;
                if let Err(e) = self.close_file().await {
                    return Some(Err(e));
                }
                match self.total {
                    Some(total) if self.downloaded < total => {
                        Some(Err(BridgeError::OperationFailed(format!(
                            "Connection closed after {} of {} bytes",
                            self.downloaded, total
                        ))))
                    }
                    _ => Some(Ok(TransferEvent::Completed {
                        total_bytes: self.downloaded,
                    })),
                }
            }
        }
    }

    async fn pause(&mut self) -> Result<()> {
        self.stream = None;
        self.close_file().await?;
        debug!(downloaded = self.downloaded, "Transfer paused");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    const BODY: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    /// Minimal HTTP/1.1 server serving `BODY` at `/audio.mp3` with range support.
    async fn serve() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        let n = socket.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }
                    let head = String::from_utf8_lossy(&buf).to_lowercase();

                    let response = if !head.starts_with("get /audio.mp3") {
                        b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                            .to_vec()
                    } else if let Some(start) = head
                        .lines()
                        .find_map(|l| l.strip_prefix("range: bytes="))
                        .and_then(|r| r.trim_end_matches('-').parse::<usize>().ok())
                    {
                        let part = &BODY[start..];
                        let mut out = format!(
                            "HTTP/1.1 206 Partial Content\r\ncontent-length: {}\r\ncontent-range: bytes {}-{}/{}\r\nconnection: close\r\n\r\n",
                            part.len(),
                            start,
                            BODY.len() - 1,
                            BODY.len()
                        )
                        .into_bytes();
                        out.extend_from_slice(part);
                        out
                    } else {
                        let mut out = format!(
                            "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                            BODY.len()
                        )
                        .into_bytes();
                        out.extend_from_slice(BODY);
                        out
                    };
                    let _ = socket.write_all(&response).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        addr
    }

    async fn drain(handle: &mut Box<dyn TransferHandle>) -> (Vec<TransferEvent>, Option<u64>) {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            let event = event.unwrap();
            if let TransferEvent::Completed { total_bytes } = event {
                return (events, Some(total_bytes));
            }
            events.push(event);
        }
        (events, None)
    }

    #[tokio::test]
    async fn test_full_download() {
        let addr = serve().await;
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("audio").join("a").join("001.mp3");

        let client = ReqwestTransferClient::new().unwrap();
        let mut handle = client
            .start(TransferRequest::new(format!("http://{addr}/audio.mp3"), &dest))
            .await
            .unwrap();

        let (progress, total) = drain(&mut handle).await;
        assert_eq!(total, Some(BODY.len() as u64));
        assert!(matches!(
            progress.last(),
            Some(TransferEvent::Progress { downloaded_bytes, total_bytes: Some(t) })
                if *downloaded_bytes == BODY.len() as u64 && *t == BODY.len() as u64
        ));
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
        assert!(handle.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_resume_appends_to_partial_file() {
        let addr = serve().await;
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("002.mp3");
        std::fs::write(&dest, &BODY[..10]).unwrap();

        let client = ReqwestTransferClient::new().unwrap();
        let mut handle = client
            .start(TransferRequest::new(format!("http://{addr}/audio.mp3"), &dest).resume_from(10))
            .await
            .unwrap();

        let (progress, total) = drain(&mut handle).await;
        assert_eq!(total, Some(BODY.len() as u64));
        assert!(progress.iter().all(|e| matches!(
            e,
            TransferEvent::Progress { downloaded_bytes, .. } if *downloaded_bytes > 10
        )));
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let addr = serve().await;
        let temp = tempfile::tempdir().unwrap();

        let client = ReqwestTransferClient::new().unwrap();
        let result = client
            .start(TransferRequest::new(
                format!("http://{addr}/missing.mp3"),
                temp.path().join("003.mp3"),
            ))
            .await;

        assert!(matches!(result, Err(BridgeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_pause_ends_events() {
        let addr = serve().await;
        let temp = tempfile::tempdir().unwrap();

        let client = ReqwestTransferClient::new().unwrap();
        let mut handle = client
            .start(TransferRequest::new(
                format!("http://{addr}/audio.mp3"),
                temp.path().join("004.mp3"),
            ))
            .await
            .unwrap();

        handle.pause().await.unwrap();
        assert!(handle.next_event().await.is_none());
    }
}
