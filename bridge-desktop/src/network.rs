//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    catalog::DEFAULT_CDN_BASE_URL,
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::time::Duration;
use tracing::debug;

/// Desktop network monitor implementation
///
/// Connectivity is a TCP connect to the audio CDN; a host that can reach it
/// can stream. Changes are detected by polling.
///
/// Note: Platform-specific implementations (Linux netlink, macOS SystemConfiguration,
/// Windows WinAPI) would be more robust but require additional dependencies.
#[derive(Debug, Clone)]
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    probe_timeout: Duration,
    poll_interval: Duration,
}

impl DesktopNetworkMonitor {
    /// Create a new network monitor probing the default CDN
    pub fn new() -> Self {
        let host = DEFAULT_CDN_BASE_URL
            .trim_start_matches("https://")
            .trim_start_matches("http://");

        Self {
            probe_addr: format!("{}:443", host),
            probe_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
        }
    }

    /// Probe a different `host:port`
    pub fn with_probe_addr(mut self, addr: impl Into<String>) -> Self {
        self.probe_addr = addr.into();
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Interval between checks of a change stream
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            self.probe_timeout,
            tokio::net::TcpStream::connect(self.probe_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) => NetworkStatus::Disconnected,
            Err(_) => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;
        debug!(status = ?status, probe = %self.probe_addr, "Network info updated");

        if status != NetworkStatus::Connected {
            return Ok(NetworkInfo::offline());
        }

        Ok(NetworkInfo {
            status,
            // Ethernet and Wi-Fi are indistinguishable without platform APIs
            network_type: Some(NetworkType::Other),
            is_metered: false,
            is_expensive: false,
        })
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: self.clone(),
            last_status: None,
        }))
    }
}

/// Network change stream that polls for changes
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            if self.last_status.is_some() {
                tokio::time::sleep(self.monitor.poll_interval).await;
            }

            if let Ok(info) = self.monitor.get_network_info().await {
                // Only return if status changed
                if self.last_status.as_ref() != Some(&info.status) {
                    self.last_status = Some(info.status);
                    return Some(info);
                }
            }
        }
    }
}
