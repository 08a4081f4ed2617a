//! Network Monitoring Abstraction
//!
//! Provides network connectivity and status information.

use async_trait::async_trait;

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    /// Cellular/mobile data connection
    Cellular,
    /// WiFi connection
    WiFi,
    /// Ethernet connection
    Ethernet,
    /// Other or unknown connection type
    Other,
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
    /// Whether the connection is considered expensive by the OS
    pub is_expensive: bool,
}

impl NetworkInfo {
    /// Info describing a machine with no connectivity
    pub fn offline() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_metered: false,
            is_expensive: false,
        }
    }

    /// `true` only for a confirmed disconnection; `Indeterminate` is not offline
    pub fn is_offline(&self) -> bool {
        self.status == NetworkStatus::Disconnected
    }
}

/// Network monitor trait
///
/// Provides connectivity information so the playback engine can switch
/// into offline mode and drop tracks that have no local file.
///
/// # Platform Support
///
/// - **Desktop**: System network APIs (NetworkManager, SystemConfiguration, Windows Network List Manager)
/// - **iOS**: Network framework, Reachability
/// - **Android**: ConnectivityManager
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// async fn prefer_downloads(monitor: &dyn NetworkMonitor) -> bool {
///     !monitor.is_connected().await || monitor.is_metered().await
/// }
/// ```
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                ..
            })
        )
    }

    /// Check if connected via WiFi
    async fn is_wifi(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                network_type: Some(NetworkType::WiFi),
                ..
            })
        )
    }

    /// Check if connection is metered
    async fn is_metered(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                is_metered: true,
                ..
            })
        )
    }

    /// Subscribe to network status changes
    ///
    /// Returns a stream of network info updates. Implementations should
    /// emit an event whenever network status changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next network info update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkInfo>;
}
