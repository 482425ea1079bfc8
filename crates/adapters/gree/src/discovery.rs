//! Broadcast discovery of units on the LAN.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::time::Instant;

use gree_amber_domain::device_config::{DEFAULT_PORT, DeviceConfig};

use crate::config::DiscoveryConfig;
use crate::error::GreeError;
use crate::protocol::{DeviceInfo, Packet, Reply, SCAN_REQUEST};

/// A unit that answered a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDevice {
    pub host: String,
    pub port: u16,
    pub mac: String,
    pub name: String,
    pub firmware: Option<String>,
}

impl ScannedDevice {
    /// Configuration to connect to this unit; the key is negotiated by binding.
    #[must_use]
    pub fn to_config(&self) -> DeviceConfig {
        let mut config = DeviceConfig::for_host(&self.host);
        config.port = self.port;
        config.mac = Some(self.mac.clone());
        if !self.name.is_empty() {
            config.name = Some(self.name.clone());
        }
        config
    }
}

fn target(address: &str) -> String {
    if address.parse::<SocketAddr>().is_ok() {
        address.to_string()
    } else {
        format!("{address}:{DEFAULT_PORT}")
    }
}

fn device_info(datagram: &[u8]) -> Result<DeviceInfo, GreeError> {
    let packet = Packet::parse(datagram)?;
    match packet.open(&packet.generic_cipher())? {
        Reply::Dev(info) => Ok(info),
        other => Err(GreeError::UnexpectedPacket {
            expected: "dev",
            actual: other.kind().to_string(),
        }),
    }
}

/// Broadcast a scan to every configured address and collect replies until
/// the scan timeout elapses. Units are de-duplicated by MAC.
///
/// # Errors
///
/// Returns [`GreeError::Io`] if the scan socket cannot be opened or read.
/// Unreachable broadcast addresses are logged and skipped.
#[tracing::instrument(skip_all, fields(targets = config.broadcast.len()))]
pub async fn scan(config: &DiscoveryConfig) -> Result<Vec<ScannedDevice>, GreeError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    for address in &config.broadcast {
        let target = target(address);
        if let Err(err) = socket.send_to(SCAN_REQUEST, target.as_str()).await {
            tracing::warn!(%target, error = %err, "scan request not sent");
        }
    }

    let deadline = Instant::now() + config.timeout();
    let mut found: BTreeMap<String, ScannedDevice> = BTreeMap::new();
    let mut buffer = vec![0u8; 4096];
    while let Ok(received) =
        tokio::time::timeout_at(deadline, socket.recv_from(&mut buffer)).await
    {
        let (len, peer) = received?;
        match device_info(&buffer[..len]) {
            Ok(info) => {
                let mac = info.normalized_mac();
                found.entry(mac.clone()).or_insert_with(|| {
                    tracing::info!(%mac, name = %info.name, %peer, "device found");
                    ScannedDevice {
                        host: peer.ip().to_string(),
                        port: peer.port(),
                        mac,
                        name: info.name,
                        firmware: info.ver,
                    }
                });
            }
            Err(err) => tracing::debug!(%peer, error = %err, "skipping scan reply"),
        }
    }
    tracing::info!(count = found.len(), "discovery complete");
    Ok(found.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;
    use gree_amber_domain::device_config::EncryptionVersion;

    fn config(targets: Vec<String>) -> DiscoveryConfig {
        DiscoveryConfig {
            enabled: true,
            timeout_secs: 1,
            broadcast: targets,
            ..DiscoveryConfig::default()
        }
    }

    #[test]
    fn should_append_default_port() {
        assert_eq!(target("192.168.1.255"), "192.168.1.255:7000");
        assert_eq!(target("10.0.0.255:7001"), "10.0.0.255:7001");
    }

    #[tokio::test]
    async fn should_collect_and_deduplicate_units() {
        let first = FakeDevice::spawn("f4911e7aca59", EncryptionVersion::V1)
            .await
            .unwrap();
        let second = FakeDevice::spawn("c8f742aa0011", EncryptionVersion::V2)
            .await
            .unwrap();
        let targets = vec![
            first.addr().to_string(),
            second.addr().to_string(),
            first.addr().to_string(),
        ];

        let found = scan(&config(targets)).await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].mac, "c8f742aa0011");
        assert_eq!(found[1].mac, "f4911e7aca59");
        assert_eq!(found[1].port, first.addr().port());
        assert_eq!(found[1].firmware.as_deref(), Some("V1.2.1"));
    }

    #[tokio::test]
    async fn should_return_nothing_without_replies() {
        let found = scan(&config(Vec::new())).await.unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn should_build_config_with_mac_and_name() {
        let scanned = ScannedDevice {
            host: "192.168.1.40".to_string(),
            port: 7000,
            mac: "f4911e7aca59".to_string(),
            name: "1e7aca59".to_string(),
            firmware: None,
        };
        let config = scanned.to_config();
        assert_eq!(config.mac.as_deref(), Some("f4911e7aca59"));
        assert_eq!(config.name.as_deref(), Some("1e7aca59"));
        assert!(config.key.is_none());
        assert!(config.validate().is_ok());
    }
}
