//! UDP client for one unit.
//!
//! A client owns a connected socket, the cipher negotiated while binding and
//! the raw property values last acknowledged by the unit. Requests go out one
//! at a time; stray or undecodable datagrams are skipped until the expected
//! reply arrives or the timeout elapses.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde_json::Value;
use tokio::net::UdpSocket;

use gree_amber_app::ports::{ClientError, ClientFactory, ClientOptions, ClimateClient, DeviceIdentity};
use gree_amber_domain::climate::{DeviceCommand, DeviceStatus};
use gree_amber_domain::device_config::{DeviceConfig, EncryptionVersion};

use crate::cipher::Cipher;
use crate::error::GreeError;
use crate::props::PropertyMap;
use crate::protocol::{
    DeviceInfo, Packet, Reply, SCAN_REQUEST, bind_request, command_request, status_request,
};

const RECV_BUFFER: usize = 4096;

/// Per-request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Status, command and identify requests.
    pub request: Duration,
    /// Each bind attempt; a V1 timeout falls through to V2.
    pub bind: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(10),
            bind: Duration::from_secs(10),
        }
    }
}

/// A bound client for one unit.
#[derive(Debug)]
pub struct GreeClient {
    socket: Option<UdpSocket>,
    identity: DeviceIdentity,
    cipher: Cipher,
    props: PropertyMap,
    options: ClientOptions,
    timeouts: Timeouts,
}

impl GreeClient {
    /// Reach the unit, learn its MAC when not configured, and bind.
    ///
    /// With a configured key binding is local. Otherwise a V1 bind is tried
    /// first and V2 after a timeout, unless `encryption` pins the version.
    ///
    /// # Errors
    ///
    /// Returns [`GreeError::Timeout`] when the unit does not answer,
    /// [`GreeError::NotBound`] when binding yields no key, or a socket error.
    #[tracing::instrument(skip_all, fields(host = %config.host, port = config.port))]
    pub async fn connect(
        config: &DeviceConfig,
        options: ClientOptions,
        timeouts: Timeouts,
    ) -> Result<Self, GreeError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect((config.host.as_str(), config.port)).await?;

        let (mac, reported_name) = match config.normalized_mac() {
            Some(mac) => (mac, None),
            None => {
                let info = identify(&socket, timeouts.request).await?;
                tracing::info!(mac = %info.mac, name = %info.name, "device identified");
                (info.normalized_mac(), Some(info.name))
            }
        };
        let name = config
            .name
            .clone()
            .or(reported_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| mac.clone());

        let cipher = match &config.key {
            Some(key) => Cipher::with_key(config.encryption.unwrap_or_default(), key)?,
            None => bind(&socket, &mac, config.encryption, timeouts.bind).await?,
        };
        tracing::info!(%mac, version = ?cipher.version(), "device bound");

        Ok(Self {
            socket: Some(socket),
            identity: DeviceIdentity {
                mac,
                name,
                host: config.host.clone(),
                firmware: None,
            },
            cipher,
            props: PropertyMap::default(),
            options,
            timeouts,
        })
    }

    #[tracing::instrument(skip(self), fields(mac = %self.identity.mac))]
    async fn read_status(&mut self) -> Result<DeviceStatus, GreeError> {
        let socket = self.socket.as_ref().ok_or(GreeError::Closed)?;
        let cols = self.props.status_columns();
        let request = status_request(&self.identity.mac, &cols);
        let reply = exchange(
            socket,
            &self.identity.mac,
            &self.cipher,
            0,
            &request,
            "dat",
            self.timeouts.request,
        )
        .await?;
        match reply {
            Reply::Dat { cols, dat } => self.props.absorb(&cols, &dat),
            other => return Err(unexpected("dat", &other)),
        }
        self.identity.firmware = self.props.version().map(str::to_string);
        Ok(self.props.status())
    }

    #[tracing::instrument(skip(self), fields(mac = %self.identity.mac))]
    async fn send_commands(&mut self, commands: &[DeviceCommand]) -> Result<(), GreeError> {
        let socket = self.socket.as_ref().ok_or(GreeError::Closed)?;
        let staged = self.props.stage(commands, self.options.suppress_beep)?;
        if staged.is_empty() {
            tracing::debug!("device already in requested state");
            return Ok(());
        }
        for (name, value) in staged.writes() {
            tracing::debug!(property = name, value, "sending property");
        }
        exchange(
            socket,
            &self.identity.mac,
            &self.cipher,
            0,
            &command_request(staged.writes()),
            "res",
            self.timeouts.request,
        )
        .await?;
        self.props.commit(staged);
        Ok(())
    }
}

impl ClimateClient for GreeClient {
    fn identity(&self) -> DeviceIdentity {
        self.identity.clone()
    }

    async fn update_state(&mut self) -> Result<DeviceStatus, ClientError> {
        Ok(self.read_status().await?)
    }

    async fn push_state(&mut self, commands: &[DeviceCommand]) -> Result<(), ClientError> {
        Ok(self.send_commands(commands).await?)
    }

    async fn relocate(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
        let socket = self.socket.as_ref().ok_or(GreeError::Closed)?;
        socket.connect((host, port)).await.map_err(GreeError::from)?;
        tracing::debug!(mac = %self.identity.mac, host, port, "socket reconnected");
        self.identity.host = host.to_string();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        if self.socket.take().is_some() {
            tracing::debug!(mac = %self.identity.mac, "socket closed");
        }
        Ok(())
    }
}

/// Builds [`GreeClient`]s over UDP.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpClientFactory {
    timeouts: Timeouts,
}

impl UdpClientFactory {
    #[must_use]
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }
}

impl ClientFactory for UdpClientFactory {
    type Client = GreeClient;

    async fn connect(
        &self,
        config: &DeviceConfig,
        options: ClientOptions,
    ) -> Result<GreeClient, ClientError> {
        Ok(GreeClient::connect(config, options, self.timeouts).await?)
    }
}

fn unexpected(expected: &'static str, reply: &Reply) -> GreeError {
    GreeError::UnexpectedPacket {
        expected,
        actual: reply.kind().to_string(),
    }
}

async fn identify(socket: &UdpSocket, wait: Duration) -> Result<DeviceInfo, GreeError> {
    socket.send(SCAN_REQUEST).await?;
    let reply = tokio::time::timeout(
        wait,
        receive(socket, "dev", |packet| packet.open(&packet.generic_cipher())),
    )
    .await
    .map_err(|_| GreeError::Timeout)??;
    match reply {
        Reply::Dev(info) => Ok(info),
        other => Err(unexpected("dev", &other)),
    }
}

async fn bind(
    socket: &UdpSocket,
    mac: &str,
    pinned: Option<EncryptionVersion>,
    wait: Duration,
) -> Result<Cipher, GreeError> {
    let candidates = match pinned {
        Some(version) => vec![version],
        None => vec![EncryptionVersion::V1, EncryptionVersion::V2],
    };
    for version in candidates {
        tracing::debug!(?version, "binding");
        match bind_with(socket, mac, version, wait).await {
            Err(GreeError::Timeout) => tracing::debug!(?version, "bind timed out"),
            result => return result,
        }
    }
    Err(GreeError::Timeout)
}

async fn bind_with(
    socket: &UdpSocket,
    mac: &str,
    version: EncryptionVersion,
    wait: Duration,
) -> Result<Cipher, GreeError> {
    let generic = Cipher::generic(version);
    let reply = exchange(
        socket,
        mac,
        &generic,
        1,
        &bind_request(mac, version),
        "bindok",
        wait,
    )
    .await?;
    match reply {
        Reply::Bindok { key } if !key.is_empty() => Ok(Cipher::with_key(version, &key)?),
        Reply::Bindok { .. } => Err(GreeError::NotBound),
        other => Err(unexpected("bindok", &other)),
    }
}

async fn exchange(
    socket: &UdpSocket,
    mac: &str,
    cipher: &Cipher,
    i: u8,
    payload: &Value,
    expect: &'static str,
    wait: Duration,
) -> Result<Reply, GreeError> {
    let packet = Packet::seal(payload, mac, i, cipher)?;
    socket.send(&packet.to_bytes()?).await?;
    tokio::time::timeout(wait, receive(socket, expect, |packet| packet.open(cipher)))
        .await
        .map_err(|_| GreeError::Timeout)?
}

async fn receive<F>(socket: &UdpSocket, expect: &'static str, open: F) -> Result<Reply, GreeError>
where
    F: Fn(&Packet) -> Result<Reply, GreeError>,
{
    let mut buffer = vec![0u8; RECV_BUFFER];
    loop {
        let len = socket.recv(&mut buffer).await?;
        match Packet::parse(&buffer[..len]).and_then(|packet| open(&packet)) {
            Ok(reply) if reply.kind() == expect => return Ok(reply),
            Ok(reply) => tracing::debug!(kind = reply.kind(), expect, "skipping reply"),
            Err(err) => tracing::debug!(error = %err, "skipping undecodable datagram"),
        }
    }
}
