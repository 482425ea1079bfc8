//! A fake unit answering the LAN protocol on a loopback UDP port.
//!
//! Enabled for this crate's tests and, through the `test-util` feature, for
//! downstream end-to-end tests.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use gree_amber_domain::device_config::{DeviceConfig, EncryptionVersion};

use crate::cipher::Cipher;
use crate::props::BUZZER;
use crate::protocol::Packet;

/// Observable and adjustable state of a [`FakeDevice`].
#[derive(Debug, Clone)]
pub struct FakeState {
    pub mac: String,
    pub name: String,
    pub key: String,
    pub encryption: EncryptionVersion,
    pub hid: String,
    pub props: BTreeMap<String, i64>,
    /// Every command received, as `(column, value)` pairs in order.
    pub commands: Vec<Vec<(String, i64)>>,
    pub bind_requests: usize,
    pub status_requests: usize,
    /// Drop every request without answering.
    pub silent: bool,
    /// Answer scans but ignore bind requests.
    pub refuse_bind: bool,
}

impl FakeState {
    fn new(mac: &str, encryption: EncryptionVersion) -> Self {
        let props = [
            ("Pow", 1),
            ("Mod", 1),
            ("SetTem", 24),
            ("TemSen", 66),
            ("TemUn", 0),
            ("TemRec", 0),
            ("WdSpd", 0),
            ("SwingLfRig", 0),
            ("SwUpDn", 0),
            ("Quiet", 0),
            ("Tur", 0),
            ("SwhSlp", 0),
            ("SlpMod", 0),
            ("StHt", 0),
            ("SvSt", 0),
            ("Lig", 1),
            ("Air", 0),
            ("Blo", 0),
            ("Health", 0),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
        Self {
            mac: mac.to_string(),
            name: mac[mac.len().saturating_sub(8)..].to_string(),
            key: "Ts7Lk9Qz2Wr4Xy6B".to_string(),
            encryption,
            hid: "362001000762+U-CS532AE(LT)V3.31.bin".to_string(),
            props,
            commands: Vec::new(),
            bind_requests: 0,
            status_requests: 0,
            silent: false,
            refuse_bind: false,
        }
    }
}

/// Handle to a running fake unit. The responder stops when dropped.
pub struct FakeDevice {
    addr: SocketAddr,
    state: Arc<Mutex<FakeState>>,
    task: JoinHandle<()>,
}

impl FakeDevice {
    /// Start a unit with MAC `mac` speaking `encryption` on `127.0.0.1`.
    ///
    /// # Errors
    ///
    /// Returns the socket error if the loopback port cannot be bound.
    pub async fn spawn(mac: &str, encryption: EncryptionVersion) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = socket.local_addr()?;
        let state = Arc::new(Mutex::new(FakeState::new(mac, encryption)));
        let task = tokio::spawn(serve(socket, Arc::clone(&state)));
        Ok(Self { addr, state, task })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Host-only configuration pointing at this unit.
    #[must_use]
    pub fn config(&self) -> DeviceConfig {
        let mut config = DeviceConfig::for_host(self.addr.ip().to_string());
        config.port = self.addr.port();
        config
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> FakeState {
        lock(&self.state).clone()
    }

    /// Mutate the state in place.
    pub fn update(&self, change: impl FnOnce(&mut FakeState)) {
        change(&mut lock(&self.state));
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn lock(state: &Mutex<FakeState>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn serve(socket: UdpSocket, state: Arc<Mutex<FakeState>>) {
    let mut buffer = vec![0u8; 4096];
    loop {
        let Ok((len, peer)) = socket.recv_from(&mut buffer).await else {
            return;
        };
        let reply = respond(&mut lock(&state), &buffer[..len]);
        if let Some(reply) = reply {
            let _ = socket.send_to(&reply, peer).await;
        }
    }
}

fn seal(payload: &Value, cipher: &Cipher, i: u8) -> Option<Vec<u8>> {
    Packet::seal(payload, "app", i, cipher).ok()?.to_bytes().ok()
}

fn respond(state: &mut FakeState, datagram: &[u8]) -> Option<Vec<u8>> {
    if state.silent {
        return None;
    }
    let packet = Packet::parse(datagram).ok()?;
    if packet.t == "scan" {
        let info = json!({
            "t": "dev",
            "cid": state.mac,
            "mac": state.mac,
            "name": state.name,
            "ver": "V1.2.1",
            "brand": "gree",
            "model": "gree",
        });
        return seal(&info, &Cipher::generic(state.encryption), 0);
    }

    // a unit only understands its own cipher version
    if packet.tag.is_some() != (state.encryption == EncryptionVersion::V2) {
        return None;
    }
    let cipher = if packet.i == 1 {
        Cipher::generic(state.encryption)
    } else {
        Cipher::with_key(state.encryption, &state.key).ok()?
    };
    let request: Value = packet.open(&cipher).ok()?;

    match request["t"].as_str()? {
        "bind" => {
            state.bind_requests += 1;
            if state.refuse_bind {
                return None;
            }
            let reply = json!({ "t": "bindok", "mac": state.mac, "key": state.key, "r": 200 });
            seal(&reply, &cipher, 1)
        }
        "status" => {
            state.status_requests += 1;
            let cols: Vec<String> = serde_json::from_value(request["cols"].clone()).ok()?;
            let dat: Vec<Value> = cols
                .iter()
                .map(|col| {
                    if col == "hid" {
                        json!(state.hid)
                    } else {
                        json!(state.props.get(col).copied().unwrap_or_default())
                    }
                })
                .collect();
            let reply = json!({ "t": "dat", "mac": state.mac, "r": 200, "cols": cols, "dat": dat });
            seal(&reply, &cipher, 0)
        }
        "cmd" => {
            let opt: Vec<String> = serde_json::from_value(request["opt"].clone()).ok()?;
            let p: Vec<i64> = serde_json::from_value(request["p"].clone()).ok()?;
            let writes: Vec<(String, i64)> = opt.iter().cloned().zip(p.iter().copied()).collect();
            for (name, value) in &writes {
                if name != BUZZER {
                    state.props.insert(name.clone(), *value);
                }
            }
            state.commands.push(writes);
            let reply = json!({ "t": "res", "mac": state.mac, "r": 200, "opt": opt, "p": p, "val": p });
            seal(&reply, &cipher, 0)
        }
        _ => None,
    }
}
