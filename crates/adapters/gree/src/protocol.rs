//! Wire messages.
//!
//! Every request and reply travels inside a JSON envelope:
//!
//! ```json
//! {"t":"pack","i":0,"uid":0,"cid":"app","tcid":"f4911e7aca59","pack":"<base64>","tag":"<base64>"}
//! ```
//!
//! `i` is 1 for bind requests (sealed with the generic key) and 0 otherwise.
//! `tag` is only present for V2. The only unsealed message is the discovery
//! probe `{"t":"scan"}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use gree_amber_domain::device_config::EncryptionVersion;

use crate::cipher::Cipher;
use crate::error::GreeError;

/// Unsealed scan request.
pub const SCAN_REQUEST: &[u8] = br#"{"t":"scan"}"#;

const CLIENT_ID: &str = "app";
const PACK: &str = "pack";

/// Outer envelope of every sealed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub t: String,
    #[serde(default)]
    pub i: u8,
    #[serde(default)]
    pub uid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Packet {
    /// Seal `payload` for the unit `tcid`.
    ///
    /// # Errors
    ///
    /// Returns [`GreeError`] if the payload cannot be serialized or sealed.
    pub fn seal(payload: &Value, tcid: &str, i: u8, cipher: &Cipher) -> Result<Self, GreeError> {
        let sealed = cipher.seal(&serde_json::to_vec(payload)?)?;
        Ok(Self {
            t: PACK.to_string(),
            i,
            uid: 0,
            cid: Some(CLIENT_ID.to_string()),
            tcid: Some(tcid.to_string()),
            pack: Some(sealed.pack),
            tag: sealed.tag,
        })
    }

    /// Parse a received datagram.
    ///
    /// # Errors
    ///
    /// Returns [`GreeError::Json`] if the datagram is not an envelope.
    pub fn parse(datagram: &[u8]) -> Result<Self, GreeError> {
        Ok(serde_json::from_slice(datagram)?)
    }

    /// Serialize for sending.
    ///
    /// # Errors
    ///
    /// Returns [`GreeError::Json`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GreeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// The generic cipher a unit used for this packet (V2 carries a tag).
    #[must_use]
    pub fn generic_cipher(&self) -> Cipher {
        if self.tag.is_some() {
            Cipher::generic(EncryptionVersion::V2)
        } else {
            Cipher::generic(EncryptionVersion::V1)
        }
    }

    /// Decrypt and decode the sealed payload.
    ///
    /// # Errors
    ///
    /// Returns [`GreeError::UnexpectedPacket`] when there is no sealed
    /// payload, or a cipher/JSON error when it cannot be opened.
    pub fn open<T: DeserializeOwned>(&self, cipher: &Cipher) -> Result<T, GreeError> {
        let pack = match (&self.pack, self.t.as_str()) {
            (Some(pack), PACK) => pack,
            _ => {
                return Err(GreeError::UnexpectedPacket {
                    expected: PACK,
                    actual: self.t.clone(),
                });
            }
        };
        let plain = cipher.open(pack, self.tag.as_deref())?;
        Ok(serde_json::from_slice(&plain)?)
    }
}

/// What a unit says about itself in reply to a scan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceInfo {
    pub mac: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ver: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl DeviceInfo {
    /// The MAC in lowercase without separators.
    #[must_use]
    pub fn normalized_mac(&self) -> String {
        self.mac
            .chars()
            .filter(char::is_ascii_hexdigit)
            .collect::<String>()
            .to_ascii_lowercase()
    }
}

/// Decrypted reply payloads, keyed by their `t` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum Reply {
    Dev(DeviceInfo),
    Bindok {
        key: String,
    },
    Dat {
        cols: Vec<String>,
        dat: Vec<Value>,
    },
    Res {
        #[serde(default)]
        opt: Vec<String>,
        #[serde(default)]
        p: Vec<Value>,
    },
    #[serde(other)]
    Other,
}

impl Reply {
    /// The `t` value this reply carried.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dev(_) => "dev",
            Self::Bindok { .. } => "bindok",
            Self::Dat { .. } => "dat",
            Self::Res { .. } => "res",
            Self::Other => "other",
        }
    }
}

/// Bind request payload; V2 units also expect the MAC as `cid`.
#[must_use]
pub fn bind_request(mac: &str, version: EncryptionVersion) -> Value {
    match version {
        EncryptionVersion::V1 => json!({ "mac": mac, "t": "bind", "uid": 0 }),
        EncryptionVersion::V2 => json!({ "cid": mac, "mac": mac, "t": "bind", "uid": 0 }),
    }
}

/// Status request payload for `cols`.
#[must_use]
pub fn status_request(mac: &str, cols: &[&str]) -> Value {
    json!({ "cols": cols, "mac": mac, "t": "status" })
}

/// Command payload writing each `(property, value)` pair.
#[must_use]
pub fn command_request(writes: &[(&str, i64)]) -> Value {
    let opt: Vec<&str> = writes.iter().map(|(name, _)| *name).collect();
    let p: Vec<i64> = writes.iter().map(|(_, value)| *value).collect();
    json!({ "opt": opt, "p": p, "t": "cmd" })
}
