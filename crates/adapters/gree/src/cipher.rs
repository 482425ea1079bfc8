//! Payload ciphers.
//!
//! | Version | Algorithm | Generic key | Extra |
//! |---------|-----------|-------------|-------|
//! | V1 | AES-128-ECB, PKCS#7 | `a3K8Bx%2r8Y7#xDh` | none |
//! | V2 | AES-128-GCM | `{yxAHAY_Lm6pbC/<` | fixed nonce, AAD `qualcomm-test`, tag sent beside the pack |
//!
//! The generic key seals discovery and bind traffic; everything after a
//! successful bind uses the per-device key.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt};
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce, Tag};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use gree_amber_domain::device_config::{DEVICE_KEY_LEN, EncryptionVersion};

use crate::error::CipherError;

const GENERIC_KEY_V1: &[u8; DEVICE_KEY_LEN] = b"a3K8Bx%2r8Y7#xDh";
const GENERIC_KEY_V2: &[u8; DEVICE_KEY_LEN] = b"{yxAHAY_Lm6pbC/<";
const GCM_NONCE: [u8; 12] = [
    0x54, 0x40, 0x78, 0x44, 0x49, 0x67, 0x5a, 0x51, 0x6c, 0x5e, 0x63, 0x13,
];
const GCM_AAD: &[u8] = b"qualcomm-test";
const BLOCK_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// A sealed payload: the base64 `pack` and, for V2, the base64 `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub pack: String,
    pub tag: Option<String>,
}

/// Cipher bound to one key.
#[derive(Clone, PartialEq, Eq)]
pub struct Cipher {
    version: EncryptionVersion,
    key: [u8; DEVICE_KEY_LEN],
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Cipher {
    /// Cipher using the well-known key of `version`.
    #[must_use]
    pub fn generic(version: EncryptionVersion) -> Self {
        let key = match version {
            EncryptionVersion::V1 => GENERIC_KEY_V1,
            EncryptionVersion::V2 => GENERIC_KEY_V2,
        };
        Self {
            version,
            key: *key,
        }
    }

    /// Cipher using a device key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::KeyLength`] unless `key` is 16 bytes.
    pub fn with_key(version: EncryptionVersion, key: &str) -> Result<Self, CipherError> {
        let key: [u8; DEVICE_KEY_LEN] = key
            .as_bytes()
            .try_into()
            .map_err(|_| CipherError::KeyLength { actual: key.len() })?;
        Ok(Self { version, key })
    }

    #[must_use]
    pub fn version(&self) -> EncryptionVersion {
        self.version
    }

    /// Encrypt `plain` and base64 the result.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Authentication`] if GCM sealing fails.
    pub fn seal(&self, plain: &[u8]) -> Result<Sealed, CipherError> {
        match self.version {
            EncryptionVersion::V1 => Ok(Sealed {
                pack: STANDARD.encode(self.ecb_encrypt(plain)),
                tag: None,
            }),
            EncryptionVersion::V2 => {
                let mut buffer = plain.to_vec();
                let tag = self
                    .gcm()
                    .encrypt_in_place_detached(Nonce::from_slice(&GCM_NONCE), GCM_AAD, &mut buffer)
                    .map_err(|_| CipherError::Authentication)?;
                Ok(Sealed {
                    pack: STANDARD.encode(buffer),
                    tag: Some(STANDARD.encode(tag)),
                })
            }
        }
    }

    /// Decode and decrypt a `pack`, dropping anything after the last `}`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError`] for bad base64, a bad ECB length, or a
    /// missing/invalid GCM tag.
    pub fn open(&self, pack: &str, tag: Option<&str>) -> Result<Vec<u8>, CipherError> {
        let mut buffer = STANDARD.decode(pack.trim())?;
        match self.version {
            EncryptionVersion::V1 => self.ecb_decrypt(&mut buffer)?,
            EncryptionVersion::V2 => {
                let tag = STANDARD.decode(tag.ok_or(CipherError::Authentication)?.trim())?;
                if tag.len() != TAG_LEN {
                    return Err(CipherError::Authentication);
                }
                self.gcm()
                    .decrypt_in_place_detached(
                        Nonce::from_slice(&GCM_NONCE),
                        GCM_AAD,
                        &mut buffer,
                        Tag::from_slice(&tag),
                    )
                    .map_err(|_| CipherError::Authentication)?;
            }
        }
        if let Some(end) = buffer.iter().rposition(|&byte| byte == b'}') {
            buffer.truncate(end + 1);
        }
        Ok(buffer)
    }

    fn gcm(&self) -> Aes128Gcm {
        Aes128Gcm::new(GenericArray::from_slice(&self.key))
    }

    fn ecb(&self) -> Aes128 {
        Aes128::new(GenericArray::from_slice(&self.key))
    }

    fn ecb_encrypt(&self, plain: &[u8]) -> Vec<u8> {
        let padding = BLOCK_LEN - plain.len() % BLOCK_LEN;
        let mut buffer = Vec::with_capacity(plain.len() + padding);
        buffer.extend_from_slice(plain);
        // padding is 1..=16, always fits a byte
        buffer.resize(plain.len() + padding, u8::try_from(padding).unwrap_or(16));
        let aes = self.ecb();
        for block in buffer.chunks_exact_mut(BLOCK_LEN) {
            aes.encrypt_block(GenericArray::from_mut_slice(block));
        }
        buffer
    }

    fn ecb_decrypt(&self, buffer: &mut Vec<u8>) -> Result<(), CipherError> {
        if buffer.is_empty() || buffer.len() % BLOCK_LEN != 0 {
            return Err(CipherError::BlockLength {
                actual: buffer.len(),
            });
        }
        let aes = self.ecb();
        for block in buffer.chunks_exact_mut(BLOCK_LEN) {
            aes.decrypt_block(GenericArray::from_mut_slice(block));
        }
        if let Some(&padding) = buffer.last() {
            let padding = usize::from(padding);
            if (1..=BLOCK_LEN).contains(&padding) {
                buffer.truncate(buffer.len() - padding);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = br#"{"t":"status","mac":"f4911e7aca59","cols":["Pow","Mod"]}"#;

    #[test]
    fn should_open_what_v1_sealed() {
        let cipher = Cipher::generic(EncryptionVersion::V1);
        let sealed = cipher.seal(PAYLOAD).unwrap();
        assert!(sealed.tag.is_none());
        assert_eq!(cipher.open(&sealed.pack, None).unwrap(), PAYLOAD);
    }

    #[test]
    fn should_open_what_v2_sealed() {
        let cipher = Cipher::generic(EncryptionVersion::V2);
        let sealed = cipher.seal(PAYLOAD).unwrap();
        let opened = cipher.open(&sealed.pack, sealed.tag.as_deref()).unwrap();
        assert_eq!(opened, PAYLOAD);
    }

    #[test]
    fn should_pad_full_block_for_aligned_input() {
        let cipher = Cipher::generic(EncryptionVersion::V1);
        let sealed = cipher.seal(b"{\"t\":\"scan\"0000}").unwrap();
        let raw = STANDARD.decode(sealed.pack).unwrap();
        assert_eq!(raw.len(), 32);
    }

    #[test]
    fn should_reject_wrong_gcm_tag() {
        let cipher = Cipher::generic(EncryptionVersion::V2);
        let sealed = cipher.seal(PAYLOAD).unwrap();
        let wrong_tag = STANDARD.encode([0u8; TAG_LEN]);
        let result = cipher.open(&sealed.pack, Some(&wrong_tag));
        assert!(matches!(result, Err(CipherError::Authentication)));
    }

    #[test]
    fn should_reject_missing_gcm_tag() {
        let cipher = Cipher::generic(EncryptionVersion::V2);
        let sealed = cipher.seal(PAYLOAD).unwrap();
        assert!(matches!(
            cipher.open(&sealed.pack, None),
            Err(CipherError::Authentication)
        ));
    }

    #[test]
    fn should_not_open_with_another_key() {
        let sealed = Cipher::generic(EncryptionVersion::V1).seal(PAYLOAD).unwrap();
        let other = Cipher::with_key(EncryptionVersion::V1, "0123456789abcdef").unwrap();
        if let Ok(bytes) = other.open(&sealed.pack, None) {
            assert_ne!(bytes, PAYLOAD);
        }
    }

    #[test]
    fn should_reject_truncated_ecb_ciphertext() {
        let cipher = Cipher::generic(EncryptionVersion::V1);
        let result = cipher.open(&STANDARD.encode([1u8; 15]), None);
        assert!(matches!(
            result,
            Err(CipherError::BlockLength { actual: 15 })
        ));
    }

    #[test]
    fn should_drop_bytes_after_closing_brace() {
        let cipher = Cipher::generic(EncryptionVersion::V1);
        let sealed = cipher.seal(b"{\"t\":\"bindok\"}\0\0\0").unwrap();
        assert_eq!(cipher.open(&sealed.pack, None).unwrap(), b"{\"t\":\"bindok\"}");
    }

    #[test]
    fn should_reject_short_device_key() {
        let result = Cipher::with_key(EncryptionVersion::V1, "short");
        assert!(matches!(result, Err(CipherError::KeyLength { actual: 5 })));
    }

    #[test]
    fn should_not_leak_key_in_debug_output() {
        let cipher = Cipher::with_key(EncryptionVersion::V1, "0123456789abcdef").unwrap();
        assert!(!format!("{cipher:?}").contains("0123"));
    }
}
