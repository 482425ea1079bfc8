//! Gree adapter error types.

use gree_amber_app::ports::ClientError;

/// Errors raised while talking to a Gree unit.
#[derive(Debug, thiserror::Error)]
pub enum GreeError {
    /// Socket creation, resolution or datagram IO failed.
    #[error("UDP transport error")]
    Io(#[from] std::io::Error),

    /// A payload could not be sealed or opened.
    #[error("cipher error")]
    Cipher(#[from] CipherError),

    /// A datagram or decrypted payload was not the expected JSON.
    #[error("malformed JSON payload")]
    Json(#[from] serde_json::Error),

    /// The unit did not answer in time.
    #[error("no reply from device")]
    Timeout,

    /// Binding completed without a device key.
    #[error("device did not return a key")]
    NotBound,

    /// The client has been closed.
    #[error("client is closed")]
    Closed,

    /// The unit answered with a packet of the wrong kind.
    #[error("unexpected {actual:?} packet, wanted {expected:?}")]
    UnexpectedPacket {
        expected: &'static str,
        actual: String,
    },

    /// A target temperature has no valid device encoding.
    #[error("temperature {value} cannot be encoded")]
    InvalidTemperature { value: i32 },
}

/// Details about why a payload could not be sealed or opened.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The packed payload is not valid base64.
    #[error("invalid base64 payload")]
    Base64(#[from] base64::DecodeError),

    /// ECB ciphertext must be a non-empty multiple of the block size.
    #[error("ciphertext length {actual} is not a multiple of 16")]
    BlockLength { actual: usize },

    /// The GCM tag is missing or does not authenticate the payload.
    #[error("payload failed authentication")]
    Authentication,

    /// The key is not 16 bytes.
    #[error("key must be 16 bytes, got {actual}")]
    KeyLength { actual: usize },
}

impl GreeError {
    /// Convert into the [`ClientError`] reported across the client port.
    #[must_use]
    pub fn into_client(self) -> ClientError {
        match self {
            Self::Timeout => ClientError::Timeout,
            Self::NotBound => ClientError::NotBound,
            Self::Closed => ClientError::Closed,
            other => ClientError::Transport(Box::new(other)),
        }
    }
}

impl From<GreeError> for ClientError {
    fn from(err: GreeError) -> Self {
        err.into_client()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_timeout_to_client_timeout() {
        let err: ClientError = GreeError::Timeout.into();
        assert!(matches!(err, ClientError::Timeout));
    }

    #[test]
    fn should_map_not_bound_to_client_not_bound() {
        let err: ClientError = GreeError::NotBound.into();
        assert!(matches!(err, ClientError::NotBound));
    }

    #[test]
    fn should_wrap_cipher_error_as_transport() {
        let err: ClientError = GreeError::Cipher(CipherError::Authentication).into();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[test]
    fn should_display_unexpected_packet() {
        let err = GreeError::UnexpectedPacket {
            expected: "bindok",
            actual: "dat".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected \"dat\" packet, wanted \"bindok\"");
    }

    #[test]
    fn should_display_block_length() {
        let err = CipherError::BlockLength { actual: 15 };
        assert_eq!(err.to_string(), "ciphertext length 15 is not a multiple of 16");
    }
}
