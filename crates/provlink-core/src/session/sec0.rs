//! Scheme 0: no encryption.
//!
//! The handshake is a single hello/ack so the device can confirm the
//! negotiated scheme; encrypt and decrypt are identity transforms.

use bytes::Bytes;
use serde::Deserialize;

use super::{HandshakeStep, Session};
use crate::error::SecurityError;

const HELLO: &[u8] = br#"{"msg":"s0_session_command"}"#;

#[derive(Debug, Deserialize)]
struct HelloAck {
    status: String,
}

#[derive(Debug)]
pub struct Sec0Handshake {
    _priv: (),
}

impl Sec0Handshake {
    pub(super) fn start() -> (Sec0Handshake, Bytes) {
        (Sec0Handshake { _priv: () }, Bytes::from_static(HELLO))
    }

    pub(super) fn advance(self, response: &[u8]) -> Result<HandshakeStep, SecurityError> {
        let ack: HelloAck = serde_json::from_slice(response).map_err(|e| {
            SecurityError::HandshakeState(format!("malformed sec0 response: {e}"))
        })?;
        if ack.status != "success" {
            return Err(SecurityError::HandshakeState(format!(
                "device refused sec0 session: {}",
                ack.status
            )));
        }
        Ok(HandshakeStep::Established(Session::Sec0(Sec0Session {
            _priv: (),
        })))
    }
}

#[derive(Debug)]
pub struct Sec0Session {
    _priv: (),
}

impl Sec0Session {
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Bytes {
        Bytes::copy_from_slice(plaintext)
    }

    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Bytes {
        Bytes::copy_from_slice(ciphertext)
    }
}
