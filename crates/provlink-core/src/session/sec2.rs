//! Scheme 2: SRP6a password-authenticated key exchange + AES-256-GCM.
//!
//! Four clear-text messages on `prov-session`:
//! 1. username + client ephemeral A
//! 2. salt + device ephemeral B
//! 3. client proof M1
//! 4. device proof M2 + 12-byte base nonce
//!
//! SRP runs over the 3072-bit group with SHA-512; the first 32 bytes of
//! the SRP session key become the GCM key. Nonces are the first 7 bytes of
//! the device base nonce, one direction byte, and a per-direction 32-bit
//! big-endian counter, so no (key, nonce) pair repeats within a session.
//! Unlike Sec1, every ciphertext carries an authentication tag; a tag
//! failure surfaces as an integrity error, never as garbage plaintext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key};
use bytes::Bytes;
use data_encoding::BASE64;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use srp::client::{SrpClient, SrpClientVerifier};
use srp::groups::G_3072;

use super::{HandshakeStep, Session};
use crate::error::SecurityError;

const DIR_CLIENT_TO_DEVICE: u8 = 0x00;
const DIR_DEVICE_TO_CLIENT: u8 = 0x01;

/// Wire messages, shared with the scripted test device.
pub(crate) mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SessionCmd0 {
        pub msg: String,
        pub username: String,
        pub client_ephemeral: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SessionResp0 {
        pub status: String,
        pub salt: String,
        pub device_ephemeral: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SessionCmd1 {
        pub msg: String,
        pub client_proof: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SessionResp1 {
        pub status: String,
        pub device_proof: String,
        pub device_nonce: String,
    }

    pub const CMD0: &str = "s2_session_command0";
    pub const CMD1: &str = "s2_session_command1";
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>, SecurityError> {
    BASE64
        .decode(value.as_bytes())
        .map_err(|e| SecurityError::HandshakeState(format!("bad base64 in {field}: {e}")))
}

enum State {
    AwaitingSalt {
        client: SrpClient<'static, Sha512>,
        a: Vec<u8>,
        username: String,
        password: String,
    },
    AwaitingProof {
        verifier: SrpClientVerifier<Sha512>,
    },
}

pub struct Sec2Handshake {
    state: State,
}

impl Sec2Handshake {
    pub(super) fn start(
        username: String,
        password: String,
    ) -> Result<(Sec2Handshake, Bytes), SecurityError> {
        let client = SrpClient::<Sha512>::new(&G_3072);
        let mut a = vec![0u8; 64];
        OsRng.fill_bytes(&mut a);
        let a_pub = client.compute_public_ephemeral(&a);
        let req = serde_json::to_vec(&wire::SessionCmd0 {
            msg: wire::CMD0.into(),
            username: username.clone(),
            client_ephemeral: BASE64.encode(&a_pub),
        })
        .map_err(|e| SecurityError::HandshakeState(e.to_string()))?;
        Ok((
            Sec2Handshake {
                state: State::AwaitingSalt {
                    client,
                    a,
                    username,
                    password,
                },
            },
            Bytes::from(req),
        ))
    }

    pub(super) fn advance(self, response: &[u8]) -> Result<HandshakeStep, SecurityError> {
        match self.state {
            State::AwaitingSalt {
                client,
                a,
                username,
                password,
            } => {
                let resp: wire::SessionResp0 = serde_json::from_slice(response).map_err(|e| {
                    SecurityError::HandshakeState(format!("malformed sec2 response 0: {e}"))
                })?;
                if resp.status != "success" {
                    return Err(SecurityError::HandshakeState(format!(
                        "device refused sec2 session: {}",
                        resp.status
                    )));
                }
                let salt = decode("salt", &resp.salt)?;
                let b_pub = decode("device_ephemeral", &resp.device_ephemeral)?;
                let verifier = client
                    .process_reply(
                        &a,
                        username.as_bytes(),
                        password.as_bytes(),
                        &salt,
                        &b_pub,
                    )
                    .map_err(|e| {
                        SecurityError::HandshakeState(format!("SRP reply rejected: {e}"))
                    })?;
                let req = serde_json::to_vec(&wire::SessionCmd1 {
                    msg: wire::CMD1.into(),
                    client_proof: BASE64.encode(verifier.proof()),
                })
                .map_err(|e| SecurityError::HandshakeState(e.to_string()))?;
                Ok(HandshakeStep::Continue {
                    handshake: super::Handshake::Sec2(Sec2Handshake {
                        state: State::AwaitingProof { verifier },
                    }),
                    request: Bytes::from(req),
                })
            }
            State::AwaitingProof { verifier } => {
                let resp: wire::SessionResp1 = serde_json::from_slice(response).map_err(|e| {
                    SecurityError::HandshakeState(format!("malformed sec2 response 1: {e}"))
                })?;
                if resp.status != "success" {
                    return Err(SecurityError::AuthenticationFailed(
                        "device rejected the SRP proof".into(),
                    ));
                }
                let m2 = decode("device_proof", &resp.device_proof)?;
                verifier.verify_server(&m2).map_err(|_| {
                    SecurityError::AuthenticationFailed("device SRP proof is invalid".into())
                })?;
                let base_nonce: [u8; 12] = decode("device_nonce", &resp.device_nonce)?
                    .try_into()
                    .map_err(|_| {
                        SecurityError::HandshakeState("device_nonce must be 12 bytes".into())
                    })?;
                let key: [u8; 32] = verifier.key()[..32]
                    .try_into()
                    .map_err(|_| SecurityError::HandshakeState("SRP key too short".into()))?;
                Ok(HandshakeStep::Established(Session::Sec2(
                    Sec2Session::new(&key, base_nonce),
                )))
            }
        }
    }
}

/// AES-256-GCM channel with per-direction nonce counters.
pub struct Sec2Session {
    cipher: Aes256Gcm,
    base_nonce: [u8; 12],
    dir_out: u8,
    dir_in: u8,
    ctr_out: u32,
    ctr_in: u32,
}

impl Sec2Session {
    pub(crate) fn new(key: &[u8; 32], base_nonce: [u8; 12]) -> Self {
        Sec2Session {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            base_nonce,
            dir_out: DIR_CLIENT_TO_DEVICE,
            dir_in: DIR_DEVICE_TO_CLIENT,
            ctr_out: 0,
            ctr_in: 0,
        }
    }

    /// Device end of the same channel, with the directions swapped.
    pub(crate) fn new_peer(key: &[u8; 32], base_nonce: [u8; 12]) -> Self {
        let mut s = Self::new(key, base_nonce);
        s.dir_out = DIR_DEVICE_TO_CLIENT;
        s.dir_in = DIR_CLIENT_TO_DEVICE;
        s
    }

    fn nonce(&self, dir: u8, ctr: u32) -> [u8; 12] {
        let mut n = self.base_nonce;
        n[7] = dir;
        n[8..].copy_from_slice(&ctr.to_be_bytes());
        n
    }

    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Bytes, SecurityError> {
        let nonce = self.nonce(self.dir_out, self.ctr_out);
        let ct = self
            .cipher
            .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| SecurityError::Integrity)?;
        self.ctr_out += 1;
        Ok(Bytes::from(ct))
    }

    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Bytes, SecurityError> {
        let nonce = self.nonce(self.dir_in, self.ctr_in);
        let pt = self
            .cipher
            .decrypt(aes_gcm::Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| SecurityError::Integrity)?;
        self.ctr_in += 1;
        Ok(Bytes::from(pt))
    }
}
