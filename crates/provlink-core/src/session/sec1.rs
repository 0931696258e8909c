//! Scheme 1: X25519 ECDH + AES-256-CTR with Proof of Possession.
//!
//! Four clear-text messages on `prov-session`:
//! 1. client public key
//! 2. device public key + 16-byte device random (the CTR IV)
//! 3. client verifier: the device public key encrypted with the derived key
//! 4. device verifier: the client public key encrypted on the device side
//!
//! Key = X25519 shared secret, XORed with SHA-256(PoP) when a PoP is in
//! play. Both sides keep one keystream per direction, so the verifier
//! exchanges advance the same streams later payloads use.
//!
//! CTR gives no integrity; authentication rests entirely on the verifier
//! round. A mismatch never degrades to plaintext.

use aes::Aes256;
use bytes::Bytes;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use data_encoding::BASE64;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};

use super::{HandshakeStep, Session};
use crate::error::SecurityError;

type Aes256Ctr = Ctr128BE<Aes256>;

/// Wire messages, shared with the scripted test device.
pub(crate) mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SessionCmd0 {
        pub msg: String,
        pub client_pubkey: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SessionResp0 {
        pub status: String,
        pub device_pubkey: String,
        pub device_random: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SessionCmd1 {
        pub msg: String,
        pub client_verify: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SessionResp1 {
        pub status: String,
        pub device_verify: String,
    }

    pub const CMD0: &str = "s1_session_command0";
    pub const CMD1: &str = "s1_session_command1";
}

/// Mix the PoP into the raw shared secret.
pub(crate) fn derive_key(shared: &[u8; 32], pop: Option<&str>) -> [u8; 32] {
    let mut key = *shared;
    if let Some(pop) = pop {
        let digest = Sha256::digest(pop.as_bytes());
        for (k, d) in key.iter_mut().zip(digest) {
            *k ^= d;
        }
    }
    key
}

fn decode32(field: &str, value: &str) -> Result<[u8; 32], SecurityError> {
    let raw = BASE64
        .decode(value.as_bytes())
        .map_err(|e| SecurityError::HandshakeState(format!("bad base64 in {field}: {e}")))?;
    raw.try_into()
        .map_err(|_| SecurityError::HandshakeState(format!("{field} must be 32 bytes")))
}

enum State {
    AwaitingDeviceKey {
        secret: EphemeralSecret,
        client_pub: PublicKey,
    },
    AwaitingVerify {
        session: Sec1Session,
        client_pub: PublicKey,
    },
}

pub struct Sec1Handshake {
    state: State,
    pop: Option<String>,
}

impl Sec1Handshake {
    pub(super) fn start(pop: Option<String>) -> Result<(Sec1Handshake, Bytes), SecurityError> {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let client_pub = PublicKey::from(&secret);
        let req = serde_json::to_vec(&wire::SessionCmd0 {
            msg: wire::CMD0.into(),
            client_pubkey: BASE64.encode(client_pub.as_bytes()),
        })
        .map_err(|e| SecurityError::HandshakeState(e.to_string()))?;
        Ok((
            Sec1Handshake {
                state: State::AwaitingDeviceKey { secret, client_pub },
                pop,
            },
            Bytes::from(req),
        ))
    }

    pub(super) fn advance(self, response: &[u8]) -> Result<HandshakeStep, SecurityError> {
        match self.state {
            State::AwaitingDeviceKey { secret, client_pub } => {
                let resp: wire::SessionResp0 = serde_json::from_slice(response).map_err(|e| {
                    SecurityError::HandshakeState(format!("malformed sec1 response 0: {e}"))
                })?;
                if resp.status != "success" {
                    return Err(SecurityError::HandshakeState(format!(
                        "device refused sec1 session: {}",
                        resp.status
                    )));
                }
                let device_pub = decode32("device_pubkey", &resp.device_pubkey)?;
                let iv: [u8; 16] = BASE64
                    .decode(resp.device_random.as_bytes())
                    .map_err(|e| {
                        SecurityError::HandshakeState(format!("bad base64 in device_random: {e}"))
                    })?
                    .try_into()
                    .map_err(|_| {
                        SecurityError::HandshakeState("device_random must be 16 bytes".into())
                    })?;

                let shared = secret.diffie_hellman(&PublicKey::from(device_pub));
                let key = derive_key(shared.as_bytes(), self.pop.as_deref());
                let mut session = Sec1Session::new(&key, &iv);

                // Proves key knowledge and advances the outgoing stream.
                let client_verify = session.encrypt(&device_pub);
                let req = serde_json::to_vec(&wire::SessionCmd1 {
                    msg: wire::CMD1.into(),
                    client_verify: BASE64.encode(&client_verify),
                })
                .map_err(|e| SecurityError::HandshakeState(e.to_string()))?;
                Ok(HandshakeStep::Continue {
                    handshake: super::Handshake::Sec1(Sec1Handshake {
                        state: State::AwaitingVerify {
                            session,
                            client_pub,
                        },
                        pop: self.pop,
                    }),
                    request: Bytes::from(req),
                })
            }
            State::AwaitingVerify {
                mut session,
                client_pub,
            } => {
                let resp: wire::SessionResp1 = serde_json::from_slice(response).map_err(|e| {
                    SecurityError::HandshakeState(format!("malformed sec1 response 1: {e}"))
                })?;
                if resp.status != "success" {
                    return Err(SecurityError::AuthenticationFailed(
                        "device rejected the proof of possession".into(),
                    ));
                }
                let device_verify = BASE64.decode(resp.device_verify.as_bytes()).map_err(|e| {
                    SecurityError::HandshakeState(format!("bad base64 in device_verify: {e}"))
                })?;
                let recovered = session.decrypt(&device_verify);
                if recovered.as_ref() != client_pub.as_bytes() {
                    return Err(SecurityError::AuthenticationFailed(
                        "device verifier does not match client public key".into(),
                    ));
                }
                Ok(HandshakeStep::Established(Session::Sec1(session)))
            }
        }
    }
}

/// AES-256-CTR channel with independent per-direction keystreams.
pub struct Sec1Session {
    enc: Aes256Ctr,
    dec: Aes256Ctr,
}

impl Sec1Session {
    pub(crate) fn new(key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Sec1Session {
            enc: Aes256Ctr::new(key.into(), iv.into()),
            dec: Aes256Ctr::new(key.into(), iv.into()),
        }
    }

    pub fn encrypt(&mut self, plaintext: &[u8]) -> Bytes {
        let mut buf = plaintext.to_vec();
        self.enc.apply_keystream(&mut buf);
        Bytes::from(buf)
    }

    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Bytes {
        let mut buf = ciphertext.to_vec();
        self.dec.apply_keystream(&mut buf);
        Bytes::from(buf)
    }
}
