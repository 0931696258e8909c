//! Security schemes and the `prov-session` handshake.
//!
//! A [`Handshake`] drives the clear-text exchange on the handshake endpoint
//! until it yields a [`Session`], the symmetric encrypt/decrypt capability
//! every other endpoint payload passes through. Scheme-specific key
//! material stays private to the per-scheme modules; callers only see the
//! tagged variants.
//!
//! Handshake steps consume the state, so a failed step cannot leave a
//! half-established session behind. Authentication failures are final:
//! there is no downgrade path to a weaker scheme or to plaintext.

pub mod sec0;
pub mod sec1;
pub mod sec2;

use bytes::Bytes;

use crate::error::SecurityError;

/// The three mutually exclusive security schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityScheme {
    /// No encryption; for trusted or test deployments only.
    Sec0,
    /// X25519 ECDH + AES-256-CTR, authenticated by a Proof of Possession.
    Sec1,
    /// SRP6a (3072-bit group, SHA-512) + AES-256-GCM.
    Sec2,
}

impl SecurityScheme {
    pub fn from_version(v: u8) -> Result<Self, SecurityError> {
        match v {
            0 => Ok(SecurityScheme::Sec0),
            1 => Ok(SecurityScheme::Sec1),
            2 => Ok(SecurityScheme::Sec2),
            other => Err(SecurityError::HandshakeState(format!(
                "unsupported security version {other}"
            ))),
        }
    }

    pub fn version(self) -> u8 {
        match self {
            SecurityScheme::Sec0 => 0,
            SecurityScheme::Sec1 => 1,
            SecurityScheme::Sec2 => 2,
        }
    }
}

impl std::fmt::Display for SecurityScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sec{}", self.version())
    }
}

/// Per-scheme inputs for a handshake.
#[derive(Debug, Clone)]
pub enum SecurityParams {
    Sec0,
    Sec1 {
        /// `None` only when the device advertises `no_pop`.
        pop: Option<String>,
    },
    Sec2 {
        username: String,
        password: String,
    },
}

impl SecurityParams {
    pub fn scheme(&self) -> SecurityScheme {
        match self {
            SecurityParams::Sec0 => SecurityScheme::Sec0,
            SecurityParams::Sec1 { .. } => SecurityScheme::Sec1,
            SecurityParams::Sec2 { .. } => SecurityScheme::Sec2,
        }
    }
}

/// In-flight handshake on the `prov-session` endpoint.
pub enum Handshake {
    Sec0(sec0::Sec0Handshake),
    Sec1(sec1::Sec1Handshake),
    Sec2(sec2::Sec2Handshake),
}

/// Outcome of feeding one device response into a handshake.
pub enum HandshakeStep {
    /// Send `request` on `prov-session` and feed the response back in.
    Continue {
        handshake: Handshake,
        request: Bytes,
    },
    Established(Session),
}

impl Handshake {
    /// Start a handshake, returning the state plus the first clear-text
    /// request to send on `prov-session`.
    pub fn start(params: SecurityParams) -> Result<(Handshake, Bytes), SecurityError> {
        match params {
            SecurityParams::Sec0 => {
                let (hs, req) = sec0::Sec0Handshake::start();
                Ok((Handshake::Sec0(hs), req))
            }
            SecurityParams::Sec1 { pop } => {
                let (hs, req) = sec1::Sec1Handshake::start(pop)?;
                Ok((Handshake::Sec1(hs), req))
            }
            SecurityParams::Sec2 { username, password } => {
                let (hs, req) = sec2::Sec2Handshake::start(username, password)?;
                Ok((Handshake::Sec2(hs), req))
            }
        }
    }

    /// Consume one device response and either produce the next request or
    /// finish with an established session.
    pub fn advance(self, response: &[u8]) -> Result<HandshakeStep, SecurityError> {
        match self {
            Handshake::Sec0(hs) => hs.advance(response),
            Handshake::Sec1(hs) => hs.advance(response),
            Handshake::Sec2(hs) => hs.advance(response),
        }
    }
}

/// Established symmetric channel. One per connection, never shared.
pub enum Session {
    Sec0(sec0::Sec0Session),
    Sec1(sec1::Sec1Session),
    Sec2(sec2::Sec2Session),
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("scheme", &self.scheme()).finish()
    }
}

impl Session {
    pub fn scheme(&self) -> SecurityScheme {
        match self {
            Session::Sec0(_) => SecurityScheme::Sec0,
            Session::Sec1(_) => SecurityScheme::Sec1,
            Session::Sec2(_) => SecurityScheme::Sec2,
        }
    }

    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Bytes, SecurityError> {
        match self {
            Session::Sec0(s) => Ok(s.encrypt(plaintext)),
            Session::Sec1(s) => Ok(s.encrypt(plaintext)),
            Session::Sec2(s) => s.encrypt(plaintext),
        }
    }

    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Bytes, SecurityError> {
        match self {
            Session::Sec0(s) => Ok(s.decrypt(ciphertext)),
            Session::Sec1(s) => Ok(s.decrypt(ciphertext)),
            Session::Sec2(s) => s.decrypt(ciphertext),
        }
    }
}
