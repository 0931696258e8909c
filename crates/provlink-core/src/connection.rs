//! One logical connection to a node.
//!
//! A [`NodeConnection`] owns the transport, the security session and the
//! per-endpoint reassembly state. All endpoint traffic funnels through
//! [`NodeConnection::exchange`], which applies encrypt-then-chunk on MTU
//! limited transports; the reassembly invariant (no interleaved requests on
//! an endpoint with an incomplete buffer) holds because each exchange runs
//! the full pull loop before returning.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CoreError, ProtocolError, Result, SecurityError, TransportError};
use crate::protocol::caps::VersionInfo;
use crate::protocol::chunk::{Chunk, Reassembler};
use crate::protocol::endpoint;
use crate::protocol::raw::{RawDataKind, RawDataRequest};
use crate::session::{
    Handshake, HandshakeStep, SecurityParams, SecurityScheme, Session,
};
use crate::transport::Transport;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Inputs for scheme selection and authentication.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Pin the security version instead of trusting the device's
    /// advertised capabilities.
    pub sec_ver: Option<u8>,
    pub pop: Option<String>,
    pub sec2_username: Option<String>,
    pub sec2_password: Option<String>,
}

pub struct NodeConnection<T: Transport> {
    transport: T,
    session: Option<Session>,
    caps: Option<VersionInfo>,
    reassembly: HashMap<String, Reassembler>,
    request_timeout: Duration,
}

impl<T: Transport> NodeConnection<T> {
    pub fn new(transport: T) -> Self {
        NodeConnection {
            transport,
            session: None,
            caps: None,
            reassembly: HashMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_established(&self) -> bool {
        self.session.is_some()
    }

    pub fn scheme(&self) -> Option<SecurityScheme> {
        self.session.as_ref().map(Session::scheme)
    }

    /// Capability info from `proto-ver`, queried once and cached.
    pub async fn capabilities(&mut self) -> Result<&VersionInfo> {
        if self.caps.is_none() {
            let raw = self.exchange_clear(endpoint::PROTO_VER, b"{}").await?;
            let info: VersionInfo =
                serde_json::from_slice(&raw).map_err(ProtocolError::Json)?;
            self.caps = Some(info);
        }
        self.caps
            .as_ref()
            .ok_or_else(|| CoreError::Other("capability cache unexpectedly empty".into()))
    }

    /// True if the device advertises `name` in either capability list.
    pub async fn has_capability(&mut self, name: &str) -> Result<bool> {
        Ok(self.capabilities().await?.has_capability(name))
    }

    /// Probe capabilities, pick a scheme and run the handshake to an
    /// established session. Any authentication failure discards the
    /// handshake state; there is no plaintext fallback.
    pub async fn establish(&mut self, options: &SessionOptions) -> Result<SecurityScheme> {
        let caps = self.capabilities().await?.clone();
        let scheme = SecurityScheme::from_version(caps.detect_sec_ver(options.sec_ver))
            .map_err(CoreError::Security)?;

        let params = match scheme {
            SecurityScheme::Sec0 => SecurityParams::Sec0,
            SecurityScheme::Sec1 => {
                let pop = if caps.pop_optional() {
                    None
                } else {
                    Some(
                        options
                            .pop
                            .clone()
                            .ok_or(CoreError::Security(SecurityError::PopRequired))?,
                    )
                };
                SecurityParams::Sec1 { pop }
            }
            SecurityScheme::Sec2 => {
                let username = options
                    .sec2_username
                    .clone()
                    .ok_or(CoreError::Security(SecurityError::CredentialsRequired))?;
                let password = options
                    .sec2_password
                    .clone()
                    .ok_or(CoreError::Security(SecurityError::CredentialsRequired))?;
                SecurityParams::Sec2 { username, password }
            }
        };

        let (mut handshake, mut request) =
            Handshake::start(params).map_err(CoreError::Security)?;
        loop {
            let response = self
                .exchange_clear(endpoint::PROV_SESSION, &request)
                .await?;
            match handshake.advance(&response).map_err(CoreError::Security)? {
                HandshakeStep::Continue {
                    handshake: next,
                    request: req,
                } => {
                    handshake = next;
                    request = req;
                }
                HandshakeStep::Established(session) => {
                    self.session = Some(session);
                    return Ok(scheme);
                }
            }
        }
    }

    /// Encrypted request/response on a named endpoint.
    pub async fn exchange(&mut self, ep: &str, payload: &[u8]) -> Result<Bytes> {
        let session = self.session.as_mut().ok_or(CoreError::Security(
            SecurityError::HandshakeState("session not established".into()),
        ))?;
        let ciphertext = session.encrypt(payload).map_err(CoreError::Security)?;
        let raw = Self::exchange_clear_inner(
            &mut self.transport,
            &mut self.reassembly,
            self.request_timeout,
            ep,
            &ciphertext,
        )
        .await?;
        let session = self.session.as_mut().ok_or(CoreError::Security(
            SecurityError::HandshakeState("session not established".into()),
        ))?;
        session.decrypt(&raw).map_err(CoreError::Security)
    }

    /// Serialize a JSON command, exchange it encrypted, parse the reply.
    pub async fn exchange_json<Req, Resp>(&mut self, ep: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request).map_err(ProtocolError::Json)?;
        let raw = self.exchange(ep, &body).await?;
        Ok(serde_json::from_slice(&raw).map_err(ProtocolError::Json)?)
    }

    /// Clear-text exchange; only `proto-ver` and `prov-session` belong here.
    pub async fn exchange_clear(&mut self, ep: &str, payload: &[u8]) -> Result<Bytes> {
        Self::exchange_clear_inner(
            &mut self.transport,
            &mut self.reassembly,
            self.request_timeout,
            ep,
            payload,
        )
        .await
    }

    async fn exchange_clear_inner(
        transport: &mut T,
        reassembly: &mut HashMap<String, Reassembler>,
        request_timeout: Duration,
        ep: &str,
        payload: &[u8],
    ) -> Result<Bytes> {
        let Some(limit) = transport.chunk_payload_limit() else {
            let raw = Self::timed_request(transport, request_timeout, ep, payload).await?;
            return Ok(raw);
        };

        let chunks = crate::protocol::chunk::split(payload, limit);
        reassembly.remove(ep);
        let mut complete = None;

        for chunk in &chunks {
            let raw =
                Self::timed_request(transport, request_timeout, ep, &chunk.encode()).await?;
            let response = Self::decode_chunk(reassembly, ep, raw)?;
            if !response.is_pull() {
                complete = Self::push_chunk(reassembly, ep, response)?;
            }
        }
        while complete.is_none() {
            let raw =
                Self::timed_request(transport, request_timeout, ep, &Chunk::pull().encode())
                    .await?;
            let response = Self::decode_chunk(reassembly, ep, raw)?;
            if response.is_pull() {
                reassembly.remove(ep);
                return Err(CoreError::Protocol(ProtocolError::Reassembly(
                    "device acknowledged a pull without data".into(),
                )));
            }
            complete = Self::push_chunk(reassembly, ep, response)?;
        }
        complete.ok_or_else(|| {
            CoreError::Protocol(ProtocolError::Reassembly("empty response".into()))
        })
    }

    fn decode_chunk(
        reassembly: &mut HashMap<String, Reassembler>,
        ep: &str,
        raw: Bytes,
    ) -> Result<Chunk> {
        match Chunk::decode(raw) {
            Ok(chunk) => Ok(chunk),
            Err(e) => {
                reassembly.remove(ep);
                Err(CoreError::Protocol(e))
            }
        }
    }

    /// Feed one chunk into the endpoint's buffer; the buffer is discarded
    /// on completion and on any reassembly failure.
    fn push_chunk(
        reassembly: &mut HashMap<String, Reassembler>,
        ep: &str,
        chunk: Chunk,
    ) -> Result<Option<Bytes>> {
        let reasm = reassembly.entry(ep.to_string()).or_default();
        match reasm.push(chunk) {
            Ok(done) => {
                if done.is_some() {
                    reassembly.remove(ep);
                }
                Ok(done)
            }
            Err(e) => {
                reassembly.remove(ep);
                Err(CoreError::Protocol(e))
            }
        }
    }

    async fn timed_request(
        transport: &mut T,
        request_timeout: Duration,
        ep: &str,
        payload: &[u8],
    ) -> Result<Bytes> {
        match tokio::time::timeout(request_timeout, transport.request(ep, payload)).await {
            Ok(res) => Ok(res.map_err(CoreError::Transport)?),
            Err(_) => Err(CoreError::Transport(TransportError::Timeout {
                endpoint: ep.to_string(),
            })),
        }
    }

    /// Chunk-pulled read of a raw data endpoint. With `timestamp` set the
    /// device answers with a signed report instead of bare data.
    pub async fn read_raw(
        &mut self,
        kind: RawDataKind,
        timestamp: Option<i64>,
    ) -> Result<Bytes> {
        let ep = match kind {
            RawDataKind::Params => endpoint::GET_PARAMS,
            RawDataKind::Config => endpoint::GET_CONFIG,
        };
        let mut reasm = Reassembler::new();
        let mut seq = 0u32;
        loop {
            let request = if seq == 0 {
                RawDataRequest::first(kind, timestamp)
            } else {
                RawDataRequest::next(kind, seq)
            };
            let session = self.session.as_mut().ok_or(CoreError::Security(
                SecurityError::HandshakeState("session not established".into()),
            ))?;
            let body = session.encrypt(&request.encode()).map_err(CoreError::Security)?;
            let raw =
                Self::timed_request(&mut self.transport, self.request_timeout, ep, &body)
                    .await?;
            let chunk = Chunk::decode(raw).map_err(CoreError::Protocol)?;
            if let Some(ciphertext) = reasm.push(chunk).map_err(CoreError::Protocol)? {
                let session = self.session.as_mut().ok_or(CoreError::Security(
                    SecurityError::HandshakeState("session not established".into()),
                ))?;
                return session.decrypt(&ciphertext).map_err(CoreError::Security);
            }
            seq += 1;
        }
    }

    /// Tear down transport resources. The session dies with the value.
    pub async fn close(mut self) -> Result<()> {
        self.reassembly.clear();
        self.session = None;
        self.transport.close().await.map_err(CoreError::Transport)
    }
}
