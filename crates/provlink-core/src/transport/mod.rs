//! Byte-oriented transports.
//!
//! A [`Transport`] moves opaque endpoint payloads to the device and back;
//! chunking, encryption and payload semantics all live above it. The four
//! kinds cover BLE GATT, HTTP against the device's SoftAP, HTTP across a
//! shared network, and a serial console.

pub mod ble;
pub mod console;
pub mod http;

use bytes::Bytes;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Ble,
    SoftApHttp,
    NetworkHttp,
    Console,
}

impl TransportKind {
    /// On-network transports default to disabling challenge-response
    /// signing after association; direct transports keep it.
    pub fn is_on_network(self) -> bool {
        matches!(self, TransportKind::NetworkHttp)
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportKind::Ble => "ble",
            TransportKind::SoftApHttp => "softap",
            TransportKind::NetworkHttp => "network",
            TransportKind::Console => "console",
        };
        f.write_str(s)
    }
}

/// One request/response round to a named endpoint.
///
/// Implementations do not retry and do not interpret payloads; timeouts
/// and retries are the caller's business.
#[allow(async_fn_in_trait)]
pub trait Transport {
    fn kind(&self) -> TransportKind;

    /// Chunk payload budget, `None` when the transport moves whole
    /// payloads in one round.
    fn chunk_payload_limit(&self) -> Option<usize> {
        None
    }

    async fn request(&mut self, endpoint: &str, payload: &[u8]) -> Result<Bytes, TransportError>;

    /// Release underlying OS resources. Must be safe to call once on
    /// every exit path.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Runtime-selected transport.
pub enum AnyTransport {
    Ble(ble::BleTransport),
    Http(http::HttpTransport),
    Console(console::ConsoleTransport),
}

impl Transport for AnyTransport {
    fn kind(&self) -> TransportKind {
        match self {
            AnyTransport::Ble(t) => t.kind(),
            AnyTransport::Http(t) => t.kind(),
            AnyTransport::Console(t) => t.kind(),
        }
    }

    fn chunk_payload_limit(&self) -> Option<usize> {
        match self {
            AnyTransport::Ble(t) => t.chunk_payload_limit(),
            AnyTransport::Http(t) => t.chunk_payload_limit(),
            AnyTransport::Console(t) => t.chunk_payload_limit(),
        }
    }

    async fn request(&mut self, endpoint: &str, payload: &[u8]) -> Result<Bytes, TransportError> {
        match self {
            AnyTransport::Ble(t) => t.request(endpoint, payload).await,
            AnyTransport::Http(t) => t.request(endpoint, payload).await,
            AnyTransport::Console(t) => t.request(endpoint, payload).await,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self {
            AnyTransport::Ble(t) => t.close().await,
            AnyTransport::Http(t) => t.close().await,
            AnyTransport::Console(t) => t.close().await,
        }
    }
}
