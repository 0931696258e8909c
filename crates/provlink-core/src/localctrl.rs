//! Local control: parameter and config access on an already provisioned
//! node, plus forwarding of signed snapshots to the cloud proxy.
//!
//! The raw endpoints return either plain JSON (no timestamp in the request)
//! or a signed report envelope whose bytes must reach the cloud untouched.

use serde::Deserialize;
use serde_json::Value;

use crate::cloud::{CloudClient, ProxyAck, ProxyKind};
use crate::connection::NodeConnection;
use crate::error::{CoreError, ProtocolError, Result};
use crate::protocol::endpoint;
use crate::protocol::raw::RawDataKind;
use crate::protocol::report::SignedReport;
use crate::protocol::RespStatus;
use crate::transport::Transport;

#[derive(Debug, Deserialize)]
struct SetParamsAck {
    status: RespStatus,
}

/// Current parameter values as plain JSON.
pub async fn get_params<T: Transport>(conn: &mut NodeConnection<T>) -> Result<Value> {
    let raw = conn.read_raw(RawDataKind::Params, None).await?;
    serde_json::from_slice(&raw).map_err(|e| CoreError::Protocol(ProtocolError::Json(e)))
}

/// Node configuration (devices, services, attributes) as plain JSON.
pub async fn get_config<T: Transport>(conn: &mut NodeConnection<T>) -> Result<Value> {
    let raw = conn.read_raw(RawDataKind::Config, None).await?;
    serde_json::from_slice(&raw).map_err(|e| CoreError::Protocol(ProtocolError::Json(e)))
}

/// Snapshot signed by the device against `timestamp`. The returned report
/// keeps the device's exact bytes.
pub async fn get_signed_report<T: Transport>(
    conn: &mut NodeConnection<T>,
    kind: RawDataKind,
    timestamp: i64,
) -> Result<SignedReport> {
    let raw = conn.read_raw(kind, Some(timestamp)).await?;
    SignedReport::from_bytes(raw).map_err(CoreError::Protocol)
}

pub async fn set_params<T: Transport>(
    conn: &mut NodeConnection<T>,
    params: &Value,
) -> Result<()> {
    let ack: SetParamsAck = conn.exchange_json(endpoint::SET_PARAMS, params).await?;
    if !ack.status.is_success() {
        return Err(CoreError::Protocol(ProtocolError::Rejected(format!(
            "set params rejected: {}",
            ack.status
        ))));
    }
    Ok(())
}

/// Destination for signed reports. A seam over [`CloudClient`] so report
/// forwarding stays testable offline.
#[allow(async_fn_in_trait)]
pub trait ReportSink {
    async fn forward(&self, node_id: &str, kind: ProxyKind, body: &[u8])
        -> Result<ProxyAck>;
}

impl ReportSink for CloudClient {
    async fn forward(
        &self,
        node_id: &str,
        kind: ProxyKind,
        body: &[u8],
    ) -> Result<ProxyAck> {
        Ok(self.forward_report(node_id, kind, body).await?)
    }
}

fn raw_kind(kind: ProxyKind) -> RawDataKind {
    match kind {
        ProxyKind::Config => RawDataKind::Config,
        ProxyKind::Params | ProxyKind::InitParams => RawDataKind::Params,
    }
}

/// A signed snapshot plus the outcome of forwarding it. A failed forward
/// does not lose the report; the caller still gets the local read.
#[derive(Debug)]
pub struct ProxyOutcome {
    pub report: SignedReport,
    pub ack: Result<ProxyAck>,
}

/// Pulls a signed snapshot from the node and forwards it to the cloud
/// proxy byte for byte.
pub async fn proxy_report<T: Transport, S: ReportSink>(
    conn: &mut NodeConnection<T>,
    sink: &S,
    node_id: &str,
    kind: ProxyKind,
    timestamp: i64,
) -> Result<ProxyOutcome> {
    let report = get_signed_report(conn, raw_kind(kind), timestamp).await?;
    let ack = sink.forward(node_id, kind, report.as_bytes()).await;
    Ok(ProxyOutcome { report, ack })
}
