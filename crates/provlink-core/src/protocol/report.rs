//! Device-signed parameter/config reports.
//!
//! The device produces `{"node_payload": {"data": ..., "timestamp": ...},
//! "signature": "..."}` entirely on its side. The client never verifies or
//! recomputes the signature; the exact bytes received are what gets POSTed
//! to the cloud proxy. Parsing here is validation and display only, the
//! forwarded body always comes from [`SignedReport::as_bytes`].

use bytes::Bytes;
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::ProtocolError;

#[derive(Debug, Clone)]
pub struct SignedReport {
    raw: Bytes,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct ReportView<'a> {
    #[serde(borrow)]
    node_payload: &'a RawValue,
    #[serde(borrow)]
    signature: &'a str,
}

#[derive(Debug, Deserialize)]
struct PayloadView<'a> {
    #[serde(borrow)]
    data: &'a RawValue,
    timestamp: i64,
}

impl SignedReport {
    /// Validate the device bytes as a well-formed signed report.
    pub fn from_bytes(raw: Bytes) -> Result<Self, ProtocolError> {
        let view: ReportView<'_> = serde_json::from_slice(&raw)?;
        if view.signature.is_empty() {
            return Err(ProtocolError::Decode("signed report without signature".into()));
        }
        let payload: PayloadView<'_> = serde_json::from_str(view.node_payload.get())?;
        let timestamp = payload.timestamp;
        Ok(SignedReport { raw, timestamp })
    }

    /// Exact device bytes, forwarded as-is to the proxy endpoint.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The inner `data` document, pretty for display.
    pub fn data_json(&self) -> Result<serde_json::Value, ProtocolError> {
        let view: ReportView<'_> = serde_json::from_slice(&self.raw)?;
        let payload: PayloadView<'_> = serde_json::from_str(view.node_payload.get())?;
        Ok(serde_json::from_str(payload.data.get())?)
    }
}
