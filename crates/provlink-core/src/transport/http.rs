//! HTTP transport: SoftAP or on-network.
//!
//! Endpoint requests become `POST http://host:port/<endpoint>` with the
//! payload as the body. The device pins a session cookie on the first
//! response; the cookie store keeps subsequent requests on the same
//! device-side session, which the security handshake depends on.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::{Transport, TransportKind};
use crate::error::TransportError;

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    kind: TransportKind,
}

impl HttpTransport {
    /// `kind` must be `SoftApHttp` or `NetworkHttp`.
    pub fn new(host: &str, port: u16, kind: TransportKind, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::new(reqwest::cookie::Jar::default()))
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        Ok(HttpTransport {
            client,
            base_url: format!("http://{host}:{port}"),
            kind,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Plain JSON GET for the property-based local-control path. Not
    /// framed or encrypted; HTTP-only devices serve it directly.
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, TransportError> {
        let resp = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .send()
            .await
            .map_err(map_reqwest)?;
        if !resp.status().is_success() {
            return Err(TransportError::HttpStatus(resp.status().as_u16()));
        }
        resp.json().await.map_err(map_reqwest)
    }

    /// Plain JSON POST for the property-based local-control path.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let resp = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(map_reqwest)?;
        if !resp.status().is_success() {
            return Err(TransportError::HttpStatus(resp.status().as_u16()));
        }
        resp.json().await.map_err(map_reqwest)
    }
}

fn map_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            endpoint: e
                .url()
                .map(|u| u.path().trim_start_matches('/').to_string())
                .unwrap_or_default(),
        }
    } else {
        TransportError::Unreachable(e.to_string())
    }
}

impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn request(&mut self, endpoint: &str, payload: &[u8]) -> Result<Bytes, TransportError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(map_reqwest)?;
        if !resp.status().is_success() {
            return Err(TransportError::HttpStatus(resp.status().as_u16()));
        }
        resp.bytes().await.map_err(map_reqwest)
    }
}
