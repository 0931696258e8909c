//! Cloud collaborator: challenge-response mapping and signed-report
//! forwarding.
//!
//! Deliberately narrow. Node and user CRUD live outside this crate; the
//! provisioning and local-control flows only ever need these three calls.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::error::CloudError;
use crate::storage::Profile;

const CLOUD_TIMEOUT: Duration = Duration::from_secs(30);

/// Proxy endpoint selector for forwarded reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Params,
    InitParams,
    Config,
}

impl ProxyKind {
    pub fn path_segment(self) -> &'static str {
        match self {
            ProxyKind::Params => "params",
            ProxyKind::InitParams => "initparams",
            ProxyKind::Config => "config",
        }
    }
}

/// Challenge issued by `mapping/initiate`.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingChallenge {
    pub challenge: String,
    pub request_id: String,
}

/// `{status, description}` ack returned by the proxy endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyAck {
    pub status: String,
    #[serde(default)]
    pub description: String,
}

pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    pub user_id: String,
}

impl CloudClient {
    pub fn from_profile(profile: &Profile) -> Result<Self, CloudError> {
        let http = reqwest::Client::builder()
            .timeout(CLOUD_TIMEOUT)
            .build()
            .map_err(|e| CloudError::Http(e.to_string()))?;
        Ok(CloudClient {
            http,
            base_url: profile.base_url.trim_end_matches('/').to_string(),
            access_token: profile.access_token.clone(),
            user_id: profile.user_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Ask the cloud for a challenge binding `node_id` to this user.
    pub async fn initiate_mapping(&self, node_id: &str) -> Result<MappingChallenge, CloudError> {
        let resp = self
            .http
            .post(self.url("user/nodes/mapping/initiate"))
            .header("Authorization", &self.access_token)
            .json(&json!({ "node_id": node_id }))
            .send()
            .await
            .map_err(|e| CloudError::MappingFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CloudError::MappingFailed(format!(
                "initiate returned HTTP {}",
                resp.status().as_u16()
            )));
        }
        resp.json()
            .await
            .map_err(|e| CloudError::MappingFailed(e.to_string()))
    }

    /// Submit the device-signed challenge response (hex) for verification.
    pub async fn verify_mapping(
        &self,
        request_id: &str,
        node_id: &str,
        challenge_response: &str,
    ) -> Result<(), CloudError> {
        let resp = self
            .http
            .post(self.url("user/nodes/mapping/verify"))
            .header("Authorization", &self.access_token)
            .json(&json!({
                "request_id": request_id,
                "node_id": node_id,
                "challenge_response": challenge_response,
            }))
            .send()
            .await
            .map_err(|e| CloudError::MappingFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CloudError::MappingFailed(format!(
                "verify returned HTTP {}",
                resp.status().as_u16()
            )));
        }
        Ok(())
    }

    /// Forward a device-signed report. `body` is the exact byte sequence
    /// the device produced; it must not be re-serialized on the way out.
    pub async fn forward_report(
        &self,
        node_id: &str,
        kind: ProxyKind,
        body: &[u8],
    ) -> Result<ProxyAck, CloudError> {
        let url = self.url(&format!(
            "user/nodes/{}/proxy/{}",
            node_id,
            kind.path_segment()
        ));
        let resp = self
            .http
            .post(url)
            .header("Authorization", &self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| CloudError::ProxyReportFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CloudError::ProxyReportFailed(format!(
                "proxy returned HTTP {}",
                resp.status().as_u16()
            )));
        }
        resp.json()
            .await
            .map_err(|e| CloudError::ProxyReportFailed(e.to_string()))
    }
}
