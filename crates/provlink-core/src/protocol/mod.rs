//! Endpoint payload types and framing.
//!
//! Endpoints carry JSON documents except for the raw data endpoints, which
//! use a small binary request header ([`raw`]) and chunked responses
//! ([`chunk`]). Everything except `proto-ver` and `prov-session` passes
//! through the session cipher before hitting the transport.

pub mod assoc;
pub mod caps;
pub mod chunk;
pub mod raw;
pub mod report;
pub mod wifi;

use serde::{Deserialize, Serialize};

/// Wire-level endpoint names, identical on every transport.
pub mod endpoint {
    /// Unencrypted capability/version query.
    pub const PROTO_VER: &str = "proto-ver";
    /// Security handshake. Always sent in the clear.
    pub const PROV_SESSION: &str = "prov-session";
    /// Wi-Fi credential set/apply and status polling.
    pub const PROV_CONFIG: &str = "prov-config";
    /// Device-side Wi-Fi AP scan.
    pub const PROV_SCAN: &str = "prov-scan";
    /// Provisioning sub-state reset and capability control.
    pub const PROV_CTRL: &str = "prov-ctrl";
    /// User-to-node association.
    pub const CLOUD_USER_ASSOC: &str = "cloud_user_assoc";
    /// Challenge-response signing.
    pub const CHAL_RESP: &str = "chal_resp";
    /// Raw local-control data endpoints.
    pub const GET_PARAMS: &str = "get_params";
    pub const SET_PARAMS: &str = "set_params";
    pub const GET_CONFIG: &str = "get_config";
}

/// Status carried by every JSON command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RespStatus {
    Success,
    InvalidArgument,
    InvalidState,
    CryptoError,
    InternalError,
}

impl RespStatus {
    pub fn is_success(self) -> bool {
        matches!(self, RespStatus::Success)
    }
}

impl std::fmt::Display for RespStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RespStatus::Success => "success",
            RespStatus::InvalidArgument => "invalid_argument",
            RespStatus::InvalidState => "invalid_state",
            RespStatus::CryptoError => "crypto_error",
            RespStatus::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&RespStatus::InvalidArgument).unwrap();
        assert_eq!(json, "\"invalid_argument\"");
        let back: RespStatus = serde_json::from_str("\"success\"").unwrap();
        assert!(back.is_success());
    }
}
