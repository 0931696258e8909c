//! User association and challenge-response payloads.

use serde::{Deserialize, Serialize};

use super::RespStatus;

/// Request on `cloud_user_assoc`: binds the node to a cloud user.
#[derive(Debug, Clone, Serialize)]
pub struct AssocRequest {
    pub user_id: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssocResponse {
    pub status: RespStatus,
    #[serde(default)]
    pub node_id: String,
}

/// Request on `chal_resp`: the cloud-issued challenge, base64.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeRequest {
    pub challenge: String,
}

/// Device-signed challenge, base64. The signature is opaque to the client;
/// the cloud verifies it.
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeResponse {
    pub status: RespStatus,
    #[serde(default)]
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assoc_request_shape() {
        let req = AssocRequest {
            user_id: "user-1".into(),
            secret_key: "s3cret".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"user_id":"user-1","secret_key":"s3cret"}"#);
    }

    #[test]
    fn test_assoc_response_node_id() {
        let resp: AssocResponse =
            serde_json::from_str(r#"{"status":"success","node_id":"XeRQn9"}"#).unwrap();
        assert!(resp.status.is_success());
        assert_eq!(resp.node_id, "XeRQn9");
    }

    #[test]
    fn test_challenge_round_fields() {
        let resp: ChallengeResponse =
            serde_json::from_str(r#"{"status":"success","response":"c2ln"}"#).unwrap();
        assert_eq!(resp.response, "c2ln");
    }
}
