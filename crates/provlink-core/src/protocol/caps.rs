//! Capability and version info from the unencrypted `proto-ver` endpoint.

use serde::{Deserialize, Serialize};

/// Capability advertised under `prov.cap` or `extra.cap`.
pub mod capability {
    /// Device runs without a security scheme (Sec0).
    pub const NO_SEC: &str = "no_sec";
    /// Sec1 device that does not require a Proof of Possession.
    pub const NO_POP: &str = "no_pop";
    /// Device can scan for Wi-Fi APs on behalf of the client.
    pub const WIFI_SCAN: &str = "wifi_scan";
    /// Device signs challenges for cloud association.
    pub const CH_RESP: &str = "ch_resp";
    /// Device serves the raw local-control endpoints.
    pub const LOCAL_CTRL: &str = "local_ctrl";
}

/// Response of the `proto-ver` query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub prov: ProvInfo,
    #[serde(default)]
    pub extra: ExtraInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvInfo {
    #[serde(default)]
    pub ver: String,
    #[serde(default)]
    pub sec_ver: u8,
    #[serde(default)]
    pub sec_patch_ver: u8,
    #[serde(default)]
    pub cap: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraInfo {
    #[serde(default)]
    pub cap: Vec<String>,
}

impl VersionInfo {
    /// True if either capability list advertises `name`.
    pub fn has_capability(&self, name: &str) -> bool {
        self.prov.cap.iter().any(|c| c == name) || self.extra.cap.iter().any(|c| c == name)
    }

    /// Security version to use: an explicit pin always wins, then the
    /// device's advertised `sec_ver`, with `no_sec` forcing scheme 0.
    pub fn detect_sec_ver(&self, pinned: Option<u8>) -> u8 {
        if let Some(v) = pinned {
            return v;
        }
        if self.has_capability(capability::NO_SEC) {
            return 0;
        }
        self.prov.sec_ver
    }

    /// True if a Sec1 device waives the Proof of Possession.
    pub fn pop_optional(&self) -> bool {
        self.has_capability(capability::NO_POP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(json: &str) -> VersionInfo {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_full_response() {
        let v = info(
            r#"{"prov":{"ver":"v1.1","sec_ver":1,"sec_patch_ver":0,"cap":["wifi_scan"]},
                "extra":{"cap":["ch_resp","local_ctrl"]}}"#,
        );
        assert_eq!(v.prov.ver, "v1.1");
        assert!(v.has_capability(capability::WIFI_SCAN));
        assert!(v.has_capability(capability::CH_RESP));
        assert!(!v.has_capability(capability::NO_POP));
    }

    #[test]
    fn test_auto_detect_prefers_no_sec() {
        let v = info(r#"{"prov":{"ver":"v1.0","sec_ver":1,"cap":["no_sec"]}}"#);
        assert_eq!(v.detect_sec_ver(None), 0);
    }

    #[test]
    fn test_auto_detect_uses_advertised_version() {
        let v = info(r#"{"prov":{"ver":"v1.1","sec_ver":2,"sec_patch_ver":1,"cap":[]}}"#);
        assert_eq!(v.detect_sec_ver(None), 2);
    }

    #[test]
    fn test_pinned_version_wins() {
        let v = info(r#"{"prov":{"ver":"v1.0","sec_ver":1,"cap":["no_sec"]}}"#);
        assert_eq!(v.detect_sec_ver(Some(1)), 1);
    }

    #[test]
    fn test_missing_extra_defaults_empty() {
        let v = info(r#"{"prov":{"ver":"v1.0","sec_ver":0,"cap":[]}}"#);
        assert!(v.extra.cap.is_empty());
    }
}
