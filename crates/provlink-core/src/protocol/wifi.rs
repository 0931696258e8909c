//! Wi-Fi scan, configuration and control payloads.
//!
//! All three endpoints (`prov-scan`, `prov-config`, `prov-ctrl`) speak
//! tagged JSON commands with a flat response carrying a [`RespStatus`]
//! plus command-specific fields.

use serde::{Deserialize, Serialize};

use super::RespStatus;

/// Scan page size over BLE; HTTP transports can take larger pages.
pub const BLE_SCAN_PAGE: u16 = 4;
pub const HTTP_SCAN_PAGE: u16 = 16;
/// Channels scanned per group during an active scan.
pub const SCAN_GROUP_CHANNELS: u8 = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ScanCommand {
    ScanStart {
        blocking: bool,
        passive: bool,
        group_channels: u8,
        period_ms: u16,
    },
    ScanStatus,
    ScanResult {
        start_index: u16,
        count: u16,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanResponse {
    pub status: RespStatus,
    #[serde(default)]
    pub scan_finished: bool,
    #[serde(default)]
    pub result_count: u16,
    #[serde(default)]
    pub entries: Vec<WifiNetwork>,
}

/// One access point seen by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiNetwork {
    pub ssid: String,
    pub bssid: String,
    pub channel: u8,
    pub rssi: i8,
    pub auth: WifiAuth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiAuth {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa3Psk,
    Wpa2Wpa3Psk,
}

impl WifiAuth {
    pub fn is_open(self) -> bool {
        matches!(self, WifiAuth::Open)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ConfigCommand {
    SetConfig { ssid: String, passphrase: String },
    ApplyConfig,
    GetStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigResponse {
    pub status: RespStatus,
    #[serde(default)]
    pub sta_state: Option<StaState>,
    #[serde(default)]
    pub fail_reason: Option<WifiFailReason>,
    #[serde(default)]
    pub ip: Option<String>,
}

/// Device station state reported while it joins the configured network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaState {
    Connected,
    Connecting,
    Disconnected,
    ConnectionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiFailReason {
    AuthError,
    NetworkNotFound,
}

impl std::fmt::Display for WifiFailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WifiFailReason::AuthError => f.write_str("incorrect passphrase"),
            WifiFailReason::NetworkNotFound => f.write_str("network not found"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum CtrlCommand {
    /// Reset the device's provisioning sub-state machine only. The
    /// established security session survives.
    Reset,
    /// Restart provisioning on an already-provisioned device.
    Reprov,
    /// Turn off challenge-response signing after association.
    ChalRespDisable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CtrlResponse {
    pub status: RespStatus,
}
