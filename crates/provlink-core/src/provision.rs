//! Provisioning orchestrator.
//!
//! Drives one run of: handshake, association, optional Wi-Fi scan,
//! credential configuration and verification. Wi-Fi failures inside
//! configuration/verification retry on the same established session after a
//! `prov-ctrl` reset; the handshake is never re-run. Handshake and
//! association failures are terminal.

use std::time::Duration;

use data_encoding::{BASE64, HEXLOWER};

use crate::cloud::{CloudClient, MappingChallenge};
use crate::connection::{NodeConnection, SessionOptions};
use crate::error::{CloudError, CoreError, ProtocolError, Result};
use crate::protocol::assoc::{AssocRequest, AssocResponse, ChallengeRequest, ChallengeResponse};
use crate::protocol::caps::capability;
use crate::protocol::endpoint;
use crate::protocol::wifi::{
    ConfigCommand, ConfigResponse, CtrlCommand, CtrlResponse, ScanCommand, ScanResponse,
    StaState, WifiNetwork, BLE_SCAN_PAGE, HTTP_SCAN_PAGE, SCAN_GROUP_CHANNELS,
};
use crate::transport::Transport;

/// Overall attempts at the Wi-Fi steps, including the first one.
const MAX_WIFI_ATTEMPTS: u32 = 3;
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);
const STATUS_POLL_LIMIT: u32 = 30;
const SCAN_PERIOD_MS: u16 = 120;

/// Orchestrator state, surfaced to the caller through the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionState {
    Discovering,
    Handshaking,
    Associating,
    ScanningWifi,
    ConfiguringWifi,
    Verifying,
    Done,
    Failed(String),
}

impl std::fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionState::Discovering => f.write_str("discovering"),
            ProvisionState::Handshaking => f.write_str("handshaking"),
            ProvisionState::Associating => f.write_str("associating"),
            ProvisionState::ScanningWifi => f.write_str("scanning wifi"),
            ProvisionState::ConfiguringWifi => f.write_str("configuring wifi"),
            ProvisionState::Verifying => f.write_str("verifying"),
            ProvisionState::Done => f.write_str("done"),
            ProvisionState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Cloud side of challenge-response association. A seam so the
/// orchestrator never talks HTTP directly.
#[allow(async_fn_in_trait)]
pub trait MappingService {
    async fn initiate(&self, node_id: &str) -> Result<MappingChallenge>;
    async fn verify(&self, request_id: &str, node_id: &str, response_hex: &str) -> Result<()>;
}

impl MappingService for CloudClient {
    async fn initiate(&self, node_id: &str) -> Result<MappingChallenge> {
        Ok(self.initiate_mapping(node_id).await?)
    }

    async fn verify(&self, request_id: &str, node_id: &str, response_hex: &str) -> Result<()> {
        Ok(self.verify_mapping(request_id, node_id, response_hex).await?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionConfig {
    pub session: SessionOptions,
    pub user_id: String,
    pub secret_key: String,
    pub ssid: Option<String>,
    pub passphrase: Option<String>,
    pub no_wifi: bool,
    pub no_retry: bool,
    /// `None`: follow the transport default (on-network disables, direct
    /// transports keep).
    pub disable_chal_resp: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionOutcome {
    pub node_id: String,
    pub ip: Option<String>,
}

enum WifiAttempt {
    Connected(Option<String>),
    Failed(String),
}

/// Picks credentials from a scan list; the CLI plugs in an interactive
/// prompt, tests a canned closure.
pub type CredentialSelector<'a> = &'a mut dyn FnMut(&[WifiNetwork]) -> Result<(String, String)>;

pub struct Provisioner<'a, T: Transport, M: MappingService> {
    conn: &'a mut NodeConnection<T>,
    mapping: Option<&'a M>,
    config: ProvisionConfig,
}

impl<'a, T: Transport, M: MappingService> Provisioner<'a, T, M> {
    pub fn new(
        conn: &'a mut NodeConnection<T>,
        mapping: Option<&'a M>,
        config: ProvisionConfig,
    ) -> Self {
        Provisioner {
            conn,
            mapping,
            config,
        }
    }

    /// Run to `Done` or the first terminal failure. State transitions are
    /// reported through `observe`; on error the last reported state is
    /// `Failed` with the reason the caller should surface verbatim.
    pub async fn run(
        mut self,
        mut selector: Option<CredentialSelector<'_>>,
        observe: &mut dyn FnMut(&ProvisionState),
    ) -> Result<ProvisionOutcome> {
        match self.drive(&mut selector, observe).await {
            Ok(outcome) => {
                observe(&ProvisionState::Done);
                Ok(outcome)
            }
            Err(e) => {
                observe(&ProvisionState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        selector: &mut Option<CredentialSelector<'_>>,
        observe: &mut dyn FnMut(&ProvisionState),
    ) -> Result<ProvisionOutcome> {
        observe(&ProvisionState::Handshaking);
        self.conn.establish(&self.config.session).await?;

        observe(&ProvisionState::Associating);
        if self.config.no_wifi {
            let node_id = self.associate_via_challenge().await?;
            self.apply_chal_resp_policy().await?;
            return Ok(ProvisionOutcome { node_id, ip: None });
        }
        let node_id = self.associate_with_secret().await?;

        let (ssid, passphrase) = if let Some(ssid) = self.config.ssid.clone() {
            (ssid, self.config.passphrase.clone().unwrap_or_default())
        } else {
            observe(&ProvisionState::ScanningWifi);
            let networks = self.scan_networks().await?;
            let selector = selector.as_mut().ok_or_else(|| {
                CoreError::Other("no SSID given and no way to choose one".into())
            })?;
            selector(&networks)?
        };

        let mut attempt = 1u32;
        let ip = loop {
            observe(&ProvisionState::ConfiguringWifi);
            // A device rejection anywhere in the config or verify steps is
            // retryable; only transport/security errors stay terminal.
            let reason = match self.send_wifi_config(&ssid, &passphrase).await? {
                Some(reason) => reason,
                None => {
                    observe(&ProvisionState::Verifying);
                    match self.verify_wifi().await? {
                        WifiAttempt::Connected(ip) => break ip,
                        WifiAttempt::Failed(reason) => reason,
                    }
                }
            };
            if self.config.no_retry || attempt >= MAX_WIFI_ATTEMPTS {
                return Err(CoreError::Protocol(ProtocolError::Rejected(reason)));
            }
            attempt += 1;
            // Resets only the device's provisioning sub-state; the
            // security session stays up for the retry.
            self.reset_device().await?;
        };

        Ok(ProvisionOutcome { node_id, ip })
    }

    async fn associate_with_secret(&mut self) -> Result<String> {
        let req = AssocRequest {
            user_id: self.config.user_id.clone(),
            secret_key: self.config.secret_key.clone(),
        };
        let resp: AssocResponse = self
            .conn
            .exchange_json(endpoint::CLOUD_USER_ASSOC, &req)
            .await?;
        if !resp.status.is_success() {
            return Err(CoreError::Protocol(ProtocolError::Rejected(format!(
                "association rejected: {}",
                resp.status
            ))));
        }
        Ok(resp.node_id)
    }

    /// No-Wi-Fi association: cloud challenge, device signature, cloud
    /// verification.
    async fn associate_via_challenge(&mut self) -> Result<String> {
        if !self.conn.has_capability(capability::CH_RESP).await? {
            return Err(CoreError::Protocol(ProtocolError::CapabilityMissing(
                capability::CH_RESP.to_string(),
            )));
        }
        let mapping = self.mapping.ok_or(CoreError::Cloud(CloudError::NoProfile))?;

        // The device's node id comes from discovery or from config, but the
        // association endpoint also reports it; ask the device first so the
        // mapping is bound to what the hardware claims.
        let node_id = self.associate_with_secret().await?;

        let challenge = mapping.initiate(&node_id).await?;
        let req = ChallengeRequest {
            challenge: challenge.challenge.clone(),
        };
        let resp: ChallengeResponse =
            self.conn.exchange_json(endpoint::CHAL_RESP, &req).await?;
        if !resp.status.is_success() {
            return Err(CoreError::Protocol(ProtocolError::Rejected(format!(
                "challenge signing rejected: {}",
                resp.status
            ))));
        }
        let signature = BASE64
            .decode(resp.response.as_bytes())
            .map_err(|e| CoreError::Protocol(ProtocolError::Decode(e.to_string())))?;
        mapping
            .verify(&challenge.request_id, &node_id, &HEXLOWER.encode(&signature))
            .await?;
        Ok(node_id)
    }

    async fn apply_chal_resp_policy(&mut self) -> Result<()> {
        let default_disable = self.conn.transport().kind().is_on_network();
        let disable = self.config.disable_chal_resp.unwrap_or(default_disable);
        if !disable {
            return Ok(());
        }
        let resp: CtrlResponse = self
            .conn
            .exchange_json(endpoint::PROV_CTRL, &CtrlCommand::ChalRespDisable)
            .await?;
        if !resp.status.is_success() {
            return Err(CoreError::Protocol(ProtocolError::Rejected(format!(
                "challenge-response disable rejected: {}",
                resp.status
            ))));
        }
        Ok(())
    }

    async fn scan_networks(&mut self) -> Result<Vec<WifiNetwork>> {
        if !self.conn.has_capability(capability::WIFI_SCAN).await? {
            return Err(CoreError::Protocol(ProtocolError::CapabilityMissing(
                capability::WIFI_SCAN.to_string(),
            )));
        }
        let start: ScanResponse = self
            .conn
            .exchange_json(
                endpoint::PROV_SCAN,
                &ScanCommand::ScanStart {
                    blocking: true,
                    passive: false,
                    group_channels: SCAN_GROUP_CHANNELS,
                    period_ms: SCAN_PERIOD_MS,
                },
            )
            .await?;
        if !start.status.is_success() {
            return Err(CoreError::Protocol(ProtocolError::Rejected(
                "scan refused".into(),
            )));
        }
        let status: ScanResponse = self
            .conn
            .exchange_json(endpoint::PROV_SCAN, &ScanCommand::ScanStatus)
            .await?;
        let total = status.result_count;

        let page = if self.conn.transport().chunk_payload_limit().is_some() {
            BLE_SCAN_PAGE
        } else {
            HTTP_SCAN_PAGE
        };
        let mut networks = Vec::new();
        let mut index = 0u16;
        while index < total {
            let count = page.min(total - index);
            let resp: ScanResponse = self
                .conn
                .exchange_json(
                    endpoint::PROV_SCAN,
                    &ScanCommand::ScanResult {
                        start_index: index,
                        count,
                    },
                )
                .await?;
            if resp.entries.is_empty() {
                break;
            }
            index += resp.entries.len() as u16;
            networks.extend(resp.entries);
        }
        Ok(networks)
    }

    /// Pushes credentials and applies them. `Ok(Some(reason))` is a device
    /// rejection the caller may retry after a provisioning reset.
    async fn send_wifi_config(&mut self, ssid: &str, passphrase: &str) -> Result<Option<String>> {
        let set: ConfigResponse = self
            .conn
            .exchange_json(
                endpoint::PROV_CONFIG,
                &ConfigCommand::SetConfig {
                    ssid: ssid.to_string(),
                    passphrase: passphrase.to_string(),
                },
            )
            .await?;
        if !set.status.is_success() {
            return Ok(Some(format!("wifi config rejected: {}", set.status)));
        }
        let apply: ConfigResponse = self
            .conn
            .exchange_json(endpoint::PROV_CONFIG, &ConfigCommand::ApplyConfig)
            .await?;
        if !apply.status.is_success() {
            return Ok(Some(format!("wifi apply rejected: {}", apply.status)));
        }
        Ok(None)
    }

    async fn verify_wifi(&mut self) -> Result<WifiAttempt> {
        for _ in 0..STATUS_POLL_LIMIT {
            let status: ConfigResponse = self
                .conn
                .exchange_json(endpoint::PROV_CONFIG, &ConfigCommand::GetStatus)
                .await?;
            match status.sta_state {
                Some(StaState::Connected) => {
                    return Ok(WifiAttempt::Connected(status.ip));
                }
                Some(StaState::ConnectionFailed) => {
                    let reason = status
                        .fail_reason
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "wifi connection failed".to_string());
                    return Ok(WifiAttempt::Failed(reason));
                }
                Some(StaState::Connecting) | Some(StaState::Disconnected) | None => {
                    tokio::time::sleep(STATUS_POLL_INTERVAL).await;
                }
            }
        }
        Ok(WifiAttempt::Failed("wifi status poll timed out".to_string()))
    }

    async fn reset_device(&mut self) -> Result<()> {
        let resp: CtrlResponse = self
            .conn
            .exchange_json(endpoint::PROV_CTRL, &CtrlCommand::Reset)
            .await?;
        if !resp.status.is_success() {
            return Err(CoreError::Protocol(ProtocolError::Rejected(format!(
                "device reset rejected: {}",
                resp.status
            ))));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use sha2::{Digest, Sha256};

    use crate::protocol::wifi::WifiFailReason;
    use crate::testing::{MockDevice, MockTransport, DEVICE_NODE_ID, DEVICE_POP};
    use crate::transport::TransportKind;

    struct MockMapping {
        verified: Mutex<Vec<(String, String, String)>>,
    }

    impl MockMapping {
        fn new() -> Self {
            MockMapping {
                verified: Mutex::new(Vec::new()),
            }
        }
    }

    impl MappingService for MockMapping {
        async fn initiate(&self, _node_id: &str) -> Result<MappingChallenge> {
            Ok(MappingChallenge {
                challenge: "aGVsbG8=".to_string(),
                request_id: "req-42".to_string(),
            })
        }

        async fn verify(
            &self,
            request_id: &str,
            node_id: &str,
            response_hex: &str,
        ) -> Result<()> {
            self.verified.lock().unwrap().push((
                request_id.to_string(),
                node_id.to_string(),
                response_hex.to_string(),
            ));
            Ok(())
        }
    }

    fn base_config() -> ProvisionConfig {
        ProvisionConfig {
            session: crate::connection::SessionOptions {
                pop: Some(DEVICE_POP.to_string()),
                ..Default::default()
            },
            user_id: "user-1".to_string(),
            secret_key: "secret-1".to_string(),
            ssid: Some("Home".to_string()),
            passphrase: Some("hunter22".to_string()),
            ..Default::default()
        }
    }

    async fn run_provision(
        device: std::sync::Arc<Mutex<MockDevice>>,
        kind: TransportKind,
        config: ProvisionConfig,
        mapping: &MockMapping,
        selector: Option<CredentialSelector<'_>>,
    ) -> (Result<ProvisionOutcome>, Vec<ProvisionState>) {
        let transport = MockTransport::new(device, kind);
        let mut conn = NodeConnection::new(transport);
        let mut states = Vec::new();
        let result = Provisioner::new(&mut conn, Some(mapping), config)
            .run(selector, &mut |s| states.push(s.clone()))
            .await;
        (result, states)
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_with_explicit_ssid() {
        let device = MockDevice::new(1).shared();
        let mapping = MockMapping::new();
        let (result, states) = run_provision(
            device.clone(),
            TransportKind::SoftApHttp,
            base_config(),
            &mapping,
            None,
        )
        .await;
        let outcome = result.unwrap();
        assert_eq!(outcome.node_id, DEVICE_NODE_ID);
        assert_eq!(outcome.ip.as_deref(), Some("192.168.1.100"));
        assert_eq!(
            states,
            vec![
                ProvisionState::Handshaking,
                ProvisionState::Associating,
                ProvisionState::ConfiguringWifi,
                ProvisionState::Verifying,
                ProvisionState::Done,
            ]
        );
        let device = device.lock().unwrap();
        assert_eq!(
            device.wifi_config,
            Some(("Home".to_string(), "hunter22".to_string()))
        );
        assert_eq!(device.reset_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_resets_once_without_rehandshake() {
        let device = MockDevice::new(1).shared();
        device.lock().unwrap().wifi_status_script = VecDeque::from([(
            StaState::ConnectionFailed,
            Some(WifiFailReason::AuthError),
        )]);
        let mapping = MockMapping::new();
        let (result, states) = run_provision(
            device.clone(),
            TransportKind::SoftApHttp,
            base_config(),
            &mapping,
            None,
        )
        .await;
        result.unwrap();
        let device = device.lock().unwrap();
        assert_eq!(device.reset_count, 1);
        assert_eq!(device.handshake_count, 1);
        assert_eq!(device.apply_count, 2);
        assert_eq!(
            states.iter().filter(|s| **s == ProvisionState::Handshaking).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_rejection_retries_on_same_session() {
        let device = MockDevice::new(1).shared();
        device.lock().unwrap().fail_apply_once = true;
        let mapping = MockMapping::new();
        let (result, _) = run_provision(
            device.clone(),
            TransportKind::SoftApHttp,
            base_config(),
            &mapping,
            None,
        )
        .await;
        let outcome = result.unwrap();
        assert_eq!(outcome.ip.as_deref(), Some("192.168.1.100"));
        let device = device.lock().unwrap();
        assert_eq!(device.reset_count, 1);
        assert_eq!(device.handshake_count, 1);
        assert_eq!(device.apply_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_fails_without_reset() {
        let device = MockDevice::new(1).shared();
        device.lock().unwrap().wifi_status_script = VecDeque::from([(
            StaState::ConnectionFailed,
            Some(WifiFailReason::NetworkNotFound),
        )]);
        let mapping = MockMapping::new();
        let mut config = base_config();
        config.no_retry = true;
        let (result, states) = run_provision(
            device.clone(),
            TransportKind::SoftApHttp,
            config,
            &mapping,
            None,
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("network not found"));
        assert!(matches!(states.last(), Some(ProvisionState::Failed(_))));
        assert_eq!(device.lock().unwrap().reset_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wifi_skips_wifi_states() {
        let device = MockDevice::new(1).shared();
        let mapping = MockMapping::new();
        let mut config = base_config();
        config.no_wifi = true;
        config.ssid = None;
        config.passphrase = None;
        let (result, states) = run_provision(
            device.clone(),
            TransportKind::Ble,
            config,
            &mapping,
            None,
        )
        .await;
        assert_eq!(result.unwrap().node_id, DEVICE_NODE_ID);
        assert!(!states.contains(&ProvisionState::ScanningWifi));
        assert!(!states.contains(&ProvisionState::ConfiguringWifi));
        assert!(!states.contains(&ProvisionState::Verifying));
        assert_eq!(*states.last().unwrap(), ProvisionState::Done);

        // The signed challenge reached the cloud as lowercase hex.
        let verified = mapping.verified.lock().unwrap();
        assert_eq!(verified.len(), 1);
        let expected = HEXLOWER.encode(&Sha256::digest("aGVsbG8=".as_bytes()));
        assert_eq!(verified[0], ("req-42".to_string(), DEVICE_NODE_ID.to_string(), expected));

        // BLE keeps challenge-response enabled by default.
        assert!(device.lock().unwrap().chal_resp_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wifi_on_network_disables_chal_resp() {
        let device = MockDevice::new(1).shared();
        let mapping = MockMapping::new();
        let mut config = base_config();
        config.no_wifi = true;
        let (result, _) = run_provision(
            device.clone(),
            TransportKind::NetworkHttp,
            config,
            &mapping,
            None,
        )
        .await;
        result.unwrap();
        assert!(!device.lock().unwrap().chal_resp_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wifi_explicit_keep_overrides_default() {
        let device = MockDevice::new(1).shared();
        let mapping = MockMapping::new();
        let mut config = base_config();
        config.no_wifi = true;
        config.disable_chal_resp = Some(false);
        let (result, _) = run_provision(
            device.clone(),
            TransportKind::NetworkHttp,
            config,
            &mapping,
            None,
        )
        .await;
        result.unwrap();
        assert!(device.lock().unwrap().chal_resp_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_feeds_selector() {
        let device = MockDevice::new(1).shared();
        let mapping = MockMapping::new();
        let mut config = base_config();
        config.ssid = None;
        config.passphrase = None;
        let mut seen = Vec::new();
        let mut select = |networks: &[WifiNetwork]| -> Result<(String, String)> {
            seen = networks.iter().map(|n| n.ssid.clone()).collect();
            Ok(("Home".to_string(), "hunter22".to_string()))
        };
        let (result, states) = run_provision(
            device.clone(),
            TransportKind::SoftApHttp,
            config,
            &mapping,
            Some(&mut select),
        )
        .await;
        result.unwrap();
        assert!(states.contains(&ProvisionState::ScanningWifi));
        assert_eq!(seen, vec!["Home", "Guest"]);
        assert_eq!(
            device.lock().unwrap().wifi_config.as_ref().unwrap().0,
            "Home"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_pop_is_terminal() {
        let device = MockDevice::new(1).shared();
        let mapping = MockMapping::new();
        let mut config = base_config();
        config.session.pop = Some("deadbeef".to_string());
        let (result, states) = run_provision(
            device.clone(),
            TransportKind::SoftApHttp,
            config,
            &mapping,
            None,
        )
        .await;
        assert!(result.is_err());
        assert!(matches!(states.last(), Some(ProvisionState::Failed(_))));
        // Never got past the handshake.
        assert!(!states.contains(&ProvisionState::Associating));
    }
}
