//! Scripted in-memory device and transport for tests.
//!
//! The mock device implements the server side of all three handshakes plus
//! the provisioning/control endpoints, with scripted Wi-Fi status replies
//! and counters for asserting orchestrator behavior. `MockTransport` wires
//! it under the `Transport` trait, optionally with a BLE-sized chunk limit
//! so the envelope path gets exercised too.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use data_encoding::BASE64;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256, Sha512};
use srp::client::SrpClient;
use srp::groups::G_3072;
use srp::server::SrpServer;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::TransportError;
use crate::protocol::chunk::{self, Chunk, Reassembler, BLE_CHUNK_PAYLOAD};
use crate::protocol::endpoint;
use crate::protocol::raw::{RawDataKind, RawDataRequest};
use crate::protocol::wifi::{StaState, WifiFailReason};
use crate::session::sec1::{self, Sec1Session};
use crate::session::sec2::{self, Sec2Session};
use crate::transport::{Transport, TransportKind};

pub const DEVICE_POP: &str = "2c4d470d";
pub const DEVICE_SEC2_USERNAME: &str = "wifiprov";
pub const DEVICE_SEC2_PASSWORD: &str = "abcd1234";
pub const DEVICE_NODE_ID: &str = "XeRQn9xxxxxxxxxx";
pub const PARAMS_FIXTURE: &str = r#"{"Light":{"Power":true,"Brightness":75}}"#;
pub const CONFIG_FIXTURE: &str = r#"{"node_id":"XeRQn9xxxxxxxxxx","devices":[{"name":"Light"}]}"#;

enum DeviceSession {
    Sec0,
    Sec1(Sec1Session),
    Sec2(Sec2Session),
}

impl DeviceSession {
    fn encrypt(&mut self, plaintext: &[u8]) -> Bytes {
        match self {
            DeviceSession::Sec0 => Bytes::copy_from_slice(plaintext),
            DeviceSession::Sec1(s) => s.encrypt(plaintext),
            DeviceSession::Sec2(s) => s.encrypt(plaintext).expect("mock encrypt"),
        }
    }

    fn decrypt(&mut self, ciphertext: &[u8]) -> Bytes {
        match self {
            DeviceSession::Sec0 => Bytes::copy_from_slice(ciphertext),
            DeviceSession::Sec1(s) => s.decrypt(ciphertext),
            DeviceSession::Sec2(s) => s.decrypt(ciphertext).expect("mock decrypt"),
        }
    }
}

enum Sec1Server {
    Idle,
    AwaitingVerify { client_pub: [u8; 32] },
}

struct Sec2Server {
    b: Vec<u8>,
    salt: Vec<u8>,
    verifier: Option<Vec<u8>>,
    a_pub: Option<Vec<u8>>,
    base_nonce: [u8; 12],
}

/// Scripted device. Shared behind a mutex between the test body and the
/// transport handed to the code under test.
pub struct MockDevice {
    pub caps_json: String,
    pub pop: String,
    session: Option<DeviceSession>,
    sec1_secret: StaticSecret,
    sec1_state: Sec1Server,
    sec1_pending: Option<Sec1Session>,
    sec2_state: Sec2Server,
    /// Popped once per GetStatus query.
    pub wifi_status_script: VecDeque<(StaState, Option<WifiFailReason>)>,
    /// Reject the next ApplyConfig with `invalid_state`.
    pub fail_apply_once: bool,
    pub wifi_config: Option<(String, String)>,
    pub last_set_params: Option<serde_json::Value>,
    pub chal_resp_enabled: bool,
    pub handshake_count: usize,
    pub reset_count: usize,
    pub apply_count: usize,
    request_bufs: HashMap<String, Reassembler>,
    response_chunks: HashMap<String, VecDeque<Chunk>>,
    raw_chunks: HashMap<&'static str, Vec<Chunk>>,
}

impl MockDevice {
    pub fn new(sec_ver: u8) -> Self {
        let caps_json = match sec_ver {
            0 => r#"{"prov":{"ver":"v1.1","sec_ver":0,"cap":["no_sec","wifi_scan"]},"extra":{"cap":["ch_resp","local_ctrl"]}}"#,
            1 => r#"{"prov":{"ver":"v1.1","sec_ver":1,"cap":["wifi_scan"]},"extra":{"cap":["ch_resp","local_ctrl"]}}"#,
            _ => r#"{"prov":{"ver":"v1.1","sec_ver":2,"sec_patch_ver":0,"cap":["wifi_scan"]},"extra":{"cap":["ch_resp","local_ctrl"]}}"#,
        };
        MockDevice {
            caps_json: caps_json.to_string(),
            pop: DEVICE_POP.to_string(),
            session: None,
            sec1_secret: StaticSecret::random_from_rng(OsRng),
            sec1_state: Sec1Server::Idle,
            sec1_pending: None,
            sec2_state: Sec2Server {
                b: vec![0x42; 64],
                salt: vec![0x11; 16],
                verifier: None,
                a_pub: None,
                base_nonce: [9u8; 12],
            },
            wifi_status_script: VecDeque::from([(StaState::Connected, None)]),
            fail_apply_once: false,
            wifi_config: None,
            last_set_params: None,
            chal_resp_enabled: true,
            handshake_count: 0,
            reset_count: 0,
            apply_count: 0,
            request_bufs: HashMap::new(),
            response_chunks: HashMap::new(),
            raw_chunks: HashMap::new(),
        }
    }

    pub fn shared(self) -> Arc<Mutex<MockDevice>> {
        Arc::new(Mutex::new(self))
    }

    fn handle_session(&mut self, payload: &[u8]) -> Vec<u8> {
        if let Ok(cmd) = serde_json::from_slice::<sec1::wire::SessionCmd0>(payload) {
            if cmd.msg == sec1::wire::CMD0 {
                self.handshake_count += 1;
                let client_pub: [u8; 32] = BASE64
                    .decode(cmd.client_pubkey.as_bytes())
                    .expect("client pubkey b64")
                    .try_into()
                    .expect("client pubkey len");
                let iv = [0x5a; 16];
                let shared = self
                    .sec1_secret
                    .diffie_hellman(&PublicKey::from(client_pub));
                let key = sec1::derive_key(shared.as_bytes(), Some(&self.pop));
                self.sec1_pending = Some(Sec1Session::new(&key, &iv));
                self.sec1_state = Sec1Server::AwaitingVerify { client_pub };
                let device_pub = PublicKey::from(&self.sec1_secret);
                return serde_json::to_vec(&sec1::wire::SessionResp0 {
                    status: "success".into(),
                    device_pubkey: BASE64.encode(device_pub.as_bytes()),
                    device_random: BASE64.encode(&iv),
                })
                .expect("resp0");
            }
        }
        if let Ok(cmd) = serde_json::from_slice::<sec1::wire::SessionCmd1>(payload) {
            if cmd.msg == sec1::wire::CMD1 {
                let client_pub = match self.sec1_state {
                    Sec1Server::AwaitingVerify { client_pub } => client_pub,
                    Sec1Server::Idle => panic!("sec1 verify before key exchange"),
                };
                let mut session = self.sec1_pending.take().expect("pending sec1 session");
                let verify = BASE64.decode(cmd.client_verify.as_bytes()).expect("b64");
                let recovered = session.decrypt(&verify);
                let device_pub = PublicKey::from(&self.sec1_secret);
                if recovered.as_ref() != device_pub.as_bytes() {
                    return serde_json::to_vec(&sec1::wire::SessionResp1 {
                        status: "crypto_error".into(),
                        device_verify: String::new(),
                    })
                    .expect("resp1");
                }
                let device_verify = session.encrypt(&client_pub);
                self.session = Some(DeviceSession::Sec1(session));
                return serde_json::to_vec(&sec1::wire::SessionResp1 {
                    status: "success".into(),
                    device_verify: BASE64.encode(&device_verify),
                })
                .expect("resp1");
            }
        }
        if let Ok(cmd) = serde_json::from_slice::<sec2::wire::SessionCmd0>(payload) {
            if cmd.msg == sec2::wire::CMD0 {
                self.handshake_count += 1;
                let client = SrpClient::<Sha512>::new(&G_3072);
                let v = client.compute_verifier(
                    DEVICE_SEC2_USERNAME.as_bytes(),
                    DEVICE_SEC2_PASSWORD.as_bytes(),
                    &self.sec2_state.salt,
                );
                let server = SrpServer::<Sha512>::new(&G_3072);
                let b_pub = server.compute_public_ephemeral(&self.sec2_state.b, &v);
                self.sec2_state.a_pub = Some(
                    BASE64
                        .decode(cmd.client_ephemeral.as_bytes())
                        .expect("a_pub b64"),
                );
                self.sec2_state.verifier = Some(v);
                return serde_json::to_vec(&sec2::wire::SessionResp0 {
                    status: "success".into(),
                    salt: BASE64.encode(&self.sec2_state.salt),
                    device_ephemeral: BASE64.encode(&b_pub),
                })
                .expect("resp0");
            }
        }
        if let Ok(cmd) = serde_json::from_slice::<sec2::wire::SessionCmd1>(payload) {
            if cmd.msg == sec2::wire::CMD1 {
                let server = SrpServer::<Sha512>::new(&G_3072);
                let v = self.sec2_state.verifier.as_ref().expect("verifier");
                let a_pub = self.sec2_state.a_pub.as_ref().expect("a_pub");
                let sv = server
                    .process_reply(&self.sec2_state.b, v, a_pub)
                    .expect("srp reply");
                let m1 = BASE64.decode(cmd.client_proof.as_bytes()).expect("m1 b64");
                return match sv.verify_client(&m1) {
                    Ok(()) => {
                        let key: [u8; 32] =
                            sv.key()[..32].try_into().expect("srp key length");
                        self.session = Some(DeviceSession::Sec2(Sec2Session::new_peer(
                            &key,
                            self.sec2_state.base_nonce,
                        )));
                        serde_json::to_vec(&sec2::wire::SessionResp1 {
                            status: "success".into(),
                            device_proof: BASE64.encode(sv.proof()),
                            device_nonce: BASE64.encode(&self.sec2_state.base_nonce),
                        })
                        .expect("resp1")
                    }
                    Err(_) => serde_json::to_vec(&sec2::wire::SessionResp1 {
                        status: "crypto_error".into(),
                        device_proof: String::new(),
                        device_nonce: String::new(),
                    })
                    .expect("resp1"),
                };
            }
        }
        // Sec0 hello
        self.session = Some(DeviceSession::Sec0);
        self.handshake_count += 1;
        br#"{"status":"success"}"#.to_vec()
    }

    fn handle_command(&mut self, ep: &str, plaintext: &[u8]) -> Vec<u8> {
        let cmd: serde_json::Value = serde_json::from_slice(plaintext).expect("command json");
        match (ep, cmd["cmd"].as_str().unwrap_or_default()) {
            (endpoint::PROV_CONFIG, "set_config") => {
                self.wifi_config = Some((
                    cmd["ssid"].as_str().unwrap_or_default().to_string(),
                    cmd["passphrase"].as_str().unwrap_or_default().to_string(),
                ));
                br#"{"status":"success"}"#.to_vec()
            }
            (endpoint::PROV_CONFIG, "apply_config") => {
                self.apply_count += 1;
                if self.fail_apply_once {
                    self.fail_apply_once = false;
                    return br#"{"status":"invalid_state"}"#.to_vec();
                }
                br#"{"status":"success"}"#.to_vec()
            }
            (endpoint::PROV_CONFIG, "get_status") => {
                let (state, reason) = self
                    .wifi_status_script
                    .pop_front()
                    .unwrap_or((StaState::Connected, None));
                let mut resp = serde_json::json!({
                    "status": "success",
                    "sta_state": serde_json::to_value(state).expect("state"),
                });
                if let Some(reason) = reason {
                    resp["fail_reason"] = serde_json::to_value(reason).expect("reason");
                }
                if state == StaState::Connected {
                    resp["ip"] = serde_json::Value::String("192.168.1.100".into());
                }
                serde_json::to_vec(&resp).expect("status resp")
            }
            (endpoint::PROV_SCAN, "scan_start") | (endpoint::PROV_SCAN, "scan_status") => {
                br#"{"status":"success","scan_finished":true,"result_count":2}"#.to_vec()
            }
            (endpoint::PROV_SCAN, "scan_result") => {
                let start = cmd["start_index"].as_u64().unwrap_or(0);
                let entries = if start == 0 {
                    serde_json::json!([
                        {"ssid":"Home","bssid":"aa:bb:cc:dd:ee:01","channel":6,"rssi":-42,"auth":"wpa2_psk"},
                        {"ssid":"Guest","bssid":"aa:bb:cc:dd:ee:02","channel":11,"rssi":-60,"auth":"open"}
                    ])
                } else {
                    serde_json::json!([])
                };
                serde_json::to_vec(
                    &serde_json::json!({"status":"success","entries":entries}),
                )
                .expect("scan resp")
            }
            (endpoint::PROV_CTRL, "reset") => {
                self.reset_count += 1;
                br#"{"status":"success"}"#.to_vec()
            }
            (endpoint::PROV_CTRL, "reprov") => br#"{"status":"success"}"#.to_vec(),
            (endpoint::PROV_CTRL, "chal_resp_disable") => {
                self.chal_resp_enabled = false;
                br#"{"status":"success"}"#.to_vec()
            }
            (endpoint::CLOUD_USER_ASSOC, _) => serde_json::to_vec(&serde_json::json!({
                "status": "success",
                "node_id": DEVICE_NODE_ID,
            }))
            .expect("assoc resp"),
            (endpoint::CHAL_RESP, _) => {
                let challenge = cmd["challenge"].as_str().unwrap_or_default();
                let sig = Sha256::digest(challenge.as_bytes());
                serde_json::to_vec(&serde_json::json!({
                    "status": "success",
                    "response": BASE64.encode(&sig),
                }))
                .expect("chal resp")
            }
            (endpoint::SET_PARAMS, _) => {
                self.last_set_params = Some(cmd);
                br#"{"status":"success"}"#.to_vec()
            }
            _ => br#"{"status":"invalid_argument"}"#.to_vec(),
        }
    }

    fn raw_payload(&self, kind: RawDataKind, timestamp: Option<i64>) -> Vec<u8> {
        let data = match kind {
            RawDataKind::Params => PARAMS_FIXTURE,
            RawDataKind::Config => CONFIG_FIXTURE,
        };
        match timestamp {
            Some(ts) => format!(
                r#"{{"node_payload":{{"data":{data},"timestamp":{ts}}},"signature":"ZmFrZXNpZw=="}}"#
            )
            .into_bytes(),
            None => data.as_bytes().to_vec(),
        }
    }

    fn handle_raw(&mut self, ep: &'static str, payload: &[u8]) -> Vec<u8> {
        let session = self.session.as_mut().expect("raw endpoint before handshake");
        let plaintext = session.decrypt(payload);
        let request = RawDataRequest::decode(plaintext).expect("raw request");
        if request.seq_index == 0 {
            let body = self.raw_payload(request.kind, request.timestamp);
            let session = self.session.as_mut().expect("session");
            let ciphertext = session.encrypt(&body);
            let chunks = chunk::split(&ciphertext, BLE_CHUNK_PAYLOAD);
            self.raw_chunks.insert(ep, chunks);
        }
        let chunks = self.raw_chunks.get(ep).expect("raw read state");
        chunks[request.seq_index as usize].encode().to_vec()
    }

    /// Whole-payload endpoint dispatch (after any transport-level
    /// de-chunking).
    fn handle_logical(&mut self, ep: &str, payload: &[u8]) -> Vec<u8> {
        match ep {
            endpoint::PROTO_VER => self.caps_json.clone().into_bytes(),
            endpoint::PROV_SESSION => self.handle_session(payload),
            endpoint::GET_PARAMS => self.handle_raw(endpoint::GET_PARAMS, payload),
            endpoint::GET_CONFIG => self.handle_raw(endpoint::GET_CONFIG, payload),
            _ => {
                let session = self.session.as_mut().expect("endpoint before handshake");
                let plaintext = session.decrypt(payload);
                let response = self.handle_command(ep, &plaintext);
                let session = self.session.as_mut().expect("session");
                session.encrypt(&response).to_vec()
            }
        }
    }

    fn handle_chunked(&mut self, ep: &str, raw: &[u8]) -> Vec<u8> {
        // The raw data endpoints run their own chunk protocol.
        if ep == endpoint::GET_PARAMS || ep == endpoint::GET_CONFIG {
            return self.handle_logical(ep, raw);
        }
        let chunk = Chunk::decode(Bytes::copy_from_slice(raw)).expect("request chunk");
        if chunk.is_pull() {
            let queue = self.response_chunks.get_mut(ep).expect("pending response");
            return queue.pop_front().expect("response chunk").encode().to_vec();
        }
        let buf = self.request_bufs.entry(ep.to_string()).or_default();
        match buf.push(chunk).expect("request reassembly") {
            Some(message) => {
                self.request_bufs.remove(ep);
                let response = self.handle_logical(ep, &message);
                let mut queue: VecDeque<Chunk> =
                    chunk::split(&response, BLE_CHUNK_PAYLOAD).into();
                let first = queue.pop_front().expect("first response chunk");
                self.response_chunks.insert(ep.to_string(), queue);
                first.encode().to_vec()
            }
            None => Chunk::pull().encode().to_vec(),
        }
    }
}

/// Transport over a shared [`MockDevice`].
pub struct MockTransport {
    device: Arc<Mutex<MockDevice>>,
    kind: TransportKind,
    chunked: bool,
}

impl MockTransport {
    pub fn new(device: Arc<Mutex<MockDevice>>, kind: TransportKind) -> Self {
        let chunked = kind == TransportKind::Ble;
        MockTransport {
            device,
            kind,
            chunked,
        }
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn chunk_payload_limit(&self) -> Option<usize> {
        self.chunked.then_some(BLE_CHUNK_PAYLOAD)
    }

    async fn request(&mut self, ep: &str, payload: &[u8]) -> Result<Bytes, TransportError> {
        let mut device = self.device.lock().expect("device lock");
        let response = if self.chunked {
            device.handle_chunked(ep, payload)
        } else {
            device.handle_logical(ep, payload)
        };
        Ok(Bytes::from(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{NodeConnection, SessionOptions};
    use crate::error::{CoreError, SecurityError};
    use crate::session::SecurityScheme;

    fn sec1_options() -> SessionOptions {
        SessionOptions {
            pop: Some(DEVICE_POP.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_establish_sec1_over_http() {
        let device = MockDevice::new(1).shared();
        let transport = MockTransport::new(device.clone(), TransportKind::NetworkHttp);
        let mut conn = NodeConnection::new(transport);
        let scheme = conn.establish(&sec1_options()).await.unwrap();
        assert_eq!(scheme, SecurityScheme::Sec1);
        assert!(conn.is_established());
        assert_eq!(device.lock().unwrap().handshake_count, 1);
    }

    #[tokio::test]
    async fn test_establish_sec1_over_chunked_ble() {
        let device = MockDevice::new(1).shared();
        let transport = MockTransport::new(device.clone(), TransportKind::Ble);
        let mut conn = NodeConnection::new(transport);
        let scheme = conn.establish(&sec1_options()).await.unwrap();
        assert_eq!(scheme, SecurityScheme::Sec1);
    }

    #[tokio::test]
    async fn test_establish_sec1_wrong_pop_fails() {
        let device = MockDevice::new(1).shared();
        let transport = MockTransport::new(device, TransportKind::NetworkHttp);
        let mut conn = NodeConnection::new(transport);
        let options = SessionOptions {
            pop: Some("deadbeef".to_string()),
            ..Default::default()
        };
        let err = conn.establish(&options).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Security(SecurityError::AuthenticationFailed(_))
        ));
        assert!(!conn.is_established());
    }

    #[tokio::test]
    async fn test_establish_sec1_without_pop_rejected() {
        let device = MockDevice::new(1).shared();
        let transport = MockTransport::new(device, TransportKind::NetworkHttp);
        let mut conn = NodeConnection::new(transport);
        let err = conn.establish(&SessionOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Security(SecurityError::PopRequired)
        ));
    }

    #[tokio::test]
    async fn test_establish_sec0_auto_detected() {
        let device = MockDevice::new(0).shared();
        let transport = MockTransport::new(device, TransportKind::SoftApHttp);
        let mut conn = NodeConnection::new(transport);
        let scheme = conn.establish(&SessionOptions::default()).await.unwrap();
        assert_eq!(scheme, SecurityScheme::Sec0);
    }

    #[tokio::test]
    async fn test_establish_sec2() {
        let device = MockDevice::new(2).shared();
        let transport = MockTransport::new(device, TransportKind::SoftApHttp);
        let mut conn = NodeConnection::new(transport);
        let options = SessionOptions {
            sec2_username: Some(DEVICE_SEC2_USERNAME.to_string()),
            sec2_password: Some(DEVICE_SEC2_PASSWORD.to_string()),
            ..Default::default()
        };
        let scheme = conn.establish(&options).await.unwrap();
        assert_eq!(scheme, SecurityScheme::Sec2);
    }

    #[tokio::test]
    async fn test_sec2_missing_credentials_rejected() {
        let device = MockDevice::new(2).shared();
        let transport = MockTransport::new(device, TransportKind::SoftApHttp);
        let mut conn = NodeConnection::new(transport);
        let err = conn.establish(&SessionOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Security(SecurityError::CredentialsRequired)
        ));
    }

    #[tokio::test]
    async fn test_raw_params_read_over_ble() {
        let device = MockDevice::new(1).shared();
        let transport = MockTransport::new(device, TransportKind::Ble);
        let mut conn = NodeConnection::new(transport);
        conn.establish(&sec1_options()).await.unwrap();
        let raw = conn.read_raw(RawDataKind::Params, None).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["Light"]["Brightness"], 75);
    }

    #[tokio::test]
    async fn test_capability_probe_is_cached() {
        let device = MockDevice::new(1).shared();
        let transport = MockTransport::new(device, TransportKind::NetworkHttp);
        let mut conn = NodeConnection::new(transport);
        assert!(conn.has_capability("wifi_scan").await.unwrap());
        assert!(conn.has_capability("ch_resp").await.unwrap());
        assert!(!conn.has_capability("no_pop").await.unwrap());
    }
}
