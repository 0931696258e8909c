//! BLE GATT transport.
//!
//! The device advertises its provisioning name and exposes one GATT
//! service whose characteristics map to endpoint names through a fixed
//! 16-bit id table. A request is a write-with-response followed by a read
//! of the same characteristic.

use std::collections::HashMap;
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Manager, Peripheral};
use bytes::Bytes;
use uuid::Uuid;

use super::{Transport, TransportKind};
use crate::error::TransportError;
use crate::protocol::chunk::BLE_CHUNK_PAYLOAD;

/// Provisioning GATT service.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffff_0000_1000_8000_00805f9b34fb);

/// Endpoint name to 16-bit characteristic id.
const ENDPOINT_IDS: &[(&str, u16)] = &[
    ("prov-ctrl", 0xff4f),
    ("prov-scan", 0xff50),
    ("prov-session", 0xff51),
    ("prov-config", 0xff52),
    ("proto-ver", 0xff53),
    ("get_params", 0xff54),
    ("set_params", 0xff55),
    ("get_config", 0xff56),
    ("cloud_user_assoc", 0xff57),
    ("chal_resp", 0xff58),
];

/// 128-bit characteristic UUID for an endpoint id, in the service's base.
pub fn endpoint_uuid(id: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_00805f9b34fb | ((id as u128) << 96))
}

fn endpoint_id(endpoint: &str) -> Result<u16, TransportError> {
    ENDPOINT_IDS
        .iter()
        .find(|(name, _)| *name == endpoint)
        .map(|(_, id)| *id)
        .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))
}

pub struct BleTransport {
    peripheral: Peripheral,
    characteristics: HashMap<Uuid, Characteristic>,
}

impl BleTransport {
    /// Scan for `device_name` and connect to its provisioning service.
    pub async fn connect(device_name: &str, scan_timeout: Duration) -> Result<Self, TransportError> {
        let manager = Manager::new().await.map_err(map_ble)?;
        let adapters = manager.adapters().await.map_err(map_ble)?;
        let central = adapters
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::NotFound("no BLE adapter available".into()))?;

        central
            .start_scan(ScanFilter::default())
            .await
            .map_err(map_ble)?;
        tokio::time::sleep(scan_timeout).await;
        let peripherals = central.peripherals().await.map_err(map_ble)?;
        central.stop_scan().await.map_err(map_ble)?;

        let mut found = None;
        for p in peripherals {
            let name = p
                .properties()
                .await
                .map_err(map_ble)?
                .and_then(|props| props.local_name);
            if name.as_deref() == Some(device_name) {
                found = Some(p);
                break;
            }
        }
        let peripheral =
            found.ok_or_else(|| TransportError::NotFound(device_name.to_string()))?;

        peripheral.connect().await.map_err(map_ble)?;
        peripheral.discover_services().await.map_err(map_ble)?;
        let characteristics = peripheral
            .characteristics()
            .into_iter()
            .filter(|c| c.service_uuid == SERVICE_UUID)
            .map(|c| (c.uuid, c))
            .collect::<HashMap<_, _>>();
        if characteristics.is_empty() {
            return Err(TransportError::Unreachable(format!(
                "{device_name} does not expose the provisioning service"
            )));
        }
        Ok(BleTransport {
            peripheral,
            characteristics,
        })
    }

    fn characteristic(&self, endpoint: &str) -> Result<&Characteristic, TransportError> {
        let uuid = endpoint_uuid(endpoint_id(endpoint)?);
        self.characteristics
            .get(&uuid)
            .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))
    }
}

fn map_ble(e: btleplug::Error) -> TransportError {
    TransportError::Unreachable(e.to_string())
}

impl Transport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    fn chunk_payload_limit(&self) -> Option<usize> {
        Some(BLE_CHUNK_PAYLOAD)
    }

    async fn request(&mut self, endpoint: &str, payload: &[u8]) -> Result<Bytes, TransportError> {
        let characteristic = self.characteristic(endpoint)?;
        self.peripheral
            .write(characteristic, payload, WriteType::WithResponse)
            .await
            .map_err(map_ble)?;
        let response = self.peripheral.read(characteristic).await.map_err(map_ble)?;
        Ok(Bytes::from(response))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.peripheral.disconnect().await.map_err(map_ble)
    }
}
