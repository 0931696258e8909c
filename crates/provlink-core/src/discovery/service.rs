//! mDNS browse for provisioned nodes on the local network.
//!
//! Sends one PTR query for the service type and collects responses for the
//! discovery window. Records for one instance can arrive split across
//! packets (PTR in one, SRV/TXT/A in another), so partial state is merged
//! until the window closes.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use serde::Serialize;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

use super::packet::{self, RecordData, ResourceRecord};
use crate::error::Result;

pub const SERVICE_TYPE: &str = "_esp_rmaker_chal_resp._tcp.local";
/// Service kind advertised by nodes under [`SERVICE_TYPE`].
pub const SERVICE_KIND: &str = "chal_resp";

const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
const MDNS_PORT: u16 = 5353;
const RECV_BUF: usize = 4096;

/// One discovered node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub instance_name: String,
    pub node_id: String,
    pub service_kind: String,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub sec_version: u8,
    pub pop_required: bool,
}

#[derive(Debug, Default)]
struct PartialInstance {
    port: Option<u16>,
    target: Option<String>,
    txt: Option<HashMap<String, String>>,
}

#[derive(Debug, Default)]
struct Browse {
    instances: HashMap<String, PartialInstance>,
    hosts: HashMap<String, Ipv4Addr>,
}

impl Browse {
    fn merge(&mut self, records: Vec<ResourceRecord>) {
        for record in records {
            match record.data {
                RecordData::Ptr(instance) => {
                    if record.name == SERVICE_TYPE {
                        self.instances.entry(instance).or_default();
                    }
                }
                RecordData::Srv { port, target } => {
                    let entry = self.instances.entry(record.name).or_default();
                    entry.port = Some(port);
                    entry.target = Some(target);
                }
                RecordData::Txt(txt) => {
                    self.instances.entry(record.name).or_default().txt = Some(txt);
                }
                RecordData::A(ip) => {
                    self.hosts.insert(record.name, ip);
                }
                RecordData::Other => {}
            }
        }
    }

    fn finish(self) -> Vec<DeviceRecord> {
        let mut out = Vec::new();
        for (instance, partial) in self.instances {
            let Some(txt) = partial.txt else { continue };
            let Some(port) = partial.port else { continue };
            let Some(ip) = partial
                .target
                .as_ref()
                .and_then(|t| self.hosts.get(t))
                .copied()
            else {
                continue;
            };
            let Some(node_id) = txt.get("node_id") else { continue };
            let sec_version = txt
                .get("sec_version")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let pop_required = txt
                .get("pop_required")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false);
            let instance_name = instance
                .split('.')
                .next()
                .unwrap_or(instance.as_str())
                .to_string();
            out.push(DeviceRecord {
                instance_name,
                node_id: node_id.clone(),
                service_kind: SERVICE_KIND.to_string(),
                ip,
                port,
                sec_version,
                pop_required,
            });
        }
        out.sort_by(|a, b| a.instance_name.cmp(&b.instance_name));
        out
    }
}

fn multicast_socket() -> std::io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;
    socket.join_multicast_v4(&MDNS_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    Ok(socket)
}

/// Browse the local network for the discovery window, then return every
/// fully resolved record. Cancelling the future drops the socket.
pub async fn discover(window: Duration) -> Result<Vec<DeviceRecord>> {
    let socket = UdpSocket::from_std(multicast_socket()?.into())?;
    let query = packet::build_query(SERVICE_TYPE);
    socket
        .send_to(&query, SocketAddrV4::new(MDNS_GROUP, MDNS_PORT))
        .await?;

    let deadline = Instant::now() + window;
    let mut browse = Browse::default();
    let mut buf = vec![0u8; RECV_BUF];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok((len, _peer))) => {
                // Unrelated multicast traffic is normal; skip what does
                // not parse as a response.
                if let Ok(records) = packet::parse_response(&buf[..len]) {
                    browse.merge(records);
                }
            }
        }
    }
    Ok(browse.finish())
}
