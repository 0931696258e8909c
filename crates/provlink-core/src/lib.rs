//! Core library for provlink: IoT node provisioning and local control.
//!
//! Layers, bottom up:
//! - [`transport`]: byte-oriented request/response over BLE, HTTP (SoftAP or
//!   on-network) and serial console.
//! - [`session`]: the three security schemes (Sec0/Sec1/Sec2) and the
//!   handshake that turns a transport into an encrypted channel.
//! - [`protocol`]: endpoint payload types and the chunk envelope used on
//!   MTU-limited transports.
//! - [`connection`]: one logical connection to a node, owning transport,
//!   session and chunk reassembly state.
//! - [`provision`] and [`localctrl`]: the provisioning state machine and the
//!   raw/property local-control operations built on top.
//! - [`discovery`], [`cloud`], [`storage`]: mDNS discovery, the cloud proxy
//!   collaborator and profile storage.

pub mod cloud;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod localctrl;
pub mod protocol;
pub mod provision;
pub mod session;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::NodeConnection;
pub use error::{CoreError, Result};
