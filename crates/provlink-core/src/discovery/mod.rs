//! On-network device discovery over mDNS.

pub mod packet;
pub mod service;

pub use service::{discover, DeviceRecord, SERVICE_KIND, SERVICE_TYPE};
