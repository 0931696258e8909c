//! Target resolution: turn CLI addressing flags into an open transport.
//!
//! Direct addressing (`--device-ip`/`--device-host`) skips discovery. The
//! network transport otherwise runs an mDNS scan filtered by node id and
//! prompts when more than one record matches.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use provlink_core::discovery::{self, DeviceRecord};
use provlink_core::transport::ble::BleTransport;
use provlink_core::transport::console::ConsoleTransport;
use provlink_core::transport::http::HttpTransport;
use provlink_core::transport::{AnyTransport, TransportKind};

use crate::cli::{TargetFlags, TransportChoice};
use crate::error::{CliError, Result};

pub const SOFTAP_DEFAULT_HOST: &str = "192.168.4.1";
pub const CONSOLE_DEFAULT_PATH: &str = "/dev/ttyUSB0";

/// Open a transport to the node named by `node` (node id) under the given
/// addressing flags. Returns the discovery record too when one was used.
pub async fn open_target(
    node: Option<&str>,
    flags: &TargetFlags,
    request_timeout: Duration,
) -> Result<(AnyTransport, Option<DeviceRecord>)> {
    let choice = flags.transport.unwrap_or(TransportChoice::Network);
    match choice {
        TransportChoice::Ble => {
            let name = flags
                .device_name
                .as_deref()
                .or(node)
                .ok_or_else(|| {
                    CliError::InvalidArgument(
                        "--device_name is required for the BLE transport".to_string(),
                    )
                })?;
            let transport =
                BleTransport::connect(name, Duration::from_secs(flags.discovery_timeout))
                    .await
                    .map_err(provlink_core::CoreError::Transport)?;
            Ok((AnyTransport::Ble(transport), None))
        }
        TransportChoice::Softap => {
            let host = flags
                .device_ip
                .as_deref()
                .or(flags.device_host.as_deref())
                .unwrap_or(SOFTAP_DEFAULT_HOST);
            let transport = HttpTransport::new(
                host,
                flags.device_port,
                TransportKind::SoftApHttp,
                request_timeout,
            )
            .map_err(provlink_core::CoreError::Transport)?;
            Ok((AnyTransport::Http(transport), None))
        }
        TransportChoice::Console => {
            let path = flags.device_host.as_deref().unwrap_or(CONSOLE_DEFAULT_PATH);
            let transport = ConsoleTransport::open(path, None)
                .map_err(provlink_core::CoreError::Transport)?;
            Ok((AnyTransport::Console(transport), None))
        }
        TransportChoice::Network => {
            if let Some(host) = flags.device_ip.as_deref().or(flags.device_host.as_deref()) {
                let transport = HttpTransport::new(
                    host,
                    flags.device_port,
                    TransportKind::NetworkHttp,
                    request_timeout,
                )
                .map_err(provlink_core::CoreError::Transport)?;
                return Ok((AnyTransport::Http(transport), None));
            }

            let record =
                discover_one(node, Duration::from_secs(flags.discovery_timeout)).await?;
            let transport = HttpTransport::new(
                &record.ip.to_string(),
                record.port,
                TransportKind::NetworkHttp,
                request_timeout,
            )
            .map_err(provlink_core::CoreError::Transport)?;
            Ok((AnyTransport::Http(transport), Some(record)))
        }
    }
}

/// Scan the network and pick one record, prompting if several match.
async fn discover_one(node: Option<&str>, window: Duration) -> Result<DeviceRecord> {
    eprintln!("Discovering nodes for {} seconds...", window.as_secs());
    let mut records = discovery::discover(window).await?;
    if let Some(node_id) = node {
        records.retain(|r| r.node_id == node_id || r.instance_name == node_id);
    }
    match records.len() {
        0 => Err(CliError::NoNodesFound),
        1 => Ok(records.remove(0)),
        _ => select_record(records),
    }
}

fn select_record(records: Vec<DeviceRecord>) -> Result<DeviceRecord> {
    eprintln!("Multiple nodes found:");
    for (i, record) in records.iter().enumerate() {
        eprintln!(
            "  [{}] {} ({}) at {}:{}",
            i + 1,
            record.instance_name,
            record.node_id,
            record.ip,
            record.port
        );
    }
    let index = prompt_index("Select a node", records.len())?;
    let mut records = records;
    Ok(records.remove(index))
}

/// Open a transport and establish a security session for local control.
pub async fn open_session(
    node: &str,
    flags: &TargetFlags,
    session: &crate::cli::SessionFlags,
    request_timeout: Duration,
) -> Result<(provlink_core::NodeConnection<AnyTransport>, Option<DeviceRecord>)> {
    let (transport, record) = open_target(Some(node), flags, request_timeout).await?;
    let mut conn =
        provlink_core::NodeConnection::new(transport).with_request_timeout(request_timeout);
    let options = provlink_core::connection::SessionOptions {
        sec_ver: session.sec_ver,
        pop: session.pop.clone(),
        sec2_username: session.sec2_username.clone(),
        sec2_password: session.sec2_password.clone(),
    };
    conn.establish(&options).await?;
    Ok((conn, record))
}

/// Close the connection before surfacing `result`, so BLE links and serial
/// ports are released on error paths as well.
pub async fn finish<T: provlink_core::transport::Transport, R>(
    conn: provlink_core::NodeConnection<T>,
    result: Result<R>,
) -> Result<R> {
    conn.close().await.ok();
    result
}

/// Read a 1-based selection from stdin.
pub fn prompt_index(prompt: &str, len: usize) -> Result<usize> {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        eprint!("{} [1-{}]: ", prompt, len);
        io::stderr().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Err(CliError::InvalidArgument(
                "selection aborted".to_string(),
            ));
        }
        match line.trim().parse::<usize>() {
            Ok(n) if n >= 1 && n <= len => return Ok(n - 1),
            _ => eprintln!("Enter a number between 1 and {}", len),
        }
    }
}

/// Read one line from stdin with a prompt.
pub fn prompt_line(prompt: &str) -> Result<String> {
    eprint!("{}: ", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
