//! Provision command implementation.

use std::time::Duration;

use colored::*;
use indicatif::ProgressBar;
use serde::Deserialize;
use uuid::Uuid;

use provlink_core::cloud::CloudClient;
use provlink_core::connection::{NodeConnection, SessionOptions};
use provlink_core::error::CoreError;
use provlink_core::protocol::wifi::WifiNetwork;
use provlink_core::provision::{ProvisionConfig, ProvisionState, Provisioner};
use provlink_core::storage::ProfileStore;

use crate::cli::{ProvisionArgs, TargetFlags};
use crate::error::{CliError, Result};
use crate::output::get_formatter;
use crate::target;

/// Payload printed as a QR code on the device: advertised name, PoP and
/// intended transport, optionally SRP credentials.
#[derive(Debug, Deserialize)]
struct QrPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    pop: Option<String>,
    #[serde(default)]
    transport: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Run the provision command
pub async fn run_provision(mut args: ProvisionArgs, timeout: u64, json: bool) -> Result<()> {
    apply_qrcode(&mut args)?;

    let store = ProfileStore::open().map_err(CoreError::Storage)?;
    let profile = store.current().await.map_err(|_| CliError::NoProfile)?;
    let cloud = CloudClient::from_profile(&profile).map_err(CoreError::Cloud)?;

    let spinner = if json {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message(ProvisionState::Discovering.to_string());
        Some(pb)
    };

    let request_timeout = Duration::from_secs(timeout);
    let flags = TargetFlags {
        transport: Some(args.transport),
        device_name: args.device_name.clone(),
        device_ip: args.device_ip.clone(),
        device_host: args.device_host.clone(),
        device_port: args.device_port,
        discovery_timeout: args.discovery_timeout,
    };
    let (transport, _record) = target::open_target(None, &flags, request_timeout).await?;
    let mut conn = NodeConnection::new(transport).with_request_timeout(request_timeout);

    let config = ProvisionConfig {
        session: SessionOptions {
            sec_ver: args.session.sec_ver,
            pop: args.session.pop.clone(),
            sec2_username: args.session.sec2_username.clone(),
            sec2_password: args.session.sec2_password.clone(),
        },
        user_id: profile.user_id.clone(),
        secret_key: Uuid::new_v4().simple().to_string(),
        ssid: args.ssid.clone(),
        passphrase: args.passphrase.clone(),
        no_wifi: args.no_wifi,
        no_retry: args.no_retry,
        disable_chal_resp: args.chal_resp_choice(),
    };

    let mut observe = |state: &ProvisionState| match &spinner {
        Some(pb) => match state {
            ProvisionState::Done => pb.finish_with_message("done"),
            ProvisionState::Failed(reason) => {
                pb.abandon_with_message(format!("{}", reason.red()))
            }
            other => pb.set_message(other.to_string()),
        },
        None => eprintln!("state: {}", state),
    };

    let spinner_ref = &spinner;
    let mut select = |networks: &[WifiNetwork]| {
        let run = || prompt_network(networks);
        let picked = match spinner_ref {
            Some(pb) => pb.suspend(run),
            None => run(),
        };
        picked.map_err(|e| CoreError::Other(e.to_string()))
    };
    let selector: Option<provlink_core::provision::CredentialSelector<'_>> =
        if args.ssid.is_none() && !args.no_wifi {
            Some(&mut select)
        } else {
            None
        };

    let result = Provisioner::new(&mut conn, Some(&cloud), config)
        .run(selector, &mut observe)
        .await
        .map_err(CliError::from);
    let outcome = target::finish(conn, result).await?;

    let formatter = get_formatter(json);
    if json {
        println!(
            "{}",
            formatter.format_value(&serde_json::json!({
                "node_id": outcome.node_id,
                "ip": outcome.ip,
            }))
        );
    } else {
        println!("Provisioned node {}", outcome.node_id.bold());
        if let Some(ip) = &outcome.ip {
            println!("Node is online at {}", ip);
        }
    }
    Ok(())
}

fn prompt_network(networks: &[WifiNetwork]) -> Result<(String, String)> {
    if networks.is_empty() {
        return Err(CliError::Other(
            "the device found no Wi-Fi networks".to_string(),
        ));
    }
    eprintln!("Networks in range:");
    for (i, n) in networks.iter().enumerate() {
        let auth = if n.auth.is_open() { ", open" } else { "" };
        eprintln!(
            "  [{}] {} (channel {}, {} dBm{})",
            i + 1,
            n.ssid,
            n.channel,
            n.rssi,
            auth
        );
    }
    let index = target::prompt_index("Select a network", networks.len())?;
    let network = &networks[index];
    let passphrase = if network.auth.is_open() {
        String::new()
    } else {
        target::prompt_line("Passphrase")?
    };
    Ok((network.ssid.clone(), passphrase))
}

fn apply_qrcode(args: &mut ProvisionArgs) -> Result<()> {
    let Some(payload) = args.qrcode.as_deref() else {
        return Ok(());
    };
    let qr: QrPayload = serde_json::from_str(payload)
        .map_err(|e| CliError::InvalidArgument(format!("bad QR payload: {}", e)))?;
    if args.device_name.is_none() {
        args.device_name = qr.name;
    }
    if args.session.pop.is_none() {
        args.session.pop = qr.pop;
    }
    if args.session.sec2_username.is_none() {
        args.session.sec2_username = qr.username;
    }
    if args.session.sec2_password.is_none() {
        args.session.sec2_password = qr.password;
    }
    if let Some(qr_transport) = qr.transport {
        let flag = args.transport;
        let matches_flag = match flag {
            crate::cli::TransportChoice::Ble => qr_transport == "ble",
            crate::cli::TransportChoice::Softap => qr_transport == "softap",
            _ => true,
        };
        if !matches_flag {
            eprintln!(
                "Note: QR code suggests the {} transport, using {} as requested",
                qr_transport, flag_name(flag)
            );
        }
    }
    Ok(())
}

fn flag_name(choice: crate::cli::TransportChoice) -> &'static str {
    match choice {
        crate::cli::TransportChoice::Ble => "ble",
        crate::cli::TransportChoice::Softap => "softap",
        crate::cli::TransportChoice::Network => "network",
        crate::cli::TransportChoice::Console => "console",
    }
}
