//! Params commands: raw reads/writes over a session, plain HTTP property
//! access with `--local`, and signed-report forwarding to the cloud proxy.

use std::time::Duration;

use chrono::Utc;

use provlink_core::cloud::{CloudClient, ProxyKind};
use provlink_core::error::CoreError;
use provlink_core::localctrl;
use provlink_core::storage::ProfileStore;
use provlink_core::transport::http::HttpTransport;
use provlink_core::transport::AnyTransport;

use crate::cli::{ParamsArgs, ParamsCommands, ParamsGetArgs, ParamsSetArgs, TargetFlags};
use crate::error::{CliError, Result};
use crate::output::get_formatter;
use crate::target;

/// Run the params command
pub async fn run_params(args: ParamsArgs, timeout: u64, json: bool) -> Result<()> {
    match args.command {
        ParamsCommands::Get(args) => run_get(args, timeout, json).await,
        ParamsCommands::Set(args) => run_set(args, timeout, json).await,
    }
}

async fn run_get(args: ParamsGetArgs, timeout: u64, json: bool) -> Result<()> {
    let formatter = get_formatter(json);
    let request_timeout = Duration::from_secs(timeout);

    // Raw session reads are the default; --local selects the property path.
    if args.local && !args.local_raw {
        let value = http_get(Some(&args.node), &args.target, "params", request_timeout).await?;
        println!("{}", formatter.format_value(&value));
        return Ok(());
    }

    if args.proxy_report {
        // Resolve the cloud profile before connecting so a missing profile
        // never leaves a session open.
        let store = ProfileStore::open().map_err(CoreError::Storage)?;
        let profile = store.current().await.map_err(|_| CliError::NoProfile)?;
        let cloud = CloudClient::from_profile(&profile).map_err(CoreError::Cloud)?;

        let (mut conn, record) =
            target::open_session(&args.node, &args.target, &args.session, request_timeout)
                .await?;
        let node_id = record
            .map(|r| r.node_id)
            .unwrap_or_else(|| args.node.clone());
        let timestamp = args.timestamp.unwrap_or_else(|| Utc::now().timestamp());
        let kind = if args.init {
            ProxyKind::InitParams
        } else {
            ProxyKind::Params
        };

        let result = localctrl::proxy_report(&mut conn, &cloud, &node_id, kind, timestamp)
            .await
            .map_err(CliError::from);
        let outcome = target::finish(conn, result).await?;

        // The local read is shown even when forwarding failed.
        let data = outcome.report.data_json().map_err(CoreError::Protocol)?;
        println!("{}", formatter.format_value(&data));
        match outcome.ack {
            Ok(ack) => {
                if !json {
                    println!("Report forwarded: {} {}", ack.status, ack.description);
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    } else {
        let (mut conn, _) =
            target::open_session(&args.node, &args.target, &args.session, request_timeout)
                .await?;
        let result = localctrl::get_params(&mut conn).await.map_err(CliError::from);
        let value = target::finish(conn, result).await?;
        println!("{}", formatter.format_value(&value));
        Ok(())
    }
}

async fn run_set(args: ParamsSetArgs, timeout: u64, json: bool) -> Result<()> {
    let formatter = get_formatter(json);
    let request_timeout = Duration::from_secs(timeout);

    let data: serde_json::Value = serde_json::from_str(&args.data)
        .map_err(|e| CliError::InvalidArgument(format!("bad --data JSON: {}", e)))?;
    if !data.is_object() {
        return Err(CliError::InvalidArgument(
            "--data must be a JSON object".to_string(),
        ));
    }

    if args.local {
        let (transport, _) =
            target::open_target(Some(&args.node), &args.target, request_timeout).await?;
        let http = as_http(&transport)?;
        http.post_json("params", &data)
            .await
            .map_err(CoreError::Transport)?;
    } else {
        let (mut conn, _) =
            target::open_session(&args.node, &args.target, &args.session, request_timeout)
                .await?;
        let result = localctrl::set_params(&mut conn, &data).await.map_err(CliError::from);
        target::finish(conn, result).await?;
    }

    println!("{}", formatter.format_message("Parameters updated"));
    Ok(())
}

/// Plain HTTP property read, no session framing. `node` filters discovery
/// when the addressing flags do not name a host directly.
pub(crate) async fn http_get(
    node: Option<&str>,
    flags: &TargetFlags,
    path: &str,
    request_timeout: Duration,
) -> Result<serde_json::Value> {
    let (transport, _) = target::open_target(node, flags, request_timeout).await?;
    let http = as_http(&transport)?;
    Ok(http.get_json(path).await.map_err(CoreError::Transport)?)
}

fn as_http(transport: &AnyTransport) -> Result<&HttpTransport> {
    match transport {
        AnyTransport::Http(t) => Ok(t),
        _ => Err(CliError::InvalidArgument(
            "--local needs an HTTP transport (softap or network)".to_string(),
        )),
    }
}
