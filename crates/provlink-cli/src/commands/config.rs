//! Config command: chunked raw config read, optionally forwarded to the
//! cloud proxy as a signed report.

use std::time::Duration;

use chrono::Utc;

use provlink_core::cloud::{CloudClient, ProxyKind};
use provlink_core::error::CoreError;
use provlink_core::localctrl;
use provlink_core::storage::ProfileStore;

use crate::cli::{ConfigArgs, ConfigCommands, ConfigGetArgs};
use crate::commands::params::http_get;
use crate::error::{CliError, Result};
use crate::output::get_formatter;
use crate::target;

/// Run the config command
pub async fn run_config(args: ConfigArgs, timeout: u64, json: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Get(args) => run_get(args, timeout, json).await,
    }
}

async fn run_get(args: ConfigGetArgs, timeout: u64, json: bool) -> Result<()> {
    let formatter = get_formatter(json);
    let request_timeout = Duration::from_secs(timeout);

    if args.local {
        let value = http_get(Some(&args.node), &args.target, "config", request_timeout).await?;
        println!("{}", formatter.format_value(&value));
        return Ok(());
    }

    if args.proxy_report {
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

        let result =
            localctrl::proxy_report(&mut conn, &cloud, &node_id, ProxyKind::Config, timestamp)
                .await
                .map_err(CliError::from);
        let outcome = target::finish(conn, result).await?;

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
        let result = localctrl::get_config(&mut conn).await.map_err(CliError::from);
        let value = target::finish(conn, result).await?;
        println!("{}", formatter.format_value(&value));
        Ok(())
    }
}
