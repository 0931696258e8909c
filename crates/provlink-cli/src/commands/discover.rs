//! Discover command implementation.

use std::time::Duration;

use provlink_core::discovery;

use crate::cli::DiscoverArgs;
use crate::error::CliError;
use crate::output::get_formatter;

/// Run the discover command
pub async fn run_discover(args: DiscoverArgs, json: bool) -> Result<(), CliError> {
    let formatter = get_formatter(json);

    if !json {
        println!("Discovering nodes for {} seconds...", args.discovery_timeout);
    }

    let records = discovery::discover(Duration::from_secs(args.discovery_timeout)).await?;

    println!("{}", formatter.format_records(&records));

    if records.is_empty() {
        return Err(CliError::NoNodesFound);
    }

    Ok(())
}
