//! provlink - Command-line interface for provisioning and controlling IoT
//! nodes over BLE, SoftAP, the local network or a serial console.

mod cli;
mod commands;
mod error;
mod output;
mod target;

use clap::Parser;

use cli::{Cli, Commands};
use error::{exit_codes, CliError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Discover(args) => {
            commands::run_discover(args, cli.json).await
        }
        Commands::Provision(args) => {
            commands::run_provision(args, cli.timeout, cli.json).await
        }
        Commands::Params(args) => {
            commands::run_params(args, cli.timeout, cli.json).await
        }
        Commands::Config(args) => {
            commands::run_config(args, cli.timeout, cli.json).await
        }
        Commands::Profile(args) => {
            commands::run_profile(args, cli.json).await
        }
    }
}
