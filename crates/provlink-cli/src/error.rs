//! Error type and exit-code mapping for the CLI.
//!
//! `CliError` wraps `CoreError` from the library and adds the few variants
//! that only exist at the command layer. The CLI renders reasons and sets
//! the exit status; it never retries anything itself.

use provlink_core::error::CoreError;
use thiserror::Error;

/// Exit codes for the CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NETWORK_ERROR: i32 = 2;
    pub const DEVICE_ERROR: i32 = 3;
    pub const INVALID_ARGS: i32 = 4;
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No nodes found")]
    NoNodesFound,

    #[error("No cloud profile configured; run `provlink profile set` first")]
    NoProfile,

    #[error("{0}")]
    Other(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Core(e) => match e {
                CoreError::Transport(_) => exit_codes::NETWORK_ERROR,
                CoreError::Security(_) => exit_codes::DEVICE_ERROR,
                CoreError::Protocol(_) => exit_codes::DEVICE_ERROR,
                CoreError::Cloud(_) => exit_codes::NETWORK_ERROR,
                CoreError::Storage(_) => exit_codes::GENERAL_ERROR,
                CoreError::Io(_) => exit_codes::GENERAL_ERROR,
                CoreError::Other(_) => exit_codes::GENERAL_ERROR,
            },
            CliError::Io(_) => exit_codes::GENERAL_ERROR,
            CliError::InvalidArgument(_) => exit_codes::INVALID_ARGS,
            CliError::NoNodesFound => exit_codes::GENERAL_ERROR,
            CliError::NoProfile => exit_codes::GENERAL_ERROR,
            CliError::Other(_) => exit_codes::GENERAL_ERROR,
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
