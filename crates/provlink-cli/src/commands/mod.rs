//! Command implementations.

pub mod config;
pub mod discover;
pub mod params;
pub mod profile;
pub mod provision;

pub use config::run_config;
pub use discover::run_discover;
pub use params::run_params;
pub use profile::run_profile;
pub use provision::run_provision;
