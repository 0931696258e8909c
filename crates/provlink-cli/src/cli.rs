//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// provlink - provision and control IoT nodes
#[derive(Parser, Debug)]
#[command(name = "provlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value = "10", env = "PROVLINK_TIMEOUT")]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover nodes on the local network via mDNS
    Discover(DiscoverArgs),

    /// Provision a node: handshake, account association, Wi-Fi setup
    Provision(ProvisionArgs),

    /// Read or write node parameters
    Params(ParamsArgs),

    /// Read node configuration
    Config(ConfigArgs),

    /// Cloud profile management
    Profile(ProfileArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportChoice {
    /// Bluetooth Low Energy (GATT)
    Ble,
    /// HTTP against the device's setup access point
    Softap,
    /// HTTP against a node already on the local network
    Network,
    /// Line-framed serial console
    Console,
}

// ==================== Shared flag groups ====================

/// Security/session flags shared by every command that opens a session.
#[derive(Args, Debug, Clone, Default)]
pub struct SessionFlags {
    /// Proof of possession printed on or derived from the device
    #[arg(long = "pop")]
    pub pop: Option<String>,

    /// Pin the security scheme (0, 1 or 2) instead of auto-detecting
    #[arg(long = "sec_ver")]
    pub sec_ver: Option<u8>,

    /// SRP username (Sec2 only)
    #[arg(long = "sec2_username")]
    pub sec2_username: Option<String>,

    /// SRP password (Sec2 only)
    #[arg(long = "sec2_password")]
    pub sec2_password: Option<String>,
}

/// Target addressing flags shared by params/config.
#[derive(Args, Debug, Clone)]
pub struct TargetFlags {
    /// Transport to reach the node over (default: network)
    #[arg(long, value_enum)]
    pub transport: Option<TransportChoice>,

    /// Advertised BLE name (e.g. PROV_d76c30)
    #[arg(long = "device_name")]
    pub device_name: Option<String>,

    /// Skip discovery and connect to this IP
    #[arg(long = "device-ip")]
    pub device_ip: Option<String>,

    /// Skip discovery and connect to this hostname (serial device path for
    /// the console transport)
    #[arg(long = "device-host")]
    pub device_host: Option<String>,

    /// HTTP port on the device
    #[arg(long = "device-port", default_value = "80")]
    pub device_port: u16,

    /// mDNS discovery window in seconds
    #[arg(long = "discovery-timeout", default_value = "5")]
    pub discovery_timeout: u64,
}

// ==================== Discover ====================

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Discovery window in seconds
    #[arg(long = "discovery-timeout", default_value = "5")]
    pub discovery_timeout: u64,
}

// ==================== Provision ====================

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Transport to provision over
    #[arg(long, value_enum)]
    pub transport: TransportChoice,

    #[command(flatten)]
    pub session: SessionFlags,

    /// Advertised BLE name (e.g. PROV_d76c30)
    #[arg(long = "device_name")]
    pub device_name: Option<String>,

    /// Device IP (SoftAP default: 192.168.4.1)
    #[arg(long = "device-ip")]
    pub device_ip: Option<String>,

    /// Device hostname (serial device path for the console transport)
    #[arg(long = "device-host")]
    pub device_host: Option<String>,

    /// HTTP port on the device
    #[arg(long = "device-port", default_value = "80")]
    pub device_port: u16,

    /// Wi-Fi network to configure; scans interactively when omitted
    #[arg(long)]
    pub ssid: Option<String>,

    /// Wi-Fi passphrase
    #[arg(long)]
    pub passphrase: Option<String>,

    /// Provisioning QR code payload (JSON with name/pop/transport)
    #[arg(long)]
    pub qrcode: Option<String>,

    /// Associate only; skip Wi-Fi scan, config and verification
    #[arg(long = "no-wifi")]
    pub no_wifi: bool,

    /// Fail on the first Wi-Fi error instead of resetting and retrying
    #[arg(long = "no-retry")]
    pub no_retry: bool,

    /// Disable the challenge-response capability after association
    #[arg(long = "disable-chal-resp", overrides_with = "no_disable_chal_resp")]
    pub disable_chal_resp: bool,

    /// Keep the challenge-response capability enabled
    #[arg(long = "no-disable-chal-resp", overrides_with = "disable_chal_resp")]
    pub no_disable_chal_resp: bool,

    /// mDNS discovery window in seconds (network transport)
    #[arg(long = "discovery-timeout", default_value = "5")]
    pub discovery_timeout: u64,
}

impl ProvisionArgs {
    /// `None` leaves the transport-specific default in force.
    pub fn chal_resp_choice(&self) -> Option<bool> {
        if self.disable_chal_resp {
            Some(true)
        } else if self.no_disable_chal_resp {
            Some(false)
        } else {
            None
        }
    }
}

// ==================== Params ====================

#[derive(Args, Debug)]
pub struct ParamsArgs {
    #[command(subcommand)]
    pub command: ParamsCommands,
}

#[derive(Subcommand, Debug)]
pub enum ParamsCommands {
    /// Read current parameter values
    Get(ParamsGetArgs),

    /// Write parameter values
    Set(ParamsSetArgs),
}

#[derive(Args, Debug)]
pub struct ParamsGetArgs {
    /// Node id (filters discovery, names the cloud proxy path)
    pub node: String,

    #[command(flatten)]
    pub target: TargetFlags,

    #[command(flatten)]
    pub session: SessionFlags,

    /// Plain HTTP property read, no session (network transport only)
    #[arg(long, conflicts_with = "local_raw")]
    pub local: bool,

    /// Raw endpoint read over an encrypted session (the default)
    #[arg(long = "local-raw")]
    pub local_raw: bool,

    /// Forward a device-signed report to the cloud proxy
    #[arg(long = "proxy-report")]
    pub proxy_report: bool,

    /// Use the initparams proxy endpoint instead of params
    #[arg(long, requires = "proxy_report")]
    pub init: bool,

    /// Unix timestamp for the signed report (default: now)
    #[arg(long, requires = "proxy_report")]
    pub timestamp: Option<i64>,
}

#[derive(Args, Debug)]
pub struct ParamsSetArgs {
    /// Node id (filters discovery)
    pub node: String,

    #[command(flatten)]
    pub target: TargetFlags,

    #[command(flatten)]
    pub session: SessionFlags,

    /// Plain HTTP property write, no session (network transport only)
    #[arg(long)]
    pub local: bool,

    /// Parameter values as a JSON object
    #[arg(long)]
    pub data: String,
}

// ==================== Config ====================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Read the node configuration (devices, services, attributes)
    Get(ConfigGetArgs),
}

#[derive(Args, Debug)]
pub struct ConfigGetArgs {
    /// Node id (filters discovery, names the cloud proxy path)
    pub node: String,

    #[command(flatten)]
    pub target: TargetFlags,

    #[command(flatten)]
    pub session: SessionFlags,

    /// Plain HTTP property read, no session (network transport only)
    #[arg(long)]
    pub local: bool,

    /// Forward a device-signed config report to the cloud proxy
    #[arg(long = "proxy-report")]
    pub proxy_report: bool,

    /// Unix timestamp for the signed report (default: now)
    #[arg(long, requires = "proxy_report")]
    pub timestamp: Option<i64>,
}

// ==================== Profile ====================

#[derive(Args, Debug)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub command: ProfileCommands,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Save a cloud profile and make it current
    Set(ProfileSetArgs),

    /// Show the current profile and list the saved ones
    Show,

    /// Delete a saved profile
    Delete(ProfileDeleteArgs),
}

#[derive(Args, Debug)]
pub struct ProfileSetArgs {
    /// Profile name
    pub name: String,

    /// Cloud API base URL
    #[arg(long = "base-url")]
    pub base_url: String,

    /// Access token sent as the Authorization header
    #[arg(long = "access-token")]
    pub access_token: String,

    /// Account identifier used for association
    #[arg(long = "user-id")]
    pub user_id: String,
}

#[derive(Args, Debug)]
pub struct ProfileDeleteArgs {
    /// Profile name
    pub name: String,
}
