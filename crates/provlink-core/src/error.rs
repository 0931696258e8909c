//! Error types for provlink core.

use thiserror::Error;

/// Core error type for shared operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Transport-level errors (connect/send/receive).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No device found: {0}")]
    NotFound(String),

    #[error("Device unreachable: {0}")]
    Unreachable(String),

    #[error("Request to '{endpoint}' timed out")]
    Timeout { endpoint: String },

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Device responded with HTTP status {0}")]
    HttpStatus(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Security session errors.
///
/// Authentication and integrity failures are always fatal for the session.
/// They must never be downgraded to a weaker scheme or plaintext.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Ciphertext integrity check failed")]
    Integrity,

    #[error("Security scheme mismatch: device offered {device}, expected {expected}")]
    SchemeMismatch { device: u8, expected: u8 },

    #[error("Handshake protocol violation: {0}")]
    HandshakeState(String),

    #[error("Proof of Possession required but not provided")]
    PopRequired,

    #[error("SRP credentials required for security scheme 2")]
    CredentialsRequired,
}

/// Endpoint payload and chunking errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Chunk reassembly failed: {0}")]
    Reassembly(String),

    #[error("Failed to decode endpoint payload: {0}")]
    Decode(String),

    #[error("Device rejected request: {0}")]
    Rejected(String),

    #[error("Device does not support capability '{0}'")]
    CapabilityMissing(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cloud collaborator errors.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("No profile configured; run 'provlink profile set' first")]
    NoProfile,

    #[error("Proxy report forwarding failed: {0}")]
    ProxyReportFailed(String),

    #[error("Mapping request failed: {0}")]
    MappingFailed(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Profile storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access storage directory: {0}")]
    DirectoryAccess(String),

    #[error("Invalid profile name: {0}")]
    InvalidName(String),

    #[error("Profile not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
