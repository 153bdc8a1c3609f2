//! Error types for the tunnel engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during engine operations
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to parse configuration file
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Malformed host:port or ip:port address string
    #[error("invalid address: {0}")]
    Address(String),

    /// Name resolution failed on every available path
    #[error("resolve failed for {host}: {reason}")]
    Resolve { host: String, reason: String },

    /// DNS message build/parse error
    #[error("DNS error: {0}")]
    Dns(String),

    /// Upstream proxy rejected or mishandled a CONNECT
    #[error("upstream proxy error: {0}")]
    Proxy(String),

    /// Tunnel transport failure
    #[error("tunnel error: {0}")]
    Tunnel(String),

    /// Malformed packet
    #[error("packet error: {0}")]
    Packet(#[from] veil_tcpip::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
