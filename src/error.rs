//! Error types for flowgate

use thiserror::Error;

/// Main error type for flowgate
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("[GeoIP] failed to load geodata for {country}: {reason}")]
    GeoDataLoad { country: String, reason: String },

    #[error("proxy not exist: {0}")]
    ProxyNotFound(String),

    #[error("DNS relay error: {0}")]
    DnsRelay(String),
}

/// Result type alias for flowgate
pub type Result<T> = std::result::Result<T, Error>;
