//! Error types for the geolookup service.
//!
//! A single [`GeoError`] enum covers the whole taxonomy so callers can
//! branch on kind: client-input failures (`InvalidAddress`,
//! `UnknownSource`), per-request read failures (`SourceRead`) and
//! refresh-time failures (`Configuration`, `ArchiveFormat`, `Replace`).
//! A lookup that finds nothing is `Ok(None)`, never an error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoError {
    /// The client-supplied address is not a valid IPv4 or IPv6 literal.
    #[error("invalid IP address")]
    InvalidAddress,

    /// The requested source name is not registered.
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    /// An open dataset reader failed on a query it should support.
    #[error("source read failed: {0}")]
    SourceRead(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// The downloaded archive carries no entry with the expected extension.
    #[error("no '{extension}' entry found in archive")]
    ArchiveFormat { extension: String },

    /// The atomic rename over the destination file failed; the previously
    /// served file is untouched.
    #[error("failed to replace dataset file: {0}")]
    Replace(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl GeoError {
    /// True when the failure was caused by client input rather than
    /// server-side state; the HTTP shell maps these to 400 responses.
    pub fn is_client_error(&self) -> bool {
        matches!(self, GeoError::InvalidAddress | GeoError::UnknownSource(_))
    }
}

pub type Result<T> = std::result::Result<T, GeoError>;
