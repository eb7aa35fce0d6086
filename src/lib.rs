//! geolookup: IP geolocation microservice.
//!
//! Resolves client-supplied IP addresses into normalized geolocation
//! records by querying interchangeable sources: local dataset files,
//! remote lookup APIs, or an ordered cascade that falls back across
//! them. An adaptive cache sits in front of the resolvers, and a
//! background pipeline keeps dataset files fresh through conditional
//! downloads and atomic replacement, so lookups never observe a
//! half-written file or a torn reader handle.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use geolookup::config::Settings;
//! use geolookup::resolver::SourceRegistry;
//!
//! # fn main() -> geolookup::Result<()> {
//! let settings = Settings::load(None)?;
//! let registry = SourceRegistry::from_settings(&settings)?;
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// The normalized record every resolver produces
pub mod record;

// Settings file + environment overrides
pub mod config;

// Cache-aside layer with adaptive eviction
pub mod cache;

// Conditional download and atomic replacement
pub mod fetch;

// Resolver variants and the registry over them
pub mod resolver;

// HTTP shell
pub mod server;

pub use error::{GeoError, Result};
pub use record::GeoRecord;
pub use resolver::{CascadeResolver, Resolver, SourceRegistry};
