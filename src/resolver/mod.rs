//! Source resolvers and the cascade fallback chain.
//!
//! Every source, whether file-backed datasets, a remote lookup API, or
//! the cascade over other sources, implements the same capability
//! interface:
//! start, lookup, refresh, shutdown. The set of active resolvers is built
//! once at startup from configuration and passed explicitly to whoever
//! needs it; there is no ambient global lookup.

mod cascade;
mod dataset;
mod remote;

pub use cascade::CascadeResolver;
pub use dataset::DatasetResolver;
pub use remote::ApiResolver;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::{Settings, SourceKind};
use crate::error::{GeoError, Result};
use crate::record::GeoRecord;

/// Name the cascade registers under.
pub const CASCADE_SOURCE: &str = "cascade";

/// One geolocation source.
///
/// Lookups return `Ok(None)` when no backing dataset knows the address;
/// errors are reserved for invalid input and genuine read failures.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Name this resolver answers to; stamped on every record it returns.
    fn name(&self) -> &str;

    /// Opens the configured backing datasets. A missing or unreadable
    /// dataset degrades that capability rather than failing startup.
    async fn start(&self) -> Result<()>;

    /// Resolves `address`, stamping `as_fallback` onto the record
    /// unchanged; callers decide the flag, the resolver does not infer
    /// it.
    async fn lookup(&self, address: &str, as_fallback: bool) -> Result<Option<GeoRecord>>;

    /// Brings backing datasets up to date and swaps in fresh handles.
    async fn refresh(&self) -> Result<()>;

    /// Releases all open handles. Idempotent.
    async fn shutdown(&self);
}

impl std::fmt::Debug for dyn Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").field("name", &self.name()).finish()
    }
}

/// The set of active resolvers, keyed by source name.
#[derive(Debug)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Resolver>>,
    /// Non-cascade sources, in configuration order; these own their
    /// lifecycle and are the ones the refresh timer drives.
    standalone: Vec<String>,
    default_source: String,
}

impl SourceRegistry {
    /// Builds every enabled source, then the cascade over them. Unknown
    /// cascade members and a disabled default source are configuration
    /// errors.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut sources: HashMap<String, Arc<dyn Resolver>> = HashMap::new();
        let mut standalone = Vec::new();

        for (name, source) in &settings.sources {
            if !source.enabled {
                continue;
            }
            info!(source = %name, kind = ?source.kind, "registering source");
            let resolver: Arc<dyn Resolver> = match source.kind {
                SourceKind::Datasets => Arc::new(DatasetResolver::from_settings(name, source)?),
                SourceKind::Api => Arc::new(ApiResolver::from_settings(name, source)?),
            };
            sources.insert(name.clone(), resolver);
            standalone.push(name.clone());
        }

        if settings.cascade.enabled {
            let mut members = Vec::new();
            for member in &settings.cascade.members {
                let resolver = sources
                    .get(member)
                    .ok_or_else(|| GeoError::UnknownSource(member.clone()))?;
                info!(source = %member, "adding source to cascade");
                members.push(Arc::clone(resolver));
            }
            sources.insert(
                CASCADE_SOURCE.to_string(),
                Arc::new(CascadeResolver::new(settings.cascade.stop_on_error, members)),
            );
        }

        if !sources.contains_key(&settings.default_source) {
            return Err(GeoError::Configuration(format!(
                "default source '{}' is not enabled",
                settings.default_source
            )));
        }

        Ok(SourceRegistry {
            sources,
            standalone,
            default_source: settings.default_source.clone(),
        })
    }

    /// Registry over pre-built resolvers; the injection seam the shell and
    /// the tests share.
    pub fn new(
        sources: HashMap<String, Arc<dyn Resolver>>,
        default_source: impl Into<String>,
    ) -> Self {
        let mut standalone: Vec<String> = sources
            .keys()
            .filter(|name| name.as_str() != CASCADE_SOURCE)
            .cloned()
            .collect();
        standalone.sort();
        SourceRegistry {
            sources,
            standalone,
            default_source: default_source.into(),
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Resolver>> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| GeoError::UnknownSource(name.to_string()))
    }

    pub fn default_source(&self) -> &str {
        &self.default_source
    }

    /// Starts every standalone source; failures degrade the source
    /// instead of aborting.
    pub async fn start_all(&self) {
        for name in &self.standalone {
            if let Err(err) = self.sources[name].start().await {
                warn!(source = %name, %err, "source failed to start");
            }
        }
    }

    /// One refresh pass over the standalone sources; per-source failures
    /// are logged and the pass continues.
    pub async fn refresh_all(&self) {
        for name in &self.standalone {
            if let Err(err) = self.sources[name].refresh().await {
                error!(source = %name, %err, "failed to refresh source");
            }
        }
    }

    pub async fn shutdown_all(&self) {
        for name in &self.standalone {
            self.sources[name].shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CascadeSettings, SourceSettings};

    #[test]
    fn test_unknown_source_is_a_client_error() {
        let registry = SourceRegistry::new(HashMap::new(), "nothing");
        let err = registry.get("nope").unwrap_err();
        assert!(matches!(err, GeoError::UnknownSource(name) if name == "nope"));
    }

    #[test]
    fn test_disabled_default_source_rejects_settings() {
        let mut settings = Settings::default();
        settings.default_source = "beta".to_string();
        settings
            .sources
            .insert("beta".to_string(), SourceSettings::default()); // not enabled
        let err = SourceRegistry::from_settings(&settings).unwrap_err();
        assert!(matches!(err, GeoError::Configuration(_)));
    }

    #[test]
    fn test_cascade_member_must_be_an_enabled_source() {
        let mut settings = Settings::default();
        settings.default_source = CASCADE_SOURCE.to_string();
        settings.cascade = CascadeSettings {
            enabled: true,
            stop_on_error: false,
            members: vec!["ghost".to_string()],
        };
        let err = SourceRegistry::from_settings(&settings).unwrap_err();
        assert!(matches!(err, GeoError::UnknownSource(name) if name == "ghost"));
    }

    #[test]
    fn test_enabled_sources_register_with_cascade() {
        let mut settings = Settings::default();
        settings.default_source = "beta".to_string();
        settings.sources.insert(
            "beta".to_string(),
            SourceSettings {
                enabled: true,
                ..SourceSettings::default()
            },
        );
        settings.cascade = CascadeSettings {
            enabled: true,
            stop_on_error: true,
            members: vec!["beta".to_string()],
        };

        let registry = SourceRegistry::from_settings(&settings).unwrap();
        assert!(registry.get("beta").is_ok());
        assert!(registry.get(CASCADE_SOURCE).is_ok());
        assert_eq!(registry.default_source(), "beta");
    }
}
