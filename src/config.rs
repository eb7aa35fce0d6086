//! Service configuration.
//!
//! Settings load from a YAML file (path from argv or `GEOLOOKUP_CONFIG`),
//! with secrets overridable through environment variables so credentials
//! never need to live on disk. A missing file yields the defaults.
//!
//! The tree mirrors the flag surface of the service: API binding, logging,
//! cache sizing, refresh interval, a map of named sources (file-backed
//! dataset sources or remote lookup APIs) and the cascade membership.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{GeoError, Result};

/// Default vendor endpoint for credentialed dataset downloads.
const DEFAULT_DOWNLOAD_ENDPOINT: &str = "https://download.maxmind.com/geoip/databases";
/// Default endpoint for remote-API sources.
const DEFAULT_API_ENDPOINT: &str = "https://api.ipstack.com";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub log: LogSettings,
    pub cache: CacheSettings,
    /// Seconds between background refresh runs.
    pub refresh_interval_secs: u64,
    /// Source used when a request names none.
    pub default_source: String,
    pub sources: BTreeMap<String, SourceSettings>,
    pub cascade: CascadeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api: ApiSettings::default(),
            log: LogSettings::default(),
            cache: CacheSettings::default(),
            refresh_interval_secs: 24 * 60 * 60,
            default_source: "maxmind".to_string(),
            sources: BTreeMap::new(),
            cascade: CascadeSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub binding: String,
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            binding: "0.0.0.0".to_string(),
            port: 9912,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            enabled: true,
            capacity: 128,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CascadeSettings {
    pub enabled: bool,
    pub stop_on_error: bool,
    pub members: Vec<String>,
}

/// Which resolver variant a source name maps to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Local dataset files (optionally kept fresh by downloads).
    #[default]
    Datasets,
    /// A remote lookup API queried per request.
    Api,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub enabled: bool,
    pub kind: SourceKind,
    pub datasets: BTreeMap<DatasetKind, DatasetSettings>,
    pub download: DownloadSettings,
    pub api: ApiSourceSettings,
}

/// The capabilities a file-backed source can carry, one dataset each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    City,
    Country,
    Asn,
    Anonymous,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatasetKind::City => "city",
            DatasetKind::Country => "country",
            DatasetKind::Asn => "asn",
            DatasetKind::Anonymous => "anonymous",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    /// Where the dataset file lives locally. Required whenever a remote
    /// is configured; a dataset with only a path is local-only.
    pub path: Option<PathBuf>,
    /// Pre-signed or public download URL.
    pub url: Option<String>,
    /// Vendor edition id for credentialed downloads.
    pub edition: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub enabled: bool,
    pub account_id: String,
    pub license_key: String,
    pub endpoint: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        DownloadSettings {
            enabled: false,
            account_id: String::new(),
            license_key: String::new(),
            endpoint: DEFAULT_DOWNLOAD_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSourceSettings {
    pub key: String,
    pub endpoint: String,
}

impl Default for ApiSourceSettings {
    fn default() -> Self {
        ApiSourceSettings {
            key: String::new(),
            endpoint: DEFAULT_API_ENDPOINT.to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, or the defaults when no path is given.
    /// Environment overrides for secrets are applied either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|err| {
                    GeoError::Configuration(format!(
                        "cannot read config file {}: {err}",
                        path.display()
                    ))
                })?;
                serde_yaml::from_str(&raw).map_err(|err| {
                    GeoError::Configuration(format!(
                        "invalid config file {}: {err}",
                        path.display()
                    ))
                })?
            }
            None => Settings::default(),
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Credentials can come from `GEOLOOKUP_SOURCES_<NAME>_ACCOUNT_ID`,
    /// `..._LICENSE_KEY` and `..._API_KEY` instead of the config file.
    pub fn apply_env_overrides(&mut self) {
        for (name, source) in self.sources.iter_mut() {
            let prefix = format!(
                "GEOLOOKUP_SOURCES_{}",
                name.to_uppercase().replace('-', "_")
            );
            if let Ok(value) = std::env::var(format!("{prefix}_ACCOUNT_ID")) {
                source.download.account_id = value;
            }
            if let Ok(value) = std::env::var(format!("{prefix}_LICENSE_KEY")) {
                source.download.license_key = value;
            }
            if let Ok(value) = std::env::var(format!("{prefix}_API_KEY")) {
                source.api.key = value;
            }
        }
    }
}
