//! File-backed dataset resolver.
//!
//! Holds up to four dataset handles (city, country, asn, anonymous),
//! each behind an atomically swappable reader, so a refresh can replace
//! the backing file while concurrent lookups keep reading the generation
//! they started with. Which handles exist, and whether they download from
//! a static URL or a credentialed vendor edition, is pure configuration;
//! one type covers every file-backed vendor.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use maxminddb::{geoip2, MaxMindDBError, Reader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{DatasetKind, DatasetSettings, DownloadSettings, SourceSettings};
use crate::error::{GeoError, Result};
use crate::fetch::{FetchPlan, Fetcher, Transport};
use crate::record::GeoRecord;
use crate::resolver::Resolver;

type DbReader = Reader<Vec<u8>>;

/// One backing dataset: where it lives, how it refreshes, and the open
/// reader handle. The handle is either present and usable or absent,
/// never partially valid, and is replaced wholesale, never mutated.
struct DatasetHandle {
    kind: DatasetKind,
    path: Option<PathBuf>,
    url: Option<String>,
    edition: Option<String>,
    reader: ArcSwapOption<DbReader>,
}

impl DatasetHandle {
    fn new(kind: DatasetKind, settings: Option<&DatasetSettings>) -> Self {
        DatasetHandle {
            kind,
            path: settings.and_then(|s| s.path.clone()),
            url: settings.and_then(|s| s.url.clone()),
            edition: settings.and_then(|s| s.edition.clone()),
            reader: ArcSwapOption::empty(),
        }
    }

    /// Opens the dataset file and swaps the new reader in. An
    /// unconfigured dataset is not an error; a configured but missing or
    /// unreadable file is.
    fn open(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if !path.is_file() {
            self.reader.store(None);
            return Err(GeoError::Configuration(format!(
                "dataset file not found: {}",
                path.display()
            )));
        }
        let reader = Reader::open_readfile(path)
            .map_err(|err| GeoError::SourceRead(err.to_string()))?;
        self.reader.store(Some(Arc::new(reader)));
        Ok(())
    }

    fn close(&self) {
        self.reader.store(None);
    }

    /// Concurrent lookups hold the returned generation for their whole
    /// query, so a swap mid-lookup is invisible to them.
    fn reader(&self) -> Option<Arc<DbReader>> {
        self.reader.load_full()
    }
}

pub struct DatasetResolver {
    name: String,
    download: DownloadSettings,
    city: DatasetHandle,
    country: DatasetHandle,
    asn: DatasetHandle,
    anonymous: DatasetHandle,
    fetcher: Fetcher,
    /// Single-flight guard: one refresh per resolver at a time.
    refresh_gate: Mutex<()>,
}

impl DatasetResolver {
    pub fn from_settings(name: &str, settings: &SourceSettings) -> Result<Self> {
        let handle = |kind| DatasetHandle::new(kind, settings.datasets.get(&kind));
        Ok(DatasetResolver {
            name: name.to_string(),
            download: settings.download.clone(),
            city: handle(DatasetKind::City),
            country: handle(DatasetKind::Country),
            asn: handle(DatasetKind::Asn),
            anonymous: handle(DatasetKind::Anonymous),
            fetcher: Fetcher::new()?,
            refresh_gate: Mutex::new(()),
        })
    }

    fn handles(&self) -> [&DatasetHandle; 4] {
        [&self.city, &self.country, &self.asn, &self.anonymous]
    }

    /// Reopens every configured handle, continuing past failures so a
    /// partially configured source still serves what it can. The first
    /// failure is reported once all handles were attempted.
    fn load_handles(&self) -> Result<()> {
        let mut first_error = None;
        for handle in self.handles() {
            if let Err(err) = handle.open() {
                warn!(source = %self.name, dataset = %handle.kind, %err, "failed to load dataset");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Downloads one dataset if it has a remote configured. A dataset
    /// with a remote but no local path is a configuration error; one
    /// with no remote at all is local-only and skipped.
    async fn sync_dataset(&self, handle: &DatasetHandle) -> Result<()> {
        let transport = if !self.download.license_key.is_empty() {
            let Some(edition) = &handle.edition else {
                debug!(source = %self.name, dataset = %handle.kind, "no edition configured, skipping download");
                return Ok(());
            };
            if self.download.account_id.is_empty() {
                return Err(GeoError::Configuration(format!(
                    "account_id is required for credentialed downloads of source '{}'",
                    self.name
                )));
            }
            Transport::Vendor {
                url: format!(
                    "{}/{}/download?suffix=tar.gz",
                    self.download.endpoint.trim_end_matches('/'),
                    edition
                ),
                account_id: self.download.account_id.clone(),
                license_key: self.download.license_key.clone(),
            }
        } else {
            let Some(url) = &handle.url else {
                debug!(source = %self.name, dataset = %handle.kind, "no download url configured, skipping");
                return Ok(());
            };
            let url = url::Url::parse(url).map_err(|err| {
                GeoError::Configuration(format!(
                    "invalid download url for the {} dataset of source '{}': {err}",
                    handle.kind, self.name
                ))
            })?;
            Transport::Static { url: url.into() }
        };

        let Some(path) = &handle.path else {
            return Err(GeoError::Configuration(format!(
                "no local path configured for the {} dataset of source '{}'",
                handle.kind, self.name
            )));
        };

        self.fetcher
            .sync(&FetchPlan {
                transport,
                destination: path.clone(),
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Resolver for DatasetResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        info!(source = %self.name, "starting resolver");
        if !self.download.enabled {
            warn!(source = %self.name, "downloads disabled, loading existing datasets");
            if let Err(err) = self.load_handles() {
                warn!(source = %self.name, %err, "failed to load existing datasets");
            }
            return Ok(());
        }
        self.refresh().await
    }

    async fn lookup(&self, address: &str, as_fallback: bool) -> Result<Option<GeoRecord>> {
        let ip = IpAddr::from_str(address).map_err(|_| GeoError::InvalidAddress)?;

        let mut record = GeoRecord::new(address, &self.name, as_fallback);
        let mut found = false;

        if let Some(reader) = self.asn.reader() {
            match reader.lookup::<geoip2::Asn>(ip) {
                Ok(doc) => {
                    record.apply_asn(&doc);
                    found = true;
                }
                Err(MaxMindDBError::AddressNotFoundError(_)) => {}
                Err(err) => return Err(GeoError::SourceRead(err.to_string())),
            }
        }

        if let Some(reader) = self.city.reader() {
            match reader.lookup::<geoip2::City>(ip) {
                Ok(doc) => {
                    record.apply_city(&doc);
                    found = true;
                }
                Err(MaxMindDBError::AddressNotFoundError(_)) => {}
                Err(err) => return Err(GeoError::SourceRead(err.to_string())),
            }
        } else if let Some(reader) = self.country.reader() {
            // country-only sources answer with country data; has_city
            // stays false
            match reader.lookup::<geoip2::Country>(ip) {
                Ok(doc) => {
                    record.apply_country(&doc);
                    found = true;
                }
                Err(MaxMindDBError::AddressNotFoundError(_)) => {}
                Err(err) => return Err(GeoError::SourceRead(err.to_string())),
            }
        }

        if let Some(reader) = self.anonymous.reader() {
            match reader.lookup::<geoip2::AnonymousIp>(ip) {
                Ok(doc) => {
                    record.apply_anonymous(&doc);
                    found = true;
                }
                Err(MaxMindDBError::AddressNotFoundError(_)) => {}
                Err(err) => return Err(GeoError::SourceRead(err.to_string())),
            }
        }

        Ok(found.then_some(record))
    }

    async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_gate.lock().await;
        info!(source = %self.name, "refreshing resolver");
        for handle in self.handles() {
            self.sync_dataset(handle).await?;
        }
        self.load_handles()
    }

    async fn shutdown(&self) {
        info!(source = %self.name, "shutting down resolver");
        for handle in self.handles() {
            handle.close();
        }
    }
}
