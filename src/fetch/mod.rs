//! Conditional dataset download with atomic replacement.
//!
//! A dataset file is brought up to date in steps that never disturb the
//! file being served: probe the remote for a content fingerprint and skip
//! when the sidecar matches, stream the payload into a temp file in the
//! destination directory, extract the matching archive entry when the
//! payload is an archive, then rename over the destination. The sidecar
//! fingerprint is written only after the rename lands, so an interrupted
//! run re-downloads instead of trusting a stale tag.
//!
//! Two transports are supported: a plain pre-signed/static URL, and a
//! credentialed vendor API (basic auth) whose download redirects to a
//! separate storage host.

mod archive;

pub use archive::extract_archive_entry;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{GeoError, Result};

/// How the remote side of a dataset is addressed and authenticated.
#[derive(Debug, Clone)]
pub enum Transport {
    /// Pre-signed or public URL fetched with plain requests.
    Static { url: String },
    /// Vendor API behind basic auth; the payload is an archive and the
    /// download redirects to a storage location.
    Vendor {
        url: String,
        account_id: String,
        license_key: String,
    },
}

/// One dataset file to keep current.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub transport: Transport,
    pub destination: PathBuf,
}

impl FetchPlan {
    fn is_archive(&self) -> bool {
        match &self.transport {
            Transport::Vendor { .. } => true,
            Transport::Static { url } => url
                .split('?')
                .next()
                .unwrap_or_default()
                .ends_with(".tar.gz"),
        }
    }
}

pub struct Fetcher {
    /// Follows redirects; used for the payload download.
    client: Client,
    /// Redirects disabled so vendor fingerprints come from the vendor
    /// itself, not from the storage host it redirects to.
    probe_client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        let probe_client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Fetcher {
            client,
            probe_client,
        })
    }

    /// Brings `plan.destination` up to date. Returns true when the file
    /// was replaced, false when the remote fingerprint matched the
    /// sidecar and the download was skipped. On any failure the
    /// previously served file is untouched.
    pub async fn sync(&self, plan: &FetchPlan) -> Result<bool> {
        let destination = &plan.destination;
        let parent = destination
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| {
                GeoError::Configuration(format!(
                    "dataset destination {} has no parent directory",
                    destination.display()
                ))
            })?;
        tokio::fs::create_dir_all(parent).await?;

        let fingerprint = self.probe(plan).await?;
        let sidecar = fingerprint_path(destination);
        if let Some(tag) = fingerprint.as_deref() {
            match tokio::fs::read_to_string(&sidecar).await {
                Ok(existing) if existing == tag => {
                    info!(destination = %destination.display(), "dataset unchanged, skipping download");
                    return Ok(false);
                }
                _ => {}
            }
        }

        let payload = self.download(plan, parent).await?;

        let staged = if plan.is_archive() {
            let extension = dataset_extension(destination)?;
            let staged = tempfile::Builder::new()
                .prefix(".geolookup-extract")
                .tempfile_in(parent)?;
            extract_archive_entry(payload.path(), &extension, staged.path())?;
            staged
        } else {
            payload
        };

        // the previously served file stays valid until this rename lands;
        // a failed persist removes the temp file on drop
        staged
            .persist(destination)
            .map_err(|err| GeoError::Replace(err.error))?;

        if let Some(tag) = fingerprint.as_deref() {
            if let Err(err) = tokio::fs::write(&sidecar, tag).await {
                warn!(sidecar = %sidecar.display(), %err, "failed to write fingerprint sidecar");
            }
        }

        info!(destination = %destination.display(), "dataset replaced");
        Ok(true)
    }

    /// Metadata probe; returns the remote's opaque version tag, if it
    /// supplies one.
    async fn probe(&self, plan: &FetchPlan) -> Result<Option<String>> {
        let response = match &plan.transport {
            Transport::Static { url } => {
                self.client.head(url).send().await?.error_for_status()?
            }
            Transport::Vendor {
                url,
                account_id,
                license_key,
            } => self
                .probe_client
                .head(url)
                .basic_auth(account_id, Some(license_key))
                .send()
                .await?
                // redirect statuses are expected here and pass through
                .error_for_status()?,
        };

        Ok(response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim_matches('"').to_string()))
    }

    /// Streams the full payload into a temp file next to the destination.
    async fn download(&self, plan: &FetchPlan, dir: &Path) -> Result<NamedTempFile> {
        let request = match &plan.transport {
            Transport::Static { url } => self.client.get(url),
            // the storage host the vendor redirects to carries its own
            // pre-signed auth; reqwest drops the Authorization header
            // when the redirect leaves the original host
            Transport::Vendor {
                url,
                account_id,
                license_key,
            } => self.client.get(url).basic_auth(account_id, Some(license_key)),
        };

        let mut response = request.send().await?.error_for_status()?;
        let mut temp = tempfile::Builder::new()
            .prefix(".geolookup-download")
            .tempfile_in(dir)?;
        let mut bytes: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            temp.write_all(&chunk)?;
            bytes += chunk.len() as u64;
        }
        temp.flush()?;
        debug!(bytes, "payload downloaded");
        Ok(temp)
    }
}

/// Sidecar file holding the fingerprint of the currently served dataset.
fn fingerprint_path(destination: &Path) -> PathBuf {
    destination.with_extension("etag")
}

fn dataset_extension(destination: &Path) -> Result<String> {
    destination
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_string())
        .ok_or_else(|| {
            GeoError::Configuration(format!(
                "cannot infer dataset extension from {}",
                destination.display()
            ))
        })
}
