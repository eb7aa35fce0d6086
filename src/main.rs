use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};

use geolookup::cache::LookupCache;
use geolookup::config::{LogFormat, Settings};
use geolookup::resolver::SourceRegistry;
use geolookup::server::{self, AppState};

/// Config file picked up when neither argv nor the environment name one.
const DEFAULT_CONFIG_FILE: &str = "geolookup.yml";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load(config_path().as_deref())?;
    init_tracing(&settings);

    let registry = Arc::new(
        SourceRegistry::from_settings(&settings).context("failed to build source registry")?,
    );

    // load failures degrade the affected capability; the service still
    // starts and serves what it can
    registry.start_all().await;

    let cache = settings
        .cache
        .enabled
        .then(|| Arc::new(LookupCache::new(settings.cache.capacity)));
    let state = AppState {
        registry: Arc::clone(&registry),
        cache,
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let refresh_task = tokio::spawn(refresh_loop(
        Arc::clone(&registry),
        Duration::from_secs(settings.refresh_interval_secs),
        stop_rx,
    ));

    let addr = format!("{}:{}", settings.api.binding, settings.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "starting server");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = stop_tx.send(true);
    let _ = refresh_task.await;
    registry.shutdown_all().await;

    Ok(())
}

fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::args().nth(1) {
        return Some(PathBuf::from(path));
    }
    if let Ok(path) = std::env::var("GEOLOOKUP_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let default = Path::new(DEFAULT_CONFIG_FILE);
    default.is_file().then(|| default.to_path_buf())
}

fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log.level));
    match settings.log.format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Periodic refresh over every standalone source, independent of request
/// traffic. Per-source failures are logged; the next tick retries.
async fn refresh_loop(
    registry: Arc<SourceRegistry>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick completes immediately; sources were just started
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!("refreshing sources");
                registry.refresh_all().await;
            }
            _ = stop.changed() => {
                info!("stopping refresh");
                return;
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
