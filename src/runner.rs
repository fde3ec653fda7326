//! One complete crawl: resolve platform versions, synchronize the catalog,
//! ingest changed packages, persist the snapshot

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::catalog::{AtnCatalog, CatalogApi, RetryPolicy};
use crate::config::Config;
use crate::ingest::{ArchiveFetcher, IngestOptions, Ingestor};
use crate::snapshot::SnapshotStore;
use crate::sync::{CatalogSync, PackageMap, SyncOptions, SyncReport};
use crate::version::releases::{PlatformVersions, ReleaseClient};

/// Outcome of one crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub supported: Vec<u32>,
    pub sync: SyncReport,
    /// Packages ingested without error
    pub processed: usize,
    /// Packages in the written snapshot
    pub total: usize,
}

/// Resolve the tracked platform versions from product details
pub async fn platform_versions(config: &Config) -> Result<PlatformVersions> {
    let client = ReleaseClient::new(&config.releases.base_url, &config.catalog.app)?;
    let policy = RetryPolicy::from(&config.retry);

    let releases = &config.releases;
    let Some(platform) = policy
        .run("product details", || {
            client.fetch_platform_versions(&releases.legacy_esr, releases.window)
        })
        .await
    else {
        bail!("Could not resolve supported versions from {}", config.releases.base_url);
    };
    if platform.supported.is_empty() {
        bail!("Product details list no supported versions");
    }
    Ok(platform)
}

/// Run a full crawl against the configured services
pub async fn run(config: &Config) -> Result<RunSummary> {
    let platform = platform_versions(config).await?;
    info!("Supported versions: {:?}", platform.supported);

    let catalog = AtnCatalog::from_config(&config.catalog)?;
    let fetcher = ArchiveFetcher::new(config.catalog.cdn_bypass.clone())?;
    run_with(config, &catalog, &fetcher, &platform.supported).await
}

/// Run a full crawl with the given catalog and archive fetcher
pub async fn run_with(
    config: &Config,
    api: &dyn CatalogApi,
    fetcher: &ArchiveFetcher,
    supported: &[u32],
) -> Result<RunSummary> {
    let store = SnapshotStore::new(config.snapshot_path(), config.package_log_path());
    let mut packages = if config.force_reprocessing {
        info!("Reprocessing forced, ignoring snapshot");
        PackageMap::new()
    } else {
        store
            .load()
            .with_context(|| format!("Failed to load snapshot {:?}", store.data_path()))?
    };

    let policy = RetryPolicy::from(&config.retry);
    let sync = CatalogSync::new(api, &policy, SyncOptions::from(&config.catalog))
        .run(&mut packages, supported)
        .await;
    if !sync.complete {
        warn!("Catalog search incomplete, the snapshot will be partial");
    }

    let ingestor = Ingestor::new(api, &policy, fetcher, IngestOptions::from_config(config));
    let processed = ingestor
        .ingest_all(&mut packages, &sync.updated, supported)
        .await;
    info!("Processed {}/{} updated packages", processed, sync.updated.len());

    store
        .save(&packages, Utc::now())
        .context("Failed to write snapshot")?;

    Ok(RunSummary {
        supported: supported.to_vec(),
        sync,
        processed,
        total: packages.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn platform_versions_uses_configured_releases_source() {
        let mut server = Server::new_async().await;
        let _versions = server
            .mock("GET", "/thunderbird_versions.json")
            .with_status(200)
            .with_body(
                r#"{"THUNDERBIRD_ESR": "128.3.0esr", "LATEST_THUNDERBIRD_VERSION": "131.0"}"#,
            )
            .create_async()
            .await;
        let _releases = server
            .mock("GET", "/thunderbird.json")
            .with_status(200)
            .with_body(
                r#"{"releases": {"thunderbird-131.0": {"category": "major", "version": "131.0"}}}"#,
            )
            .create_async()
            .await;

        let mut config = Config::default();
        config.releases.base_url = server.url();
        config.releases.window = 2;
        config.releases.legacy_esr = vec![102];
        config.retry.max_attempts = 1;
        config.retry.initial_delay_ms = 0;
        config.retry.retry_delay_ms = 0;

        let platform = platform_versions(&config).await.unwrap();

        assert_eq!(platform.supported, vec![128, 131]);
    }
}
