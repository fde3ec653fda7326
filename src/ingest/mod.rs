//! Package ingestion pipeline
//!
//! For one package: refresh the version history, resolve the representative
//! version of every tracked target, then download and unpack the archive of
//! each resolved version that has no cached facts yet.
//!
//! # Modules
//!
//! - [`history`]: version history paging and merging
//! - [`resolve`]: first-match target resolution
//! - [`archive`]: archive download (manual redirects) and zip extraction
//! - [`manifest`]: manifest decoding and fact extraction

pub mod archive;
pub mod history;
pub mod manifest;
pub mod resolve;

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogApi, RetryPolicy};
use crate::config::Config;
use crate::error::IngestError;
use crate::model::{Package, PackageFacts, Target, VersionRecord};
use crate::sync::PackageMap;

pub use archive::{ARCHIVE_FILE_NAME, ArchiveFetcher, extract_archive};
pub use history::{HistoryFetch, fetch_history, merge_history, prune_facts};
pub use manifest::{ManifestView, read_facts};
pub use resolve::resolve_targets;

/// Ingestion settings
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub app: String,
    pub version_page_size: u32,
    pub downloads_dir: PathBuf,
    pub download_attempts: u32,
    pub download_initial_delay: Duration,
    pub download_retry_delay: Duration,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app: config.catalog.app.clone(),
            version_page_size: config.catalog.version_page_size,
            downloads_dir: config.downloads_dir(),
            download_attempts: config.download.max_attempts,
            download_initial_delay: Duration::from_millis(config.download.initial_delay_ms),
            download_retry_delay: Duration::from_millis(config.download.retry_delay_ms),
        }
    }
}

/// What one ingestion did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub history_pages: u32,
    /// Targets with a resolved version
    pub resolved: usize,
    /// Versions whose facts were extracted in this run
    pub parsed: Vec<String>,
    /// Targets whose resolved version still has no facts
    pub unresolved: Vec<Target>,
}

/// Runs the ingestion pipeline against the catalog and the archive store
pub struct Ingestor<'a> {
    api: &'a dyn CatalogApi,
    policy: &'a RetryPolicy,
    fetcher: &'a ArchiveFetcher,
    options: IngestOptions,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        api: &'a dyn CatalogApi,
        policy: &'a RetryPolicy,
        fetcher: &'a ArchiveFetcher,
        options: IngestOptions,
    ) -> Self {
        Self {
            api,
            policy,
            fetcher,
            options,
        }
    }

    /// Ingest every package in `ids`, in order
    ///
    /// A failing package is logged with its slug and does not stop the loop.
    /// Returns the number of packages processed without error.
    pub async fn ingest_all(
        &self,
        packages: &mut PackageMap,
        ids: &[u64],
        supported: &[u32],
    ) -> usize {
        let mut processed = 0;

        for (n, id) in ids.iter().enumerate() {
            let Some(package) = packages.get_mut(id) else {
                continue;
            };
            info!("Processing {} ({}/{})", package.slug, n + 1, ids.len());
            match self.ingest(package, supported).await {
                Ok(summary) => {
                    processed += 1;
                    if !summary.unresolved.is_empty() {
                        warn!(
                            "{}: no facts for {} target(s), retrying next run",
                            package.slug,
                            summary.unresolved.len()
                        );
                    }
                }
                Err(e) => error!("Failed to process {}: {}", package.slug, e),
            }
        }

        processed
    }

    /// Refresh history, index and facts of one package
    pub async fn ingest(
        &self,
        package: &mut Package,
        supported: &[u32],
    ) -> Result<IngestSummary, IngestError> {
        let fetch = fetch_history(
            self.api,
            self.policy,
            &package.guid,
            &self.options.app,
            self.options.version_page_size,
            &package.versions,
            &package.index.facts,
        )
        .await;
        let history_pages = fetch.pages;
        let aborted = fetch.aborted;
        package.versions = merge_history(&package.versions, fetch);
        prune_facts(&mut package.index.facts, &package.versions);

        let resolved: BTreeMap<Target, VersionRecord> =
            resolve_targets(&package.versions, package.current_version(), supported)
                .into_iter()
                .map(|(target, record)| (target, record.clone()))
                .collect();
        package.index.resolved = resolved
            .iter()
            .map(|(target, record)| (*target, record.version.clone()))
            .collect();

        let mut summary = IngestSummary {
            history_pages,
            resolved: resolved.len(),
            ..IngestSummary::default()
        };

        let mut failed: HashSet<String> = HashSet::new();
        for target in Target::tracked(supported) {
            let Some(record) = resolved.get(&target) else {
                continue;
            };
            if package.index.facts.contains_key(&record.version) {
                continue;
            }
            if failed.contains(&record.version) {
                summary.unresolved.push(target);
                continue;
            }
            debug!("{}: parsing {} for target {}", package.slug, record.version, target);

            match self.acquire(package, record).await? {
                Some(facts) => {
                    package.index.facts.insert(record.version.clone(), facts);
                    summary.parsed.push(record.version.clone());
                }
                None => {
                    failed.insert(record.version.clone());
                    summary.unresolved.push(target);
                }
            }
        }

        // An index built from a partial history is never marked as current
        package.index.scanned_for = if aborted {
            warn!("{}: version history incomplete, retrying next run", package.slug);
            Vec::new()
        } else {
            supported.to_vec()
        };
        Ok(summary)
    }

    fn version_dir(&self, package: &Package, record: &VersionRecord) -> PathBuf {
        self.options
            .downloads_dir
            .join(format!("{}-{}", package.id, package.slug))
            .join(record.id.to_string())
    }

    /// Download and unpack the archive of `record`
    ///
    /// Returns `None` when every attempt failed.
    async fn acquire(
        &self,
        package: &Package,
        record: &VersionRecord,
    ) -> Result<Option<PackageFacts>, IngestError> {
        let Some(file) = record.first_file() else {
            warn!("{}: version {} has no file", package.slug, record.version);
            return Ok(None);
        };
        let version_dir = self.version_dir(package, record);
        let archive = version_dir.join("xpi").join(ARCHIVE_FILE_NAME);
        let src = version_dir.join("src");

        for attempt in 0..self.options.download_attempts {
            if attempt == 0 {
                sleep(self.options.download_initial_delay).await;
            } else {
                sleep(self.options.download_retry_delay).await;
            }

            if tokio::fs::try_exists(&archive).await? {
                debug!("Reusing archive {:?}", archive);
            } else if let Err(e) = self.fetcher.download(&file.url, &archive).await {
                warn!(
                    "{}: download of {} failed (attempt {}): {}",
                    package.slug,
                    record.version,
                    attempt + 1,
                    e
                );
                continue;
            }

            let (archive_path, src_dir) = (archive.clone(), src.clone());
            let unpacked =
                tokio::task::spawn_blocking(move || -> Result<PackageFacts, IngestError> {
                    extract_archive(&archive_path, &src_dir)?;
                    Ok(read_facts(&src_dir)?)
                })
                .await?;

            match unpacked {
                Ok(facts) => return Ok(Some(facts)),
                Err(e) => {
                    warn!(
                        "{}: archive of {} is unusable (attempt {}): {}",
                        package.slug,
                        record.version,
                        attempt + 1,
                        e
                    );
                    tokio::fs::remove_file(&archive).await?;
                }
            }
        }

        Ok(None)
    }
}
