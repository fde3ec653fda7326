//! Catalog synchronization
//!
//! Walks the catalog search in creation order and folds every entry into the
//! package collection. A complete walk also drops packages the catalog no
//! longer lists; an aborted walk keeps everything merged so far and leaves
//! the rest for the next run.

pub mod reconcile;

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogApi, RetryPolicy, SearchQuery};
use crate::config::CatalogConfig;
use crate::model::Package;

pub use reconcile::{SyncState, classify, reconcile};

/// Package collection keyed by catalog id
pub type PackageMap = IndexMap<u64, Package>;

/// Synchronization settings derived from the catalog configuration
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub app: String,
    pub addon_type: String,
    pub ignored_guids: HashSet<String>,
    pub recheck_guids: HashSet<String>,
    /// Stop after this many pages (0 means no limit)
    pub max_pages: u32,
}

impl From<&CatalogConfig> for SyncOptions {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            app: config.app.clone(),
            addon_type: config.addon_type.clone(),
            ignored_guids: config.ignored_guids.iter().cloned().collect(),
            recheck_guids: config.recheck_guids.iter().cloned().collect(),
            max_pages: config.max_search_pages,
        }
    }
}

/// Outcome of one synchronization run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pages: u32,
    /// True when the last search page was reached
    pub complete: bool,
    /// Search results that could not be decoded
    pub skipped: usize,
    pub unchanged: Vec<u64>,
    pub updated: Vec<u64>,
    pub removed: Vec<u64>,
}

impl SyncReport {
    pub fn state_of(&self, id: u64) -> SyncState {
        if self.updated.contains(&id) {
            SyncState::Updated
        } else if self.unchanged.contains(&id) {
            SyncState::Unchanged
        } else if self.removed.contains(&id) {
            SyncState::Removed
        } else {
            SyncState::Unseen
        }
    }
}

/// Synchronizes the package collection with the catalog search
pub struct CatalogSync<'a> {
    api: &'a dyn CatalogApi,
    policy: &'a RetryPolicy,
    options: SyncOptions,
}

impl<'a> CatalogSync<'a> {
    pub fn new(api: &'a dyn CatalogApi, policy: &'a RetryPolicy, options: SyncOptions) -> Self {
        Self {
            api,
            policy,
            options,
        }
    }

    /// Merge all search pages into `packages`
    ///
    /// `supported` is used to detect indexes resolved against an outdated
    /// set of platform versions.
    pub async fn run(&self, packages: &mut PackageMap, supported: &[u32]) -> SyncReport {
        let mut report = SyncReport::default();
        let mut unseen: HashSet<u64> = packages.keys().copied().collect();
        let mut observed: HashSet<u64> = HashSet::new();
        let mut query = SearchQuery::first(&self.options.app, &self.options.addon_type);

        loop {
            info!("Searching for add-ons, page {}", query.page);
            let label = format!("search page {}", query.page);
            let Some(page) = self.policy.run(&label, || self.api.search(&query)).await else {
                warn!(
                    "Search aborted at page {}, keeping {} merged page(s)",
                    query.page, report.pages
                );
                break;
            };
            report.pages += 1;
            report.skipped += page.skipped;
            let has_next = page.has_next();

            for entry in page.results {
                if self.options.ignored_guids.contains(&entry.guid) {
                    debug!("Skipping ignored add-on {}", entry.guid);
                    continue;
                }
                unseen.remove(&entry.id);

                let id = entry.id;
                let recheck = self.options.recheck_guids.contains(&entry.guid);
                let old = if recheck { None } else { packages.get(&id) };
                let state = classify(old, &entry, supported);
                let package = reconcile(old, entry);
                packages.insert(id, package);

                if !observed.insert(id) {
                    continue;
                }
                match state {
                    SyncState::Unchanged => report.unchanged.push(id),
                    _ => report.updated.push(id),
                }
            }

            if !has_next {
                report.complete = true;
                break;
            }
            if self.options.max_pages > 0 && report.pages >= self.options.max_pages {
                info!("Stopping search after {} page(s)", report.pages);
                break;
            }
            query = query.next_page();
        }

        if report.complete && report.skipped == 0 {
            let mut removed: Vec<u64> = unseen.into_iter().collect();
            removed.sort_unstable();
            for id in &removed {
                packages.shift_remove(id);
            }
            report.removed = removed;
        } else if !unseen.is_empty() {
            warn!(
                "Incomplete search ({} skipped), keeping {} unobserved package(s)",
                report.skipped,
                unseen.len()
            );
        }

        info!(
            "Search finished: {} updated, {} unchanged, {} removed, {} total",
            report.updated.len(),
            report.unchanged.len(),
            report.removed.len(),
            packages.len()
        );
        report
    }
}
