//! Version history paging and merging

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::catalog::{CatalogApi, RetryPolicy};
use crate::model::{PackageFacts, VersionRecord};

/// Records fetched from the versions endpoint in catalog order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFetch {
    pub records: Vec<VersionRecord>,
    pub pages: u32,
    /// True when the last page was reached, i.e. `records` is the full history
    pub complete: bool,
    /// True when a page could not be fetched
    pub aborted: bool,
    /// Entries dropped because they could not be decoded
    pub skipped: usize,
}

/// Page through a package's version history
///
/// Paging stops at the last page, at a page that cannot be fetched, at a
/// page without any version id missing from `known`, or at a page made up
/// entirely of versions whose cached facts mark them as pre-WebExtension.
/// The last rule assumes the endpoint lists versions newest first. A
/// history with undecodable entries is never reported as complete.
pub async fn fetch_history(
    api: &dyn CatalogApi,
    policy: &RetryPolicy,
    guid: &str,
    app: &str,
    page_size: u32,
    known: &[VersionRecord],
    facts: &BTreeMap<String, PackageFacts>,
) -> HistoryFetch {
    let known_ids: HashSet<u64> = known.iter().map(|r| r.id).collect();
    let mut fetched_ids: HashSet<u64> = HashSet::new();
    let mut fetch = HistoryFetch::default();
    let mut page_number = 1;

    loop {
        debug!("Requesting version page {} of {}", page_number, guid);
        let label = format!("versions of {} (page {})", guid, page_number);
        let Some(page) = policy
            .run(&label, || api.versions(guid, page_number, page_size))
            .await
        else {
            fetch.aborted = true;
            break;
        };
        fetch.pages += 1;
        fetch.skipped += page.skipped;

        let records: Vec<VersionRecord> = page
            .results
            .into_iter()
            .map(|entry| entry.into_record(app))
            .collect();
        let new_versions = records
            .iter()
            .filter(|r| !known_ids.contains(&r.id))
            .count();
        let legacy_versions = records
            .iter()
            .filter(|r| facts.get(&r.version).is_some_and(|f| !f.web_extension))
            .count();

        for record in records.iter() {
            if fetched_ids.insert(record.id) {
                fetch.records.push(record.clone());
            }
        }

        if page.next.is_none() {
            fetch.complete = fetch.skipped == 0;
            break;
        }
        if new_versions == 0 {
            debug!("No new versions on page {} of {}", page_number, guid);
            break;
        }
        if legacy_versions == records.len() {
            debug!("Only legacy versions on page {} of {}", page_number, guid);
            break;
        }
        page_number += 1;
    }

    fetch
}

/// Merge freshly fetched records into the known history
///
/// Fetched records come first and replace known records with the same id.
/// Known records that were not re-fetched follow in their previous order,
/// unless the fetch covered the full history, in which case they no longer
/// exist in the catalog and are dropped.
pub fn merge_history(known: &[VersionRecord], fetch: HistoryFetch) -> Vec<VersionRecord> {
    if fetch.complete {
        return fetch.records;
    }
    let fetched_ids: HashSet<u64> = fetch.records.iter().map(|r| r.id).collect();
    let mut merged = fetch.records;
    merged.extend(
        known
            .iter()
            .filter(|r| !fetched_ids.contains(&r.id))
            .cloned(),
    );
    merged
}

/// Drop cached facts of version strings no longer present in the history
pub fn prune_facts(facts: &mut BTreeMap<String, PackageFacts>, history: &[VersionRecord]) {
    let present: HashSet<&str> = history.iter().map(|r| r.version.as_str()).collect();
    facts.retain(|version, _| present.contains(version.as_str()));
}
