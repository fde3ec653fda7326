//! Merging fresh catalog entries with the persisted snapshot

use crate::catalog::CatalogEntry;
use crate::model::Package;

/// Per-run state of a package known to the synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Known from the snapshot, not observed in this run (yet)
    Unseen,
    /// Observed with no change since the snapshot; ingestion is skipped
    Unchanged,
    /// New, changed, or with an incomplete index; needs ingestion
    Updated,
    /// Not observed by a complete sync; dropped from the snapshot
    Removed,
}

/// Build the package for a freshly fetched entry
///
/// Catalog fields always come from `fresh`. Version history and the
/// compatibility index are carried over from `old` so cached facts survive.
pub fn reconcile(old: Option<&Package>, fresh: CatalogEntry) -> Package {
    let (versions, index) = old
        .map(|o| (o.versions.clone(), o.index.clone()))
        .unwrap_or_default();

    Package {
        id: fresh.id,
        guid: fresh.guid,
        slug: fresh.slug,
        name: fresh.name,
        created: fresh.created,
        last_updated: fresh.last_updated,
        average_daily_users: fresh.average_daily_users,
        icons: fresh.icons,
        default_locale: fresh.default_locale,
        addon_type: fresh.addon_type,
        url: fresh.url,
        current_version: fresh.current_version,
        versions,
        index,
    }
}

/// Decide whether an observed entry needs ingestion
pub fn classify(old: Option<&Package>, fresh: &CatalogEntry, supported: &[u32]) -> SyncState {
    match old {
        Some(old) if old.last_updated >= fresh.last_updated && !old.needs_ingestion(supported) => {
            SyncState::Unchanged
        }
        _ => SyncState::Updated,
    }
}
