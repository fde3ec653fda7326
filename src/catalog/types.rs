//! Wire types of the catalog API

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::model::{CompatRange, CurrentVersion, FileRecord, VersionRecord};

/// One page of a paginated catalog response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    /// URL of the next page, `None` on the last page
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    /// Results dropped because they could not be decoded
    #[serde(skip)]
    pub skipped: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

impl Page<Value> {
    /// Decode every result on its own; entries that do not fit `T` are
    /// dropped and counted in `skipped`
    pub fn decode<T: DeserializeOwned>(self) -> Page<T> {
        let mut skipped = self.skipped;
        let results = self
            .results
            .into_iter()
            .filter_map(|value| {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                match serde_json::from_value(value) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!("Skipping undecodable result {}: {}", id, e);
                        skipped += 1;
                        None
                    }
                }
            })
            .collect();
        Page {
            count: self.count,
            next: self.next,
            results,
            skipped,
        }
    }
}

/// Search result entry, reduced to the fields the dataset keeps
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub id: u64,
    pub guid: String,
    pub slug: String,
    #[serde(default)]
    pub name: Value,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub average_daily_users: u64,
    #[serde(default)]
    pub icons: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub default_locale: Option<String>,
    #[serde(rename = "type", default)]
    pub addon_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub current_version: Option<CurrentVersion>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FileEntry {
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    pub url: String,
}

/// Version history entry
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VersionEntry {
    pub id: u64,
    pub version: String,
    /// Compatibility per application
    #[serde(default, deserialize_with = "null_as_empty")]
    pub compatibility: HashMap<String, CompatRange>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl VersionEntry {
    /// Keep only the compatibility declared for `app`
    pub fn into_record(mut self, app: &str) -> VersionRecord {
        VersionRecord {
            id: self.id,
            version: self.version,
            compatibility: self.compatibility.remove(app),
            files: self
                .files
                .into_iter()
                .map(|f| FileRecord {
                    created: f.created,
                    url: f.url,
                })
                .collect(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, CompatRange>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<HashMap<String, CompatRange>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_entry_keeps_only_configured_app() {
        let entry: VersionEntry = serde_json::from_value(json!({
            "id": 5,
            "version": "2.1",
            "compatibility": {
                "firefox": {"min": "60.0", "max": "*"},
                "thunderbird": {"min": "78.0", "max": "102.*"}
            },
            "files": [{"created": "2022-05-01T10:00:00Z", "url": "https://x/y.xpi", "size": 12}]
        }))
        .unwrap();

        let record = entry.into_record("thunderbird");

        assert_eq!(record.compatibility, Some(CompatRange::new("78.0", "102.*")));
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.files[0].url, "https://x/y.xpi");
    }

    #[test]
    fn version_entry_without_compatibility_has_no_range() {
        let entry: VersionEntry = serde_json::from_value(json!({
            "id": 6,
            "version": "0.1",
            "compatibility": null,
            "files": []
        }))
        .unwrap();

        assert_eq!(entry.into_record("thunderbird").compatibility, None);
    }

    #[test]
    fn catalog_entry_ignores_unknown_fields() {
        let entry: CatalogEntry = serde_json::from_value(json!({
            "id": 1,
            "guid": "a@b",
            "slug": "a",
            "name": {"en-US": "A"},
            "last_updated": "2024-03-01T00:00:00Z",
            "average_daily_users": 42,
            "current_version": {"id": 9, "version": "1.2", "files": []},
            "ratings": {"average": 4.5}
        }))
        .unwrap();

        assert_eq!(entry.current_version.unwrap().version, "1.2");
        assert_eq!(entry.average_daily_users, 42);
    }

    #[test]
    fn page_decode_drops_malformed_entries_and_keeps_the_rest() {
        let raw: Page<Value> = serde_json::from_value(json!({
            "count": 2,
            "next": "https://example.org/page/2",
            "results": [
                {"id": 1, "guid": "a@b", "slug": "a", "last_updated": null},
                {"id": 2, "guid": "c@d", "slug": "c", "last_updated": "2024-03-01T00:00:00Z"}
            ]
        }))
        .unwrap();

        let page: Page<CatalogEntry> = raw.decode();

        assert!(page.has_next());
        assert_eq!(page.skipped, 1);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].id, 2);
    }
}
