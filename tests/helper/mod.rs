//! Shared fixtures for end-to-end crawl tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use zip::write::SimpleFileOptions;

use addon_compat::catalog::types::FileEntry;
use addon_compat::catalog::{CatalogApi, CatalogEntry, Page, SearchQuery, VersionEntry};
use addon_compat::config::Config;
use addon_compat::error::FetchError;
use addon_compat::model::{CompatRange, CurrentVersion};

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
}

/// In-memory catalog serving a single search page
#[derive(Default)]
pub struct FakeCatalog {
    entries: Mutex<Vec<CatalogEntry>>,
    versions: Mutex<HashMap<String, Vec<VersionEntry>>>,
    version_calls: AtomicU32,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a package together with its version history
    pub fn publish(&self, entry: CatalogEntry, history: Vec<VersionEntry>) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| e.id != entry.id);
        self.versions
            .lock()
            .unwrap()
            .insert(entry.guid.clone(), history);
        entries.push(entry);
    }

    pub fn unpublish(&self, id: u64) {
        self.entries.lock().unwrap().retain(|e| e.id != id);
    }

    pub fn version_calls(&self) -> u32 {
        self.version_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn search(&self, _query: &SearchQuery) -> Result<Page<CatalogEntry>, FetchError> {
        Ok(Page {
            count: None,
            next: None,
            results: self.entries.lock().unwrap().clone(),
            skipped: 0,
        })
    }

    async fn versions(
        &self,
        guid: &str,
        _page: u32,
        _page_size: u32,
    ) -> Result<Page<VersionEntry>, FetchError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        match self.versions.lock().unwrap().get(guid) {
            Some(history) => Ok(Page {
                count: Some(history.len() as u64),
                next: None,
                results: history.clone(),
                skipped: 0,
            }),
            None => Err(FetchError::Status {
                status: 404,
                url: guid.to_string(),
            }),
        }
    }
}

pub fn catalog_entry(id: u64, slug: &str, current: &str, day: u32) -> CatalogEntry {
    CatalogEntry {
        id,
        guid: format!("{}@example.org", slug),
        slug: slug.to_string(),
        name: serde_json::json!({"en-US": slug}),
        created: Some(at(1)),
        last_updated: at(day),
        average_daily_users: 100,
        icons: None,
        default_locale: Some("en-US".to_string()),
        addon_type: Some("extension".to_string()),
        url: None,
        current_version: Some(CurrentVersion {
            version: current.to_string(),
        }),
    }
}

pub fn version_entry(id: u64, version: &str, min: &str, max: &str, url: &str) -> VersionEntry {
    VersionEntry {
        id,
        version: version.to_string(),
        compatibility: HashMap::from([("thunderbird".to_string(), CompatRange::new(min, max))]),
        files: vec![FileEntry {
            created: Some(at(1)),
            url: url.to_string(),
        }],
    }
}

/// Zip archive holding the given files
pub fn xpi(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Configuration without delays, writing into `data_dir`
pub fn test_config(data_dir: &Path) -> Config {
    let mut config = Config {
        data_dir: Some(data_dir.to_path_buf()),
        ..Config::default()
    };
    config.catalog.cdn_bypass = None;
    config.retry.max_attempts = 1;
    config.retry.initial_delay_ms = 0;
    config.retry.retry_delay_ms = 0;
    config.download.initial_delay_ms = 0;
    config.download.retry_delay_ms = 0;
    config
}
