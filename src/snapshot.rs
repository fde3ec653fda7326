//! Persisted snapshot (`data.json`) and package log (`log.json`)

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use tracing::{debug, info};

use crate::error::SnapshotError;
use crate::model::Package;
use crate::sync::PackageMap;

/// Document written to `data.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub extension_data: Vec<Package>,
}

/// Reads and writes the snapshot and the package log
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    data_path: PathBuf,
    log_path: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_path: PathBuf, log_path: PathBuf) -> Self {
        Self {
            data_path,
            log_path,
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Load the package collection; a missing snapshot yields an empty one
    pub fn load(&self) -> Result<PackageMap, SnapshotError> {
        if !self.data_path.exists() {
            info!("No snapshot at {:?}, starting from scratch", self.data_path);
            return Ok(PackageMap::new());
        }

        let content = fs::read_to_string(&self.data_path).map_err(|source| SnapshotError::Io {
            path: self.data_path.clone(),
            source,
        })?;
        let snapshot: Snapshot =
            serde_json::from_str(&content).map_err(|source| SnapshotError::Json {
                path: self.data_path.clone(),
                source,
            })?;
        debug!(
            "Loaded {} packages from snapshot of {}",
            snapshot.extension_data.len(),
            snapshot.last_updated
        );

        Ok(snapshot
            .extension_data
            .into_iter()
            .map(|package| (package.id, package))
            .collect())
    }

    /// Rewrite both files from `packages`, sorted by id
    pub fn save(&self, packages: &PackageMap, now: DateTime<Utc>) -> Result<(), SnapshotError> {
        let mut extension_data: Vec<Package> = packages.values().cloned().collect();
        extension_data.sort_by_key(|package| package.id);

        let mut log: Vec<String> = extension_data.iter().map(Package::log_key).collect();
        log.sort();

        let snapshot = Snapshot {
            last_updated: now,
            extension_data,
        };
        write_json(&self.data_path, &snapshot)?;
        write_json(&self.log_path, &log)?;

        info!(
            "Wrote {} packages to {:?}",
            snapshot.extension_data.len(),
            self.data_path
        );
        Ok(())
    }
}

/// Pretty-print with four-space indentation, replacing `path` atomically
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let io_err = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut serializer)
        .map_err(|source| SnapshotError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &buf).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}
