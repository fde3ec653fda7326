//! Persisted data model consumed by the report renderer

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::version::compare::{UNBOUNDED, is_compatible};

/// Legacy kind assumed when nothing more specific is known
pub const DEFAULT_LEGACY_KIND: &str = "xul";

/// Key of the compatibility index: a supported major or the current version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    Current,
    Major(u32),
}

impl Target {
    /// `current` followed by every supported major, ascending
    pub fn tracked(supported: &[u32]) -> Vec<Target> {
        std::iter::once(Target::Current)
            .chain(supported.iter().copied().map(Target::Major))
            .collect()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Current => f.write_str("current"),
            Target::Major(major) => write!(f, "{}", major),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "current" {
            return Ok(Target::Current);
        }
        s.parse::<u32>()
            .map(Target::Major)
            .map_err(|_| format!("invalid target: {}", s))
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentVersion {
    pub version: String,
}

/// Declared compatibility of a version with the configured application
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompatRange {
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
}

impl CompatRange {
    pub fn new(min: &str, max: &str) -> Self {
        Self {
            min: Some(min.to_string()),
            max: Some(max.to_string()),
        }
    }

    /// Lower bound, `"*"` when missing or empty
    pub fn min(&self) -> &str {
        bound_or_unbounded(self.min.as_deref())
    }

    /// Upper bound, `"*"` when missing or empty
    pub fn max(&self) -> &str {
        bound_or_unbounded(self.max.as_deref())
    }

    pub fn accepts(&self, target: u32) -> bool {
        is_compatible(target, self.min(), self.max())
    }
}

fn bound_or_unbounded(bound: Option<&str>) -> &str {
    bound.filter(|b| !b.is_empty()).unwrap_or(UNBOUNDED)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    pub url: String,
}

/// One entry of a package's version history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionRecord {
    pub id: u64,
    pub version: String,
    #[serde(default)]
    pub compatibility: Option<CompatRange>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

impl VersionRecord {
    pub fn first_file(&self) -> Option<&FileRecord> {
        self.files.first()
    }
}

/// Static facts extracted from an unpacked archive
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PackageFacts {
    #[serde(rename = "webExtension", default)]
    pub web_extension: bool,
    #[serde(default)]
    pub legacy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_type: Option<String>,
    #[serde(default)]
    pub experiment: bool,
    #[serde(
        rename = "experimentSchemaNames",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub experiment_schema_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Value>,
}

impl PackageFacts {
    /// Classification of an archive without a usable manifest
    pub fn legacy_artifact() -> Self {
        Self {
            web_extension: false,
            legacy: true,
            legacy_type: Some(DEFAULT_LEGACY_KIND.to_string()),
            ..Self::default()
        }
    }
}

/// Representative version per target plus facts per version string
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompatibilityIndex {
    #[serde(default)]
    pub resolved: BTreeMap<Target, String>,
    #[serde(default)]
    pub facts: BTreeMap<String, PackageFacts>,
    /// Supported majors the index was last resolved against
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scanned_for: Vec<u32>,
}

impl CompatibilityIndex {
    pub fn version_for(&self, target: Target) -> Option<&str> {
        self.resolved.get(&target).map(String::as_str)
    }

    pub fn facts_for(&self, target: Target) -> Option<&PackageFacts> {
        self.version_for(target).and_then(|v| self.facts.get(v))
    }

    /// True when resolved for `supported` and every resolved version has facts
    pub fn is_complete(&self, supported: &[u32]) -> bool {
        self.scanned_for == supported && self.resolved.values().all(|v| self.facts.contains_key(v))
    }
}

/// A catalog package with its history and derived compatibility index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
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
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
    #[serde(default)]
    pub index: CompatibilityIndex,
}

impl Package {
    pub fn current_version(&self) -> Option<&str> {
        self.current_version.as_ref().map(|c| c.version.as_str())
    }

    /// First history record carrying the given version string
    pub fn record(&self, version: &str) -> Option<&VersionRecord> {
        self.versions.iter().find(|r| r.version == version)
    }

    /// True when the index was not built for `supported` or lacks facts
    ///
    /// A package with an empty history that was fully scanned is current.
    pub fn needs_ingestion(&self, supported: &[u32]) -> bool {
        !self.index.is_complete(supported)
    }

    /// `id-guid-slug` line of the package log
    pub fn log_key(&self) -> String {
        format!("{}-{}-{}", self.id, self.guid, self.slug)
    }
}
