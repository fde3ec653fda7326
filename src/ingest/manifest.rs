//! Manifest decoding and fact extraction
//!
//! Manifests in the wild carry `//` and `/* */` comments, a UTF-8 BOM, and
//! fields of unexpected types. The raw document is kept for the reports; the
//! fields the pipeline relies on are read once into a [`ManifestView`] that
//! tolerates type mismatches.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{DEFAULT_LEGACY_KIND, PackageFacts};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Legacy descriptor of a manifest (`"legacy": {"type": "bootstrap"}`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyDescriptor {
    pub kind: Option<String>,
}

/// Typed, partial view of a WebExtension manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestView {
    pub manifest_version: Option<u64>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub legacy: Option<LegacyDescriptor>,
    /// Registered experiment API names, `Some` when `experiment_apis` is set
    pub experiment_apis: Option<Vec<String>>,
    /// `strict_max_version` of `applications.gecko` or `browser_specific_settings.gecko`
    pub strict_max_version: Option<String>,
    pub permissions: Option<Vec<String>>,
}

impl ManifestView {
    pub fn from_value(manifest: &Value) -> Self {
        let legacy = manifest
            .get("legacy")
            .filter(|v| is_truthy(v))
            .map(|v| LegacyDescriptor {
                kind: v.get("type").and_then(Value::as_str).map(str::to_string),
            });

        let experiment_apis = manifest
            .get("experiment_apis")
            .filter(|v| is_truthy(v))
            .map(|v| match v {
                Value::Object(apis) => apis.keys().cloned().collect(),
                Value::Array(apis) => (0..apis.len()).map(|i| i.to_string()).collect(),
                _ => Vec::new(),
            });

        let strict_max_version = ["applications", "browser_specific_settings"]
            .iter()
            .find_map(|key| {
                manifest
                    .get(*key)?
                    .get("gecko")?
                    .get("strict_max_version")?
                    .as_str()
                    .filter(|v| !v.is_empty())
            })
            .map(str::to_string);

        let permissions = manifest
            .get("permissions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            });

        Self {
            manifest_version: manifest.get("manifest_version").and_then(Value::as_u64),
            name: string_field(manifest, "name"),
            version: string_field(manifest, "version"),
            legacy,
            experiment_apis,
            strict_max_version,
            permissions,
        }
    }
}

fn string_field(manifest: &Value, key: &str) -> Option<String> {
    manifest.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Truthiness of a JSON value as used by manifest flags
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Parse manifest text, tolerating comments and a byte order mark
pub fn parse_manifest(content: &str) -> Result<Value, serde_json::Error> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    serde_json::from_str(&strip_json_comments(content))
}

/// Facts of an archive that ships a manifest
pub fn facts_from_manifest(manifest: Value) -> PackageFacts {
    let view = ManifestView::from_value(&manifest);
    let mut facts = PackageFacts {
        web_extension: true,
        ..PackageFacts::default()
    };

    if let Some(legacy) = view.legacy {
        facts.legacy = true;
        facts.legacy_type = Some(legacy.kind.unwrap_or_else(|| DEFAULT_LEGACY_KIND.to_string()));
    }
    if let Some(apis) = view.experiment_apis {
        facts.experiment = true;
        facts.experiment_schema_names = apis;
    }
    facts.manifest = Some(manifest);
    facts
}

/// Read the facts of an unpacked archive
///
/// A missing or unparsable manifest is not an error: the archive is then a
/// legacy (pre-WebExtension) package.
pub fn read_facts(src_dir: &Path) -> std::io::Result<PackageFacts> {
    let path = src_dir.join(MANIFEST_FILE);
    if !path.is_file() {
        debug!("No manifest in {:?}, treating as legacy add-on", src_dir);
        return Ok(PackageFacts::legacy_artifact());
    }

    make_readable(&path);
    let bytes = std::fs::read(&path)?;
    let content = String::from_utf8_lossy(&bytes);
    match parse_manifest(&content) {
        Ok(manifest) => Ok(facts_from_manifest(manifest)),
        Err(e) => {
            warn!("Unparsable manifest {:?}: {}", path, e);
            Ok(PackageFacts::legacy_artifact())
        }
    }
}

/// Archives occasionally carry files without read permission
#[cfg(unix)]
fn make_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)) {
        debug!("Failed to adjust permissions of {:?}: {}", path, e);
    }
}

#[cfg(not(unix))]
fn make_readable(_path: &Path) {}

/// Strips C-style comments from JSON (// and /* */).
fn strip_json_comments(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while let Some(c) = chars.next() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
                result.push(c);
            }
            continue;
        }

        if in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
                result.push(' ');
            }
            continue;
        }

        if in_string {
            result.push(c);
            if c == '"' {
                in_string = false;
            } else if c == '\\' {
                if let Some(next) = chars.next() {
                    result.push(next);
                }
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                result.push(c);
            }
            ('/', Some('/')) => {
                chars.next();
                in_line_comment = true;
            }
            ('/', Some('*')) => {
                chars.next();
                in_block_comment = true;
            }
            _ => result.push(c),
        }
    }

    result
}
