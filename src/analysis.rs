//! Read-only queries over ingested packages
//!
//! These are the classifications the compatibility reports are grouped by.
//! Everything here works on the persisted model only and never touches the
//! network or the filesystem.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::ingest::ManifestView;
use crate::model::{Package, PackageFacts, Target, VersionRecord};
use crate::version::compare::{UNBOUNDED, compare_ver};

static UNSAFE_EVAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]unsafe-eval['"]"#).expect("valid regex"));

/// Everything known about a package for one target
#[derive(Debug, Clone, Copy)]
pub struct TargetView<'a> {
    pub version: Option<&'a str>,
    pub facts: Option<&'a PackageFacts>,
    /// History record of the resolved version
    pub record: Option<&'a VersionRecord>,
}

impl<'a> TargetView<'a> {
    pub fn of(package: &'a Package, target: Target) -> Self {
        let version = package.index.version_for(target);
        Self {
            version,
            facts: version.and_then(|v| package.index.facts.get(v)),
            record: version.and_then(|v| package.record(v)),
        }
    }

    /// Upper bound declared in the catalog, `"*"` when unknown
    pub fn catalog_max(&self) -> &'a str {
        self.record
            .and_then(|r| r.compatibility.as_ref())
            .map_or(UNBOUNDED, |c| c.max())
    }

    /// `strict_max_version` of the manifest, `"*"` when unset
    pub fn strict_max(&self) -> String {
        self.facts
            .and_then(|f| f.manifest.as_ref())
            .and_then(|m| ManifestView::from_value(m).strict_max_version)
            .unwrap_or_else(|| UNBOUNDED.to_string())
    }
}

/// Report classification of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anomaly {
    /// An older supported major resolves to a higher version than a newer one
    WrongOrder,
    /// The newest supported major does not resolve to the current version
    LatestCurrentMismatch,
    /// The current version could not be analysed
    ParsingError,
    /// Catalog max version raised above the manifest value
    MaxRaised,
    /// Catalog max version lowered below the manifest value
    MaxReduced,
    /// Pure WebExtension with an upper version limit
    UnnecessaryUpperLimit,
    UnsafeEval,
    RequestsPermissions,
}

/// All classifications that apply to `package`
pub fn anomalies(package: &Package, supported: &[u32]) -> Vec<Anomaly> {
    let checks: [(Anomaly, bool); 8] = [
        (Anomaly::WrongOrder, is_wrong_order(package, supported)),
        (
            Anomaly::LatestCurrentMismatch,
            is_latest_current_mismatch(package, supported),
        ),
        (Anomaly::ParsingError, is_parsing_error(package)),
        (
            Anomaly::MaxRaised,
            max_version_drift(package) == Some(Ordering::Less),
        ),
        (
            Anomaly::MaxReduced,
            max_version_drift(package) == Some(Ordering::Greater),
        ),
        (
            Anomaly::UnnecessaryUpperLimit,
            has_unnecessary_upper_limit(package),
        ),
        (Anomaly::UnsafeEval, uses_unsafe_eval(package)),
        (
            Anomaly::RequestsPermissions,
            requested_permissions(package).is_some(),
        ),
    ];

    checks
        .into_iter()
        .filter_map(|(anomaly, applies)| applies.then_some(anomaly))
        .collect()
}

/// Resolved versions of the supported majors, ascending by major
fn supported_versions<'a>(package: &'a Package, supported: &[u32]) -> Vec<(u32, &'a str)> {
    supported
        .iter()
        .filter_map(|&major| {
            package
                .index
                .version_for(Target::Major(major))
                .map(|v| (major, v))
        })
        .collect()
}

pub fn is_wrong_order(package: &Package, supported: &[u32]) -> bool {
    let versions = supported_versions(package, supported);
    versions.iter().enumerate().any(|(i, (_, older))| {
        versions[i + 1..]
            .iter()
            .any(|(_, newer)| compare_ver(older, newer) == Ordering::Greater)
    })
}

pub fn is_latest_current_mismatch(package: &Package, supported: &[u32]) -> bool {
    let Some(&(_, highest)) = supported_versions(package, supported).last() else {
        return false;
    };
    !is_wrong_order(package, supported)
        && package.index.version_for(Target::Current) != Some(highest)
}

pub fn is_parsing_error(package: &Package) -> bool {
    TargetView::of(package, Target::Current).facts.is_none()
}

/// Compare the manifest `strict_max_version` of the current version with the
/// catalog max version
///
/// `None` when the current version has no facts or record, or is not a
/// WebExtension.
pub fn max_version_drift(package: &Package) -> Option<Ordering> {
    let view = TargetView::of(package, Target::Current);
    let facts = view.facts?;
    view.record?;
    if !facts.web_extension || facts.legacy {
        return None;
    }
    Some(compare_ver(&view.strict_max(), view.catalog_max()))
}

pub fn has_unnecessary_upper_limit(package: &Package) -> bool {
    let view = TargetView::of(package, Target::Current);
    let (Some(facts), Some(_)) = (view.facts, view.record) else {
        return false;
    };
    let theme_experiment = facts
        .manifest
        .as_ref()
        .and_then(|m| m.get("theme_experiment"))
        .is_some_and(|v| !v.is_null() && *v != serde_json::Value::Bool(false));

    !theme_experiment
        && !facts.legacy
        && facts.web_extension
        && !facts.experiment
        && (view.strict_max() != UNBOUNDED || view.catalog_max() != UNBOUNDED)
}

pub fn uses_unsafe_eval(package: &Package) -> bool {
    TargetView::of(package, Target::Current)
        .facts
        .and_then(|f| f.manifest.as_ref())
        .is_some_and(|m| UNSAFE_EVAL.is_match(&m.to_string()))
}

/// Permissions requested by the current version's manifest
pub fn requested_permissions(package: &Package) -> Option<Vec<String>> {
    TargetView::of(package, Target::Current)
        .facts
        .and_then(|f| f.manifest.as_ref())
        .and_then(|m| ManifestView::from_value(m).permissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{at, package, record};
    use serde_json::json;

    const SUPPORTED: &[u32] = &[102, 115, 128];

    fn web_extension(manifest: serde_json::Value) -> PackageFacts {
        PackageFacts {
            web_extension: true,
            manifest: Some(manifest),
            ..PackageFacts::default()
        }
    }

    /// Package whose current version "2.0" is known with the given facts
    fn with_current(facts: PackageFacts, catalog_max: &str) -> Package {
        let mut pkg = package(1, "demo", "2.0", at(2));
        pkg.versions = vec![record(20, "2.0", "115", catalog_max)];
        pkg.index.resolved.insert(Target::Current, "2.0".to_string());
        pkg.index.facts.insert("2.0".to_string(), facts);
        pkg
    }

    fn resolved(entries: &[(Target, &str)]) -> Package {
        let mut pkg = package(1, "demo", "3.0", at(2));
        for (target, version) in entries {
            pkg.index.resolved.insert(*target, version.to_string());
        }
        pkg
    }

    #[test]
    fn wrong_order_detects_older_major_with_higher_version() {
        let pkg = resolved(&[
            (Target::Major(102), "3.0"),
            (Target::Major(115), "2.0"),
            (Target::Major(128), "3.1"),
        ]);

        assert!(is_wrong_order(&pkg, SUPPORTED));
        assert!(!is_latest_current_mismatch(&pkg, SUPPORTED));
    }

    #[test]
    fn wrong_order_ignores_unresolved_majors() {
        let pkg = resolved(&[(Target::Major(102), "1.0"), (Target::Major(128), "1.10")]);

        assert!(!is_wrong_order(&pkg, SUPPORTED));
    }

    #[test]
    fn latest_current_mismatch_compares_highest_major_with_current() {
        let pkg = resolved(&[
            (Target::Current, "3.0"),
            (Target::Major(102), "1.0"),
            (Target::Major(115), "2.0"),
        ]);

        assert!(is_latest_current_mismatch(&pkg, SUPPORTED));

        let pkg = resolved(&[(Target::Current, "2.0"), (Target::Major(115), "2.0")]);
        assert!(!is_latest_current_mismatch(&pkg, SUPPORTED));
    }

    #[test]
    fn parsing_error_when_current_has_no_facts() {
        let pkg = resolved(&[(Target::Current, "3.0")]);

        assert!(is_parsing_error(&pkg));
        assert_eq!(anomalies(&pkg, &[]), vec![Anomaly::ParsingError]);
    }

    #[test]
    fn max_drift_compares_manifest_with_catalog() {
        let raised = with_current(
            web_extension(json!({
                "browser_specific_settings": {"gecko": {"strict_max_version": "115.*"}}
            })),
            "128.*",
        );
        assert_eq!(max_version_drift(&raised), Some(Ordering::Less));

        let reduced = with_current(web_extension(json!({})), "115.*");
        assert_eq!(max_version_drift(&reduced), Some(Ordering::Greater));
        assert!(has_unnecessary_upper_limit(&reduced));
    }

    #[test]
    fn max_drift_skips_legacy_packages() {
        let pkg = with_current(PackageFacts::legacy_artifact(), "68.*");

        assert_eq!(max_version_drift(&pkg), None);
        assert!(!has_unnecessary_upper_limit(&pkg));
    }

    #[test]
    fn unbounded_pure_web_extension_has_no_upper_limit() {
        let pkg = with_current(web_extension(json!({"manifest_version": 2})), "*");

        assert!(!has_unnecessary_upper_limit(&pkg));
        assert_eq!(max_version_drift(&pkg), Some(Ordering::Equal));
    }

    #[test]
    fn unsafe_eval_and_permissions_are_read_from_current_manifest() {
        let pkg = with_current(
            web_extension(json!({
                "content_security_policy": "script-src 'self' 'unsafe-eval'; object-src 'self'",
                "permissions": ["storage", "compose"]
            })),
            "*",
        );

        assert!(uses_unsafe_eval(&pkg));
        assert_eq!(
            requested_permissions(&pkg),
            Some(vec!["storage".to_string(), "compose".to_string()])
        );
        assert_eq!(
            anomalies(&pkg, SUPPORTED),
            vec![Anomaly::UnsafeEval, Anomaly::RequestsPermissions]
        );
    }
}
