//! End-to-end crawl tests: in-memory catalog, archives served over HTTP

mod helper;

use std::cmp::Ordering;

use tempfile::TempDir;

use addon_compat::analysis::{self, Anomaly};
use addon_compat::ingest::ArchiveFetcher;
use addon_compat::model::{PackageFacts, Target};
use addon_compat::runner::run_with;
use addon_compat::snapshot::SnapshotStore;

use helper::{FakeCatalog, catalog_entry, test_config, version_entry, xpi};

const SUPPORTED: &[u32] = &[102, 115, 128];

const MODERN_MANIFEST: &str = r#"{
    // comments are allowed
    "manifest_version": 2,
    "name": "Modern",
    "version": "2.0",
    "browser_specific_settings": {"gecko": {"id": "modern@example.org", "strict_max_version": "115.*"}},
    "permissions": ["storage"]
}"#;

#[tokio::test]
async fn first_run_ingests_every_package_and_writes_snapshot() {
    let mut server = mockito::Server::new_async().await;
    let legacy_xpi = server
        .mock("GET", "/files/10.xpi")
        .with_status(200)
        .with_body(xpi(&[("install.rdf", "<RDF/>"), ("chrome.manifest", "")]))
        .expect(1)
        .create_async()
        .await;
    let modern_xpi = server
        .mock("GET", "/files/20.xpi")
        .with_status(200)
        .with_body(xpi(&[("manifest.json", MODERN_MANIFEST)]))
        .expect(1)
        .create_async()
        .await;

    let catalog = FakeCatalog::new();
    catalog.publish(
        catalog_entry(1, "legacy-tool", "1.0", 2),
        vec![version_entry(10, "1.0", "60", "68.*", &format!("{}/files/10.xpi", server.url()))],
    );
    catalog.publish(
        catalog_entry(2, "modern", "2.0", 2),
        vec![version_entry(20, "2.0", "115", "128.*", &format!("{}/files/20.xpi", server.url()))],
    );

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let fetcher = ArchiveFetcher::new(None).unwrap();

    let summary = run_with(&config, &catalog, &fetcher, SUPPORTED).await.unwrap();

    legacy_xpi.assert_async().await;
    modern_xpi.assert_async().await;
    assert_eq!(summary.sync.updated, vec![1, 2]);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.total, 2);

    let packages = SnapshotStore::new(config.snapshot_path(), config.package_log_path())
        .load()
        .unwrap();

    let legacy = &packages[&1];
    assert_eq!(
        legacy.index.facts_for(Target::Current),
        Some(&PackageFacts::legacy_artifact())
    );
    assert_eq!(legacy.index.version_for(Target::Major(102)), None);

    let modern = &packages[&2];
    assert_eq!(modern.index.version_for(Target::Major(115)), Some("2.0"));
    assert_eq!(modern.index.version_for(Target::Major(128)), Some("2.0"));
    assert!(modern.index.facts_for(Target::Current).unwrap().web_extension);
    assert_eq!(analysis::max_version_drift(modern), Some(Ordering::Less));
    assert!(analysis::anomalies(modern, SUPPORTED).contains(&Anomaly::MaxRaised));

    let log = std::fs::read_to_string(config.package_log_path()).unwrap();
    assert!(log.contains("1-legacy-tool@example.org-legacy-tool"));
}

#[tokio::test]
async fn later_runs_skip_unchanged_packages_and_drop_delisted_ones() {
    let mut server = mockito::Server::new_async().await;
    let _v1 = server
        .mock("GET", "/files/10.xpi")
        .with_status(200)
        .with_body(xpi(&[("manifest.json", r#"{"manifest_version": 2}"#)]))
        .create_async()
        .await;
    let _v2 = server
        .mock("GET", "/files/11.xpi")
        .with_status(200)
        .with_body(xpi(&[(
            "manifest.json",
            r#"{"manifest_version": 2, "experiment_apis": {"LegacyPrefs": {}}}"#,
        )]))
        .create_async()
        .await;
    let _other = server
        .mock("GET", "/files/30.xpi")
        .with_status(200)
        .with_body(xpi(&[("manifest.json", "{}")]))
        .create_async()
        .await;
    let url = |id: u64| format!("{}/files/{}.xpi", server.url(), id);

    let catalog = FakeCatalog::new();
    catalog.publish(
        catalog_entry(1, "steady", "1.0", 2),
        vec![version_entry(10, "1.0", "102", "*", &url(10))],
    );
    catalog.publish(
        catalog_entry(3, "short-lived", "1.0", 2),
        vec![version_entry(30, "1.0", "115", "*", &url(30))],
    );

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let fetcher = ArchiveFetcher::new(None).unwrap();

    run_with(&config, &catalog, &fetcher, SUPPORTED).await.unwrap();
    let calls_after_first_run = catalog.version_calls();

    // nothing changed: no history requests at all
    let summary = run_with(&config, &catalog, &fetcher, SUPPORTED).await.unwrap();
    assert!(summary.sync.updated.is_empty());
    assert_eq!(summary.sync.unchanged, vec![1, 3]);
    assert_eq!(catalog.version_calls(), calls_after_first_run);

    // new upload of one package, another one delisted
    catalog.publish(
        catalog_entry(1, "steady", "1.1", 9),
        vec![
            version_entry(11, "1.1", "128", "*", &url(11)),
            version_entry(10, "1.0", "102", "*", &url(10)),
        ],
    );
    catalog.unpublish(3);

    let summary = run_with(&config, &catalog, &fetcher, SUPPORTED).await.unwrap();
    assert_eq!(summary.sync.updated, vec![1]);
    assert_eq!(summary.sync.removed, vec![3]);

    let packages = SnapshotStore::new(config.snapshot_path(), config.package_log_path())
        .load()
        .unwrap();
    assert!(!packages.contains_key(&3));
    let steady = &packages[&1];
    assert_eq!(steady.versions.len(), 2);
    assert_eq!(steady.index.version_for(Target::Current), Some("1.1"));
    assert_eq!(steady.index.version_for(Target::Major(102)), Some("1.0"));
    assert_eq!(steady.index.version_for(Target::Major(128)), Some("1.1"));
    assert!(steady.index.facts_for(Target::Current).unwrap().experiment);
}

#[tokio::test]
async fn unreachable_archive_is_retried_on_next_run() {
    let mut server = mockito::Server::new_async().await;
    let missing = server
        .mock("GET", "/files/40.xpi")
        .with_status(404)
        .expect(4)
        .create_async()
        .await;

    let catalog = FakeCatalog::new();
    catalog.publish(
        catalog_entry(4, "gone", "1.0", 2),
        vec![version_entry(40, "1.0", "115", "*", &format!("{}/files/40.xpi", server.url()))],
    );

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let fetcher = ArchiveFetcher::new(None).unwrap();

    let first = run_with(&config, &catalog, &fetcher, SUPPORTED).await.unwrap();
    let second = run_with(&config, &catalog, &fetcher, SUPPORTED).await.unwrap();

    missing.assert_async().await;
    assert_eq!(first.processed, 1);
    assert_eq!(second.sync.updated, vec![4]);
    let packages = SnapshotStore::new(config.snapshot_path(), config.package_log_path())
        .load()
        .unwrap();
    assert!(analysis::is_parsing_error(&packages[&4]));
}
