use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

// =============================================================================
// Catalog API constants
// =============================================================================

/// Default base URL for the add-on catalog API (v4)
pub const DEFAULT_CATALOG_URL: &str = "https://addons.thunderbird.net/api/v4";

/// Default base URL for the product-details service
pub const DEFAULT_RELEASES_URL: &str = "https://product-details.mozilla.org/1.0";

/// Page size used when walking a package's version history
pub const VERSION_PAGE_SIZE: u32 = 50;

/// Add-on that the catalog lists but cannot serve through its API
pub const BROKEN_CATALOG_GUID: &str = "layout@sample.extensions.thunderbird.net";

// =============================================================================
// Time-related constants
// =============================================================================

/// Maximum attempts for a single catalog call
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Delay before the first attempt of a call in milliseconds
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Delay before every retry in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// Hard timeout for a single catalog call in milliseconds (15 seconds)
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 15_000;

/// Download + extract cycles per archive
pub const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 2;

// =============================================================================
// Supported versions
// =============================================================================

/// Number of most recent majors that are tracked
pub const DEFAULT_SUPPORTED_WINDOW: usize = 7;

/// ESR majors released while the product-details feed had no ESR entries
pub const LEGACY_ESR_MAJORS: &[u32] = &[24, 31, 38, 45, 52, 60, 68, 78, 91, 102, 115];

/// Crawler configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub catalog: CatalogConfig,
    pub releases: ReleasesConfig,
    pub retry: RetryConfig,
    pub download: DownloadConfig,
    /// Ignore the persisted snapshot and process every package again
    pub force_reprocessing: bool,
    /// Overrides the default data directory
    pub data_dir: Option<PathBuf>,
}

/// Catalog API configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogConfig {
    pub base_url: String,
    /// Application the catalog is filtered by and compatibility is read for
    pub app: String,
    pub addon_type: String,
    pub version_page_size: u32,
    /// Guids skipped during synchronization
    pub ignored_guids: Vec<String>,
    /// Guids that never inherit cached data and are always ingested
    pub recheck_guids: Vec<String>,
    /// Stop the search after this many pages (0 means no limit)
    pub max_search_pages: u32,
    pub cdn_bypass: Option<HostRewrite>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_URL.to_string(),
            app: "thunderbird".to_string(),
            addon_type: "extension".to_string(),
            version_page_size: VERSION_PAGE_SIZE,
            ignored_guids: vec![BROKEN_CATALOG_GUID.to_string()],
            recheck_guids: Vec::new(),
            max_search_pages: 0,
            cdn_bypass: Some(HostRewrite::default()),
        }
    }
}

/// Replaces the CDN host of download URLs by a host serving files directly
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostRewrite {
    pub from: String,
    pub to: String,
}

impl Default for HostRewrite {
    fn default() -> Self {
        Self {
            from: "//addons.thunderbird.net/".to_string(),
            to: "//services.addons.thunderbird.net/".to_string(),
        }
    }
}

impl HostRewrite {
    pub fn apply(&self, url: &str) -> String {
        url.replacen(&self.from, &self.to, 1)
    }
}

/// Release metadata configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ReleasesConfig {
    pub base_url: String,
    pub window: usize,
    pub legacy_esr: Vec<u32>,
}

impl Default for ReleasesConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RELEASES_URL.to_string(),
            window: DEFAULT_SUPPORTED_WINDOW,
            legacy_esr: LEGACY_ESR_MAJORS.to_vec(),
        }
    }
}

/// Retry policy for catalog calls
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }
}

/// Archive download configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DownloadConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub retry_delay_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl Config {
    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the configured data directory or the platform default.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(data_dir)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir().join("data.json")
    }

    pub fn package_log_path(&self) -> PathBuf {
        self.data_dir().join("log.json")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir().join("downloads")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir().join("addon-compat.log")
    }
}

/// Returns the path to the data directory for addon-compat.
/// Uses $XDG_DATA_HOME/addon-compat if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/addon-compat,
/// or ./addon-compat if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("addon-compat")
}
