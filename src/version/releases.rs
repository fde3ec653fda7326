//! Supported platform versions derived from product-details release metadata

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::version::compare::major_of;

/// Response of `thunderbird_versions.json`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ReleasePointers {
    #[serde(rename = "THUNDERBIRD_ESR", default)]
    pub esr: Option<String>,
    #[serde(rename = "THUNDERBIRD_ESR_NEXT", default)]
    pub next_esr: Option<String>,
    #[serde(rename = "LATEST_THUNDERBIRD_VERSION", default)]
    pub latest: Option<String>,
}

/// Single entry of `thunderbird.json`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Release {
    pub category: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseHistory {
    releases: HashMap<String, Release>,
}

/// Platform versions the compatibility index is built for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformVersions {
    /// Current ESR major
    pub esr: Option<u32>,
    /// Full version string of the current ESR
    pub esr_version: Option<String>,
    /// Announced next ESR major
    pub next_esr: Option<u32>,
    /// Latest monthly release major
    pub release: Option<u32>,
    /// Full version string of the latest release
    pub release_version: Option<String>,
    /// Tracked majors, ascending
    pub supported: Vec<u32>,
}

/// Compute the tracked majors from release metadata
///
/// Collects the majors of all ESR releases, the fixed legacy ESR majors and
/// the current ESR, next ESR and latest release, then keeps the `window`
/// highest ones in ascending order.
pub fn resolve_supported_versions<'a, I>(
    releases: I,
    pointers: &ReleasePointers,
    legacy_esr: &[u32],
    window: usize,
) -> PlatformVersions
where
    I: IntoIterator<Item = &'a Release>,
{
    let pointer_major = |v: &Option<String>| v.as_deref().and_then(major_of);
    let esr = pointer_major(&pointers.esr);
    let next_esr = pointer_major(&pointers.next_esr);
    let release = pointer_major(&pointers.latest);

    let mut supported: Vec<u32> = releases
        .into_iter()
        .filter(|r| r.category == "esr")
        .filter_map(|r| major_of(&r.version))
        .chain(legacy_esr.iter().copied())
        .chain([esr, next_esr, release].into_iter().flatten())
        .collect();

    supported.sort_unstable();
    supported.dedup();
    let skip = supported.len().saturating_sub(window);
    supported.drain(..skip);

    PlatformVersions {
        esr,
        esr_version: pointers.esr.clone().filter(|v| !v.is_empty()),
        next_esr,
        release,
        release_version: pointers.latest.clone().filter(|v| !v.is_empty()),
        supported,
    }
}

/// Client for the product-details service
pub struct ReleaseClient {
    client: reqwest::Client,
    base_url: String,
    app: String,
}

impl ReleaseClient {
    pub fn new(base_url: &str, app: &str) -> Result<Self, FetchError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("addon-compat/", env!("CARGO_PKG_VERSION")))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            app: app.to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("product-details returned status {}: {}", status, url);
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response.json().await.map_err(|e| {
            warn!("Failed to parse product-details response: {}", e);
            FetchError::InvalidResponse(e.to_string())
        })
    }

    /// Fetch release metadata and resolve the tracked majors
    ///
    /// Both documents are read from the base URL the client was built with.
    pub async fn fetch_platform_versions(
        &self,
        legacy_esr: &[u32],
        window: usize,
    ) -> Result<PlatformVersions, FetchError> {
        let pointers: ReleasePointers = self
            .get_json(&format!("{}/{}_versions.json", self.base_url, self.app))
            .await?;
        let history: ReleaseHistory = self
            .get_json(&format!("{}/{}.json", self.base_url, self.app))
            .await?;
        debug!("Fetched {} releases", history.releases.len());

        Ok(resolve_supported_versions(
            history.releases.values(),
            &pointers,
            legacy_esr,
            window,
        ))
    }
}
