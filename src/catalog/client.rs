//! Catalog API trait and its HTTP implementation

#[cfg(test)]
use mockall::automock;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::types::{CatalogEntry, Page, VersionEntry};
use crate::config::CatalogConfig;
use crate::error::FetchError;

/// Search query over the catalog, sorted by creation time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub app: String,
    pub addon_type: String,
    pub page: u32,
}

impl SearchQuery {
    /// Sort key of the search; creation time never changes, so page
    /// boundaries stay stable while the crawl is running.
    pub const SORT: &'static str = "created";

    pub fn first(app: &str, addon_type: &str) -> Self {
        Self {
            app: app.to_string(),
            addon_type: addon_type.to_string(),
            page: 1,
        }
    }

    pub fn next_page(&self) -> Self {
        Self {
            page: self.page + 1,
            ..self.clone()
        }
    }
}

/// Trait for reading the add-on catalog
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait CatalogApi: Send + Sync {
    /// Fetches one page of the catalog search
    async fn search(&self, query: &SearchQuery) -> Result<Page<CatalogEntry>, FetchError>;

    /// Fetches one page of a package's version history, newest first
    async fn versions(
        &self,
        guid: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<VersionEntry>, FetchError>;
}

/// Catalog implementation for the addons.thunderbird.net API
pub struct AtnCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl AtnCatalog {
    /// Creates a new AtnCatalog with a custom base URL
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("addon-compat/", env!("CARGO_PKG_VERSION")))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self, FetchError> {
        Self::new(&config.base_url)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Page<T>, FetchError> {
        let url = reqwest::Url::parse_with_params(url, query)
            .map_err(|e| FetchError::InvalidResponse(format!("invalid url {}: {}", url, e)))?;
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            warn!("Catalog returned status {}: {}", status, url);
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let page: Page<Value> = response.json().await.map_err(|e| {
            warn!("Failed to parse catalog response: {}", e);
            FetchError::InvalidResponse(e.to_string())
        })?;
        Ok(page.decode())
    }
}

#[async_trait::async_trait]
impl CatalogApi for AtnCatalog {
    async fn search(&self, query: &SearchQuery) -> Result<Page<CatalogEntry>, FetchError> {
        let url = format!("{}/addons/search/", self.base_url);
        self.get_page(
            &url,
            &[
                ("page", query.page.to_string()),
                ("app", query.app.clone()),
                ("type", query.addon_type.clone()),
                ("sort", SearchQuery::SORT.to_string()),
            ],
        )
        .await
    }

    async fn versions(
        &self,
        guid: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<VersionEntry>, FetchError> {
        let url = format!(
            "{}/addons/addon/{}/versions/",
            self.base_url,
            encode_path_segment(guid)
        );
        self.get_page(
            &url,
            &[("page", page.to_string()), ("page_size", page_size.to_string())],
        )
        .await
    }
}

/// Percent-encode characters of a guid that are not path-safe (`{`, `}`, `@` stay)
fn encode_path_segment(segment: &str) -> String {
    segment
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'@' | b'{'
            | b'}' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}
