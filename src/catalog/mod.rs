//! Add-on catalog access
//!
//! - [`client`]: `CatalogApi` trait and the HTTP implementation
//! - [`retry`]: deadline-raced calls and the retry combinator
//! - [`types`]: wire types of search and version responses

pub mod client;
pub mod retry;
pub mod types;

pub use client::{AtnCatalog, CatalogApi, SearchQuery};
pub use retry::{CallOutcome, RetryPolicy, with_deadline};
pub use types::{CatalogEntry, Page, VersionEntry};
