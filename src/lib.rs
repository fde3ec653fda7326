pub mod analysis;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod runner;
pub mod snapshot;
pub mod sync;
pub mod version;
