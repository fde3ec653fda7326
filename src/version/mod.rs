//! Platform version handling
//!
//! - [`compare`]: version ordering and compatibility range checks
//! - [`releases`]: supported platform majors from release metadata

pub mod compare;
pub mod releases;
