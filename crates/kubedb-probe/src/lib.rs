//!
//! # KubeDB probe
//!
//! Commands that exercise the KubeDB client against a cluster: listing,
//! indexed lookups, resource estimates and sample object creation.
//!
pub mod archiver;
pub mod cli;
pub mod projection;
pub mod resource_metrics;

pub use self::cli::Root;
