//! sfsync-core: keeps a GitHub-style issue tracker in step with a
//! compliance-test catalog.
//!
//! Each enabled failing test maps to exactly one open issue, found again on
//! later runs through the `Secureframe ID` marker in its body.
//!
//! # Conventions
//!
//! - **Errors**: typed errors (`thiserror`) at module seams, `anyhow::Result`
//!   from the [`tracker::Tracker`] and [`catalog::Catalog`] traits.
//! - **Logging**: `tracing` macros. No module prints to stdout.

pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod labels;
pub mod model;
pub mod pacing;
pub mod reconcile;
pub mod render;
pub mod tracker;

pub use config::{SyncConfig, load_config};
pub use error::{ErrorCode, SyncError};
pub use reconcile::{SyncOptions, SyncReport, sync};
