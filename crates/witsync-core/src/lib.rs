//! witsync-core library.
//!
//! Replicates work bundles, their children and their related items from one
//! Azure DevOps project to another. Re-runs are idempotent through a
//! correlation field that stores the source id on every replicated item.
//!
//! # Conventions
//!
//! - **Errors**: library boundaries return [`error::ServiceError`] or
//!   [`error::SyncError`]; `anyhow::Result` only where files are loaded.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//! - **Concurrency**: one engine writes to a target project at a time.

pub mod attachments;
pub mod client;
pub mod comments;
pub mod config;
pub mod correlation;
pub mod engine;
pub mod enumerate;
pub mod error;
pub mod mapping;
pub mod model;
pub mod path;
pub mod preflight;
pub mod relations;
pub mod upsert;

pub use client::WorkItemService;
pub use engine::{
    EngineSettings, FailurePolicy, ReplicationEngine, ReplicationOptions, RootOutcome, RootReport,
    RunSummary,
};
pub use enumerate::RootSelection;
pub use error::{ErrorCode, ServiceError, SyncError};
