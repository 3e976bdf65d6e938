//! Notification store - read-model for a multi-tenant notification platform
//!
//! Joins per-recipient notification records with the publish payload they
//! reference, and serves them one at a time or as filtered, newest-first
//! pages. Storage is MongoDB in production; the same pipelines run against
//! an in-memory executor in tests and dev mode.
//!
//! ## Modules
//!
//! - **query**: filter flags, match criteria and aggregation pipelines
//! - **db**: the executor seam, the MongoDB client and the in-memory executor
//! - **views**: caller-facing page results and the assembler that builds them
//! - **repository**: the operations exposed to the API layer

pub mod config;
pub mod db;
pub mod logging;
pub mod query;
pub mod repository;
pub mod types;
pub mod views;

pub use config::Args;
pub use repository::{CollectionNames, MarkRequest, NotificationRepository};
pub use types::{Result, StoreError};
pub use views::{NotificationView, PageResult};
