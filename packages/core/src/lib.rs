//! Work Item Tracker Core
//!
//! Persistence and query layer of an issue and work item tracker.
//!
//! # Architecture
//!
//! - **Dynamic schemas**: every work item type declares its own field set; types
//!   extend a base type by copying its fields and recording it in a materialized path
//! - **One JSON document per item**: converted field values live in a `Fields`
//!   JSONB column next to a handful of native columns
//! - **Criteria compiler**: boolean expressions compile to parameterized SQL, with
//!   JSONB containment for document fields and plain comparisons for columns
//! - **Fractional ordering**: moving an item rewrites only that item's order
//!
//! # Modules
//!
//! - [`models`] - Field types, work item types, work items and links
//! - [`criteria`] - Expression tree, SQL compiler and in-memory matcher
//! - [`db`] - Store traits with Postgres and in-memory implementations
//! - [`services`] - Business services (WorkItemService, WorkItemLinkService, etc.)
//! - [`config`] - Environment-driven configuration
//! - [`logging`] - Tracing subscriber setup

pub mod config;
pub mod criteria;
pub mod db;
pub mod logging;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{DatabaseConfig, OrderingConfig, TrackerConfig};
pub use criteria::{Expression, LiteralValue};
pub use db::{InMemoryStore, Page, PgStore, ReorderDirection};
pub use models::*;
pub use services::*;
