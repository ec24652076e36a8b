//! Business Services
//!
//! This module contains the business logic services of the tracker:
//!
//! - `WorkItemTypeService` - type creation with inheritance, cached lookups
//! - `WorkItemService` - CRUD, criteria queries and fractional reordering
//! - `WorkItemLinkService` - link types and links, tree topology enforcement
//!
//! Services coordinate between the store traits and callers. They own the error
//! taxonomy callers see ([`TrackerError`]) and every optimistic-concurrency
//! disambiguation.

pub mod error;
pub mod link_service;
pub mod type_cache;
pub mod work_item_service;
pub mod work_item_type_service;

pub use error::TrackerError;
pub use link_service::WorkItemLinkService;
pub use type_cache::{CacheStats, WorkItemTypeCache};
pub use work_item_service::WorkItemService;
pub use work_item_type_service::WorkItemTypeService;
