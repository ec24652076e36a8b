//! Store Traits - Persistence Abstraction Layer
//!
//! Services talk to persistence only through these traits, so the same business
//! logic runs against [`PgStore`](super::PgStore) in production and
//! [`InMemoryStore`](super::InMemoryStore) in tests and embedded use.
//!
//! # Conventions
//!
//! - Lookups return `Ok(None)` for a miss; deleted rows are never returned.
//! - Conditional writes take the version the caller last observed and return the
//!   number of rows affected. Zero means "not found or stale"; the service layer
//!   re-checks existence to tell the two apart.
//! - Every method that reads and then writes runs in one transaction (or, in
//!   memory, under one lock guard).

use crate::criteria::SpaceFilter;
use crate::db::fractional_ordering::OrderedItem;
use crate::db::DatabaseError;
use crate::models::{
    NewWorkItemRecord, WorkItemLink, WorkItemLinkType, WorkItemRecord, WorkItemRevision,
    WorkItemType,
};
use async_trait::async_trait;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, DatabaseError>;

pub const DEFAULT_PAGE_LIMIT: u64 = 100;

/// Offset/limit window over a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[async_trait]
pub trait WorkItemTypeStore: Send + Sync {
    async fn get_work_item_type(&self, id: Uuid) -> StoreResult<Option<WorkItemType>>;

    async fn create_work_item_type(&self, wit: &WorkItemType) -> StoreResult<WorkItemType>;

    async fn list_work_item_types(&self, space_id: Uuid) -> StoreResult<Vec<WorkItemType>>;
}

#[async_trait]
pub trait WorkItemStore: Send + Sync {
    //
    // CORE CRUD OPERATIONS
    //

    async fn get_work_item(&self, id: Uuid) -> StoreResult<Option<WorkItemRecord>>;

    async fn work_item_exists(&self, id: Uuid) -> StoreResult<bool>;

    /// Insert a new work item
    ///
    /// The store assigns the next per-space `number` and places the item on top of
    /// its space (`highest order + order_gap`), atomically with the insert.
    async fn create_work_item(
        &self,
        new: NewWorkItemRecord,
        order_gap: f64,
    ) -> StoreResult<WorkItemRecord>;

    /// Replace the field document if `record.version` is still current
    ///
    /// A successful update bumps the version and `updated_at`.
    async fn update_work_item(&self, record: &WorkItemRecord) -> StoreResult<u64>;

    /// Soft-delete if `expected_version` is still current
    async fn delete_work_item(&self, id: Uuid, expected_version: i64) -> StoreResult<u64>;

    /// One page of matching items, highest execution order first, plus the total count
    async fn list_work_items(
        &self,
        filter: &SpaceFilter,
        page: Page,
    ) -> StoreResult<(Vec<WorkItemRecord>, u64)>;

    //
    // ORDERING
    //

    async fn highest_order(&self, space_id: Uuid) -> StoreResult<Option<OrderedItem>>;

    async fn lowest_order(&self, space_id: Uuid) -> StoreResult<Option<OrderedItem>>;

    /// The item with the smallest order strictly greater than `order`
    async fn next_order_above(&self, space_id: Uuid, order: f64)
        -> StoreResult<Option<OrderedItem>>;

    /// The item with the largest order strictly less than `order`
    async fn next_order_below(&self, space_id: Uuid, order: f64)
        -> StoreResult<Option<OrderedItem>>;

    /// Set one item's order if `expected_version` is still current; bumps the version
    async fn update_execution_order(
        &self,
        id: Uuid,
        expected_version: i64,
        order: f64,
    ) -> StoreResult<u64>;

    /// Re-space every item of a space to `rank × gap`, keeping relative order
    ///
    /// Versions are left untouched. Returns the number of items re-spaced.
    async fn respace_execution_orders(&self, space_id: Uuid, gap: f64) -> StoreResult<u64>;

    //
    // AUDIT
    //

    async fn record_revision(&self, revision: &WorkItemRevision) -> StoreResult<()>;
}

#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn create_link_type(&self, link_type: &WorkItemLinkType) -> StoreResult<WorkItemLinkType>;

    async fn get_link_type(&self, id: Uuid) -> StoreResult<Option<WorkItemLinkType>>;

    async fn get_link(&self, id: Uuid) -> StoreResult<Option<WorkItemLink>>;

    /// Active links of `link_type_id` pointing at `target_id`
    async fn find_parent_links(
        &self,
        link_type_id: Uuid,
        target_id: Uuid,
    ) -> StoreResult<Vec<WorkItemLink>>;

    /// Insert a link, enforcing its type's topology atomically with the write
    async fn create_link(
        &self,
        link: &WorkItemLink,
        link_type: &WorkItemLinkType,
    ) -> StoreResult<WorkItemLink>;

    /// Rewrite a link if `link.version` is still current, re-checking the topology
    async fn update_link(&self, link: &WorkItemLink, link_type: &WorkItemLinkType)
        -> StoreResult<u64>;

    /// Soft-delete an active link
    async fn delete_link(&self, id: Uuid) -> StoreResult<bool>;
}
