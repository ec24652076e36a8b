//! In-memory store
//!
//! A complete implementation of the store traits over hash maps, suitable for tests
//! and for embedding the tracker without a database.
//!
//! # Thread Safety
//!
//! All state sits behind one `tokio::sync::Mutex`. Every trait method takes the
//! guard once, so a lookup-check-write sequence (per-space numbering, the tree
//! topology check) is atomic with respect to other callers.

use crate::criteria::{matches, SpaceFilter};
use crate::db::fractional_ordering::{FractionalOrderCalculator, OrderedItem};
use crate::db::store::{LinkStore, Page, StoreResult, WorkItemStore, WorkItemTypeStore};
use crate::db::DatabaseError;
use crate::models::{
    ensure_single_parent, NewWorkItemRecord, WorkItemLink, WorkItemLinkType, WorkItemRecord,
    WorkItemRevision, WorkItemType,
};
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    types: HashMap<Uuid, WorkItemType>,
    items: HashMap<Uuid, WorkItemRecord>,
    deleted_items: HashMap<Uuid, WorkItemRecord>,
    /// Last number handed out per space
    sequences: HashMap<Uuid, i64>,
    link_types: HashMap<Uuid, WorkItemLinkType>,
    links: HashMap<Uuid, WorkItemLink>,
    revisions: Vec<WorkItemRevision>,
}

impl Inner {
    fn space_items(&self, space_id: Uuid) -> impl Iterator<Item = &WorkItemRecord> {
        self.items.values().filter(move |r| r.space_id == space_id)
    }

    fn parent_links(&self, link_type_id: Uuid, target_id: Uuid) -> Vec<WorkItemLink> {
        self.links
            .values()
            .filter(|l| l.is_active() && l.link_type_id == link_type_id && l.target_id == target_id)
            .cloned()
            .collect()
    }
}

fn ordered(record: &WorkItemRecord) -> OrderedItem {
    OrderedItem::new(record.id, record.execution_order)
}

fn by_order(a: &&WorkItemRecord, b: &&WorkItemRecord) -> Ordering {
    a.execution_order.total_cmp(&b.execution_order)
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every revision recorded so far, oldest first
    pub async fn revisions(&self) -> Vec<WorkItemRevision> {
        self.inner.lock().await.revisions.clone()
    }
}

#[async_trait]
impl WorkItemTypeStore for InMemoryStore {
    async fn get_work_item_type(&self, id: Uuid) -> StoreResult<Option<WorkItemType>> {
        Ok(self.inner.lock().await.types.get(&id).cloned())
    }

    async fn create_work_item_type(&self, wit: &WorkItemType) -> StoreResult<WorkItemType> {
        let mut inner = self.inner.lock().await;
        if inner.types.contains_key(&wit.id) {
            return Err(DatabaseError::sql_execution(format!(
                "work item type {} already exists",
                wit.id
            )));
        }
        inner.types.insert(wit.id, wit.clone());
        Ok(wit.clone())
    }

    async fn list_work_item_types(&self, space_id: Uuid) -> StoreResult<Vec<WorkItemType>> {
        let inner = self.inner.lock().await;
        let mut types: Vec<WorkItemType> = inner
            .types
            .values()
            .filter(|t| t.space_id == space_id)
            .cloned()
            .collect();
        types.sort_by(|a, b| a.path.as_str().cmp(b.path.as_str()));
        Ok(types)
    }
}

#[async_trait]
impl WorkItemStore for InMemoryStore {
    async fn get_work_item(&self, id: Uuid) -> StoreResult<Option<WorkItemRecord>> {
        Ok(self.inner.lock().await.items.get(&id).cloned())
    }

    async fn work_item_exists(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.inner.lock().await.items.contains_key(&id))
    }

    async fn create_work_item(
        &self,
        new: NewWorkItemRecord,
        order_gap: f64,
    ) -> StoreResult<WorkItemRecord> {
        let mut inner = self.inner.lock().await;
        if inner.items.contains_key(&new.id) || inner.deleted_items.contains_key(&new.id) {
            return Err(DatabaseError::sql_execution(format!(
                "work item {} already exists",
                new.id
            )));
        }

        let highest = inner
            .space_items(new.space_id)
            .map(|r| r.execution_order)
            .max_by(f64::total_cmp);
        let execution_order = FractionalOrderCalculator::calculate_order(highest, None, order_gap);

        let sequence = inner.sequences.entry(new.space_id).or_insert(0);
        *sequence += 1;
        let number = *sequence;

        let now = Utc::now();
        let record = WorkItemRecord {
            id: new.id,
            number,
            type_id: new.type_id,
            version: 0,
            fields: new.fields,
            execution_order,
            space_id: new.space_id,
            created_at: now,
            updated_at: now,
        };
        inner.items.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_work_item(&self, record: &WorkItemRecord) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        match inner.items.get_mut(&record.id) {
            Some(stored) if stored.version == record.version => {
                stored.fields = record.fields.clone();
                stored.version += 1;
                stored.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete_work_item(&self, id: Uuid, expected_version: i64) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let current = inner.items.get(&id).map(|r| r.version);
        if current != Some(expected_version) {
            return Ok(0);
        }
        if let Some(record) = inner.items.remove(&id) {
            inner.deleted_items.insert(id, record);
        }
        Ok(1)
    }

    async fn list_work_items(
        &self,
        filter: &SpaceFilter,
        page: Page,
    ) -> StoreResult<(Vec<WorkItemRecord>, u64)> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<&WorkItemRecord> = inner
            .space_items(filter.space_id())
            .filter(|r| matches(filter.expression(), r))
            .collect();
        matching.sort_by(|a, b| by_order(b, a));

        let total = matching.len() as u64;
        let rows = matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok((rows, total))
    }

    async fn highest_order(&self, space_id: Uuid) -> StoreResult<Option<OrderedItem>> {
        let inner = self.inner.lock().await;
        Ok(inner.space_items(space_id).max_by(by_order).map(ordered))
    }

    async fn lowest_order(&self, space_id: Uuid) -> StoreResult<Option<OrderedItem>> {
        let inner = self.inner.lock().await;
        Ok(inner.space_items(space_id).min_by(by_order).map(ordered))
    }

    async fn next_order_above(
        &self,
        space_id: Uuid,
        order: f64,
    ) -> StoreResult<Option<OrderedItem>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .space_items(space_id)
            .filter(|r| r.execution_order > order)
            .min_by(by_order)
            .map(ordered))
    }

    async fn next_order_below(
        &self,
        space_id: Uuid,
        order: f64,
    ) -> StoreResult<Option<OrderedItem>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .space_items(space_id)
            .filter(|r| r.execution_order < order)
            .max_by(by_order)
            .map(ordered))
    }

    async fn update_execution_order(
        &self,
        id: Uuid,
        expected_version: i64,
        order: f64,
    ) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        match inner.items.get_mut(&id) {
            Some(stored) if stored.version == expected_version => {
                stored.execution_order = order;
                stored.version += 1;
                stored.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn respace_execution_orders(&self, space_id: Uuid, gap: f64) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let mut ids: Vec<(Uuid, f64)> = inner
            .space_items(space_id)
            .map(|r| (r.id, r.execution_order))
            .collect();
        ids.sort_by(|a, b| a.1.total_cmp(&b.1));

        let orders = FractionalOrderCalculator::rebalance(ids.len(), gap);
        for ((id, _), order) in ids.iter().zip(orders) {
            if let Some(record) = inner.items.get_mut(id) {
                record.execution_order = order;
            }
        }
        tracing::debug!("Re-spaced {} work items in space {}", ids.len(), space_id);
        Ok(ids.len() as u64)
    }

    async fn record_revision(&self, revision: &WorkItemRevision) -> StoreResult<()> {
        self.inner.lock().await.revisions.push(revision.clone());
        Ok(())
    }
}

#[async_trait]
impl LinkStore for InMemoryStore {
    async fn create_link_type(&self, link_type: &WorkItemLinkType) -> StoreResult<WorkItemLinkType> {
        let mut inner = self.inner.lock().await;
        if inner.link_types.contains_key(&link_type.id) {
            return Err(DatabaseError::sql_execution(format!(
                "link type {} already exists",
                link_type.id
            )));
        }
        inner.link_types.insert(link_type.id, link_type.clone());
        Ok(link_type.clone())
    }

    async fn get_link_type(&self, id: Uuid) -> StoreResult<Option<WorkItemLinkType>> {
        Ok(self.inner.lock().await.link_types.get(&id).cloned())
    }

    async fn get_link(&self, id: Uuid) -> StoreResult<Option<WorkItemLink>> {
        let inner = self.inner.lock().await;
        Ok(inner.links.get(&id).filter(|l| l.is_active()).cloned())
    }

    async fn find_parent_links(
        &self,
        link_type_id: Uuid,
        target_id: Uuid,
    ) -> StoreResult<Vec<WorkItemLink>> {
        Ok(self.inner.lock().await.parent_links(link_type_id, target_id))
    }

    async fn create_link(
        &self,
        link: &WorkItemLink,
        link_type: &WorkItemLinkType,
    ) -> StoreResult<WorkItemLink> {
        let mut inner = self.inner.lock().await;
        if inner.links.contains_key(&link.id) {
            return Err(DatabaseError::sql_execution(format!(
                "link {} already exists",
                link.id
            )));
        }

        let existing = inner.parent_links(link.link_type_id, link.target_id);
        ensure_single_parent(link_type, link, &existing)?;

        inner.links.insert(link.id, link.clone());
        Ok(link.clone())
    }

    async fn update_link(
        &self,
        link: &WorkItemLink,
        link_type: &WorkItemLinkType,
    ) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let current = inner
            .links
            .get(&link.id)
            .filter(|l| l.is_active())
            .map(|l| l.version);
        if current != Some(link.version) {
            return Ok(0);
        }

        let existing = inner.parent_links(link.link_type_id, link.target_id);
        ensure_single_parent(link_type, link, &existing)?;

        let mut updated = link.clone();
        updated.version += 1;
        inner.links.insert(link.id, updated);
        Ok(1)
    }

    async fn delete_link(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.links.get_mut(&id) {
            Some(link) if link.is_active() => {
                link.deleted_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
