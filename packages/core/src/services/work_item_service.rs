//! Work Item Service - Core CRUD, query and reorder operations
//!
//! This module provides the business logic layer for work items:
//!
//! - Field conversion through the owning work item type on every read and write
//! - Per-space scoping (every lookup checks the item's space, every list is
//!   compiled with a space filter)
//! - Optimistic concurrency on save, delete and reorder
//! - Revision records stamped with the acting identity
//!
//! # Examples
//!
//! ```no_run
//! use witrack_core::db::InMemoryStore;
//! use witrack_core::models::{planner_item_fields, system, FieldValue, NewWorkItemType};
//! use witrack_core::services::{WorkItemService, WorkItemTypeCache, WorkItemTypeService};
//! use witrack_core::config::OrderingConfig;
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! let types = WorkItemTypeService::new(store.clone(), Arc::new(WorkItemTypeCache::new()));
//! let items = WorkItemService::new(store, types.clone(), OrderingConfig::default());
//!
//! let space = Uuid::new_v4();
//! let bug = types
//!     .create(NewWorkItemType::new("bug", space).with_fields(planner_item_fields()), None)
//!     .await?;
//!
//! let mut fields = BTreeMap::new();
//! fields.insert(system::TITLE.to_string(), FieldValue::from("Crash on save"));
//! fields.insert(system::STATE.to_string(), FieldValue::from("new"));
//! let item = items.create(space, bug.id, fields, Uuid::new_v4()).await?;
//! assert_eq!(item.number, 1);
//! # Ok(())
//! # }
//! ```

use crate::config::OrderingConfig;
use crate::criteria::{Expression, SpaceFilter};
use crate::db::{
    DatabaseError, FractionalOrderCalculator, OrderPlacement, OrderedItem, Page, ReorderDirection,
    WorkItemStore,
};
use crate::models::{
    system, FieldValue, NewWorkItemRecord, RevisionKind, WorkItem, WorkItemRecord,
    WorkItemRevision, WorkItemType,
};
use crate::services::error::TrackerError;
use crate::services::work_item_type_service::WorkItemTypeService;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

pub const ENTITY: &str = "work item";

#[derive(Clone)]
pub struct WorkItemService {
    store: Arc<dyn WorkItemStore>,
    types: WorkItemTypeService,
    config: OrderingConfig,
}

impl WorkItemService {
    pub fn new(
        store: Arc<dyn WorkItemStore>,
        types: WorkItemTypeService,
        config: OrderingConfig,
    ) -> Self {
        Self {
            store,
            types,
            config,
        }
    }

    pub fn ordering(&self) -> &OrderingConfig {
        &self.config
    }

    //
    // CORE CRUD OPERATIONS
    //

    /// Create a work item of `type_id` in `space_id`
    ///
    /// The new item gets the next number of its space and lands on top of the
    /// ordering. `creator` fills `system.creator` when the type defines that field and
    /// the caller left it empty.
    pub async fn create(
        &self,
        space_id: Uuid,
        type_id: Uuid,
        mut fields: BTreeMap<String, FieldValue>,
        creator: Uuid,
    ) -> Result<WorkItem, TrackerError> {
        let wit = self.type_in_space(space_id, type_id).await?;

        if wit.field(system::CREATOR).is_some()
            && fields.get(system::CREATOR).map_or(true, FieldValue::is_null)
        {
            fields.insert(
                system::CREATOR.to_string(),
                FieldValue::String(creator.to_string()),
            );
        }

        let stored = wit.convert_fields_to_model(&fields)?;
        let record = self
            .store
            .create_work_item(
                NewWorkItemRecord {
                    id: Uuid::new_v4(),
                    type_id,
                    fields: stored,
                    space_id,
                },
                self.config.gap,
            )
            .await?;

        self.store
            .record_revision(&WorkItemRevision::new(RevisionKind::Create, creator, &record))
            .await?;

        tracing::info!(
            "Created work item {} (#{}) of type '{}' in space {}",
            record.id,
            record.number,
            wit.name,
            space_id
        );
        Ok(WorkItem::from_record(record, &wit)?)
    }

    pub async fn load(&self, space_id: Uuid, id: Uuid) -> Result<WorkItem, TrackerError> {
        let record = self.stored(space_id, id).await?;
        let wit = self.types.load(record.type_id).await?;
        Ok(WorkItem::from_record(record, &wit)?)
    }

    /// Persist the fields of `item` if its version is still current
    ///
    /// The type of an item cannot change. Number, order and timestamps are owned by
    /// the store and ignored here.
    pub async fn save(
        &self,
        space_id: Uuid,
        item: &WorkItem,
        modifier: Uuid,
    ) -> Result<WorkItem, TrackerError> {
        let stored = self.stored(space_id, item.id).await?;
        if stored.version != item.version {
            return Err(self.conflict(item.id, item.version, stored.version));
        }
        if stored.type_id != item.type_id {
            return Err(TrackerError::bad_parameter(
                "type",
                format!(
                    "work item {} is of type {} and cannot change to {}",
                    item.id, stored.type_id, item.type_id
                ),
            ));
        }

        let wit = self.types.load(stored.type_id).await?;
        let record = WorkItemRecord {
            fields: wit.convert_fields_to_model(&item.fields)?,
            ..stored
        };

        let rows = self.store.update_work_item(&record).await?;
        if rows == 0 {
            return Err(self.conflict_or_missing(item.id, item.version).await);
        }

        let updated = self.stored(space_id, item.id).await?;
        self.store
            .record_revision(&WorkItemRevision::new(RevisionKind::Update, modifier, &updated))
            .await?;

        tracing::info!(
            "Saved work item {} at version {}",
            updated.id,
            updated.version
        );
        Ok(WorkItem::from_record(updated, &wit)?)
    }

    /// Soft-delete a work item if `version` is still current
    pub async fn delete(
        &self,
        space_id: Uuid,
        id: Uuid,
        version: i64,
        modifier: Uuid,
    ) -> Result<(), TrackerError> {
        let stored = self.stored(space_id, id).await?;

        let rows = self.store.delete_work_item(id, version).await?;
        if rows == 0 {
            return Err(self.conflict_or_missing(id, version).await);
        }

        self.store
            .record_revision(&WorkItemRevision::new(RevisionKind::Delete, modifier, &stored))
            .await?;

        tracing::info!("Deleted work item {} (#{})", id, stored.number);
        Ok(())
    }

    /// One page of items matching `criteria`, highest execution order first
    ///
    /// Returns the page and the total number of matches.
    pub async fn list(
        &self,
        space_id: Uuid,
        criteria: Option<Expression>,
        page: Page,
    ) -> Result<(Vec<WorkItem>, u64), TrackerError> {
        let filter = SpaceFilter::compile(space_id, criteria)?;
        let (records, total) = self.store.list_work_items(&filter, page).await?;

        let mut types: BTreeMap<Uuid, WorkItemType> = BTreeMap::new();
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            if !types.contains_key(&record.type_id) {
                let wit = self.types.load(record.type_id).await?;
                types.insert(record.type_id, wit);
            }
            if let Some(wit) = types.get(&record.type_id) {
                items.push(WorkItem::from_record(record, wit)?);
            }
        }
        Ok((items, total))
    }

    //
    // ORDERING
    //

    /// Move `item` relative to `target_id` or to an end of its space
    ///
    /// Only the moved item's order changes, unless its neighbours have run out of
    /// room; then the whole space is re-spaced once and the placement recomputed.
    pub async fn reorder(
        &self,
        space_id: Uuid,
        item: &WorkItem,
        direction: ReorderDirection,
        target_id: Option<Uuid>,
        modifier: Uuid,
    ) -> Result<WorkItem, TrackerError> {
        let stored = self.stored(space_id, item.id).await?;
        if stored.version != item.version {
            return Err(self.conflict(item.id, item.version, stored.version));
        }

        let target = if direction.needs_target() {
            let target_id = target_id.ok_or_else(|| {
                TrackerError::bad_parameter(
                    "targetID",
                    format!("reorder {} requires a target work item", direction),
                )
            })?;
            if target_id == item.id {
                return Err(TrackerError::bad_parameter(
                    "targetID",
                    "a work item cannot be reordered relative to itself",
                ));
            }
            Some(self.target_in_space(space_id, target_id).await?)
        } else {
            None
        };

        let mut placement = self.placement(space_id, item.id, direction, target.as_ref()).await?;
        if placement == OrderPlacement::Rebalance {
            tracing::warn!(
                "Execution order gap exhausted in space {}: re-spacing before moving {}",
                space_id,
                item.id
            );
            self.store
                .respace_execution_orders(space_id, self.config.gap)
                .await?;
            let target = match target {
                Some(t) => Some(self.target_in_space(space_id, t.id).await?),
                None => None,
            };
            placement = self.placement(space_id, item.id, direction, target.as_ref()).await?;
        }

        let order = match placement {
            OrderPlacement::Unchanged => {
                tracing::debug!("Work item {} already {} target, order unchanged", item.id, direction);
                return self.load(space_id, item.id).await;
            }
            OrderPlacement::At(order) => order,
            OrderPlacement::Rebalance => {
                return Err(TrackerError::Internal(DatabaseError::sql_execution(format!(
                    "no execution order available for {} after re-spacing space {}",
                    item.id, space_id
                ))))
            }
        };

        let rows = self
            .store
            .update_execution_order(item.id, item.version, order)
            .await?;
        if rows == 0 {
            return Err(self.conflict_or_missing(item.id, item.version).await);
        }

        let updated = self.stored(space_id, item.id).await?;
        self.store
            .record_revision(&WorkItemRevision::new(RevisionKind::Update, modifier, &updated))
            .await?;

        tracing::info!(
            "Moved work item {} {} to execution order {}",
            item.id,
            direction,
            order
        );
        let wit = self.types.load(updated.type_id).await?;
        Ok(WorkItem::from_record(updated, &wit)?)
    }

    async fn placement(
        &self,
        space_id: Uuid,
        item_id: Uuid,
        direction: ReorderDirection,
        target: Option<&OrderedItem>,
    ) -> Result<OrderPlacement, TrackerError> {
        let placement = match (direction, target) {
            (ReorderDirection::Above, Some(target)) => {
                let above = self
                    .store
                    .next_order_above(space_id, target.execution_order)
                    .await?;
                FractionalOrderCalculator::place_above(item_id, target, above.as_ref(), &self.config)
            }
            (ReorderDirection::Below, Some(target)) => {
                let below = self
                    .store
                    .next_order_below(space_id, target.execution_order)
                    .await?;
                FractionalOrderCalculator::place_below(item_id, target, below.as_ref(), &self.config)
            }
            (ReorderDirection::Top, _) => match self.store.highest_order(space_id).await? {
                Some(highest) => FractionalOrderCalculator::place_top(item_id, &highest, &self.config),
                None => OrderPlacement::Unchanged,
            },
            (ReorderDirection::Bottom, _) => match self.store.lowest_order(space_id).await? {
                Some(lowest) => FractionalOrderCalculator::place_bottom(item_id, &lowest, &self.config),
                None => OrderPlacement::Unchanged,
            },
            (direction, None) => {
                return Err(TrackerError::bad_parameter(
                    "targetID",
                    format!("reorder {} requires a target work item", direction),
                ))
            }
        };
        Ok(placement)
    }

    async fn target_in_space(&self, space_id: Uuid, id: Uuid) -> Result<OrderedItem, TrackerError> {
        match self.store.get_work_item(id).await? {
            Some(record) if record.space_id == space_id => {
                Ok(OrderedItem::new(record.id, record.execution_order))
            }
            _ => Err(TrackerError::bad_parameter(
                "targetID",
                format!("target work item {} does not exist", id),
            )),
        }
    }

    //
    // HELPERS
    //

    async fn stored(&self, space_id: Uuid, id: Uuid) -> Result<WorkItemRecord, TrackerError> {
        match self.store.get_work_item(id).await? {
            Some(record) if record.space_id == space_id => Ok(record),
            _ => Err(TrackerError::not_found(ENTITY, id)),
        }
    }

    async fn type_in_space(&self, space_id: Uuid, type_id: Uuid) -> Result<WorkItemType, TrackerError> {
        let wit = match self.types.load(type_id).await {
            Ok(wit) => wit,
            Err(e) if e.is_not_found() => {
                return Err(TrackerError::bad_parameter(
                    "type",
                    format!("work item type {} does not exist", type_id),
                ))
            }
            Err(e) => return Err(e),
        };
        if wit.space_id != space_id {
            return Err(TrackerError::bad_parameter(
                "type",
                format!("work item type {} does not belong to space {}", type_id, space_id),
            ));
        }
        Ok(wit)
    }

    fn conflict(&self, id: Uuid, expected: i64, actual: i64) -> TrackerError {
        tracing::warn!(
            "Version conflict on work item {}: expected {}, stored {}",
            id,
            expected,
            actual
        );
        TrackerError::version_conflict(ENTITY, id, expected, actual)
    }

    /// A conditional write touched no rows: tell a lost race from a vanished row
    async fn conflict_or_missing(&self, id: Uuid, expected: i64) -> TrackerError {
        match self.store.get_work_item(id).await {
            Ok(Some(record)) => self.conflict(id, expected, record.version),
            Ok(None) => TrackerError::not_found(ENTITY, id),
            Err(e) => e.into(),
        }
    }
}
