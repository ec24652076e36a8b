//! Work item type registry
//!
//! Types are created once and never modified. A subtype copies its base's fields at
//! creation time and records the base in its materialized path, so subtype checks
//! never need to walk the hierarchy.

use crate::db::WorkItemTypeStore;
use crate::models::{NewWorkItemType, WorkItemType};
use crate::services::error::TrackerError;
use crate::services::type_cache::WorkItemTypeCache;
use std::sync::Arc;
use uuid::Uuid;

pub const ENTITY: &str = "work item type";

#[derive(Clone)]
pub struct WorkItemTypeService {
    store: Arc<dyn WorkItemTypeStore>,
    cache: Arc<WorkItemTypeCache>,
}

impl WorkItemTypeService {
    pub fn new(store: Arc<dyn WorkItemTypeStore>, cache: Arc<WorkItemTypeCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<WorkItemTypeCache> {
        &self.cache
    }

    /// Create a type, optionally extending `base_id`
    ///
    /// The base has to live in the same space. Overriding an inherited field with an
    /// incompatible definition is rejected and nothing is persisted.
    pub async fn create(
        &self,
        new: NewWorkItemType,
        base_id: Option<Uuid>,
    ) -> Result<WorkItemType, TrackerError> {
        let base = match base_id {
            Some(id) => {
                let base = self.find(id).await?.ok_or_else(|| {
                    TrackerError::bad_parameter(
                        "extendedTypeName",
                        format!("base work item type {} does not exist", id),
                    )
                })?;
                if base.space_id != new.space_id {
                    return Err(TrackerError::bad_parameter(
                        "extendedTypeName",
                        format!("base work item type {} belongs to another space", id),
                    ));
                }
                Some(base)
            }
            None => None,
        };

        let wit = WorkItemType::extend(base.as_ref(), new)?;
        let created = self.store.create_work_item_type(&wit).await?;
        self.cache.invalidate().await;

        tracing::info!(
            "Created work item type '{}' ({}) with {} fields at path {}",
            created.name,
            created.id,
            created.fields.len(),
            created.path
        );
        Ok(created)
    }

    pub async fn load(&self, id: Uuid) -> Result<WorkItemType, TrackerError> {
        self.find(id)
            .await?
            .ok_or_else(|| TrackerError::not_found(ENTITY, id))
    }

    pub async fn list(&self, space_id: Uuid) -> Result<Vec<WorkItemType>, TrackerError> {
        Ok(self.store.list_work_item_types(space_id).await?)
    }

    /// True if `type_id` is `ancestor_id` or was derived from it
    pub async fn is_subtype_of(&self, type_id: Uuid, ancestor_id: Uuid) -> Result<bool, TrackerError> {
        Ok(self.load(type_id).await?.is_subtype_of(ancestor_id))
    }

    async fn find(&self, id: Uuid) -> Result<Option<WorkItemType>, TrackerError> {
        if let Some(wit) = self.cache.get(id).await {
            return Ok(Some(wit));
        }

        let found = self.store.get_work_item_type(id).await?;
        if let Some(wit) = &found {
            self.cache.put(wit.clone()).await;
        }
        Ok(found)
    }
}
