//! Work item links and their topology rules
//!
//! The single-parent rule of tree link types is checked twice: once here as a
//! cheap pre-flight with a readable error, and again by the store in the same
//! transaction as the write, which is the check that actually closes the race.

use crate::db::{LinkStore, WorkItemStore};
use crate::models::{ensure_single_parent, WorkItemLink, WorkItemLinkType};
use crate::services::error::TrackerError;
use std::sync::Arc;
use uuid::Uuid;

const LINK: &str = "work item link";
const LINK_TYPE: &str = "work item link type";

#[derive(Clone)]
pub struct WorkItemLinkService {
    links: Arc<dyn LinkStore>,
    items: Arc<dyn WorkItemStore>,
}

impl WorkItemLinkService {
    pub fn new(links: Arc<dyn LinkStore>, items: Arc<dyn WorkItemStore>) -> Self {
        Self { links, items }
    }

    pub async fn create_link_type(
        &self,
        link_type: WorkItemLinkType,
    ) -> Result<WorkItemLinkType, TrackerError> {
        if link_type.name.trim().is_empty() {
            return Err(TrackerError::bad_parameter("name", "link type name must not be empty"));
        }
        let created = self.links.create_link_type(&link_type).await?;
        tracing::info!(
            "Created link type '{}' ({}) with {} topology",
            created.name,
            created.id,
            created.topology
        );
        Ok(created)
    }

    pub async fn load_link_type(&self, id: Uuid) -> Result<WorkItemLinkType, TrackerError> {
        self.links
            .get_link_type(id)
            .await?
            .ok_or_else(|| TrackerError::not_found(LINK_TYPE, id))
    }

    pub async fn load(&self, id: Uuid) -> Result<WorkItemLink, TrackerError> {
        self.links
            .get_link(id)
            .await?
            .ok_or_else(|| TrackerError::not_found(LINK, id))
    }

    /// Link `source_id` to `target_id`; for tree types the source becomes the parent
    pub async fn create(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        link_type_id: Uuid,
        creator: Uuid,
    ) -> Result<WorkItemLink, TrackerError> {
        if source_id == target_id {
            return Err(TrackerError::bad_parameter(
                "target",
                "a work item cannot be linked to itself",
            ));
        }

        let link_type = self.link_type_param(link_type_id).await?;
        self.ensure_item("source", source_id).await?;
        self.ensure_item("target", target_id).await?;

        let link = WorkItemLink::new(link_type_id, source_id, target_id);
        self.validate_topology(&link_type, &link).await?;

        let created = self.links.create_link(&link, &link_type).await?;
        tracing::info!(
            "Created '{}' link {} from {} to {} by {}",
            link_type.name,
            created.id,
            source_id,
            target_id,
            creator
        );
        Ok(created)
    }

    /// Check `link` against the links already stored for its target
    pub async fn validate_topology(
        &self,
        link_type: &WorkItemLinkType,
        link: &WorkItemLink,
    ) -> Result<(), TrackerError> {
        let existing = self
            .links
            .find_parent_links(link.link_type_id, link.target_id)
            .await?;
        ensure_single_parent(link_type, link, &existing)?;
        Ok(())
    }

    /// Rewrite a link if its version is still current
    pub async fn save(&self, link: &WorkItemLink) -> Result<WorkItemLink, TrackerError> {
        if link.source_id == link.target_id {
            return Err(TrackerError::bad_parameter(
                "target",
                "a work item cannot be linked to itself",
            ));
        }

        let current = self.load(link.id).await?;
        if current.version != link.version {
            return Err(TrackerError::version_conflict(
                LINK,
                link.id,
                link.version,
                current.version,
            ));
        }

        let link_type = self.link_type_param(link.link_type_id).await?;
        self.ensure_item("source", link.source_id).await?;
        self.ensure_item("target", link.target_id).await?;
        self.validate_topology(&link_type, link).await?;

        let rows = self.links.update_link(link, &link_type).await?;
        if rows == 0 {
            return match self.links.get_link(link.id).await? {
                Some(stored) => Err(TrackerError::version_conflict(
                    LINK,
                    link.id,
                    link.version,
                    stored.version,
                )),
                None => Err(TrackerError::not_found(LINK, link.id)),
            };
        }

        tracing::info!("Saved link {} at version {}", link.id, link.version + 1);
        self.load(link.id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), TrackerError> {
        if !self.links.delete_link(id).await? {
            return Err(TrackerError::not_found(LINK, id));
        }
        tracing::info!("Deleted link {}", id);
        Ok(())
    }

    /// The parent of `child_id` through a tree link type, if it has one
    pub async fn parent_of(
        &self,
        child_id: Uuid,
        link_type_id: Uuid,
    ) -> Result<Option<Uuid>, TrackerError> {
        let links = self.links.find_parent_links(link_type_id, child_id).await?;
        Ok(links
            .into_iter()
            .find(WorkItemLink::is_active)
            .map(|l| l.source_id))
    }

    async fn link_type_param(&self, id: Uuid) -> Result<WorkItemLinkType, TrackerError> {
        self.links.get_link_type(id).await?.ok_or_else(|| {
            TrackerError::bad_parameter("linkType", format!("link type {} does not exist", id))
        })
    }

    async fn ensure_item(&self, parameter: &str, id: Uuid) -> Result<(), TrackerError> {
        if self.items.work_item_exists(id).await? {
            Ok(())
        } else {
            Err(TrackerError::bad_parameter(
                parameter,
                format!("work item {} does not exist", id),
            ))
        }
    }
}
